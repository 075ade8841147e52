//! 集成测试的公共设施：构造带映射内存的进程、伪造系统调用现场、
//! 手动驱动 future 以便在等待点之间插入外部动作。

#![allow(dead_code)]

use std::{
    future::Future,
    pin::Pin,
    sync::{Mutex, MutexGuard},
    task::{Context, Poll, RawWaker, RawWakerVTable, Waker},
};

use defines::trap_context::TrapContext;
use kernel::{process::Process, thread::Thread, trap};
use triomphe::Arc;

/// 用户栈顶，映射区间是 `[0x1000, STACK_TOP)`
pub const STACK_TOP: usize = 0x1_0000;
/// 程序入口，只是个号码，测试不会真的执行用户指令
pub const ENTRY: usize = 0x4000;
/// 参数结构的存放处
pub const SCRATCH: usize = 0x2000;

/// 推进全局时钟的测试之间互斥，避免互相触发对方的定时器
static CLOCK_MUTEX: Mutex<()> = Mutex::new(());

pub fn lock_clock() -> MutexGuard<'static, ()> {
    CLOCK_MUTEX
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn new_process(name: &str) -> (Arc<Process>, Arc<Thread>) {
    let process = Process::new_user(name);
    process.lock_memory().map_region(0x1000, STACK_TOP - 0x1000);
    let thread = process.main_thread().unwrap();
    thread.lock_inner_with(|inner| {
        inner.trap_context = TrapContext::app_init_context(ENTRY, STACK_TOP);
    });
    (process, thread)
}

/// 在陷入现场里摆好系统调用号和参数
pub fn prepare_syscall(thread: &Arc<Thread>, id: usize, args: [usize; 6]) {
    thread.lock_inner_with(|inner| {
        let ctx = &mut inner.trap_context;
        // a0~a5 与 a7，布局见 `TrapContext`
        ctx.user_regs[9..15].copy_from_slice(&args);
        ctx.user_regs[16] = id;
    });
}

/// 执行一次不会阻塞的系统调用回合，返回写回 a0 的值
pub fn do_syscall(thread: &Arc<Thread>, id: usize, args: [usize; 6]) -> isize {
    prepare_syscall(thread, id, args);
    assert!(smol::block_on(trap::handle_user_trap(thread)));
    ret_val(thread)
}

/// 执行一次预期让线程退出的系统调用回合
pub fn do_syscall_expect_exit(thread: &Arc<Thread>, id: usize, args: [usize; 6]) {
    prepare_syscall(thread, id, args);
    assert!(!smol::block_on(trap::handle_user_trap(thread)));
}

pub fn ret_val(thread: &Arc<Thread>) -> isize {
    thread.lock_inner_with(|inner| inner.trap_context.a0()) as isize
}

pub fn pc_of(thread: &Arc<Thread>) -> usize {
    thread.lock_inner_with(|inner| inner.trap_context.pc)
}

/// 把 Pod 参数结构放进用户空间，返回其地址
pub fn put_params<T: bytemuck::Pod>(process: &Arc<Process>, addr: usize, value: &T) -> usize {
    process.write_user(addr, value).unwrap();
    addr
}

fn noop_waker() -> Waker {
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(std::ptr::null(), &VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );
    unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
}

/// 手动驱动一个 future。事件通知是状态化的，空 waker 即可，
/// 外部动作之后再 poll 一次就能观察到进展
pub struct Stepper<F: Future> {
    fut: Pin<Box<F>>,
}

impl<F: Future> Stepper<F> {
    pub fn new(fut: F) -> Self {
        Self { fut: Box::pin(fut) }
    }

    pub fn poll(&mut self) -> Poll<F::Output> {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        self.fut.as_mut().poll(&mut cx)
    }

    pub fn assert_pending(&mut self) {
        assert!(self.poll().is_pending());
    }

    /// 连续 poll 直到就绪。内部让出（如 yield）最多几轮，
    /// 真正的阻塞点不会被它跳过去
    pub fn expect_ready(&mut self) -> F::Output {
        for _ in 0..16 {
            if let Poll::Ready(value) = self.poll() {
                return value;
            }
        }
        panic!("future still pending after external action");
    }
}
