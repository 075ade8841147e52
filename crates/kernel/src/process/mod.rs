//! 进程模型。
//!
//! `Process` 本体只放不变或可原子访问的字段，可变状态集中在
//! [`ProcessInner`] 里由自旋锁保护。锁序是进程在前线程在后，
//! 需要同时锁父子进程时先锁父进程

mod child;
mod inner;
mod manager;

use alloc::{string::String, vec::Vec};

use atomic::{Atomic, Ordering};
use bytemuck::{NoUninit, Zeroable};
use defines::trap_context::TrapContext;
use event_listener::Event;
use klocks::{SpinMutex, SpinMutexGuard, WaitEvent};
use signal::{SigCode, Signal, SignalSet};
use triomphe::Arc;

pub use self::{
    child::{queue_child_signal, queue_child_signal_to, wait_for_child},
    inner::{Credentials, ExitInfo, Permissions, ProcessInner},
    manager::{ProcessTable, RecycleAllocator, PROCESS_TABLE},
};
pub(crate) use self::child::run_completion;
use crate::{
    memory::MemorySpace,
    thread::{self, Thread},
};

/// 进程的生命周期阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, NoUninit)]
#[repr(u8)]
pub enum ProcessStatus {
    Normal = 0,
    /// 所有线程已退出，等待父进程回收
    Zombie = 1,
}

pub struct Process {
    pid: usize,
    /// 退出时向父进程发送的信号
    pub exit_signal: Signal,
    pub status: Atomic<ProcessStatus>,
    /// 电平事件，触发表示进程在运行。停止信号清除它，线程在
    /// 返回用户态前等待它
    pub stop_event: WaitEvent,
    /// 所有线程都已进入停止状态，调试器依赖这个握手
    pub all_stopped_event: WaitEvent,
    /// 子进程事件到来时通知，`wait_for_child` 在上面等待
    pub child_event: Event,
    memory: SpinMutex<MemorySpace>,
    inner: SpinMutex<ProcessInner>,
}

impl Process {
    /// 创建一个全新的进程，自带一个主线程，并登记到全局进程表
    pub fn new_user(name: &str) -> Arc<Process> {
        let pid = PROCESS_TABLE.alloc_pid();
        let process = Arc::new(Process {
            pid,
            exit_signal: Signal::SIGCHLD,
            status: Atomic::new(ProcessStatus::Normal),
            stop_event: WaitEvent::new(true),
            all_stopped_event: WaitEvent::new(false),
            child_event: Event::new(),
            memory: SpinMutex::new(MemorySpace::new()),
            inner: SpinMutex::new(ProcessInner {
                name: String::from(name),
                parent: None,
                children: Vec::new(),
                pgid: pid,
                sid: pid,
                creds: Credentials::root(),
                threads: alloc::collections::BTreeMap::new(),
                tid_allocator: RecycleAllocator::new(),
                signal_handlers: signal::SignalHandlers::new(),
                handled: SignalSet::empty(),
                ignored: SignalSet::empty(),
                pending: signal::SignalQueue::new(),
                pending_set: SignalSet::empty(),
                unreaped: alloc::collections::VecDeque::new(),
                stopped_count: 0,
                stop_signal: Signal::SIGSTOP,
                exit: None,
                usage: defines::misc::ResourceUsage::default(),
                child_usage: defines::misc::ResourceUsage::default(),
                timers: slab::Slab::new(),
                itimer_real: None,
                debug: crate::debug::DebugState::new(),
            }),
        });
        {
            let mut inner = process.inner.lock();
            let tid = inner.tid_allocator.alloc();
            let thread = Arc::new(Thread::new(tid, Arc::clone(&process), TrapContext::zeroed()));
            inner.threads.insert(tid, thread);
        }
        PROCESS_TABLE.register(&process);
        info!("[{pid}] process {name} created");
        process
    }

    /// `fork`：新进程只有一个线程，复制调用线程的现场和掩码。
    ///
    /// signal action、忽略集继承，待决信号清空；子进程的 a0 置 0
    pub fn fork(&self, caller: &Arc<Thread>) -> Arc<Process> {
        let pid = PROCESS_TABLE.alloc_pid();
        let (mut trap_context, blocked) =
            caller.lock_inner_with(|inner| (inner.trap_context, inner.blocked));
        trap_context.set_a0(0);

        let mut self_inner = self.inner.lock();
        let process = Arc::new(Process {
            pid,
            exit_signal: self.exit_signal,
            status: Atomic::new(ProcessStatus::Normal),
            stop_event: WaitEvent::new(true),
            all_stopped_event: WaitEvent::new(false),
            child_event: Event::new(),
            memory: SpinMutex::new(self.memory.lock().clone()),
            inner: SpinMutex::new(ProcessInner {
                name: self_inner.name.clone(),
                parent: Some(self.pid),
                children: Vec::new(),
                pgid: self_inner.pgid,
                sid: self_inner.sid,
                creds: self_inner.creds,
                threads: alloc::collections::BTreeMap::new(),
                tid_allocator: RecycleAllocator::new(),
                signal_handlers: self_inner.signal_handlers.clone(),
                handled: self_inner.handled,
                ignored: self_inner.ignored,
                pending: signal::SignalQueue::new(),
                pending_set: SignalSet::empty(),
                unreaped: alloc::collections::VecDeque::new(),
                stopped_count: 0,
                stop_signal: Signal::SIGSTOP,
                exit: None,
                usage: defines::misc::ResourceUsage::default(),
                child_usage: defines::misc::ResourceUsage::default(),
                timers: slab::Slab::new(),
                itimer_real: None,
                debug: crate::debug::DebugState::new(),
            }),
        });
        {
            let mut inner = process.inner.lock();
            let tid = inner.tid_allocator.alloc();
            let thread = Arc::new(Thread::new(tid, Arc::clone(&process), trap_context));
            thread.lock_inner_with(|thread_inner| thread_inner.blocked = blocked);
            inner.threads.insert(tid, thread);
        }
        self_inner.children.push(pid);
        drop(self_inner);
        PROCESS_TABLE.register(&process);
        debug!("[{}] forked to [{pid}]", self.pid);
        process
    }

    /// `execve` 对信号状态的影响：有 handler 的信号回到默认行为，
    /// 忽略集、线程掩码和待决信号保留
    pub fn exec(&self, name: &str) {
        let mut inner = self.inner.lock();
        inner.name = String::from(name);
        inner.signal_handlers.reset();
        inner.handled = SignalSet::empty();
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn is_zombie(&self) -> bool {
        self.status.load(Ordering::SeqCst) == ProcessStatus::Zombie
    }

    pub fn lock_inner(&self) -> SpinMutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    /// 约束锁的生命周期在闭包内
    pub fn lock_inner_with<T>(&self, f: impl FnOnce(&mut ProcessInner) -> T) -> T {
        f(&mut self.inner.lock())
    }

    pub fn lock_memory(&self) -> SpinMutexGuard<'_, MemorySpace> {
        self.memory.lock()
    }

    pub fn read_user<T: bytemuck::Pod>(&self, addr: usize) -> defines::error::KResult<T> {
        self.memory.lock().read_obj(addr)
    }

    pub fn write_user<T: bytemuck::Pod>(
        &self,
        addr: usize,
        value: &T,
    ) -> defines::error::KResult<()> {
        self.memory.lock().write_obj(addr, value)
    }

    /// tid 最小的线程
    pub fn main_thread(&self) -> Option<Arc<Thread>> {
        self.inner.lock().threads.values().next().cloned()
    }

    pub fn thread(&self, tid: usize) -> Option<Arc<Thread>> {
        self.inner.lock().threads.get(&tid).cloned()
    }

    /// 记录退出信息。只有第一次记录生效，之后的致命信号不再改写
    pub fn record_exit(&self, reason: SigCode, status: usize) {
        let mut inner = self.inner.lock();
        if inner.exit.is_none() {
            inner.exit = Some(ExitInfo { reason, status });
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        PROCESS_TABLE.release_pid(self.pid);
        trace!("[{}] process dropped", self.pid);
    }
}

/// 在进程中再起一个线程
pub fn spawn_thread(process: &Arc<Process>, entry: usize, sp: usize) -> Arc<Thread> {
    let mut inner = process.lock_inner();
    let tid = inner.tid_allocator.alloc();
    let thread = Arc::new(Thread::new(
        tid,
        Arc::clone(process),
        TrapContext::app_init_context(entry, sp),
    ));
    inner.threads.insert(tid, Arc::clone(&thread));
    thread
}

/// 最后一个线程退出后的收尾：定格退出信息、处理遗留的子进程、
/// 通知父进程（或在无父进程时自行消失）
pub(crate) fn finish_exit(process: &Arc<Process>) {
    let (exit, orphans, leftovers) = process.lock_inner_with(|inner| {
        let exit = inner.exit.unwrap_or(ExitInfo {
            reason: SigCode::ChildExited,
            status: 0,
        });
        inner.exit = Some(exit);
        // 定时器随进程终止失效
        inner.timers.clear();
        inner.itimer_real = None;
        let orphans = core::mem::take(&mut inner.children);
        // 队列里尚未回收的子进程事件
        let mut leftovers: Vec<signal::SignalRecord> = inner.unreaped.drain(..).collect();
        for signal in inner.pending.pending_set().signals() {
            leftovers.extend(inner.pending.drain_signal(signal));
        }
        inner.pending_set = SignalSet::empty();
        (exit, orphans, leftovers)
    });
    process.status.store(ProcessStatus::Zombie, Ordering::SeqCst);

    for record in leftovers {
        child::run_completion(process, record.completion);
    }
    for pid in orphans {
        if let Some(orphan) = PROCESS_TABLE.get(pid) {
            if orphan.is_zombie() {
                // 没来得及回收的僵尸，静默回收
                PROCESS_TABLE.remove(pid);
            } else {
                orphan.lock_inner_with(|inner| inner.parent = None);
            }
        }
    }

    info!(
        "[{}] process exited, reason {:?} status {}",
        process.pid, exit.reason, exit.status
    );
    child::queue_child_signal(process, exit.reason, exit.status as isize);
}

/// 线程退出的收尾。最后一个线程会带动整个进程退出
pub fn exit_thread(thread: &Arc<Thread>) {
    crate::signal::cleanup_thread_signals(thread);
    let process = &thread.process;
    let last = process.lock_inner_with(|inner| {
        let usage = thread.lock_inner_with(|thread_inner| defines::misc::ResourceUsage {
            user_ms: thread_inner.user_ms,
            kernel_ms: thread_inner.kernel_ms,
            page_faults: thread_inner.page_faults,
        });
        inner.usage.accumulate(&usage);
        inner.threads.remove(&thread.tid());
        inner.tid_allocator.dealloc(thread.tid());
        if !inner.threads.is_empty() && inner.stopped_count == inner.threads.len() {
            process.all_stopped_event.signal();
        }
        inner.threads.is_empty()
    });
    thread::on_thread_exit(thread);
    if last {
        finish_exit(process);
    }
}
