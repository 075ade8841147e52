//! 时钟与定时器。
//!
//! 全局毫秒时钟由时钟中断（测试里则是显式调用）通过 [`advance_ms`]
//! 推进，推进时结算时间轮上到期的表项。表项分两类：唤醒某个
//! 睡眠中的 future，或触发某个进程定时器。
//!
//! 进程定时器到期时若上一次的到期信号还在队列里没被取走，不再
//! 重复入队，只累加未结算的到期计数。记录出队时结算：入队时刻
//! 折叠进 overflow 的那批到期一并勾销，迟到的到期重新入队补发

use alloc::collections::BinaryHeap;
use core::{
    cmp::{self, Reverse},
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicUsize, Ordering},
    task::{Context, Poll, Waker},
};

use defines::signal::SigInfo;
use klocks::{Lazy, SpinMutex};
use signal::{Completion, SigCode, SigInfoExt, Signal, SignalRecord};
use smallvec::SmallVec;
use triomphe::Arc;

use crate::{
    process::{Process, PROCESS_TABLE},
    signal::send,
    thread::Thread,
};

static CLOCK_MS: AtomicUsize = AtomicUsize::new(0);

pub fn now_ms() -> usize {
    CLOCK_MS.load(Ordering::SeqCst)
}

/// 推进全局时钟并结算到期的时间轮表项
pub fn advance_ms(delta: usize) {
    let now = CLOCK_MS.fetch_add(delta, Ordering::SeqCst) + delta;
    TIMER_WHEEL.process(now);
}

/// 进程持有的一个定时器
pub struct ProcessTimer {
    pub signal: Signal,
    pub parameter: usize,
    /// 绝对到期时刻，0 表示未武装
    pub due_ms: usize,
    pub period_ms: usize,
    /// 尚未向用户结算的到期次数
    pub expiration_count: usize,
    /// 入队时折叠进当前待决记录的到期次数
    pub overflow_count: usize,
    /// 到期信号是否还在待决队列上
    pub queued: bool,
}

impl ProcessTimer {
    pub fn new(signal: Signal, parameter: usize) -> Self {
        Self {
            signal,
            parameter,
            due_ms: 0,
            period_ms: 0,
            expiration_count: 0,
            overflow_count: 0,
            queued: false,
        }
    }
}

/// 按线程运行时间计数的定时器（Virtual/Profile 间隔定时器）
#[derive(Clone, Copy, Debug)]
pub struct CpuTimer {
    /// 到期时的运行时间读数
    pub due_ms: usize,
    pub period_ms: usize,
}

enum DeadlineKind {
    Wake(Waker),
    ProcessTimer { pid: usize, timer_id: usize },
}

struct Deadline {
    due_ms: usize,
    kind: DeadlineKind,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.due_ms.cmp(&other.due_ms)
    }
}

static TIMER_WHEEL: Lazy<TimerWheel> = Lazy::new(|| TimerWheel {
    heap: SpinMutex::new(BinaryHeap::new()),
});

struct TimerWheel {
    heap: SpinMutex<BinaryHeap<Reverse<Deadline>>>,
}

impl TimerWheel {
    fn register(&self, due_ms: usize, kind: DeadlineKind) {
        self.heap.lock().push(Reverse(Deadline { due_ms, kind }));
    }

    fn process(&self, now: usize) {
        // 到期动作要拿进程锁，不能在持有堆锁时执行
        let mut due: SmallVec<[Deadline; 4]> = SmallVec::new();
        {
            let mut heap = self.heap.lock();
            while heap.peek().is_some_and(|Reverse(head)| head.due_ms <= now) {
                if let Some(Reverse(head)) = heap.pop() {
                    due.push(head);
                }
            }
        }
        for deadline in due {
            match deadline.kind {
                DeadlineKind::Wake(waker) => waker.wake(),
                DeadlineKind::ProcessTimer { pid, timer_id } => {
                    fire_process_timer(pid, timer_id, deadline.due_ms);
                }
            }
        }
    }
}

/// 把进程定时器挂上时间轮。到期时刻变更后旧表项会因读数不符被忽略
pub fn register_process_timer(due_ms: usize, pid: usize, timer_id: usize) {
    TIMER_WHEEL.register(due_ms, DeadlineKind::ProcessTimer { pid, timer_id });
}

fn fire_process_timer(pid: usize, timer_id: usize, due_ms: usize) {
    let Some(process) = PROCESS_TABLE.get(pid) else {
        return;
    };
    if process.is_zombie() {
        return;
    }
    let mut record = None;
    let mut rearm = None;
    process.lock_inner_with(|inner| {
        let Some(timer) = inner.timers.get_mut(timer_id) else {
            return;
        };
        if timer.due_ms != due_ms {
            // 被重设或解除过，过期表项
            return;
        }
        timer.expiration_count += 1;
        if timer.period_ms > 0 {
            let now = now_ms();
            let mut next = timer.due_ms + timer.period_ms;
            while next <= now {
                next += timer.period_ms;
            }
            timer.due_ms = next;
            rearm = Some(next);
        } else {
            timer.due_ms = 0;
        }
        if !timer.queued {
            record = Some(queue_timer_signal(timer, pid, timer_id));
        }
    });
    if let Some(next) = rearm {
        register_process_timer(next, pid, timer_id);
    }
    if let Some(record) = record {
        trace!("[{pid}] timer {timer_id} fired");
        send::signal_process(&process, record);
    }
}

/// 入队一次到期信号，入队前的到期都折叠进 overflow
fn queue_timer_signal(timer: &mut ProcessTimer, pid: usize, timer_id: usize) -> SignalRecord {
    timer.queued = true;
    timer.overflow_count = timer.expiration_count - 1;
    let info = SigInfo {
        signo: timer.signal.to_user(),
        code: SigCode::Timer as isize,
        sender_pid: pid,
        parameter: timer.parameter,
        status: timer_id as isize,
        ..SigInfo::default()
    };
    SignalRecord::with_completion(info, Completion::TimerRearm { timer_id })
}

/// 定时器的到期记录已出队（交付或丢弃）。
///
/// 结算掉这条记录代表的 overflow + 1 次到期；记录入队之后又有
/// 新的到期，立刻补发下一条记录，不让它们无声消失
pub(crate) fn timer_record_done(process: &Arc<Process>, timer_id: usize) {
    let pid = process.pid();
    let record = process.lock_inner_with(|inner| {
        let timer = inner.timers.get_mut(timer_id)?;
        let consumed = timer.overflow_count + 1;
        timer.overflow_count = 0;
        timer.expiration_count = timer.expiration_count.saturating_sub(consumed);
        timer.queued = false;
        if timer.expiration_count > 0 {
            Some(queue_timer_signal(timer, pid, timer_id))
        } else {
            None
        }
    });
    if let Some(record) = record {
        trace!("[{pid}] timer {timer_id} re-raised");
        send::signal_process(process, record);
    }
}

/// 结算线程的运行时间定时器，在返回用户态前调用
pub fn check_runtime_timers(thread: &Arc<Thread>) {
    let mut fired: SmallVec<[Signal; 2]> = SmallVec::new();
    thread.lock_inner_with(|inner| {
        let user = inner.user_ms;
        let total = inner.user_ms + inner.kernel_ms;
        for (timer, elapsed, signal) in [
            (&mut inner.vtimer, user, Signal::SIGVTALRM),
            (&mut inner.ptimer, total, Signal::SIGPROF),
        ] {
            let Some(current) = timer else {
                continue;
            };
            if elapsed < current.due_ms {
                continue;
            }
            if current.period_ms > 0 {
                while current.due_ms <= elapsed {
                    current.due_ms += current.period_ms;
                }
            } else {
                *timer = None;
            }
            fired.push(signal);
        }
    });
    for signal in fired {
        send::signal_thread(thread, SignalRecord::new(SigInfo::for_kernel(signal)), false);
    }
}

/// 给线程记账运行时间。时钟中断路径调用
pub fn add_cpu_time(thread: &Arc<Thread>, user_ms: usize, kernel_ms: usize) {
    thread.lock_inner_with(|inner| {
        inner.user_ms += user_ms;
        inner.kernel_ms += kernel_ms;
    });
}

/// 睡到绝对时刻 `due_ms`
pub fn sleep_until(due_ms: usize) -> SleepFuture {
    SleepFuture { due_ms }
}

pub struct SleepFuture {
    due_ms: usize,
}

impl Future for SleepFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if now_ms() >= self.due_ms {
            Poll::Ready(())
        } else {
            TIMER_WHEEL.register(self.due_ms, DeadlineKind::Wake(cx.waker().clone()));
            Poll::Pending
        }
    }
}
