//! 线程模型。
//!
//! 待决提示是一个原子字段，供不便拿锁的路径（比如可中断等待的
//! poll）快速判断有没有信号要处理；真实状态仍以加锁后的队列为准

mod inner;

use atomic::{Atomic, Ordering};
use bytemuck::NoUninit;
use defines::trap_context::TrapContext;
use event_listener::Event;
use klocks::{SpinMutex, SpinMutexGuard};
use triomphe::Arc;

pub use self::inner::ThreadInner;
use crate::process::Process;

/// 有无待处理信号的快速提示
#[derive(Clone, Copy, Debug, PartialEq, Eq, NoUninit)]
#[repr(u8)]
pub enum PendingHint {
    None = 0,
    /// 只有子进程事件，可中断等待不必醒来
    ChildAvailable = 1,
    /// 有信号待交付，可中断等待应以 `EINTR` 收场
    Pending = 2,
}

pub struct Thread {
    tid: usize,
    pub process: Arc<Process>,
    pub pending_hint: Atomic<PendingHint>,
    /// 有信号到来时通知，打断线程的可中断等待
    pub intr_event: Event,
    inner: SpinMutex<ThreadInner>,
}

impl Thread {
    pub fn new(tid: usize, process: Arc<Process>, trap_context: TrapContext) -> Self {
        Self {
            tid,
            process,
            pending_hint: Atomic::new(PendingHint::None),
            intr_event: Event::new(),
            inner: SpinMutex::new(ThreadInner::new(trap_context)),
        }
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    pub fn lock_inner(&self) -> SpinMutexGuard<'_, ThreadInner> {
        self.inner.lock()
    }

    pub fn lock_inner_with<T>(&self, f: impl FnOnce(&mut ThreadInner) -> T) -> T {
        f(&mut self.inner.lock())
    }

    /// 是否有待交付的信号。无锁，只看提示
    pub fn has_signal_pending(&self) -> bool {
        self.pending_hint.load(Ordering::SeqCst) == PendingHint::Pending
    }
}

/// 标记线程进入退出流程并打断它的可中断等待
pub fn on_thread_exit(thread: &Arc<Thread>) {
    thread.lock_inner_with(|inner| inner.exiting = true);
    // 让可中断等待以 Interrupted 收场
    thread.pending_hint.store(PendingHint::Pending, Ordering::SeqCst);
    thread.intr_event.notify(usize::MAX);
}
