//! 手动复位的电平触发事件。
//!
//! 与 [`event_listener::Event`] 的脉冲语义不同，`signal` 之后事件保持
//! 触发状态，任何时刻的 `wait` 都会立即返回，直到有人 `unsignal`。
//! 进程的 stop event、调试场景的 all-stopped event 都用它实现

use core::sync::atomic::{AtomicBool, Ordering};

use event_listener::{listener, Event};

pub struct WaitEvent {
    signaled: AtomicBool,
    listeners: Event,
}

impl WaitEvent {
    pub const fn new(signaled: bool) -> Self {
        Self {
            signaled: AtomicBool::new(signaled),
            listeners: Event::new(),
        }
    }

    /// 置为触发状态并唤醒所有等待者
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::SeqCst);
        self.listeners.notify(usize::MAX);
    }

    /// 清除触发状态，返回清除前的状态
    pub fn unsignal(&self) -> bool {
        self.signaled.swap(false, Ordering::SeqCst)
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        loop {
            if self.is_signaled() {
                return;
            }
            listener!(self.listeners => listener);
            // 建立监听和第一次检查之间可能有人 signal
            if self.is_signaled() {
                return;
            }
            listener.await;
        }
    }
}

impl Default for WaitEvent {
    fn default() -> Self {
        Self::new(false)
    }
}
