//! 异步原语：让出执行权，以及可被信号打断的事件等待

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use event_listener::EventListener;
use pin_project::pin_project;
use triomphe::Arc;

use crate::{thread::Thread, time};

pub async fn yield_now() {
    struct YieldNow(bool);

    impl Future for YieldNow {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    YieldNow(false).await;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// 等待的事件发生
    Woken,
    TimedOut,
    /// 有信号待交付，提前醒来
    Interrupted,
}

/// 在 `target` 上等待，同时响应信号到来和超时。
///
/// `target` 必须在检查等待条件之前就开始监听，否则存在丢失唤醒的窗口。
/// `timeout_ms` 是相对超时，`None` 表示无限等待
pub fn wait_interruptible_timeout<'a>(
    thread: &'a Arc<Thread>,
    target: EventListener,
    timeout_ms: Option<usize>,
) -> InterruptibleWait<'a> {
    InterruptibleWait {
        intr: thread.intr_event.listen(),
        sleep: timeout_ms.map(|ms| time::sleep_until(time::now_ms() + ms)),
        thread,
        target,
    }
}

pub async fn wait_interruptible(thread: &Arc<Thread>, target: EventListener) -> WaitOutcome {
    wait_interruptible_timeout(thread, target, None).await
}

#[pin_project]
pub struct InterruptibleWait<'a> {
    thread: &'a Arc<Thread>,
    #[pin]
    target: EventListener,
    #[pin]
    intr: EventListener,
    #[pin]
    sleep: Option<time::SleepFuture>,
}

impl Future for InterruptibleWait<'_> {
    type Output = WaitOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<WaitOutcome> {
        let mut this = self.project();
        loop {
            if this.thread.has_signal_pending() {
                return Poll::Ready(WaitOutcome::Interrupted);
            }
            if this.target.as_mut().poll(cx).is_ready() {
                return Poll::Ready(WaitOutcome::Woken);
            }
            if let Some(sleep) = this.sleep.as_mut().as_pin_mut() {
                if sleep.poll(cx).is_ready() {
                    return Poll::Ready(WaitOutcome::TimedOut);
                }
            }
            match this.intr.as_mut().poll(cx) {
                // 被信号唤醒（也可能是伪唤醒），重新监听再查一遍提示
                Poll::Ready(()) => this.intr.set(this.thread.intr_event.listen()),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
