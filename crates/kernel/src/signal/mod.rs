//! 信号子系统的内核侧：产生、交付、应用、停止协调。
//!
//! 集合与队列等纯数据结构在 `signal` crate 里

pub mod apply;
pub mod dispatch;
pub mod send;
mod stop;

use defines::error::{errno, KResult};
use defines::signal::SigInfo;
use signal::{SigCode, SigInfoExt, Signal, SignalRecord};
use triomphe::Arc;

pub use self::dispatch::{cleanup_thread_signals, pending_set, set_signal_mask, steal_pending_signal};
use crate::thread::Thread;

/// 返回用户态前的信号处理主循环。
///
/// 依次：非可屏蔽信号预检（可能在其中停止等待），出队一个信号并
/// 处置，直到没有可交付的信号。`Err(BREAK)` 表示线程应当退出。
/// 最后若仍有未消化的重启请求，回退 pc 让系统调用透明重做
pub async fn handle_pending_signals(thread: &Arc<Thread>) -> KResult<()> {
    loop {
        stop::check_nonmaskable(thread).await?;
        match dispatch::dispatch_one(thread).await {
            dispatch::Dequeued::Handler(info, action) => {
                apply::apply_synchronous_signal(thread, &info, &action);
            }
            dispatch::Dequeued::Terminate { signal, dump } => {
                let process = &thread.process;
                let reason = if dump {
                    SigCode::ChildDumped
                } else {
                    SigCode::ChildKilled
                };
                info!(
                    "[{}] terminated by {:?}{}",
                    process.pid(),
                    signal,
                    if dump { " (core dumped)" } else { "" }
                );
                process.record_exit(reason, signal.to_user());
                // 其余线程也要退出
                send::signal_process(
                    process,
                    SignalRecord::new(SigInfo::for_kernel(Signal::SIGKILL)),
                );
                return Err(errno::BREAK);
            }
            dispatch::Dequeued::Stop(signal) => {
                stop::initiate_stop(&thread.process, signal);
            }
            dispatch::Dequeued::None => break,
        }
    }
    thread.lock_inner_with(|inner| {
        if inner.restart_pending {
            inner.restart_pending = false;
            inner.trap_context.pc -= defines::trap_context::SYSCALL_INSTRUCTION_LEN;
        }
    });
    Ok(())
}
