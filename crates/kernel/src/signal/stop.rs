//! 停止与继续的协调。
//!
//! 停止是进程级状态：stop event 被清除后，每个线程在返回用户态前
//! 的预检里各自停下，停齐时触发 all-stopped event。`SIGCONT` 或
//! `KILL` 重新触发 stop event，所有线程一起醒来。
//!
//! 预检同时负责 `KILL`：它无视掩码，一旦待决线程立即退出

use alloc::vec::Vec;

use atomic::Ordering;
use defines::error::{errno, KResult};
use signal::{SigCode, Signal, SignalRecord, SignalSet};
use triomphe::Arc;

use crate::{
    process::{self, Process, ProcessInner},
    signal::send,
    thread::{PendingHint, Thread},
};

enum Verdict {
    Run,
    Exit,
    Stop { notify_parent: bool, stop_signal: Signal },
}

/// 非可屏蔽信号预检。交付普通信号之前调用。
///
/// 线程可能在这里参与停止，等到进程被继续才返回
pub(crate) async fn check_nonmaskable(thread: &Arc<Thread>) -> KResult<()> {
    let process = &thread.process;
    loop {
        let verdict = process.lock_inner_with(|inner| {
            let killed = thread.lock_inner_with(|thread_inner| {
                thread_inner.exiting
                    || (thread_inner.pending_set | inner.pending_set)
                        .contains(Signal::SIGKILL.into())
            });
            if killed {
                return Verdict::Exit;
            }
            if process.stop_event.is_signaled() {
                return Verdict::Run;
            }
            inner.stopped_count += 1;
            if inner.stopped_count == inner.threads.len() {
                process.all_stopped_event.signal();
            }
            Verdict::Stop {
                notify_parent: inner.stopped_count == 1,
                stop_signal: inner.stop_signal,
            }
        });
        match verdict {
            Verdict::Run => return Ok(()),
            Verdict::Exit => return Err(errno::BREAK),
            Verdict::Stop {
                notify_parent,
                stop_signal,
            } => {
                if notify_parent {
                    debug!("[{}] stopped by {:?}", process.pid(), stop_signal);
                    process::queue_child_signal(
                        process,
                        SigCode::ChildStopped,
                        stop_signal.to_user() as isize,
                    );
                }
                process.stop_event.wait().await;
                process.lock_inner_with(|inner| {
                    process.all_stopped_event.unsignal();
                    inner.stopped_count -= 1;
                });
            }
        }
    }
}

/// 交付阶段遇到默认行为是停止的信号（`SIGTSTP` 等）时进入停止状态。
/// `SIGSTOP` 则在产生时就走 [`initiate_stop_locked`]
pub(crate) fn initiate_stop(process: &Arc<Process>, signal: Signal) {
    let mut discarded = Vec::new();
    process.lock_inner_with(|inner| {
        if inner.pending_union().contains(Signal::SIGKILL.into()) {
            return;
        }
        initiate_stop_locked(process, inner, signal, &mut discarded);
    });
    for record in discarded {
        process::run_completion(process, record.completion);
    }
}

pub(crate) fn initiate_stop_locked(
    process: &Process,
    inner: &mut ProcessInner,
    signal: Signal,
    discarded: &mut Vec<SignalRecord>,
) {
    process.stop_event.unsignal();
    inner.stop_signal = signal;
    // 停止信号抵消待决的 SIGCONT
    send::discard_set_locked(inner, SignalSet::from(Signal::SIGCONT), discarded);
    // 停齐才算停止，把每个线程都从等待点上叫到预检里来
    for thread in inner.threads.values() {
        thread.pending_hint
            .store(PendingHint::Pending, Ordering::SeqCst);
        thread.intr_event.notify(usize::MAX);
    }
}
