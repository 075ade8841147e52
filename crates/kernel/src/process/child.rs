//! 子进程事件：产生、合并、`wait_for_child` 消费。
//!
//! 同一子进程同一时刻最多有一个未消费的事件：新事件入队前先取走
//! 旧的（停止后又继续，父进程只看到最后的状态）。退出事件是最后
//! 一个事件，它携带回收动作，`wait_for_child` 消费它时子进程才
//! 真正消失

use defines::{
    error::{errno, KResult},
    misc::ResourceUsage,
    signal::SigInfo,
    user::{WaitChildParams, WaitFlags},
};
use signal::{Completion, SigCode, SigInfoExt, Signal, SignalRecord};
use triomphe::Arc;

use crate::{
    executor::{self, WaitOutcome},
    process::{manager::PROCESS_TABLE, Process},
    signal::send,
    thread::Thread,
};

/// 向父进程通报子进程事件。
///
/// 停止和继续事件在父进程就是跟踪器时略过，跟踪器已经从陷入
/// 事件得知了一切。没有父进程的进程退出时没人回收，直接消失
pub fn queue_child_signal(child: &Arc<Process>, reason: SigCode, status: isize) {
    let (parent, tracer) = child.lock_inner_with(|inner| (inner.parent, inner.debug.tracer));
    if matches!(reason, SigCode::ChildStopped | SigCode::ChildContinued)
        && parent.is_some()
        && parent == tracer
    {
        return;
    }
    queue_child_signal_to(parent, child, reason, status);
}

/// 指定接收者的形式，跟踪器的 trapped 事件走这里
pub fn queue_child_signal_to(
    target: Option<usize>,
    child: &Arc<Process>,
    reason: SigCode,
    status: isize,
) {
    let exit_event = matches!(
        reason,
        SigCode::ChildExited | SigCode::ChildKilled | SigCode::ChildDumped
    );
    let receiver = target.and_then(|pid| PROCESS_TABLE.get(pid));
    let Some(receiver) = receiver else {
        if exit_event {
            PROCESS_TABLE.remove(child.pid());
        }
        return;
    };

    let signal = if exit_event {
        child.exit_signal
    } else {
        Signal::SIGCHLD
    };
    let completion = if exit_event {
        Completion::ChildReap {
            child_pid: child.pid(),
        }
    } else {
        Completion::Free
    };
    let record = SignalRecord::with_completion(
        SigInfo::for_child(signal, reason, child.pid(), status),
        completion,
    );

    // 合并掉同一子进程的旧事件
    let replaced = receiver.lock_inner_with(|inner| {
        inner
            .pending
            .take_child_record(child.pid())
            .or_else(|| inner.take_unreaped(child.pid()))
    });
    debug_assert!(!replaced.is_some_and(|r| matches!(r.completion, Completion::ChildReap { .. })));

    send::signal_process(&receiver, record);
    receiver.child_event.notify(usize::MAX);
}

/// 记录出队（或被丢弃）后的收尾动作
pub(crate) fn run_completion(process: &Arc<Process>, completion: Completion) {
    match completion {
        Completion::Free | Completion::None => {}
        Completion::TimerRearm { timer_id } => crate::time::timer_record_done(process, timer_id),
        Completion::ChildReap { child_pid } => {
            // 无人等待的退出事件被丢弃，子进程静默回收
            reap(process, child_pid);
        }
    }
}

/// 回收僵尸子进程，返回它本身的资源用量
fn reap(parent: &Arc<Process>, child_pid: usize) -> Option<ResourceUsage> {
    let child = PROCESS_TABLE.remove(child_pid)?;
    let usage = child.lock_inner_with(|inner| inner.usage);
    parent.lock_inner_with(|inner| {
        inner.children.retain(|&pid| pid != child_pid);
        inner.child_usage.accumulate(&usage);
    });
    trace!("[{}] reaped child [{child_pid}]", parent.pid());
    Some(usage)
}

enum Scan {
    Found { record: SignalRecord, consumed: bool },
    NoChildren,
    NoneMatching,
}

/// `wait_for_child`。成功时把事件信息填回 `params`。
///
/// 没有符合条件的事件时阻塞，除非指定了立即返回；阻塞可以被信号
/// 打断，以 `EINTR` 收场
pub async fn wait_for_child(
    process: &Arc<Process>,
    thread: &Arc<Thread>,
    params: &mut WaitChildParams,
) -> KResult<()> {
    let flags = WaitFlags::from_bits(params.flags).ok_or(errno::EINVAL)?;
    if !flags.intersects(WaitFlags::EXITED | WaitFlags::STOPPED | WaitFlags::CONTINUED) {
        return Err(errno::EINVAL);
    }
    loop {
        // 先监听再扫描，关上丢失唤醒的窗口
        let listener = process.child_event.listen();
        let scan = scan_once(process, params.pid, flags);
        match scan {
            Scan::NoChildren => return Err(errno::ECHILD),
            Scan::Found { record, consumed } => {
                params.pid = record.info.sender_pid as isize;
                params.exit_value = record.info.status as usize;
                params.reason = record.info.code as usize;
                if consumed {
                    if let Completion::ChildReap { child_pid } = record.completion {
                        if let Some(usage) = reap(process, child_pid) {
                            if params.usage_ptr != 0 {
                                process.write_user(params.usage_ptr, &usage)?;
                            }
                        }
                    }
                }
                return Ok(());
            }
            Scan::NoneMatching => {
                if flags.contains(WaitFlags::RETURN_IMMEDIATELY) {
                    return Err(errno::EAGAIN);
                }
                match executor::wait_interruptible(thread, listener).await {
                    WaitOutcome::Interrupted => return Err(errno::EINTR),
                    _ => continue,
                }
            }
        }
    }
}

fn scan_once(process: &Arc<Process>, pid_filter: isize, flags: WaitFlags) -> Scan {
    process.lock_inner_with(|inner| {
        if inner.children.is_empty() {
            return Scan::NoChildren;
        }
        if pid_filter > 0 && !inner.children.contains(&(pid_filter as usize)) {
            return Scan::NoChildren;
        }
        let want_pgid = match pid_filter {
            0 => Some(inner.pgid),
            p if p < -1 => Some(-p as usize),
            _ => None,
        };
        let matches = |record: &SignalRecord| -> bool {
            let Some(code) = record.info.sig_code() else {
                return false;
            };
            let class_ok = match code {
                SigCode::ChildExited | SigCode::ChildKilled | SigCode::ChildDumped => {
                    flags.contains(WaitFlags::EXITED)
                }
                SigCode::ChildStopped | SigCode::ChildTrapped => {
                    flags.contains(WaitFlags::STOPPED)
                }
                SigCode::ChildContinued => flags.contains(WaitFlags::CONTINUED),
                _ => return false,
            };
            if !class_ok {
                return false;
            }
            let child_pid = record.info.sender_pid;
            if pid_filter > 0 && child_pid != pid_filter as usize {
                return false;
            }
            if let Some(pgid) = want_pgid {
                let Some(child) = PROCESS_TABLE.get(child_pid) else {
                    return false;
                };
                if child.lock_inner_with(|child_inner| child_inner.pgid) != pgid {
                    return false;
                }
            }
            true
        };

        // position 的迭代器借用要在改动队列之前结束
        let found = inner.unreaped.iter().position(matches);
        if let Some(i) = found {
            if flags.contains(WaitFlags::DONT_DISCARD) {
                return Scan::Found {
                    record: inner.unreaped[i].clone(),
                    consumed: false,
                };
            }
            if let Some(record) = inner.unreaped.remove(i) {
                return Scan::Found {
                    record,
                    consumed: true,
                };
            }
        }
        let found = inner.pending.iter().position(|record| matches(record));
        if let Some(i) = found {
            if flags.contains(WaitFlags::DONT_DISCARD) {
                if let Some(record) = inner.pending.iter().nth(i) {
                    return Scan::Found {
                        record: record.clone(),
                        consumed: false,
                    };
                }
            } else if let Some(record) = inner.pending.remove(i) {
                if let Some(signal) = record.signal() {
                    if !inner.pending.pending_set().contains(signal.into()) {
                        inner.pending_set.remove(signal.into());
                    }
                }
                return Scan::Found {
                    record,
                    consumed: true,
                };
            }
        }
        Scan::NoneMatching
    })
}
