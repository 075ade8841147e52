//! 信号的产生与入队。
//!
//! 入队前先按当前处置过滤：会被丢弃的信号直接不入队（子进程事件
//! 例外，它们改挂到 unreaped 列表供 `wait_for_child` 消费）。
//! 被跟踪的进程不过滤，所有信号都要先经过跟踪器。
//!
//! `KILL`、`SIGSTOP`、`SIGCONT` 有入队前就生效的副作用，
//! 并且永远作用于整个进程

use alloc::vec::Vec;

use atomic::Ordering;
use defines::{
    error::{errno, KResult},
    signal::SigInfo,
};
use signal::{Completion, SigCode, SigInfoExt, Signal, SignalRecord, SignalSet};
use triomphe::Arc;

use crate::{
    process::{self, ExitInfo, Process, ProcessInner, PROCESS_TABLE},
    signal::stop,
    thread::{PendingHint, Thread},
};

/// 向整个进程发送信号，由第一个未阻塞它的线程消费
pub fn signal_process(process: &Arc<Process>, record: SignalRecord) {
    let Some(signal) = record.signal() else {
        debug_assert!(false, "record without a valid signal");
        return;
    };
    let mut discarded = Vec::new();
    let mut was_stopped = false;
    process.lock_inner_with(|inner| {
        match signal {
            Signal::SIGKILL => {
                if inner.exit.is_none() {
                    inner.exit = Some(ExitInfo {
                        reason: SigCode::ChildKilled,
                        status: signal.to_user(),
                    });
                }
                // 停止状态挡不住 KILL
                process.stop_event.signal();
            }
            Signal::SIGSTOP => {
                if !inner.pending_union().contains(Signal::SIGKILL.into()) {
                    stop::initiate_stop_locked(process, inner, signal, &mut discarded);
                }
            }
            Signal::SIGCONT => {
                was_stopped = !process.stop_event.is_signaled();
                process.stop_event.signal();
                discard_set_locked(inner, SignalSet::STOP_CLASS, &mut discarded);
            }
            _ => {}
        }
        queue_signal_locked(process, inner, None, record, false, &mut discarded);
    });
    for record in discarded {
        process::run_completion(process, record.completion);
    }
    if was_stopped {
        // 继续的效果不依赖交付，通知父进程也是
        process::queue_child_signal(
            process,
            SigCode::ChildContinued,
            Signal::SIGCONT.to_user() as isize,
        );
    }
}

/// 向单个线程发送信号。
///
/// `force` 用于内核合成的致命信号（如 handler 压栈失败时的 `SIGSEGV`）：
/// 强制解除阻塞和忽略，确保默认行为发生
pub fn signal_thread(thread: &Arc<Thread>, record: SignalRecord, force: bool) {
    let Some(signal) = record.signal() else {
        debug_assert!(false, "record without a valid signal");
        return;
    };
    if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP | Signal::SIGCONT) {
        return signal_process(&thread.process, record);
    }
    let process = &thread.process;
    let mut discarded = Vec::new();
    process.lock_inner_with(|inner| {
        queue_signal_locked(process, inner, Some(thread), record, force, &mut discarded);
    });
    for record in discarded {
        process::run_completion(process, record.completion);
    }
}

/// `send_signal` 的进程目标形式，带权限检查
pub fn signal_pid(sender: &Arc<Process>, pid: usize, info: SigInfo) -> KResult<()> {
    let Some(signal) = info.signal() else {
        return Err(errno::EINVAL);
    };
    let Some(target) = PROCESS_TABLE.get(pid) else {
        return Err(errno::ESRCH);
    };
    if target.is_zombie() {
        return Err(errno::ESRCH);
    }
    check_permission(sender, &target, signal)?;
    signal_process(&target, SignalRecord::new(info));
    Ok(())
}

/// 向进程组发送。至少发给了一个进程才算成功
pub fn signal_process_group(sender: &Arc<Process>, pgid: usize, info: SigInfo) -> KResult<()> {
    let Some(signal) = info.signal() else {
        return Err(errno::EINVAL);
    };
    let mut found = false;
    let mut sent = false;
    for target in PROCESS_TABLE.processes() {
        if target.is_zombie() || target.lock_inner_with(|inner| inner.pgid) != pgid {
            continue;
        }
        found = true;
        if check_permission(sender, &target, signal).is_ok() {
            signal_process(&target, SignalRecord::new(info));
            sent = true;
        }
    }
    match (found, sent) {
        (false, _) => Err(errno::ESRCH),
        (true, false) => Err(errno::EPERM),
        (true, true) => Ok(()),
    }
}

/// 向除了自己和 init 之外的所有进程发送
pub fn signal_all(sender: &Arc<Process>, info: SigInfo) -> KResult<()> {
    let Some(signal) = info.signal() else {
        return Err(errno::EINVAL);
    };
    let mut found = false;
    let mut sent = false;
    for target in PROCESS_TABLE.processes() {
        if target.is_zombie() || target.pid() == sender.pid() || target.pid() == 1 {
            continue;
        }
        found = true;
        if check_permission(sender, &target, signal).is_ok() {
            signal_process(&target, SignalRecord::new(info));
            sent = true;
        }
    }
    match (found, sent) {
        (false, _) => Err(errno::ESRCH),
        (true, false) => Err(errno::EPERM),
        (true, true) => Ok(()),
    }
}

fn check_permission(sender: &Arc<Process>, target: &Arc<Process>, signal: Signal) -> KResult<()> {
    if sender.pid() == target.pid() {
        return Ok(());
    }
    let (creds, sid) = sender.lock_inner_with(|inner| (inner.creds, inner.sid));
    let (target_creds, target_sid) = target.lock_inner_with(|inner| (inner.creds, inner.sid));
    if creds.can_signal(&target_creds, signal, sid == target_sid) {
        Ok(())
    } else {
        Err(errno::EPERM)
    }
}

/// 把一个集合里的待决记录从进程和所有线程上清掉
pub(crate) fn discard_set_locked(
    inner: &mut ProcessInner,
    set: SignalSet,
    discarded: &mut Vec<SignalRecord>,
) {
    for signal in set.signals() {
        discarded.extend(inner.pending.drain_signal(signal));
        inner.pending_set.remove(signal.into());
        for thread in inner.threads.values() {
            thread.lock_inner_with(|thread_inner| {
                discarded.extend(thread_inner.pending.drain_signal(signal));
                thread_inner.pending_set.remove(signal.into());
            });
        }
    }
}

/// 入队的公共路径，进程锁已持有。
///
/// 标准信号在已有待决位时折叠，实时信号始终排队
pub(crate) fn queue_signal_locked(
    process: &Process,
    inner: &mut ProcessInner,
    thread: Option<&Arc<Thread>>,
    record: SignalRecord,
    force: bool,
    discarded: &mut Vec<SignalRecord>,
) {
    let Some(signal) = record.signal() else {
        return;
    };
    if force {
        if let Some(thread) = thread {
            thread.lock_inner_with(|thread_inner| thread_inner.blocked.remove(signal.into()));
        }
        inner.handled.remove(signal.into());
        inner.ignored.remove(signal.into());
    }
    let traced = inner.debug.tracer.is_some();
    let is_child = record
        .info
        .sig_code()
        .is_some_and(SigCode::is_child_event);
    if !force && !traced && inner.discards(signal) {
        if is_child {
            trace!("[{}] child event parked unreaped", process.pid());
            inner.unreaped.push_back(record);
            for thread in inner.threads.values() {
                let _ = thread.pending_hint.compare_exchange(
                    PendingHint::None,
                    PendingHint::ChildAvailable,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            process.child_event.notify(usize::MAX);
        } else {
            trace!("[{}] {:?} discarded by disposition", process.pid(), signal);
            discarded.push(record);
        }
        return;
    }

    match thread {
        Some(thread) => {
            thread.lock_inner_with(|thread_inner| {
                if signal.is_realtime()
                    || !thread_inner.pending_set.contains(signal.into())
                    || record.completion != Completion::Free
                {
                    thread_inner.pending.push(record);
                }
                thread_inner.pending_set.insert(signal.into());
                if !thread_inner.blocked.contains(signal.into()) {
                    thread.pending_hint
                        .store(PendingHint::Pending, Ordering::SeqCst);
                    thread.intr_event.notify(usize::MAX);
                }
            });
        }
        None => {
            if signal.is_realtime()
                || !inner.pending_set.contains(signal.into())
                || record.completion != Completion::Free
            {
                inner.pending.push(record);
            }
            inner.pending_set.insert(signal.into());
            if is_child {
                process.child_event.notify(usize::MAX);
            }
            if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP | Signal::SIGCONT) {
                // 进程级副作用，每个线程都得从等待点上起来响应
                for thread in inner.threads.values() {
                    thread.pending_hint
                        .store(PendingHint::Pending, Ordering::SeqCst);
                    thread.intr_event.notify(usize::MAX);
                }
            } else {
                // 叫醒第一个没有阻塞它的线程
                for thread in inner.threads.values() {
                    let unblocked = thread.lock_inner_with(|thread_inner| {
                        !thread_inner.blocked.contains(signal.into())
                    });
                    if unblocked {
                        thread.pending_hint
                            .store(PendingHint::Pending, Ordering::SeqCst);
                        thread.intr_event.notify(usize::MAX);
                        break;
                    }
                }
            }
        }
    }
}
