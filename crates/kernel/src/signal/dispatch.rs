//! 交付引擎：从待决队列里取出下一个要处理的信号并决定去向。
//!
//! 出队顺序：合并线程和进程的待决集、去掉阻塞位之后编号最小的
//! 信号优先，同一信号先查线程队列再查进程队列。队列里没有记录
//! 而只有裸待决位的标准信号，出队时就地合成全零的 `SigInfo`。
//!
//! 被跟踪的进程里，除 `KILL` 外所有出队的信号先送往跟踪器裁决

use atomic::Ordering;
use defines::signal::{KSignalAction, SigInfo};
use signal::{Completion, DefaultAction, SigInfoExt, Signal, SignalSet};
use triomphe::Arc;

use crate::{
    debug::{self, TracerVerdict},
    process,
    thread::{PendingHint, Thread},
};

pub(crate) enum Dequeued {
    /// 交付给用户 handler
    Handler(SigInfo, KSignalAction),
    /// 默认行为是终止进程
    Terminate { signal: Signal, dump: bool },
    /// 默认行为是停止进程
    Stop(Signal),
    None,
}

struct Picked {
    info: SigInfo,
    completion: Completion,
    traced: bool,
}

/// 从队列上摘下编号最小的未阻塞待决信号。
///
/// `override_blocked` 取代线程自己的掩码参与筛选（`suspend_execution`
/// 偷取时用）。子进程事件记录在取出 info 后重新挂到 unreaped 列表，
/// 以免 `wait_for_child` 找不到它
fn pick_one(thread: &Arc<Thread>, override_blocked: Option<SignalSet>) -> Option<Picked> {
    let process = &thread.process;
    process.lock_inner_with(|inner| {
        thread.lock_inner_with(|thread_inner| {
            // 先清提示再扫描，和置位端的「先入队再置提示」配对
            thread.pending_hint
                .store(PendingHint::None, Ordering::SeqCst);
            let blocked = override_blocked.unwrap_or(thread_inner.blocked);
            let candidates = (thread_inner.pending_set | inner.pending_set) - blocked;
            let signal = candidates.first_pending()?;

            let from_thread = thread_inner.pending_set.contains(signal.into());
            let (queue, set) = if from_thread {
                (&mut thread_inner.pending, &mut thread_inner.pending_set)
            } else {
                (&mut inner.pending, &mut inner.pending_set)
            };
            let (record, more) = queue.pop_signal(signal);
            if !more {
                set.remove(signal.into());
            }
            let (info, completion) = match record {
                Some(record) => {
                    if let Completion::ChildReap { .. } = record.completion {
                        // 事件本体留给 wait_for_child 回收
                        inner.unreaped.push_back(record.clone());
                        (record.info, Completion::Free)
                    } else {
                        (record.info, record.completion)
                    }
                }
                // 裸标准信号，就地合成
                None => (
                    SigInfo {
                        signo: signal.to_user(),
                        ..SigInfo::default()
                    },
                    Completion::Free,
                ),
            };

            if !((thread_inner.pending_set | inner.pending_set) - blocked).is_empty() {
                thread.pending_hint
                    .store(PendingHint::Pending, Ordering::SeqCst);
            }
            Some(Picked {
                info,
                completion,
                traced: inner.debug.tracer.is_some_and(|t| t != process.pid()),
            })
        })
    })
}

/// `suspend_execution` 的偷取路径：绕过默认处理和跟踪器，
/// 直接取走 `allowed` 中的一个待决信号
pub fn steal_pending_signal(thread: &Arc<Thread>, allowed: SignalSet) -> Option<SigInfo> {
    let allowed = allowed - SignalSet::NON_MASKABLE - SignalSet::from(Signal::SIGCONT);
    let picked = pick_one(thread, Some(!allowed))?;
    process::run_completion(&thread.process, picked.completion);
    debug!(
        "[{}:{}] stole {:?}",
        thread.process.pid(),
        thread.tid(),
        picked.info.signal()
    );
    Some(picked.info)
}

/// 出队一个信号并给出处置决定
pub(crate) async fn dispatch_one(thread: &Arc<Thread>) -> Dequeued {
    let process = &thread.process;
    loop {
        let Some(picked) = pick_one(thread, None) else {
            return Dequeued::None;
        };
        process::run_completion(process, picked.completion);
        let mut info = picked.info;

        if picked.traced && info.signal() != Some(Signal::SIGKILL) {
            match debug::tracer_break(thread, &mut info).await {
                TracerVerdict::Suppress => continue,
                TracerVerdict::Deliver => {}
            }
        }
        let Some(signal) = info.signal() else {
            continue;
        };

        let decision = process.lock_inner_with(|inner| {
            if inner.handled.contains(signal.into()) {
                return Some(Dequeued::Handler(info, *inner.signal_handlers.action(signal)));
            }
            if inner.ignored.contains(signal.into()) {
                return None;
            }
            match DefaultAction::of(signal) {
                DefaultAction::Ignore => None,
                DefaultAction::Terminate => Some(Dequeued::Terminate {
                    signal,
                    dump: false,
                }),
                DefaultAction::CoreDump => Some(Dequeued::Terminate { signal, dump: true }),
                DefaultAction::Stop => Some(Dequeued::Stop(signal)),
                // 继续的效果在产生时已经发生，交付阶段无事可做
                DefaultAction::Continue => None,
            }
        });
        match decision {
            Some(dequeued) => return dequeued,
            None => continue,
        }
    }
}

/// 修改线程的阻塞掩码。`KILL`、`STOP`、`CONT` 永远不会真的被阻塞。
///
/// 新挡住的线程级待决信号移交进程队列，给其他线程处理的机会
pub fn set_signal_mask(
    thread: &Arc<Thread>,
    op: defines::user::MaskOp,
    set: SignalSet,
) -> SignalSet {
    use defines::user::MaskOp;

    let set = set - SignalSet::NEVER_BLOCKED;
    let process = &thread.process;
    process.lock_inner_with(|inner| {
        thread.lock_inner_with(|thread_inner| {
            let old = thread_inner.blocked;
            match op {
                MaskOp::None => return old,
                MaskOp::Overwrite => thread_inner.blocked = set,
                MaskOp::Set => thread_inner.blocked |= set,
                MaskOp::Clear => thread_inner.blocked -= set,
            }
            let newly_blocked = thread_inner.blocked - old;
            move_signal_set_locked(inner, thread, thread_inner, newly_blocked);
            if !((thread_inner.pending_set | inner.pending_set) - thread_inner.blocked).is_empty()
            {
                thread.pending_hint
                    .store(PendingHint::Pending, Ordering::SeqCst);
            }
            old
        })
    })
}

/// 把线程待决集中 `moved` 部分的记录挪到进程队列上并唤醒能处理的线程
fn move_signal_set_locked(
    inner: &mut process::ProcessInner,
    thread: &Arc<Thread>,
    thread_inner: &mut crate::thread::ThreadInner,
    moved: SignalSet,
) {
    for signal in (moved & thread_inner.pending_set).signals() {
        let records = thread_inner.pending.drain_signal(signal);
        thread_inner.pending_set.remove(signal.into());
        if records.is_empty() {
            // 裸待决位也要转移
            inner.pending_set.insert(signal.into());
        }
        for record in records {
            inner.pending.push(record);
            inner.pending_set.insert(signal.into());
        }
        for other in inner.threads.values() {
            if other.tid() == thread.tid() {
                continue;
            }
            let unblocked =
                other.lock_inner_with(|other_inner| !other_inner.blocked.contains(signal.into()));
            if unblocked {
                other.pending_hint
                    .store(PendingHint::Pending, Ordering::SeqCst);
                other.intr_event.notify(usize::MAX);
                break;
            }
        }
    }
}

/// 线程退出前的信号清理：待决信号整体移交进程
pub fn cleanup_thread_signals(thread: &Arc<Thread>) {
    let process = &thread.process;
    process.lock_inner_with(|inner| {
        thread.lock_inner_with(|thread_inner| {
            let all = thread_inner.pending_set;
            move_signal_set_locked(inner, thread, thread_inner, all);
            thread_inner.restore_mask = None;
        });
    });
}

/// 供查询的待决集合：`(线程待决 ∪ 进程待决) ∩ 阻塞集`
pub fn pending_set(thread: &Arc<Thread>) -> SignalSet {
    let process = &thread.process;
    process.lock_inner_with(|inner| {
        thread.lock_inner_with(|thread_inner| {
            (thread_inner.pending_set | inner.pending_set) & thread_inner.blocked
        })
    })
}
