//! 信号类系统调用：处置安装、掩码操作、发送、挂起等待与现场恢复。

use alloc::vec::Vec;

use defines::{
    error::{errno, KResult},
    misc::WAIT_TIME_INDEFINITE,
    signal::{KSignalAction, SigInfo, SIG_DFL, SIG_IGN},
    user::{MaskKind, MaskOp, SendSignalParams, SignalBehaviorParams, SignalTarget, SuspendParams},
};
use signal::{SigCode, SigInfoExt, Signal, SignalRecord, SignalSet};
use triomphe::Arc;

use crate::{
    executor::{self, WaitOutcome},
    process,
    signal::{apply, send},
    thread::Thread,
    time,
};

/// 安装或查询一个信号的 handler。
///
/// `new_ptr` 为空表示只查询；`old_ptr` 非空时写回旧的 action
pub fn sys_set_signal_handler(
    thread: &Arc<Thread>,
    signo: usize,
    new_ptr: usize,
    old_ptr: usize,
) -> KResult {
    let signal = Signal::from_user(signo).ok_or(errno::EINVAL)?;
    let process = &thread.process;
    let new_action: Option<KSignalAction> = if new_ptr != 0 {
        if signal.is_unalterable() {
            return Err(errno::EINVAL);
        }
        Some(process.read_user(new_ptr)?)
    } else {
        None
    };

    let mut discarded = Vec::new();
    let old = process.lock_inner_with(|inner| {
        let old = *inner.signal_handlers.action(signal);
        if let Some(action) = new_action {
            *inner.signal_handlers.action_mut(signal) = action;
            match action.handler {
                SIG_DFL => {
                    inner.handled.remove(signal.into());
                    inner.ignored.remove(signal.into());
                }
                SIG_IGN => {
                    inner.handled.remove(signal.into());
                    inner.ignored.insert(signal.into());
                    // 设为忽略的同时丢弃已待决的实例
                    send::discard_set_locked(inner, SignalSet::from(signal), &mut discarded);
                }
                _ => {
                    inner.ignored.remove(signal.into());
                    inner.handled.insert(signal.into());
                }
            }
        }
        old
    });
    for record in discarded {
        process::run_completion(process, record.completion);
    }
    if old_ptr != 0 {
        process.write_user(old_ptr, &old)?;
    }
    Ok(0)
}

pub fn sys_restore_context(thread: &Arc<Thread>, context_ptr: usize) -> KResult {
    apply::restore_context(thread, context_ptr)
}

pub fn sys_send_signal(thread: &Arc<Thread>, params_ptr: usize) -> KResult {
    let process = &thread.process;
    let params: SendSignalParams = process.read_user(params_ptr)?;
    let target = SignalTarget::try_from(params.target).map_err(|_| errno::EINVAL)?;
    let signal = Signal::from_user(params.signo).ok_or(errno::EINVAL)?;
    // 用户态不能伪造内核来源的 code
    let code = SigCode::from_user(params.code).ok_or(errno::EPERM)?;
    let sender_uid = process.lock_inner_with(|inner| inner.creds.real_uid);
    let info = SigInfo {
        parameter: params.parameter,
        ..SigInfo::user_sent(signal, code, process.pid(), sender_uid)
    };

    match target {
        SignalTarget::Process => send::signal_pid(process, params.target_id, info)?,
        SignalTarget::Thread => {
            // 只允许指向自己进程内的线程
            let target = process.thread(params.target_id).ok_or(errno::ESRCH)?;
            send::signal_thread(&target, SignalRecord::new(info), false);
        }
        SignalTarget::AllProcesses => send::signal_all(process, info)?,
        SignalTarget::ProcessGroup => send::signal_process_group(process, params.target_id, info)?,
        SignalTarget::CurrentProcess => send::signal_pid(process, process.pid(), info)?,
        SignalTarget::CurrentProcessGroup => {
            let pgid = process.lock_inner_with(|inner| inner.pgid);
            send::signal_process_group(process, pgid, info)?;
        }
    }
    Ok(0)
}

/// 操作阻塞、忽略、处理中的某个集合，或查询待决集。
///
/// 原集合写回 `params.set`
pub fn sys_set_signal_behavior(thread: &Arc<Thread>, params_ptr: usize) -> KResult {
    let process = &thread.process;
    let mut params: SignalBehaviorParams = process.read_user(params_ptr)?;
    let op = MaskOp::try_from(params.op).map_err(|_| errno::EINVAL)?;
    let kind = MaskKind::try_from(params.kind).map_err(|_| errno::EINVAL)?;
    let set = SignalSet::from_bits_truncate(params.set);

    let old = match kind {
        MaskKind::Blocked => crate::signal::set_signal_mask(thread, op, set),
        MaskKind::Pending => crate::signal::pending_set(thread),
        MaskKind::Ignored => update_disposition_set(thread, true, op, set),
        MaskKind::Handled => update_disposition_set(thread, false, op, set),
    };
    params.set = old.bits();
    process.write_user(params_ptr, &params)?;
    Ok(0)
}

fn apply_mask_op(old: SignalSet, op: MaskOp, set: SignalSet) -> SignalSet {
    match op {
        MaskOp::None => old,
        MaskOp::Overwrite => set,
        MaskOp::Set => old | set,
        MaskOp::Clear => old - set,
    }
}

/// 批量改写忽略集或处理集。两个集合互斥，写入一边要从另一边清掉
fn update_disposition_set(
    thread: &Arc<Thread>,
    ignore: bool,
    op: MaskOp,
    set: SignalSet,
) -> SignalSet {
    let process = &thread.process;
    let set = set - SignalSet::NON_MASKABLE;
    let mut discarded = Vec::new();
    let old = process.lock_inner_with(|inner| {
        if ignore {
            let old = inner.ignored;
            let new = apply_mask_op(old, op, set);
            inner.ignored = new;
            inner.handled -= new;
            send::discard_set_locked(inner, new - old, &mut discarded);
            old
        } else {
            let old = inner.handled;
            inner.handled = apply_mask_op(old, op, set);
            inner.ignored -= inner.handled;
            old
        }
    });
    for record in discarded {
        process::run_completion(process, record.completion);
    }
    old
}

/// 挂起执行直到信号到来。
///
/// `info_ptr` 非空时是定时等待集合（偷取）形式：`mask` 里的信号
/// 不交付，直接从队列里取走写回用户空间；被集合外的信号打断则在
/// handler 之后带着剩余超时重启。`info_ptr` 为空时是经典的挂起
/// 形式，按 `op` 临时改写阻塞集，任何交付都以 `EINTR` 结束等待
pub async fn sys_suspend_execution(thread: &Arc<Thread>, params_ptr: usize) -> KResult {
    let process = &thread.process;
    let mut params: SuspendParams = process.read_user(params_ptr)?;
    let op = MaskOp::try_from(params.op).map_err(|_| errno::EINVAL)?;
    let set = SignalSet::from_bits_truncate(params.mask);
    let steal = params.info_ptr != 0;

    if steal {
        if let Some(info) = crate::signal::steal_pending_signal(thread, set) {
            process.write_user(params.info_ptr, &info)?;
            return Ok(info.signo as isize);
        }
        if params.timeout_ms == 0 {
            return Err(errno::EAGAIN);
        }
    }

    // 偷取形式等待的是集合内的信号，临时解除它们的阻塞好被唤醒；
    // 挂起形式按请求的操作改写掩码
    let original = if steal {
        crate::signal::set_signal_mask(thread, MaskOp::Clear, set)
    } else {
        crate::signal::set_signal_mask(thread, op, set)
    };

    let deadline =
        (params.timeout_ms != WAIT_TIME_INDEFINITE).then(|| time::now_ms() + params.timeout_ms);
    loop {
        let listener = thread.intr_event.listen();
        let timeout = match deadline {
            Some(deadline) => {
                let now = time::now_ms();
                if now >= deadline {
                    crate::signal::set_signal_mask(thread, MaskOp::Overwrite, original);
                    return Err(errno::ETIMEDOUT);
                }
                Some(deadline - now)
            }
            None => None,
        };
        match executor::wait_interruptible_timeout(thread, listener, timeout).await {
            WaitOutcome::TimedOut => {
                crate::signal::set_signal_mask(thread, MaskOp::Overwrite, original);
                return Err(errno::ETIMEDOUT);
            }
            WaitOutcome::Woken => continue,
            WaitOutcome::Interrupted => break,
        }
    }

    if steal {
        crate::signal::set_signal_mask(thread, MaskOp::Overwrite, original);
        if let Some(info) = crate::signal::steal_pending_signal(thread, set) {
            process.write_user(params.info_ptr, &info)?;
            return Ok(info.signo as isize);
        }
        if let Some(deadline) = deadline {
            params.timeout_ms = deadline.saturating_sub(time::now_ms()).max(1);
            process.write_user(params_ptr, &params)?;
        }
        return Err(errno::RESTART);
    }

    // handler 在临时掩码下交付，交付（或恢复现场）时换回原掩码
    thread.lock_inner_with(|inner| inner.restore_mask = Some(original));
    Err(errno::EINTR)
}
