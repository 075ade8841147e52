//! 同步应用：把信号现场压入用户栈、改写陷入现场进入 handler，
//! 以及 `restore_context` 的逆操作。
//!
//! 被重启打断的系统调用把「重启所需的一切」编码进压栈的现场里：
//! 保存的 a0 预置为 `EINTR`，原本的第一个参数挪到保存的 a1，
//! 并设置 [`ContextFlags::RESTART`]。这样 handler 返回时不管用户
//! 有没有清掉 RESTART 位，内核都不需要额外记忆：
//! 位还在就回退 pc 重新执行，被清掉就照常以 `EINTR` 返回

use core::mem;

use defines::{
    error::{errno, KResult},
    signal::{
        ContextFlags, KSignalAction, SigInfo, SignalActionFlags, SignalContext,
    },
    trap_context::{STATUS_INTERRUPTS_ON, STATUS_USER_MODE, SYSCALL_INSTRUCTION_LEN},
    user::MaskOp,
};
use signal::{SigInfoExt, Signal, SignalRecord, SignalSet};
use triomphe::Arc;

use crate::{
    signal::{dispatch, send},
    thread::Thread,
};

/// 把 `info` 交付给 `action` 指定的 handler。
///
/// 压栈失败说明用户栈已不可用，强制注入 `SIGSEGV` 走默认终止
pub fn apply_synchronous_signal(thread: &Arc<Thread>, info: &SigInfo, action: &KSignalAction) {
    let Some(signal) = info.signal() else {
        return;
    };
    let process = &thread.process;
    let mut fault = false;
    thread.lock_inner_with(|inner| {
        let restart = mem::take(&mut inner.restart_pending);
        let saved_mask = inner.restore_mask.take().unwrap_or(inner.blocked);

        let mut saved_trap = inner.trap_context;
        let mut flags = ContextFlags::empty();
        if restart {
            // a0 还没被写入返回值，仍是原始的第一个参数
            saved_trap.set_a1(saved_trap.a0());
            saved_trap.set_a0(errno::EINTR.as_isize() as usize);
            flags |= ContextFlags::RESTART;
        }
        let context = SignalContext {
            flags: flags.bits(),
            next: 0,
            mask: saved_mask.bits(),
            info: *info,
            trap: saved_trap,
        };
        // 栈顶可能低到装不下一个现场
        let Some(sp) = inner.trap_context.sp().checked_sub(mem::size_of::<SignalContext>())
        else {
            fault = true;
            return;
        };
        let sp = sp & !0xf;
        if process.write_user(sp, &context).is_err() {
            fault = true;
            return;
        }

        inner.trap_context.set_sp(sp);
        inner.trap_context.pc = action.handler;
        inner.trap_context.set_a0(info.signo);
        inner.trap_context.set_a1(sp);
        let action_flags = action.flags();
        inner.trap_context.set_ra(if action_flags.contains(SignalActionFlags::SA_RESTORER) {
            action.restorer
        } else {
            0
        });

        let mut blocked = inner.blocked | SignalSet::from_bits_truncate(action.mask);
        if !action_flags.contains(SignalActionFlags::SA_NODEFER) {
            blocked.insert(signal.into());
        }
        inner.blocked = blocked - SignalSet::NEVER_BLOCKED;
    });
    if fault {
        warn!(
            "[{}:{}] no room for signal context, killing",
            process.pid(),
            thread.tid()
        );
        send::signal_thread(
            thread,
            SignalRecord::new(SigInfo::for_kernel(Signal::SIGSEGV)),
            true,
        );
    } else {
        debug!(
            "[{}:{}] {:?} applied, handler {:#x}",
            process.pid(),
            thread.tid(),
            signal,
            action.handler
        );
    }
}

/// `restore_context`：handler 返回时从用户栈读回现场。
///
/// 返回值是恢复后 a0 的内容，交由系统调用出口写回
pub fn restore_context(thread: &Arc<Thread>, context_ptr: usize) -> KResult {
    let process = &thread.process;
    let mut context: SignalContext = process.read_user(context_ptr)?;

    // 清洗状态字，用户不能借恢复现场回到内核态
    context.trap.status = STATUS_USER_MODE | (context.trap.status & STATUS_INTERRUPTS_ON);

    dispatch::set_signal_mask(
        thread,
        MaskOp::Overwrite,
        SignalSet::from_bits_truncate(context.mask),
    );

    let flags = ContextFlags::from_bits_truncate(context.flags);
    let a0 = thread.lock_inner_with(|inner| {
        inner.trap_context = context.trap;
        if flags.contains(ContextFlags::RESTART) {
            // 重新执行系统调用：回退 pc，从保存的 a1 找回原参数
            inner.trap_context.pc -= SYSCALL_INSTRUCTION_LEN;
            let arg0 = context.trap.syscall_args()[1];
            inner.trap_context.set_a0(arg0);
        }
        inner.trap_context.a0()
    });
    Ok(a0 as isize)
}
