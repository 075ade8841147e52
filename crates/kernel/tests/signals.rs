//! 信号交付与应用的端到端测试：handler 往返、掩码、排队顺序、
//! 系统调用重启的两种走向。

mod common;

use common::*;
use defines::{
    error::errno,
    misc::WAIT_TIME_INDEFINITE,
    signal::{ContextFlags, KSignalAction, SigInfo, SignalActionFlags, SignalContext},
    syscall::{
        QUERY_TIME_COUNTER, RESTORE_CONTEXT, SEND_SIGNAL, SET_SIGNAL_BEHAVIOR, SET_SIGNAL_HANDLER,
        SUSPEND_EXECUTION, USER_LOCK,
    },
    user::{
        MaskKind, MaskOp, SendSignalParams, SignalBehaviorParams, SignalTarget, SuspendParams,
        UserLockOp, UserLockParams,
    },
};
use kernel::{process, signal::send, thread::Thread, trap};
use signal::{SigCode, SigInfoExt, Signal, SignalRecord, SignalSet};
use triomphe::Arc;

const HANDLER: usize = 0x5000;
const RESTORER: usize = 0x6000;

fn install_handler(thread: &Arc<Thread>, signal: Signal, extra_mask: SignalSet) {
    let action = KSignalAction {
        handler: HANDLER,
        restorer: RESTORER,
        mask: extra_mask.bits(),
        flags: SignalActionFlags::SA_RESTORER.bits(),
    };
    let ptr = put_params(&thread.process, SCRATCH + 0x400, &action);
    assert_eq!(
        do_syscall(thread, SET_SIGNAL_HANDLER, [signal.to_user(), ptr, 0, 0, 0, 0]),
        0
    );
}

fn send_to_self(signal: Signal) -> SendSignalParams {
    SendSignalParams {
        target: SignalTarget::CurrentProcess as usize,
        target_id: 0,
        signo: signal.to_user(),
        code: SigCode::User as isize,
        parameter: 0,
    }
}

#[test]
fn handler_apply_and_restore() {
    let (process, thread) = new_process("handler_apply_and_restore");
    install_handler(&thread, Signal::SIGUSR1, SignalSet::from(Signal::SIGUSR2));

    let pc0 = pc_of(&thread);
    let ptr = put_params(&process, SCRATCH, &send_to_self(Signal::SIGUSR1));
    let ret = do_syscall(&thread, SEND_SIGNAL, [ptr, 0, 0, 0, 0, 0]);

    // 交付已经发生：a0 是 handler 的第一个参数
    assert_eq!(ret as usize, Signal::SIGUSR1.to_user());
    assert_eq!(pc_of(&thread), HANDLER);
    let (ctx_ptr, ra) =
        thread.lock_inner_with(|inner| (inner.trap_context.syscall_args()[1], inner.trap_context.ra()));
    assert_eq!(ra, RESTORER);

    let ctx: SignalContext = process.read_user(ctx_ptr).unwrap();
    assert_eq!(ctx.trap.pc, pc0 + 4);
    assert_eq!(ctx.trap.a0(), 0, "被打断时 send_signal 已经返回 0");
    assert_eq!(ctx.info.signo, Signal::SIGUSR1.to_user());
    assert_eq!(ctx.info.sender_pid, process.pid());
    assert!(!ContextFlags::from_bits_truncate(ctx.flags).contains(ContextFlags::RESTART));

    // handler 执行期间掩蔽自身与 action.mask
    let blocked = thread.lock_inner_with(|inner| inner.blocked);
    assert!(blocked.contains(Signal::SIGUSR1.into()));
    assert!(blocked.contains(Signal::SIGUSR2.into()));

    let ret = do_syscall(&thread, RESTORE_CONTEXT, [ctx_ptr, 0, 0, 0, 0, 0]);
    assert_eq!(ret, 0);
    assert_eq!(pc_of(&thread), pc0 + 4);
    assert!(thread.lock_inner_with(|inner| inner.blocked).is_empty());
}

#[test]
fn transparent_restart_rewinds_pc() {
    let (process, thread) = new_process("transparent_restart");
    process.write_user(SCRATCH + 0x80, &0u32).unwrap();
    let params = UserLockParams {
        address: SCRATCH + 0x80,
        value: 0,
        op: UserLockOp::Wait as usize,
        timeout_ms: WAIT_TIME_INDEFINITE,
    };
    let ptr = put_params(&process, SCRATCH, &params);
    prepare_syscall(&thread, USER_LOCK, [ptr, 0, 0, 0, 0, 0]);

    let mut round = Stepper::new(trap::handle_user_trap(&thread));
    round.assert_pending();

    // 停止打断等待，继续之后没有 handler 介入，重启应当是透明的
    send::signal_process(
        &process,
        SignalRecord::new(SigInfo::user_sent(Signal::SIGSTOP, SigCode::User, 0, 0)),
    );
    round.assert_pending();
    send::signal_process(
        &process,
        SignalRecord::new(SigInfo::user_sent(Signal::SIGCONT, SigCode::User, 0, 0)),
    );
    assert!(round.expect_ready());

    // pc 指回系统调用指令，第一个参数原封未动
    assert_eq!(pc_of(&thread), ENTRY);
    assert_eq!(ret_val(&thread) as usize, ptr);
}

#[test]
fn restart_encoded_into_signal_context() {
    let (process, thread) = new_process("restart_encoded");
    install_handler(&thread, Signal::SIGUSR1, SignalSet::empty());
    let syscall_pc = pc_of(&thread);

    process.write_user(SCRATCH + 0x80, &0u32).unwrap();
    let params = UserLockParams {
        address: SCRATCH + 0x80,
        value: 0,
        op: UserLockOp::Wait as usize,
        timeout_ms: WAIT_TIME_INDEFINITE,
    };
    let ptr = put_params(&process, SCRATCH, &params);
    prepare_syscall(&thread, USER_LOCK, [ptr, 0, 0, 0, 0, 0]);

    let mut round = Stepper::new(trap::handle_user_trap(&thread));
    round.assert_pending();
    send::signal_process(
        &process,
        SignalRecord::new(SigInfo::user_sent(Signal::SIGUSR1, SigCode::User, 0, 0)),
    );
    assert!(round.expect_ready());

    assert_eq!(pc_of(&thread), HANDLER);
    let ctx_ptr = thread.lock_inner_with(|inner| inner.trap_context.syscall_args()[1]);
    let ctx: SignalContext = process.read_user(ctx_ptr).unwrap();
    assert!(ContextFlags::from_bits_truncate(ctx.flags).contains(ContextFlags::RESTART));
    // 保存的 a0 预置为 EINTR，原第一个参数挪进了保存的 a1
    assert_eq!(ctx.trap.a0() as isize, errno::EINTR.as_isize());
    assert_eq!(ctx.trap.syscall_args()[1], ptr);

    // handler 不动 RESTART 位：恢复后回退到系统调用指令重新执行
    let ret = do_syscall(&thread, RESTORE_CONTEXT, [ctx_ptr, 0, 0, 0, 0, 0]);
    assert_eq!(ret as usize, ptr);
    assert_eq!(pc_of(&thread), syscall_pc);
}

#[test]
fn cleared_restart_flag_degrades_to_eintr() {
    let (process, thread) = new_process("restart_cleared");
    install_handler(&thread, Signal::SIGUSR1, SignalSet::empty());
    let syscall_pc = pc_of(&thread);

    process.write_user(SCRATCH + 0x80, &0u32).unwrap();
    let params = UserLockParams {
        address: SCRATCH + 0x80,
        value: 0,
        op: UserLockOp::Wait as usize,
        timeout_ms: WAIT_TIME_INDEFINITE,
    };
    let ptr = put_params(&process, SCRATCH, &params);
    prepare_syscall(&thread, USER_LOCK, [ptr, 0, 0, 0, 0, 0]);

    let mut round = Stepper::new(trap::handle_user_trap(&thread));
    round.assert_pending();
    send::signal_process(
        &process,
        SignalRecord::new(SigInfo::user_sent(Signal::SIGUSR1, SigCode::User, 0, 0)),
    );
    assert!(round.expect_ready());

    let ctx_ptr = thread.lock_inner_with(|inner| inner.trap_context.syscall_args()[1]);
    let mut ctx: SignalContext = process.read_user(ctx_ptr).unwrap();
    ctx.flags = 0;
    process.write_user(ctx_ptr, &ctx).unwrap();

    let ret = do_syscall(&thread, RESTORE_CONTEXT, [ctx_ptr, 0, 0, 0, 0, 0]);
    assert_eq!(ret, errno::EINTR.as_isize());
    assert_eq!(pc_of(&thread), syscall_pc + 4);
}

#[test]
fn blocked_signal_stays_pending_until_unmasked() {
    let (process, thread) = new_process("blocked_until_unmasked");
    install_handler(&thread, Signal::SIGUSR2, SignalSet::empty());

    let behavior = SignalBehaviorParams {
        op: MaskOp::Set as usize,
        kind: MaskKind::Blocked as usize,
        set: SignalSet::from(Signal::SIGUSR2).bits(),
    };
    let ptr = put_params(&process, SCRATCH, &behavior);
    assert_eq!(do_syscall(&thread, SET_SIGNAL_BEHAVIOR, [ptr, 0, 0, 0, 0, 0]), 0);

    let send_ptr = put_params(&process, SCRATCH + 0x100, &send_to_self(Signal::SIGUSR2));
    assert_eq!(do_syscall(&thread, SEND_SIGNAL, [send_ptr, 0, 0, 0, 0, 0]), 0);
    assert_ne!(pc_of(&thread), HANDLER, "阻塞的信号不能交付");

    // 待决集可见
    let query = SignalBehaviorParams {
        op: MaskOp::None as usize,
        kind: MaskKind::Pending as usize,
        set: 0,
    };
    let ptr = put_params(&process, SCRATCH, &query);
    assert_eq!(do_syscall(&thread, SET_SIGNAL_BEHAVIOR, [ptr, 0, 0, 0, 0, 0]), 0);
    let out: SignalBehaviorParams = process.read_user(ptr).unwrap();
    assert!(SignalSet::from_bits_truncate(out.set).contains(Signal::SIGUSR2.into()));

    // 解除阻塞的同一回合就交付
    let unblock = SignalBehaviorParams {
        op: MaskOp::Clear as usize,
        kind: MaskKind::Blocked as usize,
        set: SignalSet::from(Signal::SIGUSR2).bits(),
    };
    let ptr = put_params(&process, SCRATCH, &unblock);
    do_syscall(&thread, SET_SIGNAL_BEHAVIOR, [ptr, 0, 0, 0, 0, 0]);
    assert_eq!(pc_of(&thread), HANDLER);
    assert_eq!(ret_val(&thread) as usize, Signal::SIGUSR2.to_user());
}

/// 标准信号编号优先于实时信号，标准信号折叠，实时信号按序排队
#[test]
fn dequeue_order_and_coalescing() {
    let (process, thread) = new_process("dequeue_order");
    let rt0 = Signal::SIGRTMIN;
    let rt1 = Signal::from_user(Signal::SIGRTMIN.to_user() + 1).unwrap();

    let block_all = SignalBehaviorParams {
        op: MaskOp::Overwrite as usize,
        kind: MaskKind::Blocked as usize,
        set: (!SignalSet::empty()).bits(),
    };
    let ptr = put_params(&process, SCRATCH, &block_all);
    assert_eq!(do_syscall(&thread, SET_SIGNAL_BEHAVIOR, [ptr, 0, 0, 0, 0, 0]), 0);

    let send_one = |signal: Signal, code: SigCode, parameter: usize| {
        let params = SendSignalParams {
            parameter,
            code: code as isize,
            ..send_to_self(signal)
        };
        let ptr = put_params(&process, SCRATCH + 0x100, &params);
        assert_eq!(do_syscall(&thread, SEND_SIGNAL, [ptr, 0, 0, 0, 0, 0]), 0);
    };
    send_one(rt1, SigCode::Queue, 111);
    send_one(rt1, SigCode::Queue, 222);
    send_one(Signal::SIGUSR1, SigCode::User, 0);
    send_one(Signal::SIGUSR1, SigCode::User, 0);
    send_one(rt0, SigCode::Queue, 9);

    let wanted =
        SignalSet::from(Signal::SIGUSR1) | SignalSet::from(rt0) | SignalSet::from(rt1);
    let steal_one = || {
        let params = SuspendParams {
            op: MaskOp::None as usize,
            mask: wanted.bits(),
            timeout_ms: 0,
            info_ptr: SCRATCH + 0x200,
        };
        let ptr = put_params(&process, SCRATCH + 0x300, &params);
        let ret = do_syscall(&thread, SUSPEND_EXECUTION, [ptr, 0, 0, 0, 0, 0]);
        (ret, process.read_user::<SigInfo>(SCRATCH + 0x200).unwrap())
    };

    let (ret, info) = steal_one();
    assert_eq!(ret as usize, Signal::SIGUSR1.to_user(), "标准信号优先");
    assert_eq!(info.sig_code(), Some(SigCode::User));

    let (ret, info) = steal_one();
    assert_eq!(ret as usize, rt0.to_user(), "两次 SIGUSR1 折叠成一次");
    assert_eq!(info.parameter, 9);

    let (ret, info) = steal_one();
    assert_eq!(ret as usize, rt1.to_user());
    assert_eq!(info.parameter, 111, "实时信号先到先取");
    let (ret, info) = steal_one();
    assert_eq!(ret as usize, rt1.to_user());
    assert_eq!(info.parameter, 222);

    let (ret, _) = steal_one();
    assert_eq!(ret, errno::EAGAIN.as_isize());
}

#[test]
fn suspend_until_signal_returns_eintr() {
    let (process, thread) = new_process("suspend_eintr");
    install_handler(&thread, Signal::SIGUSR1, SignalSet::empty());

    let params = SuspendParams {
        op: MaskOp::Overwrite as usize,
        mask: (!SignalSet::from(Signal::SIGUSR1)).bits(),
        timeout_ms: WAIT_TIME_INDEFINITE,
        info_ptr: 0,
    };
    let ptr = put_params(&process, SCRATCH, &params);
    prepare_syscall(&thread, SUSPEND_EXECUTION, [ptr, 0, 0, 0, 0, 0]);
    let mut round = Stepper::new(trap::handle_user_trap(&thread));
    round.assert_pending();

    send::signal_process(
        &process,
        SignalRecord::new(SigInfo::user_sent(Signal::SIGUSR1, SigCode::User, 0, 0)),
    );
    assert!(round.expect_ready());
    assert_eq!(pc_of(&thread), HANDLER);

    // 压栈的掩码是挂起之前的原掩码，而非临时掩码
    let ctx_ptr = thread.lock_inner_with(|inner| inner.trap_context.syscall_args()[1]);
    let ctx: SignalContext = process.read_user(ctx_ptr).unwrap();
    assert_eq!(SignalSet::from_bits_truncate(ctx.mask), SignalSet::empty());
    assert_eq!(ctx.trap.a0() as isize, errno::EINTR.as_isize());

    let ret = do_syscall(&thread, RESTORE_CONTEXT, [ctx_ptr, 0, 0, 0, 0, 0]);
    assert_eq!(ret, errno::EINTR.as_isize());
    assert!(thread.lock_inner_with(|inner| inner.blocked).is_empty());
}

/// 停止要收齐每个线程，包括睡在等待点上的
#[test]
fn stop_gathers_every_thread_at_the_barrier() {
    let (process, thread_a) = new_process("stop_barrier");
    let thread_b = process::spawn_thread(&process, ENTRY, STACK_TOP - 0x1000);

    // B 先睡进挂起等待
    let params = SuspendParams {
        op: MaskOp::None as usize,
        mask: 0,
        timeout_ms: WAIT_TIME_INDEFINITE,
        info_ptr: 0,
    };
    let ptr = put_params(&process, SCRATCH + 0x100, &params);
    prepare_syscall(&thread_b, SUSPEND_EXECUTION, [ptr, 0, 0, 0, 0, 0]);
    let mut round_b = Stepper::new(trap::handle_user_trap(&thread_b));
    round_b.assert_pending();

    send::signal_process(
        &process,
        SignalRecord::new(SigInfo::user_sent(Signal::SIGSTOP, SigCode::User, 0, 0)),
    );

    // B 被从等待点叫醒，赶到预检里停下
    round_b.assert_pending();
    assert_eq!(process.lock_inner_with(|inner| inner.stopped_count), 1);
    assert!(!process.all_stopped_event.is_signaled());

    // A 也走到陷入边界后停下，此时才算停齐
    prepare_syscall(&thread_a, QUERY_TIME_COUNTER, [0; 6]);
    let mut round_a = Stepper::new(trap::handle_user_trap(&thread_a));
    round_a.assert_pending();
    assert_eq!(process.lock_inner_with(|inner| inner.stopped_count), 2);
    assert!(process.all_stopped_event.is_signaled());

    send::signal_process(
        &process,
        SignalRecord::new(SigInfo::user_sent(Signal::SIGCONT, SigCode::User, 0, 0)),
    );
    assert!(round_a.expect_ready());
    assert!(round_b.expect_ready());
    assert_eq!(ret_val(&thread_b), errno::EINTR.as_isize());
    assert_eq!(process.lock_inner_with(|inner| inner.stopped_count), 0);
}

#[test]
fn unwritable_stack_escalates_to_sigsegv() {
    let (process, thread) = new_process("bad_stack");
    install_handler(&thread, Signal::SIGUSR1, SignalSet::empty());
    // 把栈指到映射区间外，压栈必然失败
    thread.lock_inner_with(|inner| inner.trap_context.set_sp(0x800));

    let ptr = put_params(&process, SCRATCH, &send_to_self(Signal::SIGUSR1));
    do_syscall_expect_exit(&thread, SEND_SIGNAL, [ptr, 0, 0, 0, 0, 0]);

    assert!(process.is_zombie());
    let exit = process.lock_inner_with(|inner| inner.exit).unwrap();
    assert_eq!(exit.reason, SigCode::ChildDumped);
    assert_eq!(exit.status, Signal::SIGSEGV.to_user());
}

/// 栈顶低于一个现场的大小，压栈前的减法就会越界
#[test]
fn stack_smaller_than_context_escalates_to_sigsegv() {
    let (process, thread) = new_process("tiny_stack");
    install_handler(&thread, Signal::SIGUSR1, SignalSet::empty());
    thread.lock_inner_with(|inner| inner.trap_context.set_sp(0x20));

    let ptr = put_params(&process, SCRATCH, &send_to_self(Signal::SIGUSR1));
    do_syscall_expect_exit(&thread, SEND_SIGNAL, [ptr, 0, 0, 0, 0, 0]);

    assert!(process.is_zombie());
    let exit = process.lock_inner_with(|inner| inner.exit).unwrap();
    assert_eq!(exit.reason, SigCode::ChildDumped);
    assert_eq!(exit.status, Signal::SIGSEGV.to_user());
}
