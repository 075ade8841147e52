//! 进程生命周期与子进程事件：fork、退出、`wait_for_child` 回收、
//! 停止与继续的上报、发送权限。

mod common;

use common::*;
use defines::{
    error::errno,
    misc::ResourceUsage,
    signal::{KSignalAction, SignalActionFlags},
    syscall::{EXIT_PROCESS, SEND_SIGNAL, SET_SIGNAL_HANDLER, WAIT_FOR_CHILD},
    user::{SendSignalParams, SignalTarget, WaitChildParams, WaitFlags},
};
use kernel::{
    process::{Process, PROCESS_TABLE},
    thread::Thread,
    time, trap,
};
use signal::{SigCode, Signal};
use triomphe::Arc;

const HANDLER: usize = 0x5000;

fn wait_once(thread: &Arc<Thread>, flags: WaitFlags, pid: isize, usage_ptr: usize) -> (isize, WaitChildParams) {
    let params = WaitChildParams {
        flags: flags.bits(),
        pid,
        exit_value: 0,
        reason: 0,
        usage_ptr,
    };
    let ptr = put_params(&thread.process, SCRATCH, &params);
    let ret = do_syscall(thread, WAIT_FOR_CHILD, [ptr, 0, 0, 0, 0, 0]);
    (ret, thread.process.read_user(ptr).unwrap())
}

fn send_to_pid(thread: &Arc<Thread>, pid: usize, signal: Signal) -> isize {
    let params = SendSignalParams {
        target: SignalTarget::Process as usize,
        target_id: pid,
        signo: signal.to_user(),
        code: SigCode::User as isize,
        parameter: 0,
    };
    let ptr = put_params(&thread.process, SCRATCH + 0x100, &params);
    do_syscall(thread, SEND_SIGNAL, [ptr, 0, 0, 0, 0, 0])
}

#[test]
fn fork_exit_wait_reaps() {
    let (parent, parent_thread) = new_process("fork_exit_wait");
    let child = parent.fork(&parent_thread);
    let child_thread = child.main_thread().unwrap();
    let child_pid = child.pid();

    time::add_cpu_time(&child_thread, 12, 3);
    do_syscall_expect_exit(&child_thread, EXIT_PROCESS, [7, 0, 0, 0, 0, 0]);
    assert!(child.is_zombie());

    let (ret, out) = wait_once(&parent_thread, WaitFlags::EXITED, -1, SCRATCH + 0x300);
    assert_eq!(ret, 0);
    assert_eq!(out.pid, child_pid as isize);
    assert_eq!(out.reason, SigCode::ChildExited as usize);
    assert_eq!(out.exit_value, 7);
    let usage: ResourceUsage = parent.read_user(SCRATCH + 0x300).unwrap();
    assert_eq!(usage.user_ms, 12);
    assert_eq!(usage.kernel_ms, 3);

    // 已经回收干净
    assert!(PROCESS_TABLE.get(child_pid).is_none());
    assert!(parent.lock_inner_with(|inner| inner.children.is_empty()));
    let (ret, _) = wait_once(&parent_thread, WaitFlags::EXITED, -1, 0);
    assert_eq!(ret, errno::ECHILD.as_isize());
}

#[test]
fn nonblocking_wait_and_peek() {
    let (parent, parent_thread) = new_process("nonblocking_wait");
    let child = parent.fork(&parent_thread);
    let child_pid = child.pid();

    let (ret, _) = wait_once(
        &parent_thread,
        WaitFlags::EXITED | WaitFlags::RETURN_IMMEDIATELY,
        -1,
        0,
    );
    assert_eq!(ret, errno::EAGAIN.as_isize());

    let child_thread = child.main_thread().unwrap();
    do_syscall_expect_exit(&child_thread, EXIT_PROCESS, [0, 0, 0, 0, 0, 0]);

    // 只查看，事件和僵尸都留在原处
    let (ret, out) = wait_once(
        &parent_thread,
        WaitFlags::EXITED | WaitFlags::DONT_DISCARD,
        -1,
        0,
    );
    assert_eq!(ret, 0);
    assert_eq!(out.pid, child_pid as isize);
    assert!(PROCESS_TABLE.get(child_pid).is_some());

    let (ret, _) = wait_once(&parent_thread, WaitFlags::EXITED, child_pid as isize, 0);
    assert_eq!(ret, 0);
    assert!(PROCESS_TABLE.get(child_pid).is_none());
}

#[test]
fn wait_blocks_until_child_exits() {
    let (parent, parent_thread) = new_process("wait_blocks");
    let child = parent.fork(&parent_thread);
    let child_thread = child.main_thread().unwrap();

    let params = WaitChildParams {
        flags: WaitFlags::EXITED.bits(),
        pid: -1,
        exit_value: 0,
        reason: 0,
        usage_ptr: 0,
    };
    let ptr = put_params(&parent, SCRATCH, &params);
    prepare_syscall(&parent_thread, WAIT_FOR_CHILD, [ptr, 0, 0, 0, 0, 0]);
    let mut round = Stepper::new(trap::handle_user_trap(&parent_thread));
    round.assert_pending();

    do_syscall_expect_exit(&child_thread, EXIT_PROCESS, [3, 0, 0, 0, 0, 0]);
    assert!(round.expect_ready());
    let out: WaitChildParams = parent.read_user(ptr).unwrap();
    assert_eq!(out.pid, child.pid() as isize);
    assert_eq!(out.exit_value, 3);
}

#[test]
fn killed_child_reports_signal() {
    let (parent, parent_thread) = new_process("killed_child");
    let child = parent.fork(&parent_thread);
    let child_thread = child.main_thread().unwrap();

    assert_eq!(send_to_pid(&parent_thread, child.pid(), Signal::SIGKILL), 0);
    let mut round = Stepper::new(trap::return_to_user(&child_thread));
    assert!(!round.expect_ready());
    assert!(child.is_zombie());

    let (ret, out) = wait_once(&parent_thread, WaitFlags::EXITED, -1, 0);
    assert_eq!(ret, 0);
    assert_eq!(out.reason, SigCode::ChildKilled as usize);
    assert_eq!(out.exit_value, Signal::SIGKILL.to_user());
    let _ = parent;
}

#[test]
fn stop_and_continue_reported_to_parent() {
    let (parent, parent_thread) = new_process("stop_continue");
    let child = parent.fork(&parent_thread);
    let child_thread = child.main_thread().unwrap();

    assert_eq!(send_to_pid(&parent_thread, child.pid(), Signal::SIGSTOP), 0);
    let mut round = Stepper::new(trap::return_to_user(&child_thread));
    round.assert_pending();

    let (ret, out) = wait_once(&parent_thread, WaitFlags::STOPPED, -1, 0);
    assert_eq!(ret, 0);
    assert_eq!(out.reason, SigCode::ChildStopped as usize);
    assert_eq!(out.exit_value, Signal::SIGSTOP.to_user());

    assert_eq!(send_to_pid(&parent_thread, child.pid(), Signal::SIGCONT), 0);
    assert!(round.expect_ready());

    let (ret, out) = wait_once(&parent_thread, WaitFlags::CONTINUED, -1, 0);
    assert_eq!(ret, 0);
    assert_eq!(out.reason, SigCode::ChildContinued as usize);
}

#[test]
fn orphan_exit_vanishes_silently() {
    let (process, thread) = new_process("orphan");
    let pid = process.pid();
    do_syscall_expect_exit(&thread, EXIT_PROCESS, [0, 0, 0, 0, 0, 0]);
    assert!(process.is_zombie());
    // 没有父进程等待，进程表里不留僵尸
    assert!(PROCESS_TABLE.get(pid).is_none());
}

#[test]
fn group_signal_reaches_all_members() {
    let (parent, parent_thread) = new_process("group_signal");
    let action = KSignalAction {
        handler: HANDLER,
        restorer: 0,
        mask: 0,
        flags: SignalActionFlags::empty().bits(),
    };
    let ptr = put_params(&parent, SCRATCH + 0x400, &action);
    assert_eq!(
        do_syscall(
            &parent_thread,
            SET_SIGNAL_HANDLER,
            [Signal::SIGUSR1.to_user(), ptr, 0, 0, 0, 0]
        ),
        0
    );
    let child = parent.fork(&parent_thread);
    let child_thread = child.main_thread().unwrap();

    let params = SendSignalParams {
        target: SignalTarget::CurrentProcessGroup as usize,
        target_id: 0,
        signo: Signal::SIGUSR1.to_user(),
        code: SigCode::User as isize,
        parameter: 0,
    };
    let ptr = put_params(&parent, SCRATCH + 0x100, &params);
    do_syscall(&parent_thread, SEND_SIGNAL, [ptr, 0, 0, 0, 0, 0]);
    assert_eq!(pc_of(&parent_thread), HANDLER);

    let mut round = Stepper::new(trap::return_to_user(&child_thread));
    assert!(round.expect_ready());
    assert_eq!(pc_of(&child_thread), HANDLER);
}

#[test]
fn unprivileged_sender_needs_matching_uid() {
    let (parent, parent_thread) = new_process("perm_parent");
    let child: Arc<Process> = parent.fork(&parent_thread);

    parent.lock_inner_with(|inner| {
        inner.creds.permissions = kernel::process::Permissions::empty();
        inner.creds.real_uid = 5;
        inner.creds.effective_uid = 5;
        inner.creds.saved_uid = 5;
    });
    child.lock_inner_with(|inner| {
        inner.creds.real_uid = 7;
        inner.creds.effective_uid = 7;
        inner.creds.saved_uid = 7;
    });

    assert_eq!(
        send_to_pid(&parent_thread, child.pid(), Signal::SIGUSR1),
        errno::EPERM.as_isize()
    );
    // 同一会话内 SIGCONT 放行
    assert_eq!(send_to_pid(&parent_thread, child.pid(), Signal::SIGCONT), 0);
}
