//! 用户态锁字的等待与唤醒。

mod common;

use common::*;
use defines::{
    error::errno,
    misc::WAIT_TIME_INDEFINITE,
    syscall::USER_LOCK,
    user::{UserLockOp, UserLockParams},
};
use kernel::{process, thread::Thread, time, trap};
use triomphe::Arc;

/// 锁字放在映射区间内的一个对齐地址
const LOCK_WORD: usize = 0x3000;

fn lock_params(op: UserLockOp, address: usize, value: usize, timeout_ms: usize) -> UserLockParams {
    UserLockParams {
        address,
        value,
        op: op as usize,
        timeout_ms,
    }
}

fn write_lock_word(process: &Arc<kernel::process::Process>, value: u32) {
    process.write_user(LOCK_WORD, &value).unwrap();
}

fn start_wait(thread: &Arc<Thread>, params_addr: usize, timeout_ms: usize) {
    let params = lock_params(UserLockOp::Wait, LOCK_WORD, 0, timeout_ms);
    let ptr = put_params(&thread.process, params_addr, &params);
    prepare_syscall(thread, USER_LOCK, [ptr, 0, 0, 0, 0, 0]);
}

#[test]
fn mismatched_value_returns_eagain() {
    let (process, thread) = new_process("lock_mismatch");
    write_lock_word(&process, 1);
    let params = lock_params(UserLockOp::Wait, LOCK_WORD, 0, WAIT_TIME_INDEFINITE);
    let ptr = put_params(&process, SCRATCH, &params);
    assert_eq!(
        do_syscall(&thread, USER_LOCK, [ptr, 0, 0, 0, 0, 0]),
        errno::EAGAIN.as_isize()
    );
}

#[test]
fn unaligned_address_rejected() {
    let (process, thread) = new_process("lock_unaligned");
    let params = lock_params(UserLockOp::Wait, LOCK_WORD + 2, 0, WAIT_TIME_INDEFINITE);
    let ptr = put_params(&process, SCRATCH, &params);
    assert_eq!(
        do_syscall(&thread, USER_LOCK, [ptr, 0, 0, 0, 0, 0]),
        errno::EINVAL.as_isize()
    );
}

#[test]
fn wake_without_waiters_returns_zero() {
    let (process, thread) = new_process("lock_no_waiters");
    write_lock_word(&process, 0);
    let params = lock_params(UserLockOp::Wake, LOCK_WORD, usize::MAX, 0);
    let ptr = put_params(&process, SCRATCH, &params);
    assert_eq!(do_syscall(&thread, USER_LOCK, [ptr, 0, 0, 0, 0, 0]), 0);
    let out: UserLockParams = process.read_user(ptr).unwrap();
    assert_eq!(out.value, 0);
}

#[test]
fn wait_then_wake() {
    let (process, waiter) = new_process("lock_wait_wake");
    write_lock_word(&process, 0);

    start_wait(&waiter, SCRATCH, WAIT_TIME_INDEFINITE);
    let mut round = Stepper::new(trap::handle_user_trap(&waiter));
    round.assert_pending();

    // 同进程的第二个线程来唤醒
    let other = process::spawn_thread(&process, ENTRY, STACK_TOP - 0x1000);
    let params = lock_params(UserLockOp::Wake, LOCK_WORD, usize::MAX, 0);
    let ptr = put_params(&process, SCRATCH + 0x100, &params);
    assert_eq!(do_syscall(&other, USER_LOCK, [ptr, 0, 0, 0, 0, 0]), 1);
    let out: UserLockParams = process.read_user(ptr).unwrap();
    assert_eq!(out.value, 1);

    assert!(round.expect_ready());
    assert_eq!(ret_val(&waiter), 0);
}

#[test]
fn wake_honors_count_limit() {
    let (process, first) = new_process("lock_wake_limit");
    write_lock_word(&process, 0);
    let second = process::spawn_thread(&process, ENTRY, STACK_TOP - 0x1000);
    let third = process::spawn_thread(&process, ENTRY, STACK_TOP - 0x2000);

    start_wait(&first, SCRATCH, WAIT_TIME_INDEFINITE);
    let mut first_round = Stepper::new(trap::handle_user_trap(&first));
    first_round.assert_pending();
    start_wait(&second, SCRATCH + 0x100, WAIT_TIME_INDEFINITE);
    let mut second_round = Stepper::new(trap::handle_user_trap(&second));
    second_round.assert_pending();

    // 只放行一个，先到先得
    let params = lock_params(UserLockOp::Wake, LOCK_WORD, 1, 0);
    let ptr = put_params(&process, SCRATCH + 0x200, &params);
    assert_eq!(do_syscall(&third, USER_LOCK, [ptr, 0, 0, 0, 0, 0]), 1);
    assert!(first_round.expect_ready());
    assert_eq!(ret_val(&first), 0);
    second_round.assert_pending();

    assert_eq!(do_syscall(&third, USER_LOCK, [ptr, 0, 0, 0, 0, 0]), 1);
    assert!(second_round.expect_ready());
}

#[test]
fn wait_times_out() {
    let _clock = lock_clock();
    let (process, thread) = new_process("lock_timeout");
    write_lock_word(&process, 0);

    start_wait(&thread, SCRATCH, 25);
    let mut round = Stepper::new(trap::handle_user_trap(&thread));
    round.assert_pending();

    time::advance_ms(25);
    assert!(round.expect_ready());
    assert_eq!(ret_val(&thread), errno::ETIMEDOUT.as_isize());
}

#[test]
fn lock_words_are_process_private() {
    let (process_a, waiter_a) = new_process("lock_private_a");
    let (process_b, waiter_b) = new_process("lock_private_b");
    write_lock_word(&process_a, 0);
    write_lock_word(&process_b, 0);

    start_wait(&waiter_b, SCRATCH, WAIT_TIME_INDEFINITE);
    let mut round_b = Stepper::new(trap::handle_user_trap(&waiter_b));
    round_b.assert_pending();

    // A 进程对相同地址的唤醒碰不到 B 的等待者
    let other = process::spawn_thread(&process_a, ENTRY, STACK_TOP - 0x1000);
    let params = lock_params(UserLockOp::Wake, LOCK_WORD, usize::MAX, 0);
    let ptr = put_params(&process_a, SCRATCH + 0x100, &params);
    assert_eq!(do_syscall(&other, USER_LOCK, [ptr, 0, 0, 0, 0, 0]), 0);
    round_b.assert_pending();
    let _ = waiter_a;
}
