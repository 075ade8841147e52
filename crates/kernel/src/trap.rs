//! 用户态陷入的总入口。
//!
//! 宿主环境没有真实的陷入，线程以「回合」为单位驱动：一次系统
//! 调用处理，加上返回用户态前的例行工作（运行时定时器结算与
//! 信号交付）

use defines::trap_context::SYSCALL_INSTRUCTION_LEN;
use triomphe::Arc;

use crate::{process, signal, syscall, thread::Thread, time};

/// 处理一次系统调用陷入并完成返回用户态前的工作。
///
/// 返回 `false` 表示线程已经退出，不应再回到用户态
pub async fn handle_user_trap(thread: &Arc<Thread>) -> bool {
    // 返回地址指向系统调用指令的下一条
    thread.lock_inner_with(|inner| inner.trap_context.pc += SYSCALL_INSTRUCTION_LEN);
    if syscall::syscall(thread).await.is_err() {
        process::exit_thread(thread);
        return false;
    }
    return_to_user(thread).await
}

/// 返回用户态前的例行工作：结算运行时定时器，交付待决信号
pub async fn return_to_user(thread: &Arc<Thread>) -> bool {
    time::check_runtime_timers(thread);
    if signal::handle_pending_signals(thread).await.is_err() {
        process::exit_thread(thread);
        return false;
    }
    true
}
