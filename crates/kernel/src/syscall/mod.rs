//! 系统调用入口与分发。
//!
//! 返回值统一写进陷入现场的 a0。`RESTART` 不写 a0，只在线程上
//! 留下重启请求，由返回用户态前的信号处理决定是透明重做还是
//! 以 `EINTR` 进 handler；`BREAK` 原样上抛，表示线程应当退出

mod lock;
mod process;
mod signal;
mod time;

use defines::{
    error::{errno, KResult},
    syscall::*,
};
use triomphe::Arc;

use self::{lock::*, process::*, signal::*, time::*};
use crate::thread::Thread;

pub async fn syscall(thread: &Arc<Thread>) -> KResult<()> {
    let (id, args) = thread.lock_inner_with(|inner| {
        (
            inner.trap_context.syscall_nr(),
            inner.trap_context.syscall_args(),
        )
    });
    // 查询时间和让出 CPU 非常频繁，不值得记录
    let is_trace = id == QUERY_TIME_COUNTER || id == SCHED_YIELD;
    let ret = syscall_impl(thread, id, args).await;
    match ret {
        Ok(ret) => {
            if is_trace {
                trace!("{} args {args:x?}. return {ret} = {ret:#x}", name(id));
            } else {
                debug!("{} args {args:x?}. return {ret} = {ret:#x}", name(id));
            }
            thread.lock_inner_with(|inner| inner.trap_context.set_a0(ret as usize));
            Ok(())
        }
        Err(err) if err == errno::BREAK => Err(errno::BREAK),
        Err(err) if err == errno::RESTART => {
            debug!("{} interrupted, restart requested", name(id));
            thread.lock_inner_with(|inner| inner.restart_pending = true);
            Ok(())
        }
        Err(err) => {
            // 等待子进程的 EAGAIN 和 ECHILD 属于正常流程
            if !(id == WAIT_FOR_CHILD && (err == errno::EAGAIN || err == errno::ECHILD)) {
                warn!(
                    "{} args {args:x?}. return {err:?}, {}",
                    name(id),
                    errno::error_info(err.as_isize()),
                );
            }
            thread.lock_inner_with(|inner| inner.trap_context.set_a0(err.as_isize() as usize));
            Ok(())
        }
    }
}

async fn syscall_impl(thread: &Arc<Thread>, id: usize, args: [usize; 6]) -> KResult {
    match id {
        EXIT_THREAD => sys_exit_thread(thread),
        EXIT_PROCESS => sys_exit_process(thread, args[0]),
        SET_SIGNAL_HANDLER => sys_set_signal_handler(thread, args[0], args[1], args[2]),
        RESTORE_CONTEXT => sys_restore_context(thread, args[0]),
        SEND_SIGNAL => sys_send_signal(thread, args[0]),
        SET_SIGNAL_BEHAVIOR => sys_set_signal_behavior(thread, args[0]),
        WAIT_FOR_CHILD => sys_wait_for_child(thread, args[0]).await,
        SUSPEND_EXECUTION => sys_suspend_execution(thread, args[0]).await,
        TIMER_CONTROL => sys_timer_control(thread, args[0]),
        SET_ITIMER => sys_set_itimer(thread, args[0]),
        QUERY_TIME_COUNTER => sys_query_time_counter(),
        USER_LOCK => sys_user_lock(thread, args[0]).await,
        SCHED_YIELD => sys_sched_yield().await,
        _ => {
            warn!("unsupported syscall id {id}");
            Err(errno::UNSUPPORTED)
        }
    }
}
