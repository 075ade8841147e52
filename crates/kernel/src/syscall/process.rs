//! 线程与进程生命周期类的系统调用。

use defines::{
    error::{errno, KResult},
    signal::SigInfo,
    user::WaitChildParams,
};
use signal::{SigCode, SigInfoExt, Signal, SignalRecord};
use triomphe::Arc;

use crate::{executor, process, signal::send, thread::Thread};

/// 当前线程退出。最后一个线程退出时进程才真正终结
pub fn sys_exit_thread(thread: &Arc<Thread>) -> KResult {
    debug!("[{}:{}] thread exits", thread.process.pid(), thread.tid());
    Err(errno::BREAK)
}

/// 整个进程退出，退出码取低 8 位。
///
/// 其余线程通过一个内核合成的 `KILL` 被拉下来，
/// 预先记好的退出信息保证父进程看到的是正常退出而非被杀
pub fn sys_exit_process(thread: &Arc<Thread>, code: usize) -> KResult {
    let process = &thread.process;
    info!("[{}] exits with code {}", process.pid(), code & 0xff);
    process.record_exit(SigCode::ChildExited, code & 0xff);
    send::signal_process(
        process,
        SignalRecord::new(SigInfo::for_kernel(Signal::SIGKILL)),
    );
    Err(errno::BREAK)
}

pub async fn sys_wait_for_child(thread: &Arc<Thread>, params_ptr: usize) -> KResult {
    let process = &thread.process;
    let mut params: WaitChildParams = process.read_user(params_ptr)?;
    process::wait_for_child(process, thread, &mut params).await?;
    process.write_user(params_ptr, &params)?;
    Ok(0)
}

pub async fn sys_sched_yield() -> KResult {
    executor::yield_now().await;
    Ok(0)
}
