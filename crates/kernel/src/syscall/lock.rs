//! 用户态锁的系统调用表面，实现见 [`crate::futex`]。

use defines::{
    error::{errno, KResult},
    misc::WAIT_TIME_INDEFINITE,
    user::{UserLockOp, UserLockParams},
};
use triomphe::Arc;

use crate::{futex, thread::Thread, time};

pub async fn sys_user_lock(thread: &Arc<Thread>, params_ptr: usize) -> KResult {
    let process = &thread.process;
    let mut params: UserLockParams = process.read_user(params_ptr)?;
    let op = UserLockOp::try_from(params.op).map_err(|_| errno::EINVAL)?;
    match op {
        UserLockOp::Wait => {
            let timeout = (params.timeout_ms != WAIT_TIME_INDEFINITE).then_some(params.timeout_ms);
            let start = time::now_ms();
            match futex::wait(thread, params.address, params.value as u32, timeout).await {
                Ok(()) => Ok(0),
                Err(err) if err == errno::RESTART => {
                    // 重启时带上剩余的超时
                    if let Some(timeout) = timeout {
                        let elapsed = time::now_ms() - start;
                        params.timeout_ms = timeout.saturating_sub(elapsed).max(1);
                        process.write_user(params_ptr, &params)?;
                    }
                    Err(errno::RESTART)
                }
                Err(err) => Err(err),
            }
        }
        UserLockOp::Wake => {
            let woken = futex::wake(process.pid(), params.address, params.value).await?;
            params.value = woken;
            process.write_user(params_ptr, &params)?;
            Ok(woken as isize)
        }
    }
}
