//! 定时器类系统调用。
//!
//! `timer_control` 操作进程定时器（真实时间，挂在时间轮上）；
//! `set_itimer` 的 Real 形式是它的别名，Virtual/Profile 形式按
//! 调用线程的运行时间计数，在返回用户态前结算

use defines::{
    error::{errno, KResult},
    user::{ITimerKind, ITimerParams, TimerControlParams, TimerOp},
};
use signal::Signal;
use triomphe::Arc;

use crate::{
    thread::Thread,
    time::{self, CpuTimer, ProcessTimer},
};

pub fn sys_timer_control(thread: &Arc<Thread>, params_ptr: usize) -> KResult {
    let process = &thread.process;
    let mut params: TimerControlParams = process.read_user(params_ptr)?;
    let op = TimerOp::try_from(params.op).map_err(|_| errno::EINVAL)?;
    match op {
        TimerOp::Create => {
            let signal = if params.signo == 0 {
                Signal::SIGALRM
            } else {
                Signal::from_user(params.signo).ok_or(errno::EINVAL)?
            };
            params.timer_id = process.lock_inner_with(|inner| {
                inner.timers.insert(ProcessTimer::new(signal, params.parameter))
            });
            trace!("[{}] timer {} created", process.pid(), params.timer_id);
        }
        TimerOp::Delete => {
            process
                .lock_inner_with(|inner| inner.timers.try_remove(params.timer_id))
                .ok_or(errno::EINVAL)?;
        }
        TimerOp::Get => {
            process.lock_inner_with(|inner| {
                let timer = inner.timers.get(params.timer_id).ok_or(errno::EINVAL)?;
                params.signo = timer.signal.to_user();
                params.parameter = timer.parameter;
                params.due_ms = timer.due_ms;
                params.period_ms = timer.period_ms;
                params.expiration_count = timer.expiration_count;
                params.overflow_count = timer.overflow_count;
                Ok(())
            })?;
        }
        TimerOp::Set => {
            let arm = process.lock_inner_with(|inner| {
                let timer = inner.timers.get_mut(params.timer_id).ok_or(errno::EINVAL)?;
                timer.due_ms = params.due_ms;
                timer.period_ms = params.period_ms;
                params.expiration_count = timer.expiration_count;
                params.overflow_count = timer.overflow_count;
                Ok(timer.due_ms != 0)
            })?;
            if arm {
                time::register_process_timer(params.due_ms, process.pid(), params.timer_id);
            }
        }
    }
    process.write_user(params_ptr, &params)?;
    Ok(0)
}

pub fn sys_set_itimer(thread: &Arc<Thread>, params_ptr: usize) -> KResult {
    let process = &thread.process;
    let mut params: ITimerParams = process.read_user(params_ptr)?;
    let kind = ITimerKind::try_from(params.kind).map_err(|_| errno::EINVAL)?;
    let (set, new_due, new_period) = (params.set != 0, params.due_ms, params.period_ms);

    match kind {
        ITimerKind::Real => {
            let now = time::now_ms();
            let arm = process.lock_inner_with(|inner| {
                let old = inner
                    .itimer_real
                    .and_then(|id| inner.timers.get(id))
                    .map(|timer| (timer.due_ms, timer.period_ms))
                    .unwrap_or((0, 0));
                // 已到期但还没交付的算还剩 1ms
                params.due_ms = if old.0 == 0 {
                    0
                } else {
                    old.0.saturating_sub(now).max(1)
                };
                params.period_ms = old.1;
                if !set {
                    return None;
                }
                let id = match inner.itimer_real {
                    Some(id) => id,
                    None => {
                        let id = inner.timers.insert(ProcessTimer::new(Signal::SIGALRM, 0));
                        inner.itimer_real = Some(id);
                        id
                    }
                };
                let Some(timer) = inner.timers.get_mut(id) else {
                    return None;
                };
                timer.due_ms = if new_due == 0 { 0 } else { now + new_due };
                timer.period_ms = new_period;
                (timer.due_ms != 0).then_some((timer.due_ms, id))
            });
            if let Some((due_ms, timer_id)) = arm {
                time::register_process_timer(due_ms, process.pid(), timer_id);
            }
        }
        ITimerKind::Virtual | ITimerKind::Profile => {
            thread.lock_inner_with(|inner| {
                let elapsed = if kind == ITimerKind::Virtual {
                    inner.user_ms
                } else {
                    inner.user_ms + inner.kernel_ms
                };
                let slot = if kind == ITimerKind::Virtual {
                    &mut inner.vtimer
                } else {
                    &mut inner.ptimer
                };
                let old = slot
                    .as_ref()
                    .map(|timer| (timer.due_ms, timer.period_ms))
                    .unwrap_or((0, 0));
                params.due_ms = if old.0 == 0 {
                    0
                } else {
                    old.0.saturating_sub(elapsed).max(1)
                };
                params.period_ms = old.1;
                if set {
                    *slot = (new_due != 0).then_some(CpuTimer {
                        due_ms: elapsed + new_due,
                        period_ms: new_period,
                    });
                }
            });
        }
    }
    process.write_user(params_ptr, &params)?;
    Ok(0)
}

pub fn sys_query_time_counter() -> KResult {
    Ok(time::now_ms() as isize)
}
