//! 跟踪器（调试）支持。
//!
//! 被跟踪的进程在交付任何信号（`KILL` 除外）之前陷入：线程把
//! `SigInfo` 发布到共享槽位、清除 stop event 让全进程停下，并给
//! 跟踪器发一个 trapped 事件。跟踪器检视（或改写）槽位后继续
//! 进程，被改写的结果决定原信号是照常交付、被吞掉还是换成别的。
//!
//! 单步由一个带空洞的 pc 范围表达：范围内（空洞外）的单步陷阱
//! 被静默吞掉，跑出范围才真正上报

use atomic::Ordering;
use defines::signal::SigInfo;
use scopeguard::guard;
use signal::{SigCode, SigInfoExt, Signal, SignalRecord};
use triomphe::Arc;

use crate::{
    executor,
    process::{self, Process},
    signal::send,
    thread::{PendingHint, Thread},
};

/// 单步的 pc 范围。落在 `[start, end)` 且不在
/// `[hole_start, hole_end)` 里的单步陷阱不上报
#[derive(Clone, Copy, Debug)]
pub struct StepRange {
    pub start: usize,
    pub end: usize,
    pub hole_start: usize,
    pub hole_end: usize,
}

pub struct DebugState {
    /// 跟踪器的 pid
    pub tracer: Option<usize>,
    /// 同一时刻只有一个线程能和跟踪器交谈
    locked: bool,
    /// 正在和跟踪器交谈的线程发布的信号
    info_slot: Option<SigInfo>,
    pub step_range: Option<StepRange>,
}

impl DebugState {
    pub fn new() -> Self {
        Self {
            tracer: None,
            locked: false,
            info_slot: None,
            step_range: None,
        }
    }
}

impl Default for DebugState {
    fn default() -> Self {
        Self::new()
    }
}

pub enum TracerVerdict {
    Deliver,
    Suppress,
}

enum LockState {
    NotTraced,
    Busy,
    Acquired(usize),
}

/// 交付阶段的跟踪器裁决。调用者已经把信号出队
pub(crate) async fn tracer_break(thread: &Arc<Thread>, info: &mut SigInfo) -> TracerVerdict {
    let process = &thread.process;
    let tracer = loop {
        let state = process.lock_inner_with(|inner| match inner.debug.tracer {
            None => LockState::NotTraced,
            Some(tracer) if tracer == process.pid() => LockState::NotTraced,
            Some(tracer) => {
                if inner.debug.locked {
                    LockState::Busy
                } else {
                    inner.debug.locked = true;
                    LockState::Acquired(tracer)
                }
            }
        });
        match state {
            LockState::NotTraced => return TracerVerdict::Deliver,
            LockState::Busy => executor::yield_now().await,
            LockState::Acquired(tracer) => break tracer,
        }
    };
    let unlock = guard(Arc::clone(process), |process| {
        process.lock_inner_with(|inner| inner.debug.locked = false);
    });

    // 范围内的单步陷阱静默续步
    let step_suppressed = process.lock_inner_with(|inner| {
        if info.signo != Signal::SIGTRAP.to_user() || info.sig_code() != Some(SigCode::Kernel) {
            return false;
        }
        let Some(range) = inner.debug.step_range else {
            return false;
        };
        let pc = thread.lock_inner_with(|thread_inner| thread_inner.trap_context.pc);
        pc >= range.start
            && pc < range.end
            && !(pc >= range.hole_start && pc < range.hole_end)
    });
    if step_suppressed {
        trace!("[{}:{}] step trap swallowed", process.pid(), thread.tid());
        return TracerVerdict::Suppress;
    }

    // 发布信号并让全进程停下，等跟踪器裁决
    process.stop_event.unsignal();
    process.lock_inner_with(|inner| {
        inner.debug.info_slot = Some(*info);
        inner.stopped_count += 1;
        if inner.stopped_count == inner.threads.len() {
            process.all_stopped_event.signal();
        }
        // 其余线程也要赶到预检里停下
        for other in inner.threads.values() {
            if other.tid() != thread.tid() {
                other.pending_hint
                    .store(PendingHint::Pending, Ordering::SeqCst);
                other.intr_event.notify(usize::MAX);
            }
        }
    });
    debug!(
        "[{}:{}] trapped with {:?} for tracer [{}]",
        process.pid(),
        thread.tid(),
        info.signal(),
        tracer
    );
    // 停齐之后才让跟踪器看到陷入事件
    process.all_stopped_event.wait().await;
    process::queue_child_signal_to(
        Some(tracer),
        process,
        SigCode::ChildTrapped,
        info.signo as isize,
    );
    process.stop_event.wait().await;

    let replacement = process.lock_inner_with(|inner| {
        process.all_stopped_event.unsignal();
        inner.stopped_count -= 1;
        inner.debug.info_slot.take()
    });
    drop(unlock);

    let Some(new_info) = replacement else {
        return TracerVerdict::Deliver;
    };
    if new_info.signo == 0 {
        return TracerVerdict::Suppress;
    }
    if new_info.signo != info.signo {
        if let Some(new_signal) = new_info.signal() {
            if new_signal.is_unalterable() {
                // 换成了非可屏蔽信号：重新走进程级投递
                send::signal_process(process, SignalRecord::new(new_info));
                return TracerVerdict::Suppress;
            }
        } else {
            return TracerVerdict::Suppress;
        }
    }
    *info = new_info;
    TracerVerdict::Deliver
}

/// 指定（或解除）进程的跟踪器
pub fn set_tracer(process: &Arc<Process>, tracer: Option<usize>) {
    process.lock_inner_with(|inner| inner.debug.tracer = tracer);
}

/// 跟踪器侧：读取被跟踪进程当前发布的信号
pub fn trapped_info(process: &Arc<Process>) -> Option<SigInfo> {
    process.lock_inner_with(|inner| inner.debug.info_slot)
}

/// 跟踪器侧：裁决并继续被跟踪进程。
///
/// `replacement` 为 `None` 时保留原信号照常交付；`signo` 为 0 的
/// 替换信号表示吞掉它
pub fn resume_tracee(process: &Arc<Process>, replacement: Option<SigInfo>) {
    process.lock_inner_with(|inner| {
        if let Some(replacement) = replacement {
            inner.debug.info_slot = Some(replacement);
        }
    });
    process.stop_event.signal();
}

pub fn set_step_range(process: &Arc<Process>, range: StepRange) {
    process.lock_inner_with(|inner| inner.debug.step_range = Some(range));
}

pub fn clear_step_range(process: &Arc<Process>) {
    process.lock_inner_with(|inner| inner.debug.step_range = None);
}
