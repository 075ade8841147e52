use defines::trap_context::TrapContext;
use signal::{SignalQueue, SignalSet};

use crate::time::CpuTimer;

pub struct ThreadInner {
    pub trap_context: TrapContext,
    /// 阻塞的信号掩码。`KILL`、`STOP`、`CONT` 永远不会出现在其中
    pub blocked: SignalSet,
    /// 线程级待决队列
    pub pending: SignalQueue,
    /// `pending` 的超集，另含无记录的裸标准信号
    pub pending_set: SignalSet,
    /// `suspend_execution` 期间被临时改写的原掩码。
    /// 交付 handler 时取走，压入信号现场，随 `restore_context` 恢复
    pub restore_mask: Option<SignalSet>,
    /// 被打断的系统调用要求重启。若返回用户态前没有 handler 介入，
    /// pc 回退重新执行；否则重启信息被编码进信号现场
    pub restart_pending: bool,
    pub exiting: bool,

    pub user_ms: usize,
    pub kernel_ms: usize,
    pub page_faults: usize,
    /// 用户态运行时间定时器，到期发送 `SIGVTALRM`
    pub vtimer: Option<CpuTimer>,
    /// 用户加内核运行时间定时器，到期发送 `SIGPROF`
    pub ptimer: Option<CpuTimer>,
}

impl ThreadInner {
    pub fn new(trap_context: TrapContext) -> Self {
        Self {
            trap_context,
            blocked: SignalSet::empty(),
            pending: SignalQueue::new(),
            pending_set: SignalSet::empty(),
            restore_mask: None,
            restart_pending: false,
            exiting: false,
            user_ms: 0,
            kernel_ms: 0,
            page_faults: 0,
            vtimer: None,
            ptimer: None,
        }
    }
}
