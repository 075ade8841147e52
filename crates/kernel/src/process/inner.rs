use alloc::{collections::BTreeMap, collections::VecDeque, string::String, vec::Vec};

use bitflags::bitflags;
use defines::misc::ResourceUsage;
use signal::{
    SigInfoExt, Signal, SignalHandlers, SignalQueue, SignalRecord, SignalSet,
};
use slab::Slab;
use triomphe::Arc;

use crate::{
    debug::DebugState, process::manager::RecycleAllocator, thread::Thread, time::ProcessTimer,
};

bitflags! {
    /// 越过所有权检查的特权
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// 可以向任意进程发送信号
        const KILL = 1 << 0;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Credentials {
    pub real_uid: usize,
    pub effective_uid: usize,
    pub saved_uid: usize,
    pub permissions: Permissions,
}

impl Credentials {
    pub fn root() -> Self {
        Self {
            real_uid: 0,
            effective_uid: 0,
            saved_uid: 0,
            permissions: Permissions::KILL,
        }
    }

    /// 信号发送的权限检查。
    ///
    /// 发送方的 real 或 effective uid 需命中目标的 real 或 saved uid，
    /// `SIGCONT` 在同一会话内额外放行
    pub fn can_signal(&self, target: &Credentials, signal: Signal, same_session: bool) -> bool {
        if self.permissions.contains(Permissions::KILL) {
            return true;
        }
        if signal == Signal::SIGCONT && same_session {
            return true;
        }
        let allowed = [target.real_uid, target.saved_uid];
        allowed.contains(&self.effective_uid) || allowed.contains(&self.real_uid)
    }
}

/// 进程的退出信息，在第一个致命事件时定格
#[derive(Clone, Copy, Debug)]
pub struct ExitInfo {
    /// 子进程事件类的 `SigCode`
    pub reason: signal::SigCode,
    /// 退出码或致命信号的编号
    pub status: usize,
}

pub struct ProcessInner {
    pub name: String,
    /// 父进程 pid。孤儿进程为 `None`，退出时无人回收、直接消失
    pub parent: Option<usize>,
    /// 存活和尚未被回收的子进程
    pub children: Vec<usize>,
    pub pgid: usize,
    pub sid: usize,
    pub creds: Credentials,
    pub threads: BTreeMap<usize, Arc<Thread>>,
    pub tid_allocator: RecycleAllocator,

    pub signal_handlers: SignalHandlers,
    /// 安装了 handler 的信号
    pub handled: SignalSet,
    /// 显式忽略的信号。与 `handled` 保持不相交
    pub ignored: SignalSet,
    /// 进程级待决队列，由第一个未阻塞相应信号的线程消费
    pub pending: SignalQueue,
    /// `pending` 的超集：队列中有记录的信号，加上无记录的裸标准信号
    pub pending_set: SignalSet,
    /// 已交付过 handler 或因忽略未入队的子进程事件，等待 `wait_for_child`
    pub unreaped: VecDeque<SignalRecord>,

    /// 正停着的线程数，与 `threads.len()` 相等时全体已停止
    pub stopped_count: usize,
    /// 引发本次停止的信号，报告给父进程用
    pub stop_signal: Signal,

    pub exit: Option<ExitInfo>,
    pub usage: ResourceUsage,
    /// 已回收子进程的累计用量
    pub child_usage: ResourceUsage,

    pub timers: Slab<ProcessTimer>,
    /// Real 间隔定时器占用的 `timers` 槽位
    pub itimer_real: Option<usize>,

    pub debug: DebugState,
}

impl ProcessInner {
    /// 进程和所有线程的待决集合并
    pub fn pending_union(&self) -> SignalSet {
        let mut set = self.pending_set;
        for thread in self.threads.values() {
            set |= thread.lock_inner().pending_set;
        }
        set
    }

    /// 按当前处置来看，`signal` 是否会被丢弃
    pub fn discards(&self, signal: Signal) -> bool {
        if self.handled.contains(signal.into()) {
            return false;
        }
        self.ignored.contains(signal.into())
            || signal::DefaultAction::of(signal) == signal::DefaultAction::Ignore
    }

    /// `unreaped` 中指定子进程的事件
    pub fn take_unreaped(&mut self, child_pid: usize) -> Option<SignalRecord> {
        let i = self.unreaped.iter().position(|record| {
            record.info.sender_pid == child_pid
                && record
                    .info
                    .sig_code()
                    .is_some_and(signal::SigCode::is_child_event)
        })?;
        self.unreaped.remove(i)
    }
}
