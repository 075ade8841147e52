//! 系统调用的打包参数结构。
//!
//! 复杂的系统调用只在寄存器中传一个指针，指向用户空间中的参数结构；
//! 内核将其整体拷入，处理完毕后把输出字段写回原地址。
//! 因此这里的结构全部是 `repr(C)` 且无 padding 的 Pod 类型，
//! 枚举字段以裸整数存放，由内核侧解析

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use num_enum::TryFromPrimitive;

/// 对信号掩码执行的操作
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum MaskOp {
    /// 不改变掩码
    None = 0,
    /// 直接赋值
    Overwrite = 1,
    /// 置位，即新掩码是传入值和旧值的并集
    Set = 2,
    /// 清位
    Clear = 3,
}

/// `set_signal_behavior` 可以操作的掩码种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum MaskKind {
    Blocked = 1,
    Ignored = 2,
    Handled = 3,
    /// 只读。返回 (线程待决 ∪ 进程待决) ∩ 阻塞集
    Pending = 4,
}

/// `send_signal` 的目标类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum SignalTarget {
    Process = 1,
    Thread = 2,
    AllProcesses = 3,
    ProcessGroup = 4,
    CurrentProcess = 5,
    CurrentProcessGroup = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum TimerOp {
    Create = 1,
    Delete = 2,
    Get = 3,
    Set = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum ITimerKind {
    /// 真实时间，到期发送 `SIGALRM`
    Real = 0,
    /// 用户态运行时间，到期发送 `SIGVTALRM`
    Virtual = 1,
    /// 用户态加内核态运行时间，到期发送 `SIGPROF`
    Profile = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum UserLockOp {
    Wait = 1,
    Wake = 2,
}

bitflags! {
    /// `wait_for_child` 的等待选项
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WaitFlags: u64 {
        /// 等待退出的子进程
        const EXITED = 1 << 0;
        /// 等待被停止的子进程
        const STOPPED = 1 << 1;
        /// 等待被继续的子进程
        const CONTINUED = 1 << 2;
        /// 没有符合条件的子进程事件时立刻返回而不是阻塞
        const RETURN_IMMEDIATELY = 1 << 3;
        /// 只查看不消耗，事件仍留在队列中
        const DONT_DISCARD = 1 << 4;
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SendSignalParams {
    /// 见 [`SignalTarget`]
    pub target: usize,
    /// pid、tid 或进程组 id，视 `target` 而定
    pub target_id: usize,
    pub signo: usize,
    /// 见 `signal` crate 的 `SigCode`，只允许非负（用户态来源）
    pub code: isize,
    /// 实时信号携带的值
    pub parameter: usize,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SignalBehaviorParams {
    /// 见 [`MaskOp`]
    pub op: usize,
    /// 见 [`MaskKind`]
    pub kind: usize,
    /// 输入为新集合，返回时被改写为原集合
    pub set: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct WaitChildParams {
    /// 见 [`WaitFlags`]
    pub flags: u64,
    /// 输入：>0 等待指定 pid；-1 等待任意子进程；
    /// 0 等待同进程组的子进程；其他负数等待进程组 `-pid` 的子进程。
    /// 输出：产生事件的子进程 pid
    pub pid: isize,
    /// 输出：退出码，或导致终止/停止的信号编号
    pub exit_value: usize,
    /// 输出：事件原因，是一个子进程类的 `SigCode`
    pub reason: usize,
    /// 可选，指向用户空间的 `ResourceUsage`
    pub usage_ptr: usize,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SuspendParams {
    /// 见 [`MaskOp`]，本次调用期间临时作用于阻塞集
    pub op: usize,
    pub mask: u64,
    /// [`crate::misc::WAIT_TIME_INDEFINITE`] 表示无限等待。
    /// 被打断重启时内核会把剩余时间写回这里
    pub timeout_ms: usize,
    /// 可选，指向用户空间的 `SigInfo`。非空时 `mask` 中的信号会被“偷走”，
    /// 即不经过默认处理直接在此返回
    pub info_ptr: usize,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TimerControlParams {
    /// 见 [`TimerOp`]
    pub op: usize,
    /// Create 时输出，其余操作时输入
    pub timer_id: usize,
    /// 到期时发送的信号，Create 时输入，0 表示默认的 `SIGALRM`
    pub signo: usize,
    /// 到期信号携带的 `parameter`
    pub parameter: usize,
    /// 绝对到期时刻（毫秒），0 表示解除武装
    pub due_ms: usize,
    /// 周期（毫秒），0 表示一次性
    pub period_ms: usize,
    /// Get/Set 时输出：累计到期次数
    pub expiration_count: usize,
    /// Get/Set 时输出：未能入队而折叠的到期次数
    pub overflow_count: usize,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ITimerParams {
    /// 见 [`ITimerKind`]
    pub kind: usize,
    /// 非零表示设置，零表示只读取
    pub set: usize,
    /// 输入为相对到期时间，输出为旧值的剩余时间（毫秒），0 表示未武装
    pub due_ms: usize,
    pub period_ms: usize,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct UserLockParams {
    /// 用户空间中锁字的虚拟地址，必须 4 字节对齐
    pub address: usize,
    /// Wait 时为期望值，Wake 时为最多唤醒的数量；
    /// Wake 返回时被改写为实际唤醒的数量
    pub value: usize,
    /// 见 [`UserLockOp`]
    pub op: usize,
    pub timeout_ms: usize,
}
