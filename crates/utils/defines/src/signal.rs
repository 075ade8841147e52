//! 信号相关的用户态 ABI 定义。
//!
//! 注意信号编号从 1 开始，1..32 为标准信号，32..=63 为实时信号。
//! 信号集是 64 位的 bitset，信号 `n` 对应第 `n - 1` 位

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::trap_context::TrapContext;

/// 信号机制所需的 bitset 大小
pub const SIGSET_SIZE: usize = 64;
pub const SIGSET_SIZE_BYTES: usize = SIGSET_SIZE / 8;

/// 标准信号的数量（编号 0 保留不用）
pub const STANDARD_SIGNAL_COUNT: u8 = 32;
pub const SIGRTMIN: u8 = 32;
pub const SIGRTMAX: u8 = 63;

pub const SIG_ERR: usize = usize::MAX;
pub const SIG_DFL: usize = 0;
pub const SIG_IGN: usize = 1;

pub const SIGHUP: u8 = 1;
pub const SIGINT: u8 = 2;
pub const SIGQUIT: u8 = 3;
pub const SIGILL: u8 = 4;
pub const SIGTRAP: u8 = 5;
pub const SIGABRT: u8 = 6;
pub const SIGBUS: u8 = 7;
pub const SIGFPE: u8 = 8;
pub const SIGKILL: u8 = 9;
pub const SIGUSR1: u8 = 10;
pub const SIGSEGV: u8 = 11;
pub const SIGUSR2: u8 = 12;
pub const SIGPIPE: u8 = 13;
pub const SIGALRM: u8 = 14;
pub const SIGTERM: u8 = 15;
pub const SIGSTKFLT: u8 = 16;
pub const SIGCHLD: u8 = 17;
pub const SIGCONT: u8 = 18;
pub const SIGSTOP: u8 = 19;
pub const SIGTSTP: u8 = 20;
pub const SIGTTIN: u8 = 21;
pub const SIGTTOU: u8 = 22;
pub const SIGURG: u8 = 23;
pub const SIGXCPU: u8 = 24;
pub const SIGXFSZ: u8 = 25;
pub const SIGVTALRM: u8 = 26;
pub const SIGPROF: u8 = 27;
pub const SIGWINCH: u8 = 28;
pub const SIGIO: u8 = 29;
pub const SIGPWR: u8 = 30;
pub const SIGSYS: u8 = 31;

/// 参考 musl 的 `k_sigaction`。字段均为字长以保证无 padding
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct KSignalAction {
    /// signal handler 的地址。也可以是 [`SIG_DFL`] 或 [`SIG_IGN`]
    pub handler: usize,
    pub restorer: usize,
    /// handler 执行期间额外掩蔽的信号集
    pub mask: u64,
    pub flags: u64,
}

impl KSignalAction {
    pub const fn new() -> Self {
        Self {
            handler: SIG_DFL,
            restorer: 0,
            mask: 0,
            flags: 0,
        }
    }

    pub fn flags(&self) -> SignalActionFlags {
        SignalActionFlags::from_bits_truncate(self.flags)
    }
}

impl Default for KSignalAction {
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug)]
    pub struct SignalActionFlags: u64 {
        const SA_RESTORER = 0x04_000_000;
        /// 一般而言。执行一个 signal handler 时，会屏蔽自己这个信号。
        ///
        /// 若指定以下这个 flag 则不会。sigaction 中的 mask 仍有效
        const SA_NODEFER  = 0x40_000_000;
    }
}

/// 随信号传递给用户态的信息。
///
/// 标准信号入队时不分配内存，出队时由内核就地合成；
/// 实时信号则携带发送方提供的 `parameter`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SigInfo {
    pub signo: usize,
    /// 信号来源。见 `signal` crate 的 `SigCode`
    pub code: isize,
    pub sender_pid: usize,
    pub sender_uid: usize,
    /// 子进程信号中为退出码或导致停止/终止的信号编号
    pub status: isize,
    pub parameter: usize,
}

bitflags! {
    /// 保存在 [`SignalContext::flags`] 中的标志位
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ContextFlags: u64 {
        /// 被打断的系统调用可以重启。
        ///
        /// 若用户态在 handler 返回前清除该位，则重启退化为 `EINTR`
        const RESTART = 1 << 0;
    }
}

/// 执行 signal handler 前压入用户栈的完整现场。
///
/// `restore_context` 会从用户栈读回它，因此它必须是 Pod 的
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SignalContext {
    /// 见 [`ContextFlags`]
    pub flags: u64,
    /// 指向下一个嵌套的 `SignalContext`，目前恒为 0
    pub next: u64,
    /// 被打断时线程的信号掩码，恢复现场时写回
    pub mask: u64,
    pub info: SigInfo,
    pub trap: TrapContext,
}
