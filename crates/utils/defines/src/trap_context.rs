use bytemuck::{Pod, Zeroable};

/// 用户态陷入内核时保存的现场。
///
/// 与具体指令集解耦：只保留通用寄存器、状态字和 pc。
/// 状态字中内核真正关心的只有 [`STATUS_USER_MODE`] 位，
/// 恢复现场时会强制将其设置，防止用户构造内核态的返回现场
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TrapContext {
    /// 不包括恒零寄存器，因此是 31 个
    pub user_regs: [usize; 31],
    pub status: usize,
    /// 发生 trap 时的 pc 值。一般而言返回用户态就是回到它
    pub pc: usize,
}

/// 状态字：trap 之前处于用户态
pub const STATUS_USER_MODE: usize = 1 << 0;
/// 状态字：trap 之前中断使能
pub const STATUS_INTERRUPTS_ON: usize = 1 << 1;

/// 系统调用指令的长度，重启系统调用时 pc 回退这么多
pub const SYSCALL_INSTRUCTION_LEN: usize = 4;

const RA: usize = 0;
const SP: usize = 1;
const A0: usize = 9;
const SYSCALL_NR: usize = 16;

impl TrapContext {
    /// 用户线程初始化时的现场。从内核返回后在 `sp` 上从 `entry` 开始运行
    pub fn app_init_context(entry: usize, sp: usize) -> Self {
        let mut cx = Self {
            user_regs: [0; 31],
            status: STATUS_USER_MODE | STATUS_INTERRUPTS_ON,
            pc: entry,
        };
        cx.set_sp(sp);
        cx
    }

    pub fn sp(&self) -> usize {
        self.user_regs[SP]
    }

    pub fn set_sp(&mut self, sp: usize) {
        self.user_regs[SP] = sp;
    }

    pub fn ra(&self) -> usize {
        self.user_regs[RA]
    }

    pub fn set_ra(&mut self, ra: usize) {
        self.user_regs[RA] = ra;
    }

    /// a0 既是第一个参数也是返回值寄存器
    pub fn a0(&self) -> usize {
        self.user_regs[A0]
    }

    pub fn set_a0(&mut self, a0: usize) {
        self.user_regs[A0] = a0;
    }

    pub fn set_a1(&mut self, a1: usize) {
        self.user_regs[A0 + 1] = a1;
    }

    /// 系统调用参数，a0~a5
    pub fn syscall_args(&self) -> [usize; 6] {
        [
            self.user_regs[A0],
            self.user_regs[A0 + 1],
            self.user_regs[A0 + 2],
            self.user_regs[A0 + 3],
            self.user_regs[A0 + 4],
            self.user_regs[A0 + 5],
        ]
    }

    pub fn syscall_nr(&self) -> usize {
        self.user_regs[SYSCALL_NR]
    }

    pub fn user_mode(&self) -> bool {
        self.status & STATUS_USER_MODE != 0
    }
}
