//! 放一些比较杂又非常简单的东西，以至于不值得分出单独的文件

use bytemuck::{Pod, Zeroable};

/// 表示无限等待的超时值
pub const WAIT_TIME_INDEFINITE: usize = usize::MAX;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Pod, Zeroable)]
pub struct TimeVal {
    pub sec: usize,
    pub usec: usize,
}

impl TimeVal {
    pub const fn from_ms(ms: usize) -> Self {
        Self {
            sec: ms / 1000,
            usec: (ms % 1000) * 1000,
        }
    }

    pub const fn as_ms(self) -> usize {
        self.sec * 1000 + self.usec / 1000
    }

    pub const fn is_zero(self) -> bool {
        self.sec == 0 && self.usec == 0
    }
}

/// 进程的资源使用统计，`wait_for_child` 时父进程会累加上已回收子进程的部分
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ResourceUsage {
    pub user_ms: usize,
    pub kernel_ms: usize,
    pub page_faults: usize,
}

impl ResourceUsage {
    pub fn accumulate(&mut self, other: &ResourceUsage) {
        self.user_ms += other.user_ms;
        self.kernel_ms += other.kernel_ms;
        self.page_faults += other.page_faults;
    }
}
