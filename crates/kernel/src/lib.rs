//! POSIX 风格的信号子系统，以及承载它所需的最小进程模型。
//!
//! 信号从产生到交付分为三个阶段：
//!
//! 1. 产生（[`signal::send`]）：构造 [`signal::SignalRecord`](::signal::SignalRecord)
//!    并挂到目标线程或进程的待决队列上，顺带处理忽略过滤和唤醒；
//! 2. 交付（[`signal::dispatch`]）：返回用户态前出队一个未阻塞的待决信号，
//!    非可屏蔽信号和停止状态在此之前单独预检；
//! 3. 应用（[`signal::apply`]）：把被打断的现场压入用户栈并改写陷入现场，
//!    使返回用户态后直接进入 handler，`restore_context` 负责逆操作
//!
//! 进程、线程、定时器、用户锁等模块只实现信号语义所依赖的部分

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
extern crate kernel_tracer;

pub mod debug;
pub mod executor;
pub mod futex;
pub mod memory;
pub mod process;
pub mod signal;
pub mod syscall;
pub mod thread;
pub mod time;
pub mod trap;
