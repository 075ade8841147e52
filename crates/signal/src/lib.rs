//! 参考：<https://man7.org/linux/man-pages/man7/signal.7.html>
//!
//! signal action 是属于进程的，而线程可以有各自的掩码和待处理信号。
//! 进程同样有自己的待处理队列，其中的信号由第一个未阻塞它的线程消费
//!
//! `fork` 会继承父进程的 signal action 和线程的掩码，但是待处理信号会置空。
//! 而 `execve` 会清空 handled 集合（有 handler 的信号回到默认行为），
//! ignored 集合、线程掩码和待处理信号保留

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod handlers;
mod info;
mod queue;
mod set;

pub use handlers::{DefaultAction, SignalHandlers};
pub use info::{SigCode, SigInfoExt};
pub use queue::{Completion, SignalQueue, SignalRecord};
pub use set::{Signal, SignalSet};
