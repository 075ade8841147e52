#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod misc;
pub mod signal;
pub mod syscall;
pub mod trap_context;
pub mod user;
