#![cfg_attr(not(test), no_std)]

mod event;
mod kspin;
mod sleep;

pub use event::WaitEvent;
pub use kspin::{SpinMutex, SpinMutexGuard};
pub use sleep::{SleepMutex, SleepMutexGuard};
pub use spin::{Lazy, Once};
