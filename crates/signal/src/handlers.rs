use defines::signal::{KSignalAction, SIGSET_SIZE};

use crate::Signal;

/// 未安装 handler 时信号的默认行为
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    Ignore,
    CoreDump,
    Stop,
    Continue,
}

impl DefaultAction {
    pub fn of(signal: Signal) -> Self {
        match signal {
            Signal::SIGABRT
            | Signal::SIGBUS
            | Signal::SIGFPE
            | Signal::SIGILL
            | Signal::SIGQUIT
            | Signal::SIGSEGV
            | Signal::SIGSYS
            | Signal::SIGTRAP
            | Signal::SIGXCPU
            | Signal::SIGXFSZ => DefaultAction::CoreDump,
            Signal::SIGCHLD | Signal::SIGURG | Signal::SIGWINCH | Signal::SIGIO => {
                DefaultAction::Ignore
            }
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                DefaultAction::Stop
            }
            Signal::SIGCONT => DefaultAction::Continue,
            // 包括全部实时信号
            _ => DefaultAction::Terminate,
        }
    }
}

/// 由进程持有
#[derive(Clone)]
pub struct SignalHandlers {
    actions: [KSignalAction; SIGSET_SIZE],
}

impl SignalHandlers {
    pub const fn new() -> Self {
        const DEFAULT_ACTION: KSignalAction = KSignalAction::new();
        Self {
            actions: [DEFAULT_ACTION; SIGSET_SIZE],
        }
    }

    pub fn action(&self, signal: Signal) -> &KSignalAction {
        &self.actions[signal.number() as usize]
    }

    pub fn action_mut(&mut self, signal: Signal) -> &mut KSignalAction {
        &mut self.actions[signal.number() as usize]
    }

    /// `execve` 时调用：有 handler 的信号回到默认行为
    pub fn reset(&mut self) {
        for action in &mut self.actions {
            *action = KSignalAction::new();
        }
    }
}

impl Default for SignalHandlers {
    fn default() -> Self {
        Self::new()
    }
}
