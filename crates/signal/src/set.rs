use core::fmt;

use bitflags::bitflags;
use defines::signal;

/// 信号编号，有效范围 1..=63。
///
/// 1..32 是标准信号，[`Signal::SIGRTMIN`]..=[`Signal::SIGRTMAX`] 是实时信号
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signal(u8);

macro_rules! named_signals {
    ($($name:ident,)*) => {
        $(pub const $name: Signal = Signal(signal::$name);)*

        fn name_of(self) -> Option<&'static str> {
            match self.0 {
                $(signal::$name => Some(stringify!($name)),)*
                _ => None,
            }
        }
    };
}

impl Signal {
    #[rustfmt::skip]
    named_signals!(
        SIGHUP, SIGINT, SIGQUIT, SIGILL, SIGTRAP, SIGABRT, SIGBUS, SIGFPE,
        SIGKILL, SIGUSR1, SIGSEGV, SIGUSR2, SIGPIPE, SIGALRM, SIGTERM,
        SIGSTKFLT, SIGCHLD, SIGCONT, SIGSTOP, SIGTSTP, SIGTTIN, SIGTTOU,
        SIGURG, SIGXCPU, SIGXFSZ, SIGVTALRM, SIGPROF, SIGWINCH, SIGIO,
        SIGPWR, SIGSYS,
    );

    pub const SIGRTMIN: Signal = Signal(signal::SIGRTMIN);
    pub const SIGRTMAX: Signal = Signal(signal::SIGRTMAX);

    pub fn from_user(signum: usize) -> Option<Signal> {
        if (1..signal::SIGSET_SIZE).contains(&signum) {
            Some(Signal(signum as u8))
        } else {
            None
        }
    }

    pub fn to_user(self) -> usize {
        self.0 as usize
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn is_realtime(self) -> bool {
        self.0 >= signal::SIGRTMIN
    }

    /// KILL 和 STOP 不可阻塞、不可忽略、不可安装 handler
    pub fn is_unalterable(self) -> bool {
        self == Signal::SIGKILL || self == Signal::SIGSTOP
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name_of() {
            Some(name) => f.write_str(name),
            None => write!(f, "SIGRT{}", self.0 - signal::SIGRTMIN),
        }
    }
}

bitflags! {
    /// 64 位的信号集，信号 `n` 对应第 `n - 1` 位
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct SignalSet: u64 {
        const SIGHUP = 1 << (signal::SIGHUP - 1);
        const SIGINT = 1 << (signal::SIGINT - 1);
        const SIGQUIT = 1 << (signal::SIGQUIT - 1);
        const SIGILL = 1 << (signal::SIGILL - 1);
        const SIGTRAP = 1 << (signal::SIGTRAP - 1);
        const SIGABRT = 1 << (signal::SIGABRT - 1);
        const SIGBUS = 1 << (signal::SIGBUS - 1);
        const SIGFPE = 1 << (signal::SIGFPE - 1);
        const SIGKILL = 1 << (signal::SIGKILL - 1);
        const SIGUSR1 = 1 << (signal::SIGUSR1 - 1);
        const SIGSEGV = 1 << (signal::SIGSEGV - 1);
        const SIGUSR2 = 1 << (signal::SIGUSR2 - 1);
        const SIGPIPE = 1 << (signal::SIGPIPE - 1);
        const SIGALRM = 1 << (signal::SIGALRM - 1);
        const SIGTERM = 1 << (signal::SIGTERM - 1);
        const SIGSTKFLT = 1 << (signal::SIGSTKFLT - 1);
        const SIGCHLD = 1 << (signal::SIGCHLD - 1);
        const SIGCONT = 1 << (signal::SIGCONT - 1);
        const SIGSTOP = 1 << (signal::SIGSTOP - 1);
        const SIGTSTP = 1 << (signal::SIGTSTP - 1);
        const SIGTTIN = 1 << (signal::SIGTTIN - 1);
        const SIGTTOU = 1 << (signal::SIGTTOU - 1);
        const SIGURG = 1 << (signal::SIGURG - 1);
        const SIGXCPU = 1 << (signal::SIGXCPU - 1);
        const SIGXFSZ = 1 << (signal::SIGXFSZ - 1);
        const SIGVTALRM = 1 << (signal::SIGVTALRM - 1);
        const SIGPROF = 1 << (signal::SIGPROF - 1);
        const SIGWINCH = 1 << (signal::SIGWINCH - 1);
        const SIGIO = 1 << (signal::SIGIO - 1);
        const SIGPWR = 1 << (signal::SIGPWR - 1);
        const SIGSYS = 1 << (signal::SIGSYS - 1);
        // 实时信号 32..=63 没有具名位，但同样是有效编号
        const _ = !(1 << 63);
    }
}

impl SignalSet {
    /// 无论用户怎么请求都不允许阻塞的信号
    pub const NEVER_BLOCKED: SignalSet = SignalSet::SIGKILL
        .union(SignalSet::SIGSTOP)
        .union(SignalSet::SIGCONT);

    /// 绕过掩码检查的信号，见非可屏蔽信号预检
    pub const NON_MASKABLE: SignalSet = SignalSet::SIGKILL.union(SignalSet::SIGSTOP);

    /// 停止进程的信号。它们与待决的 `SIGCONT` 互相抵消
    pub const STOP_CLASS: SignalSet = SignalSet::SIGSTOP
        .union(SignalSet::SIGTSTP)
        .union(SignalSet::SIGTTIN)
        .union(SignalSet::SIGTTOU);

    /// 集合中编号最小的信号。标准信号因此总是优先于实时信号
    pub fn first_pending(self) -> Option<Signal> {
        Signal::from_user(self.bits().trailing_zeros() as usize + 1)
    }

    /// 按编号从小到大遍历集合里的信号
    pub fn signals(self) -> impl Iterator<Item = Signal> {
        let mut rest = self;
        core::iter::from_fn(move || {
            let signal = rest.first_pending()?;
            rest.remove(signal.into());
            Some(signal)
        })
    }
}

impl From<Signal> for SignalSet {
    fn from(value: Signal) -> Self {
        Self::from_bits_truncate(1 << (value.number() - 1))
    }
}

impl fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.signals()).finish()
    }
}
