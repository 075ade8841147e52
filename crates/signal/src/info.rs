use defines::signal::SigInfo;
use extend::ext;
use num_enum::TryFromPrimitive;

use crate::Signal;

/// 信号来源，存放在 [`SigInfo::code`] 中。
///
/// 非正值是用户态可伪造的来源，正值只能由内核生成，
/// 其中子进程类的 code 同时充当 `wait_for_child` 的事件原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(isize)]
pub enum SigCode {
    /// `send_signal` 发出的
    User = 0,
    /// 带附加参数的实时信号
    Queue = -1,
    /// 进程定时器到期
    Timer = -2,
    /// 内核自身产生，如运行时定时器或同步错误
    Kernel = -3,

    ChildExited = 1,
    ChildKilled = 2,
    ChildDumped = 3,
    ChildTrapped = 4,
    ChildStopped = 5,
    ChildContinued = 6,
}

impl SigCode {
    pub fn is_child_event(self) -> bool {
        self as isize > 0
    }

    /// 用户态只允许声明非正的 code
    pub fn from_user(code: isize) -> Option<SigCode> {
        let code = SigCode::try_from(code).ok()?;
        if code.is_child_event() {
            return None;
        }
        Some(code)
    }
}

#[ext(name = SigInfoExt)]
pub impl SigInfo {
    fn user_sent(signal: Signal, code: SigCode, sender_pid: usize, sender_uid: usize) -> SigInfo {
        SigInfo {
            signo: signal.to_user(),
            code: code as isize,
            sender_pid,
            sender_uid,
            status: 0,
            parameter: 0,
        }
    }

    fn for_kernel(signal: Signal) -> SigInfo {
        SigInfo {
            signo: signal.to_user(),
            code: SigCode::Kernel as isize,
            ..SigInfo::default()
        }
    }

    fn for_child(signal: Signal, reason: SigCode, child_pid: usize, status: isize) -> SigInfo {
        SigInfo {
            signo: signal.to_user(),
            code: reason as isize,
            sender_pid: child_pid,
            sender_uid: 0,
            status,
            parameter: 0,
        }
    }

    fn signal(&self) -> Option<Signal> {
        Signal::from_user(self.signo)
    }

    fn sig_code(&self) -> Option<SigCode> {
        SigCode::try_from(self.code).ok()
    }
}
