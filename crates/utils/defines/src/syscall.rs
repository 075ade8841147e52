macro_rules! declare_syscall_id {
    ($($name:tt, $id:literal,)*) => {
        $(pub const $name: usize = $id;)*
        pub fn name(id: usize) -> &'static str {
            match id {
                $($id => stringify!($name),)*
                _ => "UNKNOWN",
            }
        }
    };
}

#[rustfmt::skip]
declare_syscall_id!(
    EXIT_THREAD,            1,
    EXIT_PROCESS,           2,
    SET_SIGNAL_HANDLER,     3,
    RESTORE_CONTEXT,        4,
    SEND_SIGNAL,            5,
    SET_SIGNAL_BEHAVIOR,    6,
    WAIT_FOR_CHILD,         7,
    SUSPEND_EXECUTION,      8,
    TIMER_CONTROL,          9,
    SET_ITIMER,             10,
    QUERY_TIME_COUNTER,     11,
    USER_LOCK,              12,
    SCHED_YIELD,            13,
);
