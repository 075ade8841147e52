/// 各级别宏的公共入口。`CLOG` 是编译期常量，低于它的调用整体消失
#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)+) => {{
        if $level <= $crate::CLOG {
            $crate::log_impl($level, ::core::format_args!($($arg)+));
        }
    }};
}

/// 用法同 `format!`
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => ($crate::log!($crate::Level::Error, $($arg)+))
}

/// 用法同 `format!`
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => ($crate::log!($crate::Level::Warn, $($arg)+))
}

/// 用法同 `format!`
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => ($crate::log!($crate::Level::Info, $($arg)+))
}

/// 用法同 `format!`
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => ($crate::log!($crate::Level::Debug, $($arg)+))
}

/// 用法同 `format!`
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => ($crate::log!($crate::Level::Trace, $($arg)+))
}
