#![cfg_attr(not(test), no_std)]

#[macro_use]
mod macros;
mod level;
mod record;

use core::fmt::Write;

use anstyle::{AnsiColor, Reset};
use klocks::Once;
pub use level::{Level, LevelFilter, CLOG};
pub use record::Record;

/// 日志的输出端，由内核在启动时注册一个
pub trait Sink: Send + Sync {
    fn write_record(&self, record: &Record<'_>);
}

static SINK: Once<&'static dyn Sink> = Once::new();

pub fn init(sink: &'static dyn Sink) {
    SINK.call_once(|| sink);
}

/// 渲染一条日志，供 [`Sink`] 实现使用。
///
/// 形如 `[ INFO] message`，级别部分着色
pub fn format_record(writer: &mut impl Write, record: &Record<'_>) -> core::fmt::Result {
    let color = match record.level() {
        Level::Error => AnsiColor::Red,
        Level::Warn => AnsiColor::BrightYellow,
        Level::Info => AnsiColor::Blue,
        Level::Debug => AnsiColor::Green,
        Level::Trace => AnsiColor::BrightBlack,
    };
    write!(
        writer,
        "{}[{:>5}]{} ",
        color.render_fg(),
        record.level(),
        Reset.render()
    )?;
    writeln!(writer, "{}", record.args())
}

#[inline]
#[doc(hidden)]
pub fn log_impl(level: Level, args: core::fmt::Arguments<'_>) {
    if level <= CLOG {
        if let Some(sink) = SINK.get() {
            sink.write_record(&Record::new(level, args));
        }
    }
}
