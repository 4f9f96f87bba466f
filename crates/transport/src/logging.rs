//! Logging configuration.
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::filter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(val: LogLevel) -> Self {
        match val {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            x => Err(Error::InvalidLoggingLevel(x.to_string())),
        }
    }
}

/// Record panics as `tracing` events at the `ERROR` level.
pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(l) => tracing::error!("{} at {}:{}:{}", panic, l.file(), l.line(), l.column()),
        None => tracing::error!("{}", panic),
    }));
}

/// Install a stderr subscriber filtered at `level`.
/// Calling it again is harmless, later calls are ignored.
pub fn init_logging(level: LogLevel) {
    set_panic_hook();

    let subscriber = Registry::default();
    let level_filter = filter::LevelFilter::from_level(level.into());

    // Stderr
    let subscriber = subscriber.with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(level_filter),
    );
    // Enable log compatible layer to convert log record to tracing span.
    // We will ignore any errors that returned by this functions.
    let _ = LogTracer::init();

    // Ignore errors returned by set_global_default.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
