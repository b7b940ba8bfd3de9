//! Forwards `log` records from the key custody core to the host app.
//!
//! Records reach the host as [`LogRecord`]s tagged with the component that
//! emitted them, so a mobile app can route keystore, provider and transport
//! lines to separate channels.

use std::sync::{Arc, OnceLock};

/// Receives log records from the key custody core.
///
/// Implemented by the host application and installed once with [`set_logger`].
///
/// ```rust
/// use keycustody_core::logger::{LogRecord, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, record: LogRecord) {
///         eprintln!("[{:?}] {}: {}", record.level, record.component, record.message);
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// object KeyCustodyLogger : Logger {
///     override fun log(record: LogRecord) {
///         Timber.tag("keycustody/${record.component}").log(record.level.toPriority(), record.message)
///     }
/// }
///
/// setLogger(KeyCustodyLogger, LogLevel.INFO) // once, in Application.onCreate
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    fn log(&self, record: LogRecord);
}

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    Trace,
    Debug,
    /// Progress of key operations.
    Info,
    /// Recoverable problems, such as a failed cleanup step.
    Warn,
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

/// One forwarded log line.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Module inside the core (`provider::local`, `http_request`), or the
    /// crate name for records from dependencies (`reqwest`).
    pub component: String,
    pub message: String,
}

const CRATE_PREFIX: &str = "keycustody_core";

struct ForeignLogger {
    sink: Arc<dyn Logger>,
    max_level: log::LevelFilter,
}

impl ForeignLogger {
    /// Debug and trace records from dependencies are never forwarded; `reqwest`
    /// and `hyper` are too chatty at those levels.
    fn accepts(&self, level: log::Level, target: &str) -> bool {
        if level > self.max_level {
            return false;
        }
        target.starts_with(CRATE_PREFIX) || level <= log::Level::Info
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.accepts(metadata.level(), metadata.target())
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.sink.log(LogRecord {
            level: record.level().into(),
            component: component(record.target()),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

fn component(target: &str) -> String {
    match target.strip_prefix(CRATE_PREFIX) {
        Some("") => "core".to_string(),
        Some(rest) => rest.trim_start_matches("::").to_string(),
        None => target.split("::").next().unwrap_or(target).to_string(),
    }
}

static FORWARDER: OnceLock<ForeignLogger> = OnceLock::new();

/// Installs the process-wide logger, forwarding records up to `max_level`.
///
/// Only the first call has an effect; later calls are reported on stderr and
/// otherwise ignored.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>, max_level: LogLevel) {
    let forwarder = ForeignLogger {
        sink: logger,
        max_level: max_level.into(),
    };
    if FORWARDER.set(forwarder).is_err() {
        eprintln!("keycustody logger already set");
        return;
    }
    let Some(forwarder) = FORWARDER.get() else {
        return;
    };
    if let Err(e) = log::set_logger(forwarder) {
        eprintln!("failed to install keycustody logger: {e}");
        return;
    }
    log::set_max_level(forwarder.max_level);
}
