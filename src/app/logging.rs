mod console;
mod file;
mod rotation;

#[cfg(test)]
pub(crate) use self::console::CaptureBuffer;
pub use self::console::ConsoleStyle;
use self::console::{ConsoleOutput, ConsoleSink};
use self::file::FileSink;

use crate::app::models::{AppConfig, Verbosity};
use log::kv::{self, Key, Source, VisitSource};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use thiserror::Error;

/// Structured field holding error detail. Only the log file records it.
pub const EXC_INFO: &str = "exc_info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open log file {path:?}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unknown field '{0}' in log file format")]
    UnknownField(String),
    #[error("Another logger is already installed")]
    AlreadyInstalled,
}

#[derive(Default)]
struct SinkRegistry {
    console: Mutex<Option<ConsoleSink>>,
    file: Mutex<Option<FileSink>>,
}

impl SinkRegistry {
    fn log(&self, record: &Record) {
        if let Some(console) = lock(&self.console).as_ref() {
            console.log(record);
        }
        if let Some(file) = lock(&self.file).as_mut() {
            file.log(record);
        }
    }

    fn flush(&self) {
        if let Some(console) = lock(&self.console).as_ref() {
            console.flush();
        }
        if let Some(file) = lock(&self.file).as_mut() {
            file.flush();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the console and file sinks for one run of the application.
///
/// Sinks are created at most once per context. Later calls to [`LoggingContext::configure`]
/// only move their thresholds.
pub struct LoggingContext {
    registry: Arc<SinkRegistry>,
    console_output: ConsoleOutput,
    console_style: ConsoleStyle,
}

impl LoggingContext {
    /// A context whose console sink writes to stdout, styled for whatever stdout is attached to.
    pub fn new() -> Self {
        Self {
            registry: Arc::default(),
            console_output: ConsoleOutput::Stdout,
            console_style: ConsoleStyle::detect(),
        }
    }

    /// Creates missing sinks and updates thresholds from `config`.
    ///
    /// Without a config only an ERROR-level console sink is set up.
    pub fn configure(&self, config: Option<&AppConfig>) -> Result<(), LoggingError> {
        let verbosity = config.map_or(Verbosity::Error, |config| config.verbosity);
        lock(&self.registry.console)
            .get_or_insert_with(|| ConsoleSink::new(&self.console_output, self.console_style))
            .set_level(verbosity.level_filter());

        let Some(config) = config else {
            return Ok(());
        };
        let Some(path) = config.log_file() else {
            return Ok(());
        };

        let mut file = lock(&self.registry.file);
        if file.is_none() {
            *file = Some(FileSink::open(path, config)?);
        }
        if let (Some(sink), Some(level)) = (file.as_mut(), config.log_level) {
            sink.set_level(level.level_filter());
        }
        Ok(())
    }

    /// Routes the process-wide `log` macros to this context, replacing any previously
    /// installed context.
    pub fn install(&self) -> Result<(), LoggingError> {
        *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&self.registry));

        let installed = *INSTALLED.get_or_init(|| {
            log::set_logger(&DISPATCHER)
                .map(|()| log::set_max_level(LevelFilter::Trace))
                .is_ok()
        });
        if installed {
            Ok(())
        } else {
            Err(LoggingError::AlreadyInstalled)
        }
    }

    pub fn sink_count(&self) -> usize {
        usize::from(lock(&self.registry.console).is_some())
            + usize::from(lock(&self.registry.file).is_some())
    }

    pub fn console_level(&self) -> Option<LevelFilter> {
        lock(&self.registry.console).as_ref().map(ConsoleSink::level)
    }

    pub fn file_level(&self) -> Option<LevelFilter> {
        lock(&self.registry.file).as_ref().map(FileSink::level)
    }
}

static ACTIVE: RwLock<Option<Arc<SinkRegistry>>> = RwLock::new(None);
static INSTALLED: OnceLock<bool> = OnceLock::new();
static DISPATCHER: Dispatcher = Dispatcher;

/// The process-wide logger. It lets everything through; the sinks do the filtering.
struct Dispatcher;

impl Dispatcher {
    fn active() -> Option<Arc<SinkRegistry>> {
        ACTIVE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Log for Dispatcher {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Some(registry) = Self::active() {
            registry.log(record);
        }
    }

    fn flush(&self) {
        if let Some(registry) = Self::active() {
            registry.flush();
        }
    }
}

/// Name of a level as it appears in headers and log files.
pub(crate) fn level_name(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// The structured key-values attached to a record, in order.
pub(crate) fn record_fields(record: &Record) -> Vec<(String, serde_json::Value)> {
    let mut collector = FieldCollector(Vec::new());
    // Collecting never fails.
    let _ = record.key_values().visit(&mut collector);
    collector.0
}

struct FieldCollector(Vec<(String, serde_json::Value)>);

impl<'kvs> VisitSource<'kvs> for FieldCollector {
    fn visit_pair(&mut self, key: Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        let json = if let Some(flag) = value.to_bool() {
            serde_json::Value::Bool(flag)
        } else if let Some(number) = value.to_i64() {
            number.into()
        } else if let Some(number) = value.to_u64() {
            number.into()
        } else {
            value
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(value.to_string()))
        };
        self.0.push((key.as_str().to_string(), json));
        Ok(())
    }
}

#[cfg(test)]
impl LoggingContext {
    /// A context whose console output is kept in memory.
    pub(crate) fn capturing(style: ConsoleStyle) -> (Self, CaptureBuffer) {
        let buffer = CaptureBuffer::default();
        let context = Self {
            registry: Arc::default(),
            console_output: ConsoleOutput::Capture(buffer.clone()),
            console_style: style,
        };
        (context, buffer)
    }
}

#[cfg(test)]
impl Log for LoggingContext {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.registry.log(record);
    }

    fn flush(&self) {
        self.registry.flush();
    }
}
