use super::rotation::{RotatingFile, RotationPolicy};
use super::{level_name, record_fields, LoggingError};
use crate::app::models::AppConfig;
use chrono::{DateTime, Local};
use log::{Level, LevelFilter, Record};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// A placeholder in the log file format, e.g. `%(asctime)s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatField {
    AscTime,
    Created,
    LevelName,
    LevelNo,
    Name,
    Message,
    Module,
    PathName,
    FileName,
    LineNo,
    Process,
    Thread,
}

impl FormatField {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "asctime" => FormatField::AscTime,
            "created" => FormatField::Created,
            "levelname" => FormatField::LevelName,
            "levelno" => FormatField::LevelNo,
            "name" => FormatField::Name,
            "message" => FormatField::Message,
            "module" => FormatField::Module,
            "pathname" => FormatField::PathName,
            "filename" => FormatField::FileName,
            "lineno" => FormatField::LineNo,
            "process" => FormatField::Process,
            "thread" => FormatField::Thread,
            _ => return None,
        })
    }

    fn key(self) -> &'static str {
        match self {
            FormatField::AscTime => "asctime",
            FormatField::Created => "created",
            FormatField::LevelName => "levelname",
            FormatField::LevelNo => "levelno",
            FormatField::Name => "name",
            FormatField::Message => "message",
            FormatField::Module => "module",
            FormatField::PathName => "pathname",
            FormatField::FileName => "filename",
            FormatField::LineNo => "lineno",
            FormatField::Process => "process",
            FormatField::Thread => "thread",
        }
    }

    fn value(self, record: &Record, now: &DateTime<Local>) -> Value {
        match self {
            FormatField::AscTime => now.format("%Y-%m-%d %H:%M:%S,%3f").to_string().into(),
            FormatField::Created => (now.timestamp_millis() as f64 / 1000.0).into(),
            FormatField::LevelName => level_name(record.level()).into(),
            FormatField::LevelNo => level_number(record.level()).into(),
            FormatField::Name => record.target().into(),
            FormatField::Message => record.args().to_string().into(),
            FormatField::Module => record.module_path().into(),
            FormatField::PathName => record.file().into(),
            FormatField::FileName => record
                .file()
                .and_then(|file| Path::new(file).file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .into(),
            FormatField::LineNo => record.line().into(),
            FormatField::Process => std::process::id().into(),
            FormatField::Thread => {
                let thread = std::thread::current();
                thread
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{:?}", thread.id()))
                    .into()
            }
        }
    }
}

fn level_number(level: Level) -> u8 {
    match level {
        Level::Error => 40,
        Level::Warn => 30,
        Level::Info => 20,
        Level::Debug => 10,
        Level::Trace => 5,
    }
}

/// Picks the `%(name)s` placeholders out of a format string, in order.
fn parse_format(format: &str) -> Result<Vec<FormatField>, LoggingError> {
    let mut fields = Vec::new();
    let mut rest = format;
    while let Some(start) = rest.find("%(") {
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            break;
        };
        let name = &after[..end];
        let field = FormatField::from_name(name)
            .ok_or_else(|| LoggingError::UnknownField(name.to_string()))?;
        if !fields.contains(&field) {
            fields.push(field);
        }
        rest = &after[end + 1..];
    }
    Ok(fields)
}

/// Writes records as JSON lines to a rotating file.
pub(super) struct FileSink {
    level: LevelFilter,
    fields: Vec<FormatField>,
    writer: RotatingFile,
}

impl FileSink {
    pub(super) fn open(path: &Path, config: &AppConfig) -> Result<Self, LoggingError> {
        let fields = parse_format(&config.log_file_format)?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let policy = match config.log_when_to_rotate {
            Some(when) => RotationPolicy::Time(when),
            None => RotationPolicy::Size(config.log_max_bytes),
        };
        let writer = RotatingFile::open(path, policy, config.log_max_files).map_err(|source| {
            LoggingError::OpenFile {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(Self {
            level: config
                .log_level
                .map_or(LevelFilter::Trace, |level| level.level_filter()),
            fields,
            writer,
        })
    }

    pub(super) fn level(&self) -> LevelFilter {
        self.level
    }

    pub(super) fn set_level(&mut self, level: LevelFilter) {
        self.level = level;
    }

    pub(super) fn log(&mut self, record: &Record) {
        if record.level() > self.level {
            return;
        }
        let now = Local::now();
        let line = self.format(record, &now);
        if let Err(err) = self.writer.write_line(&line, now) {
            eprintln!("Failed to write to log file: {}", err);
        }
    }

    pub(super) fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            eprintln!("Failed to flush log file: {}", err);
        }
    }

    fn format(&self, record: &Record, now: &DateTime<Local>) -> String {
        let mut entry = Map::new();
        for field in &self.fields {
            entry.insert(field.key().to_string(), field.value(record, now));
        }
        for (key, value) in record_fields(record) {
            entry.insert(key, value);
        }
        Value::Object(entry).to_string()
    }
}
