use chrono::Weekday;
use clap::ValueEnum;
use log::LevelFilter;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output detail, from quietest to most detailed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
#[value(rename_all = "UPPER")]
pub enum Verbosity {
    #[serde(rename = "NONE")]
    #[value(name = "NONE")]
    Silent,
    #[default]
    Error,
    Info,
    Debug,
}

impl Verbosity {
    pub const ALL: [Verbosity; 4] = [
        Verbosity::Silent,
        Verbosity::Error,
        Verbosity::Info,
        Verbosity::Debug,
    ];

    /// Maps a `-v` count (`-1` for `-q`) onto a level, clamping out-of-range counts.
    pub fn from_count(count: i32) -> Self {
        let last = Self::ALL.len() as i32 - 1;
        let index = count.saturating_add(1).clamp(0, last);
        Self::ALL[index as usize]
    }

    pub fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Silent => LevelFilter::Off,
            Verbosity::Error => LevelFilter::Error,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Silent => "NONE",
            Verbosity::Error => "ERROR",
            Verbosity::Info => "INFO",
            Verbosity::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a time-rotated log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RotateWhen {
    Second,
    Minute,
    Hour,
    Day,
    Midnight,
    /// Midnight before the given weekday.
    Weekday(Weekday),
}

impl FromStr for RotateWhen {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let when = s.trim().to_uppercase();
        match when.as_str() {
            "S" => Ok(RotateWhen::Second),
            "M" => Ok(RotateWhen::Minute),
            "H" => Ok(RotateWhen::Hour),
            "D" => Ok(RotateWhen::Day),
            "MIDNIGHT" => Ok(RotateWhen::Midnight),
            _ => when
                .strip_prefix('W')
                .and_then(|day| day.parse::<u8>().ok())
                .and_then(|day| Weekday::try_from(day).ok())
                .map(RotateWhen::Weekday)
                .ok_or_else(|| {
                    format!("invalid rotation interval '{s}' (expected S, M, H, D, midnight or W0-W6)")
                }),
        }
    }
}

impl TryFrom<String> for RotateWhen {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RotateWhen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotateWhen::Second => f.write_str("S"),
            RotateWhen::Minute => f.write_str("M"),
            RotateWhen::Hour => f.write_str("H"),
            RotateWhen::Day => f.write_str("D"),
            RotateWhen::Midnight => f.write_str("midnight"),
            RotateWhen::Weekday(day) => write!(f, "W{}", day.num_days_from_monday()),
        }
    }
}

impl From<RotateWhen> for String {
    fn from(value: RotateWhen) -> Self {
        value.to_string()
    }
}

/// Represents the final configuration after merging defaults, the config file and CLI args.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub verbosity: Verbosity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub log_file_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<Verbosity>,
    pub log_max_bytes: u64,
    pub log_max_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_when_to_rotate: Option<RotateWhen>,
    pub dryrun: bool,
    pub paths: Vec<String>,
    /// Keys without a dedicated field, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl AppConfig {
    /// The log file path, if file logging is enabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

/// A partial configuration: one layer of the merge. Unset fields leave lower layers alone.
///
/// Nullable settings are doubly optional: `Some(None)` is an explicit `null` that clears
/// the value underneath.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigLayer {
    #[serde(default, deserialize_with = "present")]
    pub config_file: Option<Option<PathBuf>>,
    pub verbosity: Option<Verbosity>,
    #[serde(default, deserialize_with = "present")]
    pub log_file: Option<Option<PathBuf>>,
    pub log_file_format: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub log_level: Option<Option<Verbosity>>,
    pub log_max_bytes: Option<u64>,
    pub log_max_files: Option<usize>,
    #[serde(default, deserialize_with = "present")]
    pub log_when_to_rotate: Option<Option<RotateWhen>>,
    pub dryrun: Option<bool>,
    pub paths: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A key that is present, possibly with a `null` value. Absent keys fall back to `default`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
