use crate::app::models::RotateWhen;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RotationPolicy {
    /// Roll over before the file would reach this many bytes. Zero disables rotation.
    Size(u64),
    Time(RotateWhen),
}

impl RotateWhen {
    fn interval(self) -> TimeDelta {
        match self {
            RotateWhen::Second => TimeDelta::seconds(1),
            RotateWhen::Minute => TimeDelta::minutes(1),
            RotateWhen::Hour => TimeDelta::hours(1),
            RotateWhen::Day | RotateWhen::Midnight => TimeDelta::days(1),
            RotateWhen::Weekday(_) => TimeDelta::days(7),
        }
    }

    /// strftime pattern appended to rotated file names.
    fn suffix_format(self) -> &'static str {
        match self {
            RotateWhen::Second => "%Y-%m-%d_%H-%M-%S",
            RotateWhen::Minute => "%Y-%m-%d_%H-%M",
            RotateWhen::Hour => "%Y-%m-%d_%H",
            RotateWhen::Day | RotateWhen::Midnight | RotateWhen::Weekday(_) => "%Y-%m-%d",
        }
    }

    /// The first rollover strictly after `base`.
    pub(super) fn next_rollover(self, base: DateTime<Local>) -> DateTime<Local> {
        match self {
            RotateWhen::Midnight => local_midnight(base.date_naive() + Days::new(1)),
            RotateWhen::Weekday(day) => {
                let today = base.weekday().num_days_from_monday();
                let target = day.num_days_from_monday();
                let wait = match (target + 7 - today) % 7 {
                    0 => 7,
                    days => days,
                };
                local_midnight(base.date_naive() + Days::new(u64::from(wait)))
            }
            _ => base + self.interval(),
        }
    }
}

fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    let naive = date.and_time(NaiveTime::MIN);
    naive
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// An append-only file that rolls itself over by size or on a schedule.
pub(super) struct RotatingFile {
    path: PathBuf,
    policy: RotationPolicy,
    backups: usize,
    file: File,
    size: u64,
    rollover_at: Option<DateTime<Local>>,
}

impl RotatingFile {
    pub(super) fn open(path: &Path, policy: RotationPolicy, backups: usize) -> io::Result<Self> {
        Self::open_at(path, policy, backups, Local::now())
    }

    fn open_at(
        path: &Path,
        policy: RotationPolicy,
        backups: usize,
        now: DateTime<Local>,
    ) -> io::Result<Self> {
        // A pre-existing file keeps the schedule it started with.
        let started = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => DateTime::<Local>::from(modified),
            Err(_) => now,
        };
        let file = open_append(path)?;
        let size = file.metadata()?.len();
        let rollover_at = match policy {
            RotationPolicy::Time(when) => Some(when.next_rollover(started)),
            RotationPolicy::Size(_) => None,
        };

        Ok(Self {
            path: path.to_path_buf(),
            policy,
            backups,
            file,
            size,
            rollover_at,
        })
    }

    pub(super) fn write_line(&mut self, line: &str, now: DateTime<Local>) -> io::Result<()> {
        let incoming = line.len() as u64 + 1;
        if self.should_roll_over(incoming, now) {
            self.roll_over(now)?;
        }
        writeln!(self.file, "{}", line)?;
        self.size += incoming;
        Ok(())
    }

    pub(super) fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn should_roll_over(&self, incoming: u64, now: DateTime<Local>) -> bool {
        match self.policy {
            RotationPolicy::Size(max_bytes) => {
                max_bytes > 0
                    && self.backups > 0
                    && self.size > 0
                    && self.size + incoming >= max_bytes
            }
            RotationPolicy::Time(_) => self.rollover_at.is_some_and(|at| now >= at),
        }
    }

    fn roll_over(&mut self, now: DateTime<Local>) -> io::Result<()> {
        self.file.flush()?;
        match self.policy {
            RotationPolicy::Size(_) => self.shift_numbered()?,
            RotationPolicy::Time(when) => {
                let Some(at) = self.rollover_at else {
                    return Ok(());
                };
                let stamp = (at - when.interval()).format(when.suffix_format()).to_string();
                let target = with_suffix(&self.path, &stamp);
                if target.exists() {
                    fs::remove_file(&target)?;
                }
                fs::rename(&self.path, &target)?;
                self.prune_dated(when)?;

                let mut next = when.next_rollover(now);
                while next <= now {
                    next += when.interval();
                }
                self.rollover_at = Some(next);
            }
        }
        self.file = open_append(&self.path)?;
        self.size = 0;
        Ok(())
    }

    /// app.log -> app.log.1 -> app.log.2 ..., dropping whatever falls off the end.
    fn shift_numbered(&self) -> io::Result<()> {
        for index in (1..self.backups).rev() {
            let source = with_suffix(&self.path, &index.to_string());
            if !source.exists() {
                continue;
            }
            let target = with_suffix(&self.path, &(index + 1).to_string());
            if target.exists() {
                fs::remove_file(&target)?;
            }
            fs::rename(&source, &target)?;
        }
        let first = with_suffix(&self.path, "1");
        if first.exists() {
            fs::remove_file(&first)?;
        }
        fs::rename(&self.path, &first)
    }

    /// Deletes the oldest dated backups beyond the retention count. Zero keeps everything.
    fn prune_dated(&self, when: RotateWhen) -> io::Result<()> {
        if self.backups == 0 {
            return Ok(());
        }
        let (Some(dir), Some(base)) = (self.path.parent(), self.path.file_name()) else {
            return Ok(());
        };
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let prefix = format!("{}.", base.to_string_lossy());
        let suffix_len = Local::now().format(when.suffix_format()).to_string().len();

        let mut dated: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.strip_prefix(&prefix).is_some_and(|suffix| {
                    suffix.len() == suffix_len
                        && suffix
                            .chars()
                            .all(|c| c.is_ascii_digit() || c == '-' || c == '_')
                })
            })
            .map(|entry| entry.path())
            .collect();
        if dated.len() <= self.backups {
            return Ok(());
        }
        dated.sort();
        let excess = dated.len() - self.backups;
        for old in dated.into_iter().take(excess) {
            fs::remove_file(old)?;
        }
        Ok(())
    }
}
