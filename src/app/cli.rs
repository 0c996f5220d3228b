use crate::app::models::{AppConfig, ConfigLayer, Verbosity};
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "An example command line interface with layered configuration and logging"
)]
pub struct Cli {
    /// Content to be processed
    #[arg(value_name = "content")]
    pub paths: Vec<String>,

    /// Set output verbosity (-v = INFO, -vv = DEBUG)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbosity: u8,

    /// Do not output anything
    #[arg(short, long)]
    pub quiet: bool,

    /// Read configuration from this file (YAML format)
    #[arg(long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Set logging level for the log file
    #[arg(long = "loglevel", value_name = "LEVEL", value_enum, ignore_case = true)]
    pub log_level: Option<Verbosity>,

    /// Do not do anything
    #[arg(long)]
    pub dryrun: bool,
}

impl Cli {
    /// Parses `argv`, showing the defaults in `--help`. Exits on usage errors.
    pub fn parse_with_defaults(defaults: &AppConfig) -> Self {
        let matches = Self::command()
            .after_help(usage(defaults))
            .get_matches();
        Self::from_arg_matches(&matches).unwrap_or_else(|err| err.exit())
    }

    /// `-v` count, or `-1` for `-q`.
    pub fn verbosity_count(&self) -> i32 {
        if self.quiet {
            -1
        } else {
            i32::from(self.verbosity)
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_count(self.verbosity_count())
    }

    /// The configuration layer the command line contributes. Unset options stay unset.
    pub fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            config_file: self.config.clone().map(Some),
            verbosity: Some(self.verbosity()),
            log_level: self.log_level.map(Some),
            dryrun: self.dryrun.then_some(true),
            paths: Some(self.paths.clone()),
            ..Default::default()
        }
    }
}

fn usage(defaults: &AppConfig) -> String {
    let rendered = serde_yaml::to_string(defaults)
        .unwrap_or_else(|err| format!("<unavailable: {}>\n", err));
    let indented: String = rendered
        .lines()
        .map(|line| format!("  {line}\n"))
        .collect();
    format!("Default configuration:\n{indented}")
}
