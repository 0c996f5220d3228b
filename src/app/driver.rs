use crate::app::cli::Cli;
use crate::app::config::merge;
use crate::app::logging::LoggingContext;
use crate::app::models::{AppConfig, Verbosity};
use anyhow::Result;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Runs a program callback inside the configuration and logging bootstrap.
pub struct Driver {
    defaults: AppConfig,
    start_message: String,
    logging: LoggingContext,
}

impl Driver {
    pub fn new(defaults: AppConfig) -> Self {
        Self {
            defaults,
            start_message: "Starting...".to_string(),
            logging: LoggingContext::new(),
        }
    }

    pub fn with_start_message(mut self, message: impl Into<String>) -> Self {
        self.start_message = message.into();
        self
    }

    pub fn logging(&self) -> &LoggingContext {
        &self.logging
    }

    /// Merges the configuration, sets up logging and runs `program`.
    ///
    /// Returns the process exit code. Program failures are logged and turned into
    /// [`EXIT_FAILURE`]; in debug mode the error is returned instead so the caller can
    /// show it in full.
    pub fn run<F>(&self, program: F, cli: Cli, argv: &[String]) -> Result<u8>
    where
        F: FnOnce(&AppConfig) -> Result<()>,
    {
        // Errors must be visible before the real configuration is known.
        self.logging.configure(None)?;
        self.logging.install()?;

        let mut effective_verbosity = self.defaults.verbosity;
        let outcome = (|| -> Result<()> {
            let config = merge(&self.defaults, cli.overrides())?;
            effective_verbosity = config.verbosity;
            self.logging.configure(Some(&config))?;

            log::info!("{}", self.start_message);
            log::debug!("Command line arguments: `{:?}`", argv);
            program(&config)
        })();

        match outcome {
            Ok(()) => {
                log::info!("All Ok!");
                Ok(EXIT_SUCCESS)
            }
            Err(err) => {
                let detail = format!("{:?}", err);
                log::error!(exc_info = detail.as_str(); "An error occurred: {:#}", err);
                let debugging = effective_verbosity == Verbosity::Debug
                    || cli.verbosity() == Verbosity::Debug
                    || cli.log_level == Some(Verbosity::Debug);
                if debugging {
                    Err(err)
                } else {
                    Ok(EXIT_FAILURE)
                }
            }
        }
    }
}
