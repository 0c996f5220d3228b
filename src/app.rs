// Declare modules
pub mod cli;
pub mod config;
pub mod content;
pub mod driver;
pub mod logging;
pub mod models;

use anyhow::Result;
use std::env;
use std::process::ExitCode;

use self::cli::Cli;
use self::config::{default_config, APP_NAME};
use self::content::some_code;
use self::driver::Driver;

/// Initializes components and hands the content reader to the driver.
pub fn run() -> Result<ExitCode> {
    // 1. Built-in defaults
    let defaults = default_config();

    // 2. Parse Args (the defaults are shown in --help)
    let args = Cli::parse_with_defaults(&defaults);
    let argv: Vec<String> = env::args().collect();

    // 3. Run the program inside the config/logging bootstrap
    let driver = Driver::new(defaults).with_start_message(format!("Starting {APP_NAME}..."));
    let code = driver.run(
        |config| {
            for line in some_code(config)? {
                println!("{}", line);
            }
            Ok(())
        },
        args,
        &argv,
    )?;

    Ok(ExitCode::from(code))
}
