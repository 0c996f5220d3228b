use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    cli_scaffold::app::run()
}
