mod cli;

use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    pipewrap::run(&cli::workflow())
}
