#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use std::process::ExitCode;

use anyhow::Context;

pub mod allele;
pub mod cli;
pub mod command;
pub mod config;
pub mod defaults;
pub mod launch;
mod log_utils;
pub mod resolve;
mod sample_sheet;
mod signals;
pub mod utils;
pub mod workflow;

pub use defaults::Defaults;
pub use log_utils::{init_log, LogLevel};
pub use workflow::Workflow;

/// Run a workflow wrapper
///
/// Parse the command line, resolve the configuration and plan the engine invocation,
/// then write the configuration and run the engine.  Validation failures are returned
/// as errors before anything is written; otherwise the exit code mirrors the engine's
/// exit status
pub fn run(wf: &Workflow) -> anyhow::Result<ExitCode> {
    let defaults = Defaults::for_workflow(wf)?;
    let cli = cli::handle_cli(wf, &defaults)
        .with_context(|| "Error processing command line arguments")?;
    let cfg = resolve::resolve_config(wf, &defaults, &cli)?;
    let plan = launch::LaunchPlan::new(wf, &cfg)?;
    resolve::write_config(wf, &cfg)?;
    let outcome = launch::launch(wf, &cfg, &plan, cli.argv())?;
    Ok(ExitCode::from(outcome.exit_code()))
}
