use std::path::{Path, PathBuf};

use clap::Command;

use crate::{config::ConfigRecord, defaults::Defaults};

/// Workflow
///
/// Static description of one wrapped workflow.  A wrapper binary builds one
/// of these and hands it to [`crate::run`]
///
/// name - workflow name; used for the binary, the Snakefile directory and output file names
/// about - one line description for the help text
/// defaults - YAML text with the workflow specific defaults
/// modes - allowed values for `--mode`
/// allelic_mode - mode that enables allele-specific mapping, if supported
/// sample_sheet - configuration key of a sample sheet that must be validated, if any
/// args - adds the workflow specific arguments to the command line model
///
pub struct Workflow {
    pub name: &'static str,
    pub about: &'static str,
    pub defaults: &'static str,
    pub modes: &'static [&'static str],
    pub allelic_mode: Option<&'static str>,
    pub sample_sheet: Option<&'static str>,
    pub args: fn(Command, &Defaults) -> Command,
}

impl Workflow {
    pub fn allele_specific(&self) -> bool {
        self.allelic_mode.is_some()
    }

    pub fn config_file_name(&self) -> String {
        format!("{}.config.yaml", self.name)
    }

    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.name)
    }

    /// Where the resolved configuration is written: `<outdir>/<name>.config.yaml`
    pub fn config_path(&self, cfg: &ConfigRecord) -> anyhow::Result<PathBuf> {
        let outdir = cfg
            .text("outdir")
            .ok_or_else(|| anyhow!("Output directory not set"))?;
        Ok(Path::new(outdir).join(self.config_file_name()))
    }

    /// Location of the workflow definition below the configured workflow directory
    pub fn snakefile(&self, cfg: &ConfigRecord) -> anyhow::Result<PathBuf> {
        let dir = cfg
            .text("workflow_dir")
            .ok_or_else(|| anyhow!("Workflow directory (workflow_dir) is not configured"))?;
        let mut p = PathBuf::from(dir);
        p.push(self.name);
        p.push("Snakefile");
        Ok(p)
    }
}
