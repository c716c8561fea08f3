use std::{ffi::OsString, path::PathBuf};

use clap::{
    crate_authors, crate_version, parser::ValueSource, value_parser, Arg, ArgAction, ArgMatches,
    Command,
};
use serde_yaml::{Mapping, Value};

use crate::{
    allele::{MASKED_INDEX, SNP_FILE, STRAINS, VCF_FILE},
    config::{config_diff, ConfigRecord},
    defaults::Defaults,
    log_utils::{init_log, LogLevel},
    workflow::Workflow,
};

/// CliOptions
///
/// Result of command line parsing
///
/// record - defaults schema overlaid with every value taken from the command line
///          (including clap defaults, which come from the schema)
/// overrides - values typed on the command line that differ from the defaults
/// configfile - user configuration file
/// argv - the original command line
///
#[derive(Debug, Clone)]
pub struct CliOptions {
    record: ConfigRecord,
    overrides: Mapping,
    configfile: Option<PathBuf>,
    argv: Vec<String>,
}

impl CliOptions {
    pub fn from_matches(m: &ArgMatches, d: &Defaults, argv: Vec<String>) -> Self {
        let mut record = d.record();
        let mut given = Mapping::new();
        for key in d.keys() {
            if let Some(v) = matched_value(m, key) {
                // Values filled in by clap from the schema never override the user file
                if m.value_source(key) == Some(ValueSource::CommandLine) {
                    given.insert(Value::String(key.to_owned()), v.clone());
                }
                record.set(key, v)
            }
        }
        let overrides = config_diff(&given, d.mapping());
        let configfile = m.get_one::<PathBuf>("configfile").cloned();
        Self {
            record,
            overrides,
            configfile,
            argv,
        }
    }

    pub fn record(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn overrides(&self) -> &Mapping {
        &self.overrides
    }

    pub fn configfile(&self) -> Option<&PathBuf> {
        self.configfile.as_ref()
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Value given for an argument, converted for the configuration record.
///
/// Switches only count when set so that a true default can not be cleared
fn matched_value(m: &ArgMatches, id: &str) -> Option<Value> {
    if let Ok(x) = m.try_get_one::<bool>(id) {
        return x.filter(|b| **b).map(|_| Value::Bool(true));
    }
    if let Ok(x) = m.try_get_one::<u64>(id) {
        return x.map(|n| Value::Number((*n).into()));
    }
    if let Ok(x) = m.try_get_one::<f64>(id) {
        return x.map(|f| Value::Number((*f).into()));
    }
    if let Ok(x) = m.try_get_one::<PathBuf>(id) {
        return x.map(|p| Value::String(p.to_string_lossy().into_owned()));
    }
    if let Ok(x) = m.try_get_one::<String>(id) {
        return x.map(|s| Value::String(s.clone()));
    }
    None
}

/// Split a comma separated mode list, checking each entry against the allowed modes
pub fn parse_modes(s: &str, modes: &[&str]) -> Result<Vec<String>, String> {
    let v: Vec<String> = s
        .split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_owned())
        .collect();
    if v.is_empty() {
        return Err("no mode given".to_string());
    }
    for x in v.iter() {
        if !modes.contains(&x.as_str()) {
            return Err(format!(
                "unknown mode '{}' (possible modes: {})",
                x,
                modes.join(", ")
            ));
        }
    }
    Ok(v)
}

/// Set up definition of command options for clap
///
/// Options shared by all workflows come first, followed by the workflow's own options and,
/// for workflows supporting it, the allele-specific mapping inputs
pub fn cli_model(wf: &Workflow, d: &Defaults) -> Command {
    let modes = wf.modes;
    let cmd = Command::new(wf.name)
        .about(wf.about)
        .version(crate_version!())
        .author(crate_authors!())
        .arg(
            Arg::new("genome")
                .value_parser(value_parser!(String))
                .value_name("GENOME")
                .required(true)
                .help("Genome acronym or path to an organism YAML file"),
        )
        .next_help_heading("Input/Output")
        .arg(
            Arg::new("indir")
                .short('i')
                .long("input-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Input directory containing the FASTQ files"),
        )
        .arg(
            Arg::new("outdir")
                .short('o')
                .long("output-dir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .required(true)
                .help("Output directory"),
        )
        .arg(
            Arg::new("configfile")
                .short('c')
                .long("configfile")
                .value_parser(value_parser!(PathBuf))
                .value_name("FILE")
                .help("Configuration file; values override the defaults and are overridden by explicit command line options"),
        )
        .next_help_heading("Execution")
        .arg(d.with_default(
            Arg::new("mode")
                .long("mode")
                .value_parser(move |s: &str| parse_modes(s, modes).map(|v| v.join(",")))
                .value_name("MODE[,MODE..]")
                .help(format!("Analysis mode(s), comma separated. Possible modes: {}", modes.join(", "))),
        ))
        .arg(d.with_default(
            Arg::new("maxJobs")
                .short('j')
                .long("jobs")
                .value_parser(value_parser!(u64).range(1..))
                .value_name("INT")
                .help("Maximum number of concurrently submitted jobs (cores in local mode)"),
        ))
        .arg(
            Arg::new("local")
                .long("local")
                .action(ArgAction::SetTrue)
                .help("Run locally instead of submitting jobs to the cluster"),
        )
        .arg(d.with_default(
            Arg::new("snakemakeOptions")
                .long("snakemakeOptions")
                .value_parser(value_parser!(String))
                .allow_hyphen_values(true)
                .value_name("STRING")
                .help("Options passed on to Snakemake"),
        ))
        .arg(d.with_default(
            Arg::new("tempDir")
                .long("tempDir")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Directory under which the temporary directory is created [default: system temporary directory]"),
        ))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose Snakemake output"),
        )
        .next_help_heading("Logging")
        .arg(
            Arg::new("timestamp")
                .short('X')
                .long("timestamp")
                .value_parser(value_parser!(stderrlog::Timestamp))
                .value_name("GRANULARITY")
                .default_value("none")
                .help("Prepend log entries with a timestamp"),
        )
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .value_name("LOGLEVEL")
                .value_parser(value_parser!(LogLevel))
                .ignore_case(true)
                .default_value("warn")
                .help("Set log level"),
        )
        .arg(
            Arg::new("quiet")
                .action(ArgAction::SetTrue)
                .long("quiet")
                .conflicts_with("loglevel")
                .help("Silence all output"),
        );

    let cmd = (wf.args)(cmd, d);
    if wf.allele_specific() {
        allele_args(cmd, d)
    } else {
        cmd
    }
}

/// Trimming, downsampling and raw read QC options shared by the mapping workflows
pub fn trimming_args(cmd: Command, d: &Defaults, trimmers: &'static [&'static str]) -> Command {
    cmd.next_help_heading("Trimming and QC")
        .arg(d.with_default(
            Arg::new("downsample")
                .long("downsample")
                .value_parser(value_parser!(u64).range(1..))
                .value_name("INT")
                .help("Downsample to this number of reads (or read pairs)"),
        ))
        .arg(
            Arg::new("trim")
                .long("trim")
                .action(ArgAction::SetTrue)
                .help("Trim reads before mapping"),
        )
        .arg(d.with_default(
            Arg::new("trimmer")
                .long("trimmer")
                .value_parser(trimmers.to_vec())
                .value_name("PROGRAM")
                .help("Trimming program"),
        ))
        .arg(d.with_default(
            Arg::new("trimmerOptions")
                .long("trimmerOptions")
                .value_parser(value_parser!(String))
                .allow_hyphen_values(true)
                .value_name("STRING")
                .help("Options passed to the trimming program"),
        ))
        .arg(
            Arg::new("fastqc")
                .long("fastqc")
                .action(ArgAction::SetTrue)
                .help("Run FastQC on the (trimmed) reads"),
        )
}

/// Inputs for allele-specific mapping
pub fn allele_args(cmd: Command, d: &Defaults) -> Command {
    cmd.next_help_heading("Allele-specific mapping")
        .arg(d.with_default(
            Arg::new(VCF_FILE)
                .long(VCF_FILE)
                .value_parser(value_parser!(PathBuf))
                .value_name("FILE")
                .help("VCF file with variants used to create an N-masked genome (requires --strains)"),
        ))
        .arg(d.with_default(
            Arg::new(STRAINS)
                .long(STRAINS)
                .value_parser(value_parser!(String))
                .value_name("NAME[,NAME]")
                .help("Strain name(s) in the VCF file, comma separated (requires --VCFfile)"),
        ))
        .arg(d.with_default(
            Arg::new(SNP_FILE)
                .long(SNP_FILE)
                .value_parser(value_parser!(PathBuf))
                .value_name("FILE")
                .help("SNP file for an existing N-masked genome (requires --NMaskedIndex)"),
        ))
        .arg(d.with_default(
            Arg::new(MASKED_INDEX)
                .long(MASKED_INDEX)
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Existing N-masked genome index (requires --SNPfile)"),
        ))
}

/// Parse an argument vector without exiting on error
pub fn parse_args<I, T>(wf: &Workflow, d: &Defaults, args: I) -> Result<(ArgMatches, CliOptions), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.into()).collect();
    let argv = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
    let m = cli_model(wf, d).try_get_matches_from(args)?;
    let opts = CliOptions::from_matches(&m, d, argv);
    Ok((m, opts))
}

/// Handle command line options.  Exits with a usage message on invalid input
pub fn handle_cli(wf: &Workflow, d: &Defaults) -> anyhow::Result<CliOptions> {
    // Get matches from command line
    let (m, opts) = parse_args(wf, d, std::env::args_os()).unwrap_or_else(|e| e.exit());

    // Setup logging
    init_log(&m)?;

    debug!("Processing command line options");
    Ok(opts)
}
