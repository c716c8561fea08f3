use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

use pipewrap::{cli::trimming_args, Defaults, Workflow};

const TRIMMERS: &[&str] = &["cutadapt", "trimgalore", "fastp"];

pub fn workflow() -> Workflow {
    Workflow {
        name: "RNA-seq",
        about: "Trim and map RNA-seq reads, count genes and test for differential expression",
        defaults: include_str!("defaults.yaml"),
        modes: &[
            "alignment",
            "alignment-free",
            "deepTools_qc",
            "allelic-mapping",
        ],
        allelic_mode: Some("allelic-mapping"),
        sample_sheet: Some("sampleSheet"),
        args: cli_model,
    }
}

fn cli_model(cmd: Command, d: &Defaults) -> Command {
    let cmd = cmd
        .next_help_heading("Input")
        .arg(d.with_default(
            Arg::new("ext")
                .long("ext")
                .value_parser(value_parser!(String))
                .value_name("SUFFIX")
                .help("Suffix of the input FASTQ files"),
        ))
        .arg(d.with_default(
            Arg::new("reads")
                .long("reads")
                .value_parser(value_parser!(String))
                .value_name("R1,R2")
                .help("Read 1 and read 2 designators in the input file names"),
        ));

    trimming_args(cmd, d, TRIMMERS)
        .next_help_heading("Alignment and quantification")
        .arg(d.with_default(
            Arg::new("aligner")
                .long("aligner")
                .value_parser(["STAR", "HISAT2"])
                .value_name("PROGRAM")
                .help("Spliced alignment program"),
        ))
        .arg(d.with_default(
            Arg::new("alignerOptions")
                .long("alignerOptions")
                .value_parser(value_parser!(String))
                .allow_hyphen_values(true)
                .value_name("STRING")
                .help("Options passed to the alignment program"),
        ))
        .arg(d.with_default(
            Arg::new("libraryType")
                .long("libraryType")
                .value_parser(value_parser!(u64).range(0..=2))
                .value_name("0|1|2")
                .help("Library strandedness: 0 unstranded, 1 stranded, 2 reverse stranded"),
        ))
        .arg(d.with_default(
            Arg::new("featureCountsOptions")
                .long("featureCountsOptions")
                .value_parser(value_parser!(String))
                .allow_hyphen_values(true)
                .value_name("STRING")
                .help("Options passed to featureCounts"),
        ))
        .next_help_heading("Differential expression")
        .arg(d.with_default(
            Arg::new("sampleSheet")
                .long("sampleSheet")
                .value_parser(value_parser!(PathBuf))
                .value_name("FILE")
                .help("Tab separated sample sheet with 'name' and 'condition' columns"),
        ))
        .arg(d.with_default(
            Arg::new("fdr")
                .long("fdr")
                .value_parser(value_parser!(f64))
                .value_name("FLOAT")
                .help("False discovery rate threshold"),
        ))
        .next_help_heading("Quality control")
        .arg(d.with_default(
            Arg::new("bwBinsize")
                .long("bwBinsize")
                .value_parser(value_parser!(u64).range(1..))
                .value_name("INT")
                .help("Bin size of the output coverage tracks"),
        ))
        .arg(
            Arg::new("dnaContam")
                .long("dnaContam")
                .action(ArgAction::SetTrue)
                .help("Check for genomic DNA contamination"),
        )
        .arg(d.with_default(
            Arg::new("plotFormat")
                .long("plotFormat")
                .value_parser(["png", "pdf", "svg", "None"])
                .value_name("FORMAT")
                .help("Format of the QC plots"),
        ))
}
