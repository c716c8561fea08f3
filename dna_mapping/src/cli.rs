use clap::{value_parser, Arg, ArgAction, Command};

use pipewrap::{cli::trimming_args, Defaults, Workflow};

const TRIMMERS: &[&str] = &["cutadapt", "trimgalore", "fastp"];
const ALIGNERS: &[&str] = &["Bowtie2", "bwa", "bwa-mem2"];

pub fn workflow() -> Workflow {
    Workflow {
        name: "DNA-mapping",
        about: "Trim, map and deduplicate DNA sequencing reads (ChIP-seq, ATAC-seq, WGS) and run quality control",
        defaults: include_str!("defaults.yaml"),
        modes: &["mapping", "allelic-mapping"],
        allelic_mode: Some("allelic-mapping"),
        sample_sheet: None,
        args: cli_model,
    }
}

/// Set up definition of DNA-mapping specific command options
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
        .next_help_heading("Mapping")
        .arg(d.with_default(
            Arg::new("aligner")
                .long("aligner")
                .value_parser(ALIGNERS.to_vec())
                .value_name("PROGRAM")
                .help("Mapping program"),
        ))
        .arg(d.with_default(
            Arg::new("alignerOpts")
                .long("alignerOpts")
                .value_parser(value_parser!(String))
                .allow_hyphen_values(true)
                .value_name("STRING")
                .help("Options passed to the mapping program"),
        ))
        .arg(d.with_default(
            Arg::new("mateOrientation")
                .long("mateOrientation")
                .value_parser(value_parser!(String))
                .allow_hyphen_values(true)
                .value_name("STRING")
                .help("Mate orientation option passed to Bowtie2"),
        ))
        .arg(d.with_default(
            Arg::new("insertSizeMax")
                .long("insertSizeMax")
                .value_parser(value_parser!(u64))
                .value_name("INT")
                .help("Maximum insert size allowed during mapping"),
        ))
        .next_help_heading("Filtering")
        .arg(d.with_default(
            Arg::new("mapq")
                .long("mapq")
                .value_parser(value_parser!(u64).range(0..=255))
                .value_name("INT")
                .help("Minimum MAPQ of alignments kept for downstream analysis"),
        ))
        .arg(
            Arg::new("dedup")
                .long("dedup")
                .action(ArgAction::SetTrue)
                .help("Remove PCR duplicates"),
        )
        .arg(
            Arg::new("properPairs")
                .long("properPairs")
                .action(ArgAction::SetTrue)
                .help("Only keep properly paired reads"),
        )
        .next_help_heading("Quality control")
        .arg(
            Arg::new("qualimap")
                .long("qualimap")
                .action(ArgAction::SetTrue)
                .help("Run Qualimap BamQC"),
        )
        .arg(
            Arg::new("GCBias")
                .long("GCBias")
                .action(ArgAction::SetTrue)
                .help("Compute the GC bias of the mapped reads"),
        )
        .arg(d.with_default(
            Arg::new("bwBinsize")
                .long("bwBinsize")
                .value_parser(value_parser!(u64).range(1..))
                .value_name("INT")
                .help("Bin size of the output coverage tracks"),
        ))
        .arg(d.with_default(
            Arg::new("plotFormat")
                .long("plotFormat")
                .value_parser(["png", "pdf", "svg", "None"])
                .value_name("FORMAT")
                .help("Format of the QC plots"),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewrap::cli::parse_args;

    fn parse(args: &[&str]) -> Result<pipewrap::cli::CliOptions, clap::Error> {
        let wf = workflow();
        let d = Defaults::builtin(&wf).unwrap();
        parse_args(&wf, &d, args.iter().copied()).map(|(_, o)| o)
    }

    #[test]
    fn every_default_has_an_option_or_is_internal() {
        let wf = workflow();
        let d = Defaults::builtin(&wf).unwrap();
        let cmd = pipewrap::cli::cli_model(&wf, &d);
        let internal = [
            "snakemake_executable",
            "workflow_dir",
            "organisms_dir",
            "snakemake_cluster_cmd",
            "allele_mode",
        ];
        for k in d.keys() {
            assert!(
                internal.contains(&k) || cmd.get_arguments().any(|a| a.get_id() == k),
                "no option for {}",
                k
            );
        }
    }

    #[test]
    fn mapping_options() {
        let o = parse(&[
            "DNA-mapping", "hg38", "-i", "in", "-o", "out", "--aligner", "bwa-mem2", "--dedup",
            "--mapq", "3", "--alignerOpts", "--very-sensitive", "--trim", "--trimmer", "fastp",
        ])
        .unwrap();
        let r = o.record();
        assert_eq!(r.text("aligner"), Some("bwa-mem2"));
        assert_eq!(r.text("alignerOpts"), Some("--very-sensitive"));
        assert_eq!(r.int("mapq"), Some(3));
        assert!(r.flag("dedup"));
        assert!(r.flag("trim"));
        assert!(!r.flag("properPairs"));
        assert_eq!(r.text("trimmer"), Some("fastp"));
        assert_eq!(r.text("mateOrientation"), Some("--fr"));
        assert_eq!(r.int("insertSizeMax"), Some(1000));
    }

    #[test]
    fn rejected_values() {
        assert!(parse(&["DNA-mapping", "hg38", "-i", "in", "-o", "out", "--aligner", "STAR"]).is_err());
        assert!(parse(&["DNA-mapping", "hg38", "-i", "in", "-o", "out", "--mapq", "300"]).is_err());
        assert!(parse(&["DNA-mapping", "hg38", "-i", "in", "-o", "out", "--trimmer", "sickle"]).is_err());
        assert!(parse(&["DNA-mapping", "hg38", "-i", "in", "-o", "out", "--mode", "alignment"]).is_err());
    }
}
