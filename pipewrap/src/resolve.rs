use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::{
    allele::{resolve_allele_inputs, AlleleMode},
    cli::{parse_modes, CliOptions},
    config::{merge_dicts, read_config_file, ConfigRecord},
    defaults::Defaults,
    sample_sheet::check_sample_sheet,
    utils::{abs_path, abs_path_string},
    workflow::Workflow,
};

/// Build the final configuration record.
///
/// Precedence (lowest first): defaults, user configuration file, command line options that
/// differ from their defaults.  Paths are validated and made absolute.  Nothing is written
/// to disk here
pub fn resolve_config(
    wf: &Workflow,
    d: &Defaults,
    cli: &CliOptions,
) -> anyhow::Result<ConfigRecord> {
    let cli_rec = cli.record();

    // Input directory must exist
    let indir = cli_rec
        .text("indir")
        .ok_or_else(|| anyhow!("Input directory not specified"))?;
    let indir = Path::new(indir);
    if !indir.is_dir() {
        return Err(anyhow!(
            "Input directory {} does not exist",
            indir.display()
        ));
    }
    let indir = indir
        .canonicalize()
        .with_context(|| format!("Could not resolve input directory {}", indir.display()))?;
    debug!("Input directory: {}", indir.display());

    let outdir = cli_rec
        .text("outdir")
        .ok_or_else(|| anyhow!("Output directory not specified"))
        .and_then(abs_path)?;

    // User configuration is checked before anything is merged
    let user = match cli.configfile() {
        Some(p) => {
            if !p.is_file() {
                return Err(anyhow!("Configuration file {} does not exist", p.display()));
            }
            Some(read_config_file(p)?)
        }
        None => None,
    };

    let mut map = match &user {
        Some(u) => merge_dicts(d.mapping(), u),
        None => d.mapping().clone(),
    };
    trace!("Command line overrides: {:?}", cli.overrides());
    map = merge_dicts(&map, cli.overrides());
    let mut cfg = ConfigRecord::from_mapping(map);

    cfg.set("indir", indir.to_string_lossy().into_owned());
    cfg.set("outdir", outdir.to_string_lossy().into_owned());

    if wf.allele_specific() {
        let allele_mode = resolve_allele_inputs(&mut cfg)?;
        check_modes(wf, &mut cfg, allele_mode)?;
    } else {
        check_modes(wf, &mut cfg, AlleleMode::None)?;
    }

    if let Some(key) = wf.sample_sheet {
        if let Some(p) = cfg.text(key).map(PathBuf::from) {
            if !p.is_file() {
                return Err(anyhow!("Sample sheet {} does not exist", p.display()));
            }
            check_sample_sheet(&p)?;
            cfg.set(key, abs_path_string(&p)?);
        }
    }

    resolve_genome(&mut cfg)?;

    debug!("Configuration resolved with {} entries", cfg.len());
    Ok(cfg)
}

/// Check the mode list and make it consistent with the allele-specific mapping inputs
fn check_modes(wf: &Workflow, cfg: &mut ConfigRecord, allele_mode: AlleleMode) -> anyhow::Result<()> {
    let Some(s) = cfg.text("mode") else {
        return Err(anyhow!("No mode set for {}", wf.name));
    };
    let mut modes = parse_modes(s, wf.modes).map_err(|e| anyhow!("Invalid mode: {}", e))?;
    if let Some(am) = wf.allelic_mode {
        let has_allelic = modes.iter().any(|m| m == am);
        match (has_allelic, allele_mode.is_none()) {
            (true, true) => {
                return Err(anyhow!(
                    "Mode {} requires either --VCFfile and --strains or --SNPfile and --NMaskedIndex",
                    am
                ))
            }
            (false, false) => {
                info!("Allele-specific inputs given; adding mode {}", am);
                modes.push(am.to_owned())
            }
            _ => (),
        }
    }
    cfg.set("mode", modes.join(","));
    Ok(())
}

/// An existing file is used directly; otherwise look for `<organisms_dir>/<genome>.yaml`.
/// Unresolved identifiers are passed on unchanged
fn resolve_genome(cfg: &mut ConfigRecord) -> anyhow::Result<()> {
    let Some(genome) = cfg.text("genome").map(PathBuf::from) else {
        return Err(anyhow!("Genome not specified"));
    };
    let resolved = if genome.is_file() {
        Some(genome)
    } else {
        cfg.text("organisms_dir")
            .map(|d| Path::new(d).join(format!("{}.yaml", genome.display())))
            .filter(|p| p.is_file())
    };
    match resolved {
        Some(p) => {
            let p = abs_path_string(p)?;
            debug!("Genome: {}", p);
            cfg.set("genome", p)
        }
        None => debug!("Genome identifier used as given"),
    }
    Ok(())
}

/// Write the configuration to the output directory, creating it if required.
/// Returns the path of the written file
pub fn write_config(wf: &Workflow, cfg: &ConfigRecord) -> anyhow::Result<PathBuf> {
    let p = wf.config_path(cfg)?;
    if let Some(outdir) = p.parent() {
        fs::create_dir_all(outdir).with_context(|| {
            format!("Could not create output directory {}", outdir.display())
        })?;
    }
    cfg.write(&p)?;
    info!("Configuration written to {}", p.display());
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cli::parse_args, workflow::tests::test_workflow};
    use tempfile::TempDir;

    struct Setup {
        dir: TempDir,
        indir: String,
        outdir: String,
    }

    fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let indir = dir.path().join("fastq");
        fs::create_dir(&indir).unwrap();
        Setup {
            indir: indir.to_string_lossy().into_owned(),
            outdir: dir.path().join("out").to_string_lossy().into_owned(),
            dir,
        }
    }

    impl Setup {
        fn file(&self, name: &str, content: &str) -> String {
            let p = self.dir.path().join(name);
            fs::write(&p, content).unwrap();
            p.to_string_lossy().into_owned()
        }

        fn resolve(&self, extra: &[&str]) -> anyhow::Result<ConfigRecord> {
            self.resolve_with(Defaults::builtin(&test_workflow()).unwrap(), extra)
        }

        /// Resolve with site defaults applied on top of the built in ones
        fn resolve_site(&self, site: &str, extra: &[&str]) -> anyhow::Result<ConfigRecord> {
            let mut d = Defaults::builtin(&test_workflow()).unwrap();
            d.apply_site_file(self.file("site.yaml", site)).unwrap();
            self.resolve_with(d, extra)
        }

        fn resolve_with(&self, d: Defaults, extra: &[&str]) -> anyhow::Result<ConfigRecord> {
            let wf = test_workflow();
            let mut args = vec!["tf", "mm10", "-i", self.indir.as_str(), "-o", self.outdir.as_str()];
            args.extend_from_slice(extra);
            let (_, cli) = parse_args(&wf, &d, args).unwrap();
            resolve_config(&wf, &d, &cli)
        }
    }

    #[test]
    fn every_default_key_is_present() {
        let s = setup();
        let cfg = s.resolve(&[]).unwrap();
        let d = Defaults::builtin(&test_workflow()).unwrap();
        for k in d.keys() {
            assert!(cfg.contains_key(k), "missing key {}", k);
        }
        assert_eq!(cfg.len(), d.mapping().len());
        assert_eq!(cfg.text("allele_mode"), Some("none"));
        assert_eq!(cfg.text("outdir"), Some(s.outdir.as_str()));
    }

    #[test]
    fn precedence() {
        let s = setup();
        let user = s.file(
            "user.yaml",
            "threshold: 20\naligner: slow\nmaxJobs: 8\nunknown_key: 1\ntempDir: /scratch\n",
        );
        let cfg = s.resolve(&["-c", &user, "--threshold", "30"]).unwrap();
        // Explicit command line value wins over the user file
        assert_eq!(cfg.int("threshold"), Some(30));
        // Command line left at its default does not clobber the user file
        assert_eq!(cfg.text("aligner"), Some("slow"));
        assert_eq!(cfg.int("maxJobs"), Some(8));
        assert_eq!(cfg.text("tempDir"), Some("/scratch"));
        // Absent from both: default
        assert_eq!(cfg.text("snakemakeOptions"), Some("--use-conda"));
        assert!(!cfg.contains_key("unknown_key"));
    }

    #[test]
    fn user_file_beats_site_defaults() {
        let s = setup();
        let user = s.file("user.yaml", "mode: qc\nratio: 0.01\nthreshold: 3\n");
        let cfg = s
            .resolve_site("mode: align, qc\nratio: 1\nthreshold: 7\n", &["-c", &user])
            .unwrap();
        assert_eq!(cfg.text("mode"), Some("qc"));
        assert_eq!(cfg.get("ratio").and_then(|v| v.as_f64()), Some(0.01));
        assert_eq!(cfg.int("threshold"), Some(3));

        // Without a user file the site values are used
        let cfg = s.resolve_site("mode: align, qc\nratio: 1\n", &[]).unwrap();
        assert_eq!(cfg.text("mode"), Some("align,qc"));
        assert_eq!(cfg.get("ratio").and_then(|v| v.as_f64()), Some(1.0));

        // Typed values still win
        let cfg = s
            .resolve_site("ratio: 1\n", &["-c", &user, "--ratio", "0.2"])
            .unwrap();
        assert_eq!(cfg.get("ratio").and_then(|v| v.as_f64()), Some(0.2));
    }

    #[test]
    fn command_line_switch_beats_user_file() {
        let s = setup();
        let user = s.file("user.yaml", "qc: false\nlocal: false\n");
        let cfg = s.resolve(&["-c", &user, "--qc"]).unwrap();
        assert!(cfg.flag("qc"));
        assert!(!cfg.flag("local"));
    }

    #[test]
    fn resolution_is_repeatable() {
        let s = setup();
        let user = s.file("user.yaml", "aligner: slow\n");
        let a = s.resolve(&["-c", &user, "--qc"]).unwrap();
        let b = s.resolve(&["-c", &user, "--qc"]).unwrap();
        assert_eq!(a.to_yaml().unwrap(), b.to_yaml().unwrap());
        let wf = test_workflow();
        let p1 = write_config(&wf, &a).unwrap();
        let y1 = fs::read(&p1).unwrap();
        let p2 = write_config(&wf, &b).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(y1, fs::read(&p2).unwrap());
    }

    #[test]
    fn missing_input_directory() {
        let s = setup();
        let wf = test_workflow();
        let d = Defaults::builtin(&wf).unwrap();
        let missing = s.dir.path().join("nope").to_string_lossy().into_owned();
        let (_, cli) = parse_args(&wf, &d, ["tf", "mm10", "-i", missing.as_str(), "-o", s.outdir.as_str()]).unwrap();
        let e = resolve_config(&wf, &d, &cli).unwrap_err();
        assert!(e.to_string().contains(&missing));
        assert!(!Path::new(&s.outdir).exists());
    }

    #[test]
    fn missing_config_file() {
        let s = setup();
        let missing = s.dir.path().join("missing.yaml").to_string_lossy().into_owned();
        let e = s.resolve(&["-c", &missing]).unwrap_err();
        assert!(e.to_string().contains("missing.yaml"));
    }

    #[test]
    fn allele_inputs() {
        let s = setup();
        let cfg = s.resolve(&["--VCFfile", "a.vcf", "--strains", "s1,s2"]).unwrap();
        assert_eq!(cfg.text("allele_mode"), Some("create_and_map"));
        assert!(Path::new(cfg.text("VCFfile").unwrap()).is_absolute());
        assert_eq!(cfg.text("mode"), Some("align,allelic"));

        assert!(s.resolve(&["--VCFfile", "a.vcf", "--SNPfile", "b.txt"]).is_err());
        assert!(s.resolve(&["--mode", "allelic"]).is_err());

        let user = s.file("user.yaml", "SNPfile: snps.txt\nNMaskedIndex: idx\n");
        let cfg = s.resolve(&["-c", &user, "--mode", "allelic"]).unwrap();
        assert_eq!(cfg.text("allele_mode"), Some("map_only"));
        assert_eq!(cfg.text("mode"), Some("allelic"));
    }

    #[test]
    fn invalid_mode_from_user_file() {
        let s = setup();
        let user = s.file("user.yaml", "mode: align,dance\n");
        assert!(s.resolve(&["-c", &user]).is_err());
    }

    #[test]
    fn sample_sheet() {
        let s = setup();
        let missing = s.dir.path().join("none.tsv").to_string_lossy().into_owned();
        assert!(s.resolve(&["--sheet", &missing]).is_err());

        let bad = s.file("bad.tsv", "sample\tgroup\n");
        assert!(s.resolve(&["--sheet", &bad]).is_err());

        let good = s.file("good.tsv", "name\tcondition\nA\tctrl\n");
        let cfg = s.resolve(&["--sheet", &good]).unwrap();
        assert_eq!(cfg.text("sheet"), Some(good.as_str()));
    }

    #[test]
    fn genome_lookup() {
        let s = setup();
        let orgs = s.dir.path().join("organisms");
        fs::create_dir(&orgs).unwrap();
        fs::write(orgs.join("mm10.yaml"), "genome_fasta: /g/mm10.fa\n").unwrap();
        let user = s.file(
            "user.yaml",
            &format!("organisms_dir: {}\n", orgs.display()),
        );
        let cfg = s.resolve(&["-c", &user]).unwrap();
        assert_eq!(
            cfg.text("genome"),
            orgs.join("mm10.yaml").to_str()
        );

        // Unknown identifiers are kept
        let cfg = s.resolve(&[]).unwrap();
        assert_eq!(cfg.text("genome"), Some("mm10"));
    }
}
