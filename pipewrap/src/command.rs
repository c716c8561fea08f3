use std::{
    borrow::Cow,
    fmt,
    path::Path,
    process::Command,
};

use crate::{config::ConfigRecord, workflow::Workflow};

/// Placeholder in the cluster command template replaced by the cluster log directory
pub const CLUSTER_LOGS_PLACEHOLDER: &str = "{cluster_logs_dir}";

/// EngineCommand
///
/// Program plus ordered argument tokens for the workflow engine.  The tokens are passed
/// to the child process as they are; quoting is only applied when the command is
/// displayed
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: String,
    args: Vec<String>,
}

impl EngineCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(&mut self, a: S) -> &mut Self {
        self.args.push(a.into());
        self
    }

    pub fn args<I, S>(&mut self, it: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(it.into_iter().map(|s| s.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Value following the first occurrence of `opt`
    pub fn option_value(&self, opt: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == opt)
            .and_then(|i| self.args.get(i + 1))
            .map(|s| s.as_str())
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for a in self.args.iter() {
            write!(f, " {}", quote(a))?
        }
        Ok(())
    }
}

/// Quote a word for display as part of a POSIX shell command line
pub fn quote(s: &str) -> Cow<'_, str> {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-./=:,+@%^".contains(c);
    if !s.is_empty() && s.chars().all(safe) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("'{}'", s.replace('\'', r"'\''")))
    }
}

/// Join words into a displayable shell command line
pub fn join_quoted<I, S>(words: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| quote(w.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a string into words following POSIX shell quoting rules (no expansions)
pub fn split_words(s: &str) -> anyhow::Result<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Space,
        Word,
        Single,
        Double,
    }

    let mut words = Vec::new();
    let mut cur = String::new();
    let mut state = State::Space;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        state = match (state, c) {
            (State::Space, c) if c.is_whitespace() => State::Space,
            (State::Word, c) if c.is_whitespace() => {
                words.push(std::mem::take(&mut cur));
                State::Space
            }
            (State::Space | State::Word, '\'') => State::Single,
            (State::Space | State::Word, '"') => State::Double,
            (State::Space | State::Word, '\\') => {
                if let Some(x) = chars.next() {
                    cur.push(x)
                }
                State::Word
            }
            (State::Space | State::Word, c) => {
                cur.push(c);
                State::Word
            }
            (State::Single, '\'') => State::Word,
            (State::Single, c) => {
                cur.push(c);
                State::Single
            }
            (State::Double, '"') => State::Word,
            (State::Double, '\\') => {
                match chars.next() {
                    Some(x) if "\\\"$`".contains(x) => cur.push(x),
                    Some(x) => {
                        cur.push('\\');
                        cur.push(x)
                    }
                    None => cur.push('\\'),
                }
                State::Double
            }
            (State::Double, c) => {
                cur.push(c);
                State::Double
            }
        }
    }
    match state {
        State::Single | State::Double => Err(anyhow!("Unterminated quote in '{}'", s)),
        State::Word => {
            words.push(cur);
            Ok(words)
        }
        State::Space => Ok(words),
    }
}

/// Build the workflow engine invocation for a resolved configuration
///
/// Token order: engine, passthrough options, Snakefile, job limit, working directory,
/// configuration file, cluster template (unless local), verbosity flags
pub fn build_engine_command(
    wf: &Workflow,
    cfg: &ConfigRecord,
    config_path: &Path,
    cluster_logs: &Path,
    n_cpus: usize,
) -> anyhow::Result<EngineCommand> {
    let program = cfg
        .text("snakemake_executable")
        .ok_or_else(|| anyhow!("Workflow engine (snakemake_executable) is not configured"))?;
    let outdir = cfg
        .text("outdir")
        .ok_or_else(|| anyhow!("Output directory not set"))?;
    let local = cfg.flag("local");

    let mut jobs = match cfg.int("maxJobs") {
        Some(0) | None => return Err(anyhow!("maxJobs must be a positive integer")),
        Some(x) => x,
    };
    if local && jobs > n_cpus as u64 {
        info!(
            "Local execution: limiting jobs from {} to the {} available cores",
            jobs, n_cpus
        );
        jobs = n_cpus.max(1) as u64;
    }

    let mut cmd = EngineCommand::new(program);
    if let Some(s) = cfg.text("snakemakeOptions") {
        cmd.args(split_words(s)?);
    }
    cmd.arg("--snakefile")
        .arg(wf.snakefile(cfg)?.to_string_lossy())
        .arg("--jobs")
        .arg(jobs.to_string())
        .arg("--directory")
        .arg(outdir)
        .arg("--configfile")
        .arg(config_path.to_string_lossy());

    if !local {
        let template = cfg.text("snakemake_cluster_cmd").ok_or_else(|| {
            anyhow!("Cluster submission command (snakemake_cluster_cmd) is not configured; use --local to run locally")
        })?;
        let template =
            template.replace(CLUSTER_LOGS_PLACEHOLDER, &cluster_logs.to_string_lossy());
        cmd.arg("--cluster").arg(template);
    }

    if cfg.flag("verbose") {
        cmd.arg("--printshellcmds").arg("--verbose");
    }
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::parse_mapping, workflow::tests::test_workflow};
    use std::path::PathBuf;

    fn record(extra: &str) -> ConfigRecord {
        let mut m = parse_mapping(
            "snakemake_executable: snakemake
workflow_dir: /opt/wf
snakemake_cluster_cmd: \"submit -t {threads} --mem {resources.mem_mb} -l {cluster_logs_dir}/{rule}.log\"
snakemakeOptions: \"--use-conda --conda-prefix '/opt/conda envs'\"
outdir: /data/out
maxJobs: 12
local: false
verbose: false
",
        )
        .unwrap();
        m.extend(parse_mapping(extra).unwrap());
        ConfigRecord::from_mapping(m)
    }

    fn build(cfg: &ConfigRecord, n_cpus: usize) -> anyhow::Result<EngineCommand> {
        build_engine_command(
            &test_workflow(),
            cfg,
            &PathBuf::from("/data/out/test-flow.config.yaml"),
            &PathBuf::from("/data/out/cluster_logs"),
            n_cpus,
        )
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("--jobs"), "--jobs");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("{threads}"), "'{threads}'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(join_quoted(["run", "x y"]), "run 'x y'");
    }

    #[test]
    fn splitting() {
        assert_eq!(
            split_words("  --use-conda   --conda-prefix '/a b' \"c \\\"d\\\"\" e\\ f ").unwrap(),
            ["--use-conda", "--conda-prefix", "/a b", "c \"d\"", "e f"]
        );
        assert_eq!(split_words("a''b").unwrap(), ["ab"]);
        assert_eq!(split_words("''").unwrap(), [""]);
        assert!(split_words("").unwrap().is_empty());
        assert!(split_words("--x 'oops").is_err());
        assert!(split_words("\"oops").is_err());
    }

    #[test]
    fn split_then_quote_preserves_words() {
        let words = ["plain", "two words", "it's", "", "{rule}"];
        let line = join_quoted(words);
        assert_eq!(split_words(&line).unwrap(), words);
    }

    #[test]
    fn cluster_command() {
        let cmd = build(&record(""), 4).unwrap();
        assert_eq!(cmd.program(), "snakemake");
        assert_eq!(
            &cmd.get_args()[..3],
            ["--use-conda", "--conda-prefix", "/opt/conda envs"]
        );
        assert_eq!(
            cmd.option_value("--snakefile"),
            Some("/opt/wf/test-flow/Snakefile")
        );
        assert_eq!(cmd.option_value("--jobs"), Some("12"));
        assert_eq!(cmd.option_value("--directory"), Some("/data/out"));
        assert_eq!(
            cmd.option_value("--configfile"),
            Some("/data/out/test-flow.config.yaml")
        );
        assert_eq!(
            cmd.option_value("--cluster"),
            Some("submit -t {threads} --mem {resources.mem_mb} -l /data/out/cluster_logs/{rule}.log")
        );
        assert!(!cmd.get_args().iter().any(|a| a == "--printshellcmds"));
        assert!(cmd
            .to_string()
            .ends_with("--cluster 'submit -t {threads} --mem {resources.mem_mb} -l /data/out/cluster_logs/{rule}.log'"));
    }

    #[test]
    fn local_command_caps_jobs() {
        let cmd = build(&record("local: true\nverbose: true\n"), 4).unwrap();
        assert_eq!(cmd.option_value("--jobs"), Some("4"));
        assert_eq!(cmd.option_value("--cluster"), None);
        let n = cmd.get_args().len();
        assert_eq!(&cmd.get_args()[n - 2..], ["--printshellcmds", "--verbose"]);

        let cmd = build(&record("local: true\nmaxJobs: 2\n"), 4).unwrap();
        assert_eq!(cmd.option_value("--jobs"), Some("2"));
    }

    #[test]
    fn invalid_settings() {
        assert!(build(&record("maxJobs: 0\n"), 4).is_err());
        assert!(build(&record("snakemakeOptions: \"--x 'y\"\n"), 4).is_err());
        assert!(build(&record("snakemake_cluster_cmd:\n"), 4).is_err());
        assert!(build(&record("snakemake_cluster_cmd:\nlocal: true\n"), 4).is_ok());
    }

    #[test]
    fn display_round_trips_through_shell_splitting() {
        let cmd = build(&record(""), 4).unwrap();
        let mut words = split_words(&cmd.to_string()).unwrap();
        assert_eq!(words.remove(0), cmd.program());
        assert_eq!(words, cmd.get_args());
    }
}
