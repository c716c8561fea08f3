use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Write},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::{Path, PathBuf},
    process::{Child, ExitStatus, Stdio},
    thread,
};

use anyhow::Context;
use crossbeam_channel::Sender;
use tempfile::TempDir;

use crate::{
    command::{build_engine_command, join_quoted, EngineCommand},
    config::ConfigRecord,
    signals::SignalForwarder,
    workflow::Workflow,
};

/// Environment variable pointing the engine (and the tools it runs) at the scratch directory
pub const TMPDIR_VAR: &str = "TMPDIR";
pub const CLUSTER_LOGS_DIR: &str = "cluster_logs";
const TMPDIR_PREFIX: &str = "pipewrap.";
const CHANNEL_SIZE: usize = 256;

/// RunContext
///
/// Directories and files that exist for the duration of one run.  The temporary
/// directory is removed when the context is dropped or closed
///
pub struct RunContext {
    outdir: PathBuf,
    cluster_logs: PathBuf,
    log_path: PathBuf,
    tmp_dir: Option<TempDir>,
}

impl RunContext {
    pub fn prepare(wf: &Workflow, cfg: &ConfigRecord) -> anyhow::Result<Self> {
        let outdir = PathBuf::from(
            cfg.text("outdir")
                .ok_or_else(|| anyhow!("Output directory not set"))?,
        );

        let cluster_logs = outdir.join(CLUSTER_LOGS_DIR);
        fs::create_dir_all(&cluster_logs).with_context(|| {
            format!(
                "Could not create cluster log directory {}",
                cluster_logs.display()
            )
        })?;
        debug!("Cluster log directory: {}", cluster_logs.display());

        let mut builder = tempfile::Builder::new();
        builder.prefix(TMPDIR_PREFIX);
        let tmp_dir = match cfg.text("tempDir") {
            Some(prefix) => {
                fs::create_dir_all(prefix).with_context(|| {
                    format!("Could not create temporary directory prefix {}", prefix)
                })?;
                builder.tempdir_in(prefix)
            }
            None => builder.tempdir(),
        }
        .with_context(|| "Could not create temporary directory")?;
        debug!("Temporary directory: {}", tmp_dir.path().display());

        Ok(Self {
            log_path: outdir.join(wf.log_file_name()),
            outdir,
            cluster_logs,
            tmp_dir: Some(tmp_dir),
        })
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    pub fn cluster_logs(&self) -> &Path {
        &self.cluster_logs
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn tmp_dir(&self) -> Option<&Path> {
        self.tmp_dir.as_ref().map(|t| t.path())
    }

    /// Run log, started afresh for each run
    fn open_log(&self) -> anyhow::Result<File> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)
            .with_context(|| format!("Could not open run log {}", self.log_path.display()))
    }

    /// Remove the temporary directory.  Errors are not fatal
    pub fn close(&mut self) {
        if let Some(t) = self.tmp_dir.take() {
            let p = t.path().to_owned();
            match t.close() {
                Ok(_) => debug!("Removed temporary directory {}", p.display()),
                Err(e) => debug!("Could not remove temporary directory {}: {}", p.display(), e),
            }
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        self.close()
    }
}

/// RunOutcome
///
/// Exit status of the engine and the signal (if any) that interrupted the run
///
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    status: ExitStatus,
    interrupted: Option<i32>,
}

impl RunOutcome {
    pub fn status(&self) -> ExitStatus {
        self.status
    }

    pub fn interrupted(&self) -> Option<i32> {
        self.interrupted
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code mirroring the engine: its own exit code or 128 + signal number
    pub fn exit_code(&self) -> u8 {
        match (self.status.code(), self.status.signal()) {
            (Some(c), _) => (c & 0xff) as u8,
            (None, Some(s)) => (128 + s).min(255) as u8,
            (None, None) => 1,
        }
    }
}

/// LaunchPlan
///
/// Engine invocation worked out from the resolved configuration before anything is
/// written to the output directory
///
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    cmd: EngineCommand,
    config_path: PathBuf,
}

impl LaunchPlan {
    /// Check the workflow definition and build the engine command.  Only reads the file system
    pub fn new(wf: &Workflow, cfg: &ConfigRecord) -> anyhow::Result<Self> {
        let snakefile = wf.snakefile(cfg)?;
        if !snakefile.is_file() {
            return Err(anyhow!(
                "Workflow definition {} not found",
                snakefile.display()
            ));
        }
        let config_path = wf.config_path(cfg)?;
        let outdir = config_path
            .parent()
            .ok_or_else(|| anyhow!("Output directory not set"))?;
        let cmd = build_engine_command(
            wf,
            cfg,
            &config_path,
            &outdir.join(CLUSTER_LOGS_DIR),
            num_cpus::get(),
        )?;
        Ok(Self { cmd, config_path })
    }

    pub fn command(&self) -> &EngineCommand {
        &self.cmd
    }

    /// Where the configuration must be written before launching
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Run the workflow engine for a planned invocation.  The configuration must already
/// have been written to [`LaunchPlan::config_path`]
///
/// `argv` is the wrapper's own command line, recorded in the run log
pub fn launch(
    wf: &Workflow,
    cfg: &ConfigRecord,
    plan: &LaunchPlan,
    argv: &[String],
) -> anyhow::Result<RunOutcome> {
    // Handlers stay installed until the temporary directory has gone, so that an
    // interrupt at any point still reaches the cleanup below
    let forwarder =
        SignalForwarder::install().with_context(|| "Could not install signal handlers")?;

    let mut ctx = RunContext::prepare(wf, cfg)?;
    let cmd = plan.command();

    let mut log = ctx.open_log()?;
    writeln!(log, "{}", join_quoted(argv))
        .and_then(|_| writeln!(log, "{}", cmd))
        .with_context(|| format!("Error writing to run log {}", ctx.log_path().display()))?;

    let res = match forwarder.received() {
        Some(sig) => {
            debug!("Signal {} received before the workflow engine was started", sig);
            Ok(RunOutcome {
                status: ExitStatus::from_raw(sig),
                interrupted: Some(sig),
            })
        }
        None => {
            info!("Running: {}", cmd);
            let tmp = ctx
                .tmp_dir()
                .map(|p| p.to_owned())
                .ok_or_else(|| anyhow!("Temporary directory missing"))?;
            run_engine(cmd, &tmp, &mut log, &forwarder)
        }
    };
    ctx.close();
    drop(forwarder);

    let outcome = res?;
    if let Some(sig) = outcome.interrupted() {
        warn!(
            "Interrupted by signal {}; the workflow engine was terminated ({}). Jobs already submitted to the cluster are not cancelled",
            sig,
            outcome.status()
        );
        let _ = writeln!(
            log,
            "Interrupted by signal {}; engine exit status: {}",
            sig,
            outcome.status()
        );
    } else if outcome.success() {
        info!("Workflow {} completed successfully", wf.name);
    } else {
        error!("Workflow {} failed ({})", wf.name, outcome.status());
    }
    Ok(outcome)
}

/// Spawn the engine in its own process group, tee its output and wait for it
fn run_engine(
    cmd: &EngineCommand,
    tmp: &Path,
    log: &mut File,
    forwarder: &SignalForwarder,
) -> anyhow::Result<RunOutcome> {
    let mut child = cmd
        .to_command()
        .env(TMPDIR_VAR, tmp)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .with_context(|| format!("Could not start workflow engine {}", cmd.program()))?;
    forwarder.attach(child.id());
    debug!("Engine started with pid {}", child.id());

    tee_output(&mut child, log);

    let status = child.wait();
    forwarder.detach();
    let status = status.with_context(|| "Error waiting for workflow engine")?;
    debug!("Engine exited: {}", status);

    Ok(RunOutcome {
        status,
        interrupted: forwarder.received(),
    })
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Out,
    Err,
}

/// Copy child stdout and stderr line by line to the console and the run log until both
/// are closed.  Log write failures are reported once and then ignored
fn tee_output(child: &mut Child, log: &mut File) {
    let (s, r) = crossbeam_channel::bounded(CHANNEL_SIZE);
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    thread::scope(|sc| {
        if let Some(o) = stdout {
            let s = s.clone();
            sc.spawn(move || read_lines(o, Stream::Out, s));
        }
        if let Some(e) = stderr {
            let s = s.clone();
            sc.spawn(move || read_lines(e, Stream::Err, s));
        }
        drop(s);

        let mut log_ok = true;
        for (stream, line) in r.iter() {
            let _ = match stream {
                Stream::Out => io::stdout().write_all(&line),
                Stream::Err => io::stderr().write_all(&line),
            };
            if log_ok {
                if let Err(e) = log.write_all(&line) {
                    warn!("Error writing to run log: {}", e);
                    log_ok = false
                }
            }
        }
    });
    let _ = io::stdout().flush();
}

fn read_lines<R: Read>(rdr: R, stream: Stream, s: Sender<(Stream, Vec<u8>)>) {
    let mut rdr = BufReader::new(rdr);
    loop {
        let mut buf = Vec::new();
        match rdr.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if s.send((stream, buf)).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading engine output: {}", e);
                break;
            }
        }
    }
}
