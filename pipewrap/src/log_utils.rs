//! Wrapper diagnostics.  Messages go to stderr through stderrlog, apart from the engine
//! output that is copied to stdout and the run log

use std::{fmt, str::FromStr};

use clap::ArgMatches;

/// LogLevel
///
/// Minimum level of wrapper messages that are shown.  `Off` silences the wrapper
/// without affecting the engine output
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
    Off,
}

const LEVEL_NAMES: [(&str, LogLevel); 6] = [
    ("error", LogLevel::Error),
    ("warn", LogLevel::Warn),
    ("info", LogLevel::Info),
    ("debug", LogLevel::Debug),
    ("trace", LogLevel::Trace),
    ("none", LogLevel::Off),
];

impl FromStr for LogLevel {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LEVEL_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(s))
            .map(|(_, l)| *l)
            .ok_or("unknown log level (error, warn, info, debug, trace or none)")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = LEVEL_NAMES
            .iter()
            .find(|(_, l)| l == self)
            .map(|(n, _)| *n)
            .unwrap_or("none");
        f.write_str(name)
    }
}

impl LogLevel {
    /// stderrlog verbosity, or None if logging is switched off
    pub fn verbosity(&self) -> Option<usize> {
        match self {
            Self::Off => None,
            l => Some(*l as usize),
        }
    }
}

/// Initialize logging from the `--loglevel`, `--quiet` and `--timestamp` options
pub fn init_log(m: &ArgMatches) -> anyhow::Result<()> {
    let level = m.get_one::<LogLevel>("loglevel").copied().unwrap_or_default();
    let verbosity = level.verbosity();
    let quiet = verbosity.is_none() || m.get_flag("quiet");
    let ts = m
        .get_one::<stderrlog::Timestamp>("timestamp")
        .copied()
        .unwrap_or(stderrlog::Timestamp::Off);

    stderrlog::new()
        .quiet(quiet)
        .verbosity(verbosity.unwrap_or(0))
        .timestamp(ts)
        .init()?;
    Ok(())
}
