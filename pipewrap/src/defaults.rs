use std::{env, path::Path};

use anyhow::Context;
use clap::Arg;
use serde_yaml::{Mapping, Value};

use crate::{
    config::{merge_dicts, parse_mapping, read_config_file, ConfigRecord},
    workflow::Workflow,
};

const GLOBAL_DEFAULTS: &str = include_str!("defaults.yaml");
const ALLELE_DEFAULTS: &str = include_str!("allele_defaults.yaml");

/// Environment variable naming an optional site wide defaults file
pub const SITE_DEFAULTS_VAR: &str = "PIPEWRAP_DEFAULTS";

/// Defaults
///
/// The defaults schema for a workflow.  Provides the fallback value for
/// every command line option and fixes the key set of the configuration
/// record.  Built once at start up and passed on explicitly
///
#[derive(Debug, Clone)]
pub struct Defaults {
    map: Mapping,
}

impl Defaults {
    /// Built in defaults for a workflow: shared settings, allele-specific inputs
    /// (if supported) and the workflow's own defaults.  Later layers replace
    /// values from earlier ones
    pub fn builtin(wf: &Workflow) -> anyhow::Result<Self> {
        let mut map = parse_mapping(GLOBAL_DEFAULTS)
            .with_context(|| "Error parsing built in global defaults")?;
        if wf.allele_specific() {
            map.extend(
                parse_mapping(ALLELE_DEFAULTS)
                    .with_context(|| "Error parsing built in allele defaults")?,
            );
        }
        map.extend(
            parse_mapping(wf.defaults)
                .with_context(|| format!("Error parsing built in defaults for {}", wf.name))?,
        );
        Ok(Self { map })
    }

    /// Built in defaults, adjusted by the site defaults file if one is named in the environment
    pub fn for_workflow(wf: &Workflow) -> anyhow::Result<Self> {
        let mut d = Self::builtin(wf)?;
        if let Some(p) = env::var_os(SITE_DEFAULTS_VAR) {
            d.apply_site_file(p)?
        }
        Ok(d)
    }

    /// Site settings can change existing defaults but not add new keys
    pub fn apply_site_file<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<()> {
        let site = read_config_file(path.as_ref())
            .with_context(|| "Could not read site defaults")?;
        self.map = merge_dicts(&self.map, &site);
        Ok(())
    }

    pub fn mapping(&self) -> &Mapping {
        &self.map
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().filter_map(|k| k.as_str())
    }

    /// Fresh configuration record holding the default values
    pub fn record(&self) -> ConfigRecord {
        ConfigRecord::from_mapping(self.map.clone())
    }

    /// Default as a command line string.  Switches, null and empty values have none
    pub fn default_str(&self, key: &str) -> Option<String> {
        match self.map.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Set the default for an argument from the entry with the same id
    pub fn with_default(&self, arg: Arg) -> Arg {
        let def = self.default_str(arg.get_id().as_str());
        match def {
            Some(s) => arg.default_value(s),
            None => arg,
        }
    }
}
