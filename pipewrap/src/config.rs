use std::{fs, path::Path};

use anyhow::Context;
use serde_yaml::{Mapping, Value};

/// ConfigRecord
///
/// Option name to value mapping handed to the workflow engine.
/// The key set is fixed by the defaults schema; keys are kept in
/// insertion order so that the serialized form is reproducible
///
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigRecord {
    map: Mapping,
}

impl ConfigRecord {
    pub fn from_mapping(map: Mapping) -> Self {
        Self { map }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().filter_map(|k| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Non-empty string value for key
    pub fn text(&self, key: &str) -> Option<&str> {
        self.map
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn flag(&self, key: &str) -> bool {
        self.map.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn int(&self, key: &str) -> Option<u64> {
        self.map.get(key).and_then(|v| v.as_u64())
    }

    /// Value is set if it is present and not null or empty
    pub fn is_set(&self, key: &str) -> bool {
        self.map.get(key).map(|v| !is_unset(v)).unwrap_or(false)
    }

    pub fn set<V: Into<Value>>(&mut self, key: &str, v: V) {
        self.map.insert(Value::String(key.to_owned()), v.into());
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(&self.map).with_context(|| "Could not serialize configuration")
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let s = self.to_yaml()?;
        fs::write(path, s)
            .with_context(|| format!("Could not write configuration to {}", path.display()))
    }
}

/// Null, empty strings and empty collections do not override
pub fn is_unset(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Sequence(s) => s.is_empty(),
        Value::Mapping(m) => m.is_empty(),
        _ => false,
    }
}

/// Merge `over` into `base`.
///
/// The result has exactly the keys of `base`.  Keys also present in `over` with a
/// set value take the value from `over`; keys only found in `over` are dropped
pub fn merge_dicts(base: &Mapping, over: &Mapping) -> Mapping {
    base.iter()
        .map(|(k, v)| match over.get(k) {
            Some(x) if !is_unset(x) => (k.clone(), x.clone()),
            _ => (k.clone(), v.clone()),
        })
        .collect()
}

/// Values are the same if equal, or if both are numbers of equal magnitude (`1` and `1.0`)
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Entries of `new` whose value differs from that in `base`
pub fn config_diff(new: &Mapping, base: &Mapping) -> Mapping {
    new.iter()
        .filter(|(k, v)| !base.get(*k).is_some_and(|b| same_value(b, v)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Parse a YAML mapping.  An empty document counts as an empty mapping
pub fn parse_mapping(s: &str) -> anyhow::Result<Mapping> {
    if s.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(s)? {
        Value::Mapping(m) => Ok(m),
        Value::Null => Ok(Mapping::new()),
        _ => Err(anyhow!("Expected a mapping of option names to values")),
    }
}

pub fn read_config_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Mapping> {
    let path = path.as_ref();
    debug!("Reading configuration from {}", path.display());
    let s = fs::read_to_string(path)
        .with_context(|| format!("Could not read configuration file {}", path.display()))?;
    parse_mapping(&s).with_context(|| format!("Error parsing configuration file {}", path.display()))
}
