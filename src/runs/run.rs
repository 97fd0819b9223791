// src/runs/run.rs

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// Stand-in used in labels and file names when no run number was given.
pub const NO_RUN_NUMBER: &str = "NA";

/// One concrete combination of required parameter values to execute.
///
/// Entries keep insertion order (used for argument expansion and output file
/// names) but equality is structural: two runs are equal when they hold the
/// same key/value pairs, in any order.
#[derive(Debug, Clone, Default, Eq)]
pub struct Run {
    args: Vec<(String, String)>,
}

impl Run {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Re-setting an existing key replaces its value in
    /// place.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key.into(), value.to_string());
        self
    }

    /// Copy `base` and overlay `overrides` on top of it.
    pub fn overlay<K, V, I>(base: &Run, overrides: I) -> Self
    where
        K: Into<String>,
        V: ToString,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut run = base.clone();
        for (key, value) in overrides {
            run.set(key.into(), value.to_string());
        }
        run
    }

    fn set(&mut self, key: String, value: String) {
        match self.args.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.args.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Key/value pairs in insertion order.
    pub fn args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|(_, v)| v.as_str())
    }

    pub fn key_set(&self) -> BTreeSet<&str> {
        self.keys().collect()
    }

    pub fn value_set(&self) -> BTreeSet<&str> {
        self.values().collect()
    }

    /// Copy with entries rearranged to follow `keys`. Keys not listed keep
    /// their relative order after the listed ones.
    pub fn ordered_by<S: AsRef<str>>(&self, keys: &[S]) -> Run {
        let mut args = Vec::with_capacity(self.args.len());
        for key in keys {
            if let Some(pair) = self.args.iter().find(|(k, _)| k == key.as_ref()) {
                args.push(pair.clone());
            }
        }
        for pair in &self.args {
            if !keys.iter().any(|k| k.as_ref() == pair.0) {
                args.push(pair.clone());
            }
        }
        Run { args }
    }

    /// Human-readable label for this run crossed with a run number.
    pub fn label(&self, run_number: Option<&str>) -> String {
        format!("{self}_{}", run_number.unwrap_or(NO_RUN_NUMBER))
    }

    /// Expand into `-key value` argument pairs, in insertion order.
    pub fn to_args(&self) -> Vec<String> {
        self.args
            .iter()
            .flat_map(|(k, v)| [format!("-{k}"), v.clone()])
            .collect()
    }
}

impl PartialEq for Run {
    fn eq(&self, other: &Self) -> bool {
        self.args.len() == other.args.len()
            && self
                .args
                .iter()
                .all(|(k, v)| other.get(k) == Some(v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Run {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Run::overlay(&Run::default(), iter)
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Scalar accepted as a run value in TOML; rendered to text.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => f.write_str(s),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Float(x) => write!(f, "{x}"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl<'de> Deserialize<'de> for Run {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RunVisitor;

        impl<'de> Visitor<'de> for RunVisitor {
            type Value = Run;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of scalar run values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Run, A::Error> {
                let mut run = Run::new();
                while let Some((key, value)) = map.next_entry::<String, ScalarValue>()? {
                    if run.get(&key).is_some() {
                        return Err(de::Error::custom(format!("duplicate run key '{key}'")));
                    }
                    run.set(key, value.to_string());
                }
                Ok(run)
            }
        }

        deserializer.deserialize_map(RunVisitor)
    }
}
