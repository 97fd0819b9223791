// src/runs/registry.rs

//! Ordered, deduplicated collection of staged runs.

use std::collections::BTreeSet;
use std::ops::Index;
use std::slice::SliceIndex;

use tracing::debug;

use crate::errors::{BatchError, Result};
use crate::runs::Run;

/// Ordered set of unique runs.
///
/// Iteration always yields runs in stage order minus removed entries. Every
/// traversal gets its own iterator, so there is no shared cursor to reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRegistry {
    runs: Vec<Run>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage one or more runs.
    ///
    /// Every run must supply exactly the `required` keys. The whole batch is
    /// validated first; on error nothing is staged. Runs already present (or
    /// repeated within the batch) are skipped.
    ///
    /// Staged runs are stored with their entries in `required` order, so
    /// argument expansion and output file names do not depend on how a run
    /// was built.
    pub fn stage<I>(&mut self, runs: I, required: &[String]) -> Result<()>
    where
        I: IntoIterator<Item = Run>,
    {
        let order = required;
        let required: BTreeSet<&str> = required.iter().map(String::as_str).collect();
        let runs: Vec<Run> = runs.into_iter().map(|run| run.ordered_by(order)).collect();

        for run in &runs {
            let keys = run.key_set();
            if keys != required {
                return Err(BatchError::ConfigError(format!(
                    "run arguments {keys:?} do not match required arguments {required:?}"
                )));
            }
        }

        for run in runs {
            if self.runs.contains(&run) {
                debug!(%run, "run already staged; ignoring duplicate");
                continue;
            }
            debug!(%run, "staged run");
            self.runs.push(run);
        }

        Ok(())
    }

    /// Stage every run held by `other`, e.g. to inherit runs from another
    /// batch. Subject to the same validation as [`stage`](Self::stage).
    pub fn absorb(&mut self, other: &RunRegistry, required: &[String]) -> Result<()> {
        self.stage(other.iter().cloned(), required)
    }

    /// Filter runs by their values.
    ///
    /// - No filter values: every run, in order.
    /// - `match_any`: runs holding at least one of the values.
    /// - otherwise: runs holding all of the values.
    pub fn get_runs<S: AsRef<str>>(&self, values: &[S], match_any: bool) -> Vec<&Run> {
        if values.is_empty() {
            return self.runs.iter().collect();
        }

        let wanted: BTreeSet<&str> = values.iter().map(AsRef::as_ref).collect();
        self.runs
            .iter()
            .filter(|run| {
                let have = run.value_set();
                if match_any {
                    !wanted.is_disjoint(&have)
                } else {
                    wanted.is_subset(&have)
                }
            })
            .collect()
    }

    /// Remove runs by structural equality. Runs that are not staged are
    /// ignored.
    pub fn remove_runs<'a, I>(&mut self, runs: I)
    where
        I: IntoIterator<Item = &'a Run>,
    {
        for run in runs {
            if let Some(pos) = self.runs.iter().position(|r| r == run) {
                let removed = self.runs.remove(pos);
                debug!(run = %removed, "removed run");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Run> {
        self.runs.iter()
    }

    /// Integer or range lookup, e.g. `get(0)` or `get(1..3)`.
    pub fn get<I: SliceIndex<[Run]>>(&self, index: I) -> Option<&I::Output> {
        self.runs.get(index)
    }

    pub fn as_slice(&self) -> &[Run] {
        &self.runs
    }
}

impl<I: SliceIndex<[Run]>> Index<I> for RunRegistry {
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.runs[index]
    }
}

impl<'a> IntoIterator for &'a RunRegistry {
    type Item = &'a Run;
    type IntoIter = std::slice::Iter<'a, Run>;

    fn into_iter(self) -> Self::IntoIter {
        self.runs.iter()
    }
}
