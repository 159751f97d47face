//! Three-way classification of engine verdicts and the data attached to them.

use crate::solve::{SolverResult, Verdict};
use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Maps a raw engine verdict to the result taxonomy.
///
/// Verdicts outside of sat/unsat/unknown are treated as unknown.
#[must_use]
pub fn classify(verdict: &Verdict) -> SolverResult {
    match verdict {
        Verdict::Sat => SolverResult::Satisfiable,
        Verdict::Unsat => SolverResult::Unsatisfiable,
        Verdict::Unknown(_) => SolverResult::Unknown,
        Verdict::Other(answer) => {
            covered_by!("unrecognized verdict");
            warn!(
                "engine answered `{}`, which is not a verdict; treating it as unknown",
                answer
            );
            SolverResult::Unknown
        }
    }
}

/// Outcome of one problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum SessionResult {
    Satisfiable { bindings: Bindings },
    Unsatisfiable,
    Unknown,
}

impl SessionResult {
    #[must_use]
    pub fn kind(&self) -> SolverResult {
        match self {
            SessionResult::Satisfiable { .. } => SolverResult::Satisfiable,
            SessionResult::Unsatisfiable => SolverResult::Unsatisfiable,
            SessionResult::Unknown => SolverResult::Unknown,
        }
    }

    #[must_use]
    pub fn bindings(&self) -> Option<&Bindings> {
        match self {
            SessionResult::Satisfiable { bindings } => Some(bindings),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub value: String,
}

/// Model bindings in the order the engine enumerated the symbols.
///
/// A symbol appears at most once; inserting it again replaces its value but
/// keeps the position of the first occurrence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Binding>", into = "Vec<Binding>")]
pub struct Bindings {
    entries: Vec<Binding>,
    index: FxHashMap<String, usize>,
}

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, value: String) {
        if let Some(&idx) = self.index.get(&name) {
            covered_by!("duplicate symbol");
            self.entries[idx].value = value;
            return;
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(Binding { name, value });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.index
            .get(name)
            .map(|&idx| self.entries[idx].value.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.entries.iter()
    }
}

impl PartialEq for Bindings {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Bindings {}

impl<N: Into<String>, V: Into<String>> std::iter::FromIterator<(N, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (name, value) in iter {
            bindings.insert(name.into(), value.into());
        }
        bindings
    }
}

impl From<Vec<Binding>> for Bindings {
    fn from(entries: Vec<Binding>) -> Self {
        entries.into_iter().map(|b| (b.name, b.value)).collect()
    }
}

impl From<Bindings> for Vec<Binding> {
    fn from(bindings: Bindings) -> Self {
        bindings.entries
    }
}
