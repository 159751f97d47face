//! Comparison of two run reports, e.g., a regression baseline and a new run.

use crate::classify::Bindings;
use crate::report::{ReportEntry, RunReport};
use crate::solve::SolverResult;
use std::{collections::HashMap, fmt, time::Duration};

/// Solving times closer than this are considered equal.
const SIGNIFICANT_TIME_DIFFERENCE: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct Comparison {
    /// problems that are sat in one report and unsat in the other
    pub inconsistent: Vec<(String, SolverResult, SolverResult)>,
    /// problems solved in the baseline only
    pub unique_baseline: Vec<(String, SolverResult)>,
    /// problems solved in the other report only
    pub unique_other: Vec<(String, SolverResult)>,
    pub missing_in_baseline: Vec<String>,
    pub missing_in_other: Vec<String>,
    pub changed_bindings: Vec<(String, Bindings, Bindings)>,
    /// true if the common problems appear in a different order
    pub reordered: bool,
    pub equal_solving_times: usize,
    pub baseline_less_solving_time: usize,
    pub other_less_solving_time: usize,
}

/// Matches the entries of both reports by problem key.
#[must_use]
pub fn compare(baseline: &RunReport, other: &RunReport) -> Comparison {
    let mut comparison = Comparison::default();

    let other_entries: HashMap<&str, &ReportEntry> = other
        .entries
        .iter()
        .map(|entry| (entry.problem.key(), entry))
        .collect();
    let baseline_keys: Vec<&str> = baseline.outcomes().map(|(key, _)| key).collect();

    for base_entry in &baseline.entries {
        let key = base_entry.problem.key();
        let other_entry = if let Some(entry) = other_entries.get(key) {
            entry
        } else {
            comparison.missing_in_other.push(key.to_string());
            continue;
        };

        match (base_entry.result.kind(), other_entry.result.kind()) {
            (SolverResult::Unknown, SolverResult::Unknown) => continue,
            (SolverResult::Unknown, res) => {
                comparison.unique_other.push((key.to_string(), res));
                continue;
            }
            (res, SolverResult::Unknown) => {
                comparison.unique_baseline.push((key.to_string(), res));
                continue;
            }
            (SolverResult::Satisfiable, SolverResult::Satisfiable)
            | (SolverResult::Unsatisfiable, SolverResult::Unsatisfiable) => {}
            (a, b) => {
                comparison.inconsistent.push((key.to_string(), a, b));
                continue;
            }
        }

        if let (Some(base_bindings), Some(other_bindings)) =
            (base_entry.result.bindings(), other_entry.result.bindings())
        {
            if base_bindings != other_bindings {
                comparison.changed_bindings.push((
                    key.to_string(),
                    base_bindings.clone(),
                    other_bindings.clone(),
                ));
            }
        }

        if let Some(diff) = base_entry.elapsed.checked_sub(other_entry.elapsed) {
            if diff > SIGNIFICANT_TIME_DIFFERENCE {
                comparison.other_less_solving_time += 1;
            } else {
                comparison.equal_solving_times += 1;
            }
        } else if let Some(diff) = other_entry.elapsed.checked_sub(base_entry.elapsed) {
            if diff > SIGNIFICANT_TIME_DIFFERENCE {
                comparison.baseline_less_solving_time += 1;
            } else {
                comparison.equal_solving_times += 1;
            }
        }
    }

    let baseline_set: std::collections::HashSet<&str> = baseline_keys.iter().copied().collect();
    for (key, _) in other.outcomes() {
        if !baseline_set.contains(key) {
            comparison.missing_in_baseline.push(key.to_string());
        }
    }

    let common_baseline: Vec<&str> = baseline_keys
        .iter()
        .copied()
        .filter(|key| other_entries.contains_key(key))
        .collect();
    let common_other: Vec<&str> = other
        .outcomes()
        .map(|(key, _)| key)
        .filter(|key| baseline_set.contains(key))
        .collect();
    comparison.reordered = common_baseline != common_other;

    comparison
}

impl Comparison {
    /// True if both reports contain the same problems, in the same order, with
    /// the same results. Solving times are not taken into account.
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.inconsistent.is_empty()
            && self.unique_baseline.is_empty()
            && self.unique_other.is_empty()
            && self.missing_in_baseline.is_empty()
            && self.missing_in_other.is_empty()
            && self.changed_bindings.is_empty()
            && !self.reordered
    }
}

fn render_bindings(bindings: &Bindings) -> String {
    bindings
        .iter()
        .map(|binding| format!("{} = {}\n", binding.name, binding.value))
        .collect()
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (problem, a, b) in &self.inconsistent {
            writeln!(f, "inconsistent results on `{}`: {} vs. {}", problem, a, b)?;
        }
        for (problem, base, other) in &self.changed_bindings {
            writeln!(f, "model changed on `{}`:", problem)?;
            writeln!(
                f,
                "{}",
                colored_diff::PrettyDifference {
                    expected: &render_bindings(base),
                    actual: &render_bindings(other),
                }
            )?;
        }
        if self.reordered {
            writeln!(f, "problems appear in a different order")?;
        }
        if !self.missing_in_other.is_empty() {
            writeln!(f, "\nonly in baseline: {}", self.missing_in_other.join(", "))?;
        }
        if !self.missing_in_baseline.is_empty() {
            writeln!(f, "\nonly in report: {}", self.missing_in_baseline.join(", "))?;
        }
        if !self.unique_baseline.is_empty() {
            writeln!(f, "\nsolved by baseline only")?;
            for (problem, res) in &self.unique_baseline {
                writeln!(f, "* {}: {}", problem, res)?;
            }
        }
        if !self.unique_other.is_empty() {
            writeln!(f, "\nsolved by report only")?;
            for (problem, res) in &self.unique_other {
                writeln!(f, "* {}: {}", problem, res)?;
            }
        }
        writeln!(
            f,
            "\nsolving time: equal {}, baseline less {}, report less {}",
            self.equal_solving_times,
            self.baseline_less_solving_time,
            self.other_less_solving_time
        )?;
        if self.is_identical() {
            writeln!(f, "results are identical")?;
        }
        Ok(())
    }
}
