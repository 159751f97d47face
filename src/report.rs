//! Accumulation and persistence of the results of a run.

use crate::classify::SessionResult;
use crate::problem::Problem;
use crate::solve::SolverResult;
use crate::utils::statistics::{CountingStats, DurationStats};
use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Additional information attached to a report entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum Diagnostic {
    /// Reason given by the engine for an unknown verdict
    Reason(String),
    /// The problem could not be solved because of a load error or an engine fault
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub problem: Problem,
    pub elapsed: Duration,
    #[serde(flatten)]
    pub result: SessionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl ReportEntry {
    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self.diagnostic, Some(Diagnostic::Failure(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub label: String,
    pub started: DateTime<Local>,
    pub time_limit_ms: u64,
    pub problem_dir: PathBuf,
    /// number of problems discovered for the run
    pub discovered: usize,
    /// false if the run was cancelled before every problem was recorded
    pub complete: bool,
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn load(path: &Path) -> Result<Self, ReportReadError> {
        let file = fs::File::open(path).map_err(|source| ReportReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(io::BufReader::new(file)).map_err(|source| {
            ReportReadError::Format {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// The problem/result sequence of the run, which does not depend on timing.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &SessionResult)> {
        self.entries
            .iter()
            .map(|entry| (entry.problem.key(), &entry.result))
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut counts = CountingStats::new();
        let mut durations = DurationStats::new();
        for entry in &self.entries {
            let outcome = Outcome::of(entry);
            counts.inc(outcome);
            durations.add(outcome, entry.elapsed);
        }
        RunSummary {
            problems: self.entries.len(),
            counts,
            durations,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportReadError {
    #[error("cannot open report `{}`: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("`{}` is not a valid report: {source}", .path.display())]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum Outcome {
    Satisfiable,
    Unsatisfiable,
    Unknown,
    Failed,
}

impl Outcome {
    fn of(entry: &ReportEntry) -> Self {
        if entry.failed() {
            return Outcome::Failed;
        }
        match entry.result.kind() {
            SolverResult::Satisfiable => Outcome::Satisfiable,
            SolverResult::Unsatisfiable => Outcome::Unsatisfiable,
            SolverResult::Unknown => Outcome::Unknown,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Satisfiable => "sat",
            Outcome::Unsatisfiable => "unsat",
            Outcome::Unknown => "unknown",
            Outcome::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub problems: usize,
    pub counts: CountingStats<Outcome>,
    pub durations: DurationStats<Outcome>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "problems {}, sat {}, unsat {}, unknown {}, failed {}",
            self.problems,
            self.counts.get(&Outcome::Satisfiable),
            self.counts.get(&Outcome::Unsatisfiable),
            self.counts.get(&Outcome::Unknown),
            self.counts.get(&Outcome::Failed)
        )?;
        write!(f, "{}", self.durations)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderMisuseError {
    #[error("the report has already been committed")]
    AlreadyCommitted,
    #[error("recorded `{found}` but `{expected}` is next in discovery order")]
    OutOfOrder { expected: String, found: String },
    #[error("recorded `{0}` after every discovered problem was recorded")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create results directory `{}`: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot write report `{}`: {message}", .path.display())]
    Write { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Misuse(#[from] RecorderMisuseError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Persists a finished report.
pub trait ReportWriter {
    /// Writes the report and returns where it was stored.
    fn write(&mut self, report: &RunReport) -> Result<PathBuf, WriteError>;
}

/// Writes reports as pretty-printed JSON, one file per run named after the
/// run label and start time.
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path_for(&self, report: &RunReport) -> PathBuf {
        let label: String = report
            .label
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!(
            "{}_{}.json",
            label,
            report.started.format("%Y-%m-%d_%H-%M-%S")
        ))
    }
}

impl ReportWriter for JsonReportWriter {
    fn write(&mut self, report: &RunReport) -> Result<PathBuf, WriteError> {
        fs::create_dir_all(&self.dir).map_err(|source| WriteError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(report);
        let af = AtomicFile::new(&path, AllowOverwrite);
        af.write(|f| serde_json::to_writer_pretty(f, report))
            .map_err(|err| WriteError::Write {
                path: path.clone(),
                message: err.to_string(),
            })?;
        Ok(path)
    }
}

/// Collects the entries of a run in discovery order and commits them once.
pub struct RunRecorder {
    report: RunReport,
    expected: Vec<Problem>,
    committed: bool,
}

impl RunRecorder {
    pub fn new(
        label: impl Into<String>,
        time_limit_ms: u64,
        problem_dir: impl Into<PathBuf>,
        problems: &[Problem],
    ) -> Self {
        Self {
            report: RunReport {
                label: label.into(),
                started: Local::now(),
                time_limit_ms,
                problem_dir: problem_dir.into(),
                discovered: problems.len(),
                complete: problems.is_empty(),
                entries: Vec::with_capacity(problems.len()),
            },
            expected: problems.to_vec(),
            committed: false,
        }
    }

    pub fn record(
        &mut self,
        problem: Problem,
        elapsed: Duration,
        result: SessionResult,
        diagnostic: Option<Diagnostic>,
    ) -> Result<(), RecorderMisuseError> {
        if self.committed {
            return Err(RecorderMisuseError::AlreadyCommitted);
        }
        let next = self.report.entries.len();
        match self.expected.get(next) {
            None => return Err(RecorderMisuseError::Unexpected(problem.key().to_string())),
            Some(expected) if *expected != problem => {
                return Err(RecorderMisuseError::OutOfOrder {
                    expected: expected.key().to_string(),
                    found: problem.key().to_string(),
                })
            }
            Some(_) => {}
        }
        self.report.entries.push(ReportEntry {
            problem,
            elapsed,
            result,
            diagnostic,
        });
        self.report.complete = self.report.entries.len() == self.expected.len();
        Ok(())
    }

    /// Number of entries recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.report.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.report.entries.is_empty()
    }

    #[must_use]
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    #[must_use]
    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Hands the report to `writer`. A report is written exactly once, a second
    /// commit is an error.
    pub fn commit<W: ReportWriter + ?Sized>(
        &mut self,
        writer: &mut W,
    ) -> Result<PathBuf, CommitError> {
        if self.committed {
            return Err(RecorderMisuseError::AlreadyCommitted.into());
        }
        self.committed = true;
        Ok(writer.write(&self.report)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use crate::problem::ProblemSource;
    use std::fs::File;

    /// Keeps written reports in memory.
    #[derive(Default)]
    pub(crate) struct MemoryWriter {
        pub(crate) reports: Vec<RunReport>,
    }

    impl ReportWriter for MemoryWriter {
        fn write(&mut self, report: &RunReport) -> Result<PathBuf, WriteError> {
            self.reports.push(report.clone());
            Ok(PathBuf::from(format!("memory-{}", self.reports.len())))
        }
    }

    fn problems(names: &[&str]) -> (tempfile::TempDir, Vec<Problem>) {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            File::create(dir.path().join(name)).unwrap();
        }
        let problems = ProblemSource::new(dir.path()).discover().unwrap();
        (dir, problems)
    }

    fn recorder(problems: &[Problem]) -> RunRecorder {
        RunRecorder::new("Z3", 100, "tests", problems)
    }

    #[test]
    fn test_record_in_order() {
        let (_dir, problems) = problems(&["a.smt2", "b.smt2"]);
        let mut recorder = recorder(&problems);
        recorder
            .record(
                problems[0].clone(),
                Duration::from_millis(3),
                SessionResult::Unsatisfiable,
                None,
            )
            .unwrap();
        assert!(!recorder.report().complete);
        recorder
            .record(
                problems[1].clone(),
                Duration::from_millis(5),
                SessionResult::Unknown,
                Some(Diagnostic::Reason("timeout".to_string())),
            )
            .unwrap();
        assert!(recorder.report().complete);
        assert_eq!(recorder.len(), 2);

        let mut writer = MemoryWriter::default();
        recorder.commit(&mut writer).unwrap();
        assert_eq!(writer.reports.len(), 1);
        let keys: Vec<&str> = writer.reports[0].outcomes().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["a.smt2", "b.smt2"]);
    }

    #[test]
    fn test_out_of_order() {
        let (_dir, problems) = problems(&["a.smt2", "b.smt2"]);
        let mut recorder = recorder(&problems);
        let err = recorder
            .record(
                problems[1].clone(),
                Duration::default(),
                SessionResult::Unknown,
                None,
            )
            .unwrap_err();
        assert_eq!(
            err,
            RecorderMisuseError::OutOfOrder {
                expected: "a.smt2".to_string(),
                found: "b.smt2".to_string()
            }
        );
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_too_many_records() {
        let (_dir, problems) = problems(&["a.smt2"]);
        let mut recorder = recorder(&problems);
        for expected in &[Ok(()), Err(RecorderMisuseError::Unexpected("a.smt2".to_string()))] {
            let result = recorder.record(
                problems[0].clone(),
                Duration::default(),
                SessionResult::Unsatisfiable,
                None,
            );
            assert_eq!(&result, expected);
        }
    }

    #[test]
    fn test_commit_twice() {
        let (_dir, problems) = problems(&["a.smt2"]);
        let mut recorder = recorder(&problems);
        let mut writer = MemoryWriter::default();
        recorder.commit(&mut writer).unwrap();
        assert!(matches!(
            recorder.commit(&mut writer),
            Err(CommitError::Misuse(RecorderMisuseError::AlreadyCommitted))
        ));
        assert!(matches!(
            recorder.record(
                problems[0].clone(),
                Duration::default(),
                SessionResult::Unknown,
                None
            ),
            Err(RecorderMisuseError::AlreadyCommitted)
        ));
        assert_eq!(writer.reports.len(), 1);
        // partial report, nothing was recorded
        assert!(!writer.reports[0].complete);
        assert_eq!(writer.reports[0].discovered, 1);
    }

    #[test]
    fn test_json_writer() {
        let (_dir, problems) = problems(&["a.smt2", "b.smt2"]);
        let results = tempfile::tempdir().unwrap();
        let mut recorder = RunRecorder::new("Z3 run/1", 100, "tests", &problems);
        recorder
            .record(
                problems[0].clone(),
                Duration::from_millis(12),
                SessionResult::Satisfiable {
                    bindings: vec![("x", "1")].into_iter().collect(),
                },
                None,
            )
            .unwrap();
        recorder
            .record(
                problems[1].clone(),
                Duration::from_millis(7),
                SessionResult::Unknown,
                Some(Diagnostic::Failure("cannot read".to_string())),
            )
            .unwrap();

        let mut writer = JsonReportWriter::new(results.path().join("results"));
        let path = recorder.commit(&mut writer).unwrap();
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("Z3_run_1_"), "{}", file_name);
        assert!(file_name.ends_with(".json"));

        let report = RunReport::load(&path).unwrap();
        assert_eq!(&report, recorder.report());
        assert!(report.entries[1].failed());

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["entries"][0]["result"], "satisfiable");
        assert_eq!(json["entries"][0]["bindings"][0]["name"], "x");
        assert_eq!(json["entries"][1]["diagnostic"]["kind"], "failure");
    }

    #[test]
    fn test_summary() {
        let (_dir, problems) = problems(&["a", "b", "c", "d"]);
        let mut recorder = recorder(&problems);
        let results = vec![
            (SessionResult::Unsatisfiable, None),
            (SessionResult::Unsatisfiable, None),
            (
                SessionResult::Unknown,
                Some(Diagnostic::Reason("timeout".to_string())),
            ),
            (
                SessionResult::Unknown,
                Some(Diagnostic::Failure("parse error".to_string())),
            ),
        ];
        for (problem, (result, diagnostic)) in problems.iter().zip(results) {
            recorder
                .record(problem.clone(), Duration::from_millis(10), result, diagnostic)
                .unwrap();
        }
        let summary = recorder.report().summary();
        assert_eq!(summary.problems, 4);
        assert_eq!(summary.counts.get(&Outcome::Unsatisfiable), 2);
        assert_eq!(summary.counts.get(&Outcome::Unknown), 1);
        assert_eq!(summary.counts.get(&Outcome::Failed), 1);
        assert_eq!(summary.counts.get(&Outcome::Satisfiable), 0);
        assert_eq!(
            summary.durations.sum(Outcome::Unsatisfiable),
            Duration::from_millis(20)
        );
        assert!(summary
            .to_string()
            .starts_with("problems 4, sat 0, unsat 2, unknown 1, failed 1"));
    }
}
