//! Runs every problem of a directory through the engine and records the results.

use crate::classify::{classify, Bindings, SessionResult};
use crate::problem::{DiscoveryError, Problem, ProblemSource};
use crate::report::{CommitError, Diagnostic, RecorderMisuseError, ReportWriter, RunRecorder, RunReport};
use crate::solve::{
    session::SolverSession, Engine, EngineFault, LoadError, SolverConfig, SolverResult,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc::channel,
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Recorder(#[from] RecorderMisuseError),
    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Reasons a single problem could not be solved.
#[derive(Debug, Error)]
enum ProblemFailure {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Engine(#[from] EngineFault),
}

/// Result of one problem, before it is recorded.
#[derive(Debug)]
pub struct Solved {
    pub elapsed: Duration,
    pub result: SessionResult,
    pub diagnostic: Option<Diagnostic>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    /// where the report was written to
    pub location: PathBuf,
    pub cancelled: bool,
}

pub struct BatchDriver<'e, E: Engine> {
    engine: &'e E,
    config: SolverConfig,
    jobs: usize,
    progress: bool,
    cancel: Arc<AtomicBool>,
}

impl<'e, E: Engine> BatchDriver<'e, E> {
    pub fn new(engine: &'e E, config: SolverConfig) -> Self {
        Self {
            engine,
            config,
            jobs: 1,
            progress: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of problems solved concurrently, the report order is not affected.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Raising the returned flag stops the run from starting further problems.
    /// Whatever has been recorded until then is still committed.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn run<W: ReportWriter + ?Sized>(
        &self,
        source: &ProblemSource,
        writer: &mut W,
    ) -> Result<RunOutcome, HarnessError> {
        let problems = source.discover()?;
        info!(
            "discovered {} problems in `{}`",
            problems.len(),
            source.dir().display()
        );

        let mut recorder = RunRecorder::new(
            self.config.label(),
            self.config.time_limit_ms(),
            source.dir(),
            &problems,
        );
        let progress = self.progress_bar(problems.len());

        if self.jobs > 1 {
            self.run_parallel(&problems, &mut recorder, &progress)?;
        } else {
            self.run_sequential(&problems, &mut recorder, &progress)?;
        }
        progress.finish();

        let cancelled = recorder.len() < problems.len();
        if cancelled {
            warn!(
                "run cancelled after {} of {} problems",
                recorder.len(),
                problems.len()
            );
        }

        let location = recorder.commit(writer)?;
        info!("report written to `{}`", location.display());
        Ok(RunOutcome {
            report: recorder.into_report(),
            location,
            cancelled,
        })
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(len as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar().template("{wide_bar} {pos}/{len} {eta} remaining {msg}"),
        );
        progress_bar.enable_steady_tick(100);
        progress_bar
    }

    fn run_sequential(
        &self,
        problems: &[Problem],
        recorder: &mut RunRecorder,
        progress: &ProgressBar,
    ) -> Result<(), RecorderMisuseError> {
        for problem in problems {
            if self.cancelled() {
                break;
            }
            progress.set_message(problem.key());
            let solved = self.solve(problem);
            recorder.record(
                problem.clone(),
                solved.elapsed,
                solved.result,
                solved.diagnostic,
            )?;
            progress.inc(1);
        }
        Ok(())
    }

    /// Workers claim problems in discovery order and send back index-tagged
    /// results; results are recorded once all earlier problems are recorded.
    fn run_parallel(
        &self,
        problems: &[Problem],
        recorder: &mut RunRecorder,
        progress: &ProgressBar,
    ) -> Result<(), RecorderMisuseError> {
        let next = AtomicUsize::new(0);
        let (tx, rx) = channel();

        thread::scope(|scope| {
            for _ in 0..self.jobs.min(problems.len()) {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    if self.cancelled() {
                        break;
                    }
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let problem = match problems.get(idx) {
                        Some(problem) => problem,
                        None => break,
                    };
                    let solved = self.solve(problem);
                    if tx.send((idx, solved)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            record_in_order(rx, problems, recorder, progress)
        })
    }

    /// Solves one problem in a fresh session. Problem-level failures are turned
    /// into an unknown result, they never abort the run.
    pub fn solve(&self, problem: &Problem) -> Solved {
        info!("reading file: {}", problem.path().display());
        let start = Instant::now();
        let (result, diagnostic) = match self.attempt(problem) {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!("{}: {}", problem.path().display(), failure);
                (
                    SessionResult::Unknown,
                    Some(Diagnostic::Failure(failure.to_string())),
                )
            }
        };
        Solved {
            elapsed: start.elapsed(),
            result,
            diagnostic,
        }
    }

    fn attempt(
        &self,
        problem: &Problem,
    ) -> Result<(SessionResult, Option<Diagnostic>), ProblemFailure> {
        let mut checked = SolverSession::configure(self.engine, &self.config)?
            .load(problem)?
            .check()?;
        let diagnostic = checked.diagnostic().map(Diagnostic::Reason);

        Ok(match classify(checked.verdict()) {
            SolverResult::Satisfiable => match checked.extract_model() {
                Ok(bindings) => (SessionResult::Satisfiable { bindings }, diagnostic),
                Err(err) => {
                    warn!(
                        "{}: satisfiable, but the model is not available: {}",
                        problem.path().display(),
                        err
                    );
                    (
                        SessionResult::Satisfiable {
                            bindings: Bindings::new(),
                        },
                        Some(Diagnostic::Failure(format!("model unavailable: {}", err))),
                    )
                }
            },
            SolverResult::Unsatisfiable => (SessionResult::Unsatisfiable, diagnostic),
            SolverResult::Unknown => (SessionResult::Unknown, diagnostic),
        })
    }
}

/// Records index-tagged results in discovery order. A result is buffered until
/// every earlier problem is recorded; results that never become part of the
/// contiguous prefix are dropped.
fn record_in_order<I>(
    results: I,
    problems: &[Problem],
    recorder: &mut RunRecorder,
    progress: &ProgressBar,
) -> Result<(), RecorderMisuseError>
where
    I: IntoIterator<Item = (usize, Solved)>,
{
    let mut pending = BTreeMap::new();
    for (idx, solved) in results {
        pending.insert(idx, solved);
        while let Some(solved) = pending.remove(&recorder.len()) {
            let problem = &problems[recorder.len()];
            progress.set_message(problem.key());
            recorder.record(
                problem.clone(),
                solved.elapsed,
                solved.result,
                solved.diagnostic,
            )?;
            progress.inc(1);
        }
    }
    if !pending.is_empty() {
        warn!(
            "dropping {} results that finished after an unfinished problem",
            pending.len()
        );
    }
    Ok(())
}
