use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io,
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};
use thiserror::Error;

use crate::parse::ParseError;

#[cfg(test)]
pub(crate) mod mock;
pub mod session;
pub mod z3;

/// Default slack granted to an engine beyond the configured time limit before
/// the harness interrupts it.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Largest time limit in milliseconds, engines take the `timeout` option as
/// an unsigned 32-bit value.
pub const MAX_TIME_LIMIT_MS: u64 = u32::MAX as u64;

#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Copy, Clone, Serialize, Deserialize)]
pub enum SolverResult {
    Satisfiable = 10,
    Unsatisfiable = 20,
    Unknown = 30,
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Satisfiable => write!(f, "sat"),
            Self::Unsatisfiable => write!(f, "unsat"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Raw answer of an engine to a satisfiability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Sat,
    Unsat,
    /// Indeterminate, with the reason given by the engine if there is one
    Unknown(Option<String>),
    /// Anything the engine answered outside of the three expected verdicts
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    time_limit: Duration,
    label: String,
    grace: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("time limit must be a positive number of milliseconds")]
    ZeroTimeLimit,
    #[error("time limit must not exceed {} milliseconds", MAX_TIME_LIMIT_MS)]
    TimeLimitTooLarge,
    #[error("number of jobs must be at least 1")]
    ZeroJobs,
}

impl SolverConfig {
    pub fn new(time_limit_ms: u64, label: impl Into<String>) -> Result<Self, ConfigError> {
        if time_limit_ms == 0 {
            return Err(ConfigError::ZeroTimeLimit);
        }
        if time_limit_ms > MAX_TIME_LIMIT_MS {
            return Err(ConfigError::TimeLimitTooLarge);
        }
        Ok(Self {
            time_limit: Duration::from_millis(time_limit_ms),
            label: label.into(),
            grace: DEFAULT_GRACE,
        })
    }

    /// Sets the slack granted beyond the time limit before the session is interrupted.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn time_limit_ms(&self) -> u64 {
        self.time_limit.as_millis() as u64
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        self.grace
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read `{}`: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed input: {0}")]
    Parse(#[from] ParseError),
    #[error("engine rejected `{command}`: {message}")]
    Rejected { command: String, message: String },
    #[error(transparent)]
    Engine(#[from] EngineFault),
}

#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("failed to start engine `{command}`: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("engine I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("engine error: {0}")]
    Reported(String),
    #[error("unexpected engine response: {0}")]
    Protocol(String),
    #[error("engine exited while waiting for the response to `{0}`")]
    Exited(String),
    #[error("engine was interrupted")]
    Interrupted,
    #[error("engine panicked")]
    Panicked,
}

/// Creates independent engine sessions.
///
/// Implementations are shared between worker threads, sessions are moved to the
/// thread that waits for their verdict.
pub trait Engine: Sync {
    type Session: Session;

    fn new_session(&self) -> Result<Self::Session, EngineFault>;
}

/// One engine context, used for exactly one problem.
pub trait Session: Send + 'static {
    fn set(&mut self, option: &str, value: &str) -> Result<(), EngineFault>;

    /// Parses and asserts the problem stored at `path`.
    fn load(&mut self, path: &Path) -> Result<(), LoadError>;

    /// Decides satisfiability of the loaded problem, giving up after `timeout`.
    fn check(&mut self, timeout: Duration) -> Result<Verdict, EngineFault>;

    /// Symbol/value pairs of the model, in the order the engine lists them.
    fn model(&mut self) -> Result<Vec<(String, String)>, EngineFault>;

    /// Registers a flag that, once raised, must make a running `check` return
    /// promptly and release the engine.
    fn set_interrupt(&mut self, interrupt: Arc<AtomicBool>);
}
