//! Lifecycle of a single, bounded engine interaction.
//!
//! A session moves through `Configured -> Loaded -> Checked`, every transition
//! consumes the previous state so that a session cannot be reused for a second
//! problem.

use super::{Engine, EngineFault, LoadError, Session, SolverConfig, Verdict};
use crate::classify::Bindings;
use crate::problem::Problem;
use log::{debug, warn};
use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, RecvTimeoutError},
        Arc,
    },
    thread,
    time::Duration,
};

/// Session state: fresh engine context with options applied.
#[derive(Debug)]
pub enum Configured {}

/// Session state: problem asserted, ready to check.
#[derive(Debug)]
pub enum Loaded {}

pub struct SolverSession<S: Session, State> {
    session: S,
    time_limit: Duration,
    grace: Duration,
    interrupt: Arc<AtomicBool>,
    state: PhantomData<State>,
}

impl<S: Session> SolverSession<S, Configured> {
    /// Creates a fresh engine session that tracks unsat cores, produces models,
    /// and is bounded by the configured time limit.
    pub fn configure<E>(engine: &E, config: &SolverConfig) -> Result<Self, EngineFault>
    where
        E: Engine<Session = S>,
    {
        let mut session = engine.new_session()?;
        session.set("produce-unsat-cores", "true")?;
        session.set("produce-models", "true")?;
        session.set("timeout", &config.time_limit_ms().to_string())?;

        let interrupt = Arc::new(AtomicBool::new(false));
        session.set_interrupt(interrupt.clone());

        Ok(Self {
            session,
            time_limit: config.time_limit(),
            grace: config.grace(),
            interrupt,
            state: PhantomData,
        })
    }

    pub fn load(mut self, problem: &Problem) -> Result<SolverSession<S, Loaded>, LoadError> {
        self.session.load(problem.path())?;
        Ok(SolverSession {
            session: self.session,
            time_limit: self.time_limit,
            grace: self.grace,
            interrupt: self.interrupt,
            state: PhantomData,
        })
    }
}

impl<S: Session> SolverSession<S, Loaded> {
    /// Runs the decision procedure.
    ///
    /// The engine is expected to honor the time limit on its own. If it has not
    /// answered within the time limit plus the grace period, the session is
    /// interrupted, released, and the verdict is unknown.
    pub fn check(self) -> Result<CheckedSession<S>, EngineFault> {
        let (tx, rx) = channel();
        let time_limit = self.time_limit;
        let mut session = self.session;

        let child = thread::Builder::new()
            .name("solver-check".to_string())
            .spawn(move || {
                let verdict = session.check(time_limit);
                // the receiver is gone if the watchdog already gave up
                let _ = tx.send(verdict);
                session
            })?;

        let deadline = self.time_limit + self.grace;
        match rx.recv_timeout(deadline) {
            Ok(verdict) => {
                let session = child.join().map_err(|_| EngineFault::Panicked)?;
                let verdict = verdict?;
                debug!("engine answered {:?}", verdict);
                Ok(CheckedSession {
                    session: Some(session),
                    verdict,
                    timed_out: false,
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "engine did not answer within {:?}, interrupting it",
                    deadline
                );
                self.interrupt.store(true, Ordering::Relaxed);
                // joining drops the session on the checking thread
                let _ = child.join();
                Ok(CheckedSession {
                    session: None,
                    verdict: Verdict::Unknown(Some("timeout".to_string())),
                    timed_out: true,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = child.join();
                Err(EngineFault::Panicked)
            }
        }
    }
}

/// A session after its verdict is known.
pub struct CheckedSession<S: Session> {
    /// `None` once the engine was released after an expired deadline
    session: Option<S>,
    verdict: Verdict,
    timed_out: bool,
}

impl<S: Session> CheckedSession<S> {
    #[must_use]
    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    /// True if the harness had to interrupt the engine.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Human readable note on verdicts that are not sat/unsat.
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        match &self.verdict {
            Verdict::Sat | Verdict::Unsat => None,
            Verdict::Unknown(reason) => reason.clone(),
            Verdict::Other(answer) => Some(format!("unrecognized verdict `{}`", answer)),
        }
    }

    /// Collects the model of a satisfiable verdict, empty for any other verdict.
    pub fn extract_model(&mut self) -> Result<Bindings, EngineFault> {
        match (&self.verdict, self.session.as_mut()) {
            (Verdict::Sat, Some(session)) => Ok(session.model()?.into_iter().collect()),
            _ => Ok(Bindings::new()),
        }
    }
}
