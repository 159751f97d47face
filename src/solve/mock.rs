//! Scripted engine for tests.
//!
//! Every problem file holds a one-line script that tells the session how to
//! behave:
//!
//! * `sat x=1 y=2` answers sat with the given model (duplicates allowed)
//! * `unsat`
//! * `unknown [reason]`
//! * `other <answer>` answers something that is not a verdict
//! * `slow <ms> <script>` sleeps before following the rest of the script
//! * `spin` runs until the engine time limit, then answers unknown
//! * `loop` ignores the time limit and runs until interrupted
//! * `fault` fails during the check
//! * `nomodel` answers sat but fails to produce a model
//!
//! Content starting with `(` is read as s-expressions, so malformed input turns
//! into a load error.

use super::{Engine, EngineFault, LoadError, Session, Verdict};
use crate::parse::sexp;
use crate::problem::{Problem, ProblemSource};
use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) struct ScriptedEngine {
    dir: TempDir,
    options: Arc<Mutex<Vec<(String, String)>>>,
    live: Arc<AtomicUsize>,
    created: AtomicUsize,
}

impl ScriptedEngine {
    pub(crate) fn new(problems: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, script) in problems {
            fs::write(dir.path().join(name), script).unwrap();
        }
        Self {
            dir,
            options: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(AtomicUsize::new(0)),
            created: AtomicUsize::new(0),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn problem(&self, key: &str) -> Problem {
        ProblemSource::new(self.dir())
            .discover()
            .unwrap()
            .into_iter()
            .find(|problem| problem.key() == key)
            .unwrap()
    }

    /// Options set on any session, in call order.
    pub(crate) fn options(&self) -> Vec<(String, String)> {
        self.options.lock().unwrap().clone()
    }

    /// Number of sessions that have not been dropped yet.
    pub(crate) fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn created_sessions(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Engine for ScriptedEngine {
    type Session = ScriptedSession;

    fn new_session(&self) -> Result<ScriptedSession, EngineFault> {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            options: self.options.clone(),
            live: self.live.clone(),
            script: Vec::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }
}

pub(crate) struct ScriptedSession {
    options: Arc<Mutex<Vec<(String, String)>>>,
    live: Arc<AtomicUsize>,
    script: Vec<String>,
    interrupt: Arc<AtomicBool>,
}

impl ScriptedSession {
    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    fn sleep(&self, duration: Duration) -> Result<(), EngineFault> {
        let start = Instant::now();
        while start.elapsed() < duration {
            if self.interrupted() {
                return Err(EngineFault::Interrupted);
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn run(&self, script: &[String], timeout: Duration) -> Result<Verdict, EngineFault> {
        let word = script.first().map(String::as_str).unwrap_or("");
        match word {
            "sat" | "nomodel" => Ok(Verdict::Sat),
            "unsat" => Ok(Verdict::Unsat),
            "unknown" => Ok(Verdict::Unknown(script.get(1).cloned())),
            "other" => Ok(Verdict::Other(script[1..].join(" "))),
            "fault" => Err(EngineFault::Reported("scripted fault".to_string())),
            "spin" => {
                self.sleep(timeout)?;
                Ok(Verdict::Unknown(Some("timeout".to_string())))
            }
            "loop" => loop {
                if self.interrupted() {
                    return Err(EngineFault::Interrupted);
                }
                thread::sleep(POLL_INTERVAL);
            },
            "slow" => {
                let ms: u64 = script[1].parse().unwrap();
                self.sleep(Duration::from_millis(ms))?;
                self.run(&script[2..], timeout)
            }
            other => Err(EngineFault::Protocol(other.to_string())),
        }
    }

    fn effective_script(&self) -> &[String] {
        let mut script = &self.script[..];
        while script.first().map(String::as_str) == Some("slow") {
            script = &script[2..];
        }
        script
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Session for ScriptedSession {
    fn set(&mut self, option: &str, value: &str) -> Result<(), EngineFault> {
        self.options
            .lock()
            .unwrap()
            .push((option.to_string(), value.to_string()));
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), LoadError> {
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim_start().starts_with('(') {
            sexp::parse(&content)?;
        }
        self.script = content.split_whitespace().map(str::to_string).collect();
        Ok(())
    }

    fn check(&mut self, timeout: Duration) -> Result<Verdict, EngineFault> {
        self.run(&self.script, timeout)
    }

    fn model(&mut self) -> Result<Vec<(String, String)>, EngineFault> {
        let script = self.effective_script();
        if script.first().map(String::as_str) == Some("nomodel") {
            return Err(EngineFault::Reported("model is not available".to_string()));
        }
        Ok(script
            .iter()
            .skip(1)
            .filter_map(|binding| {
                let mut parts = binding.splitn(2, '=');
                Some((parts.next()?.to_string(), parts.next()?.to_string()))
            })
            .collect())
    }

    fn set_interrupt(&mut self, interrupt: Arc<AtomicBool>) {
        self.interrupt = interrupt;
    }
}
