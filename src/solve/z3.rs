//! Engine backed by a `z3` process speaking SMT-LIB 2 on stdin/stdout.

use super::{Engine, EngineFault, LoadError, Session, Verdict};
use crate::parse::sexp::{self, Sexp};
use log::{debug, trace, warn};
use std::{
    fs,
    io::{BufRead, BufReader, Write},
    path::Path,
    process::{Child, ChildStdin, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError},
        Arc,
    },
    thread,
    time::Duration,
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Commands of a problem file that are not forwarded to the engine; the harness
/// issues checks and model queries itself. Scope commands (`push`, `pop`,
/// `reset`, `reset-assertions`) are forwarded so that popped assertions are
/// retracted by the engine.
const SKIPPED_COMMANDS: &[&str] = &[
    "check-sat",
    "check-sat-assuming",
    "echo",
    "exit",
    "get-assertions",
    "get-assignment",
    "get-info",
    "get-model",
    "get-option",
    "get-proof",
    "get-unsat-assumptions",
    "get-unsat-core",
    "get-value",
];

#[derive(Debug, Clone)]
pub struct Z3Engine {
    command: String,
}

impl Z3Engine {
    pub fn new() -> Self {
        Self::with_command("z3")
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Default for Z3Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for Z3Engine {
    type Session = Z3Session;

    fn new_session(&self) -> Result<Z3Session, EngineFault> {
        Z3Session::spawn(&self.command)
    }
}

pub struct Z3Session {
    child: Child,
    stdin: ChildStdin,
    /// lines written by the engine, forwarded by a reader thread
    responses: Receiver<String>,
    interrupt: Arc<AtomicBool>,
}

impl Z3Session {
    fn spawn(command: &str) -> Result<Self, EngineFault> {
        let mut child = Command::new(command)
            .args(&["-in", "-smt2"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineFault::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineFault::Protocol("failed to capture engine stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineFault::Protocol("failed to capture engine stdout".into()))?;

        let (tx, rx) = channel();
        thread::Builder::new()
            .name("z3-stdout".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            })?;

        let mut session = Self {
            child,
            stdin,
            responses: rx,
            interrupt: Arc::new(AtomicBool::new(false)),
        };
        session.command_expect_success("(set-option :print-success true)")?;
        Ok(session)
    }

    /// Sends one command and waits for the engine's response to it.
    fn send(&mut self, command: &str) -> Result<Sexp, EngineFault> {
        trace!("> {}", command);
        writeln!(self.stdin, "{}", command)?;
        self.stdin.flush()?;

        let mut response = String::new();
        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                self.terminate();
                return Err(EngineFault::Interrupted);
            }
            match self.responses.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    response.push_str(&line);
                    response.push('\n');
                    match sexp::parse_one(&response) {
                        Ok(expr) => {
                            trace!("< {}", expr);
                            return Ok(expr);
                        }
                        Err(err) if err.is_incomplete() => continue,
                        Err(err) => return Err(EngineFault::Protocol(err.to_string())),
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineFault::Exited(command.to_string()))
                }
            }
        }
    }

    /// Sends a command that is answered by `success` when it is accepted.
    fn command(&mut self, command: &str) -> Result<Result<(), String>, EngineFault> {
        let response = self.send(command)?;
        if let Some(message) = error_message(&response) {
            return Ok(Err(message));
        }
        match response.as_atom() {
            Some("success") => Ok(Ok(())),
            Some("unsupported") => {
                warn!("engine does not support `{}`", command);
                Ok(Ok(()))
            }
            _ => Err(EngineFault::Protocol(response.to_string())),
        }
    }

    fn command_expect_success(&mut self, command: &str) -> Result<(), EngineFault> {
        self.command(command)?.map_err(EngineFault::Reported)
    }

    fn reason_unknown(&mut self) -> Option<String> {
        match self.send("(get-info :reason-unknown)") {
            // (:reason-unknown "timeout")
            Ok(response) => response
                .as_list()
                .and_then(|items| items.get(1))
                .and_then(|reason| reason.string_value().or_else(|| reason.as_atom().map(str::to_string))),
            Err(err) => {
                debug!("could not query reason for unknown: {}", err);
                None
            }
        }
    }

    fn terminate(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for Z3Session {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "(exit)");
        let _ = self.stdin.flush();
        self.terminate();
    }
}

impl Session for Z3Session {
    fn set(&mut self, option: &str, value: &str) -> Result<(), EngineFault> {
        self.command_expect_success(&format!("(set-option :{} {})", option, value))
    }

    fn load(&mut self, path: &Path) -> Result<(), LoadError> {
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        for command in forwarded_commands(sexp::parse(&content)?) {
            let text = command.to_string();
            if let Err(message) = self.command(&text)? {
                return Err(LoadError::Rejected {
                    command: command.head().unwrap_or("?").to_string(),
                    message,
                });
            }
        }
        Ok(())
    }

    fn check(&mut self, timeout: Duration) -> Result<Verdict, EngineFault> {
        // the problem file may have set its own limit
        self.set("timeout", &timeout.as_millis().to_string())?;

        let response = self.send("(check-sat)")?;
        if let Some(message) = error_message(&response) {
            return Err(EngineFault::Reported(message));
        }
        Ok(match response.as_atom() {
            Some("sat") => Verdict::Sat,
            Some("unsat") => Verdict::Unsat,
            Some("unknown") => Verdict::Unknown(self.reason_unknown()),
            _ => Verdict::Other(response.to_string()),
        })
    }

    fn model(&mut self) -> Result<Vec<(String, String)>, EngineFault> {
        let response = self.send("(get-model)")?;
        if let Some(message) = error_message(&response) {
            return Err(EngineFault::Reported(message));
        }
        model_bindings(&response)
    }

    fn set_interrupt(&mut self, interrupt: Arc<AtomicBool>) {
        self.interrupt = interrupt;
    }
}

fn is_forwarded(command: &Sexp) -> bool {
    match command.head() {
        Some(head) if SKIPPED_COMMANDS.contains(&head) => false,
        // the session relies on `success` acknowledgements
        Some("set-option") => command
            .as_list()
            .and_then(|items| items.get(1))
            .and_then(Sexp::as_atom)
            != Some(":print-success"),
        _ => true,
    }
}

/// The commands of a problem file that are sent to the engine, in file order.
///
/// A full `(reset)` would also drop the session options, it is sent as
/// `(reset-assertions)` and the logic declared before it stays in effect.
fn forwarded_commands(commands: Vec<Sexp>) -> Vec<Sexp> {
    let mut after_reset = false;
    let mut forwarded = Vec::with_capacity(commands.len());
    for command in commands {
        if !is_forwarded(&command) || (after_reset && command.head() == Some("set-logic")) {
            debug!("not forwarding `{}`", command);
            continue;
        }
        if command.head() == Some("reset") {
            after_reset = true;
            forwarded.push(Sexp::List(vec![Sexp::atom("reset-assertions")]));
        } else {
            forwarded.push(command);
        }
    }
    forwarded
}

/// The message of an `(error "...")` response.
fn error_message(response: &Sexp) -> Option<String> {
    if response.head() != Some("error") {
        return None;
    }
    let items = response.as_list()?;
    Some(
        items
            .get(1)
            .and_then(Sexp::string_value)
            .unwrap_or_else(|| response.to_string()),
    )
}

/// Reads the definitions of a `(get-model)` response.
///
/// Constants map to their value, functions to a `lambda` over their arguments.
/// Older engine versions wrap the definitions in `(model ...)`.
fn model_bindings(model: &Sexp) -> Result<Vec<(String, String)>, EngineFault> {
    let mut items = model
        .as_list()
        .ok_or_else(|| EngineFault::Protocol(model.to_string()))?;
    if items.first().and_then(Sexp::as_atom) == Some("model") {
        items = &items[1..];
    }

    let mut bindings = Vec::new();
    for item in items {
        if item.head() != Some("define-fun") {
            continue;
        }
        match item.as_list() {
            Some([_, name, args, _sort, body]) => {
                let name = name
                    .symbol_name()
                    .ok_or_else(|| EngineFault::Protocol(item.to_string()))?;
                let value = match args.as_list() {
                    Some([]) => body.to_string(),
                    _ => format!("(lambda {} {})", args, body),
                };
                bindings.push((name.to_string(), value));
            }
            _ => return Err(EngineFault::Protocol(item.to_string())),
        }
    }
    Ok(bindings)
}
