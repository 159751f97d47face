// extern crates
#[macro_use]
extern crate uncover;

// This defines two macros, `covers!` and `covered_by!`.
// They will be no-ops unless `cfg!(debug_assertions)` is true.
define_uncover_macros!(enable_if(cfg!(debug_assertions)));

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{info, LevelFilter};

// Rust stdlib
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};

// modules
pub mod classify;
pub mod compare;
pub mod driver;
pub mod parse;
pub mod problem;
pub mod report;
pub mod solve;
pub mod utils;

pub use classify::{Bindings, SessionResult};
pub use driver::{BatchDriver, HarnessError, RunOutcome};
pub use problem::{Problem, ProblemSource};
pub use report::{JsonReportWriter, ReportWriter, RunRecorder, RunReport};
pub use solve::{z3::Z3Engine, Engine, Session, SolverConfig, SolverResult, Verdict};

// Command line parsing

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub solver: SolverConfig,
    pub tests_dir: PathBuf,
    pub results_dir: PathBuf,
    /// command used to start the engine
    pub engine_command: String,
    pub jobs: usize,
    pub progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Run(RunConfig),
    Compare { baseline: PathBuf, report: PathBuf },
}

#[derive(Debug)]
pub struct BatchConfig {
    mode: Mode,
    verbosity: LevelFilter,
}

impl BatchConfig {
    fn app<'a, 'b>() -> App<'a, 'b> {
        App::new("smtbatch")
            .version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
            .about("Runs every SMT-LIB problem of a directory through an SMT solver and records the results.")
            .setting(AppSettings::SubcommandsNegateReqs)
            .after_help(
                "The report is written once every problem has been solved. Interrupting the \
                 run (Ctrl-C) stops it without writing a report.",
            )
            .arg(
                Arg::with_name("TESTS_DIR")
                    .help("Sets the directory containing the problem files [default: `tests` next to the executable]")
                    .required(false)
                    .index(1),
            )
            .arg(
                Arg::with_name("tests-dir")
                    .long("--tests-dir")
                    .help("Sets the directory containing the problem files")
                    .takes_value(true)
                    .conflicts_with("TESTS_DIR"),
            )
            .arg(
                Arg::with_name("time-limit")
                    .long("--time-limit")
                    .short("-t")
                    .value_name("ms")
                    .help("Sets the time limit per problem in milliseconds")
                    .required(true)
                    .takes_value(true)
                    .validator(|s| match s.parse::<u64>() {
                        Ok(ms) if ms > 0 && ms <= solve::MAX_TIME_LIMIT_MS => Ok(()),
                        _ => Err(format!(
                            "expected a number of milliseconds between 1 and {}, found `{}`",
                            solve::MAX_TIME_LIMIT_MS,
                            s
                        )),
                    }),
            )
            .arg(
                Arg::with_name("label")
                    .long("--label")
                    .short("-l")
                    .help("Sets the name of the run, used to label the report")
                    .default_value("Z3")
                    .takes_value(true),
            )
            .arg(
                Arg::with_name("results-dir")
                    .long("--results-dir")
                    .help("Sets the directory reports are written to [default: `results` next to the problem directory]")
                    .takes_value(true),
            )
            .arg(
                Arg::with_name("solver")
                    .long("--solver")
                    .help("Sets the command used to start the solver")
                    .default_value("z3")
                    .takes_value(true),
            )
            .arg(
                Arg::with_name("jobs")
                    .long("--jobs")
                    .short("-j")
                    .help("Sets the number of problems solved concurrently")
                    .default_value("1")
                    .takes_value(true)
                    .validator(|s| match s.parse::<usize>() {
                        Ok(jobs) if jobs > 0 => Ok(()),
                        _ => Err(format!("expected a positive number of jobs, found `{}`", s)),
                    }),
            )
            .arg(
                Arg::with_name("no-progress")
                    .long("--no-progress")
                    .help("Disables the progress bar"),
            )
            .arg(
                Arg::with_name("v")
                    .short("v")
                    .multiple(true)
                    .global(true)
                    .help("Sets the level of verbosity"),
            )
            .subcommand(
                SubCommand::with_name("compare")
                    .about("Compares a report against a baseline report")
                    .arg(
                        Arg::with_name("BASELINE")
                            .help("Report used as baseline")
                            .required(true)
                            .index(1),
                    )
                    .arg(
                        Arg::with_name("REPORT")
                            .help("Report compared against the baseline")
                            .required(true)
                            .index(2),
                    ),
            )
    }

    pub fn new(args: &[String]) -> Result<Self, Box<dyn Error>> {
        let matches = Self::app().get_matches_from(args);
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches<'_>) -> Result<Self, Box<dyn Error>> {
        let verbosity = match matches.occurrences_of("v") {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        if let ("compare", Some(matches)) = matches.subcommand() {
            let verbosity = verbosity.max(match matches.occurrences_of("v") {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            });
            return Ok(Self {
                mode: Mode::Compare {
                    baseline: PathBuf::from(required(matches, "BASELINE")?),
                    report: PathBuf::from(required(matches, "REPORT")?),
                },
                verbosity,
            });
        }

        let time_limit: u64 = required(matches, "time-limit")?.parse()?;
        let label = matches.value_of("label").unwrap_or("Z3");
        let solver = SolverConfig::new(time_limit, label)?;

        let tests_dir = match matches
            .value_of("TESTS_DIR")
            .or_else(|| matches.value_of("tests-dir"))
        {
            Some(dir) => PathBuf::from(dir),
            None => default_tests_dir(),
        };
        let results_dir = match matches.value_of("results-dir") {
            Some(dir) => PathBuf::from(dir),
            None => default_results_dir(&tests_dir),
        };
        let jobs = matches.value_of("jobs").unwrap_or("1").parse::<usize>()?;
        if jobs == 0 {
            return Err(solve::ConfigError::ZeroJobs.into());
        }

        Ok(Self {
            mode: Mode::Run(RunConfig {
                solver,
                tests_dir,
                results_dir,
                engine_command: matches.value_of("solver").unwrap_or("z3").to_string(),
                jobs,
                progress: !matches.is_present("no-progress"),
            }),
            verbosity,
        })
    }

    #[must_use]
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn run(&self) -> Result<(), Box<dyn Error>> {
        // a logger may already be installed when used as a library
        let _ = env_logger::Builder::new()
            .filter_level(self.verbosity)
            .try_init();

        match &self.mode {
            Mode::Run(config) => {
                let outcome = run(config)?;
                println!("{}", outcome.report.summary());
                println!("report written to `{}`", outcome.location.display());
                Ok(())
            }
            Mode::Compare { baseline, report } => {
                let baseline = RunReport::load(baseline)?;
                let report = RunReport::load(report)?;
                print!("{}", compare::compare(&baseline, &report));
                Ok(())
            }
        }
    }
}

fn required<'a>(matches: &'a ArgMatches<'_>, name: &str) -> Result<&'a str, String> {
    matches
        .value_of(name)
        .ok_or_else(|| format!("missing required argument `{}`", name))
}

/// The `tests` directory next to the executable, or `./tests` if the location
/// of the executable is unknown.
fn default_tests_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("tests")))
        .unwrap_or_else(|| PathBuf::from("tests"))
}

/// Reports are stored in a `results` directory next to the problem directory.
fn default_results_dir(tests_dir: &Path) -> PathBuf {
    tests_dir
        .parent()
        .map_or_else(|| PathBuf::from("results"), |parent| parent.join("results"))
}

/// Runs every problem of the configured directory through a z3 process.
pub fn run(config: &RunConfig) -> Result<RunOutcome, HarnessError> {
    info!(
        "running `{}` on `{}` with a time limit of {} ms",
        config.engine_command,
        config.tests_dir.display(),
        config.solver.time_limit_ms()
    );
    let engine = Z3Engine::with_command(config.engine_command.clone());
    let driver = BatchDriver::new(&engine, config.solver.clone())
        .with_jobs(config.jobs)
        .with_progress(config.progress);
    let mut writer = JsonReportWriter::new(&config.results_dir);
    driver.run(&ProblemSource::new(&config.tests_dir), &mut writer)
}
