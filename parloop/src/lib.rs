//! parloop finds for-loops whose iterations are provably independent and
//! rewrites them into a fork-join form (`sync.WaitGroup` plus one goroutine
//! per iteration), optionally ranking and vetting candidates with pprof
//! profiling data and a benchmark runner.
//!
//! The pipeline, in dependency order:
//!
//! 1. [`package`] parses the project into position-indexed ASTs and builds a
//!    per-file type oracle ([`resolve`], [`types`]).
//! 2. [`loops`] enumerates every iteration construct.
//! 3. [`analysis`] decides, loop by loop, whether the parallel rewrite
//!    preserves semantics, and says why not when it does not.
//! 4. [`rewrite`] synthesizes the replacement text for each permitted loop
//!    and merges non-conflicting edits into one patched buffer.
//! 5. [`orchestrator`] runs the whole thing in analysis-only or
//!    profile-guided mode, talking to the external benchmark runner.

use std::path::PathBuf;

pub mod analysis;
mod durfmt;
pub mod loops;
pub mod orchestrator;
pub mod package;
pub mod resolve;
pub mod rewrite;
pub mod runner;
pub mod sarif;
pub mod syntax;
pub mod types;
pub mod workdir;

pub use durfmt::format_duration;

/// Everything that can go wrong, split the way the orchestrator reacts to
/// it: configuration errors abort the run, file-level errors skip the file,
/// loop-level errors skip the loop, runner errors revert the candidate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Parse(#[from] syntax::parser::ParseError),
    #[error("{file}: type checking failed: {message}")]
    TypeCheck { file: String, message: String },
    #[error("loop at line {line}: {message}")]
    Rewrite { line: u32, message: String },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        /// Whether the failing path is under the output root. Those end the
        /// run; temp-tree and other I/O failures only end the current file.
        output_root: bool,
        #[source]
        source: std::io::Error,
    },
    #[error("benchmark runner: {0}")]
    Runner(String),
    #[error(transparent)]
    Profile(#[from] parloop_profile::ProfileError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        Error::Io {
            path: path.into(),
            output_root: false,
            source,
        }
    }

    /// Mark an I/O error as being against the output root. Callers writing
    /// final results apply this so the failure ends the run.
    pub fn into_output_root(self) -> Error {
        match self {
            Error::Io { path, source, .. } => Error::Io {
                path,
                output_root: true,
                source,
            },
            other => other,
        }
    }

    /// Errors that end the run, as opposed to the current file or loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Io {
                    output_root: true,
                    ..
                }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which files of the project to analyze.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSelector {
    /// One file, relative to the project root.
    File(PathBuf),
    /// Every source file under the root not starting with `.` or `_`.
    All,
}

/// How the orchestrator decides which permitted rewrites to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Apply every permitted rewrite.
    Analysis,
    /// Rank by profile, prune under threshold, keep only measured wins.
    ProfileGuided,
}

/// Immutable run configuration, assembled once by the CLI and passed down.
#[derive(Clone, Debug)]
pub struct Config {
    pub project_root: PathBuf,
    pub target: FileSelector,
    pub output_dir: PathBuf,
    pub temp_root: PathBuf,
    pub run_id: String,
    pub mode: Mode,
    /// Benchmark function name passed to the runner.
    pub bench_name: String,
    /// Test filter passed to the runner; "NONE" runs nothing.
    pub test_name: String,
    /// Extra flags handed through to the runner verbatim.
    pub go_flags: String,
    pub count: u32,
    pub threshold_percent: f64,
    /// Pre-recorded profile to attribute from instead of running the
    /// initial benchmark.
    pub profile: Option<PathBuf>,
    pub accept: analysis::AcceptMap,
    pub write_sarif: bool,
    pub barrier_stem: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.project_root.as_os_str().is_empty() {
            return Err(Error::Config("please provide a project path".to_owned()));
        }
        if !self.project_root.is_dir() {
            return Err(Error::Config(format!(
                "project path {} is not a directory",
                self.project_root.display()
            )));
        }
        if self.count == 0 {
            return Err(Error::Config("benchmark count must be at least 1".to_owned()));
        }
        if !(0.0..=100.0).contains(&self.threshold_percent) {
            return Err(Error::Config(
                "threshold must be a percentage between 0 and 100".to_owned(),
            ));
        }
        if self.barrier_stem.is_empty()
            || !self
                .barrier_stem
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            || self.barrier_stem.chars().next().unwrap().is_ascii_digit()
        {
            return Err(Error::Config(format!(
                "barrier stem {:?} is not a valid identifier",
                self.barrier_stem
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(root: &std::path::Path) -> Config {
        Config {
            project_root: root.to_path_buf(),
            target: FileSelector::All,
            output_dir: PathBuf::from("_data"),
            temp_root: PathBuf::from("_tmp"),
            run_id: "test".to_owned(),
            mode: Mode::Analysis,
            bench_name: "RunProgram".to_owned(),
            test_name: "NONE".to_owned(),
            go_flags: String::new(),
            count: 3,
            threshold_percent: 10.0,
            profile: None,
            accept: analysis::AcceptMap::default(),
            write_sarif: false,
            barrier_stem: "wg".to_owned(),
        }
    }

    #[test]
    fn validate_rejects_bad_stem_and_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        assert!(cfg.validate().is_ok());
        cfg.barrier_stem = "1bad".to_owned();
        assert!(cfg.validate().is_err());
        cfg.barrier_stem = "wg".to_owned();
        cfg.threshold_percent = 250.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_error_is_fatal_parse_error_is_not() {
        assert!(Error::Config("x".to_owned()).is_fatal());
        let source = syntax::SourceFile::new("bad.go", "package main\n\nfunc { }\n");
        let err = Error::Parse(syntax::parse_file(&source).unwrap_err());
        assert!(!err.is_fatal());
    }

    #[test]
    fn only_output_root_io_errors_are_fatal() {
        let temp_tree = Error::io("_tmp/run/main.go", std::io::Error::other("disk full"));
        assert!(!temp_tree.is_fatal());
        let output_root = temp_tree.into_output_root();
        assert!(output_root.is_fatal());
        // Marking is a no-op on non-I/O errors.
        assert!(!Error::Runner("go vanished".to_owned())
            .into_output_root()
            .is_fatal());
    }
}
