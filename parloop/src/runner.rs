//! The external benchmark runner: synchronous `go test` invocations in the
//! working copy, with CPU and memory profiling when requested. Output is
//! captured whole (no streaming) and failure is detected by the `FAIL`
//! marker the Go test harness prints.

use std::path::Path;
use std::process::Command;

use crate::{Error, Result};

pub const CPU_PROFILE: &str = "cpu.pprof";
pub const MEM_PROFILE: &str = "mem.pprof";

/// One benchmark/test invocation.
#[derive(Clone, Debug)]
pub struct RunRequest<'a> {
    pub dir: &'a Path,
    /// Extra flags passed through verbatim, whitespace-separated.
    pub flags: &'a str,
    /// `-bench=` selector; "NONE" disables benchmarks.
    pub bench_name: &'a str,
    /// `-run=` selector; "NONE" disables tests.
    pub test_name: &'a str,
    pub count: u32,
    pub profile: bool,
}

/// Combined stdout and stderr of a finished run.
pub struct RunOutput {
    pub text: String,
}

impl RunOutput {
    pub fn failed(&self) -> bool {
        self.text.contains("FAIL")
    }

    pub fn no_test_files(&self) -> bool {
        self.text.contains("no test files")
    }
}

/// Invoke `go test` and capture its output. Blocks until the process
/// exits; a non-zero exit is not itself an error here, since the FAIL
/// marker in the output is what callers act on.
pub fn run_go_test(request: &RunRequest) -> Result<RunOutput> {
    let mut cmd = Command::new("go");
    cmd.arg("test");
    for flag in request.flags.split_whitespace() {
        cmd.arg(flag);
    }
    cmd.arg(format!("-bench={}", request.bench_name));
    cmd.arg(format!("-run={}", request.test_name));
    cmd.arg(format!("-count={}", request.count));
    if request.profile {
        cmd.arg("-cpuprofile").arg(CPU_PROFILE);
        cmd.arg("-memprofile").arg(MEM_PROFILE);
    }
    cmd.current_dir(request.dir);

    log::debug!("running {cmd:?}");
    let output = cmd
        .output()
        .map_err(|e| Error::Runner(format!("failed to launch go test: {e}")))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        log::warn!("go test exited with {}", output.status);
    }
    Ok(RunOutput { text })
}

/// Make the build descriptor's dependencies available in the working copy.
pub fn download_dependencies(dir: &Path) -> Result<()> {
    let output = Command::new("go")
        .args(["mod", "download"])
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Runner(format!("failed to launch go mod download: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Runner(format!(
            "go mod download failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fail_marker_detection() {
        let ok = RunOutput {
            text: "goos: linux\nBenchmarkRun-8 100 123 ns/op\nPASS\nok  demo 1.2s\n".to_owned(),
        };
        assert!(!ok.failed());
        let bad = RunOutput {
            text: "--- FAIL: TestThing (0.00s)\nFAIL\nexit status 1\n".to_owned(),
        };
        assert!(bad.failed());
        let none = RunOutput {
            text: "?   demo [no test files]\n".to_owned(),
        };
        assert!(none.no_test_files());
    }
}
