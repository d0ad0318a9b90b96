use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use uuid::Uuid;

use parloop::analysis::AcceptMap;
use parloop::{Config, FileSelector, Mode};

/// Find data-independent loops and rewrite them into fork-join goroutines,
/// optionally guided by pprof profiling data.
#[derive(Parser, Debug)]
#[command(name = "parloop", version, about)]
struct Cli {
    /// Path to the project root.
    #[arg(short, long)]
    project: PathBuf,

    /// Target file relative to the project root, or "all".
    #[arg(short, long, default_value = "all")]
    filename: String,

    /// Output folder for rewritten sources.
    #[arg(short, long, default_value = "_data")]
    output: PathBuf,

    /// Folder for per-run working copies.
    #[arg(long, default_value = "_tmp")]
    temp: PathBuf,

    /// Id of the run; a fresh UUID when omitted.
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Rank candidates with profiling data and keep only measured wins.
    #[arg(short = 'g', long)]
    profile_guided: bool,

    /// Pre-recorded CPU profile to attribute from instead of running the
    /// initial benchmark.
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Name of the benchmark to run.
    #[arg(short, long, default_value = "RunProgram")]
    benchname: String,

    /// Name of the test to run; "NONE" skips testing.
    #[arg(short, long, default_value = "NONE")]
    testname: String,

    /// Extra flags passed to the benchmark runner.
    #[arg(long, default_value = "")]
    flags: String,

    /// How many times to run the benchmark.
    #[arg(short, long, default_value_t = 3)]
    count: u32,

    /// Minimum share of total runtime (percent) a loop must account for.
    #[arg(short = 'd', long, default_value_t = 10.0)]
    threshold: f64,

    /// Accept a method receiver in a given loop, as ident:line. Repeatable.
    #[arg(short = 'e', long = "accept")]
    accept: Vec<String>,

    /// Write a SARIF report of the rejections next to the output.
    #[arg(long)]
    sarif: bool,

    /// Stem for generated barrier variable names.
    #[arg(long, default_value = "wg")]
    stem: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config {
        project_root: cli.project,
        target: if cli.filename == "all" {
            FileSelector::All
        } else {
            FileSelector::File(PathBuf::from(cli.filename))
        },
        output_dir: cli.output,
        temp_root: cli.temp,
        run_id: cli.name.unwrap_or_else(|| Uuid::new_v4().to_string()),
        mode: if cli.profile_guided {
            Mode::ProfileGuided
        } else {
            Mode::Analysis
        },
        bench_name: cli.benchname,
        test_name: cli.testname,
        go_flags: cli.flags,
        count: cli.count,
        threshold_percent: cli.threshold,
        profile: cli.profile,
        accept: AcceptMap::parse(&cli.accept)?,
        write_sarif: cli.sarif,
        barrier_stem: cli.stem,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    parloop::orchestrator::run(&config, &mut out).context("run failed")?;
    out.flush().ok();
    Ok(())
}
