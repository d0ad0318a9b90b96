//! End-to-end tests for analysis mode: a real project directory in, a
//! rewritten tree and the stdout protocol out.

use std::fs;
use std::path::Path;

use parloop::analysis::AcceptMap;
use parloop::{orchestrator, Config, FileSelector, Mode};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn config(root: &Path, out: &Path, tmp: &Path, run_id: &str) -> Config {
    Config {
        project_root: root.to_path_buf(),
        target: FileSelector::All,
        output_dir: out.to_path_buf(),
        temp_root: tmp.to_path_buf(),
        run_id: run_id.to_owned(),
        mode: Mode::Analysis,
        bench_name: "RunProgram".to_owned(),
        test_name: "NONE".to_owned(),
        go_flags: String::new(),
        count: 3,
        threshold_percent: 10.0,
        profile: None,
        accept: AcceptMap::default(),
        write_sarif: false,
        barrier_stem: "wg".to_owned(),
    }
}

const MAIN_GO: &str = "package main\n\nfunc work() {\n\tvar arr [10]int\n\tfor i := 0; i < 10; i++ {\n\t\tarr[i] = i\n\t}\n\tvar j = 100\n\tfor i := 0; i < 10; i++ {\n\t\tj++\n\t}\n\t_ = j\n}\n";

#[test]
fn analysis_mode_rewrites_safe_loops_and_reports_both() {
    let project = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write(project.path(), "main.go", MAIN_GO);
    write(project.path(), "go.mod", "module demo\n");

    let cfg = config(
        project.path(),
        &scratch.path().join("out"),
        &scratch.path().join("tmp"),
        "run1",
    );
    let mut out = Vec::new();
    orchestrator::run(&cfg, &mut out).unwrap();
    let stdout = String::from_utf8(out).unwrap();

    assert!(stdout.contains("Refactored: 5 ;"), "stdout was:\n{stdout}");
    assert!(
        stdout.contains("Rejected: 9 ; writes to 'j' declared outside the loop"),
        "stdout was:\n{stdout}"
    );

    let rewritten =
        fs::read_to_string(scratch.path().join("out/run1/main.go")).unwrap();
    assert!(rewritten.contains("sync.WaitGroup"));
    assert!(rewritten.contains(".Add(1)"));
    assert!(rewritten.contains("defer "));
    assert!(rewritten.contains(".Wait()"));
    assert!(rewritten.contains("import \"sync\""));
    // The unsafe loop is untouched.
    assert!(rewritten.contains("for i := 0; i < 10; i++ {\n\t\tj++"));
    // The original tree is untouched.
    assert_eq!(
        fs::read_to_string(project.path().join("main.go")).unwrap(),
        MAIN_GO
    );
}

#[test]
fn rerunning_over_the_rewritten_output_permits_nothing_new() {
    let project = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write(project.path(), "main.go", MAIN_GO);

    let cfg = config(
        project.path(),
        &scratch.path().join("out"),
        &scratch.path().join("tmp"),
        "first",
    );
    let mut out = Vec::new();
    orchestrator::run(&cfg, &mut out).unwrap();

    // Second run takes the first run's output as its project.
    let second_root = scratch.path().join("out/first");
    let cfg2 = config(
        &second_root,
        &scratch.path().join("out2"),
        &scratch.path().join("tmp2"),
        "second",
    );
    let mut out2 = Vec::new();
    orchestrator::run(&cfg2, &mut out2).unwrap();
    let stdout2 = String::from_utf8(out2).unwrap();
    assert!(
        !stdout2.contains("Refactored:"),
        "second run rewrote something: {stdout2}"
    );
}

#[test]
fn nested_permitted_loops_defer_the_outer_fix() {
    let project = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    // Both loops are independently safe; textual nesting forces the merger
    // to keep only the inner fix this run.
    write(
        project.path(),
        "main.go",
        "package main\n\nfunc work(grid [][]int) {\n\tfor i := 0; i < 10; i++ {\n\t\tfor j := 0; j < 10; j++ {\n\t\t\tgrid[i][j] = i + j\n\t\t}\n\t}\n}\n",
    );

    let cfg = config(
        project.path(),
        &scratch.path().join("out"),
        &scratch.path().join("tmp"),
        "nested",
    );
    let mut out = Vec::new();
    orchestrator::run(&cfg, &mut out).unwrap();
    let stdout = String::from_utf8(out).unwrap();

    assert!(stdout.contains("Refactored: 5 ;"), "stdout was:\n{stdout}");
    assert!(!stdout.contains("Refactored: 4 ;"), "stdout was:\n{stdout}");

    let rewritten =
        fs::read_to_string(scratch.path().join("out/nested/main.go")).unwrap();
    // Outer head intact, inner body spawned.
    assert!(rewritten.contains("for i := 0; i < 10; i++ {"));
    assert!(rewritten.contains(".Add(1)"));
    assert!(rewritten.matches(".Wait()").count() == 1);
}

#[test]
fn missing_explicit_target_is_a_config_error() {
    let project = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write(project.path(), "main.go", "package main\n");

    let mut cfg = config(
        project.path(),
        &scratch.path().join("out"),
        &scratch.path().join("tmp"),
        "missing",
    );
    cfg.target = FileSelector::File("nope.go".into());
    let mut out = Vec::new();
    let err = orchestrator::run(&cfg, &mut out).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn applying_and_reverting_restores_bytes_exactly() {
    // The byte-level revert contract profile mode relies on.
    let project = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write(project.path(), "main.go", MAIN_GO);

    let original = fs::read(project.path().join("main.go")).unwrap();
    let cfg = config(
        project.path(),
        &scratch.path().join("out"),
        &scratch.path().join("tmp"),
        "revert",
    );
    let mut out = Vec::new();
    orchestrator::run(&cfg, &mut out).unwrap();

    let target = scratch.path().join("out/revert/main.go");
    let rewritten = fs::read(&target).unwrap();
    assert_ne!(rewritten, original);
    fs::write(&target, &original).unwrap();
    assert_eq!(fs::read(&target).unwrap(), original);
}

#[test]
fn sarif_report_lists_rejections() {
    let project = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write(project.path(), "main.go", MAIN_GO);

    let mut cfg = config(
        project.path(),
        &scratch.path().join("out"),
        &scratch.path().join("tmp"),
        "sarif-run",
    );
    cfg.write_sarif = true;

    // The report lands in the current directory, keyed by run id.
    let cwd = std::env::current_dir().unwrap();
    let report_path = cwd.join("sarif-run.sarif");
    let mut out = Vec::new();
    orchestrator::run(&cfg, &mut out).unwrap();

    let report: serde_json::Value =
        serde_json::from_slice(&fs::read(&report_path).unwrap()).unwrap();
    fs::remove_file(&report_path).ok();
    let results = report["runs"][0]["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["ruleId"], "R012");
    assert_eq!(
        results[0]["locations"][0]["physicalLocation"]["region"]["startLine"],
        9
    );
}
