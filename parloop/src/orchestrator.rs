//! The orchestrator: wires discovery, analysis, synthesis, and merging into
//! the two run modes.
//!
//! * Analysis mode applies every permitted rewrite straight away.
//! * Profile-guided mode runs the benchmark once up front, attributes
//!   cumulative time to each loop from the profile's call graph, prunes
//!   candidates under the threshold, and then tries the survivors one at a
//!   time: a candidate is kept only when the tests pass and the measured
//!   duration beats the best one so far; otherwise the file is restored
//!   byte-exactly from the copy taken before the attempt.
//!
//! Per-loop and per-file problems never end the run; they are reported and
//! the walk continues. Only configuration errors and I/O failures against
//! the output root do.

use std::fs;
use std::io::Write;
use std::path::Path;

use parloop_profile::{Graph, Profile};

use crate::analysis::{analyze_loop, diagnostics, AnalysisContext, Verdict};
use crate::loops::{find_loops, Loop};
use crate::package::{LoadedFile, Package};
use crate::rewrite::{
    apply_edits, line_delta, merge_with_survivors, synthesize_fix, SuggestedFix,
};
use crate::runner::{download_dependencies, run_go_test, RunRequest, CPU_PROFILE};
use crate::sarif::Report;
use crate::workdir::{clean_or_create, copy_project, out_dir, work_dir, write_file};
use crate::{format_duration, Config, Error, FileSelector, Mode, Result};

/// Attributed cost of one loop.
#[derive(Clone, Debug)]
pub struct LoopInfo {
    pub start_line: u32,
    pub end_line: u32,
    pub start_offset: u32,
    pub cumulative_time_ns: i64,
}

/// Run the tool with `config`, writing protocol lines to `out`.
pub fn run(config: &Config, out: &mut dyn Write) -> Result<()> {
    config.validate()?;
    match config.mode {
        Mode::Analysis => analysis_mode(config, out),
        Mode::ProfileGuided => profile_mode(config, out),
    }
}

fn selected_files<'p>(config: &Config, pkg: &'p Package) -> Result<Vec<&'p LoadedFile>> {
    match &config.target {
        FileSelector::All => Ok(pkg.files.iter().collect()),
        FileSelector::File(rel) => {
            let rel = rel.to_string_lossy();
            let file = pkg
                .file_by_name(&rel)
                .ok_or_else(|| Error::Config(format!("file {rel} not found in project")))?;
            Ok(vec![file])
        }
    }
}

fn surface_skipped(pkg: &Package) {
    for err in &pkg.skipped {
        log::warn!("skipping file: {err}");
    }
}

// ----- analysis mode -----

fn analysis_mode(config: &Config, out: &mut dyn Write) -> Result<()> {
    let pkg = Package::load(&config.project_root)?;
    surface_skipped(&pkg);
    let mut report = config.write_sarif.then(Report::new);
    let dest = out_dir(&config.output_dir, &config.run_id);

    for file in selected_files(config, &pkg)? {
        if let Err(err) = rewrite_whole_file(config, &pkg, file, report.as_mut(), &dest, out) {
            if err.is_fatal() {
                return Err(err);
            }
            log::error!("{}: {err}", file.rel_path);
        }
    }

    if let Some(report) = &report {
        let path = Path::new(&config.run_id).with_extension("sarif");
        report.write(&path)?;
        let _ = writeln!(out, "SARIF report written to {}", path.display());
    }
    Ok(())
}

/// Analyze one file, synthesize fixes for every permitted loop, merge, and
/// write the rewritten file under the output directory.
fn rewrite_whole_file(
    config: &Config,
    pkg: &Package,
    file: &LoadedFile,
    mut report: Option<&mut Report>,
    dest: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let cx = AnalysisContext {
        source: &file.source,
        symbols: &pkg.symbols,
        bindings: &file.bindings,
        oracle: &file.oracle,
        accept: &config.accept,
    };
    let loops = find_loops(&file.ast, &file.source);

    let mut fixes: Vec<SuggestedFix> = Vec::new();
    let mut fix_lines: Vec<u32> = Vec::new();
    for lp in &loops {
        match analyze_loop(&cx, lp) {
            Verdict::Permit => {
                match synthesize_fix(&file.source, &file.ast, &file.oracle, lp, &config.barrier_stem)
                {
                    Ok(fix) => {
                        fixes.push(fix);
                        fix_lines.push(lp.start_line);
                    }
                    Err(err) => log::error!("{}: {err}", file.rel_path),
                }
            }
            Verdict::Reject(rejections) => {
                if let Some(primary) = rejections.first() {
                    let _ = writeln!(out, "Rejected: {} ; {}", lp.start_line, primary.message);
                }
                if let Some(report) = report.as_deref_mut() {
                    for diag in diagnostics(&file.source, lp, &rejections) {
                        report.add_diagnostic(&file.rel_path, &diag);
                    }
                }
            }
        }
    }

    let (edits, survivors) = merge_with_survivors(&fixes);
    for &index in &survivors {
        let _ = writeln!(out, "Refactored: {} ;", fix_lines[index]);
    }
    if survivors.len() < fixes.len() {
        log::info!(
            "{}: {} overlapping fix(es) deferred to a later run",
            file.rel_path,
            fixes.len() - survivors.len()
        );
    }

    let output = apply_edits(
        file.source.src.as_bytes(),
        &edits,
        file.ast.import_insert_offset(),
    );
    let path =
        write_file(dest, &file.rel_path, &output).map_err(Error::into_output_root)?;
    let _ = writeln!(out, "Final version written to {}", path.display());
    Ok(())
}

// ----- profile-guided mode -----

struct Candidate {
    /// Adjusted as earlier accepted rewrites shift the file down.
    line: u32,
    cumulative_time_ns: i64,
}

fn profile_mode(config: &Config, out: &mut dyn Write) -> Result<()> {
    let work = work_dir(&config.temp_root, &config.run_id);
    clean_or_create(&work)?;
    copy_project(&config.project_root, &work)?;
    if let Err(err) = download_dependencies(&work) {
        let _ = writeln!(out, "Error downloading dependencies: {err}");
        let _ = writeln!(out, "Does the project have a go.mod file?");
        return Ok(());
    }

    // One initial benchmark before any edit, unless a profile was supplied.
    let profile = match &config.profile {
        Some(path) => Profile::parse_file(path)?,
        None => {
            let output = run_go_test(&RunRequest {
                dir: &work,
                flags: &config.go_flags,
                bench_name: &config.bench_name,
                test_name: "NONE",
                count: config.count,
                profile: true,
            })?;
            if output.failed() || output.no_test_files() {
                let _ = writeln!(out, "Error running benchmark");
                return Ok(());
            }
            Profile::parse_file(&work.join(CPU_PROFILE))?
        }
    };
    let graph = profile.graph();
    let original_duration = profile.duration_nanos;
    let mut best_duration = original_duration;

    let mut report = config.write_sarif.then(Report::new);
    let dest = out_dir(&config.output_dir, &config.run_id);
    let threshold = ((original_duration as f64) / 100.0 * config.threshold_percent) as i64;

    let pkg = Package::load(&work)?;
    surface_skipped(&pkg);
    let targets: Vec<String> = selected_files(config, &pkg)?
        .into_iter()
        .map(|f| f.rel_path.clone())
        .collect();

    for rel in targets {
        let result = profile_target(
            config,
            &pkg,
            &rel,
            &work,
            &dest,
            &graph,
            threshold,
            report.as_mut(),
            best_duration,
            out,
        );
        match result {
            Ok(best) => best_duration = best,
            Err(err) if err.is_fatal() => return Err(err),
            // Fatal for this file only; the remaining targets still run.
            Err(err) => log::error!("{rel}: {err}"),
        }
    }

    let _ = writeln!(out, "Original runtime: {}", format_duration(original_duration));
    let _ = writeln!(out, "New runtime: {}", format_duration(best_duration));

    if let Some(report) = &report {
        let path = Path::new(&config.run_id).with_extension("sarif");
        report.write(&path)?;
        let _ = writeln!(out, "SARIF report written to {}", path.display());
    }
    Ok(())
}

/// Plan, try, and persist the candidates of one target file. Returns the
/// best duration after its attempts.
#[allow(clippy::too_many_arguments)]
fn profile_target(
    config: &Config,
    pkg: &Package,
    rel: &str,
    work: &Path,
    dest: &Path,
    graph: &Graph,
    threshold: i64,
    report: Option<&mut Report>,
    best_duration: i64,
    out: &mut dyn Write,
) -> Result<i64> {
    let file = pkg
        .file_by_name(rel)
        .expect("targets come from the loaded package");
    let candidates = plan_candidates(config, pkg, file, graph, threshold, report, out);
    let best = try_candidates(config, work, rel, candidates, best_duration, out)?;

    let final_path = work.join(rel);
    let final_bytes = fs::read(&final_path).map_err(|e| Error::io(&final_path, e))?;
    let path = write_file(dest, rel, &final_bytes).map_err(Error::into_output_root)?;
    let _ = writeln!(out, "Final version written to {}", path.display());
    Ok(best)
}

/// Safe loops of one file, attributed and pruned: sorted by descending
/// cumulative time (offset breaks ties), dropped when under threshold.
fn plan_candidates(
    config: &Config,
    pkg: &Package,
    file: &LoadedFile,
    graph: &Graph,
    threshold: i64,
    mut report: Option<&mut Report>,
    out: &mut dyn Write,
) -> Vec<Candidate> {
    let cx = AnalysisContext {
        source: &file.source,
        symbols: &pkg.symbols,
        bindings: &file.bindings,
        oracle: &file.oracle,
        accept: &config.accept,
    };
    let loops = find_loops(&file.ast, &file.source);

    let mut safe: Vec<LoopInfo> = Vec::new();
    for lp in &loops {
        match analyze_loop(&cx, lp) {
            Verdict::Permit => safe.push(attribute(lp, graph)),
            Verdict::Reject(rejections) => {
                if let Some(primary) = rejections.first() {
                    let _ = writeln!(out, "Rejected: {} ; {}", lp.start_line, primary.message);
                }
                if let Some(report) = report.as_deref_mut() {
                    for diag in diagnostics(&file.source, lp, &rejections) {
                        report.add_diagnostic(&file.rel_path, &diag);
                    }
                }
            }
        }
    }

    safe.sort_by_key(|info| (-info.cumulative_time_ns, info.start_offset));

    let mut out_list = Vec::new();
    for info in safe {
        let time = info.cumulative_time_ns;
        if time < threshold {
            let _ = writeln!(
                out,
                "Loop at line {} has a total Time of {}, which is less than the threshold of {}",
                info.start_line,
                format_duration(time),
                format_duration(threshold)
            );
            continue;
        }
        let _ = writeln!(
            out,
            "Loop at line {} has a total Time of {}, which is greater than the threshold of {}",
            info.start_line,
            format_duration(time),
            format_duration(threshold)
        );
        out_list.push(Candidate {
            line: info.start_line,
            cumulative_time_ns: time,
        });
    }
    out_list
}

/// Sum the cumulative time of every profile node whose line falls inside
/// the loop.
fn attribute(lp: &Loop, graph: &Graph) -> LoopInfo {
    let cumulative: i64 = graph
        .nodes_in_line_range(i64::from(lp.start_line), i64::from(lp.end_line))
        .iter()
        .map(|n| n.cum)
        .sum();
    LoopInfo {
        start_line: lp.start_line,
        end_line: lp.end_line,
        start_offset: lp.start_offset(),
        cumulative_time_ns: cumulative,
    }
}

/// What one candidate attempt left in the working copy.
enum Outcome {
    /// The change measured faster and stays applied.
    Kept { duration: i64, delta: u32 },
    /// Tests failed or it measured slower; the caller restores the
    /// snapshot.
    Discarded,
    /// No loop starts at the candidate's line anymore.
    Missing,
}

/// Apply candidates one at a time against the working copy, keeping a
/// change only when the tests pass and the benchmark improves on the best
/// duration so far. A failing attempt reverts the file and the walk
/// continues with the next candidate. Returns the best duration after all
/// attempts.
fn try_candidates(
    config: &Config,
    work: &Path,
    rel: &str,
    mut candidates: Vec<Candidate>,
    mut best_duration: i64,
    out: &mut dyn Write,
) -> Result<i64> {
    for i in 0..candidates.len() {
        let line = candidates[i].line;
        log::info!(
            "trying loop at line {line} (cum {})",
            format_duration(candidates[i].cumulative_time_ns)
        );
        let path = work.join(rel);
        // Without a snapshot there is nothing to restore to; give up on
        // this file.
        let saved = fs::read(&path).map_err(|e| Error::io(&path, e))?;

        match attempt_candidate(config, work, rel, line, best_duration, &saved, out) {
            Ok(Outcome::Kept { duration, delta }) => {
                best_duration = duration;
                // Later candidates move down by the lines this fix added.
                for later in candidates.iter_mut().skip(i + 1) {
                    if later.line > line {
                        later.line += delta;
                    }
                }
            }
            Ok(Outcome::Discarded) => {
                fs::write(&path, &saved).map_err(|e| Error::io(&path, e))?;
            }
            Ok(Outcome::Missing) => {
                log::warn!("loop at line {line} no longer present; skipping");
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                // Per-loop problems revert the attempt and move on.
                log::error!("loop at line {line}: {err}");
                fs::write(&path, &saved).map_err(|e| Error::io(&path, e))?;
            }
        }
    }
    Ok(best_duration)
}

/// Rewrite one candidate in the working copy and measure it. The change is
/// left in place whatever the outcome; only `Kept` means it should stay.
fn attempt_candidate(
    config: &Config,
    work: &Path,
    rel: &str,
    line: u32,
    best_duration: i64,
    saved: &[u8],
    out: &mut dyn Write,
) -> Result<Outcome> {
    let Some(fix) = try_one_candidate(config, work, rel, line)? else {
        return Ok(Outcome::Missing);
    };

    // Tests first; a failure discards the change outright.
    if config.test_name != "NONE" {
        let tests = run_go_test(&RunRequest {
            dir: work,
            flags: &config.go_flags,
            bench_name: "NONE",
            test_name: &config.test_name,
            count: 1,
            profile: false,
        })?;
        if tests.failed() {
            let _ = writeln!(out, "Test failed for loop at line {line}");
            return Ok(Outcome::Discarded);
        }
    }
    let bench = run_go_test(&RunRequest {
        dir: work,
        flags: &config.go_flags,
        bench_name: &config.bench_name,
        test_name: "NONE",
        count: config.count,
        profile: true,
    })?;
    if bench.failed() {
        let _ = writeln!(out, "Benchmark failed for loop at line {line}");
        return Ok(Outcome::Discarded);
    }

    let new_profile = Profile::parse_file(&work.join(CPU_PROFILE))?;
    if new_profile.duration_nanos >= best_duration {
        let _ = writeln!(
            out,
            "Loop at line {line} gave a slowdown of {} over the previous",
            format_duration(new_profile.duration_nanos - best_duration)
        );
        return Ok(Outcome::Discarded);
    }
    let _ = writeln!(
        out,
        "Loop at line {line} is now concurrent with an improvement of {} over the previous",
        format_duration(best_duration - new_profile.duration_nanos)
    );
    let _ = writeln!(out, "Refactored: {line} ;");
    let saved_text = String::from_utf8_lossy(saved);
    Ok(Outcome::Kept {
        duration: new_profile.duration_nanos,
        delta: line_delta(&fix, &saved_text),
    })
}

/// Reparse the working copy, find the loop now at `line`, synthesize its
/// fix, and write the patched file. Returns the fix for line accounting,
/// or `None` when no loop starts at that line anymore.
fn try_one_candidate(
    config: &Config,
    work: &Path,
    rel: &str,
    line: u32,
) -> Result<Option<SuggestedFix>> {
    // Each attempt works on a freshly reparsed tree.
    let pkg = Package::load(work)?;
    let file = pkg.file_by_name(rel).ok_or_else(|| {
        // A temp-tree problem: ends this file, not the run.
        Error::io(
            work.join(rel),
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "file vanished from working copy",
            ),
        )
    })?;
    let loops = find_loops(&file.ast, &file.source);
    let Some(lp) = loops.iter().find(|l| l.start_line == line) else {
        return Ok(None);
    };

    let fix = synthesize_fix(&file.source, &file.ast, &file.oracle, lp, &config.barrier_stem)?;
    let (edits, _) = merge_with_survivors(std::slice::from_ref(&fix));
    let output = apply_edits(
        file.source.src.as_bytes(),
        &edits,
        file.ast.import_insert_offset(),
    );
    let path = work.join(rel);
    fs::write(&path, output).map_err(|e| Error::io(&path, e))?;
    Ok(Some(fix))
}

#[cfg(test)]
mod test {
    use super::*;
    use parloop_profile::{Node, NodeInfo};

    fn node(line: i64, cum: i64) -> Node {
        Node {
            info: NodeInfo {
                name: "main.f".to_owned(),
                file: "main.go".to_owned(),
                start_line: 1,
                lineno: line,
            },
            flat: cum,
            cum,
        }
    }

    #[test]
    fn candidate_ordering_and_threshold_pruning() {
        // Loops at lines 10 and 20, total runtime 100ms, threshold 10%:
        // only line 10 survives.
        let graph = Graph {
            nodes: vec![node(11, 30_000_000), node(21, 2_000_000)],
        };
        let infos = [
            LoopInfo {
                start_line: 10,
                end_line: 14,
                start_offset: 100,
                cumulative_time_ns: graph
                    .nodes_in_line_range(10, 14)
                    .iter()
                    .map(|n| n.cum)
                    .sum(),
            },
            LoopInfo {
                start_line: 20,
                end_line: 24,
                start_offset: 300,
                cumulative_time_ns: graph
                    .nodes_in_line_range(20, 24)
                    .iter()
                    .map(|n| n.cum)
                    .sum(),
            },
        ];
        assert_eq!(infos[0].cumulative_time_ns, 30_000_000);
        assert_eq!(infos[1].cumulative_time_ns, 2_000_000);

        let threshold = (100_000_000f64 / 100.0 * 10.0) as i64;
        assert_eq!(threshold, 10_000_000);
        assert!(infos[0].cumulative_time_ns >= threshold);
        assert!(infos[1].cumulative_time_ns < threshold);
        assert_eq!(
            format!(
                "Loop at line {} has a total Time of {}, which is less than the threshold of {}",
                infos[1].start_line,
                format_duration(infos[1].cumulative_time_ns),
                format_duration(threshold)
            ),
            "Loop at line 20 has a total Time of 2ms, which is less than the threshold of 10ms"
        );
    }

    #[test]
    fn tie_break_is_by_offset_after_time() {
        let mut infos = vec![
            LoopInfo {
                start_line: 30,
                end_line: 31,
                start_offset: 500,
                cumulative_time_ns: 5,
            },
            LoopInfo {
                start_line: 10,
                end_line: 11,
                start_offset: 100,
                cumulative_time_ns: 5,
            },
            LoopInfo {
                start_line: 20,
                end_line: 21,
                start_offset: 300,
                cumulative_time_ns: 9,
            },
        ];
        infos.sort_by_key(|info| (-info.cumulative_time_ns, info.start_offset));
        let lines: Vec<u32> = infos.iter().map(|i| i.start_line).collect();
        assert_eq!(lines, vec![20, 10, 30]);
    }
}
