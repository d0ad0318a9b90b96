//! Rewrite synthesis: turning one permitted loop into its fork-join form.
//!
//! The strategy is byte-range edits against the original source buffer, not
//! AST mutation. Each permitted loop yields one suggested fix of three
//! positioned edits plus a pagewide import edit:
//!
//! 1. insert `var <wg> sync.WaitGroup` on the line before the loop;
//! 2. replace the loop body with a barrier increment and a goroutine that
//!    defers the decrement and runs the original statements, iteration
//!    variables passed by value;
//! 3. insert `<wg>.Wait()` after the loop;
//! 4. (pagewide) add the `"sync"` import unless one exists.
//!
//! A fix is atomic: the merger applies all of its edits or none of them
//! ([`merge`]). `continue` statements that targeted the rewritten loop
//! become `return`s of the goroutine; inner loops keep theirs.

use rand::Rng;

use crate::loops::{Loop, LoopKind};
use crate::syntax::ast::*;
use crate::syntax::{SourceFile, Span};
use crate::types::TypeOracle;
use crate::{Error, Result};

mod merge;

pub use merge::{apply_edits, merge_fixes, merge_with_survivors};

/// A byte-range replacement. `start == end == None` marks a pagewide edit:
/// an insertion at the file's import position, never overlapping anything
/// textually.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TextEdit {
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub text: Vec<u8>,
}

impl TextEdit {
    pub fn replace(span: Span, text: impl Into<Vec<u8>>) -> TextEdit {
        TextEdit {
            start: Some(span.start),
            end: Some(span.end),
            text: text.into(),
        }
    }

    pub fn insert(offset: u32, text: impl Into<Vec<u8>>) -> TextEdit {
        TextEdit {
            start: Some(offset),
            end: Some(offset),
            text: text.into(),
        }
    }

    pub fn pagewide(text: impl Into<Vec<u8>>) -> TextEdit {
        TextEdit {
            start: None,
            end: None,
            text: text.into(),
        }
    }

    pub fn is_pagewide(&self) -> bool {
        self.start.is_none()
    }

    /// Sort key; pagewide edits order before every real offset.
    pub fn sort_key(&self) -> i64 {
        self.start.map(i64::from).unwrap_or(-1)
    }

    /// Textual overlap of two non-pagewide edits: proper intersection of
    /// their half-open ranges. Pure insertions at a boundary do not clash.
    pub fn overlaps(&self, other: &TextEdit) -> bool {
        match (self.start, self.end, other.start, other.end) {
            (Some(a0), Some(a1), Some(b0), Some(b1)) => a0.max(b0) < a1.min(b1),
            _ => false,
        }
    }
}

/// An atomic bundle of edits implementing one semantic change.
#[derive(Clone, Debug)]
pub struct SuggestedFix {
    pub message: String,
    pub edits: Vec<TextEdit>,
}

/// Synthesize the fork-join fix for a permitted loop, with a fresh barrier
/// name drawn from `stem` plus a four-digit suffix.
pub fn synthesize_fix(
    source: &SourceFile,
    ast: &File,
    oracle: &TypeOracle,
    lp: &Loop,
    stem: &str,
) -> Result<SuggestedFix> {
    let suffix = rand::thread_rng().gen_range(0..10_000);
    let name = format!("{stem}{suffix:04}");
    synthesize_named(source, ast, oracle, lp, &name)
}

/// The deterministic core of [`synthesize_fix`]; tests pin the name.
pub fn synthesize_named(
    source: &SourceFile,
    ast: &File,
    oracle: &TypeOracle,
    lp: &Loop,
    barrier: &str,
) -> Result<SuggestedFix> {
    let captures = captured_values(source, oracle, lp)?;
    let params = captures
        .iter()
        .map(|c| format!("{} {}", c.name, c.ty))
        .collect::<Vec<_>>()
        .join(", ");
    let args = captures
        .iter()
        .map(|c| c.name.clone())
        .collect::<Vec<_>>()
        .join(", ");

    let indent = source.indent_at(lp.span.start);
    let inner = format!("{indent}\t");
    let deep = format!("{indent}\t\t");

    let stmts = body_statements_text(source, lp);
    let mut body = String::new();
    body.push('{');
    body.push('\n');
    body.push_str(&inner);
    body.push_str(barrier);
    body.push_str(".Add(1)\n");
    body.push_str(&inner);
    body.push_str(&format!("go func({params}) {{\n"));
    body.push_str(&deep);
    body.push_str(&format!("defer {barrier}.Done()"));
    if !stmts.is_empty() {
        body.push('\n');
        body.push_str(&deep);
        body.push_str(&stmts);
    }
    body.push('\n');
    body.push_str(&inner);
    body.push_str(&format!("}}({args})\n"));
    body.push_str(indent);
    body.push('}');

    let mut edits = vec![
        TextEdit::insert(
            lp.span.start,
            format!("var {barrier} sync.WaitGroup\n{indent}"),
        ),
        TextEdit::replace(lp.body_span, body),
        TextEdit::insert(lp.span.end, format!("\n{indent}{barrier}.Wait()")),
    ];
    if let Some(import) = sync_import_edit(ast) {
        edits.push(import);
    }

    let pos = source.position(lp.span.start);
    Ok(SuggestedFix {
        message: format!("make loop at line {} concurrent", pos.line),
        edits,
    })
}

/// How many lines an accepted fix adds net of what it replaces, for
/// adjusting the recorded positions of later candidates in the working
/// list.
pub fn line_delta(fix: &SuggestedFix, src: &str) -> u32 {
    let newlines = |bytes: &[u8]| bytes.iter().filter(|&&b| b == b'\n').count() as i64;
    let mut net: i64 = 0;
    for edit in &fix.edits {
        let (Some(start), Some(end)) = (edit.start, edit.end) else {
            continue;
        };
        net += newlines(&edit.text) - newlines(&src.as_bytes()[start as usize..end as usize]);
    }
    net.max(0) as u32
}

struct Capture {
    name: String,
    ty: String,
}

/// The iteration-private values the goroutine receives by value, with their
/// printable types.
fn captured_values(source: &SourceFile, oracle: &TypeOracle, lp: &Loop) -> Result<Vec<Capture>> {
    let line = source.line_of(lp.span.start);
    let missing = |what: &str| Error::Rewrite {
        line,
        message: format!("no type available for {what}"),
    };

    match (&lp.kind, &lp.stmt.head) {
        (LoopKind::ForClassic, ForHead::Classic { init, .. }) => {
            let Some(init) = init else {
                return Ok(Vec::new());
            };
            let StmtKind::Assign { lhs, rhs, .. } = &init.kind else {
                return Ok(Vec::new());
            };
            // Every declared variable is typed from the right-most operand
            // of the init's right-hand side.
            let last = rhs.last().ok_or_else(|| missing("the loop init"))?;
            let ty = oracle
                .of_expr(last)
                .ok_or_else(|| missing("the loop init"))?;
            let ty = trim_type_path(&ty.to_string());
            Ok(lhs
                .iter()
                .filter_map(|e| e.as_ident())
                .filter(|i| !i.is_blank())
                .map(|i| Capture {
                    name: i.name.clone(),
                    ty: ty.clone(),
                })
                .collect())
        }
        (LoopKind::ForRange, ForHead::Range { key, value, .. }) => {
            let mut out = Vec::new();
            for (target, what) in [(key, "the range key"), (value, "the range value")] {
                let Some(expr) = target else { continue };
                let Some(ident) = expr.as_ident() else {
                    continue;
                };
                if ident.is_blank() {
                    continue;
                }
                let ty = oracle.of_expr(expr).ok_or_else(|| missing(what))?;
                out.push(Capture {
                    name: ident.name.clone(),
                    ty: trim_type_path(&ty.to_string()),
                });
            }
            Ok(out)
        }
        _ => Ok(Vec::new()),
    }
}

/// Printed type names keep only the final package-qualified suffix:
/// `example.com/img/color.RGBA` prints as `color.RGBA`. Generic argument
/// lists ride along untouched.
pub fn trim_type_path(name: &str) -> String {
    match name.rsplit_once('/') {
        Some((_, suffix)) => suffix.to_owned(),
        None => name.to_owned(),
    }
}

/// Source text of the loop body's statements, with every `continue` that
/// targets this loop rewritten to `return`, and one level of indentation
/// added so the statements sit inside the goroutine.
fn body_statements_text(source: &SourceFile, lp: &Loop) -> String {
    let stmts = &lp.stmt.body.stmts;
    let (first, last) = match (stmts.first(), stmts.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return String::new(),
    };
    let span = Span::new(first.span.start, last.span.end);
    let mut text = source.text(span).to_owned();

    // Splice continues back to front so earlier offsets stay valid.
    let mut continues = Vec::new();
    for stmt in stmts {
        collect_loop_continues(stmt, lp.label.map(|l| l.name.as_str()), &mut continues);
    }
    continues.sort_by_key(|s| s.start);
    for c in continues.iter().rev() {
        let start = (c.start - span.start) as usize;
        let end = (c.end - span.start) as usize;
        text.replace_range(start..end, "return");
    }

    // One extra tab per line; skipped when a raw string literal could span
    // lines and absorb the padding.
    if !text.contains('`') {
        text = text.replace('\n', "\n\t");
    }
    text
}

/// Spans of `continue` statements that target the loop being rewritten:
/// unlabeled ones outside any nested loop, and labeled ones naming the
/// loop's own label at any depth.
fn collect_loop_continues(stmt: &Stmt, loop_label: Option<&str>, out: &mut Vec<Span>) {
    match &stmt.kind {
        StmtKind::Branch {
            kind: BranchKind::Continue,
            label,
        } => match (label, loop_label) {
            (None, _) => out.push(stmt.span),
            (Some(label), Some(own)) if label.name == own => out.push(stmt.span),
            _ => {}
        },
        // A nested loop owns its unlabeled continues.
        StmtKind::For(for_stmt) => {
            if let Some(own) = loop_label {
                for inner in &for_stmt.body.stmts {
                    collect_labeled_continues(inner, own, out);
                }
            }
        }
        StmtKind::Labeled { stmt, .. } => collect_loop_continues(stmt, loop_label, out),
        StmtKind::Block(block) => {
            for stmt in &block.stmts {
                collect_loop_continues(stmt, loop_label, out);
            }
        }
        StmtKind::If { then, els, .. } => {
            for stmt in &then.stmts {
                collect_loop_continues(stmt, loop_label, out);
            }
            if let Some(els) = els {
                collect_loop_continues(els, loop_label, out);
            }
        }
        StmtKind::Switch { cases, .. } | StmtKind::TypeSwitch { cases, .. } => {
            for case in cases {
                for stmt in &case.body {
                    collect_loop_continues(stmt, loop_label, out);
                }
            }
        }
        StmtKind::Select { cases } => {
            for case in cases {
                for stmt in &case.body {
                    collect_loop_continues(stmt, loop_label, out);
                }
            }
        }
        _ => {}
    }
}

/// Inside nested loops only labeled continues can still target the outer
/// loop.
fn collect_labeled_continues(stmt: &Stmt, own: &str, out: &mut Vec<Span>) {
    match &stmt.kind {
        StmtKind::Branch {
            kind: BranchKind::Continue,
            label: Some(label),
        } if label.name == own => out.push(stmt.span),
        StmtKind::For(for_stmt) => {
            for stmt in &for_stmt.body.stmts {
                collect_labeled_continues(stmt, own, out);
            }
        }
        StmtKind::Labeled { stmt, .. } => collect_labeled_continues(stmt, own, out),
        StmtKind::Block(block) => {
            for stmt in &block.stmts {
                collect_labeled_continues(stmt, own, out);
            }
        }
        StmtKind::If { then, els, .. } => {
            for stmt in &then.stmts {
                collect_labeled_continues(stmt, own, out);
            }
            if let Some(els) = els {
                collect_labeled_continues(els, own, out);
            }
        }
        StmtKind::Switch { cases, .. } | StmtKind::TypeSwitch { cases, .. } => {
            for case in cases {
                for stmt in &case.body {
                    collect_labeled_continues(stmt, own, out);
                }
            }
        }
        StmtKind::Select { cases } => {
            for case in cases {
                for stmt in &case.body {
                    collect_labeled_continues(stmt, own, out);
                }
            }
        }
        _ => {}
    }
}

/// The pagewide `"sync"` import edit, or `None` when the file already has
/// one. The text depends on the import shape so the injected bytes stay
/// syntactically valid in place.
pub fn sync_import_edit(ast: &File) -> Option<TextEdit> {
    if ast.imports_path("sync") {
        return None;
    }
    let text = match ast.imports.last() {
        Some(spec) if spec.factored => "\n\t\"sync\"".to_owned(),
        Some(_) => "\nimport \"sync\"".to_owned(),
        None => "\n\nimport \"sync\"".to_owned(),
    };
    Some(TextEdit::pagewide(text))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::loops::find_loops;
    use crate::package::import_map;
    use crate::resolve::{collect_package_scope, resolve_file, universe_scope, SymbolTable};
    use crate::syntax::{parse_file, SourceFile};
    use crate::types::check_file;

    fn load(src: &str) -> (SourceFile, File, TypeOracle) {
        let source = SourceFile::new("test.go", src);
        let ast = parse_file(&source).unwrap();
        let mut table = SymbolTable::default();
        let universe = universe_scope(&mut table);
        let package = collect_package_scope(std::slice::from_ref(&ast), &mut table);
        let mut bindings = resolve_file(&ast, &mut table, &universe, &package);
        let imports = import_map(&ast);
        let oracle = check_file(&ast, &table, &mut bindings, &imports);
        (source, ast, oracle)
    }

    const S1: &str = "package main\n\nfunc f() {\n\tvar arr [10]int\n\tfor i := 0; i < 10; i++ {\n\t\tarr[i] = i\n\t}\n}\n";

    #[test]
    fn classic_loop_rewrites_to_fork_join() {
        let (source, ast, oracle) = load(S1);
        let loops = find_loops(&ast, &source);
        let fix = synthesize_named(&source, &ast, &oracle, &loops[0], "wg0001").unwrap();
        assert_eq!(fix.edits.len(), 4);
        let merged = merge_fixes(std::slice::from_ref(&fix));
        let out = apply_edits(
            source.src.as_bytes(),
            &merged,
            ast.import_insert_offset(),
        );
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("var wg0001 sync.WaitGroup"));
        assert!(out.contains("wg0001.Add(1)"));
        assert!(out.contains("go func(i int) {"));
        assert!(out.contains("defer wg0001.Done()"));
        assert!(out.contains("arr[i] = i"));
        assert!(out.contains("}(i)"));
        assert!(out.contains("wg0001.Wait()"));
        assert!(out.contains("import \"sync\""));
        // The rewritten file must still parse.
        let reparsed = parse_file(&SourceFile::new("out.go", out));
        assert!(reparsed.is_ok());
    }

    #[test]
    fn range_loop_captures_key_and_value_with_types() {
        let src = "package main\n\nfunc f(xs []string, out []int) {\n\tfor i, s := range xs {\n\t\tout[i] = len(s)\n\t}\n}\n";
        let (source, ast, oracle) = load(src);
        let loops = find_loops(&ast, &source);
        let fix = synthesize_named(&source, &ast, &oracle, &loops[0], "wg0002").unwrap();
        let text = String::from_utf8(fix.edits[1].text.clone()).unwrap();
        assert!(text.contains("go func(i int, s string) {"));
        assert!(text.contains("}(i, s)"));
    }

    #[test]
    fn own_continue_becomes_return_inner_loop_untouched() {
        let src = "package main\n\nfunc f(out []int) {\n\tfor i := 0; i < 4; i++ {\n\t\tif i == 2 {\n\t\t\tcontinue\n\t\t}\n\t\tfor j := 0; j < 4; j++ {\n\t\t\tif j == 1 {\n\t\t\t\tcontinue\n\t\t\t}\n\t\t\tout[i] = i + j\n\t\t}\n\t}\n}\n";
        let (source, ast, oracle) = load(src);
        let loops = find_loops(&ast, &source);
        let fix = synthesize_named(&source, &ast, &oracle, &loops[0], "wg0003").unwrap();
        let text = String::from_utf8(fix.edits[1].text.clone()).unwrap();
        // The outer continue is gone; the inner one survives.
        assert_eq!(text.matches("continue").count(), 1);
        assert_eq!(text.matches("return").count(), 1);
    }

    #[test]
    fn existing_sync_import_is_not_duplicated() {
        let src = "package main\n\nimport (\n\t\"sync\"\n)\n\nfunc f() {\n\tvar mu sync.Mutex\n\t_ = mu\n}\n";
        let (_, ast, _) = load(src);
        assert!(sync_import_edit(&ast).is_none());
    }

    #[test]
    fn type_path_trimming() {
        assert_eq!(trim_type_path("int"), "int");
        assert_eq!(trim_type_path("color.RGBA"), "color.RGBA");
        assert_eq!(trim_type_path("example.com/img/color.RGBA"), "color.RGBA");
        assert_eq!(trim_type_path("a.b/c.List[int]"), "c.List[int]");
    }

    #[test]
    fn line_delta_counts_inserted_lines() {
        let (source, ast, oracle) = load(S1);
        let loops = find_loops(&ast, &source);
        let fix = synthesize_named(&source, &ast, &oracle, &loops[0], "wg0004").unwrap();
        // decl (1) + Add/go/defer/closer (4) + wait (1).
        assert_eq!(line_delta(&fix, &source.src), 6);
    }
}
