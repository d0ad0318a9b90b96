//! Loop inventory: every `for` statement in a file, classic and range, with
//! its position information. Source order, nested loops included.

use crate::syntax::ast::*;
use crate::syntax::{SourceFile, Span};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoopKind {
    ForClassic,
    ForRange,
}

/// One iteration construct. Borrows the AST it was found in.
#[derive(Clone, Copy)]
pub struct Loop<'a> {
    pub kind: LoopKind,
    pub stmt: &'a ForStmt,
    /// Label directly attached to the loop, if any.
    pub label: Option<&'a Ident>,
    pub span: Span,
    pub body_span: Span,
    pub start_line: u32,
    pub end_line: u32,
}

impl<'a> Loop<'a> {
    pub fn start_offset(&self) -> u32 {
        self.span.start
    }

    pub fn end_offset(&self) -> u32 {
        self.span.end
    }
}

/// Collect every loop in the file, outermost first within a nest.
pub fn find_loops<'a>(ast: &'a File, source: &SourceFile) -> Vec<Loop<'a>> {
    let mut out = Vec::new();
    for decl in &ast.decls {
        if let Decl::Func(func) = decl {
            if let Some(body) = &func.body {
                walk_block(body, source, None, &mut out);
            }
        }
    }
    out.sort_by_key(|l| l.span.start);
    out
}

fn walk_block<'a>(
    block: &'a Block,
    source: &SourceFile,
    label: Option<&'a Ident>,
    out: &mut Vec<Loop<'a>>,
) {
    for stmt in &block.stmts {
        walk_stmt(stmt, source, label, out);
    }
}

fn walk_stmt<'a>(
    stmt: &'a Stmt,
    source: &SourceFile,
    pending_label: Option<&'a Ident>,
    out: &mut Vec<Loop<'a>>,
) {
    match &stmt.kind {
        StmtKind::For(for_stmt) => {
            let kind = match for_stmt.head {
                ForHead::Classic { .. } => LoopKind::ForClassic,
                ForHead::Range { .. } => LoopKind::ForRange,
            };
            out.push(Loop {
                kind,
                stmt: for_stmt,
                label: pending_label,
                span: for_stmt.span,
                body_span: for_stmt.body.span,
                start_line: source.line_of(for_stmt.span.start),
                end_line: source.line_of(for_stmt.span.end.saturating_sub(1)),
            });
            if let ForHead::Classic { init, post, .. } = &for_stmt.head {
                for clause in [init, post].into_iter().flatten() {
                    walk_stmt(clause, source, None, out);
                }
            }
            walk_block(&for_stmt.body, source, None, out);
        }
        StmtKind::Labeled { label, stmt } => walk_stmt(stmt, source, Some(label), out),
        StmtKind::Block(block) => walk_block(block, source, None, out),
        StmtKind::If { init, then, els, .. } => {
            if let Some(init) = init {
                walk_stmt(init, source, None, out);
            }
            walk_block(then, source, None, out);
            if let Some(els) = els {
                walk_stmt(els, source, None, out);
            }
        }
        StmtKind::Switch { init, cases, .. } | StmtKind::TypeSwitch { init, cases, .. } => {
            if let Some(init) = init {
                walk_stmt(init, source, None, out);
            }
            for case in cases {
                for stmt in &case.body {
                    walk_stmt(stmt, source, None, out);
                }
            }
        }
        StmtKind::Select { cases } => {
            for case in cases {
                if let Some(comm) = &case.comm {
                    walk_stmt(comm, source, None, out);
                }
                for stmt in &case.body {
                    walk_stmt(stmt, source, None, out);
                }
            }
        }
        StmtKind::Expr(expr)
        | StmtKind::IncDec { expr, .. }
        | StmtKind::Go(expr)
        | StmtKind::Defer(expr) => walk_expr(expr, source, out),
        StmtKind::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter().chain(rhs.iter()) {
                walk_expr(expr, source, out);
            }
        }
        StmtKind::Send { chan, value } => {
            walk_expr(chan, source, out);
            walk_expr(value, source, out);
        }
        StmtKind::Return(exprs) => {
            for expr in exprs {
                walk_expr(expr, source, out);
            }
        }
        StmtKind::Decl(decl) => {
            for spec in &decl.specs {
                if let Spec::Value { values, .. } = spec {
                    for value in values {
                        walk_expr(value, source, out);
                    }
                }
            }
        }
        StmtKind::Empty | StmtKind::Branch { .. } => {}
    }
}

/// Function literals can contain loops too.
fn walk_expr<'a>(expr: &'a Expr, source: &SourceFile, out: &mut Vec<Loop<'a>>) {
    match &expr.kind {
        ExprKind::FuncLit { body, .. } => walk_block(body, source, None, out),
        ExprKind::Paren(inner) | ExprKind::Star(inner) => walk_expr(inner, source, out),
        ExprKind::Unary { operand, .. } => walk_expr(operand, source, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, source, out);
            walk_expr(rhs, source, out);
        }
        ExprKind::Call { fun, args, .. } => {
            walk_expr(fun, source, out);
            for arg in args {
                walk_expr(arg, source, out);
            }
        }
        ExprKind::Selector { base, .. } => walk_expr(base, source, out),
        ExprKind::Index { base, index } => {
            walk_expr(base, source, out);
            walk_expr(index, source, out);
        }
        ExprKind::Slice {
            base,
            low,
            high,
            max,
        } => {
            walk_expr(base, source, out);
            for part in [low, high, max].into_iter().flatten() {
                walk_expr(part, source, out);
            }
        }
        ExprKind::CompositeLit { elems, .. } => {
            for elem in elems {
                walk_expr(elem, source, out);
            }
        }
        ExprKind::KeyValue { key, value } => {
            walk_expr(key, source, out);
            walk_expr(value, source, out);
        }
        ExprKind::TypeAssert { base, .. } => walk_expr(base, source, out),
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::syntax::{parse_file, SourceFile};

    fn loops_in(src: &str) -> Vec<(LoopKind, u32, u32)> {
        let source = SourceFile::new("test.go", src);
        let ast = parse_file(&source).unwrap();
        // The AST must outlive the loops; collect into owned tuples.
        find_loops(&ast, &source)
            .iter()
            .map(|l| (l.kind, l.start_line, l.end_line))
            .collect()
    }

    #[test]
    fn finds_nested_loops_in_order() {
        let found = loops_in(
            "package main\n\nfunc f(xs []int) {\n\tfor i := 0; i < 10; i++ {\n\t\tfor _, v := range xs {\n\t\t\tprintln(i, v)\n\t\t}\n\t}\n}\n",
        );
        assert_eq!(
            found,
            vec![(LoopKind::ForClassic, 4, 8), (LoopKind::ForRange, 5, 7)]
        );
    }

    #[test]
    fn finds_loops_inside_goroutine_literals() {
        let found = loops_in(
            "package main\n\nfunc f() {\n\tgo func() {\n\t\tfor {\n\t\t}\n\t}()\n}\n",
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, LoopKind::ForClassic);
    }

    #[test]
    fn loop_offsets_are_well_formed() {
        let source = SourceFile::new(
            "test.go",
            "package main\n\nfunc f() {\n\tfor i := 0; i < 3; i++ {\n\t\tprintln(i)\n\t}\n}\n",
        );
        let ast = parse_file(&source).unwrap();
        let loops = find_loops(&ast, &source);
        assert_eq!(loops.len(), 1);
        let l = &loops[0];
        assert!(l.start_offset() < l.end_offset());
        assert!(l.body_span.start > l.span.start);
        assert!(l.body_span.end <= l.span.end);
        assert_eq!(&source.src[l.span.start as usize..l.span.start as usize + 3], "for");
    }

    #[test]
    fn labeled_loop_keeps_its_label() {
        let source = SourceFile::new(
            "test.go",
            "package main\n\nfunc f() {\nouter:\n\tfor {\n\t\tbreak outer\n\t}\n}\n",
        );
        let ast = parse_file(&source).unwrap();
        let loops = find_loops(&ast, &source);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].label.map(|l| l.name.as_str()), Some("outer"));
    }
}
