//! Control-flow pass (rules R003, R004, R005): a single walk over the loop
//! body carrying an explicit stack of scope tags, pushed on entry and popped
//! on exit. A statement is an escape when the stack between it and the loop
//! root lacks the construct that would absorb it.

use rustc_hash::FxHashSet;

use crate::loops::Loop;
use crate::syntax::ast::*;

use super::{Rejection, RuleId};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ScopeTag {
    For,
    Range,
    Switch,
    TypeSwitch,
    Select,
    Func,
    Block,
    Case,
    CommClause,
    Label,
    If,
}

pub(super) fn check(lp: &Loop, out: &mut Vec<Rejection>) {
    // Labels declared anywhere inside the body (function literals included)
    // are legitimate targets; anything else escapes.
    let mut labels = FxHashSet::default();
    collect_labels_block(&lp.stmt.body, &mut labels);

    let mut walker = Walker {
        labels,
        stack: Vec::new(),
        out,
    };
    for stmt in &lp.stmt.body.stmts {
        walker.stmt(stmt);
    }
}

fn collect_labels_block(block: &Block, out: &mut FxHashSet<String>) {
    for stmt in &block.stmts {
        collect_labels_stmt(stmt, out);
    }
}

fn collect_labels_stmt(stmt: &Stmt, out: &mut FxHashSet<String>) {
    match &stmt.kind {
        StmtKind::Labeled { label, stmt } => {
            out.insert(label.name.clone());
            collect_labels_stmt(stmt, out);
        }
        StmtKind::Block(block) => collect_labels_block(block, out),
        StmtKind::If { then, els, .. } => {
            collect_labels_block(then, out);
            if let Some(els) = els {
                collect_labels_stmt(els, out);
            }
        }
        StmtKind::For(for_stmt) => collect_labels_block(&for_stmt.body, out),
        StmtKind::Switch { cases, .. } | StmtKind::TypeSwitch { cases, .. } => {
            for case in cases {
                for stmt in &case.body {
                    collect_labels_stmt(stmt, out);
                }
            }
        }
        StmtKind::Select { cases } => {
            for case in cases {
                for stmt in &case.body {
                    collect_labels_stmt(stmt, out);
                }
            }
        }
        StmtKind::Expr(expr)
        | StmtKind::Go(expr)
        | StmtKind::Defer(expr)
        | StmtKind::IncDec { expr, .. } => collect_labels_expr(expr, out),
        StmtKind::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter().chain(rhs.iter()) {
                collect_labels_expr(expr, out);
            }
        }
        _ => {}
    }
}

fn collect_labels_expr(expr: &Expr, out: &mut FxHashSet<String>) {
    match &expr.kind {
        ExprKind::FuncLit { body, .. } => collect_labels_block(body, out),
        ExprKind::Paren(inner) | ExprKind::Star(inner) => collect_labels_expr(inner, out),
        ExprKind::Unary { operand, .. } => collect_labels_expr(operand, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_labels_expr(lhs, out);
            collect_labels_expr(rhs, out);
        }
        ExprKind::Call { fun, args, .. } => {
            collect_labels_expr(fun, out);
            for arg in args {
                collect_labels_expr(arg, out);
            }
        }
        _ => {}
    }
}

struct Walker<'b> {
    labels: FxHashSet<String>,
    stack: Vec<ScopeTag>,
    out: &'b mut Vec<Rejection>,
}

impl Walker<'_> {
    fn in_scope(&self, tags: &[ScopeTag]) -> bool {
        self.stack.iter().any(|tag| tags.contains(tag))
    }

    fn scoped(&mut self, tag: ScopeTag, f: impl FnOnce(&mut Self)) {
        self.stack.push(tag);
        f(self);
        self.stack.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Return(exprs) => {
                if !self.in_scope(&[ScopeTag::Func]) {
                    self.out.push(Rejection::new(
                        RuleId::R003,
                        "contains a return statement outside a function",
                    ));
                }
                for expr in exprs {
                    self.expr(expr);
                }
            }
            StmtKind::Branch { kind, label } => self.branch(*kind, label.as_ref()),
            StmtKind::Labeled { stmt, .. } => {
                self.scoped(ScopeTag::Label, |w| w.stmt(stmt));
            }
            StmtKind::Block(block) => {
                self.scoped(ScopeTag::Block, |w| {
                    for stmt in &block.stmts {
                        w.stmt(stmt);
                    }
                });
            }
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                self.scoped(ScopeTag::If, |w| {
                    if let Some(init) = init {
                        w.stmt(init);
                    }
                    w.expr(cond);
                    for stmt in &then.stmts {
                        w.stmt(stmt);
                    }
                    if let Some(els) = els {
                        w.stmt(els);
                    }
                });
            }
            StmtKind::For(for_stmt) => {
                let tag = match for_stmt.head {
                    ForHead::Classic { .. } => ScopeTag::For,
                    ForHead::Range { .. } => ScopeTag::Range,
                };
                self.scoped(tag, |w| {
                    if let ForHead::Classic { init, cond, post } = &for_stmt.head {
                        if let Some(init) = init {
                            w.stmt(init);
                        }
                        if let Some(cond) = cond {
                            w.expr(cond);
                        }
                        if let Some(post) = post {
                            w.stmt(post);
                        }
                    } else if let ForHead::Range { iterable, .. } = &for_stmt.head {
                        w.expr(iterable);
                    }
                    for stmt in &for_stmt.body.stmts {
                        w.stmt(stmt);
                    }
                });
            }
            StmtKind::Switch { init, tag, cases } => {
                self.scoped(ScopeTag::Switch, |w| {
                    if let Some(init) = init {
                        w.stmt(init);
                    }
                    if let Some(tag) = tag {
                        w.expr(tag);
                    }
                    for case in cases {
                        w.scoped(ScopeTag::Case, |w| {
                            for stmt in &case.body {
                                w.stmt(stmt);
                            }
                        });
                    }
                });
            }
            StmtKind::TypeSwitch {
                init,
                subject,
                cases,
                ..
            } => {
                self.scoped(ScopeTag::TypeSwitch, |w| {
                    if let Some(init) = init {
                        w.stmt(init);
                    }
                    w.expr(subject);
                    for case in cases {
                        w.scoped(ScopeTag::Case, |w| {
                            for stmt in &case.body {
                                w.stmt(stmt);
                            }
                        });
                    }
                });
            }
            StmtKind::Select { cases } => {
                self.scoped(ScopeTag::Select, |w| {
                    for case in cases {
                        w.scoped(ScopeTag::CommClause, |w| {
                            if let Some(comm) = &case.comm {
                                w.stmt(comm);
                            }
                            for stmt in &case.body {
                                w.stmt(stmt);
                            }
                        });
                    }
                });
            }
            StmtKind::Expr(expr)
            | StmtKind::IncDec { expr, .. }
            | StmtKind::Go(expr)
            | StmtKind::Defer(expr) => self.expr(expr),
            StmtKind::Assign { lhs, rhs, .. } => {
                for expr in lhs.iter().chain(rhs.iter()) {
                    self.expr(expr);
                }
            }
            StmtKind::Send { chan, value } => {
                self.expr(chan);
                self.expr(value);
            }
            StmtKind::Decl(decl) => {
                for spec in &decl.specs {
                    if let Spec::Value { values, .. } = spec {
                        for value in values {
                            self.expr(value);
                        }
                    }
                }
            }
            StmtKind::Empty => {}
        }
    }

    fn branch(&mut self, kind: BranchKind, label: Option<&Ident>) {
        if let Some(label) = label {
            if !self.labels.contains(&label.name) {
                // The target lives outside the loop; following it abandons
                // the spawned iteration mid-flight.
                let (rule, message) = match kind {
                    BranchKind::Break => (
                        RuleId::R005,
                        "contains a break statement trying to break the outer loop",
                    ),
                    BranchKind::Continue => (
                        RuleId::R004,
                        "contains a continue statement targeting a label outside the loop",
                    ),
                    _ => (
                        RuleId::R004,
                        "contains a goto statement to a label outside the loop",
                    ),
                };
                self.out.push(Rejection::new(rule, message));
                return;
            }
        }
        if kind == BranchKind::Break && label.is_none() {
            let absorbing = [
                ScopeTag::For,
                ScopeTag::Range,
                ScopeTag::Switch,
                ScopeTag::TypeSwitch,
                ScopeTag::Select,
            ];
            if !self.in_scope(&absorbing) {
                self.out.push(Rejection::new(
                    RuleId::R005,
                    "contains a break statement trying to break the outer loop",
                ));
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::FuncLit { body, .. } => {
                // Returns and breaks inside a literal target the literal.
                self.scoped(ScopeTag::Func, |w| {
                    for stmt in &body.stmts {
                        w.stmt(stmt);
                    }
                });
            }
            ExprKind::Paren(inner) | ExprKind::Star(inner) => self.expr(inner),
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Call { fun, args, .. } => {
                self.expr(fun);
                for arg in args {
                    self.expr(arg);
                }
            }
            ExprKind::Index { base, index } => {
                self.expr(base);
                self.expr(index);
            }
            ExprKind::Selector { base, .. } => self.expr(base),
            ExprKind::Slice {
                base,
                low,
                high,
                max,
            } => {
                self.expr(base);
                for part in [low, high, max].into_iter().flatten() {
                    self.expr(part);
                }
            }
            ExprKind::CompositeLit { elems, .. } => {
                for elem in elems {
                    self.expr(elem);
                }
            }
            ExprKind::KeyValue { key, value } => {
                self.expr(key);
                self.expr(value);
            }
            ExprKind::TypeAssert { base, .. } => self.expr(base),
            _ => {}
        }
    }
}
