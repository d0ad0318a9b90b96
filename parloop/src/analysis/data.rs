//! Data pass (rules R002, R006–R013): assignments, index expressions, and
//! method calls. No scope stack; the only nesting the pass tracks is whether
//! it is inside a function literal, whose body is a new scope and therefore
//! opaque to the write-policy rules (R006–R012). The read/write maps of
//! R002 and the receiver rule R013 do look inside literals, since a spawned
//! iteration runs them too.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::loops::Loop;
use crate::resolve::{SymbolId, SymbolKind};
use crate::syntax::ast::*;

use super::{AnalysisContext, Rejection, RuleId};

pub(super) fn check(
    cx: &AnalysisContext,
    lp: &Loop,
    loop_vars: &FxHashSet<SymbolId>,
    out: &mut Vec<Rejection>,
) {
    let mut pass = DataPass {
        cx,
        lp,
        loop_vars,
        writes: IndexMap::new(),
        reads: IndexMap::new(),
        unhandled: false,
        out,
    };
    for stmt in &lp.stmt.body.stmts {
        pass.stmt(stmt, 0);
    }

    // Arrays read and written under the same symbol make iterations order-
    // dependent. Insertion order keeps the report deterministic.
    let rejections: Vec<Rejection> = pass
        .writes
        .iter()
        .filter(|(sym, _)| pass.reads.contains_key(*sym))
        .map(|(_, name)| {
            Rejection::about(
                RuleId::R002,
                name.clone(),
                format!("reads from and writes to the same array '{name}'"),
            )
        })
        .collect();
    pass.out.extend(rejections);
}

struct DataPass<'a, 'b> {
    cx: &'a AnalysisContext<'a>,
    lp: &'a Loop<'a>,
    loop_vars: &'a FxHashSet<SymbolId>,
    /// Base symbols of indexed writes / indexed reads, with a display name,
    /// in discovery order.
    writes: IndexMap<SymbolId, String>,
    reads: IndexMap<SymbolId, String>,
    /// One unhandled-expression rejection per loop is enough.
    unhandled: bool,
    out: &'b mut Vec<Rejection>,
}

impl DataPass<'_, '_> {
    fn stmt(&mut self, stmt: &Stmt, func_depth: u32) {
        match &stmt.kind {
            StmtKind::Assign { lhs, rhs, .. } => {
                if func_depth == 0 {
                    for target in lhs {
                        self.lhs_policy(target);
                    }
                }
                self.index_map_side(lhs, true);
                self.index_map_side(rhs, false);
                for expr in lhs.iter().chain(rhs.iter()) {
                    self.expr(expr, func_depth);
                }
            }
            StmtKind::IncDec { expr, .. } => {
                // `x++` writes x exactly like `x = x + 1` does.
                if func_depth == 0 {
                    self.lhs_policy(expr);
                }
                self.index_map_side(std::slice::from_ref(expr), true);
                self.expr(expr, func_depth);
            }
            StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => {
                self.expr(expr, func_depth)
            }
            StmtKind::Send { chan, value } => {
                self.expr(chan, func_depth);
                self.expr(value, func_depth);
            }
            StmtKind::Return(exprs) => {
                for expr in exprs {
                    self.expr(expr, func_depth);
                }
            }
            StmtKind::Labeled { stmt, .. } => self.stmt(stmt, func_depth),
            StmtKind::Block(block) => {
                for stmt in &block.stmts {
                    self.stmt(stmt, func_depth);
                }
            }
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                if let Some(init) = init {
                    self.stmt(init, func_depth);
                }
                self.expr(cond, func_depth);
                for stmt in &then.stmts {
                    self.stmt(stmt, func_depth);
                }
                if let Some(els) = els {
                    self.stmt(els, func_depth);
                }
            }
            StmtKind::For(for_stmt) => {
                if let ForHead::Classic { init, cond, post } = &for_stmt.head {
                    for clause in [init, post].into_iter().flatten() {
                        self.stmt(clause, func_depth);
                    }
                    if let Some(cond) = cond {
                        self.expr(cond, func_depth);
                    }
                } else if let ForHead::Range { iterable, .. } = &for_stmt.head {
                    self.expr(iterable, func_depth);
                }
                for stmt in &for_stmt.body.stmts {
                    self.stmt(stmt, func_depth);
                }
            }
            StmtKind::Switch { init, tag, cases } => {
                if let Some(init) = init {
                    self.stmt(init, func_depth);
                }
                if let Some(tag) = tag {
                    self.expr(tag, func_depth);
                }
                for case in cases {
                    for expr in &case.exprs {
                        self.expr(expr, func_depth);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt, func_depth);
                    }
                }
            }
            StmtKind::TypeSwitch {
                init,
                subject,
                cases,
                ..
            } => {
                if let Some(init) = init {
                    self.stmt(init, func_depth);
                }
                self.expr(subject, func_depth);
                for case in cases {
                    for stmt in &case.body {
                        self.stmt(stmt, func_depth);
                    }
                }
            }
            StmtKind::Select { cases } => {
                for case in cases {
                    if let Some(comm) = &case.comm {
                        self.stmt(comm, func_depth);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt, func_depth);
                    }
                }
            }
            StmtKind::Decl(decl) => {
                for spec in &decl.specs {
                    if let Spec::Value { values, .. } = spec {
                        for value in values {
                            self.expr(value, func_depth);
                        }
                    }
                }
            }
            StmtKind::Empty | StmtKind::Branch { .. } => {}
        }
    }

    /// R006–R012: what a single assignment target may look like.
    fn lhs_policy(&mut self, target: &Expr) {
        let target = target.unparen();
        match &target.kind {
            ExprKind::Index { .. } => self.index_write_policy(target),
            ExprKind::Ident(ident) => {
                if ident.is_blank() {
                    return;
                }
                let sym = match self.cx.bindings.of_ident(ident) {
                    Some(sym) => sym,
                    None => {
                        self.out.push(Rejection::about(
                            RuleId::R012,
                            ident.name.clone(),
                            format!("writes to '{}' declared outside the loop", ident.name),
                        ));
                        return;
                    }
                };
                if self.loop_vars.contains(&sym) {
                    self.out
                        .push(Rejection::new(RuleId::R011, "writes to the loop variable"));
                    return;
                }
                let decl = self.cx.symbols.get(sym).decl_span;
                if !self.lp.span.contains(decl.start) {
                    self.out.push(Rejection::about(
                        RuleId::R012,
                        ident.name.clone(),
                        format!("writes to '{}' declared outside the loop", ident.name),
                    ));
                }
            }
            // Selectors on outer values, pointer stores, and anything more
            // exotic share one verdict: the write may alias state the loop
            // does not own.
            _ => {
                self.out.push(Rejection::new(
                    RuleId::R012,
                    "writes to an unsupported expression",
                ));
            }
        }
    }

    /// R006–R009 for one `a[i] = ...` target.
    fn index_write_policy(&mut self, target: &Expr) {
        // Peel nested index expressions down to the head.
        let mut base = target;
        let mut index_exprs: Vec<&Expr> = Vec::new();
        loop {
            match &base.unparen().kind {
                ExprKind::Index { base: inner, index } => {
                    index_exprs.push(index);
                    base = inner;
                }
                _ => break,
            }
        }
        let base = base.unparen();

        let ident = match &base.kind {
            ExprKind::Ident(ident) => ident,
            _ => {
                self.out.push(Rejection::new(
                    RuleId::R006,
                    "writes to an array through a compound base expression",
                ));
                return;
            }
        };

        let Some(ty) = self.cx.oracle.type_of(ident.id) else {
            self.out.push(Rejection::about(
                RuleId::R007,
                ident.name.clone(),
                format!("could not determine the type of '{}'", ident.name),
            ));
            return;
        };
        if !ty.is_indexable_store() {
            self.out.push(Rejection::about(
                RuleId::R008,
                ident.name.clone(),
                format!("'{}' is not a slice or an array", ident.name),
            ));
            return;
        }

        // At least one identifier across the index expressions must be a
        // loop variable, otherwise iterations may collide on one element.
        let mut idents = FxHashSet::default();
        for index in &index_exprs {
            collect_expr_symbols(index, self.cx, &mut idents);
        }
        if idents.is_disjoint(self.loop_vars) {
            self.out.push(Rejection::new(
                RuleId::R009,
                "writes to an array using a non-loop variable as the index",
            ));
        }
    }

    /// Feed the R002 read/write maps from one side of an assignment. Only
    /// sides that index something participate, and the traversal follows
    /// the documented grammar; anything else is the distinguished
    /// unhandled-expression rejection.
    fn index_map_side(&mut self, side: &[Expr], write: bool) {
        for expr in side {
            if !contains_index(expr) {
                continue;
            }
            let mut collected = IndexMap::new();
            if traverse_indexed(expr, self.cx, &mut collected) {
                let map = if write { &mut self.writes } else { &mut self.reads };
                for (sym, name) in collected {
                    map.insert(sym, name);
                }
            } else if !self.unhandled {
                self.unhandled = true;
                self.out.push(Rejection::new(
                    RuleId::Unhandled,
                    "contains an expression form the analysis does not handle",
                ));
            }
        }
    }

    /// R013 and descent into subexpressions.
    fn expr(&mut self, expr: &Expr, func_depth: u32) {
        match &expr.kind {
            ExprKind::Call { fun, args, .. } => {
                self.method_receiver_policy(fun);
                self.expr(fun, func_depth);
                for arg in args {
                    self.expr(arg, func_depth);
                }
            }
            ExprKind::FuncLit { body, .. } => {
                for stmt in &body.stmts {
                    self.stmt(stmt, func_depth + 1);
                }
            }
            ExprKind::Paren(inner) | ExprKind::Star(inner) => self.expr(inner, func_depth),
            ExprKind::Unary { operand, .. } => self.expr(operand, func_depth),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs, func_depth);
                self.expr(rhs, func_depth);
            }
            ExprKind::Index { base, index } => {
                self.expr(base, func_depth);
                self.expr(index, func_depth);
            }
            ExprKind::Selector { base, .. } => self.expr(base, func_depth),
            ExprKind::Slice {
                base,
                low,
                high,
                max,
            } => {
                self.expr(base, func_depth);
                for part in [low, high, max].into_iter().flatten() {
                    self.expr(part, func_depth);
                }
            }
            ExprKind::CompositeLit { elems, .. } => {
                for elem in elems {
                    self.expr(elem, func_depth);
                }
            }
            ExprKind::KeyValue { key, value } => {
                self.expr(key, func_depth);
                self.expr(value, func_depth);
            }
            ExprKind::TypeAssert { base, .. } => self.expr(base, func_depth),
            _ => {}
        }
    }

    /// R013: `X.m(...)` needs X declared inside the loop, unless the
    /// accept-map vouches for it at this loop's line.
    fn method_receiver_policy(&mut self, fun: &Expr) {
        let ExprKind::Selector { base, .. } = &fun.unparen().kind else {
            return;
        };
        let Some(ident) = base.unparen().as_ident() else {
            return;
        };
        let Some(sym) = self.cx.bindings.of_ident(ident) else {
            return;
        };
        let symbol = self.cx.symbols.get(sym);
        match symbol.kind {
            // Package functions and conversions carry no receiver state.
            SymbolKind::Package | SymbolKind::Builtin | SymbolKind::BuiltinType
            | SymbolKind::Type => return,
            _ => {}
        }
        if self.lp.span.contains(symbol.decl_span.start) {
            return;
        }
        if self.cx.accept.allows(&ident.name, self.lp.start_line) {
            log::debug!(
                "receiver '{}' at line {} accepted by override",
                ident.name,
                self.lp.start_line
            );
            return;
        }
        self.out.push(Rejection::about(
            RuleId::R013,
            ident.name.clone(),
            format!("calls a method on '{}' declared outside the loop", ident.name),
        ));
    }
}

fn contains_index(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Index { .. } => true,
        ExprKind::Paren(inner) | ExprKind::Star(inner) => contains_index(inner),
        ExprKind::Unary { operand, .. } => contains_index(operand),
        ExprKind::Binary { lhs, rhs, .. } => contains_index(lhs) || contains_index(rhs),
        ExprKind::Selector { base, .. } => contains_index(base),
        ExprKind::Slice { base, .. } => contains_index(base),
        ExprKind::Call { fun, args, .. } => {
            contains_index(fun) || args.iter().any(contains_index)
        }
        ExprKind::KeyValue { key, value } => contains_index(key) || contains_index(value),
        ExprKind::CompositeLit { elems, .. } => elems.iter().any(contains_index),
        ExprKind::FuncLit { body, .. } => body_contains_index(body),
        ExprKind::TypeAssert { base, .. } => contains_index(base),
        _ => false,
    }
}

fn body_contains_index(body: &Block) -> bool {
    fn stmt_contains(stmt: &Stmt) -> bool {
        match &stmt.kind {
            StmtKind::Expr(e) | StmtKind::IncDec { expr: e, .. } | StmtKind::Go(e)
            | StmtKind::Defer(e) => contains_index(e),
            StmtKind::Assign { lhs, rhs, .. } => {
                lhs.iter().chain(rhs.iter()).any(contains_index)
            }
            StmtKind::Return(exprs) => exprs.iter().any(contains_index),
            StmtKind::Block(b) => b.stmts.iter().any(stmt_contains),
            StmtKind::If { cond, then, els, .. } => {
                contains_index(cond)
                    || then.stmts.iter().any(stmt_contains)
                    || els.as_deref().map(stmt_contains).unwrap_or(false)
            }
            StmtKind::For(f) => f.body.stmts.iter().any(stmt_contains),
            StmtKind::Labeled { stmt, .. } => stmt_contains(stmt),
            _ => false,
        }
    }
    body.stmts.iter().any(stmt_contains)
}

/// The documented traversal for the R002 maps: peel indexing and grouping
/// down to identifiers; a selector contributes its selected name. Returns
/// `false` on a shape outside the grammar.
fn traverse_indexed(
    expr: &Expr,
    cx: &AnalysisContext,
    out: &mut IndexMap<SymbolId, String>,
) -> bool {
    match &expr.kind {
        ExprKind::Index { base, .. } => traverse_indexed(base, cx, out),
        ExprKind::Ident(ident) => {
            if let Some(sym) = cx.bindings.of_ident(ident) {
                out.insert(sym, ident.name.clone());
            }
            true
        }
        ExprKind::Paren(inner) | ExprKind::Star(inner) => traverse_indexed(inner, cx, out),
        ExprKind::Selector { sel, .. } => {
            // The selected field is the identity that matters for
            // disjointness; the base object stays out of the map.
            if let Some(sym) = cx.bindings.of_ident(sel) {
                out.insert(sym, sel.name.clone());
            }
            true
        }
        ExprKind::Slice { base, .. } => traverse_indexed(base, cx, out),
        ExprKind::Unary { operand, .. } => traverse_indexed(operand, cx, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            traverse_indexed(lhs, cx, out) && traverse_indexed(rhs, cx, out)
        }
        ExprKind::KeyValue { key, value } => {
            traverse_indexed(key, cx, out) && traverse_indexed(value, cx, out)
        }
        ExprKind::Call { args, .. } => args.iter().all(|arg| traverse_indexed(arg, cx, out)),
        ExprKind::BasicLit { .. } => true,
        ExprKind::TypeAssert { base, .. } => traverse_indexed(base, cx, out),
        ExprKind::CompositeLit { elems, .. } => {
            elems.iter().all(|elem| traverse_indexed(elem, cx, out))
        }
        // Function literals and type expressions in an index-bearing
        // assignment side are outside the documented grammar.
        _ => false,
    }
}

fn collect_expr_symbols(expr: &Expr, cx: &AnalysisContext, out: &mut FxHashSet<SymbolId>) {
    match &expr.kind {
        ExprKind::Ident(ident) => {
            if let Some(sym) = cx.bindings.of_ident(ident) {
                out.insert(sym);
            }
        }
        ExprKind::Paren(inner) | ExprKind::Star(inner) => collect_expr_symbols(inner, cx, out),
        ExprKind::Unary { operand, .. } => collect_expr_symbols(operand, cx, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_expr_symbols(lhs, cx, out);
            collect_expr_symbols(rhs, cx, out);
        }
        ExprKind::Index { base, index } => {
            collect_expr_symbols(base, cx, out);
            collect_expr_symbols(index, cx, out);
        }
        ExprKind::Selector { base, sel } => {
            collect_expr_symbols(base, cx, out);
            if let Some(sym) = cx.bindings.of_ident(sel) {
                out.insert(sym);
            }
        }
        ExprKind::Call { fun, args, .. } => {
            collect_expr_symbols(fun, cx, out);
            for arg in args {
                collect_expr_symbols(arg, cx, out);
            }
        }
        _ => {}
    }
}
