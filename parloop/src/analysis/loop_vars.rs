//! Loop-variable identification (rule R001).
//!
//! Classic loops: the variables kept are exactly those declared in `init`,
//! referenced in `cond`, and modified in `post`; an empty intersection is a
//! rejection. Range loops: the declared key/value identifiers, except that a
//! range over a map needs its key declared, since only the key can prove a
//! write lands on a distinct element per iteration.

use rustc_hash::FxHashSet;

use crate::loops::{Loop, LoopKind};
use crate::resolve::SymbolId;
use crate::syntax::ast::*;
use crate::types::Ty;

use super::AnalysisContext;

/// The symbols that are unique per iteration, or empty when R001 fails.
pub fn loop_variables(cx: &AnalysisContext, lp: &Loop) -> Vec<SymbolId> {
    match lp.kind {
        LoopKind::ForClassic => classic_vars(cx, lp),
        LoopKind::ForRange => range_vars(cx, lp),
    }
}

fn classic_vars(cx: &AnalysisContext, lp: &Loop) -> Vec<SymbolId> {
    let (init, cond, post) = match &lp.stmt.head {
        ForHead::Classic { init, cond, post } => (init, cond, post),
        ForHead::Range { .. } => return Vec::new(),
    };
    let (init, cond, post) = match (init, cond, post) {
        (Some(init), Some(cond), Some(post)) => (init, cond, post),
        _ => return Vec::new(),
    };

    // Declared in init.
    let declared: Vec<SymbolId> = match &init.kind {
        StmtKind::Assign {
            op: AssignOp::Define,
            lhs,
            ..
        } => lhs
            .iter()
            .filter_map(|e| e.as_ident())
            .filter(|i| !i.is_blank())
            .filter_map(|i| cx.bindings.of_ident(i))
            .collect(),
        _ => return Vec::new(),
    };
    if declared.is_empty() {
        return Vec::new();
    }

    // Modified in post: an increment/decrement, or an assignment whose
    // left-hand side contains the symbol.
    let mut modified = FxHashSet::default();
    match &post.kind {
        StmtKind::IncDec { expr, .. } => collect_idents(expr, cx, &mut modified),
        StmtKind::Assign { lhs, .. } => {
            for expr in lhs {
                collect_idents(expr, cx, &mut modified);
            }
        }
        _ => {}
    }

    // Referenced in cond.
    let mut referenced = FxHashSet::default();
    collect_idents(cond, cx, &mut referenced);

    declared
        .into_iter()
        .filter(|id| modified.contains(id) && referenced.contains(id))
        .collect()
}

fn range_vars(cx: &AnalysisContext, lp: &Loop) -> Vec<SymbolId> {
    let (key, value, define, iterable) = match &lp.stmt.head {
        ForHead::Range {
            key,
            value,
            define,
            iterable,
        } => (key, value, define, iterable),
        ForHead::Classic { .. } => return Vec::new(),
    };
    if !*define {
        // `for k = range xs` reuses outer variables; nothing is fresh per
        // iteration.
        return Vec::new();
    }

    let declared = |expr: &Option<Expr>| -> Option<SymbolId> {
        let ident = expr.as_ref()?.as_ident()?;
        if ident.is_blank() {
            return None;
        }
        cx.bindings.of_ident(ident)
    };
    let key_sym = declared(key);
    let value_sym = declared(value);

    // A write into a ranged-over map is only per-iteration-disjoint through
    // the key; without a declared key there is no usable loop variable.
    let over_map = cx
        .oracle
        .of_expr(iterable)
        .map(|ty| matches!(ty.underlying(), Ty::Map(..)))
        .unwrap_or(false);
    if over_map && key_sym.is_none() {
        return Vec::new();
    }

    key_sym.into_iter().chain(value_sym).collect()
}

fn collect_idents(expr: &Expr, cx: &AnalysisContext, out: &mut FxHashSet<SymbolId>) {
    match &expr.kind {
        ExprKind::Ident(ident) => {
            if let Some(id) = cx.bindings.of_ident(ident) {
                out.insert(id);
            }
        }
        ExprKind::Paren(inner) | ExprKind::Star(inner) => collect_idents(inner, cx, out),
        ExprKind::Unary { operand, .. } => collect_idents(operand, cx, out),
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_idents(lhs, cx, out);
            collect_idents(rhs, cx, out);
        }
        ExprKind::Index { base, index } => {
            collect_idents(base, cx, out);
            collect_idents(index, cx, out);
        }
        ExprKind::Selector { base, .. } => collect_idents(base, cx, out),
        ExprKind::Call { fun, args, .. } => {
            collect_idents(fun, cx, out);
            for arg in args {
                collect_idents(arg, cx, out);
            }
        }
        ExprKind::Slice {
            base,
            low,
            high,
            max,
        } => {
            collect_idents(base, cx, out);
            for part in [low, high, max].into_iter().flatten() {
                collect_idents(part, cx, out);
            }
        }
        _ => {}
    }
}
