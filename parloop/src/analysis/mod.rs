//! The safety analyzer: decides per loop whether running its iterations
//! concurrently preserves semantics.
//!
//! A loop is PERMITted only when every rule holds; each violated rule
//! produces one rejection carrying a stable rule id. The analysis makes
//! exactly two passes over the loop body:
//!
//! * a control-flow pass with an explicit scope stack, for escapes
//!   (returns, gotos, breaks) — [`control`];
//! * a data pass over assignments and calls, for the write-policy and
//!   read/write-disjointness rules — [`data`].
//!
//! Loop-variable identification (the gate for the index rules) happens
//! before either pass in [`loop_vars`]. All variable identity tests compare
//! `SymbolId`s; none compare spellings.

use rustc_hash::FxHashSet;

use crate::loops::Loop;
use crate::resolve::{Bindings, SymbolId, SymbolTable};
use crate::syntax::SourceFile;
use crate::types::TypeOracle;
use crate::{Error, Result};

mod control;
mod data;
mod loop_vars;

pub use loop_vars::loop_variables;

/// Stable rule identifiers, as they appear in diagnostics and reports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RuleId {
    /// No loop variable unique to each iteration.
    R001,
    /// Same array both read and written.
    R002,
    /// Return without an enclosing function.
    R003,
    /// Goto (or labeled continue) escaping the loop.
    R004,
    /// Break escaping the loop.
    R005,
    /// Index base is not a plain identifier.
    R006,
    /// Index base has no known type.
    R007,
    /// Index base is not a slice or array.
    R008,
    /// Index expression carries no loop variable.
    R009,
    /// Write to the loop variable.
    R011,
    /// Write to a variable declared outside the loop.
    R012,
    /// Method call on a receiver declared outside the loop.
    R013,
    /// Expression shape outside the documented grammar.
    Unhandled,
}

impl RuleId {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleId::R001 => "R001",
            RuleId::R002 => "R002",
            RuleId::R003 => "R003",
            RuleId::R004 => "R004",
            RuleId::R005 => "R005",
            RuleId::R006 => "R006",
            RuleId::R007 => "R007",
            RuleId::R008 => "R008",
            RuleId::R009 => "R009",
            RuleId::R011 => "R011",
            RuleId::R012 => "R012",
            RuleId::R013 => "R013",
            RuleId::Unhandled => "R900",
        }
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    Warning,
    Error,
}

/// One analyzer finding, positioned at the loop's `for` keyword.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub rule: RuleId,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub severity: Severity,
}

/// A single rule violation within a loop.
#[derive(Clone, Debug)]
pub struct Rejection {
    pub rule: RuleId,
    pub ident: Option<String>,
    pub message: String,
}

impl Rejection {
    fn new(rule: RuleId, message: impl Into<String>) -> Rejection {
        Rejection {
            rule,
            ident: None,
            message: message.into(),
        }
    }

    fn about(rule: RuleId, ident: impl Into<String>, message: impl Into<String>) -> Rejection {
        Rejection {
            rule,
            ident: Some(ident.into()),
            message: message.into(),
        }
    }
}

/// The analyzer's verdict for one loop.
#[derive(Clone, Debug)]
pub enum Verdict {
    Permit,
    Reject(Vec<Rejection>),
}

impl Verdict {
    pub fn is_permit(&self) -> bool {
        matches!(self, Verdict::Permit)
    }

    /// The rejection reported on stdout; the first in rule order of
    /// discovery.
    pub fn primary(&self) -> Option<&Rejection> {
        match self {
            Verdict::Permit => None,
            Verdict::Reject(all) => all.first(),
        }
    }
}

/// Caller-supplied overrides for R013: `(identifier, loop start line)` pairs
/// that are accepted despite an outer-declared receiver.
#[derive(Clone, Debug, Default)]
pub struct AcceptMap {
    entries: FxHashSet<(String, u32)>,
}

impl AcceptMap {
    /// Parse repeated `ident:line` command-line values.
    pub fn parse(pairs: &[String]) -> Result<AcceptMap> {
        let mut map = AcceptMap::default();
        for pair in pairs {
            let (name, line) = pair
                .split_once(':')
                .ok_or_else(|| Error::Config(format!("accept entry {pair:?} is not ident:line")))?;
            let line: u32 = line.trim().parse().map_err(|_| {
                Error::Config(format!("accept entry {pair:?} has a non-numeric line"))
            })?;
            map.insert(name.trim(), line);
        }
        Ok(map)
    }

    pub fn insert(&mut self, name: &str, line: u32) {
        self.entries.insert((name.to_owned(), line));
    }

    pub fn allows(&self, name: &str, line: u32) -> bool {
        self.entries.contains(&(name.to_owned(), line))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a per-loop analysis needs to see.
pub struct AnalysisContext<'a> {
    pub source: &'a SourceFile,
    pub symbols: &'a SymbolTable,
    pub bindings: &'a Bindings,
    pub oracle: &'a TypeOracle,
    pub accept: &'a AcceptMap,
}

/// Analyze one loop. PERMIT requires every rule to hold.
pub fn analyze_loop(cx: &AnalysisContext, lp: &Loop) -> Verdict {
    // Without a per-iteration loop variable nothing downstream is
    // meaningful; R001 short-circuits.
    let vars = loop_vars::loop_variables(cx, lp);
    if vars.is_empty() {
        return Verdict::Reject(vec![Rejection::new(
            RuleId::R001,
            "could not find a loop variable that is unique per iteration",
        )]);
    }
    let vars: FxHashSet<SymbolId> = vars.into_iter().collect();

    let mut rejections = Vec::new();
    control::check(lp, &mut rejections);
    data::check(cx, lp, &vars, &mut rejections);

    if rejections.is_empty() {
        Verdict::Permit
    } else {
        Verdict::Reject(rejections)
    }
}

/// Lower rejections to positioned diagnostics at the loop head.
pub fn diagnostics(source: &SourceFile, lp: &Loop, rejections: &[Rejection]) -> Vec<Diagnostic> {
    let pos = source.position(lp.span.start);
    rejections
        .iter()
        .map(|r| Diagnostic {
            rule: r.rule,
            line: pos.line,
            column: pos.column,
            message: format!("cannot make loop concurrent because it {}", r.message),
            severity: Severity::Warning,
        })
        .collect()
}
