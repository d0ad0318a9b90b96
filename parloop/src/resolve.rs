//! Name resolution: every identifier occurrence is bound to the symbol of
//! its declaration site.
//!
//! Symbols live in an arena shared by all files of a package; occurrences
//! store a `SymbolId` in a per-file side table. Every "same variable" test
//! in the analyzer compares `SymbolId`s, never spellings, so shadowed names
//! stay distinct. Blank identifiers and names the resolver cannot see (most
//! struct-literal keys, fields before type checking) are simply unbound.

use rustc_hash::FxHashMap;

use crate::syntax::ast::*;
use crate::syntax::Span;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SymbolId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    Var,
    Param,
    Func,
    Type,
    Const,
    Field,
    Label,
    Package,
    Builtin,
    BuiltinType,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Span of the declaring identifier. Builtins use an empty span at
    /// offset zero, which no loop body contains.
    pub decl_span: Span,
}

#[derive(Default, Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn alloc(&mut self, name: impl Into<String>, kind: SymbolKind, decl_span: Span) -> SymbolId {
        self.symbols.push(Symbol {
            name: name.into(),
            kind,
            decl_span,
        });
        SymbolId(self.symbols.len() as u32 - 1)
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }
}

/// Per-file resolution results.
#[derive(Default, Debug)]
pub struct Bindings {
    uses: FxHashMap<NodeId, SymbolId>,
}

impl Bindings {
    pub fn of(&self, node: NodeId) -> Option<SymbolId> {
        self.uses.get(&node).copied()
    }

    pub fn of_ident(&self, ident: &Ident) -> Option<SymbolId> {
        self.of(ident.id)
    }

    pub fn bind(&mut self, node: NodeId, symbol: SymbolId) {
        self.uses.insert(node, symbol);
    }
}

const BUILTIN_TYPES: &[&str] = &[
    "bool", "byte", "complex64", "complex128", "error", "float32", "float64", "int", "int8",
    "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32", "uint64",
    "uintptr", "any",
];

const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max",
    "min", "new", "panic", "print", "println", "real", "recover",
];

const BUILTIN_CONSTS: &[&str] = &["true", "false", "iota", "nil"];

/// Seed the universe scope shared by every file.
pub fn universe_scope(table: &mut SymbolTable) -> FxHashMap<String, SymbolId> {
    let mut scope = FxHashMap::default();
    for name in BUILTIN_TYPES {
        scope.insert(
            (*name).to_owned(),
            table.alloc(*name, SymbolKind::BuiltinType, Span::default()),
        );
    }
    for name in BUILTIN_FUNCS {
        scope.insert(
            (*name).to_owned(),
            table.alloc(*name, SymbolKind::Builtin, Span::default()),
        );
    }
    for name in BUILTIN_CONSTS {
        scope.insert(
            (*name).to_owned(),
            table.alloc(*name, SymbolKind::Const, Span::default()),
        );
    }
    scope
}

/// Collect the package-level declarations of all files, so that
/// use-before-declaration across the package resolves.
pub fn collect_package_scope(
    files: &[File],
    table: &mut SymbolTable,
) -> FxHashMap<String, SymbolId> {
    let mut scope = FxHashMap::default();
    for file in files {
        for decl in &file.decls {
            match decl {
                Decl::Func(func) => {
                    // Methods live on their receiver type, not in package scope.
                    if func.receiver.is_none() && !func.name.is_blank() {
                        let id = table.alloc(&func.name.name, SymbolKind::Func, func.name.span);
                        scope.insert(func.name.name.clone(), id);
                    }
                }
                Decl::Gen(decl) => {
                    for spec in &decl.specs {
                        match spec {
                            Spec::Value { names, .. } => {
                                let kind = if decl.keyword == DeclKeyword::Const {
                                    SymbolKind::Const
                                } else {
                                    SymbolKind::Var
                                };
                                for name in names {
                                    if !name.is_blank() {
                                        let id = table.alloc(&name.name, kind, name.span);
                                        scope.insert(name.name.clone(), id);
                                    }
                                }
                            }
                            Spec::Type { name, .. } => {
                                if !name.is_blank() {
                                    let id = table.alloc(&name.name, SymbolKind::Type, name.span);
                                    scope.insert(name.name.clone(), id);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    scope
}

pub fn resolve_file(
    file: &File,
    table: &mut SymbolTable,
    universe: &FxHashMap<String, SymbolId>,
    package_scope: &FxHashMap<String, SymbolId>,
) -> Bindings {
    let mut file_scope = FxHashMap::default();
    for spec in &file.imports {
        let name = match &spec.alias {
            Some(alias) if alias.name != "." && !alias.is_blank() => alias.name.clone(),
            Some(_) => continue,
            None => spec
                .path
                .rsplit('/')
                .next()
                .unwrap_or(&spec.path)
                .to_owned(),
        };
        let id = table.alloc(&name, SymbolKind::Package, spec.span);
        file_scope.insert(name, id);
    }

    let mut resolver = Resolver {
        table,
        scopes: vec![universe.clone(), package_scope.clone(), file_scope],
        labels: Vec::new(),
        bindings: Bindings::default(),
    };
    for decl in &file.decls {
        resolver.decl(decl);
    }
    resolver.bindings
}

struct Resolver<'a> {
    table: &'a mut SymbolTable,
    scopes: Vec<FxHashMap<String, SymbolId>>,
    /// One label scope per enclosing function (literal or declared).
    labels: Vec<FxHashMap<String, SymbolId>>,
    bindings: Bindings,
}

impl<'a> Resolver<'a> {
    fn push(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn declare(&mut self, ident: &Ident, kind: SymbolKind) {
        if ident.is_blank() {
            return;
        }
        // At package level the symbol already exists; reuse it so the
        // declaring identifier binds to the same id as its uses.
        let existing = if self.scopes.len() <= 3 {
            self.lookup(&ident.name)
        } else {
            None
        };
        let id = match existing {
            Some(id) if self.table.get(id).decl_span == ident.span => id,
            _ => {
                let id = self.table.alloc(&ident.name, kind, ident.span);
                self.scopes
                    .last_mut()
                    .expect("scope stack is never empty")
                    .insert(ident.name.clone(), id);
                id
            }
        };
        self.bindings.bind(ident.id, id);
    }

    fn use_ident(&mut self, ident: &Ident) {
        if ident.is_blank() {
            return;
        }
        if let Some(id) = self.lookup(&ident.name) {
            self.bindings.bind(ident.id, id);
        }
    }

    fn decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Func(func) => self.func_decl(func),
            Decl::Gen(decl) => self.gen_decl(decl),
        }
    }

    fn func_decl(&mut self, func: &FuncDecl) {
        if func.receiver.is_none() {
            self.use_ident(&func.name);
        }
        self.push();
        self.labels.push(FxHashMap::default());
        if let Some(receiver) = &func.receiver {
            self.param(receiver);
        }
        self.signature(&func.sig);
        if let Some(body) = &func.body {
            self.collect_labels(body);
            self.block_in_place(body);
        }
        self.labels.pop();
        self.pop();
    }

    fn signature(&mut self, sig: &FuncSig) {
        for param in &sig.params {
            self.param(param);
        }
        for result in &sig.results {
            self.param(result);
        }
    }

    fn param(&mut self, param: &Param) {
        self.type_expr(&param.ty);
        for name in &param.names {
            self.declare(name, SymbolKind::Param);
        }
    }

    fn gen_decl(&mut self, decl: &GenDecl) {
        for spec in &decl.specs {
            match spec {
                Spec::Value { names, ty, values, .. } => {
                    if let Some(ty) = ty {
                        self.type_expr(ty);
                    }
                    for value in values {
                        self.expr(value);
                    }
                    let kind = if decl.keyword == DeclKeyword::Const {
                        SymbolKind::Const
                    } else {
                        SymbolKind::Var
                    };
                    for name in names {
                        self.declare(name, kind);
                    }
                }
                Spec::Type { name, ty, .. } => {
                    self.declare(name, SymbolKind::Type);
                    self.type_expr(ty);
                }
            }
        }
    }

    fn type_expr(&mut self, ty: &TypeExpr) {
        match &ty.kind {
            TypeExprKind::Named { pkg, name } => {
                if let Some(pkg) = pkg {
                    self.use_ident(pkg);
                    // `name` is resolved against the package's exports, which
                    // we do not see; leave it unbound.
                } else {
                    self.use_ident(name);
                }
            }
            TypeExprKind::Instantiate { base, args } => {
                self.type_expr(base);
                for arg in args {
                    self.type_expr(arg);
                }
            }
            TypeExprKind::Pointer(inner)
            | TypeExprKind::Slice(inner)
            | TypeExprKind::Chan { elem: inner, .. } => self.type_expr(inner),
            TypeExprKind::Array { len, elem } => {
                if let Some(len) = len {
                    self.expr(len);
                }
                self.type_expr(elem);
            }
            TypeExprKind::Map { key, value } => {
                self.type_expr(key);
                self.type_expr(value);
            }
            TypeExprKind::Func(sig) => {
                // Parameter names in a type are not declarations.
                for param in sig.params.iter().chain(sig.results.iter()) {
                    self.type_expr(&param.ty);
                }
            }
            TypeExprKind::Struct(fields) => {
                for field in fields {
                    self.type_expr(&field.ty);
                    for name in &field.names {
                        let id = self.table.alloc(&name.name, SymbolKind::Field, name.span);
                        self.bindings.bind(name.id, id);
                    }
                }
            }
            TypeExprKind::Interface => {}
        }
    }

    /// Labels are visible to forward gotos, so gather them before walking.
    fn collect_labels(&mut self, block: &Block) {
        let mut stack: Vec<&Stmt> = block.stmts.iter().collect();
        while let Some(stmt) = stack.pop() {
            match &stmt.kind {
                StmtKind::Labeled { label, stmt } => {
                    if !label.is_blank() {
                        let id = self.table.alloc(&label.name, SymbolKind::Label, label.span);
                        self.labels
                            .last_mut()
                            .expect("label scope is never empty here")
                            .insert(label.name.clone(), id);
                        self.bindings.bind(label.id, id);
                    }
                    stack.push(stmt);
                }
                StmtKind::Block(block) => stack.extend(block.stmts.iter()),
                StmtKind::If { then, els, .. } => {
                    stack.extend(then.stmts.iter());
                    if let Some(els) = els {
                        stack.push(els);
                    }
                }
                StmtKind::For(for_stmt) => stack.extend(for_stmt.body.stmts.iter()),
                StmtKind::Switch { cases, .. } | StmtKind::TypeSwitch { cases, .. } => {
                    for case in cases {
                        stack.extend(case.body.iter());
                    }
                }
                StmtKind::Select { cases } => {
                    for case in cases {
                        stack.extend(case.body.iter());
                    }
                }
                // Function literals get their own label scope when walked.
                _ => {}
            }
        }
    }

    fn block(&mut self, block: &Block) {
        self.push();
        self.block_in_place(block);
        self.pop();
    }

    fn block_in_place(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Decl(decl) => self.gen_decl(decl),
            StmtKind::Empty => {}
            StmtKind::Labeled { stmt, .. } => self.stmt(stmt),
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Send { chan, value } => {
                self.expr(chan);
                self.expr(value);
            }
            StmtKind::IncDec { expr, .. } => self.expr(expr),
            StmtKind::Assign { op, lhs, rhs } => {
                for expr in rhs {
                    self.expr(expr);
                }
                if *op == AssignOp::Define {
                    for expr in lhs {
                        match expr.as_ident() {
                            Some(ident) => self.define_or_use(ident),
                            None => self.expr(expr),
                        }
                    }
                } else {
                    for expr in lhs {
                        self.expr(expr);
                    }
                }
            }
            StmtKind::Go(expr) | StmtKind::Defer(expr) => self.expr(expr),
            StmtKind::Return(exprs) => {
                for expr in exprs {
                    self.expr(expr);
                }
            }
            StmtKind::Branch { label, .. } => {
                if let Some(label) = label {
                    if let Some(scope) = self.labels.last() {
                        if let Some(&id) = scope.get(&label.name) {
                            self.bindings.bind(label.id, id);
                        }
                    }
                }
            }
            StmtKind::Block(block) => self.block(block),
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                self.push();
                if let Some(init) = init {
                    self.stmt(init);
                }
                self.expr(cond);
                self.block(then);
                if let Some(els) = els {
                    self.stmt(els);
                }
                self.pop();
            }
            StmtKind::Switch { init, tag, cases } => {
                self.push();
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(tag) = tag {
                    self.expr(tag);
                }
                for case in cases {
                    self.push();
                    for expr in &case.exprs {
                        self.expr(expr);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.pop();
                }
                self.pop();
            }
            StmtKind::TypeSwitch {
                init,
                binding,
                subject,
                cases,
            } => {
                self.push();
                if let Some(init) = init {
                    self.stmt(init);
                }
                self.expr(subject);
                if let Some(binding) = binding {
                    self.declare(binding, SymbolKind::Var);
                }
                for case in cases {
                    self.push();
                    for expr in &case.exprs {
                        self.expr(expr);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.pop();
                }
                self.pop();
            }
            StmtKind::Select { cases } => {
                for case in cases {
                    self.push();
                    if let Some(comm) = &case.comm {
                        self.stmt(comm);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt);
                    }
                    self.pop();
                }
            }
            StmtKind::For(for_stmt) => {
                self.push();
                match &for_stmt.head {
                    ForHead::Classic { init, cond, post } => {
                        if let Some(init) = init {
                            self.stmt(init);
                        }
                        if let Some(cond) = cond {
                            self.expr(cond);
                        }
                        if let Some(post) = post {
                            self.stmt(post);
                        }
                    }
                    ForHead::Range {
                        key,
                        value,
                        define,
                        iterable,
                    } => {
                        self.expr(iterable);
                        for expr in [key, value].into_iter().flatten() {
                            match (expr.as_ident(), *define) {
                                (Some(ident), true) => self.define_or_use(ident),
                                _ => self.expr(expr),
                            }
                        }
                    }
                }
                self.block(&for_stmt.body);
                self.pop();
            }
        }
    }

    /// `:=` declares a fresh symbol unless the name is already declared in
    /// the innermost scope (Go permits redeclaration in that position).
    fn define_or_use(&mut self, ident: &Ident) {
        if ident.is_blank() {
            return;
        }
        let innermost = self.scopes.last().and_then(|s| s.get(&ident.name).copied());
        if let Some(id) = innermost {
            self.bindings.bind(ident.id, id);
            return;
        }
        self.declare(ident, SymbolKind::Var);
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(ident) => self.use_ident(ident),
            ExprKind::BasicLit { .. } => {}
            ExprKind::CompositeLit { ty, elems } => {
                if let Some(ty) = ty {
                    self.type_expr(ty);
                }
                for elem in elems {
                    match &elem.kind {
                        ExprKind::KeyValue { key, value } => {
                            // A bare identifier key is almost always a struct
                            // field name; binding it to a lexical variable
                            // would be wrong, so only non-ident keys resolve.
                            if key.as_ident().is_none() {
                                self.expr(key);
                            }
                            self.expr(value);
                        }
                        _ => self.expr(elem),
                    }
                }
            }
            ExprKind::FuncLit { sig, body } => {
                self.push();
                self.labels.push(FxHashMap::default());
                self.signature(sig);
                self.collect_labels(body);
                self.block_in_place(body);
                self.labels.pop();
                self.pop();
            }
            ExprKind::Paren(inner) => self.expr(inner),
            ExprKind::Selector { base, .. } => {
                // The selected name needs type information; the oracle binds
                // it when it can.
                self.expr(base);
            }
            ExprKind::Index { base, index } => {
                self.expr(base);
                self.expr(index);
            }
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
            ExprKind::TypeAssert { base, ty } => {
                self.expr(base);
                if let Some(ty) = ty {
                    self.type_expr(ty);
                }
            }
            ExprKind::Call { fun, args, .. } => {
                self.expr(fun);
                for arg in args {
                    self.expr(arg);
                }
            }
            ExprKind::Star(inner) => self.expr(inner),
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::KeyValue { key, value } => {
                self.expr(key);
                self.expr(value);
            }
            ExprKind::TypeLit(ty) => self.type_expr(ty),
        }
    }
}
