//! The type oracle: a best-effort, file-local type checker for the analyzed
//! subset.
//!
//! The analyzer only ever asks two questions: what is the underlying kind of
//! an expression (slice, array, map, ...) and what is its printable name.
//! The oracle answers from declarations it can see; whenever inference runs
//! out of information it simply records nothing, and the caller treats the
//! missing answer conservatively (an analysis rejection or a rewrite error,
//! never a guess).
//!
//! Types of imported packages are opaque: `pkg.T` resolves to a named type
//! with an unknown underlying, qualified by the full import path so that
//! printing can trim it back down to `pkg.T`.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::resolve::{Bindings, SymbolId, SymbolKind, SymbolTable};
use crate::syntax::ast::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Str,
    Byte,
    Rune,
}

impl BasicKind {
    fn name(self) -> &'static str {
        use BasicKind::*;
        match self {
            Bool => "bool",
            Int => "int",
            Int8 => "int8",
            Int16 => "int16",
            Int32 => "int32",
            Int64 => "int64",
            Uint => "uint",
            Uint8 => "uint8",
            Uint16 => "uint16",
            Uint32 => "uint32",
            Uint64 => "uint64",
            Uintptr => "uintptr",
            Float32 => "float32",
            Float64 => "float64",
            Complex64 => "complex64",
            Complex128 => "complex128",
            Str => "string",
            Byte => "byte",
            Rune => "rune",
        }
    }

    fn from_name(name: &str) -> Option<BasicKind> {
        use BasicKind::*;
        Some(match name {
            "bool" => Bool,
            "int" => Int,
            "int8" => Int8,
            "int16" => Int16,
            "int32" => Int32,
            "int64" => Int64,
            "uint" => Uint,
            "uint8" => Uint8,
            "uint16" => Uint16,
            "uint32" => Uint32,
            "uint64" => Uint64,
            "uintptr" => Uintptr,
            "float32" => Float32,
            "float64" => Float64,
            "complex64" => Complex64,
            "complex128" => Complex128,
            "string" => Str,
            "byte" => Byte,
            "rune" => Rune,
            _ => return None,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldTy {
    pub name: String,
    pub ty: Ty,
    pub symbol: Option<SymbolId>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Ty {
    Basic(BasicKind),
    Slice(Box<Ty>),
    Array(Option<u64>, Box<Ty>),
    Map(Box<Ty>, Box<Ty>),
    Pointer(Box<Ty>),
    Chan(Box<Ty>),
    Func {
        params: Vec<Ty>,
        results: Vec<Ty>,
    },
    Struct(Vec<FieldTy>),
    Interface,
    /// A declared type. `qualifier` is the full import path for foreign
    /// types, `None` for types of the analyzed package. `args` carries a
    /// generic argument list verbatim.
    Named {
        qualifier: Option<String>,
        name: String,
        args: Option<String>,
        underlying: Box<Ty>,
    },
    /// Imported type whose definition we cannot see.
    Opaque {
        qualifier: String,
        name: String,
    },
    /// Result list of a multi-value call.
    Tuple(Vec<Ty>),
}

impl Ty {
    /// Peel named types down to their structural shape.
    pub fn underlying(&self) -> &Ty {
        match self {
            Ty::Named { underlying, .. } => underlying.underlying(),
            other => other,
        }
    }

    pub fn is_indexable_store(&self) -> bool {
        matches!(self.underlying(), Ty::Slice(_) | Ty::Array(..))
    }

    pub fn elem(&self) -> Option<&Ty> {
        match self.underlying() {
            Ty::Slice(elem) | Ty::Array(_, elem) | Ty::Chan(elem) | Ty::Pointer(elem) => {
                Some(elem)
            }
            Ty::Map(_, value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Basic(kind) => f.write_str(kind.name()),
            Ty::Slice(elem) => write!(f, "[]{elem}"),
            Ty::Array(Some(n), elem) => write!(f, "[{n}]{elem}"),
            Ty::Array(None, elem) => write!(f, "[]{elem}"),
            Ty::Map(key, value) => write!(f, "map[{key}]{value}"),
            Ty::Pointer(elem) => write!(f, "*{elem}"),
            Ty::Chan(elem) => write!(f, "chan {elem}"),
            Ty::Func { params, results } => {
                f.write_str("func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")?;
                match results.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", results[0]),
                    _ => {
                        f.write_str(" (")?;
                        for (i, r) in results.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{r}")?;
                        }
                        f.write_str(")")
                    }
                }
            }
            Ty::Struct(fields) => {
                f.write_str("struct{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{} {}", field.name, field.ty)?;
                }
                f.write_str("}")
            }
            Ty::Interface => f.write_str("interface{}"),
            Ty::Named {
                qualifier,
                name,
                args,
                ..
            } => {
                if let Some(q) = qualifier {
                    write!(f, "{q}.{name}")?;
                } else {
                    f.write_str(name)?;
                }
                if let Some(args) = args {
                    f.write_str(args)?;
                }
                Ok(())
            }
            Ty::Opaque { qualifier, name } => write!(f, "{qualifier}.{name}"),
            Ty::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Expression types, keyed by AST node id.
#[derive(Default, Debug)]
pub struct TypeOracle {
    types: FxHashMap<NodeId, Ty>,
}

impl TypeOracle {
    pub fn type_of(&self, id: NodeId) -> Option<&Ty> {
        self.types.get(&id)
    }

    pub fn of_expr(&self, expr: &Expr) -> Option<&Ty> {
        self.type_of(expr.id)
    }
}

/// Run inference over one file. `bindings` gains field bindings for the
/// selector expressions the checker can see through.
pub fn check_file(
    file: &File,
    table: &SymbolTable,
    bindings: &mut Bindings,
    import_paths: &FxHashMap<String, String>,
) -> TypeOracle {
    let mut checker = Checker {
        table,
        import_paths,
        type_decls: FxHashMap::default(),
        symbol_types: FxHashMap::default(),
        oracle: TypeOracle::default(),
        field_bindings: Vec::new(),
    };

    // Named types first, then the value declarations that may use them.
    for decl in &file.decls {
        if let Decl::Gen(decl) = decl {
            for spec in &decl.specs {
                if let Spec::Type { name, ty, .. } = spec {
                    if let Some(id) = bindings.of_ident(name) {
                        checker.type_decls.insert(id, ty);
                    }
                }
            }
        }
    }
    // Signatures and package-level values before bodies, so uses resolve
    // regardless of source order.
    for decl in &file.decls {
        if let Decl::Func(func) = decl {
            if func.receiver.is_none() {
                let ty = checker.func_type(&func.sig, bindings);
                checker.set_symbol(bindings, &func.name, ty);
            }
        }
    }
    for decl in &file.decls {
        if let Decl::Gen(decl) = decl {
            checker.gen_decl(decl, bindings);
        }
    }
    for decl in &file.decls {
        if let Decl::Func(func) = decl {
            checker.func_decl(func, bindings);
        }
    }
    for (node, symbol) in checker.field_bindings.drain(..) {
        bindings.bind(node, symbol);
    }
    checker.oracle
}

struct Checker<'a> {
    table: &'a SymbolTable,
    /// Package alias -> full import path.
    import_paths: &'a FxHashMap<String, String>,
    type_decls: FxHashMap<SymbolId, &'a TypeExpr>,
    symbol_types: FxHashMap<SymbolId, Ty>,
    oracle: TypeOracle,
    /// Deferred `bindings.bind` calls for selector fields; applied at the
    /// end because `bindings` is borrowed for reading during the walk.
    field_bindings: Vec<(NodeId, SymbolId)>,
}

impl<'a> Checker<'a> {
    fn resolve_type(&mut self, ty: &TypeExpr, bindings: &Bindings) -> Option<Ty> {
        self.resolve_type_guarded(ty, bindings, 0)
    }

    fn resolve_type_guarded(
        &mut self,
        ty: &TypeExpr,
        bindings: &Bindings,
        depth: u32,
    ) -> Option<Ty> {
        if depth > 32 {
            return Some(Ty::Interface);
        }
        match &ty.kind {
            TypeExprKind::Named { pkg: Some(pkg), name } => {
                let qualifier = self
                    .import_paths
                    .get(&pkg.name)
                    .cloned()
                    .unwrap_or_else(|| pkg.name.clone());
                Some(Ty::Opaque {
                    qualifier,
                    name: name.name.clone(),
                })
            }
            TypeExprKind::Named { pkg: None, name } => {
                if let Some(kind) = BasicKind::from_name(&name.name) {
                    // A user type may shadow a predeclared name.
                    let shadowed = bindings
                        .of_ident(name)
                        .map(|id| self.table.get(id).kind == SymbolKind::Type)
                        .unwrap_or(false);
                    if !shadowed {
                        return Some(Ty::Basic(kind));
                    }
                }
                if name.name == "any" || name.name == "error" {
                    return Some(Ty::Interface);
                }
                let id = bindings.of_ident(name)?;
                match self.table.get(id).kind {
                    SymbolKind::Type => {
                        let decl_ty = self.type_decls.get(&id).copied()?;
                        let underlying =
                            self.resolve_type_guarded(decl_ty, bindings, depth + 1)?;
                        Some(Ty::Named {
                            qualifier: None,
                            name: name.name.clone(),
                            args: None,
                            underlying: Box::new(underlying),
                        })
                    }
                    SymbolKind::BuiltinType => BasicKind::from_name(&name.name).map(Ty::Basic),
                    _ => None,
                }
            }
            TypeExprKind::Instantiate { base, args } => {
                let base_ty = self.resolve_type_guarded(base, bindings, depth + 1)?;
                let printed: Vec<String> = args
                    .iter()
                    .map(|arg| {
                        self.resolve_type_guarded(arg, bindings, depth + 1)
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "any".to_owned())
                    })
                    .collect();
                let arg_list = Some(format!("[{}]", printed.join(", ")));
                match base_ty {
                    Ty::Named {
                        qualifier,
                        name,
                        underlying,
                        ..
                    } => Some(Ty::Named {
                        qualifier,
                        name,
                        args: arg_list,
                        underlying,
                    }),
                    Ty::Opaque { qualifier, name } => Some(Ty::Named {
                        qualifier: Some(qualifier),
                        name,
                        args: arg_list,
                        underlying: Box::new(Ty::Interface),
                    }),
                    other => Some(other),
                }
            }
            TypeExprKind::Pointer(inner) => Some(Ty::Pointer(Box::new(
                self.resolve_type_guarded(inner, bindings, depth + 1)?,
            ))),
            TypeExprKind::Slice(inner) => Some(Ty::Slice(Box::new(
                self.resolve_type_guarded(inner, bindings, depth + 1)?,
            ))),
            TypeExprKind::Array { len, elem } => {
                let elem = self.resolve_type_guarded(elem, bindings, depth + 1)?;
                let len = len.as_deref().and_then(const_len);
                Some(Ty::Array(len, Box::new(elem)))
            }
            TypeExprKind::Map { key, value } => Some(Ty::Map(
                Box::new(self.resolve_type_guarded(key, bindings, depth + 1)?),
                Box::new(self.resolve_type_guarded(value, bindings, depth + 1)?),
            )),
            TypeExprKind::Chan { elem, .. } => Some(Ty::Chan(Box::new(
                self.resolve_type_guarded(elem, bindings, depth + 1)?,
            ))),
            TypeExprKind::Func(sig) => Some(self.func_type(sig, bindings)),
            TypeExprKind::Struct(fields) => {
                let mut out = Vec::new();
                for field in fields {
                    let ty = self
                        .resolve_type_guarded(&field.ty, bindings, depth + 1)
                        .unwrap_or(Ty::Interface);
                    if field.names.is_empty() {
                        // Embedded field, addressed by its type name.
                        if let TypeExprKind::Named { name, .. } = &field.ty.kind {
                            out.push(FieldTy {
                                name: name.name.clone(),
                                ty: ty.clone(),
                                symbol: bindings.of_ident(name),
                            });
                        }
                    }
                    for name in &field.names {
                        out.push(FieldTy {
                            name: name.name.clone(),
                            ty: ty.clone(),
                            symbol: bindings.of_ident(name),
                        });
                    }
                }
                Some(Ty::Struct(out))
            }
            TypeExprKind::Interface => Some(Ty::Interface),
        }
    }

    fn func_type(&mut self, sig: &FuncSig, bindings: &Bindings) -> Ty {
        let params = sig
            .params
            .iter()
            .flat_map(|p| {
                let ty = self.resolve_type(&p.ty, bindings).unwrap_or(Ty::Interface);
                let count = p.names.len().max(1);
                std::iter::repeat(ty).take(count)
            })
            .collect();
        let results = sig
            .results
            .iter()
            .flat_map(|p| {
                let ty = self.resolve_type(&p.ty, bindings).unwrap_or(Ty::Interface);
                let count = p.names.len().max(1);
                std::iter::repeat(ty).take(count)
            })
            .collect();
        Ty::Func { params, results }
    }

    fn set_symbol(&mut self, bindings: &Bindings, ident: &Ident, ty: Ty) {
        if let Some(id) = bindings.of_ident(ident) {
            self.symbol_types.insert(id, ty);
        }
    }

    fn record(&mut self, node: NodeId, ty: Ty) -> Ty {
        self.oracle.types.insert(node, ty.clone());
        ty
    }

    fn gen_decl(&mut self, decl: &GenDecl, bindings: &Bindings) {
        for spec in &decl.specs {
            if let Spec::Value { names, ty, values, .. } = spec {
                let declared = ty.as_ref().and_then(|t| self.resolve_type(t, bindings));
                let value_tys: Vec<Option<Ty>> = values
                    .iter()
                    .map(|v| self.expr(v, bindings))
                    .collect();
                for (i, name) in names.iter().enumerate() {
                    let inferred = declared
                        .clone()
                        .or_else(|| value_tys.get(i).cloned().flatten())
                        .or_else(|| {
                            // `a, b := f()` distribution
                            match value_tys.first().cloned().flatten() {
                                Some(Ty::Tuple(items)) => items.get(i).cloned(),
                                _ => None,
                            }
                        });
                    if let Some(ty) = inferred {
                        self.oracle.types.insert(name.id, ty.clone());
                        self.set_symbol(bindings, name, ty);
                    }
                }
            }
        }
    }

    fn func_decl(&mut self, func: &FuncDecl, bindings: &Bindings) {
        if let Some(receiver) = &func.receiver {
            self.bind_params(std::slice::from_ref(receiver), bindings);
        }
        if func.receiver.is_none() {
            let ty = self.func_type(&func.sig, bindings);
            self.set_symbol(bindings, &func.name, ty);
        }
        self.bind_params(&func.sig.params, bindings);
        self.bind_params(&func.sig.results, bindings);
        if let Some(body) = &func.body {
            self.block(body, bindings);
        }
    }

    fn bind_params(&mut self, params: &[Param], bindings: &Bindings) {
        for param in params {
            let base = self.resolve_type(&param.ty, bindings);
            for name in &param.names {
                if let Some(ty) = &base {
                    let ty = if param.variadic {
                        Ty::Slice(Box::new(ty.clone()))
                    } else {
                        ty.clone()
                    };
                    self.oracle.types.insert(name.id, ty.clone());
                    self.set_symbol(bindings, name, ty);
                }
            }
        }
    }

    fn block(&mut self, block: &Block, bindings: &Bindings) {
        for stmt in &block.stmts {
            self.stmt(stmt, bindings);
        }
    }

    fn stmt(&mut self, stmt: &Stmt, bindings: &Bindings) {
        match &stmt.kind {
            StmtKind::Decl(decl) => self.gen_decl(decl, bindings),
            StmtKind::Empty => {}
            StmtKind::Labeled { stmt, .. } => self.stmt(stmt, bindings),
            StmtKind::Expr(expr) => {
                self.expr(expr, bindings);
            }
            StmtKind::Send { chan, value } => {
                self.expr(chan, bindings);
                self.expr(value, bindings);
            }
            StmtKind::IncDec { expr, .. } => {
                self.expr(expr, bindings);
            }
            StmtKind::Assign { op, lhs, rhs } => {
                let rhs_tys: Vec<Option<Ty>> =
                    rhs.iter().map(|e| self.expr(e, bindings)).collect();
                if *op == AssignOp::Define {
                    for (i, target) in lhs.iter().enumerate() {
                        if let Some(ident) = target.as_ident() {
                            let inferred = rhs_tys
                                .get(i)
                                .cloned()
                                .flatten()
                                .or_else(|| match rhs_tys.first().cloned().flatten() {
                                    Some(Ty::Tuple(items)) => items.get(i).cloned(),
                                    _ => None,
                                });
                            if let Some(ty) = inferred {
                                self.oracle.types.insert(ident.id, ty.clone());
                                self.set_symbol(bindings, ident, ty);
                            }
                        }
                    }
                } else {
                    for target in lhs {
                        self.expr(target, bindings);
                    }
                }
            }
            StmtKind::Go(expr) | StmtKind::Defer(expr) => {
                self.expr(expr, bindings);
            }
            StmtKind::Return(exprs) => {
                for expr in exprs {
                    self.expr(expr, bindings);
                }
            }
            StmtKind::Branch { .. } => {}
            StmtKind::Block(block) => self.block(block, bindings),
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                if let Some(init) = init {
                    self.stmt(init, bindings);
                }
                self.expr(cond, bindings);
                self.block(then, bindings);
                if let Some(els) = els {
                    self.stmt(els, bindings);
                }
            }
            StmtKind::Switch { init, tag, cases } => {
                if let Some(init) = init {
                    self.stmt(init, bindings);
                }
                if let Some(tag) = tag {
                    self.expr(tag, bindings);
                }
                for case in cases {
                    for expr in &case.exprs {
                        self.expr(expr, bindings);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt, bindings);
                    }
                }
            }
            StmtKind::TypeSwitch {
                init,
                binding,
                subject,
                cases,
            } => {
                if let Some(init) = init {
                    self.stmt(init, bindings);
                }
                self.expr(subject, bindings);
                if let Some(binding) = binding {
                    self.set_symbol(bindings, binding, Ty::Interface);
                }
                for case in cases {
                    for expr in &case.exprs {
                        self.expr(expr, bindings);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt, bindings);
                    }
                }
            }
            StmtKind::Select { cases } => {
                for case in cases {
                    if let Some(comm) = &case.comm {
                        self.stmt(comm, bindings);
                    }
                    for stmt in &case.body {
                        self.stmt(stmt, bindings);
                    }
                }
            }
            StmtKind::For(for_stmt) => {
                match &for_stmt.head {
                    ForHead::Classic { init, cond, post } => {
                        if let Some(init) = init {
                            self.stmt(init, bindings);
                        }
                        if let Some(cond) = cond {
                            self.expr(cond, bindings);
                        }
                        if let Some(post) = post {
                            self.stmt(post, bindings);
                        }
                    }
                    ForHead::Range {
                        key,
                        value,
                        define,
                        iterable,
                    } => {
                        let iter_ty = self.expr(iterable, bindings);
                        let (key_ty, value_ty) = match iter_ty.as_ref().map(Ty::underlying) {
                            Some(Ty::Slice(elem)) | Some(Ty::Array(_, elem)) => (
                                Some(Ty::Basic(BasicKind::Int)),
                                Some((**elem).clone()),
                            ),
                            Some(Ty::Map(k, v)) => {
                                (Some((**k).clone()), Some((**v).clone()))
                            }
                            Some(Ty::Basic(BasicKind::Str)) => (
                                Some(Ty::Basic(BasicKind::Int)),
                                Some(Ty::Basic(BasicKind::Rune)),
                            ),
                            Some(Ty::Chan(elem)) => (Some((**elem).clone()), None),
                            _ => (None, None),
                        };
                        for (target, ty) in [(key, key_ty), (value, value_ty)] {
                            if let (Some(expr), Some(ty)) = (target, ty) {
                                if let Some(ident) = expr.as_ident() {
                                    self.oracle.types.insert(ident.id, ty.clone());
                                    self.oracle.types.insert(expr.id, ty.clone());
                                    if *define {
                                        self.set_symbol(bindings, ident, ty);
                                    }
                                } else {
                                    self.expr(expr, bindings);
                                }
                            }
                        }
                    }
                }
                self.block(&for_stmt.body, bindings);
            }
        }
    }

    fn expr(&mut self, expr: &Expr, bindings: &Bindings) -> Option<Ty> {
        let ty = match &expr.kind {
            ExprKind::Ident(ident) => {
                let id = bindings.of_ident(ident)?;
                match self.symbol_types.get(&id) {
                    Some(ty) => Some(ty.clone()),
                    None => match self.table.get(id).kind {
                        SymbolKind::Const if ident.name == "true" || ident.name == "false" => {
                            Some(Ty::Basic(BasicKind::Bool))
                        }
                        SymbolKind::Const if ident.name == "iota" => {
                            Some(Ty::Basic(BasicKind::Int))
                        }
                        _ => None,
                    },
                }
            }
            ExprKind::BasicLit { kind, .. } => Some(match kind {
                LitKind::Int => Ty::Basic(BasicKind::Int),
                LitKind::Float => Ty::Basic(BasicKind::Float64),
                LitKind::Imag => Ty::Basic(BasicKind::Complex128),
                LitKind::Rune => Ty::Basic(BasicKind::Rune),
                LitKind::Str => Ty::Basic(BasicKind::Str),
            }),
            ExprKind::CompositeLit { ty, elems } => {
                for elem in elems {
                    self.expr(elem, bindings);
                }
                ty.as_ref().and_then(|t| self.resolve_type(t, bindings))
            }
            ExprKind::FuncLit { sig, body } => {
                self.bind_params(&sig.params, bindings);
                self.bind_params(&sig.results, bindings);
                self.block(body, bindings);
                Some(self.func_type(sig, bindings))
            }
            ExprKind::Paren(inner) => self.expr(inner, bindings),
            ExprKind::Selector { base, sel } => {
                let base_ty = self.expr(base, bindings);
                // `pkg.Name`: an opaque foreign value or type.
                if let Some(ident) = base.as_ident() {
                    if let Some(id) = bindings.of_ident(ident) {
                        if self.table.get(id).kind == SymbolKind::Package {
                            let qualifier = self
                                .import_paths
                                .get(&ident.name)
                                .cloned()
                                .unwrap_or_else(|| ident.name.clone());
                            return Some(self.record(
                                expr.id,
                                Ty::Opaque {
                                    qualifier,
                                    name: sel.name.clone(),
                                },
                            ));
                        }
                    }
                }
                let mut target = base_ty?;
                // Field access sees through one pointer, as in Go.
                let pointee = match target.underlying() {
                    Ty::Pointer(inner) => Some((**inner).clone()),
                    _ => None,
                };
                if let Some(pointee) = pointee {
                    target = pointee;
                }
                match target.underlying() {
                    Ty::Struct(fields) => {
                        let field = fields.iter().find(|f| f.name == sel.name)?;
                        if let Some(symbol) = field.symbol {
                            self.field_bindings.push((sel.id, symbol));
                        }
                        Some(field.ty.clone())
                    }
                    _ => None,
                }
            }
            ExprKind::Index { base, index } => {
                let base_ty = self.expr(base, bindings);
                self.expr(index, bindings);
                match base_ty.as_ref().map(Ty::underlying) {
                    Some(Ty::Slice(elem)) | Some(Ty::Array(_, elem)) => Some((**elem).clone()),
                    Some(Ty::Map(_, value)) => Some((**value).clone()),
                    Some(Ty::Basic(BasicKind::Str)) => Some(Ty::Basic(BasicKind::Byte)),
                    _ => None,
                }
            }
            ExprKind::Slice { base, low, high, max } => {
                for part in [low, high, max].into_iter().flatten() {
                    self.expr(part, bindings);
                }
                let base_ty = self.expr(base, bindings)?;
                match base_ty.underlying() {
                    Ty::Slice(_) => Some(base_ty.clone()),
                    Ty::Array(_, elem) => Some(Ty::Slice(elem.clone())),
                    Ty::Basic(BasicKind::Str) => Some(Ty::Basic(BasicKind::Str)),
                    _ => None,
                }
            }
            ExprKind::TypeAssert { base, ty } => {
                self.expr(base, bindings);
                ty.as_ref().and_then(|t| self.resolve_type(t, bindings))
            }
            ExprKind::Call { fun, args, .. } => self.call(fun, args, bindings),
            ExprKind::Star(inner) => {
                let inner_ty = self.expr(inner, bindings)?;
                match inner_ty.underlying() {
                    Ty::Pointer(elem) => Some((**elem).clone()),
                    _ => None,
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.expr(operand, bindings);
                match op {
                    UnaryOp::AddrOf => operand_ty.map(|t| Ty::Pointer(Box::new(t))),
                    UnaryOp::Recv => operand_ty.and_then(|t| match t.underlying() {
                        Ty::Chan(elem) => Some((**elem).clone()),
                        _ => None,
                    }),
                    UnaryOp::Not => Some(Ty::Basic(BasicKind::Bool)),
                    _ => operand_ty,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.expr(lhs, bindings);
                let rhs_ty = self.expr(rhs, bindings);
                use BinaryOp::*;
                match op {
                    Eql | Neq | Lss | Leq | Gtr | Geq | LogicAnd | LogicOr => {
                        Some(Ty::Basic(BasicKind::Bool))
                    }
                    _ => lhs_ty.or(rhs_ty),
                }
            }
            ExprKind::KeyValue { key, value } => {
                self.expr(key, bindings);
                self.expr(value, bindings)
            }
            ExprKind::TypeLit(ty) => self.resolve_type(ty, bindings),
        };
        ty.map(|t| self.record(expr.id, t))
    }

    fn call(&mut self, fun: &Expr, args: &[Expr], bindings: &Bindings) -> Option<Ty> {
        let arg_tys: Vec<Option<Ty>> = args.iter().map(|a| self.expr(a, bindings)).collect();

        if let Some(ident) = fun.unparen().as_ident() {
            if let Some(id) = bindings.of_ident(ident) {
                match self.table.get(id).kind {
                    SymbolKind::Builtin => {
                        return match ident.name.as_str() {
                            "len" | "cap" | "copy" => Some(Ty::Basic(BasicKind::Int)),
                            "make" => arg_tys.first().cloned().flatten(),
                            "new" => arg_tys
                                .first()
                                .cloned()
                                .flatten()
                                .map(|t| Ty::Pointer(Box::new(t))),
                            "append" | "min" | "max" => arg_tys.first().cloned().flatten(),
                            "complex" => Some(Ty::Basic(BasicKind::Complex128)),
                            "real" | "imag" => Some(Ty::Basic(BasicKind::Float64)),
                            _ => None,
                        };
                    }
                    SymbolKind::BuiltinType | SymbolKind::Type => {
                        // Conversion: T(x).
                        let ty = TypeExpr {
                            kind: TypeExprKind::Named {
                                pkg: None,
                                name: ident.clone(),
                            },
                            span: fun.span,
                        };
                        return self.resolve_type(&ty, bindings);
                    }
                    _ => {}
                }
            }
        }

        let fun_ty = self.expr(fun, bindings)?;
        match fun_ty.underlying() {
            Ty::Func { results, .. } => match results.len() {
                0 => None,
                1 => Some(results[0].clone()),
                _ => Some(Ty::Tuple(results.clone())),
            },
            _ => None,
        }
    }
}

fn const_len(expr: &Expr) -> Option<u64> {
    match &expr.kind {
        ExprKind::BasicLit {
            kind: LitKind::Int,
            text,
        } => text.replace('_', "").parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resolve::{collect_package_scope, resolve_file, universe_scope};
    use crate::syntax::{parse_file, SourceFile};

    fn check(src: &str) -> (File, TypeOracle, Bindings) {
        let source = SourceFile::new("test.go", src);
        let file = parse_file(&source).unwrap();
        let mut table = SymbolTable::default();
        let universe = universe_scope(&mut table);
        let package = collect_package_scope(std::slice::from_ref(&file), &mut table);
        let mut bindings = resolve_file(&file, &mut table, &universe, &package);
        let mut imports = FxHashMap::default();
        for spec in &file.imports {
            let alias = spec
                .alias
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| {
                    spec.path.rsplit('/').next().unwrap_or(&spec.path).to_owned()
                });
            imports.insert(alias, spec.path.clone());
        }
        let oracle = check_file(&file, &table, &mut bindings, &imports);
        (file, oracle, bindings)
    }

    /// Type of the first identifier expression with the given name.
    fn ty_of_ident(file: &File, oracle: &TypeOracle, name: &str) -> Option<Ty> {
        fn find(expr: &Expr, name: &str) -> Option<NodeId> {
            match &expr.kind {
                ExprKind::Ident(ident) if ident.name == name => Some(ident.id),
                ExprKind::Index { base, index } => {
                    find(base, name).or_else(|| find(index, name))
                }
                ExprKind::Call { fun, args, .. } => find(fun, name)
                    .or_else(|| args.iter().find_map(|a| find(a, name))),
                ExprKind::Binary { lhs, rhs, .. } => {
                    find(lhs, name).or_else(|| find(rhs, name))
                }
                ExprKind::Selector { base, .. } => find(base, name),
                _ => None,
            }
        }
        fn in_stmt(stmt: &Stmt, name: &str) -> Option<NodeId> {
            match &stmt.kind {
                StmtKind::Expr(e) | StmtKind::IncDec { expr: e, .. } => find(e, name),
                StmtKind::Assign { lhs, rhs, .. } => lhs
                    .iter()
                    .chain(rhs.iter())
                    .find_map(|e| find(e, name)),
                StmtKind::Decl(decl) => decl.specs.iter().find_map(|s| match s {
                    Spec::Value { names, .. } => names
                        .iter()
                        .find(|n| n.name == name)
                        .map(|n| n.id),
                    _ => None,
                }),
                StmtKind::For(f) => f.body.stmts.iter().find_map(|s| in_stmt(s, name)),
                StmtKind::Block(b) => b.stmts.iter().find_map(|s| in_stmt(s, name)),
                _ => None,
            }
        }
        for decl in &file.decls {
            if let Decl::Func(func) = decl {
                if let Some(body) = &func.body {
                    if let Some(id) = body.stmts.iter().find_map(|s| in_stmt(s, name)) {
                        return oracle.type_of(id).cloned();
                    }
                }
            }
        }
        None
    }

    #[test]
    fn array_declaration_and_element_types() {
        let (file, oracle, _) = check(
            "package main\n\nfunc f() {\n\tvar arr [10]int\n\tarr[0] = 1\n}\n",
        );
        let ty = ty_of_ident(&file, &oracle, "arr").unwrap();
        assert_eq!(ty, Ty::Array(Some(10), Box::new(Ty::Basic(BasicKind::Int))));
        assert!(ty.is_indexable_store());
    }

    #[test]
    fn make_map_infers_map_type() {
        let (file, oracle, _) = check(
            "package main\n\nfunc f() {\n\tm := make(map[int]int)\n\tm[1] = 2\n}\n",
        );
        let ty = ty_of_ident(&file, &oracle, "m").unwrap();
        assert!(matches!(ty.underlying(), Ty::Map(..)));
        assert!(!ty.is_indexable_store());
    }

    #[test]
    fn range_over_slice_types_key_and_value() {
        let (file, oracle, _) = check(
            "package main\n\nfunc f(xs []string) {\n\tfor i, s := range xs {\n\t\tprintln(i)\n\t\tprintln(s)\n\t}\n}\n",
        );
        assert_eq!(
            ty_of_ident(&file, &oracle, "i"),
            Some(Ty::Basic(BasicKind::Int))
        );
        assert_eq!(
            ty_of_ident(&file, &oracle, "s"),
            Some(Ty::Basic(BasicKind::Str))
        );
    }

    #[test]
    fn named_struct_field_types_resolve() {
        let (file, oracle, _) = check(
            "package main\n\ntype point struct {\n\tx, y int\n}\n\nfunc f() {\n\tp := point{x: 1, y: 2}\n\tp.x = 3\n}\n",
        );
        let ty = ty_of_ident(&file, &oracle, "p").unwrap();
        assert!(matches!(ty.underlying(), Ty::Struct(_)));
        assert_eq!(ty.to_string(), "point");
    }

    #[test]
    fn imported_selector_is_opaque_with_full_path() {
        let (file, oracle, _) = check(
            "package main\n\nimport \"image/color\"\n\nfunc f() {\n\tc := color.Black\n\tprintln(c)\n}\n",
        );
        let ty = ty_of_ident(&file, &oracle, "c").unwrap();
        assert_eq!(ty.to_string(), "image/color.Black");
    }

    #[test]
    fn function_results_distribute_over_short_decl() {
        let (file, oracle, _) = check(
            "package main\n\nfunc pair() (int, string) {\n\treturn 1, \"x\"\n}\n\nfunc f() {\n\ta, b := pair()\n\tprintln(a)\n\tprintln(b)\n}\n",
        );
        assert_eq!(
            ty_of_ident(&file, &oracle, "a"),
            Some(Ty::Basic(BasicKind::Int))
        );
        assert_eq!(
            ty_of_ident(&file, &oracle, "b"),
            Some(Ty::Basic(BasicKind::Str))
        );
    }

    #[test]
    fn display_prints_go_syntax() {
        let slice_of_ptr = Ty::Slice(Box::new(Ty::Pointer(Box::new(Ty::Basic(BasicKind::Int)))));
        assert_eq!(slice_of_ptr.to_string(), "[]*int");
        let m = Ty::Map(
            Box::new(Ty::Basic(BasicKind::Str)),
            Box::new(Ty::Slice(Box::new(Ty::Basic(BasicKind::Float64)))),
        );
        assert_eq!(m.to_string(), "map[string][]float64");
    }
}
