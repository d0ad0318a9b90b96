//! Recursive-descent parser for the analyzed subset.
//!
//! The only notable deviation from a textbook expression parser is Go's
//! composite-literal ambiguity: in `if`, `for`, and `switch` headers a `{`
//! opens the statement body, not a literal, unless the expression is
//! parenthesized. The parser tracks that with an explicit header flag the
//! same way gc's parser tracks `exprLev`.

use super::ast::*;
use super::lexer::{LexError, Lexer};
use super::token::{Token, TokenKind};
use super::{SourceFile, Span};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub file: String,
    pub offset: u32,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parse one source file into an AST.
pub fn parse_file(source: &SourceFile) -> Result<File, ParseError> {
    let tokens = Lexer::new(&source.src)
        .tokenize()
        .map_err(|e: LexError| to_parse_error(source, e.offset, e.message))?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        next_id: 0,
        in_header: false,
        paren_depth: 0,
    };
    parser.file()
}

fn to_parse_error(source: &SourceFile, offset: u32, message: String) -> ParseError {
    let pos = source.position(offset);
    ParseError {
        file: source.name.clone(),
        offset,
        line: pos.line,
        column: pos.column,
        message,
    }
}

struct Parser<'a> {
    source: &'a SourceFile,
    tokens: Vec<Token>,
    pos: usize,
    next_id: u32,
    /// Inside an if/for/switch header, where `{` ends the expression.
    in_header: bool,
    /// Parentheses/brackets nesting; literals become legal again inside.
    paren_depth: u32,
}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    fn node_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId(self.next_id)
    }

    fn tok(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.tok().kind
    }

    fn kind_at(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.tok();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected {}, found {}", kind, self.kind())))
        }
    }

    fn err(&self, message: String) -> ParseError {
        to_parse_error(self.source, self.tok().span.start, message)
    }

    fn text(&self, span: Span) -> &str {
        self.source.text(span)
    }

    /// Skip over optional semicolons (blank lines, stray `;`).
    fn skip_semis(&mut self) {
        while self.eat(TokenKind::Semicolon) {}
    }

    fn end_of_stmt(&mut self) -> PResult<()> {
        if self.eat(TokenKind::Semicolon) || self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
            return Ok(());
        }
        // A `}` of an enclosing block and `)` of a one-line body are fine.
        if self.at(TokenKind::RParen) {
            return Ok(());
        }
        Err(self.err(format!("expected end of statement, found {}", self.kind())))
    }

    // ----- file level -----

    fn file(&mut self) -> PResult<File> {
        let start = self.tok().span;
        self.skip_semis();
        self.expect(TokenKind::Package)?;
        let package = self.ident()?;
        self.end_of_stmt()?;
        self.skip_semis();

        let mut imports = Vec::new();
        while self.at(TokenKind::Import) {
            self.bump();
            if self.eat(TokenKind::LParen) {
                self.skip_semis();
                while !self.at(TokenKind::RParen) {
                    imports.push(self.import_spec(true)?);
                    self.skip_semis();
                }
                self.expect(TokenKind::RParen)?;
            } else {
                imports.push(self.import_spec(false)?);
            }
            self.end_of_stmt()?;
            self.skip_semis();
        }

        let mut decls = Vec::new();
        while !self.at(TokenKind::Eof) {
            decls.push(self.top_level_decl()?);
            self.skip_semis();
        }
        let span = start.to(self.tok().span);
        Ok(File {
            package,
            imports,
            decls,
            span,
        })
    }

    fn import_spec(&mut self, factored: bool) -> PResult<ImportSpec> {
        let start = self.tok().span;
        let alias = match self.kind() {
            TokenKind::Ident => Some(self.ident()?),
            TokenKind::Period => {
                // dot import; modeled as an alias named "."
                let tok = self.bump();
                Some(Ident {
                    id: self.node_id(),
                    name: ".".to_owned(),
                    span: tok.span,
                })
            }
            _ => None,
        };
        let tok = self.expect(TokenKind::Str)?;
        let raw = self.text(tok.span);
        let path = raw.trim_matches(|c| c == '"' || c == '`').to_owned();
        Ok(ImportSpec {
            alias,
            path,
            factored,
            span: start.to(tok.span),
        })
    }

    fn top_level_decl(&mut self) -> PResult<Decl> {
        match self.kind() {
            TokenKind::Func => Ok(Decl::Func(self.func_decl()?)),
            TokenKind::Var | TokenKind::Const | TokenKind::Type => Ok(Decl::Gen(self.gen_decl()?)),
            _ => Err(self.err(format!("expected declaration, found {}", self.kind()))),
        }
    }

    fn func_decl(&mut self) -> PResult<FuncDecl> {
        let start = self.expect(TokenKind::Func)?.span;
        let receiver = if self.at(TokenKind::LParen) {
            let group = self.param_list()?;
            let mut iter = group.into_iter();
            iter.next()
        } else {
            None
        };
        let name = self.ident()?;
        let type_params = if self.at(TokenKind::LBracket) {
            Some(self.verbatim_brackets()?)
        } else {
            None
        };
        let sig = self.func_sig()?;
        let body = if self.at(TokenKind::LBrace) {
            Some(self.block()?)
        } else {
            None
        };
        let end = body
            .as_ref()
            .map(|b| b.span)
            .unwrap_or(sig.span);
        Ok(FuncDecl {
            receiver,
            name,
            type_params,
            sig,
            body,
            span: start.to(end),
        })
    }

    /// Capture a balanced bracket group verbatim (generic parameter lists).
    fn verbatim_brackets(&mut self) -> PResult<String> {
        let start = self.expect(TokenKind::LBracket)?.span;
        let mut depth = 1usize;
        let mut end = start;
        while depth > 0 {
            match self.kind() {
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => depth -= 1,
                TokenKind::Eof => return Err(self.err("unclosed '['".to_owned())),
                _ => {}
            }
            end = self.bump().span;
        }
        Ok(self.text(start.to(end)).to_owned())
    }

    fn gen_decl(&mut self) -> PResult<GenDecl> {
        let start = self.tok().span;
        let keyword = match self.bump().kind {
            TokenKind::Var => DeclKeyword::Var,
            TokenKind::Const => DeclKeyword::Const,
            TokenKind::Type => DeclKeyword::Type,
            other => return Err(self.err(format!("expected declaration keyword, found {other}"))),
        };
        let mut specs = Vec::new();
        let end;
        if self.eat(TokenKind::LParen) {
            self.skip_semis();
            while !self.at(TokenKind::RParen) {
                specs.push(self.spec(keyword)?);
                self.skip_semis();
            }
            end = self.expect(TokenKind::RParen)?.span;
        } else {
            specs.push(self.spec(keyword)?);
            end = specs.last().map(|s| spec_span(s)).unwrap_or(start);
        }
        Ok(GenDecl {
            keyword,
            specs,
            span: start.to(end),
        })
    }

    fn spec(&mut self, keyword: DeclKeyword) -> PResult<Spec> {
        if keyword == DeclKeyword::Type {
            let name = self.ident()?;
            let type_params = if self.at(TokenKind::LBracket) {
                Some(self.verbatim_brackets()?)
            } else {
                None
            };
            self.eat(TokenKind::Assign); // type alias
            let ty = self.type_expr()?;
            let span = name.span.to(ty.span);
            return Ok(Spec::Type {
                name,
                type_params,
                ty,
                span,
            });
        }
        let start = self.tok().span;
        let mut names = vec![self.ident()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.ident()?);
        }
        let ty = if self.starts_type() && !self.at(TokenKind::Assign) {
            Some(self.type_expr()?)
        } else {
            None
        };
        let mut values = Vec::new();
        if self.eat(TokenKind::Assign) {
            values.push(self.expr()?);
            while self.eat(TokenKind::Comma) {
                values.push(self.expr()?);
            }
        }
        let end = values
            .last()
            .map(|e| e.span)
            .or(ty.as_ref().map(|t| t.span))
            .unwrap_or_else(|| names.last().unwrap().span);
        Ok(Spec::Value {
            names,
            ty,
            values,
            span: start.to(end),
        })
    }

    fn ident(&mut self) -> PResult<Ident> {
        let tok = self.expect(TokenKind::Ident)?;
        Ok(Ident {
            id: self.node_id(),
            name: self.text(tok.span).to_owned(),
            span: tok.span,
        })
    }

    // ----- types -----

    fn starts_type(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Ident
                | TokenKind::Mul
                | TokenKind::LBracket
                | TokenKind::Map
                | TokenKind::Chan
                | TokenKind::Arrow
                | TokenKind::Func
                | TokenKind::Struct
                | TokenKind::Interface
                | TokenKind::LParen
        )
    }

    fn type_expr(&mut self) -> PResult<TypeExpr> {
        let start = self.tok().span;
        let kind = match self.kind() {
            TokenKind::Ident => {
                let first = self.ident()?;
                let (pkg, name) = if self.at(TokenKind::Period) && self.kind_at(1) == TokenKind::Ident
                {
                    self.bump();
                    (Some(first), self.ident()?)
                } else {
                    (None, first)
                };
                let base_span = pkg
                    .as_ref()
                    .map(|p| p.span.to(name.span))
                    .unwrap_or(name.span);
                let named = TypeExpr {
                    kind: TypeExprKind::Named { pkg, name },
                    span: base_span,
                };
                if self.at(TokenKind::LBracket) && self.kind_at(1) != TokenKind::RBracket {
                    // Generic instantiation: T[A, B]
                    self.bump();
                    let mut args = vec![self.type_expr()?];
                    while self.eat(TokenKind::Comma) {
                        args.push(self.type_expr()?);
                    }
                    let end = self.expect(TokenKind::RBracket)?.span;
                    return Ok(TypeExpr {
                        kind: TypeExprKind::Instantiate {
                            base: Box::new(named),
                            args,
                        },
                        span: start.to(end),
                    });
                }
                return Ok(named);
            }
            TokenKind::Mul => {
                self.bump();
                TypeExprKind::Pointer(Box::new(self.type_expr()?))
            }
            TokenKind::LBracket => {
                self.bump();
                if self.eat(TokenKind::RBracket) {
                    TypeExprKind::Slice(Box::new(self.type_expr()?))
                } else if self.eat(TokenKind::Ellipsis) {
                    // [...]T composite-literal length
                    self.expect(TokenKind::RBracket)?;
                    TypeExprKind::Array {
                        len: None,
                        elem: Box::new(self.type_expr()?),
                    }
                } else {
                    let len = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    TypeExprKind::Array {
                        len: Some(Box::new(len)),
                        elem: Box::new(self.type_expr()?),
                    }
                }
            }
            TokenKind::Map => {
                self.bump();
                self.expect(TokenKind::LBracket)?;
                let key = self.type_expr()?;
                self.expect(TokenKind::RBracket)?;
                let value = self.type_expr()?;
                TypeExprKind::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                }
            }
            TokenKind::Chan => {
                self.bump();
                let dir = if self.eat(TokenKind::Arrow) {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                TypeExprKind::Chan {
                    dir,
                    elem: Box::new(self.type_expr()?),
                }
            }
            TokenKind::Arrow => {
                self.bump();
                self.expect(TokenKind::Chan)?;
                TypeExprKind::Chan {
                    dir: ChanDir::Recv,
                    elem: Box::new(self.type_expr()?),
                }
            }
            TokenKind::Func => {
                self.bump();
                let sig = self.func_sig()?;
                TypeExprKind::Func(Box::new(sig))
            }
            TokenKind::Struct => {
                self.bump();
                self.expect(TokenKind::LBrace)?;
                let mut fields = Vec::new();
                self.skip_semis();
                while !self.at(TokenKind::RBrace) {
                    fields.push(self.field_def()?);
                    self.skip_semis();
                }
                self.expect(TokenKind::RBrace)?;
                TypeExprKind::Struct(fields)
            }
            TokenKind::Interface => {
                self.bump();
                self.expect(TokenKind::LBrace)?;
                let mut depth = 1usize;
                while depth > 0 {
                    match self.kind() {
                        TokenKind::LBrace => depth += 1,
                        TokenKind::RBrace => depth -= 1,
                        TokenKind::Eof => return Err(self.err("unclosed interface".to_owned())),
                        _ => {}
                    }
                    self.bump();
                }
                TypeExprKind::Interface
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.type_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            other => return Err(self.err(format!("expected type, found {other}"))),
        };
        let end = self.tokens[self.pos - 1].span;
        Ok(TypeExpr {
            kind,
            span: start.to(end),
        })
    }

    fn field_def(&mut self) -> PResult<FieldDef> {
        let start = self.tok().span;
        // Embedded field: Type [tag] followed by end of line.
        let named = self.at(TokenKind::Ident)
            && matches!(
                self.kind_at(1),
                TokenKind::Ident
                    | TokenKind::Mul
                    | TokenKind::LBracket
                    | TokenKind::Map
                    | TokenKind::Chan
                    | TokenKind::Arrow
                    | TokenKind::Func
                    | TokenKind::Struct
                    | TokenKind::Interface
                    | TokenKind::Comma
            );
        let (names, ty) = if named {
            let mut names = vec![self.ident()?];
            while self.eat(TokenKind::Comma) {
                names.push(self.ident()?);
            }
            (names, self.type_expr()?)
        } else {
            (Vec::new(), self.type_expr()?)
        };
        // Optional struct tag.
        if self.at(TokenKind::Str) {
            self.bump();
        }
        let end = self.tokens[self.pos - 1].span;
        Ok(FieldDef {
            names,
            ty,
            span: start.to(end),
        })
    }

    fn func_sig(&mut self) -> PResult<FuncSig> {
        let start = self.tok().span;
        let params = self.param_list()?;
        let results = if self.at(TokenKind::LParen) {
            self.param_list()?
        } else if self.starts_type() && !self.at(TokenKind::LParen) {
            let ty = self.type_expr()?;
            let span = ty.span;
            vec![Param {
                names: Vec::new(),
                ty,
                variadic: false,
                span,
            }]
        } else {
            Vec::new()
        };
        let end = self.tokens[self.pos - 1].span;
        Ok(FuncSig {
            params,
            results,
            span: start.to(end),
        })
    }

    /// Parse `( ... )` of parameters or results. Handles the names-vs-types
    /// ambiguity with one token of lookahead, which covers the subset:
    /// `a, b int`, `x *T`, `fmt.Stringer`, `...T`, `f func(int) int`.
    fn param_list(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        self.paren_depth += 1;
        let mut params: Vec<Param> = Vec::new();
        let mut pending: Vec<Ident> = Vec::new();
        loop {
            if self.at(TokenKind::RParen) {
                break;
            }
            let start = self.tok().span;
            if self.at(TokenKind::Ident)
                && matches!(self.kind_at(1), TokenKind::Comma | TokenKind::RParen)
            {
                // Name awaiting a shared type, or an anonymous named type;
                // decided when the group ends.
                pending.push(self.ident()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                continue;
            }
            if self.at(TokenKind::Ident)
                && !matches!(self.kind_at(1), TokenKind::Period)
                && (self.starts_type_at(1) || self.kind_at(1) == TokenKind::Ellipsis)
            {
                // `name Type` group, absorbing any pending names.
                let mut names = std::mem::take(&mut pending);
                names.push(self.ident()?);
                let variadic = self.eat(TokenKind::Ellipsis);
                let ty = self.type_expr()?;
                let span = start.to(ty.span);
                params.push(Param {
                    names,
                    ty,
                    variadic,
                    span,
                });
            } else {
                // Anonymous type; any pending identifiers were themselves
                // anonymous named types.
                for ident in pending.drain(..) {
                    params.push(anonymous_param(ident));
                }
                let variadic = self.eat(TokenKind::Ellipsis);
                let ty = self.type_expr()?;
                let span = start.to(ty.span);
                params.push(Param {
                    names: Vec::new(),
                    ty,
                    variadic,
                    span,
                });
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        for ident in pending.drain(..) {
            params.push(anonymous_param(ident));
        }
        self.expect(TokenKind::RParen)?;
        self.paren_depth -= 1;
        Ok(params)
    }

    fn starts_type_at(&self, n: usize) -> bool {
        matches!(
            self.kind_at(n),
            TokenKind::Ident
                | TokenKind::Mul
                | TokenKind::LBracket
                | TokenKind::Map
                | TokenKind::Chan
                | TokenKind::Arrow
                | TokenKind::Func
                | TokenKind::Struct
                | TokenKind::Interface
                | TokenKind::LParen
        )
    }

    // ----- statements -----

    fn block(&mut self) -> PResult<Block> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let saved_header = std::mem::replace(&mut self.in_header, false);
        let mut stmts = Vec::new();
        self.skip_semis();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            stmts.push(self.stmt()?);
            self.skip_semis();
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        self.in_header = saved_header;
        Ok(Block {
            stmts,
            span: start.to(end),
        })
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        let start = self.tok().span;
        match self.kind() {
            TokenKind::Var | TokenKind::Const | TokenKind::Type => {
                let decl = self.gen_decl()?;
                let span = decl.span;
                self.end_of_stmt()?;
                Ok(Stmt {
                    kind: StmtKind::Decl(decl),
                    span,
                })
            }
            TokenKind::LBrace => {
                let block = self.block()?;
                let span = block.span;
                Ok(Stmt {
                    kind: StmtKind::Block(block),
                    span,
                })
            }
            TokenKind::If => self.if_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Switch => self.switch_stmt(),
            TokenKind::Select => self.select_stmt(),
            TokenKind::Go => {
                self.bump();
                let call = self.expr()?;
                let span = start.to(call.span);
                self.end_of_stmt()?;
                Ok(Stmt {
                    kind: StmtKind::Go(call),
                    span,
                })
            }
            TokenKind::Defer => {
                self.bump();
                let call = self.expr()?;
                let span = start.to(call.span);
                self.end_of_stmt()?;
                Ok(Stmt {
                    kind: StmtKind::Defer(call),
                    span,
                })
            }
            TokenKind::Return => {
                self.bump();
                let mut exprs = Vec::new();
                if !self.at(TokenKind::Semicolon)
                    && !self.at(TokenKind::RBrace)
                    && !self.at(TokenKind::Eof)
                {
                    exprs.push(self.expr()?);
                    while self.eat(TokenKind::Comma) {
                        exprs.push(self.expr()?);
                    }
                }
                let span = exprs
                    .last()
                    .map(|e| start.to(e.span))
                    .unwrap_or(start);
                self.end_of_stmt()?;
                Ok(Stmt {
                    kind: StmtKind::Return(exprs),
                    span,
                })
            }
            TokenKind::Break | TokenKind::Continue | TokenKind::Goto | TokenKind::Fallthrough => {
                let kind = match self.bump().kind {
                    TokenKind::Break => BranchKind::Break,
                    TokenKind::Continue => BranchKind::Continue,
                    TokenKind::Goto => BranchKind::Goto,
                    _ => BranchKind::Fallthrough,
                };
                let label = if self.at(TokenKind::Ident) {
                    Some(self.ident()?)
                } else {
                    None
                };
                let span = label
                    .as_ref()
                    .map(|l| start.to(l.span))
                    .unwrap_or(start);
                self.end_of_stmt()?;
                Ok(Stmt {
                    kind: StmtKind::Branch { kind, label },
                    span,
                })
            }
            TokenKind::Semicolon => {
                self.bump();
                Ok(Stmt {
                    kind: StmtKind::Empty,
                    span: start,
                })
            }
            TokenKind::Ident if self.kind_at(1) == TokenKind::Colon => {
                let label = self.ident()?;
                self.expect(TokenKind::Colon)?;
                self.skip_semis();
                // A label may end a block: `end:` followed by `}`.
                if self.at(TokenKind::RBrace) {
                    let span = start.to(label.span);
                    return Ok(Stmt {
                        kind: StmtKind::Labeled {
                            label,
                            stmt: Box::new(Stmt {
                                kind: StmtKind::Empty,
                                span,
                            }),
                        },
                        span,
                    });
                }
                let stmt = self.stmt()?;
                let span = start.to(stmt.span);
                Ok(Stmt {
                    kind: StmtKind::Labeled {
                        label,
                        stmt: Box::new(stmt),
                    },
                    span,
                })
            }
            _ => {
                let stmt = self.simple_stmt()?;
                self.end_of_stmt()?;
                Ok(stmt)
            }
        }
    }

    /// Expression statement, send, inc/dec, or assignment. Shared by plain
    /// statements and the headers of if/for/switch.
    fn simple_stmt(&mut self) -> PResult<Stmt> {
        let start = self.tok().span;
        let mut lhs = vec![self.expr()?];
        while self.eat(TokenKind::Comma) {
            lhs.push(self.expr()?);
        }
        match self.kind() {
            TokenKind::Define | TokenKind::Assign => {
                let op = if self.bump().kind == TokenKind::Define {
                    AssignOp::Define
                } else {
                    AssignOp::Assign
                };
                let mut rhs = vec![self.expr()?];
                while self.eat(TokenKind::Comma) {
                    rhs.push(self.expr()?);
                }
                let span = start.to(rhs.last().unwrap().span);
                Ok(Stmt {
                    kind: StmtKind::Assign { op, lhs, rhs },
                    span,
                })
            }
            TokenKind::AddAssign
            | TokenKind::SubAssign
            | TokenKind::MulAssign
            | TokenKind::QuoAssign
            | TokenKind::RemAssign
            | TokenKind::AndAssign
            | TokenKind::OrAssign
            | TokenKind::XorAssign
            | TokenKind::ShlAssign
            | TokenKind::ShrAssign
            | TokenKind::AndNotAssign => {
                self.bump();
                let rhs = self.expr()?;
                let span = start.to(rhs.span);
                Ok(Stmt {
                    kind: StmtKind::Assign {
                        op: AssignOp::Op,
                        lhs,
                        rhs: vec![rhs],
                    },
                    span,
                })
            }
            TokenKind::Inc | TokenKind::Dec => {
                let inc = self.bump().kind == TokenKind::Inc;
                let expr = lhs.into_iter().next().unwrap();
                let span = start.to(self.tokens[self.pos - 1].span);
                Ok(Stmt {
                    kind: StmtKind::IncDec { expr, inc },
                    span,
                })
            }
            TokenKind::Arrow if lhs.len() == 1 => {
                self.bump();
                let value = self.expr()?;
                let chan = lhs.into_iter().next().unwrap();
                let span = start.to(value.span);
                Ok(Stmt {
                    kind: StmtKind::Send { chan, value },
                    span,
                })
            }
            _ => {
                let expr = lhs.into_iter().next().unwrap();
                let span = expr.span;
                Ok(Stmt {
                    kind: StmtKind::Expr(expr),
                    span,
                })
            }
        }
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::If)?.span;
        let saved = std::mem::replace(&mut self.in_header, true);
        let first = self.simple_stmt()?;
        let (init, cond) = if self.eat(TokenKind::Semicolon) {
            let cond = self.expr()?;
            (Some(Box::new(first)), cond)
        } else {
            match first.kind {
                StmtKind::Expr(expr) => (None, expr),
                _ => return Err(self.err("expected condition in if statement".to_owned())),
            }
        };
        self.in_header = saved;
        let then = self.block()?;
        let els = if self.eat(TokenKind::Else) {
            let stmt = if self.at(TokenKind::If) {
                self.if_stmt()?
            } else {
                let block = self.block()?;
                let span = block.span;
                Stmt {
                    kind: StmtKind::Block(block),
                    span,
                }
            };
            Some(Box::new(stmt))
        } else {
            None
        };
        let end = els
            .as_ref()
            .map(|s| s.span)
            .unwrap_or(then.span);
        Ok(Stmt {
            kind: StmtKind::If {
                init,
                cond,
                then,
                els,
            },
            span: start.to(end),
        })
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::For)?.span;
        let saved = std::mem::replace(&mut self.in_header, true);

        let head = if self.at(TokenKind::LBrace) {
            ForHead::Classic {
                init: None,
                cond: None,
                post: None,
            }
        } else if self.at(TokenKind::Range) {
            // `for range xs`
            self.bump();
            let iterable = self.expr()?;
            ForHead::Range {
                key: None,
                value: None,
                define: false,
                iterable,
            }
        } else {
            self.for_head()?
        };

        self.in_header = saved;
        let body = self.block()?;
        let span = start.to(body.span);
        Ok(Stmt {
            kind: StmtKind::For(Box::new(ForStmt { head, body, span })),
            span,
        })
    }

    fn for_head(&mut self) -> PResult<ForHead> {
        // `for ; cond; post { }` with an empty init clause.
        if self.eat(TokenKind::Semicolon) {
            let cond = if self.at(TokenKind::Semicolon) {
                None
            } else {
                Some(self.expr()?)
            };
            self.expect(TokenKind::Semicolon)?;
            let post = if self.at(TokenKind::LBrace) {
                None
            } else {
                Some(Box::new(self.simple_stmt()?))
            };
            return Ok(ForHead::Classic {
                init: None,
                cond,
                post,
            });
        }
        // Parse the first clause, watching for `range` after := or =.
        let mut lhs = vec![self.expr()?];
        while self.eat(TokenKind::Comma) {
            lhs.push(self.expr()?);
        }
        if matches!(self.kind(), TokenKind::Define | TokenKind::Assign)
            && self.kind_at(1) == TokenKind::Range
        {
            let define = self.bump().kind == TokenKind::Define;
            self.bump(); // range
            let iterable = self.expr()?;
            let mut iter = lhs.into_iter();
            let key = iter.next();
            let value = iter.next();
            return Ok(ForHead::Range {
                key,
                value,
                define,
                iterable,
            });
        }

        // Rewind is unnecessary: turn what we parsed into a simple stmt
        // continuation, exactly as `simple_stmt` would.
        let first = self.finish_simple_stmt(lhs)?;
        if self.at(TokenKind::LBrace) {
            // `for cond { }`
            return match first.kind {
                StmtKind::Expr(expr) => Ok(ForHead::Classic {
                    init: None,
                    cond: Some(expr),
                    post: None,
                }),
                _ => Err(self.err("expected loop condition".to_owned())),
            };
        }
        self.expect(TokenKind::Semicolon)?;
        let cond = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let post = if self.at(TokenKind::LBrace) {
            None
        } else {
            Some(Box::new(self.simple_stmt()?))
        };
        Ok(ForHead::Classic {
            init: Some(Box::new(first)),
            cond,
            post,
        })
    }

    /// The tail of `simple_stmt` once the expression list is parsed.
    fn finish_simple_stmt(&mut self, lhs: Vec<Expr>) -> PResult<Stmt> {
        let start = lhs[0].span;
        match self.kind() {
            TokenKind::Define | TokenKind::Assign => {
                let op = if self.bump().kind == TokenKind::Define {
                    AssignOp::Define
                } else {
                    AssignOp::Assign
                };
                let mut rhs = vec![self.expr()?];
                while self.eat(TokenKind::Comma) {
                    rhs.push(self.expr()?);
                }
                let span = start.to(rhs.last().unwrap().span);
                Ok(Stmt {
                    kind: StmtKind::Assign { op, lhs, rhs },
                    span,
                })
            }
            TokenKind::Inc | TokenKind::Dec => {
                let inc = self.bump().kind == TokenKind::Inc;
                let expr = lhs.into_iter().next().unwrap();
                let span = start.to(self.tokens[self.pos - 1].span);
                Ok(Stmt {
                    kind: StmtKind::IncDec { expr, inc },
                    span,
                })
            }
            _ => {
                let expr = lhs.into_iter().next().unwrap();
                let span = expr.span;
                Ok(Stmt {
                    kind: StmtKind::Expr(expr),
                    span,
                })
            }
        }
    }

    fn switch_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Switch)?.span;
        let saved = std::mem::replace(&mut self.in_header, true);
        let mut init: Option<Box<Stmt>> = None;
        let mut tag_stmt: Option<Stmt> = None;
        if !self.at(TokenKind::LBrace) {
            let first = self.simple_stmt()?;
            if self.eat(TokenKind::Semicolon) {
                init = Some(Box::new(first));
                if !self.at(TokenKind::LBrace) {
                    tag_stmt = Some(self.simple_stmt()?);
                }
            } else {
                tag_stmt = Some(first);
            }
        }
        self.in_header = saved;

        // A type switch has the form `x := y.(type)` or `y.(type)` as tag.
        let type_switch = type_switch_parts(&tag_stmt);
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        self.skip_semis();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            cases.push(self.case_clause(type_switch.is_some())?);
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        let span = start.to(end);

        if let Some((binding, subject)) = type_switch {
            return Ok(Stmt {
                kind: StmtKind::TypeSwitch {
                    init,
                    binding,
                    subject,
                    cases,
                },
                span,
            });
        }
        let tag = tag_stmt.map(|s| match s.kind {
            StmtKind::Expr(expr) => Ok(expr),
            _ => Err(()),
        });
        let tag = match tag {
            None => None,
            Some(Ok(expr)) => Some(expr),
            Some(Err(())) => return Err(self.err("expected switch tag expression".to_owned())),
        };
        Ok(Stmt {
            kind: StmtKind::Switch { init, tag, cases },
            span,
        })
    }

    fn case_clause(&mut self, type_switch: bool) -> PResult<CaseClause> {
        let start = self.tok().span;
        let mut exprs = Vec::new();
        if self.eat(TokenKind::Case) {
            if type_switch {
                // Case lists in a type switch are types; keep their spans as
                // TypeLit expressions.
                loop {
                    let ty = self.type_expr()?;
                    let span = ty.span;
                    exprs.push(Expr {
                        id: self.node_id(),
                        kind: ExprKind::TypeLit(ty),
                        span,
                    });
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            } else {
                exprs.push(self.expr()?);
                while self.eat(TokenKind::Comma) {
                    exprs.push(self.expr()?);
                }
            }
        } else {
            self.expect(TokenKind::Default)?;
        }
        self.expect(TokenKind::Colon)?;
        let mut body = Vec::new();
        self.skip_semis();
        while !matches!(
            self.kind(),
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
        ) {
            body.push(self.stmt()?);
            self.skip_semis();
        }
        let end = body.last().map(|s| s.span).unwrap_or(start);
        Ok(CaseClause {
            exprs,
            body,
            span: start.to(end),
        })
    }

    fn select_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::Select)?.span;
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        self.skip_semis();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let case_start = self.tok().span;
            let comm = if self.eat(TokenKind::Case) {
                let stmt = self.simple_stmt()?;
                Some(Box::new(stmt))
            } else {
                self.expect(TokenKind::Default)?;
                None
            };
            self.expect(TokenKind::Colon)?;
            let mut body = Vec::new();
            self.skip_semis();
            while !matches!(
                self.kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                body.push(self.stmt()?);
                self.skip_semis();
            }
            let end = body.last().map(|s| s.span).unwrap_or(case_start);
            cases.push(CommClause {
                comm,
                body,
                span: case_start.to(end),
            });
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Stmt {
            kind: StmtKind::Select { cases },
            span: start.to(end),
        })
    }

    // ----- expressions -----

    fn expr(&mut self) -> PResult<Expr> {
        self.binary_expr(1)
    }

    fn binary_expr(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.unary_expr()?;
        loop {
            let (op, prec) = match binary_op(self.kind()) {
                Some(pair) => pair,
                None => return Ok(lhs),
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            self.bump();
            let rhs = self.binary_expr(prec + 1)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                id: self.node_id(),
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
    }

    fn unary_expr(&mut self) -> PResult<Expr> {
        let start = self.tok().span;
        let op = match self.kind() {
            TokenKind::Sub => Some(UnaryOp::Neg),
            TokenKind::Add => Some(UnaryOp::Pos),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Xor => Some(UnaryOp::BitNot),
            TokenKind::And => Some(UnaryOp::AddrOf),
            TokenKind::Arrow => Some(UnaryOp::Recv),
            TokenKind::Mul => {
                self.bump();
                let operand = self.unary_expr()?;
                let span = start.to(operand.span);
                return Ok(Expr {
                    id: self.node_id(),
                    kind: ExprKind::Star(Box::new(operand)),
                    span,
                });
            }
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.unary_expr()?;
            let span = start.to(operand.span);
            return Ok(Expr {
                id: self.node_id(),
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.primary_expr()
    }

    fn primary_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.operand()?;
        loop {
            match self.kind() {
                TokenKind::Period => {
                    self.bump();
                    if self.eat(TokenKind::LParen) {
                        // Type assertion `x.(T)` or `x.(type)`.
                        let ty = if self.at(TokenKind::Type) {
                            self.bump();
                            None
                        } else {
                            Some(self.type_expr()?)
                        };
                        let end = self.expect(TokenKind::RParen)?.span;
                        let span = expr.span.to(end);
                        expr = Expr {
                            id: self.node_id(),
                            kind: ExprKind::TypeAssert {
                                base: Box::new(expr),
                                ty,
                            },
                            span,
                        };
                    } else {
                        let sel = self.ident()?;
                        let span = expr.span.to(sel.span);
                        expr = Expr {
                            id: self.node_id(),
                            kind: ExprKind::Selector {
                                base: Box::new(expr),
                                sel,
                            },
                            span,
                        };
                    }
                }
                TokenKind::LBracket => {
                    self.bump();
                    self.paren_depth += 1;
                    expr = self.index_or_slice(expr)?;
                    self.paren_depth -= 1;
                }
                TokenKind::LParen => {
                    self.bump();
                    self.paren_depth += 1;
                    let mut args = Vec::new();
                    let mut ellipsis = false;
                    if !self.at(TokenKind::RParen) {
                        loop {
                            args.push(self.call_arg()?);
                            if self.eat(TokenKind::Ellipsis) {
                                ellipsis = true;
                            }
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                            if self.at(TokenKind::RParen) {
                                break;
                            }
                        }
                    }
                    self.paren_depth -= 1;
                    let end = self.expect(TokenKind::RParen)?.span;
                    let span = expr.span.to(end);
                    expr = Expr {
                        id: self.node_id(),
                        kind: ExprKind::Call {
                            fun: Box::new(expr),
                            args,
                            ellipsis,
                        },
                        span,
                    };
                }
                TokenKind::LBrace if self.composite_ok() && type_like(&expr) => {
                    let ty = expr_to_type(&expr);
                    let (elems, end) = self.composite_body()?;
                    let span = expr.span.to(end);
                    expr = Expr {
                        id: self.node_id(),
                        kind: ExprKind::CompositeLit {
                            ty: ty.map(Box::new),
                            elems,
                        },
                        span,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Arguments may be types (`make([]int, n)`), so try a type first when
    /// the token can only start one.
    fn call_arg(&mut self) -> PResult<Expr> {
        match self.kind() {
            TokenKind::LBracket
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Struct
            | TokenKind::Interface => {
                let start = self.tok().span;
                let ty = self.type_expr()?;
                if self.at(TokenKind::LBrace) {
                    let (elems, end) = self.composite_body()?;
                    return Ok(Expr {
                        id: self.node_id(),
                        kind: ExprKind::CompositeLit {
                            ty: Some(Box::new(ty)),
                            elems,
                        },
                        span: start.to(end),
                    });
                }
                let span = ty.span;
                Ok(Expr {
                    id: self.node_id(),
                    kind: ExprKind::TypeLit(ty),
                    span,
                })
            }
            _ => self.expr(),
        }
    }

    fn index_or_slice(&mut self, base: Expr) -> PResult<Expr> {
        // Already past the '['.
        if self.at(TokenKind::Colon) {
            // a[:...]
            self.bump();
            return self.finish_slice(base, None);
        }
        let first = self.expr()?;
        if self.eat(TokenKind::Colon) {
            return self.finish_slice(base, Some(Box::new(first)));
        }
        // Generic instantiation args beyond the first are not used by the
        // analysis; consume and drop them.
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::RBracket) {
                break;
            }
            self.expr()?;
        }
        let end = self.expect(TokenKind::RBracket)?.span;
        let span = base.span.to(end);
        Ok(Expr {
            id: self.node_id(),
            kind: ExprKind::Index {
                base: Box::new(base),
                index: Box::new(first),
            },
            span,
        })
    }

    fn finish_slice(&mut self, base: Expr, low: Option<Box<Expr>>) -> PResult<Expr> {
        let high = if self.at(TokenKind::RBracket) || self.at(TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let max = if self.eat(TokenKind::Colon) {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        let end = self.expect(TokenKind::RBracket)?.span;
        let span = base.span.to(end);
        Ok(Expr {
            id: self.node_id(),
            kind: ExprKind::Slice {
                base: Box::new(base),
                low,
                high,
                max,
            },
            span,
        })
    }

    fn composite_ok(&self) -> bool {
        !self.in_header || self.paren_depth > 0
    }

    fn composite_body(&mut self) -> PResult<(Vec<Expr>, Span)> {
        self.expect(TokenKind::LBrace)?;
        self.paren_depth += 1;
        let mut elems = Vec::new();
        self.skip_semis();
        while !self.at(TokenKind::RBrace) {
            let elem = self.composite_elem()?;
            elems.push(elem);
            if !self.eat(TokenKind::Comma) {
                self.skip_semis();
                break;
            }
            self.skip_semis();
        }
        self.paren_depth -= 1;
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok((elems, end))
    }

    fn composite_elem(&mut self) -> PResult<Expr> {
        let start = self.tok().span;
        let value = if self.at(TokenKind::LBrace) {
            // Nested literal with elided type.
            let (elems, end) = self.composite_body()?;
            Expr {
                id: self.node_id(),
                kind: ExprKind::CompositeLit { ty: None, elems },
                span: start.to(end),
            }
        } else {
            self.expr()?
        };
        if self.eat(TokenKind::Colon) {
            let val = if self.at(TokenKind::LBrace) {
                let vstart = self.tok().span;
                let (elems, end) = self.composite_body()?;
                Expr {
                    id: self.node_id(),
                    kind: ExprKind::CompositeLit { ty: None, elems },
                    span: vstart.to(end),
                }
            } else {
                self.expr()?
            };
            let span = start.to(val.span);
            return Ok(Expr {
                id: self.node_id(),
                kind: ExprKind::KeyValue {
                    key: Box::new(value),
                    value: Box::new(val),
                },
                span,
            });
        }
        Ok(value)
    }

    fn operand(&mut self) -> PResult<Expr> {
        let start = self.tok().span;
        match self.kind() {
            TokenKind::Ident => {
                let ident = self.ident()?;
                let span = ident.span;
                Ok(Expr {
                    id: self.node_id(),
                    kind: ExprKind::Ident(ident),
                    span,
                })
            }
            TokenKind::Int | TokenKind::Float | TokenKind::Imag | TokenKind::Rune
            | TokenKind::Str => {
                let tok = self.bump();
                let kind = match tok.kind {
                    TokenKind::Int => LitKind::Int,
                    TokenKind::Float => LitKind::Float,
                    TokenKind::Imag => LitKind::Imag,
                    TokenKind::Rune => LitKind::Rune,
                    _ => LitKind::Str,
                };
                Ok(Expr {
                    id: self.node_id(),
                    kind: ExprKind::BasicLit {
                        kind,
                        text: self.text(tok.span).to_owned(),
                    },
                    span: tok.span,
                })
            }
            TokenKind::LParen => {
                self.bump();
                self.paren_depth += 1;
                let inner = self.expr()?;
                self.paren_depth -= 1;
                let end = self.expect(TokenKind::RParen)?.span;
                Ok(Expr {
                    id: self.node_id(),
                    kind: ExprKind::Paren(Box::new(inner)),
                    span: start.to(end),
                })
            }
            TokenKind::Func => {
                self.bump();
                let sig = self.func_sig()?;
                if self.at(TokenKind::LBrace) {
                    let body = self.block()?;
                    let span = start.to(body.span);
                    Ok(Expr {
                        id: self.node_id(),
                        kind: ExprKind::FuncLit { sig, body },
                        span,
                    })
                } else {
                    let span = start.to(sig.span);
                    Ok(Expr {
                        id: self.node_id(),
                        kind: ExprKind::TypeLit(TypeExpr {
                            kind: TypeExprKind::Func(Box::new(sig)),
                            span,
                        }),
                        span,
                    })
                }
            }
            TokenKind::LBracket
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Struct
            | TokenKind::Interface => {
                let ty = self.type_expr()?;
                if self.at(TokenKind::LBrace) {
                    let (elems, end) = self.composite_body()?;
                    let span = start.to(end);
                    Ok(Expr {
                        id: self.node_id(),
                        kind: ExprKind::CompositeLit {
                            ty: Some(Box::new(ty)),
                            elems,
                        },
                        span,
                    })
                } else {
                    let span = ty.span;
                    Ok(Expr {
                        id: self.node_id(),
                        kind: ExprKind::TypeLit(ty),
                        span,
                    })
                }
            }
            other => Err(self.err(format!("expected expression, found {other}"))),
        }
    }
}

fn anonymous_param(ident: Ident) -> Param {
    let span = ident.span;
    Param {
        names: Vec::new(),
        ty: TypeExpr {
            kind: TypeExprKind::Named {
                pkg: None,
                name: ident,
            },
            span,
        },
        variadic: false,
        span,
    }
}

fn spec_span(spec: &Spec) -> Span {
    match spec {
        Spec::Value { span, .. } | Spec::Type { span, .. } => *span,
    }
}

fn binary_op(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    use TokenKind::*;
    Some(match kind {
        LogicOr => (BinaryOp::LogicOr, 1),
        LogicAnd => (BinaryOp::LogicAnd, 2),
        Eql => (BinaryOp::Eql, 3),
        Neq => (BinaryOp::Neq, 3),
        Lss => (BinaryOp::Lss, 3),
        Leq => (BinaryOp::Leq, 3),
        Gtr => (BinaryOp::Gtr, 3),
        Geq => (BinaryOp::Geq, 3),
        Add => (BinaryOp::Add, 4),
        Sub => (BinaryOp::Sub, 4),
        Or => (BinaryOp::Or, 4),
        Xor => (BinaryOp::Xor, 4),
        Mul => (BinaryOp::Mul, 5),
        Quo => (BinaryOp::Quo, 5),
        Rem => (BinaryOp::Rem, 5),
        Shl => (BinaryOp::Shl, 5),
        Shr => (BinaryOp::Shr, 5),
        And => (BinaryOp::And, 5),
        AndNot => (BinaryOp::AndNot, 5),
        _ => return None,
    })
}

/// Whether an expression can be the type part of a composite literal.
fn type_like(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Selector { base, .. } => matches!(base.kind, ExprKind::Ident(_)),
        ExprKind::Index { base, .. } => type_like(base),
        _ => false,
    }
}

/// Reinterpret a type-like expression as the literal's type.
fn expr_to_type(expr: &Expr) -> Option<TypeExpr> {
    match &expr.kind {
        ExprKind::Ident(ident) => Some(TypeExpr {
            kind: TypeExprKind::Named {
                pkg: None,
                name: ident.clone(),
            },
            span: expr.span,
        }),
        ExprKind::Selector { base, sel } => base.as_ident().map(|pkg| TypeExpr {
            kind: TypeExprKind::Named {
                pkg: Some(pkg.clone()),
                name: sel.clone(),
            },
            span: expr.span,
        }),
        ExprKind::Index { base, .. } => expr_to_type(base),
        _ => None,
    }
}

/// Recognize `x := y.(type)` or `y.(type)` switch tags.
fn type_switch_parts(tag: &Option<Stmt>) -> Option<(Option<Ident>, Expr)> {
    let stmt = tag.as_ref()?;
    match &stmt.kind {
        StmtKind::Expr(expr) => match &expr.kind {
            ExprKind::TypeAssert { ty: None, .. } => Some((None, expr.clone())),
            _ => None,
        },
        StmtKind::Assign {
            op: AssignOp::Define,
            lhs,
            rhs,
        } if lhs.len() == 1 && rhs.len() == 1 => match &rhs[0].kind {
            ExprKind::TypeAssert { ty: None, .. } => {
                let binding = lhs[0].as_ident().cloned();
                Some((binding, rhs[0].clone()))
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;

    fn parse(src: &str) -> File {
        let file = SourceFile::new("test.go", src);
        parse_file(&file).unwrap()
    }

    fn func_body(file: &File, index: usize) -> &Block {
        match &file.decls[index] {
            Decl::Func(f) => f.body.as_ref().unwrap(),
            other => panic!("expected func decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_classic_for() {
        let file = parse(
            "package main\n\nfunc f() {\n\tfor i := 0; i < 10; i++ {\n\t\tprintln(i)\n\t}\n}\n",
        );
        let body = func_body(&file, 0);
        let for_stmt = match &body.stmts[0].kind {
            StmtKind::For(f) => f,
            other => panic!("expected for, got {other:?}"),
        };
        match &for_stmt.head {
            ForHead::Classic { init, cond, post } => {
                assert!(init.is_some());
                assert!(cond.is_some());
                assert!(post.is_some());
            }
            other => panic!("expected classic head, got {other:?}"),
        }
    }

    #[test]
    fn parses_range_forms() {
        let file = parse(
            "package main\n\nfunc f(xs []int, m map[string]int) {\n\
             \tfor i, v := range xs {\n\t\tprintln(i, v)\n\t}\n\
             \tfor k := range m {\n\t\tprintln(k)\n\t}\n\
             \tfor range xs {\n\t}\n}\n",
        );
        let body = func_body(&file, 0);
        let heads: Vec<_> = body
            .stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::For(f) => &f.head,
                other => panic!("expected for, got {other:?}"),
            })
            .collect();
        assert_matches!(
            heads[0],
            ForHead::Range {
                key: Some(_),
                value: Some(_),
                define: true,
                ..
            }
        );
        assert_matches!(
            heads[1],
            ForHead::Range {
                key: Some(_),
                value: None,
                ..
            }
        );
        assert_matches!(
            heads[2],
            ForHead::Range {
                key: None,
                value: None,
                ..
            }
        );
    }

    #[test]
    fn header_brace_is_not_a_composite_literal() {
        // `p` must parse as the condition, with the brace opening the body.
        let file = parse("package main\n\ntype p struct{}\n\nfunc f(c bool) {\n\tif c {\n\t}\n\tfor c {\n\t}\n}\n");
        let body = func_body(&file, 1);
        assert!(matches!(body.stmts[0].kind, StmtKind::If { .. }));
        assert!(matches!(body.stmts[1].kind, StmtKind::For(_)));
    }

    #[test]
    fn parses_goroutine_with_func_lit() {
        let file = parse(
            "package main\n\nfunc f() {\n\tgo func(i int) {\n\t\tprintln(i)\n\t}(3)\n}\n",
        );
        let body = func_body(&file, 0);
        match &body.stmts[0].kind {
            StmtKind::Go(call) => match &call.kind {
                ExprKind::Call { fun, args, .. } => {
                    assert!(matches!(fun.kind, ExprKind::FuncLit { .. }));
                    assert_eq!(args.len(), 1);
                }
                other => panic!("expected call, got {other:?}"),
            },
            other => panic!("expected go stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_labels_and_branches() {
        let file = parse(
            "package main\n\nfunc f() {\nouter:\n\tfor {\n\t\tfor {\n\t\t\tbreak outer\n\t\t}\n\t\tgoto done\n\t}\ndone:\n}\n",
        );
        let body = func_body(&file, 0);
        assert!(matches!(
            body.stmts[0].kind,
            StmtKind::Labeled { .. }
        ));
    }

    #[test]
    fn parses_switch_and_type_switch() {
        let file = parse(
            "package main\n\nfunc f(x interface{}, n int) {\n\
             \tswitch n {\n\tcase 1, 2:\n\t\tprintln(n)\n\tdefault:\n\t}\n\
             \tswitch v := x.(type) {\n\tcase int:\n\t\tprintln(v)\n\t}\n}\n",
        );
        let body = func_body(&file, 0);
        assert!(matches!(body.stmts[0].kind, StmtKind::Switch { .. }));
        assert!(matches!(
            body.stmts[1].kind,
            StmtKind::TypeSwitch {
                binding: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn parses_composite_literals_and_make() {
        let file = parse(
            "package main\n\nfunc f() {\n\tm := make(map[int]int, 8)\n\tg := point{x: 1, y: 2}\n\txs := [][]int{{1}, {2, 3}}\n\t_ = m\n\t_ = g\n\t_ = xs\n}\n\ntype point struct {\n\tx, y int\n}\n",
        );
        let body = func_body(&file, 0);
        assert_eq!(body.stmts.len(), 6);
    }

    #[test]
    fn parses_var_decl_with_array_type() {
        let file = parse("package main\n\nfunc f() {\n\tvar arr [10]int\n\tarr[0] = 1\n}\n");
        let body = func_body(&file, 0);
        match &body.stmts[0].kind {
            StmtKind::Decl(decl) => assert_eq!(decl.keyword, DeclKeyword::Var),
            other => panic!("expected decl, got {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        let file = SourceFile::new("bad.go", "package main\n\nfunc f() { ??? }\n");
        assert!(parse_file(&file).is_err());
    }

    #[test]
    fn import_offsets() {
        let file = parse("package main\n\nimport (\n\t\"fmt\"\n\t\"sync\"\n)\n");
        assert!(file.imports_path("sync"));
        assert_eq!(file.imports.len(), 2);
        let off = file.import_insert_offset();
        assert!(off > 0);
    }
}
