use crate::{
    ast::{
        AssignOp, AssignTarget, Block, Case, Expr, ExprKind, ForStmt, FuncLit, IfExpr, ImportName, Param, Program,
        Stmt, StmtKind, SwitchExpr, TemplateSegment,
    },
    op::{BinOp, UnaryOp},
    token::{ParseError, Position, Span, TemplatePart, Token, Tokenizer},
};

type PResult<T> = std::result::Result<T, ParseError>;

/// Tokenize and parse a whole program.
pub fn parse_program(src: &str) -> PResult<Program> {
    let (tokens, spans) = Tokenizer::tokenize_with_spans(src)?;
    Parser::new(&tokens, &spans).parse_program()
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    spans: &'a [Span],
    pos: usize,
    len: usize,
    /// Set while parsing a `for`/`if`/`switch` header, where `{` opens the body.
    no_brace_literal: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], spans: &'a [Span]) -> Self {
        Self {
            tokens,
            spans,
            pos: 0,
            len: tokens.len(),
            no_brace_literal: false,
        }
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut stmts = Vec::new();
        loop {
            self.skip_semis();
            if self.eof() {
                break;
            }
            stmts.push(self.parse_stmt()?);
            self.end_stmt()?;
        }
        Ok(Program { stmts })
    }

    /// Parse a single expression that must span all tokens.
    pub fn parse_expr_only(&mut self) -> PResult<Expr> {
        let expr = self.parse_expr()?;
        self.skip_semis();
        if !self.eof() {
            return Err(self.err("unexpected tokens at end of expression"));
        }
        Ok(expr)
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.position();
        let kind = match self.peek() {
            Some(Token::Var) => {
                self.pos += 1;
                let name = self.expect_ident()?;
                self.expect(&Token::Assign)?;
                let value = self.parse_expr()?;
                StmtKind::Declare {
                    names: vec![name],
                    value,
                }
            }
            Some(Token::Const) => {
                self.pos += 1;
                let name = self.expect_ident()?;
                self.expect(&Token::Assign)?;
                let value = self.parse_expr()?;
                StmtKind::Const { name, value }
            }
            Some(Token::Func) if matches!(self.peek_at(1), Some(Token::Ident(_))) => {
                self.pos += 1;
                let func = self.parse_func_rest(true)?;
                StmtKind::Func(Box::new(func))
            }
            Some(Token::Return) => {
                self.pos += 1;
                if self.at_stmt_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expr()?))
                }
            }
            Some(Token::Break) => {
                self.pos += 1;
                StmtKind::Break
            }
            Some(Token::Continue) => {
                self.pos += 1;
                StmtKind::Continue
            }
            Some(Token::Import) => {
                self.pos += 1;
                let path = self.parse_module_path()?.join("/");
                let alias = if self.consume(&Token::As) {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                StmtKind::Import { path, alias }
            }
            Some(Token::From) => {
                self.pos += 1;
                let path = self.parse_module_path()?;
                self.expect(&Token::Import)?;
                let names = self.parse_import_names()?;
                StmtKind::FromImport { path, names }
            }
            Some(Token::Go) => {
                self.pos += 1;
                StmtKind::Go(self.parse_call_operand("go")?)
            }
            Some(Token::Defer) => {
                self.pos += 1;
                StmtKind::Defer(self.parse_call_operand("defer")?)
            }
            Some(Token::For) => {
                self.pos += 1;
                StmtKind::For(Box::new(self.parse_for()?))
            }
            _ => return self.parse_simple_stmt(),
        };
        Ok(Stmt::new(kind, pos))
    }

    /// Expression statements, declarations, assignments, `x++` and sends.
    fn parse_simple_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.position();
        let expr = self.parse_expr()?;
        let kind = match self.peek() {
            Some(Token::Comma) => {
                let mut names = vec![Self::ident_of(&expr)?];
                while self.consume(&Token::Comma) {
                    names.push(self.expect_ident()?);
                }
                if self.consume(&Token::Declare) {
                    StmtKind::Declare {
                        names,
                        value: self.parse_expr()?,
                    }
                } else if self.consume(&Token::Assign) {
                    StmtKind::MultiAssign {
                        names,
                        value: self.parse_expr()?,
                    }
                } else {
                    return Err(self.err("expected := or = after name list"));
                }
            }
            Some(Token::Declare) => {
                let name = Self::ident_of(&expr)?;
                self.pos += 1;
                StmtKind::Declare {
                    names: vec![name],
                    value: self.parse_expr()?,
                }
            }
            Some(tok @ (Token::Assign | Token::AddAssign | Token::SubAssign | Token::MulAssign | Token::DivAssign)) => {
                let op = match tok {
                    Token::AddAssign => AssignOp::Add,
                    Token::SubAssign => AssignOp::Sub,
                    Token::MulAssign => AssignOp::Mul,
                    Token::DivAssign => AssignOp::Div,
                    _ => AssignOp::Set,
                };
                self.pos += 1;
                let target = Self::assign_target(expr)?;
                StmtKind::Assign {
                    target,
                    op,
                    value: self.parse_expr()?,
                }
            }
            Some(tok @ (Token::Incr | Token::Decr)) => {
                let increment = *tok == Token::Incr;
                let name = Self::ident_of(&expr)?;
                self.pos += 1;
                StmtKind::Postfix { name, increment }
            }
            Some(Token::Arrow) => {
                self.pos += 1;
                StmtKind::Send {
                    channel: expr,
                    value: self.parse_expr()?,
                }
            }
            _ => StmtKind::Expr(expr),
        };
        Ok(Stmt::new(kind, pos))
    }

    fn ident_of(expr: &Expr) -> PResult<String> {
        match &expr.kind {
            ExprKind::Ident(name) => Ok(name.clone()),
            _ => Err(ParseError::with_position(
                format!("expected a name, found {expr}"),
                expr.pos,
            )),
        }
    }

    fn assign_target(expr: Expr) -> PResult<AssignTarget> {
        let pos = expr.pos;
        match expr.kind {
            ExprKind::Ident(name) => Ok(AssignTarget::Name(name)),
            ExprKind::Index { object, index } => Ok(AssignTarget::Index {
                object: *object,
                index: *index,
            }),
            ExprKind::Attr { object, name } => Ok(AssignTarget::Attr { object: *object, name }),
            other => Err(ParseError::with_position(
                format!("cannot assign to {}", Expr::new(other, pos)),
                pos,
            )),
        }
    }

    fn parse_call_operand(&mut self, keyword: &str) -> PResult<Expr> {
        let expr = self.parse_expr()?;
        if !matches!(expr.kind, ExprKind::Call { .. }) {
            return Err(ParseError::with_position(
                format!("expression in {keyword} must be a function call"),
                expr.pos,
            ));
        }
        Ok(expr)
    }

    fn parse_module_path(&mut self) -> PResult<Vec<String>> {
        if let Some(Token::Str(s)) = self.peek() {
            let path = s.split(['/', '.']).map(str::to_string).collect();
            self.pos += 1;
            return Ok(path);
        }
        let mut parts = vec![self.expect_ident()?];
        while self.consume(&Token::Dot) || self.consume(&Token::Div) {
            parts.push(self.expect_ident()?);
        }
        Ok(parts)
    }

    fn parse_import_names(&mut self) -> PResult<Vec<ImportName>> {
        let grouped = self.consume(&Token::LParen);
        let mut names = Vec::new();
        loop {
            if grouped && self.check(&Token::RParen) {
                break;
            }
            let name = self.expect_ident()?;
            let alias = if self.consume(&Token::As) {
                Some(self.expect_ident()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        if grouped {
            self.expect(&Token::RParen)?;
        }
        if names.is_empty() {
            return Err(self.err("expected at least one name to import"));
        }
        Ok(names)
    }

    fn parse_for(&mut self) -> PResult<ForStmt> {
        let saved = std::mem::replace(&mut self.no_brace_literal, true);
        let header = self.parse_for_header();
        self.no_brace_literal = saved;
        let header = header?;
        let body = self.parse_block()?;
        Ok(match header {
            ForHeader::Range { names, iterable } => ForStmt::Range { names, iterable, body },
            ForHeader::Loop { init, cond, post } => ForStmt::Loop { init, cond, post, body },
        })
    }

    fn parse_for_header(&mut self) -> PResult<ForHeader> {
        if self.check(&Token::LBrace) {
            return Ok(ForHeader::Loop {
                init: None,
                cond: None,
                post: None,
            });
        }
        if self.consume(&Token::Range) {
            let iterable = self.parse_range_iterable()?;
            return Ok(ForHeader::Range {
                names: Vec::new(),
                iterable,
            });
        }
        // `k, v := range e` / `k := e`
        if let Some(names) = self.try_range_names() {
            let ranged = self.consume(&Token::Range);
            let iterable = if ranged {
                self.parse_range_iterable()?
            } else {
                self.parse_expr()?
            };
            if ranged || self.check(&Token::LBrace) {
                if names.len() > 2 {
                    return Err(self.err("range loops bind at most two names"));
                }
                return Ok(ForHeader::Range { names, iterable });
            }
            if names.len() != 1 {
                return Err(self.err("expected range after name list"));
            }
            let pos = iterable.pos;
            let init = Stmt::new(StmtKind::Declare { names, value: iterable }, pos);
            return self.parse_for_clauses(Some(init));
        }
        if self.check(&Token::Semicolon) {
            return self.parse_for_clauses(None);
        }
        let first = self.parse_simple_stmt()?;
        if self.check(&Token::Semicolon) {
            return self.parse_for_clauses(Some(first));
        }
        match first.kind {
            StmtKind::Expr(cond) => Ok(ForHeader::Loop {
                init: None,
                cond: Some(cond),
                post: None,
            }),
            _ => Err(ParseError::with_position("expected loop condition", first.pos)),
        }
    }

    /// Consumes `a, b :=` when present.
    fn try_range_names(&mut self) -> Option<Vec<String>> {
        let start = self.pos;
        let mut names = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(name)) => {
                    names.push(name.clone());
                    self.pos += 1;
                }
                _ => break,
            }
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        if !names.is_empty() && self.consume(&Token::Declare) {
            Some(names)
        } else {
            self.pos = start;
            None
        }
    }

    fn parse_for_clauses(&mut self, init: Option<Stmt>) -> PResult<ForHeader> {
        self.expect(&Token::Semicolon)?;
        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semicolon)?;
        let post = if self.check(&Token::LBrace) {
            None
        } else {
            Some(self.parse_simple_stmt()?)
        };
        Ok(ForHeader::Loop { init, cond, post })
    }

    fn parse_block(&mut self) -> PResult<Block> {
        let pos = self.position();
        self.expect(&Token::LBrace)?;
        let saved = std::mem::replace(&mut self.no_brace_literal, false);
        let stmts = self.parse_stmts_until(|t| matches!(t, Token::RBrace));
        self.no_brace_literal = saved;
        let stmts = stmts?;
        self.expect(&Token::RBrace)?;
        Ok(Block { stmts, pos })
    }

    fn parse_stmts_until(&mut self, stop: impl Fn(&Token) -> bool) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_semis();
            match self.peek() {
                None => return Err(self.err("unexpected end of input, expected }")),
                Some(t) if stop(t) => return Ok(stmts),
                _ => {}
            }
            stmts.push(self.parse_stmt()?);
            if !self.peek().is_some_and(&stop) {
                self.end_stmt()?;
            }
        }
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_ternary()
    }

    /// `cond ? a : b`
    fn parse_ternary(&mut self) -> PResult<Expr> {
        let cond = self.parse_pipe()?;
        if !self.consume(&Token::Question) {
            return Ok(cond);
        }
        let then = self.parse_ternary()?;
        self.expect(&Token::Colon)?;
        let otherwise = self.parse_ternary()?;
        let pos = cond.pos;
        Ok(Expr::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            pos,
        ))
    }

    /// `a | f | g(x)`
    fn parse_pipe(&mut self) -> PResult<Expr> {
        let first = self.parse_binary(1)?;
        if !self.check(&Token::Pipe) {
            return Ok(first);
        }
        let pos = first.pos;
        let mut stages = vec![first];
        while self.consume(&Token::Pipe) {
            stages.push(self.parse_binary(1)?);
        }
        Ok(Expr::new(ExprKind::Pipe(stages), pos))
    }

    fn binop_at(&self) -> Option<(BinOp, usize)> {
        let op = match self.peek()? {
            Token::Or => BinOp::Or,
            Token::And => BinOp::And,
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Gt => BinOp::Gt,
            Token::Lt => BinOp::Lt,
            Token::Ge => BinOp::Ge,
            Token::Le => BinOp::Le,
            Token::In => BinOp::In,
            Token::NotKw if self.peek_at(1) == Some(&Token::In) => return Some((BinOp::NotIn, 2)),
            Token::Add => BinOp::Add,
            Token::Sub => BinOp::Sub,
            Token::Caret => BinOp::BitXor,
            Token::Mul => BinOp::Mul,
            Token::Div => BinOp::Div,
            Token::Mod => BinOp::Mod,
            Token::Shl => BinOp::Shl,
            Token::Shr => BinOp::Shr,
            Token::Amp => BinOp::BitAnd,
            Token::Pow => BinOp::Pow,
            _ => return None,
        };
        Some((op, 1))
    }

    /// Precedence climbing over the infix operators.
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, width)) = self.binop_at() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.pos += width;
            let next_min = if op.is_right_assoc() { prec } else { prec + 1 };
            let rhs = self.parse_binary(next_min)?;
            let pos = lhs.pos;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.position();
        let op = match self.peek() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Sub) => UnaryOp::Neg,
            Some(Token::Arrow) => UnaryOp::Receive,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        // fold `-<number>` so literal defaults stay literals
        if op == UnaryOp::Neg {
            match operand.kind {
                ExprKind::Int(i) => return Ok(Expr::new(ExprKind::Int(i.wrapping_neg()), pos)),
                ExprKind::Float(x) => return Ok(Expr::new(ExprKind::Float(-x), pos)),
                _ => {}
            }
        }
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        ))
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = self.position();
            match self.peek() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.parse_expr_list(&Token::RParen)?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        pos,
                    );
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    expr = self.parse_index_or_slice(expr, pos)?;
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = self.expect_ident()?;
                    expr = Expr::new(
                        ExprKind::Attr {
                            object: Box::new(expr),
                            name,
                        },
                        pos,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_index_or_slice(&mut self, object: Expr, pos: Position) -> PResult<Expr> {
        let saved = std::mem::replace(&mut self.no_brace_literal, false);
        let result = self.parse_index_inner(object, pos);
        self.no_brace_literal = saved;
        result
    }

    fn parse_index_inner(&mut self, object: Expr, pos: Position) -> PResult<Expr> {
        let low = if self.check(&Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if self.consume(&Token::Colon) {
            let high = if self.check(&Token::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            self.expect(&Token::RBracket)?;
            return Ok(Expr::new(
                ExprKind::Slice {
                    object: Box::new(object),
                    low,
                    high,
                },
                pos,
            ));
        }
        self.expect(&Token::RBracket)?;
        let index = low.ok_or_else(|| self.err("expected index expression"))?;
        Ok(Expr::new(
            ExprKind::Index {
                object: Box::new(object),
                index,
            },
            pos,
        ))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let pos = self.position();
        let Some(tok) = self.peek() else {
            return Err(self.err("unexpected end of input"));
        };
        let kind = match tok {
            Token::Nil => ExprKind::Nil,
            Token::Bool(b) => ExprKind::Bool(*b),
            Token::Int(i) => ExprKind::Int(*i),
            Token::Float(x) => ExprKind::Float(*x),
            Token::Str(s) => ExprKind::Str(s.clone()),
            Token::Ident(name) => ExprKind::Ident(name.clone()),
            Token::Template(parts) => {
                let parts = parts.clone();
                self.pos += 1;
                return Ok(Expr::new(ExprKind::Template(Self::parse_template(&parts)?), pos));
            }
            Token::LParen => {
                self.pos += 1;
                let saved = std::mem::replace(&mut self.no_brace_literal, false);
                let inner = self.parse_expr();
                self.no_brace_literal = saved;
                let inner = inner?;
                self.expect(&Token::RParen)?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.pos += 1;
                let items = self.parse_expr_list(&Token::RBracket)?;
                return Ok(Expr::new(ExprKind::List(items), pos));
            }
            Token::LBrace if !self.no_brace_literal => {
                self.pos += 1;
                return self.parse_map_or_set(pos);
            }
            Token::Func => {
                self.pos += 1;
                let func = self.parse_func_rest(false)?;
                return Ok(Expr::new(ExprKind::Func(Box::new(func)), pos));
            }
            Token::If => {
                self.pos += 1;
                return self.parse_if(pos);
            }
            Token::Switch => {
                self.pos += 1;
                return self.parse_switch(pos);
            }
            Token::Range => {
                self.pos += 1;
                let target = self.parse_unary()?;
                return Ok(Expr::new(ExprKind::Range(Box::new(target)), pos));
            }
            other => return Err(self.err(&format!("unexpected token {other}"))),
        };
        self.pos += 1;
        Ok(Expr::new(kind, pos))
    }

    fn parse_template(parts: &[TemplatePart]) -> PResult<Vec<TemplateSegment>> {
        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Text(text) => segments.push(TemplateSegment::Text(text.clone())),
                TemplatePart::Expr(src, origin) => {
                    let (tokens, spans) = Tokenizer::tokenize_at(src, *origin)?;
                    if tokens.iter().all(|t| *t == Token::Semicolon) {
                        return Err(ParseError::with_position("empty template expression", *origin));
                    }
                    let expr = Parser::new(&tokens, &spans).parse_expr_only()?;
                    segments.push(TemplateSegment::Expr(expr));
                }
            }
        }
        Ok(segments)
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn parse_expr_list(&mut self, close: &Token) -> PResult<Vec<Expr>> {
        let saved = std::mem::replace(&mut self.no_brace_literal, false);
        let result = self.parse_expr_list_inner(close);
        self.no_brace_literal = saved;
        result
    }

    fn parse_expr_list_inner(&mut self, close: &Token) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            self.skip_semis();
            if self.consume(close) {
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            self.skip_semis();
            if !self.consume(&Token::Comma) {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }

    fn parse_map_or_set(&mut self, pos: Position) -> PResult<Expr> {
        let saved = std::mem::replace(&mut self.no_brace_literal, false);
        let result = self.parse_map_or_set_inner(pos);
        self.no_brace_literal = saved;
        result
    }

    fn parse_map_or_set_inner(&mut self, pos: Position) -> PResult<Expr> {
        self.skip_semis();
        if self.consume(&Token::RBrace) {
            return Ok(Expr::new(ExprKind::Map(Vec::new()), pos));
        }
        let first = self.parse_expr()?;
        self.skip_semis();
        if self.consume(&Token::Colon) {
            let value = self.parse_expr()?;
            let mut entries = vec![(first, value)];
            loop {
                self.skip_semis();
                if !self.consume(&Token::Comma) {
                    break;
                }
                self.skip_semis();
                if self.check(&Token::RBrace) {
                    break;
                }
                let key = self.parse_expr()?;
                self.expect(&Token::Colon)?;
                entries.push((key, self.parse_expr()?));
            }
            self.expect(&Token::RBrace)?;
            return Ok(Expr::new(ExprKind::Map(entries), pos));
        }
        let mut items = vec![first];
        loop {
            self.skip_semis();
            if !self.consume(&Token::Comma) {
                break;
            }
            self.skip_semis();
            if self.check(&Token::RBrace) {
                break;
            }
            items.push(self.parse_expr()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::new(ExprKind::Set(items), pos))
    }

    /// Parses after the `func` keyword.
    fn parse_func_rest(&mut self, require_name: bool) -> PResult<FuncLit> {
        let name = match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            _ if require_name => return Err(self.err("expected function name")),
            _ => None,
        };
        self.expect(&Token::LParen)?;
        let mut params: Vec<Param> = Vec::new();
        while !self.consume(&Token::RParen) {
            let name = self.expect_ident()?;
            if params.iter().any(|p| p.name == name) {
                return Err(self.err(&format!("duplicate parameter {name}")));
            }
            let default = if self.consume(&Token::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.consume(&Token::Comma) {
                self.expect(&Token::RParen)?;
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(FuncLit { name, params, body })
    }

    fn parse_if(&mut self, pos: Position) -> PResult<Expr> {
        let cond = self.parse_header_expr()?;
        let then = self.parse_block()?;
        // `}` newline `else` would otherwise end the statement
        if self.check(&Token::Semicolon) && self.peek_at(1) == Some(&Token::Else) {
            self.pos += 1;
        }
        let otherwise = if self.consume(&Token::Else) {
            if self.check(&Token::If) {
                let else_pos = self.position();
                self.pos += 1;
                let nested = self.parse_if(else_pos)?;
                Some(Block {
                    stmts: vec![Stmt::new(StmtKind::Expr(nested), else_pos)],
                    pos: else_pos,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::If(Box::new(IfExpr { cond, then, otherwise })),
            pos,
        ))
    }

    fn parse_switch(&mut self, pos: Position) -> PResult<Expr> {
        let value = self.parse_header_expr()?;
        self.expect(&Token::LBrace)?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        loop {
            self.skip_semis();
            if self.consume(&Token::RBrace) {
                break;
            }
            let case_pos = self.position();
            let exprs = if self.consume(&Token::Default) {
                if seen_default {
                    return Err(self.err("multiple default cases in switch"));
                }
                seen_default = true;
                Vec::new()
            } else {
                self.expect(&Token::Case)?;
                let mut exprs = vec![self.parse_expr()?];
                while self.consume(&Token::Comma) {
                    exprs.push(self.parse_expr()?);
                }
                exprs
            };
            self.expect(&Token::Colon)?;
            let saved = std::mem::replace(&mut self.no_brace_literal, false);
            let stmts = self.parse_stmts_until(|t| matches!(t, Token::Case | Token::Default | Token::RBrace));
            self.no_brace_literal = saved;
            cases.push(Case {
                exprs,
                body: Block {
                    stmts: stmts?,
                    pos: case_pos,
                },
                pos: case_pos,
            });
        }
        Ok(Expr::new(
            ExprKind::Switch(Box::new(SwitchExpr { value, cases })),
            pos,
        ))
    }

    /// A `{` straight after `range` can only open a literal, never the body.
    fn parse_range_iterable(&mut self) -> PResult<Expr> {
        let literal = self.check(&Token::LBrace);
        let saved = std::mem::replace(&mut self.no_brace_literal, !literal);
        let result = self.parse_expr();
        self.no_brace_literal = saved;
        result
    }

    fn parse_header_expr(&mut self) -> PResult<Expr> {
        let saved = std::mem::replace(&mut self.no_brace_literal, true);
        let result = self.parse_expr();
        self.no_brace_literal = saved;
        result
    }

    // ---- token helpers ----

    fn eof(&self) -> bool {
        self.pos >= self.len
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn check(&self, tok: &Token) -> bool {
        self.peek() == Some(tok)
    }

    fn consume(&mut self, tok: &Token) -> bool {
        if self.check(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> PResult<()> {
        if self.consume(tok) {
            return Ok(());
        }
        let found = match self.peek() {
            Some(t) => t.to_string(),
            None => "end of input".to_string(),
        };
        Err(self.err(&format!("expected {tok}, found {found}")))
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            Some(other) => Err(self.err(&format!("expected identifier, found {other}"))),
            None => Err(self.err("expected identifier, found end of input")),
        }
    }

    fn skip_semis(&mut self) {
        while self.check(&Token::Semicolon) {
            self.pos += 1;
        }
    }

    fn at_stmt_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Semicolon) | Some(Token::RBrace))
    }

    fn end_stmt(&mut self) -> PResult<()> {
        if self.consume(&Token::Semicolon) || self.eof() || self.check(&Token::RBrace) {
            return Ok(());
        }
        let found = self.peek().map(|t| t.to_string()).unwrap_or_default();
        Err(self.err(&format!("unexpected {found} after statement")))
    }

    fn position(&self) -> Position {
        if let Some(span) = self.spans.get(self.pos) {
            return span.start;
        }
        self.spans.last().map(|s| s.end).unwrap_or_default()
    }

    fn err(&self, msg: &str) -> ParseError {
        ParseError::with_position(msg, self.position())
    }
}

enum ForHeader {
    Loop {
        init: Option<Stmt>,
        cond: Option<Expr>,
        post: Option<Stmt>,
    },
    Range {
        names: Vec<String>,
        iterable: Expr,
    },
}
