//! Syntax tree consumed by the compiler.
//!
//! Every node carries the [`Position`] of its first token and renders its
//! textual form through `Display`.

use std::fmt;

use crate::{
    op::{BinOp, UnaryOp},
    token::Position,
};

mod parser;

pub use parser::{Parser, parse_program};

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Template(Vec<TemplateSegment>),
    Ident(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Set(Vec<Expr>),
    Func(Box<FuncLit>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        object: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
    },
    Attr {
        object: Box<Expr>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `a | f | g(x)`: each stage receives the previous value as its first argument.
    Pipe(Vec<Expr>),
    If(Box<IfExpr>),
    Switch(Box<SwitchExpr>),
    /// `range e` outside a `for` header: an iterator over `e`.
    Range(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncLit {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub cond: Expr,
    pub then: Block,
    pub otherwise: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchExpr {
    pub value: Expr,
    pub cases: Vec<Case>,
}

/// One `case a, b:` arm; an empty `exprs` list marks `default:`.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub exprs: Vec<Expr>,
    pub body: Block,
    pub pos: Position,
}

impl Case {
    pub fn is_default(&self) -> bool {
        self.exprs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    pub fn binop(self) -> Option<BinOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    Index { object: Expr, index: Expr },
    Attr { object: Expr, name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `x := e`, `var x = e`, or `a, b := e` when `names.len() > 1`.
    Declare {
        names: Vec<String>,
        value: Expr,
    },
    Const {
        name: String,
        value: Expr,
    },
    Assign {
        target: AssignTarget,
        op: AssignOp,
        value: Expr,
    },
    /// `a, b = e`
    MultiAssign {
        names: Vec<String>,
        value: Expr,
    },
    /// `x++` / `x--`
    Postfix {
        name: String,
        increment: bool,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Func(Box<FuncLit>),
    Import {
        path: String,
        alias: Option<String>,
    },
    FromImport {
        path: Vec<String>,
        names: Vec<ImportName>,
    },
    Go(Expr),
    Defer(Expr),
    Send {
        channel: Expr,
        value: Expr,
    },
    For(Box<ForStmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForStmt {
    /// `for {}`, `for cond {}`, `for init; cond; post {}`
    Loop {
        init: Option<Stmt>,
        cond: Option<Expr>,
        post: Option<Stmt>,
        body: Block,
    },
    /// `for k, v := range e {}`; `names` holds zero to two bindings.
    Range { names: Vec<String>, iterable: Expr, body: Block },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }

    /// Literal values usable as parameter defaults.
    pub fn is_literal(&self) -> bool {
        match &self.kind {
            ExprKind::Nil | ExprKind::Bool(_) | ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Str(_) => true,
            ExprKind::List(items) | ExprKind::Set(items) => items.iter().all(Expr::is_literal),
            ExprKind::Map(entries) => entries.iter().all(|(k, v)| k.is_literal() && v.is_literal()),
            ExprKind::Unary { op: UnaryOp::Neg, operand } => {
                matches!(operand.kind, ExprKind::Int(_) | ExprKind::Float(_))
            }
            _ => false,
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Nil => write!(f, "nil"),
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Int(i) => write!(f, "{i}"),
            ExprKind::Float(x) => write!(f, "{x:?}"),
            ExprKind::Str(s) => write!(f, "{s:?}"),
            ExprKind::Template(parts) => {
                write!(f, "`")?;
                for part in parts {
                    match part {
                        TemplateSegment::Text(t) => write!(f, "{t}")?,
                        TemplateSegment::Expr(e) => write!(f, "{{{e}}}")?,
                    }
                }
                write!(f, "`")
            }
            ExprKind::Ident(name) => write!(f, "{name}"),
            ExprKind::List(items) => {
                write!(f, "[")?;
                write_list(f, items)?;
                write!(f, "]")
            }
            ExprKind::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            ExprKind::Set(items) => {
                write!(f, "{{")?;
                write_list(f, items)?;
                write!(f, "}}")
            }
            ExprKind::Func(func) => write!(f, "{func}"),
            ExprKind::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Index { object, index } => write!(f, "{object}[{index}]"),
            ExprKind::Slice { object, low, high } => {
                write!(f, "{object}[")?;
                if let Some(low) = low {
                    write!(f, "{low}")?;
                }
                write!(f, ":")?;
                if let Some(high) = high {
                    write!(f, "{high}")?;
                }
                write!(f, "]")
            }
            ExprKind::Attr { object, name } => write!(f, "{object}.{name}"),
            ExprKind::Unary { op, operand } => write!(f, "{op}{operand}"),
            ExprKind::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            ExprKind::Ternary { cond, then, otherwise } => write!(f, "({cond} ? {then} : {otherwise})"),
            ExprKind::Pipe(stages) => {
                for (i, stage) in stages.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{stage}")?;
                }
                Ok(())
            }
            ExprKind::If(if_expr) => {
                write!(f, "if {} {}", if_expr.cond, if_expr.then)?;
                if let Some(otherwise) = &if_expr.otherwise {
                    write!(f, " else {otherwise}")?;
                }
                Ok(())
            }
            ExprKind::Switch(switch) => {
                write!(f, "switch {} {{", switch.value)?;
                for case in &switch.cases {
                    if case.is_default() {
                        write!(f, " default:")?;
                    } else {
                        write!(f, " case ")?;
                        write_list(f, &case.exprs)?;
                        write!(f, ":")?;
                    }
                    for stmt in &case.body.stmts {
                        write!(f, " {stmt};")?;
                    }
                }
                write!(f, " }}")
            }
            ExprKind::Range(e) => write!(f, "range {e}"),
        }
    }
}

impl fmt::Display for FuncLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func")?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p.name)?;
            if let Some(default) = &p.default {
                write!(f, "={default}")?;
            }
        }
        write!(f, ") {}", self.body)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stmts.is_empty() {
            return write!(f, "{{}}");
        }
        write!(f, "{{ ")?;
        for (i, stmt) in self.stmts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{stmt}")?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for AssignTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignTarget::Name(name) => write!(f, "{name}"),
            AssignTarget::Index { object, index } => write!(f, "{object}[{index}]"),
            AssignTarget::Attr { object, name } => write!(f, "{object}.{name}"),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Expr(e) => write!(f, "{e}"),
            StmtKind::Declare { names, value } => {
                write_list(f, names)?;
                write!(f, " := {value}")
            }
            StmtKind::Const { name, value } => write!(f, "const {name} = {value}"),
            StmtKind::Assign { target, op, value } => write!(f, "{target} {op} {value}"),
            StmtKind::MultiAssign { names, value } => {
                write_list(f, names)?;
                write!(f, " = {value}")
            }
            StmtKind::Postfix { name, increment } => {
                write!(f, "{name}{}", if *increment { "++" } else { "--" })
            }
            StmtKind::Return(Some(e)) => write!(f, "return {e}"),
            StmtKind::Return(None) => write!(f, "return"),
            StmtKind::Break => write!(f, "break"),
            StmtKind::Continue => write!(f, "continue"),
            StmtKind::Func(func) => write!(f, "{func}"),
            StmtKind::Import { path, alias } => {
                write!(f, "import {path}")?;
                if let Some(alias) = alias {
                    write!(f, " as {alias}")?;
                }
                Ok(())
            }
            StmtKind::FromImport { path, names } => {
                write!(f, "from {} import ", path.join("."))?;
                for (i, n) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", n.name)?;
                    if let Some(alias) = &n.alias {
                        write!(f, " as {alias}")?;
                    }
                }
                Ok(())
            }
            StmtKind::Go(e) => write!(f, "go {e}"),
            StmtKind::Defer(e) => write!(f, "defer {e}"),
            StmtKind::Send { channel, value } => write!(f, "{channel} <- {value}"),
            StmtKind::For(for_stmt) => match for_stmt.as_ref() {
                ForStmt::Loop {
                    init: None,
                    cond,
                    post: None,
                    body,
                } => match cond {
                    Some(cond) => write!(f, "for {cond} {body}"),
                    None => write!(f, "for {body}"),
                },
                ForStmt::Loop { init, cond, post, body } => {
                    write!(f, "for ")?;
                    if let Some(init) = init {
                        write!(f, "{init}")?;
                    }
                    write!(f, "; ")?;
                    if let Some(cond) = cond {
                        write!(f, "{cond}")?;
                    }
                    write!(f, "; ")?;
                    if let Some(post) = post {
                        write!(f, "{post}")?;
                    }
                    write!(f, " {body}")
                }
                ForStmt::Range { names, iterable, body } => {
                    write!(f, "for ")?;
                    if !names.is_empty() {
                        write_list(f, names)?;
                        write!(f, " := ")?;
                    }
                    write!(f, "range {iterable} {body}")
                }
            },
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.stmts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}
