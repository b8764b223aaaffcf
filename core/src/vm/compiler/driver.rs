use std::sync::Arc;

use anyhow::Result;

use crate::ast::{Expr, ExprKind, FuncLit, Program, Stmt, StmtKind, parse_program};
use crate::error::VmError;
use crate::op::UnaryOp;
use crate::token::Position;
use crate::vm::{Code, Constant, FunctionTemplate, Op};

use super::builder::FunctionBuilder;
use super::compile_err;
use super::symbols::{Capture, Scope, Symbol, SymbolTable};

/// Lowers programs into code units. One compiler owns one main unit; calling
/// [`Compiler::compile`] again appends to it, keeping every global declared so
/// far at the same index.
pub struct Compiler {
    pub(super) symbols: SymbolTable,
    main: FunctionBuilder,
    nested: Vec<FunctionBuilder>,
}

impl Compiler {
    pub fn new<I, S>(global_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self::with_name("main", global_names)
    }

    pub fn with_name<I, S>(name: &str, global_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            symbols: SymbolTable::new(global_names),
            main: FunctionBuilder::new(name),
            nested: Vec::new(),
        }
    }

    /// Global layout of the main unit so far.
    pub fn global_names(&self) -> &[Arc<str>] {
        self.symbols.global_names()
    }

    /// Compile `program` onto the end of the main unit and return the whole
    /// unit. The new statements start right after the previous `Halt`. On
    /// failure the compiler is left as it was before the call.
    pub fn compile(&mut self, program: &Program) -> Result<Arc<Code>> {
        let saved_code = self.main.code.clone();
        let saved_symbols = self.symbols.clone();
        match self.compile_main(program) {
            Ok(()) => Ok(Arc::new(self.main.code.clone())),
            Err(e) => {
                self.main.code = saved_code;
                self.main.loops.clear();
                self.nested.clear();
                self.symbols = saved_symbols;
                Err(e)
            }
        }
    }

    fn compile_main(&mut self, program: &Program) -> Result<()> {
        self.stmts_value(&program.stmts)?;
        self.emit(Op::Halt);
        self.main.code.locals_count = self.symbols.locals_count();
        self.main.code.global_names = self.symbols.global_names().to_vec();
        tracing::trace!(
            unit = %self.main.code.name,
            instructions = self.main.len(),
            globals = self.main.code.global_names.len(),
            "compiled program"
        );
        Ok(())
    }

    #[inline]
    pub(super) fn b(&mut self) -> &mut FunctionBuilder {
        match self.nested.last_mut() {
            Some(b) => b,
            None => &mut self.main,
        }
    }

    #[inline]
    pub(super) fn emit(&mut self, op: Op) -> usize {
        self.b().emit(op)
    }

    pub(super) fn set_pos(&mut self, pos: Position) {
        if pos.is_known() {
            self.b().pos = pos;
        }
    }

    pub(super) fn load_symbol(&mut self, symbol: Symbol) {
        let op = match symbol.scope {
            Scope::Global => Op::LoadGlobal(symbol.index),
            Scope::Local => Op::LoadFast(symbol.index),
            Scope::Free => Op::LoadFree(symbol.index),
        };
        self.emit(op);
    }

    pub(super) fn store_symbol(&mut self, symbol: Symbol) {
        let op = match symbol.scope {
            Scope::Global => Op::StoreGlobal(symbol.index),
            Scope::Local => Op::StoreFast(symbol.index),
            Scope::Free => Op::StoreFree(symbol.index),
        };
        self.emit(op);
    }

    pub(super) fn resolve(&mut self, name: &str, pos: Position) -> Result<Symbol> {
        self.symbols
            .resolve(name)
            .ok_or_else(|| compile_err(pos, format!("undefined variable \"{name}\"")))
    }

    pub(super) fn resolve_assignable(&mut self, name: &str, pos: Position) -> Result<Symbol> {
        let symbol = self.resolve(name, pos)?;
        if symbol.is_const {
            return Err(compile_err(pos, format!("cannot assign to constant \"{name}\"")));
        }
        Ok(symbol)
    }

    pub(super) fn declare(&mut self, name: &str, is_const: bool, pos: Position) -> Result<Symbol> {
        self.symbols
            .declare(name, is_const)
            .ok_or_else(|| compile_err(pos, format!("cannot redeclare constant \"{name}\"")))
    }

    /// Compile statements leaving exactly one value: the last expression
    /// statement's value, or nil.
    pub(super) fn stmts_value(&mut self, stmts: &[Stmt]) -> Result<()> {
        match stmts.split_last() {
            Some((last, init)) => {
                for stmt in init {
                    self.stmt(stmt)?;
                }
                match &last.kind {
                    StmtKind::Expr(e) => {
                        self.set_pos(last.pos);
                        self.expr(e)?;
                    }
                    _ => {
                        self.stmt(last)?;
                        self.emit(Op::Nil);
                    }
                }
            }
            None => {
                self.emit(Op::Nil);
            }
        }
        Ok(())
    }

    /// Compile a function literal and push the resulting function value.
    pub(super) fn func(&mut self, lit: &FuncLit, pos: Position) -> Result<()> {
        if lit.params.len() > u8::MAX as usize {
            return Err(compile_err(pos, "function exceeded parameter limit of 255"));
        }
        let mut defaults = Vec::with_capacity(lit.params.len());
        for param in &lit.params {
            let default = param.default.as_ref().map(literal_constant).transpose()?;
            if default.is_none() && defaults.iter().any(Option::is_some) {
                return Err(compile_err(
                    pos,
                    format!("parameter \"{}\" without a default follows one with a default", param.name),
                ));
            }
            defaults.push(default);
        }

        let unit_name = lit.name.as_deref().unwrap_or("<anonymous>");
        self.symbols.push_func();
        self.nested.push(FunctionBuilder::new(unit_name));
        self.set_pos(pos);
        for param in &lit.params {
            self.symbols.declare_local(&param.name, false);
        }
        if let Some(name) = &lit.name {
            self.symbols.declare_local(name, true);
        }
        let body = self.stmts_value(&lit.body.stmts);
        if body.is_ok() && !self.b().ends_with_return() {
            self.emit(Op::ReturnValue);
        }
        let layout = self.symbols.pop_func();
        let builder = self.nested.pop();
        body?;
        let Some(mut builder) = builder else {
            return Err(compile_err(pos, "function builder stack underflow"));
        };
        builder.code.locals_count = layout.locals_count;
        builder.code.is_named = lit.name.is_some();

        let template = FunctionTemplate {
            name: lit.name.as_deref().map(Arc::from),
            params: lit.params.iter().map(|p| Arc::from(p.name.as_str())).collect(),
            defaults,
            free_count: layout.captures.len(),
            code: Arc::new(builder.code),
        };
        let idx = self.b().constant(Constant::Function(Arc::new(template)))?;
        if layout.captures.is_empty() {
            self.emit(Op::LoadConst(idx));
            return Ok(());
        }
        for capture in &layout.captures {
            match *capture {
                Capture::Local(i) => self.emit(Op::MakeCell(i)),
                Capture::Free(i) => self.emit(Op::CaptureFree(i)),
            };
        }
        self.emit(Op::LoadClosure {
            func: idx,
            free: layout.captures.len() as u16,
        });
        Ok(())
    }
}

/// Parameter defaults are restricted to literals and stored as constants.
fn literal_constant(expr: &Expr) -> Result<Constant> {
    let c = match &expr.kind {
        ExprKind::Nil => Constant::Nil,
        ExprKind::Bool(b) => Constant::Bool(*b),
        ExprKind::Int(i) => Constant::Int(*i),
        ExprKind::Float(f) => Constant::Float(*f),
        ExprKind::Str(s) => Constant::Str(Arc::from(s.as_str())),
        ExprKind::List(items) => Constant::List(items.iter().map(literal_constant).collect::<Result<_>>()?),
        ExprKind::Set(items) => Constant::Set(items.iter().map(literal_constant).collect::<Result<_>>()?),
        ExprKind::Map(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let ExprKind::Str(key) = &k.kind else {
                    return Err(compile_err(k.pos, format!("map key must be a string literal (got {k})")));
                };
                pairs.push((Arc::from(key.as_str()), literal_constant(v)?));
            }
            Constant::Map(pairs)
        }
        ExprKind::Unary { op: UnaryOp::Neg, operand } => match operand.kind {
            ExprKind::Int(i) => Constant::Int(i.wrapping_neg()),
            ExprKind::Float(f) => Constant::Float(-f),
            _ => return Err(compile_err(expr.pos, format!("unsupported default value (got {expr})"))),
        },
        _ => return Err(compile_err(expr.pos, format!("unsupported default value (got {expr})"))),
    };
    Ok(c)
}

/// Compile a whole program against a fixed set of host global names.
pub fn compile(program: &Program, global_names: &[Arc<str>]) -> Result<Arc<Code>> {
    Compiler::new(global_names.iter().cloned()).compile(program)
}

/// Parse and compile `source` as a unit called `name`.
pub fn compile_source(source: &str, name: &str, global_names: &[Arc<str>]) -> Result<Arc<Code>> {
    let program = parse_program(source).map_err(|e| anyhow::Error::new(VmError::from(e)))?;
    Compiler::with_name(name, global_names.iter().cloned()).compile(&program)
}
