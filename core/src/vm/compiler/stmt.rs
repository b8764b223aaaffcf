use anyhow::Result;

use crate::ast::{AssignOp, AssignTarget, Block, Expr, ExprKind, ForStmt, Stmt, StmtKind};
use crate::op::BinaryOpType;
use crate::token::Position;
use crate::vm::{Constant, Op};

use super::builder::LoopCtx;
use super::compile_err;
use super::driver::Compiler;
use super::expr::operand_count;

impl Compiler {
    pub(super) fn stmt(&mut self, s: &Stmt) -> Result<()> {
        self.set_pos(s.pos);
        let pos = s.pos;
        match &s.kind {
            StmtKind::Expr(e) => {
                self.expr(e)?;
                self.emit(Op::PopTop);
            }
            StmtKind::Declare { names, value } => {
                self.expr(value)?;
                self.set_pos(pos);
                if let [name] = names.as_slice() {
                    let symbol = self.declare(name, false, pos)?;
                    self.store_symbol(symbol);
                } else {
                    self.emit(Op::Unpack(operand_count(names.len(), "names", pos)?));
                    let mut symbols = Vec::with_capacity(names.len());
                    for name in names {
                        symbols.push(self.declare(name, false, pos)?);
                    }
                    for symbol in symbols.into_iter().rev() {
                        self.store_symbol(symbol);
                    }
                }
            }
            StmtKind::Const { name, value } => {
                self.expr(value)?;
                let symbol = self.declare(name, true, pos)?;
                self.store_symbol(symbol);
            }
            StmtKind::Assign { target, op, value } => self.assign(target, *op, value, pos)?,
            StmtKind::MultiAssign { names, value } => {
                let mut symbols = Vec::with_capacity(names.len());
                for name in names {
                    symbols.push(self.resolve_assignable(name, pos)?);
                }
                self.expr(value)?;
                self.set_pos(pos);
                self.emit(Op::Unpack(operand_count(names.len(), "names", pos)?));
                for symbol in symbols.into_iter().rev() {
                    self.store_symbol(symbol);
                }
            }
            StmtKind::Postfix { name, increment } => {
                let symbol = self.resolve_assignable(name, pos)?;
                self.load_symbol(symbol);
                self.load_constant(Constant::Int(1))?;
                self.emit(Op::BinaryOp(if *increment {
                    BinaryOpType::Add
                } else {
                    BinaryOpType::Sub
                }));
                self.store_symbol(symbol);
            }
            StmtKind::Return(value) => {
                if self.symbols.in_main() {
                    return Err(compile_err(pos, "return outside of a function"));
                }
                match value {
                    Some(e) => self.expr(e)?,
                    None => {
                        self.emit(Op::Nil);
                    }
                }
                self.set_pos(pos);
                self.emit(Op::ReturnValue);
            }
            StmtKind::Break => {
                if self.b().loops.is_empty() {
                    return Err(compile_err(pos, "break outside of a loop"));
                }
                let at = self.emit(Op::JumpForward(0));
                if let Some(ctx) = self.b().loops.last_mut() {
                    ctx.breaks.push(at);
                }
            }
            StmtKind::Continue => {
                let Some(target) = self.b().loops.last().map(|ctx| ctx.continue_target) else {
                    return Err(compile_err(pos, "continue outside of a loop"));
                };
                match target {
                    Some(target) => {
                        self.b().jump_back(target)?;
                    }
                    None => {
                        let at = self.emit(Op::JumpForward(0));
                        if let Some(ctx) = self.b().loops.last_mut() {
                            ctx.continues.push(at);
                        }
                    }
                }
            }
            StmtKind::Func(lit) => {
                let Some(name) = &lit.name else {
                    return Err(compile_err(pos, "function declaration requires a name"));
                };
                let symbol = self.declare(name, true, pos)?;
                self.func(lit, pos)?;
                self.store_symbol(symbol);
            }
            StmtKind::Import { path, alias } => {
                let idx = self.b().str_constant(path)?;
                self.emit(Op::Import(idx));
                let binding = alias
                    .as_deref()
                    .unwrap_or_else(|| path.rsplit(['.', '/']).next().unwrap_or(path));
                let symbol = self.declare(binding, false, pos)?;
                self.store_symbol(symbol);
            }
            StmtKind::FromImport { path, names } => {
                let path_idx = self.b().str_constant(&path.join("."))?;
                for import in names {
                    let name_idx = self.b().name(&import.name)?;
                    self.emit(Op::FromImport {
                        path: path_idx,
                        name: name_idx,
                    });
                    let symbol = self.declare(import.binding(), false, pos)?;
                    self.store_symbol(symbol);
                }
            }
            StmtKind::Go(call) => {
                self.partial(call, "go", pos)?;
                self.emit(Op::Go);
            }
            StmtKind::Defer(call) => {
                self.partial(call, "defer", pos)?;
                self.emit(Op::Defer);
            }
            StmtKind::Send { channel, value } => {
                self.expr(channel)?;
                self.expr(value)?;
                self.set_pos(pos);
                self.emit(Op::Send);
            }
            StmtKind::For(for_stmt) => match for_stmt.as_ref() {
                ForStmt::Loop { init, cond, post, body } => {
                    self.for_loop(init.as_ref(), cond.as_ref(), post.as_ref(), body)?
                }
                ForStmt::Range { names, iterable, body } => self.range_loop(names, iterable, body, pos)?,
            },
        }
        Ok(())
    }

    fn assign(&mut self, target: &AssignTarget, op: AssignOp, value: &Expr, pos: Position) -> Result<()> {
        let bin = op.binop().and_then(|b| b.binary_type());
        match target {
            AssignTarget::Name(name) => {
                let symbol = self.resolve_assignable(name, pos)?;
                if let Some(bin) = bin {
                    self.load_symbol(symbol);
                    self.expr(value)?;
                    self.set_pos(pos);
                    self.emit(Op::BinaryOp(bin));
                } else {
                    self.expr(value)?;
                    self.set_pos(pos);
                }
                self.store_symbol(symbol);
            }
            AssignTarget::Index { object, index } => {
                self.expr(object)?;
                self.expr(index)?;
                if let Some(bin) = bin {
                    self.emit(Op::Copy(1));
                    self.emit(Op::Copy(1));
                    self.set_pos(pos);
                    self.emit(Op::BinarySubscr);
                    self.expr(value)?;
                    self.set_pos(pos);
                    self.emit(Op::BinaryOp(bin));
                } else {
                    self.expr(value)?;
                }
                self.set_pos(pos);
                self.emit(Op::StoreSubscr);
            }
            AssignTarget::Attr { object, name } => {
                let idx = self.b().name(name)?;
                self.expr(object)?;
                if let Some(bin) = bin {
                    self.emit(Op::Copy(0));
                    self.set_pos(pos);
                    self.emit(Op::LoadAttr(idx));
                    self.expr(value)?;
                    self.set_pos(pos);
                    self.emit(Op::BinaryOp(bin));
                } else {
                    self.expr(value)?;
                }
                self.set_pos(pos);
                self.emit(Op::StoreAttr(idx));
            }
        }
        Ok(())
    }

    /// Push a partial binding the callee and arguments of `call` without calling it.
    fn partial(&mut self, call: &Expr, keyword: &str, pos: Position) -> Result<()> {
        let ExprKind::Call { callee, args } = &call.kind else {
            return Err(compile_err(pos, format!("{keyword} requires a function call (got {call})")));
        };
        self.expr(callee)?;
        for arg in args {
            self.expr(arg)?;
        }
        let argc = operand_count(args.len(), "arguments", pos)?;
        self.set_pos(pos);
        self.emit(Op::Partial(argc));
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result<()> {
        self.symbols.push_block();
        let mut result = Ok(());
        for stmt in &block.stmts {
            result = self.stmt(stmt);
            if result.is_err() {
                break;
            }
        }
        self.symbols.pop_block();
        result
    }

    fn for_loop(&mut self, init: Option<&Stmt>, cond: Option<&Expr>, post: Option<&Stmt>, body: &Block) -> Result<()> {
        self.symbols.push_block();
        let result = self.for_loop_inner(init, cond, post, body);
        self.symbols.pop_block();
        result
    }

    fn for_loop_inner(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        post: Option<&Stmt>,
        body: &Block,
    ) -> Result<()> {
        if let Some(init) = init {
            self.stmt(init)?;
        }
        let top = self.b().len();
        let exit = match cond {
            Some(cond) => {
                self.expr(cond)?;
                Some(self.emit(Op::PopJumpForwardIfFalse(0)))
            }
            None => None,
        };
        self.b().loops.push(LoopCtx::default());
        self.block(body)?;

        let continues = self
            .b()
            .loops
            .last_mut()
            .map(|ctx| std::mem::take(&mut ctx.continues))
            .unwrap_or_default();
        for at in continues {
            self.b().patch_jump(at)?;
        }
        if let Some(post) = post {
            self.stmt(post)?;
        }
        self.b().jump_back(top)?;
        if let Some(exit) = exit {
            self.b().patch_jump(exit)?;
        }
        self.finish_loop()
    }

    /// Pops the loop context and points its breaks at the next instruction.
    fn finish_loop(&mut self) -> Result<()> {
        let ctx = self.b().loops.pop().unwrap_or_default();
        for at in ctx.breaks {
            self.b().patch_jump(at)?;
        }
        Ok(())
    }

    /// The iterator stays on the stack for the whole loop and is popped at exit.
    fn range_loop(&mut self, names: &[String], iterable: &Expr, body: &Block, pos: Position) -> Result<()> {
        if names.len() > 2 {
            return Err(compile_err(pos, "range loops bind at most two names"));
        }
        self.expr(iterable)?;
        self.set_pos(pos);
        self.emit(Op::GetIter);
        self.symbols.push_block();
        let result = self.range_loop_inner(names, body, pos);
        self.symbols.pop_block();
        result
    }

    fn range_loop_inner(&mut self, names: &[String], body: &Block, pos: Position) -> Result<()> {
        let top = self.b().len();
        let advance = self.emit(Op::ForIter {
            jump: 0,
            names: names.len() as u8,
        });
        // The key is pushed last, so it is stored first.
        for name in names {
            let symbol = self.declare(name, false, pos)?;
            self.store_symbol(symbol);
        }
        self.b().loops.push(LoopCtx {
            continue_target: Some(top),
            ..Default::default()
        });
        self.block(body)?;
        self.b().jump_back(top)?;
        self.b().patch_jump(advance)?;
        self.finish_loop()?;
        self.emit(Op::PopTop);
        Ok(())
    }
}
