use std::sync::Arc;

use anyhow::Result;

use crate::ast::{Expr, ExprKind, IfExpr, Stmt, SwitchExpr, TemplateSegment};
use crate::op::{BinOp, BinaryOpType, CompareOpType, UnaryOp};
use crate::token::Position;
use crate::vm::{Constant, Op};

use super::compile_err;
use super::driver::Compiler;

pub(super) fn operand_count(n: usize, what: &str, pos: Position) -> Result<u16> {
    u16::try_from(n).map_err(|_| compile_err(pos, format!("too many {what} ({n})")))
}

impl Compiler {
    pub(super) fn load_constant(&mut self, c: Constant) -> Result<()> {
        let idx = self.b().constant(c)?;
        self.emit(Op::LoadConst(idx));
        Ok(())
    }

    pub(super) fn expr(&mut self, e: &Expr) -> Result<()> {
        self.set_pos(e.pos);
        match &e.kind {
            ExprKind::Nil => {
                self.emit(Op::Nil);
            }
            ExprKind::Bool(true) => {
                self.emit(Op::True);
            }
            ExprKind::Bool(false) => {
                self.emit(Op::False);
            }
            ExprKind::Int(i) => self.load_constant(Constant::Int(*i))?,
            ExprKind::Float(f) => self.load_constant(Constant::Float(*f))?,
            ExprKind::Str(s) => self.load_constant(Constant::Str(Arc::from(s.as_str())))?,
            ExprKind::Template(segments) => {
                for segment in segments {
                    match segment {
                        TemplateSegment::Text(text) => self.load_constant(Constant::Str(Arc::from(text.as_str())))?,
                        TemplateSegment::Expr(inner) => self.expr(inner)?,
                    }
                }
                let n = operand_count(segments.len(), "template segments", e.pos)?;
                self.emit(Op::BuildString(n));
            }
            ExprKind::Ident(name) => {
                let symbol = self.resolve(name, e.pos)?;
                self.load_symbol(symbol);
            }
            ExprKind::List(items) => {
                self.exprs(items)?;
                let n = operand_count(items.len(), "list items", e.pos)?;
                self.emit(Op::BuildList(n));
            }
            ExprKind::Map(entries) => {
                for (k, v) in entries {
                    self.expr(k)?;
                    self.expr(v)?;
                }
                let n = operand_count(entries.len(), "map entries", e.pos)?;
                self.emit(Op::BuildMap(n));
            }
            ExprKind::Set(items) => {
                self.exprs(items)?;
                let n = operand_count(items.len(), "set items", e.pos)?;
                self.emit(Op::BuildSet(n));
            }
            ExprKind::Func(lit) => self.func(lit, e.pos)?,
            ExprKind::Call { callee, args } => {
                self.expr(callee)?;
                self.exprs(args)?;
                let argc = operand_count(args.len(), "arguments", e.pos)?;
                self.set_pos(e.pos);
                self.emit(Op::Call(argc));
            }
            ExprKind::Index { object, index } => {
                self.expr(object)?;
                self.expr(index)?;
                self.set_pos(e.pos);
                self.emit(Op::BinarySubscr);
            }
            ExprKind::Slice { object, low, high } => {
                self.expr(object)?;
                for bound in [low, high] {
                    match bound {
                        Some(b) => self.expr(b)?,
                        None => {
                            self.emit(Op::Nil);
                        }
                    }
                }
                self.set_pos(e.pos);
                self.emit(Op::Slice);
            }
            ExprKind::Attr { object, name } => {
                self.expr(object)?;
                let idx = self.b().name(name)?;
                self.set_pos(e.pos);
                self.emit(Op::LoadAttr(idx));
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                self.set_pos(e.pos);
                self.emit(match op {
                    UnaryOp::Not => Op::UnaryNot,
                    UnaryOp::Neg => Op::UnaryNegative,
                    UnaryOp::Receive => Op::Receive,
                });
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, e.pos)?,
            ExprKind::Ternary { cond, then, otherwise } => {
                self.expr(cond)?;
                let to_else = self.emit(Op::PopJumpForwardIfFalse(0));
                self.expr(then)?;
                let to_end = self.emit(Op::JumpForward(0));
                self.b().patch_jump(to_else)?;
                self.expr(otherwise)?;
                self.b().patch_jump(to_end)?;
            }
            ExprKind::Pipe(stages) => self.pipe(stages, e.pos)?,
            ExprKind::If(if_expr) => self.if_expr(if_expr)?,
            ExprKind::Switch(switch) => self.switch(switch, e.pos)?,
            ExprKind::Range(inner) => {
                self.expr(inner)?;
                self.set_pos(e.pos);
                self.emit(Op::Range);
            }
        }
        Ok(())
    }

    fn exprs(&mut self, items: &[Expr]) -> Result<()> {
        for item in items {
            self.expr(item)?;
        }
        Ok(())
    }

    fn binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, pos: Position) -> Result<()> {
        self.expr(lhs)?;
        match op {
            // The untaken operand is skipped, not evaluated and discarded.
            BinOp::And | BinOp::Or => {
                self.emit(Op::Copy(0));
                let skip = if op == BinOp::And {
                    self.emit(Op::PopJumpForwardIfFalse(0))
                } else {
                    self.emit(Op::PopJumpForwardIfTrue(0))
                };
                self.expr(rhs)?;
                self.set_pos(pos);
                self.emit(Op::BinaryOp(if op == BinOp::And {
                    BinaryOpType::And
                } else {
                    BinaryOpType::Or
                }));
                self.b().patch_jump(skip)?;
            }
            BinOp::In | BinOp::NotIn => {
                self.expr(rhs)?;
                self.set_pos(pos);
                self.emit(Op::ContainsOp(op == BinOp::NotIn));
            }
            _ => {
                self.expr(rhs)?;
                self.set_pos(pos);
                if let Some(cmp) = op.compare_type() {
                    self.emit(Op::CompareOp(cmp));
                } else if let Some(bin) = op.binary_type() {
                    self.emit(Op::BinaryOp(bin));
                } else {
                    return Err(compile_err(pos, format!("unsupported operator {op}")));
                }
            }
        }
        Ok(())
    }

    /// `a | f(x) | g` calls each stage with the running value as first argument.
    fn pipe(&mut self, stages: &[Expr], pos: Position) -> Result<()> {
        let Some((first, rest)) = stages.split_first() else {
            return Err(compile_err(pos, "empty pipe expression"));
        };
        self.expr(first)?;
        for stage in rest {
            match &stage.kind {
                ExprKind::Call { callee, args } => {
                    self.expr(callee)?;
                    self.emit(Op::Swap(1));
                    self.exprs(args)?;
                    let argc = operand_count(args.len() + 1, "arguments", stage.pos)?;
                    self.set_pos(stage.pos);
                    self.emit(Op::Call(argc));
                }
                _ => {
                    self.expr(stage)?;
                    self.emit(Op::Swap(1));
                    self.set_pos(stage.pos);
                    self.emit(Op::Call(1));
                }
            }
        }
        Ok(())
    }

    fn block_value(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.symbols.push_block();
        let result = self.stmts_value(stmts);
        self.symbols.pop_block();
        result
    }

    /// Leaves the value of the taken branch, or nil.
    fn if_expr(&mut self, if_expr: &IfExpr) -> Result<()> {
        self.expr(&if_expr.cond)?;
        let to_else = self.emit(Op::PopJumpForwardIfFalse(0));
        self.block_value(&if_expr.then.stmts)?;
        let to_end = self.emit(Op::JumpForward(0));
        self.b().patch_jump(to_else)?;
        match &if_expr.otherwise {
            Some(block) => self.block_value(&block.stmts)?,
            None => {
                self.emit(Op::Nil);
            }
        }
        self.b().patch_jump(to_end)
    }

    /// The subject lives in a hidden local so case bodies run on a clean stack.
    fn switch(&mut self, switch: &SwitchExpr, pos: Position) -> Result<()> {
        let defaults = switch.cases.iter().filter(|c| c.is_default()).count();
        if defaults > 1 {
            return Err(compile_err(pos, "multiple default cases in switch"));
        }
        self.expr(&switch.value)?;
        let subject = self.symbols.temp_local();
        self.emit(Op::StoreFast(subject));

        let mut matches: Vec<(usize, usize)> = Vec::new();
        for (i, case) in switch.cases.iter().enumerate() {
            for e in &case.exprs {
                self.emit(Op::LoadFast(subject));
                self.expr(e)?;
                self.set_pos(case.pos);
                self.emit(Op::CompareOp(CompareOpType::Eq));
                matches.push((i, self.emit(Op::PopJumpForwardIfTrue(0))));
            }
        }
        let no_match = self.emit(Op::JumpForward(0));

        let mut ends = Vec::with_capacity(switch.cases.len());
        for (i, case) in switch.cases.iter().enumerate() {
            for &(_, at) in matches.iter().filter(|(case_idx, _)| *case_idx == i) {
                self.b().patch_jump(at)?;
            }
            if case.is_default() {
                self.b().patch_jump(no_match)?;
            }
            self.block_value(&case.body.stmts)?;
            ends.push(self.emit(Op::JumpForward(0)));
        }
        if defaults == 0 {
            self.b().patch_jump(no_match)?;
            self.emit(Op::Nil);
        }
        for at in ends {
            self.b().patch_jump(at)?;
        }
        Ok(())
    }
}
