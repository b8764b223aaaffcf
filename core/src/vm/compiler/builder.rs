use std::sync::Arc;

use anyhow::Result;

use crate::token::Position;
use crate::vm::{Code, Constant, Op};

use super::compile_err;

/// Jump bookkeeping for the innermost loop.
#[derive(Debug, Default)]
pub(crate) struct LoopCtx {
    pub breaks: Vec<usize>,
    pub continues: Vec<usize>,
    /// Known when `continue` jumps backwards (range loops).
    pub continue_target: Option<usize>,
}

/// Accumulates the instructions, constants and names of one code unit.
pub(crate) struct FunctionBuilder {
    pub code: Code,
    pub loops: Vec<LoopCtx>,
    pub pos: Position,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            code: Code::new(name),
            loops: Vec::new(),
            pos: Position::default(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.instructions.len()
    }

    pub fn emit(&mut self, op: Op) -> usize {
        self.code.instructions.push(op);
        self.code.positions.push(self.pos);
        self.code.instructions.len() - 1
    }

    /// Scalar constants are deduplicated; containers and functions never are.
    pub fn constant(&mut self, c: Constant) -> Result<u16> {
        let reusable = matches!(
            c,
            Constant::Nil | Constant::Bool(_) | Constant::Int(_) | Constant::Str(_)
        );
        if reusable && let Some(idx) = self.code.constants.iter().position(|existing| *existing == c) {
            return Ok(idx as u16);
        }
        if self.code.constants.len() >= u16::MAX as usize {
            return Err(compile_err(self.pos, "too many constants"));
        }
        self.code.constants.push(c);
        Ok((self.code.constants.len() - 1) as u16)
    }

    pub fn str_constant(&mut self, s: &str) -> Result<u16> {
        self.constant(Constant::Str(Arc::from(s)))
    }

    pub fn name(&mut self, name: &str) -> Result<u16> {
        if let Some(idx) = self.code.names.iter().position(|n| n.as_ref() == name) {
            return Ok(idx as u16);
        }
        if self.code.names.len() >= u16::MAX as usize {
            return Err(compile_err(self.pos, "too many names"));
        }
        self.code.names.push(Arc::from(name));
        Ok((self.code.names.len() - 1) as u16)
    }

    fn forward_delta(&self, at: usize) -> Result<u16> {
        let delta = self.len() - (at + 1);
        u16::try_from(delta).map_err(|_| compile_err(self.pos, "jump distance exceeds limit"))
    }

    /// Point the forward jump at `at` to the next instruction to be emitted.
    pub fn patch_jump(&mut self, at: usize) -> Result<()> {
        let delta = self.forward_delta(at)?;
        let patched = match self.code.instructions[at] {
            Op::JumpForward(_) => Op::JumpForward(delta),
            Op::PopJumpForwardIfFalse(_) => Op::PopJumpForwardIfFalse(delta),
            Op::PopJumpForwardIfTrue(_) => Op::PopJumpForwardIfTrue(delta),
            Op::ForIter { names, .. } => Op::ForIter { jump: delta, names },
            other => return Err(compile_err(self.pos, format!("cannot patch {other:?}"))),
        };
        self.code.instructions[at] = patched;
        Ok(())
    }

    pub fn jump_back(&mut self, target: usize) -> Result<usize> {
        let delta = self.len() + 1 - target;
        let delta = u16::try_from(delta).map_err(|_| compile_err(self.pos, "jump distance exceeds limit"))?;
        Ok(self.emit(Op::JumpBackward(delta)))
    }

    /// Whether the last emitted instruction is a return.
    pub fn ends_with_return(&self) -> bool {
        matches!(self.code.instructions.last(), Some(Op::ReturnValue))
    }
}
