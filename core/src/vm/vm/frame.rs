use std::sync::Arc;

use anyhow::Result;

use crate::error::eval_err;
use crate::val::{CellValue, FunctionValue, Val};
use crate::vm::{Code, Globals};

/// Return address of a frame entered from the host or a native: returning
/// from it leaves the dispatch loop instead of resuming a caller.
pub(super) const STOP: usize = usize::MAX;

const INLINE_LOCALS: usize = 8;

/// Local slots. Small functions keep them inline in the frame.
pub(super) enum Locals {
    Inline([Val; INLINE_LOCALS]),
    Heap(Box<[Val]>),
}

impl Locals {
    pub(super) fn new(count: usize) -> Self {
        if count <= INLINE_LOCALS {
            Locals::Inline(Default::default())
        } else {
            Locals::Heap(vec![Val::Nil; count].into_boxed_slice())
        }
    }

    #[inline]
    fn slots(&self) -> &[Val] {
        match self {
            Locals::Inline(slots) => slots,
            Locals::Heap(slots) => slots,
        }
    }

    #[inline]
    fn slots_mut(&mut self) -> &mut [Val] {
        match self {
            Locals::Inline(slots) => slots,
            Locals::Heap(slots) => slots,
        }
    }

    #[inline]
    fn slot_mut(&mut self, idx: usize) -> Result<&mut Val> {
        self.slots_mut()
            .get_mut(idx)
            .ok_or_else(|| eval_err(format!("invalid local index {idx}")))
    }
}

/// One activation: the code it runs, its locals and where to resume.
pub(super) struct Frame {
    pub code: Arc<Code>,
    pub function: Option<Arc<FunctionValue>>,
    pub globals: Arc<Globals>,
    pub locals: Locals,
    pub ip: usize,
    /// Caller's instruction pointer, or [`STOP`].
    pub ret: usize,
    /// Operand stack height when the frame was entered.
    pub bp: usize,
    pub defers: Vec<Val>,
}

impl Frame {
    pub(super) fn new(code: Arc<Code>, globals: Arc<Globals>, locals: Locals, ret: usize, bp: usize) -> Self {
        Self {
            code,
            function: None,
            globals,
            locals,
            ip: 0,
            ret,
            bp,
            defers: Vec::new(),
        }
    }

    pub(super) fn with_function(mut self, function: Arc<FunctionValue>) -> Self {
        self.function = Some(function);
        self
    }

    #[inline]
    pub(super) fn is_entry(&self) -> bool {
        self.ret == STOP
    }

    pub(super) fn set_local(&mut self, idx: usize, value: Val) -> Result<()> {
        *self.locals.slot_mut(idx)? = value;
        Ok(())
    }

    /// Reads through a cell once the slot has been captured.
    #[inline]
    pub(super) fn load_local(&self, idx: usize) -> Result<Val> {
        match self.locals.slots().get(idx) {
            Some(Val::Cell(cell)) => Ok(cell.get()),
            Some(v) => Ok(v.clone()),
            None => Err(eval_err(format!("invalid local index {idx}"))),
        }
    }

    #[inline]
    pub(super) fn store_local(&mut self, idx: usize, value: Val) -> Result<()> {
        let slot = self.locals.slot_mut(idx)?;
        match slot {
            Val::Cell(cell) => cell.set(value),
            other => *other = value,
        }
        Ok(())
    }

    /// The cell for a local, created on first capture. From then on the slot
    /// holds the cell and every access goes through it.
    pub(super) fn make_cell(&mut self, idx: usize) -> Result<Arc<CellValue>> {
        let slot = self.locals.slot_mut(idx)?;
        if let Val::Cell(cell) = slot {
            return Ok(cell.clone());
        }
        let cell = CellValue::new(std::mem::take(slot));
        *slot = Val::Cell(cell.clone());
        Ok(cell)
    }

    #[inline]
    pub(super) fn free(&self, idx: usize) -> Result<&Arc<CellValue>> {
        self.function
            .as_ref()
            .and_then(|f| f.free.get(idx))
            .ok_or_else(|| eval_err(format!("invalid free variable index {idx}")))
    }
}
