use std::sync::Arc;

use anyhow::Result;

use crate::error::{ErrorKind, VmError, annotate, err, eval_err, relocate, type_err};
use crate::token::Position;
use crate::val::{
    BoundMethod, Container, FunctionValue, MapValue, PartialValue, SetValue, Val, find_method_for_val,
};
use crate::vm::{Constant, Op, VmContext};

use super::VirtualMachine;

impl VirtualMachine {
    /// Run the frame on top of the stack, entered with a stop address, until it
    /// returns. On failure every frame it pushed is unwound.
    pub(super) fn run_frame(&mut self) -> Result<Val> {
        let entry = self
            .frames
            .len()
            .checked_sub(1)
            .ok_or_else(|| eval_err("no active frame"))?;
        let max = self.shared.limits.max_nesting;
        if self.nesting >= max {
            let e = err(
                ErrorKind::Resource,
                format!("maximum nested call depth exceeded (limit {max})"),
            );
            self.unwind(entry, &e);
            return Err(e);
        }
        self.nesting += 1;
        let result = self.dispatch();
        self.nesting -= 1;
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.unwind(entry, &e);
                Err(e)
            }
        }
    }

    /// Push the values of a sized container, in iteration order. Maps give
    /// their values.
    fn unpack(&mut self, value: &Val, n: usize) -> Result<()> {
        if !matches!(value, Val::List(_) | Val::Str(_) | Val::Set(_) | Val::Map(_)) {
            return Err(type_err(format!("cannot unpack {} object", value.type_name())));
        }
        let len = value.length()?;
        if len != n as i64 {
            return Err(eval_err(format!(
                "unpack count mismatch: expected {n} values, got {len}"
            )));
        }
        if let Val::List(l) = value {
            for item in l.snapshot() {
                self.push(item)?;
            }
            return Ok(());
        }
        let it = value.iter()?;
        while it.next(&mut VmContext::new(self))? {
            let (_, item) = it.entry().unwrap_or_default();
            self.push(item)?;
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<Val> {
        self.execute().map_err(|e| annotate(e, self.current_position()))
    }

    /// Pop frames down to and including `entry`. Deferred calls still run,
    /// except after cancellation; their own failures are logged and dropped.
    fn unwind(&mut self, entry: usize, error: &anyhow::Error) {
        let cancelled = VmError::kind_of(error) == ErrorKind::Cancelled;
        if cancelled {
            tracing::debug!("cancellation observed, skipping deferred calls");
        }
        while self.frames.len() > entry {
            let Some(mut frame) = self.frames.pop() else { break };
            self.stack.truncate(frame.bp);
            if cancelled {
                continue;
            }
            for deferred in std::mem::take(&mut frame.defers).into_iter().rev() {
                if let Err(e) = self.call_reentrant(&deferred, Vec::new()) {
                    tracing::warn!(function = %frame.code.name, error = %e, "deferred call failed during unwind");
                }
            }
        }
    }

    fn run_defers(&mut self) -> Result<()> {
        let defers = std::mem::take(&mut self.frame_mut()?.defers);
        for deferred in defers.into_iter().rev() {
            self.call_reentrant(&deferred, Vec::new())?;
        }
        Ok(())
    }

    /// Leave the current frame with `value`. Returns it when the frame was an
    /// entry frame.
    fn leave_frame(&mut self, value: Val) -> Result<Option<Val>> {
        self.run_defers()?;
        let frame = self.frames.pop().ok_or_else(|| eval_err("no active frame"))?;
        self.stack.truncate(frame.bp);
        if frame.is_entry() {
            return Ok(Some(value));
        }
        self.frame_mut()?.ip = frame.ret;
        self.push(value)?;
        Ok(None)
    }

    fn jump(&mut self, delta: u16, forward: bool) -> Result<()> {
        let frame = self.frame_mut()?;
        if forward {
            frame.ip += delta as usize;
        } else {
            frame.ip = frame
                .ip
                .checked_sub(delta as usize)
                .ok_or_else(|| eval_err("jump before start of code"))?;
        }
        Ok(())
    }

    fn const_str(&self, idx: u16) -> Result<Arc<str>> {
        match self.frame()?.code.constants.get(idx as usize) {
            Some(Constant::Str(s)) => Ok(s.clone()),
            _ => Err(eval_err(format!("invalid string constant {idx}"))),
        }
    }

    fn name(&self, idx: u16) -> Result<Arc<str>> {
        self.frame()?
            .code
            .names
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| eval_err(format!("invalid name index {idx}")))
    }

    fn execute(&mut self) -> Result<Val> {
        loop {
            self.cancel.check()?;
            let frame = self.frame_mut()?;
            let Some(&op) = frame.code.instructions.get(frame.ip) else {
                return Err(eval_err("instruction pointer out of range"));
            };
            frame.ip += 1;

            match op {
                Op::Nop => {}
                Op::Halt => {
                    let bp = self.frame()?.bp;
                    let value = if self.stack.len() > bp { self.pop()? } else { Val::Nil };
                    if let Some(value) = self.leave_frame(value)? {
                        return Ok(value);
                    }
                }
                Op::ReturnValue => {
                    let value = self.pop()?;
                    if let Some(value) = self.leave_frame(value)? {
                        return Ok(value);
                    }
                }

                Op::Call(argc) => {
                    let argc = argc as usize;
                    let max = self.shared.limits.max_args;
                    if argc > max {
                        return Err(err(
                            ErrorKind::Resource,
                            format!("too many arguments ({argc}, limit {max})"),
                        ));
                    }
                    let args = self.pop_n(argc)?;
                    let callee = self.pop()?;
                    self.call_value(callee, args)?;
                }
                Op::Partial(argc) => {
                    let args = self.pop_n(argc as usize)?;
                    let callee = self.pop()?;
                    if !callee.is_callable() {
                        return Err(type_err(format!("{} object is not callable", callee.type_name())));
                    }
                    self.push(Val::Partial(PartialValue::new(callee, args)))?;
                }
                Op::Defer => {
                    let deferred = self.pop()?;
                    self.frame_mut()?.defers.push(deferred);
                }
                Op::Go => {
                    let partial = self.pop()?;
                    let task = self.spawn_task(partial, Vec::new())?;
                    tracing::trace!(task = task.id(), "go statement started task");
                }

                Op::JumpForward(d) => self.jump(d, true)?,
                Op::JumpBackward(d) => self.jump(d, false)?,
                Op::PopJumpForwardIfFalse(d) => {
                    if !self.pop()?.is_truthy() {
                        self.jump(d, true)?;
                    }
                }
                Op::PopJumpForwardIfTrue(d) => {
                    if self.pop()?.is_truthy() {
                        self.jump(d, true)?;
                    }
                }

                Op::LoadAttr(idx) => {
                    let name = self.name(idx)?;
                    let object = self.pop()?;
                    let value = load_attr(&object, &name)?;
                    self.push(value)?;
                }
                Op::StoreAttr(idx) => {
                    let name = self.name(idx)?;
                    let value = self.pop()?;
                    match self.pop()? {
                        Val::Map(m) => m.insert(name, value),
                        other => {
                            return Err(type_err(format!(
                                "cannot set attribute \"{name}\" on {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                Op::LoadFast(idx) => {
                    let value = self.frame()?.load_local(idx as usize)?;
                    self.push(value)?;
                }
                Op::StoreFast(idx) => {
                    let value = self.pop()?;
                    self.frame_mut()?.store_local(idx as usize, value)?;
                }
                Op::LoadFree(idx) => {
                    let value = self.frame()?.free(idx as usize)?.get();
                    self.push(value)?;
                }
                Op::StoreFree(idx) => {
                    let value = self.pop()?;
                    self.frame()?.free(idx as usize)?.set(value);
                }
                Op::LoadGlobal(idx) => {
                    let value = self
                        .frame()?
                        .globals
                        .get(idx as usize)
                        .ok_or_else(|| eval_err(format!("invalid global index {idx}")))?;
                    self.push(value)?;
                }
                Op::StoreGlobal(idx) => {
                    let value = self.pop()?;
                    if !self.frame()?.globals.set(idx as usize, value) {
                        return Err(eval_err(format!("invalid global index {idx}")));
                    }
                }
                Op::LoadConst(idx) => {
                    let frame = self.frame()?;
                    let value = frame
                        .code
                        .constants
                        .get(idx as usize)
                        .map(|c| Val::from_constant(c, &frame.globals))
                        .ok_or_else(|| eval_err(format!("invalid constant index {idx}")))?;
                    self.push(value)?;
                }

                Op::BinaryOp(kind) => {
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    self.push(lhs.binary_op(kind, &rhs)?)?;
                }
                Op::CompareOp(kind) => {
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    self.push(Val::Bool(lhs.compare_op(kind, &rhs)?))?;
                }
                Op::UnaryNegative => {
                    let value = self.pop()?.negate()?;
                    self.push(value)?;
                }
                Op::UnaryNot => {
                    let value = self.pop()?.not();
                    self.push(value)?;
                }

                Op::BuildList(n) => {
                    let items = self.pop_n(n as usize)?;
                    self.push(Val::list(items))?;
                }
                Op::BuildMap(n) => {
                    let items = self.pop_n(n as usize * 2)?;
                    let mut pairs = Vec::with_capacity(n as usize);
                    let mut iter = items.into_iter();
                    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                        match k {
                            Val::Str(key) => pairs.push((key, v)),
                            other => {
                                return Err(type_err(format!("map key must be a string (got {})", other.type_name())));
                            }
                        }
                    }
                    self.push(Val::Map(MapValue::from_pairs(pairs)))?;
                }
                Op::BuildSet(n) => {
                    let items = self.pop_n(n as usize)?;
                    let set = SetValue::new();
                    for item in items {
                        let type_name = item.type_name();
                        if !set.insert(item) {
                            return Err(type_err(format!("{type_name} object is not hashable")));
                        }
                    }
                    self.push(Val::Set(set))?;
                }
                Op::BuildString(n) => {
                    let parts = self.pop_n(n as usize)?;
                    let mut s = String::new();
                    for part in &parts {
                        use std::fmt::Write as _;
                        let _ = write!(s, "{part}");
                    }
                    self.push(Val::from(s))?;
                }

                Op::BinarySubscr => {
                    let index = self.pop()?;
                    let container = self.pop()?;
                    self.push(container.get_item(&index)?)?;
                }
                Op::StoreSubscr => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let container = self.pop()?;
                    container.set_item(&index, value)?;
                }
                Op::ContainsOp(invert) => {
                    let container = self.pop()?;
                    let value = self.pop()?;
                    let found = container.contains(&value)?;
                    self.push(Val::Bool(found != invert))?;
                }
                Op::Length => {
                    let value = self.pop()?;
                    self.push(Val::Int(value.length()?))?;
                }
                Op::Slice => {
                    let high = self.pop()?;
                    let low = self.pop()?;
                    let container = self.pop()?;
                    self.push(container.get_slice(&low, &high)?)?;
                }
                Op::Unpack(n) => {
                    let value = self.pop()?;
                    self.unpack(&value, n as usize)?;
                }

                Op::Swap(n) => {
                    let len = self.stack.len();
                    let other = len
                        .checked_sub(1 + n as usize)
                        .ok_or_else(|| eval_err("stack underflow"))?;
                    self.stack.swap(len - 1, other);
                }
                Op::Copy(n) => {
                    let len = self.stack.len();
                    let value = len
                        .checked_sub(1 + n as usize)
                        .and_then(|i| self.stack.get(i))
                        .cloned()
                        .ok_or_else(|| eval_err("stack underflow"))?;
                    self.push(value)?;
                }
                Op::PopTop => {
                    self.pop()?;
                }
                Op::Nil => self.push(Val::Nil)?,
                Op::True => self.push(Val::Bool(true))?,
                Op::False => self.push(Val::Bool(false))?,

                Op::GetIter | Op::Range => {
                    let value = self.pop()?;
                    self.push(Val::Iterator(value.iter()?))?;
                }
                Op::ForIter { jump, names } => {
                    let it = match self.stack.last() {
                        Some(Val::Iterator(it)) => it.clone(),
                        Some(other) => {
                            return Err(type_err(format!("{} object is not an iterator", other.type_name())));
                        }
                        None => return Err(eval_err("stack underflow")),
                    };
                    if it.next(&mut VmContext::new(self))? {
                        let (key, value) = it.entry().unwrap_or_default();
                        match names {
                            0 => {}
                            1 => self.push(key)?,
                            _ => {
                                self.push(value)?;
                                self.push(key)?;
                            }
                        }
                    } else {
                        self.jump(jump, true)?;
                    }
                }

                Op::Import(idx) => {
                    let name = self.const_str(idx)?;
                    let pos = self.current_position();
                    let module = self
                        .import_module(&name)
                        .map_err(|e| relocate(e, ErrorKind::Import, pos))?;
                    self.push(Val::Module(module))?;
                }
                Op::FromImport { path, name } => {
                    let path = self.const_str(path)?;
                    let name = self.name(name)?;
                    let pos = self.current_position();
                    let module = self
                        .import_module(&path)
                        .map_err(|e| relocate(e, ErrorKind::Import, pos))?;
                    let value = module.get(&name).ok_or_else(|| {
                        relocate(
                            err(ErrorKind::Import, format!("cannot import name \"{name}\" from \"{path}\"")),
                            ErrorKind::Import,
                            pos,
                        )
                    })?;
                    self.push(value)?;
                }

                Op::Send => {
                    let value = self.pop()?;
                    match self.pop()? {
                        Val::Channel(ch) => ch.send(value, &self.cancel)?,
                        other => return Err(type_err(format!("cannot send to {} object", other.type_name()))),
                    }
                }
                Op::Receive => {
                    let value = match self.pop()? {
                        Val::Channel(ch) => ch.recv(&self.cancel)?.unwrap_or_default(),
                        other => {
                            return Err(type_err(format!("cannot receive from {} object", other.type_name())));
                        }
                    };
                    self.push(value)?;
                }

                Op::LoadClosure { func, free } => {
                    let cells = self.pop_n(free as usize)?;
                    let frame = self.frame()?;
                    let template = match frame.code.constants.get(func as usize) {
                        Some(Constant::Function(t)) => t.clone(),
                        _ => return Err(eval_err(format!("invalid function constant {func}"))),
                    };
                    let globals = frame.globals.clone();
                    let cells = cells
                        .into_iter()
                        .map(|c| match c {
                            Val::Cell(cell) => Ok(cell),
                            other => Err(eval_err(format!("expected cell, got {}", other.type_name()))),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    self.push(Val::Function(FunctionValue::new(template, cells, globals)))?;
                }
                Op::MakeCell(idx) => {
                    let cell = self.frame_mut()?.make_cell(idx as usize)?;
                    self.push(Val::Cell(cell))?;
                }
                Op::CaptureFree(idx) => {
                    let cell = self.frame()?.free(idx as usize)?.clone();
                    self.push(Val::Cell(cell))?;
                }
            }
        }
    }

    fn current_position(&self) -> Position {
        self.frames
            .last()
            .map(|f| f.code.position(f.ip.saturating_sub(1)))
            .unwrap_or_default()
    }
}

/// Attribute lookup: module members, then methods, then map keys.
fn load_attr(object: &Val, name: &str) -> Result<Val> {
    if let Val::Module(m) = object {
        return m.attr(name);
    }
    if let Some(method) = find_method_for_val(object, name) {
        return Ok(Val::BoundMethod(BoundMethod::new(object.clone(), method)));
    }
    if let Val::Map(m) = object
        && let Some(value) = m.get(name)
    {
        return Ok(value);
    }
    Err(err(
        ErrorKind::Eval,
        format!("attribute \"{name}\" not found on {}", object.type_name()),
    ))
}
