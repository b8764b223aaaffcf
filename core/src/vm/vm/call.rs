use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use anyhow::Result;

use crate::error::{ErrorKind, VmError, err, type_err};
use crate::rt::with_runtime;
use crate::val::{Builtin, FunctionValue, PartialValue, TaskValue, Val};
use crate::vm::VmContext;

use super::frame::{Frame, Locals, STOP};
use super::{VirtualMachine, panic_message};

impl VirtualMachine {
    /// Call from the dispatch loop. Compiled functions get a new frame and
    /// run in the same loop; everything else completes immediately.
    pub(super) fn call_value(&mut self, callee: Val, args: Vec<Val>) -> Result<()> {
        match callee {
            Val::Function(f) => {
                let ret = self.frame()?.ip;
                self.push_frame(f, args, ret)
            }
            Val::Partial(p) => {
                let args = self.bind(&p, args)?;
                self.call_value(p.callee.clone(), args)
            }
            other => {
                let value = self.call_native_value(&other, args)?;
                self.push(value)
            }
        }
    }

    /// Call and wait for the result, running a nested dispatch loop for
    /// compiled functions. Used by natives, deferred calls, tasks and hosts.
    pub(crate) fn call_reentrant(&mut self, callee: &Val, args: Vec<Val>) -> Result<Val> {
        match callee {
            Val::Function(f) => {
                self.push_frame(f.clone(), args, STOP)?;
                self.run_frame()
            }
            Val::Partial(p) => {
                let args = self.bind(p, args)?;
                self.call_reentrant(&p.callee, args)
            }
            other => self.call_native_value(other, args),
        }
    }

    fn call_native_value(&mut self, callee: &Val, args: Vec<Val>) -> Result<Val> {
        match callee {
            Val::Builtin(b) => self.call_native(b, &args),
            Val::BoundMethod(m) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(m.receiver.clone());
                full.extend(args);
                self.call_native(&m.method, &full)
            }
            other => Err(type_err(format!("{} object is not callable", other.type_name()))),
        }
    }

    /// An error value returned by a native fails the call.
    fn call_native(&mut self, builtin: &Builtin, args: &[Val]) -> Result<Val> {
        match (builtin.func)(args, &mut VmContext::new(self))? {
            Val::Error(e) => Err(anyhow::Error::new(VmError::new(e.kind, e.message.clone()))),
            value => Ok(value),
        }
    }

    /// Bound arguments go in front of the new ones.
    fn bind(&self, partial: &PartialValue, args: Vec<Val>) -> Result<Vec<Val>> {
        let total = partial.args.len() + args.len();
        let max = self.shared.limits.max_args;
        if total > max {
            return Err(err(
                ErrorKind::Resource,
                format!("too many arguments ({total}, limit {max})"),
            ));
        }
        let mut combined = Vec::with_capacity(total);
        combined.extend(partial.args.iter().cloned());
        combined.extend(args);
        Ok(combined)
    }

    /// Locals are filled with the arguments, then defaults for omitted
    /// trailing parameters, then the function itself when it is named.
    pub(super) fn push_frame(&mut self, function: Arc<FunctionValue>, args: Vec<Val>, ret: usize) -> Result<()> {
        let max_frames = self.shared.limits.max_frames;
        if self.frames.len() >= max_frames {
            return Err(err(
                ErrorKind::Resource,
                format!("maximum call depth exceeded (limit {max_frames})"),
            ));
        }
        let template = &function.template;
        let given = args.len();
        let total = template.params.len();
        let required = template.required_args();
        if given < required || given > total {
            let expected = if required == total {
                format!("{total}")
            } else {
                format!("{required} to {total}")
            };
            return Err(err(
                ErrorKind::Args,
                format!(
                    "function \"{}\" takes {expected} arguments ({given} given)",
                    template.display_name()
                ),
            ));
        }

        let code = template.code.clone();
        let slots = code.locals_count.max(total + usize::from(code.is_named));
        let mut frame = Frame::new(code, function.globals.clone(), Locals::new(slots), ret, self.stack.len());
        for (i, arg) in args.into_iter().enumerate() {
            frame.set_local(i, arg)?;
        }
        for i in given..total {
            if let Some(Some(default)) = template.defaults.get(i) {
                frame.set_local(i, Val::from_constant(default, &function.globals))?;
            }
        }
        if frame.code.is_named {
            frame.set_local(total, Val::Function(function.clone()))?;
        }
        if self.frames.len() == self.frames.capacity() {
            tracing::trace!(depth = self.frames.len(), "frame stack grown");
        }
        self.frames.push(frame.with_function(function));
        Ok(())
    }

    /// Run `callee(args...)` on the blocking pool with a fork of this VM.
    pub(crate) fn spawn_task(&mut self, callee: Val, args: Vec<Val>) -> Result<Arc<TaskValue>> {
        if !self.shared.concurrency {
            return Err(err(ErrorKind::Eval, "cannot start a task: concurrency is disabled"));
        }
        if !callee.is_callable() {
            return Err(type_err(format!("{} object is not callable", callee.type_name())));
        }
        let task = TaskValue::new();
        let handle = task.clone();
        let mut child = self.fork();
        with_runtime(|rt| {
            rt.spawn_blocking(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| child.call_reentrant(&callee, args)));
                let result = match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        tracing::debug!(task = handle.id(), error = %e, "task failed");
                        Err(VmError::from_anyhow(&e))
                    }
                    Err(payload) => Err(VmError::new(ErrorKind::Panic, panic_message(payload.as_ref()))),
                };
                handle.complete(result);
                tracing::trace!(task = handle.id(), "task finished");
            });
            Ok(())
        })?;
        tracing::debug!(task = task.id(), "task spawned");
        Ok(task)
    }
}
