mod call;
mod dispatch;
mod frame;
mod modules;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::error::{ErrorKind, VmError, err, eval_err};
use crate::import::Importer;
use crate::module::ModuleValue;
use crate::rt::{CancelToken, ExecContext};
use crate::util::fast_map::FastHashMap;
use crate::val::Val;

use super::{Code, Globals, Limits, VmOptions};

use frame::{Frame, Locals, STOP};

/// State shared by a VM, its clones and the tasks it spawns.
pub(crate) struct Shared {
    globals: Arc<Globals>,
    host: FastHashMap<Arc<str>, Val>,
    host_names: Vec<Arc<str>>,
    importer: Option<Arc<dyn Importer>>,
    /// One cell per module name; importers of the same name wait on it.
    modules: DashMap<String, Arc<OnceCell<Arc<ModuleValue>>>>,
    limits: Limits,
    concurrency: bool,
}

impl Shared {
    /// Globals for a code unit laid out by `names`, seeded from host values.
    fn seeded_globals(&self, names: &[Arc<str>]) -> Arc<Globals> {
        let values = names
            .iter()
            .map(|n| self.host.get(n).cloned().unwrap_or_default())
            .collect();
        Globals::new(names.to_vec(), values)
    }
}

/// Stack virtual machine executing one main code unit.
///
/// A VM owns its operand stack and frames; globals, the importer and the
/// module cache are shared with every clone and spawned task.
pub struct VirtualMachine {
    main: Arc<Code>,
    shared: Arc<Shared>,
    stack: Vec<Val>,
    frames: Vec<Frame>,
    /// Entries into `run_frame` currently on the host stack.
    nesting: usize,
    /// Modules whose bodies this VM is running, innermost last.
    importing: Vec<String>,
    context: ExecContext,
    cancel: CancelToken,
    result: Option<Val>,
}

impl VirtualMachine {
    pub fn new(code: Arc<Code>, options: VmOptions) -> Self {
        let VmOptions {
            globals: host,
            importer,
            concurrency,
            limits,
            context,
        } = options;
        let mut host_names: Vec<Arc<str>> = host.keys().cloned().collect();
        host_names.sort_unstable();
        let layout = if code.global_names.is_empty() {
            host_names.clone()
        } else {
            code.global_names.clone()
        };
        let mut shared = Shared {
            globals: Globals::new(Vec::new(), Vec::new()),
            host,
            host_names,
            importer,
            modules: DashMap::new(),
            limits,
            concurrency,
        };
        shared.globals = shared.seeded_globals(&layout);
        let cancel = context.token().clone();
        Self {
            main: code,
            shared: Arc::new(shared),
            stack: Vec::with_capacity(limits.initial_stack),
            frames: Vec::with_capacity(limits.initial_frames),
            nesting: 0,
            importing: Vec::new(),
            context,
            cancel,
            result: None,
        }
    }

    /// Execute the main unit from the start.
    pub fn run(&mut self) -> Result<()> {
        let context = self.context.clone();
        self.run_with(&context)
    }

    pub fn run_with(&mut self, context: &ExecContext) -> Result<()> {
        self.cancel = context.token().clone();
        self.run_main(0)
    }

    /// Execute the statements `code` adds on top of the previously run unit.
    /// `code` must come from the same [`Compiler`](crate::vm::Compiler);
    /// globals keep their values.
    pub fn run_more(&mut self, code: Arc<Code>) -> Result<()> {
        let start = self.main.len();
        if code.len() < start || code.instructions[..start] != self.main.instructions[..] {
            return Err(err(ErrorKind::Eval, "code does not extend the previously run program"));
        }
        self.shared.globals.extend_to(&code.global_names);
        self.main = code;
        self.cancel = self.context.token().clone();
        self.run_main(start)
    }

    fn run_main(&mut self, start: usize) -> Result<()> {
        self.result = None;
        self.reset();
        let code = self.main.clone();
        let mut frame = Frame::new(
            code.clone(),
            self.shared.globals.clone(),
            Locals::new(code.locals_count),
            STOP,
            0,
        );
        frame.ip = start;
        self.frames.push(frame);
        let value = self.guarded(|vm| vm.run_frame())?;
        self.result = Some(value);
        Ok(())
    }

    /// Value left by the last completed run.
    pub fn tos(&self) -> Option<Val> {
        self.result.clone()
    }

    pub fn get(&self, name: &str) -> Option<Val> {
        self.shared.globals.lookup(name)
    }

    pub fn global_names(&self) -> Vec<Arc<str>> {
        self.shared.globals.names()
    }

    pub fn main_code(&self) -> &Arc<Code> {
        &self.main
    }

    /// Call a function value from the host.
    pub fn call(&mut self, callee: &Val, args: &[Val]) -> Result<Val> {
        self.reset();
        let callee = callee.clone();
        let args = args.to_vec();
        self.guarded(move |vm| vm.call_reentrant(&callee, args))
    }

    /// A VM over the same code sharing globals and cached modules, with its
    /// own stack and frames.
    pub fn clone_vm(&self) -> VirtualMachine {
        tracing::debug!(unit = %self.main.name, "cloning vm");
        let mut clone = self.fork();
        clone.cancel = clone.context.token().clone();
        clone
    }

    fn fork(&self) -> VirtualMachine {
        let limits = self.shared.limits;
        VirtualMachine {
            main: self.main.clone(),
            shared: self.shared.clone(),
            stack: Vec::with_capacity(limits.initial_stack),
            frames: Vec::with_capacity(limits.initial_frames),
            nesting: 0,
            importing: Vec::new(),
            context: self.context.clone(),
            cancel: self.cancel.clone(),
            result: None,
        }
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.nesting = 0;
        self.importing.clear();
    }

    /// Run `f` converting a panic into a `Panic` error.
    fn guarded<F>(&mut self, f: F) -> Result<Val>
    where
        F: FnOnce(&mut Self) -> Result<Val>,
    {
        match catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(result) => result,
            Err(payload) => {
                self.reset();
                Err(anyhow::Error::new(VmError::new(
                    ErrorKind::Panic,
                    panic_message(payload.as_ref()),
                )))
            }
        }
    }

    #[inline]
    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn concurrency_enabled(&self) -> bool {
        self.shared.concurrency
    }

    pub(crate) fn globals(&self) -> &Arc<Globals> {
        &self.shared.globals
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.shared.limits
    }

    #[inline]
    fn push(&mut self, value: Val) -> Result<()> {
        let len = self.stack.len();
        let max = self.shared.limits.max_stack;
        if len >= max {
            return Err(err(ErrorKind::Resource, format!("stack overflow (limit {max})")));
        }
        if len == self.stack.capacity() {
            let target = (len.max(1) * 2).min(max);
            self.stack.reserve_exact(target - len);
            tracing::trace!(capacity = self.stack.capacity(), "operand stack grown");
        }
        self.stack.push(value);
        Ok(())
    }

    #[inline]
    fn pop(&mut self) -> Result<Val> {
        self.stack.pop().ok_or_else(|| eval_err("stack underflow"))
    }

    /// The top `n` values in push order.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Val>> {
        let len = self.stack.len();
        if n > len {
            return Err(eval_err("stack underflow"));
        }
        Ok(self.stack.split_off(len - n))
    }

    #[inline]
    fn frame(&self) -> Result<&Frame> {
        self.frames.last().ok_or_else(|| eval_err("no active frame"))
    }

    #[inline]
    fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| eval_err("no active frame"))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
