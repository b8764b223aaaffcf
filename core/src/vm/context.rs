use std::sync::Arc;

use anyhow::Result;

use crate::rt::CancelToken;
use crate::val::{TaskValue, Val};

use super::{Globals, Limits, VirtualMachine};

/// What a native function sees of the VM calling it.
///
/// Calls made through the context re-enter the same dispatch loop on the
/// caller's stack, so a native can invoke script callbacks.
pub struct VmContext<'a> {
    vm: &'a mut VirtualMachine,
}

impl<'a> VmContext<'a> {
    pub(crate) fn new(vm: &'a mut VirtualMachine) -> Self {
        Self { vm }
    }

    /// Call any callable value and wait for its result.
    pub fn call(&mut self, callee: &Val, args: &[Val]) -> Result<Val> {
        self.vm.call_reentrant(callee, args.to_vec())
    }

    /// Run `callee(args...)` as a separate task sharing this VM's globals.
    /// Fails with an `Eval` error when the VM was built without concurrency.
    pub fn spawn(&mut self, callee: Val, args: Vec<Val>) -> Result<Arc<TaskValue>> {
        self.vm.spawn_task(callee, args)
    }

    #[inline]
    pub fn cancel_token(&self) -> &CancelToken {
        self.vm.cancel_token()
    }

    pub fn concurrency_enabled(&self) -> bool {
        self.vm.concurrency_enabled()
    }

    pub fn globals(&self) -> &Arc<Globals> {
        self.vm.globals()
    }

    pub fn limits(&self) -> &Limits {
        self.vm.limits()
    }
}
