use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::vm::{Code, FunctionTemplate, Globals, VmContext};

use super::{CellValue, Val};

/// Signature shared by every native collaborator.
pub type NativeFn = fn(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val>;

/// A named native function.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: NativeFn,
}

impl Builtin {
    pub const fn new(name: &'static str, func: NativeFn) -> Self {
        Self { name, func }
    }

    pub fn same_as(&self, other: &Builtin) -> bool {
        self.name == other.name && std::ptr::fn_addr_eq(self.func, other.func)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "builtin({})", self.name)
    }
}

/// A compiled function instantiated with its captured cells and the global
/// table of the frame that created it.
pub struct FunctionValue {
    pub template: Arc<FunctionTemplate>,
    pub free: Box<[Arc<CellValue>]>,
    pub globals: Arc<Globals>,
}

impl FunctionValue {
    pub fn new(template: Arc<FunctionTemplate>, free: Vec<Arc<CellValue>>, globals: Arc<Globals>) -> Arc<Self> {
        Arc::new(Self {
            template,
            free: free.into_boxed_slice(),
            globals,
        })
    }

    pub fn name(&self) -> &str {
        self.template.display_name()
    }

    pub fn code(&self) -> &Arc<Code> {
        &self.template.code
    }

    pub fn params(&self) -> &[Arc<str>] {
        &self.template.params
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func {}({})", self.name(), self.params().join(", "))
    }
}

/// A callable with leading arguments already bound.
pub struct PartialValue {
    pub callee: Val,
    pub args: Vec<Val>,
}

impl PartialValue {
    pub fn new(callee: Val, args: Vec<Val>) -> Arc<Self> {
        Arc::new(Self { callee, args })
    }
}

/// A native method bound to its receiver, which is passed as the first argument.
pub struct BoundMethod {
    pub receiver: Val,
    pub method: Builtin,
}

impl BoundMethod {
    pub fn new(receiver: Val, method: Builtin) -> Arc<Self> {
        Arc::new(Self { receiver, method })
    }
}
