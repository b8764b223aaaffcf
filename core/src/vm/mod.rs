//! Bytecode compiler and stack virtual machine.
//!
//! [`compile`] lowers a parsed program into a [`Code`] unit and
//! [`VirtualMachine`] executes it. Hosts configure globals, the importer
//! and resource limits through [`VmOptions`].

mod bytecode;
mod compiler;
mod context;
mod globals;
mod options;
#[allow(clippy::module_inception)]
mod vm;

pub use bytecode::*;
pub use compiler::{Compiler, compile, compile_source};
pub use context::VmContext;
pub use globals::Globals;
pub use options::{Limits, VmOptions};
pub use vm::VirtualMachine;

#[cfg(test)]
mod compiler_test;
#[cfg(test)]
mod vm_test;
