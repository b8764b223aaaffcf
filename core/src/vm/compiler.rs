mod builder;
mod driver;
mod expr;
mod stmt;
mod symbols;

use crate::error::{ErrorKind, VmError};
use crate::token::Position;

pub use driver::{Compiler, compile, compile_source};

pub(crate) fn compile_err(pos: Position, msg: impl Into<String>) -> anyhow::Error {
    let error = VmError::new(ErrorKind::Compile, msg);
    anyhow::Error::new(if pos.is_known() { error.at(pos) } else { error })
}
