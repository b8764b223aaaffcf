pub mod ast;
pub mod error;
pub mod import;
pub mod module;
mod op;
pub mod rt;
pub mod token;
pub mod util;
pub mod val;

pub mod vm;

pub use op::{BinOp, BinaryOpType, CompareOpType, UnaryOp};
