use std::fmt::{self, Write as _};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::op::{BinaryOpType, CompareOpType};
use crate::token::Position;

/// One stack-machine instruction. Jump operands are relative to the
/// instruction that follows the jump.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Op {
    Nop,
    Halt,

    // Calls
    Call(u16 /*argc*/),
    ReturnValue,
    /// Pops a partial and registers it on the current frame.
    Defer,
    /// Pops a partial and runs it as a detached task.
    Go,
    /// Pops `argc` args and a callee, pushes a partial binding them.
    Partial(u16 /*argc*/),

    // Jumps
    JumpForward(u16),
    JumpBackward(u16),
    PopJumpForwardIfFalse(u16),
    PopJumpForwardIfTrue(u16),

    // Loads and stores
    LoadAttr(u16 /*name idx*/),
    LoadFast(u16 /*local idx*/),
    LoadFree(u16 /*free idx*/),
    LoadGlobal(u16 /*global idx*/),
    LoadConst(u16 /*const idx*/),
    StoreAttr(u16 /*name idx*/),
    StoreFast(u16),
    StoreFree(u16),
    StoreGlobal(u16),

    // Operators
    BinaryOp(BinaryOpType),
    CompareOp(CompareOpType),
    UnaryNegative,
    UnaryNot,

    // Builders
    BuildList(u16),
    BuildMap(u16 /*pairs*/),
    BuildSet(u16),
    BuildString(u16),

    // Containers
    BinarySubscr,
    /// Stack: container, index, value.
    StoreSubscr,
    ContainsOp(bool /*invert*/),
    Length,
    /// Stack: container, low, high (nil for an open bound).
    Slice,
    Unpack(u16),

    // Stack manipulation
    Swap(u16),
    Copy(u16),
    PopTop,
    Nil,
    True,
    False,

    // Iteration
    /// Advance the iterator on top of the stack; jump when exhausted.
    ForIter { jump: u16, names: u8 },
    GetIter,
    Range,

    // Modules
    Import(u16 /*const idx of path*/),
    FromImport { path: u16, name: u16 },

    // Channels
    Send,
    Receive,

    // Closures
    LoadClosure { func: u16, free: u16 },
    /// Promote a local of the current frame to a cell and push it.
    MakeCell(u16),
    /// Push a free cell of the current closure.
    CaptureFree(u16),
}

/// Literal values stored in a code unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Vec<Constant>),
    Map(Vec<(Arc<str>, Constant)>),
    Set(Vec<Constant>),
    Function(Arc<FunctionTemplate>),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Nil => write!(f, "nil"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
            Constant::List(items) => write!(f, "list({})", items.len()),
            Constant::Map(items) => write!(f, "map({})", items.len()),
            Constant::Set(items) => write!(f, "set({})", items.len()),
            Constant::Function(func) => write!(f, "func {}", func.display_name()),
        }
    }
}

/// Compiled function body plus its signature. Instantiated into a
/// `FunctionValue` by `LoadConst` or `LoadClosure`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTemplate {
    pub name: Option<Arc<str>>,
    pub params: Vec<Arc<str>>,
    /// One entry per parameter; `None` marks a required parameter.
    pub defaults: Vec<Option<Constant>>,
    pub free_count: usize,
    pub code: Arc<Code>,
}

impl FunctionTemplate {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    pub fn required_args(&self) -> usize {
        self.defaults.iter().take_while(|d| d.is_none()).count()
    }
}

/// Immutable unit of execution: instructions, constants and names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Code {
    pub name: Arc<str>,
    pub instructions: Vec<Op>,
    /// Source position of each instruction.
    pub positions: Vec<Position>,
    pub constants: Vec<Constant>,
    /// Attribute and import names referenced by index.
    pub names: Vec<Arc<str>>,
    pub locals_count: usize,
    /// Named functions keep themselves in the slot after their parameters.
    pub is_named: bool,
    /// Global table layout, only set on the main unit.
    pub global_names: Vec<Arc<str>>,
}

impl Code {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[inline]
    pub fn position(&self, ip: usize) -> Position {
        self.positions.get(ip).copied().unwrap_or_default()
    }

    pub fn global_index(&self, name: &str) -> Option<usize> {
        self.global_names.iter().position(|n| n.as_ref() == name)
    }

    /// Human-readable listing of this unit and every nested function.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        let _ = writeln!(out, "== {} ==", self.name);
        for (ip, op) in self.instructions.iter().enumerate() {
            let _ = write!(out, "{ip:>5}  {op:?}");
            match op {
                Op::LoadConst(i) | Op::LoadClosure { func: i, .. } => {
                    if let Some(c) = self.constants.get(*i as usize) {
                        let _ = write!(out, "  ; {c}");
                    }
                }
                Op::Import(i) => {
                    if let Some(c) = self.constants.get(*i as usize) {
                        let _ = write!(out, "  ; {c}");
                    }
                }
                Op::LoadAttr(i) | Op::StoreAttr(i) => {
                    if let Some(n) = self.names.get(*i as usize) {
                        let _ = write!(out, "  ; {n}");
                    }
                }
                Op::LoadGlobal(i) | Op::StoreGlobal(i) => {
                    if let Some(n) = self.global_names.get(*i as usize) {
                        let _ = write!(out, "  ; {n}");
                    }
                }
                Op::JumpForward(d) | Op::PopJumpForwardIfFalse(d) | Op::PopJumpForwardIfTrue(d) => {
                    let _ = write!(out, "  ; to {}", ip + 1 + *d as usize);
                }
                Op::ForIter { jump, .. } => {
                    let _ = write!(out, "  ; to {}", ip + 1 + *jump as usize);
                }
                Op::JumpBackward(d) => {
                    let _ = write!(out, "  ; to {}", (ip + 1).saturating_sub(*d as usize));
                }
                _ => {}
            }
            out.push('\n');
        }
        for c in &self.constants {
            if let Constant::Function(func) = c {
                out.push('\n');
                func.code.disassemble_into(out);
            }
        }
    }

    /// JSON dump of the unit, nested functions included.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
