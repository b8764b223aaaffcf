use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::module::ModuleValue;

mod concurrency;
mod container;
mod convert;
mod function;
mod iter;
mod methods;
mod ops;
mod types;

pub use concurrency::{ChannelValue, TaskValue};
pub use container::Container;
pub use function::{BoundMethod, Builtin, FunctionValue, NativeFn, PartialValue};
pub use iter::{IteratorState, IteratorValue};
pub use methods::{find_method_for_val, register_method};
pub use ops::{MAX_ALLOC_LEN, alloc_len};
pub use types::{CellValue, ErrorValue, ListValue, MapValue, SetKey, SetValue};

pub(crate) use iter::{ChannelIter, IntIter, ListIter, MapIter, MemberIter, StrIter};

/// Runtime value. Containers are reference types: clones alias the same storage.
#[derive(Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<ListValue>),
    Map(Arc<MapValue>),
    Set(Arc<SetValue>),
    Function(Arc<FunctionValue>),
    Builtin(Builtin),
    BoundMethod(Arc<BoundMethod>),
    Partial(Arc<PartialValue>),
    /// Captured local. Never visible to scripts; loads see through it.
    Cell(Arc<CellValue>),
    Module(Arc<ModuleValue>),
    Iterator(Arc<IteratorValue>),
    Channel(Arc<ChannelValue>),
    Task(Arc<TaskValue>),
    Error(Arc<ErrorValue>),
}

impl Val {
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Nil => "nil",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "string",
            Val::List(_) => "list",
            Val::Map(_) => "map",
            Val::Set(_) => "set",
            Val::Function(_) => "function",
            Val::Builtin(_) | Val::BoundMethod(_) => "builtin",
            Val::Partial(_) => "partial",
            Val::Cell(_) => "cell",
            Val::Module(_) => "module",
            Val::Iterator(_) => "iterator",
            Val::Channel(_) => "chan",
            Val::Task(_) => "task",
            Val::Error(_) => "error",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Nil => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(l) => !l.is_empty(),
            Val::Map(m) => !m.is_empty(),
            Val::Set(s) => !s.is_empty(),
            Val::Cell(c) => c.get().is_truthy(),
            Val::Error(_) => false,
            _ => true,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Val::Function(_) | Val::Builtin(_) | Val::BoundMethod(_) | Val::Partial(_)
        )
    }

    pub fn list(items: Vec<Val>) -> Val {
        Val::List(ListValue::new(items))
    }

    pub fn error(message: impl Into<String>) -> Val {
        Val::Error(ErrorValue::new(message))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Reads through a cell; every other value is returned as is.
    #[inline]
    pub fn deref_cell(self) -> Val {
        match self {
            Val::Cell(c) => c.get(),
            v => v,
        }
    }

    /// Quoted, script-literal-like rendering used inside containers and by `repr`.
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        let _ = self.write_inspect(&mut out);
        out
    }

    fn write_inspect(&self, out: &mut String) -> fmt::Result {
        match self {
            Val::Str(s) => write!(out, "{:?}", s.as_ref()),
            Val::List(l) => {
                out.push('[');
                for (i, v) in l.snapshot().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    v.write_inspect(out)?;
                }
                out.push(']');
                Ok(())
            }
            Val::Map(m) => {
                out.push('{');
                for (i, (k, v)) in m.entries().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write!(out, "{:?}: ", k.as_ref())?;
                    v.write_inspect(out)?;
                }
                out.push('}');
                Ok(())
            }
            Val::Set(s) => {
                out.push('{');
                for (i, v) in s.members().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    v.write_inspect(out)?;
                }
                out.push('}');
                Ok(())
            }
            other => write!(out, "{other}"),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => write!(f, "nil"),
            Val::Bool(b) => write!(f, "{b}"),
            Val::Int(i) => write!(f, "{i}"),
            Val::Float(x) => write!(f, "{x}"),
            Val::Str(s) => f.write_str(s),
            Val::List(_) | Val::Map(_) | Val::Set(_) => f.write_str(&self.inspect()),
            Val::Function(func) => write!(f, "{func:?}"),
            Val::Builtin(b) => write!(f, "builtin({})", b.name),
            Val::BoundMethod(m) => write!(f, "builtin({}.{})", m.receiver.type_name(), m.method.name),
            Val::Partial(p) => write!(f, "partial({})", p.callee),
            Val::Cell(c) => write!(f, "{}", c.get()),
            Val::Module(m) => write!(f, "module({})", m.name()),
            Val::Iterator(it) => write!(f, "iterator({})", it.origin()),
            Val::Channel(c) if c.capacity() == 0 => write!(f, "chan()"),
            Val::Channel(c) => write!(f, "chan({})", c.capacity()),
            Val::Task(t) => write!(f, "task({})", t.id()),
            Val::Error(e) => write!(f, "error({})", e.message),
        }
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        ops::equals(self, other)
    }
}
