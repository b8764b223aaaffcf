use std::sync::Arc;

use anyhow::Result;

use crate::error::{eval_err, type_err};

use super::{ChannelIter, IntIter, IteratorValue, ListIter, MapIter, MemberIter, StrIter, Val};

/// Indexing, slicing, length, membership and iteration, as consumed by
/// `BinarySubscr`, `StoreSubscr`, `Slice`, `Length`, `ContainsOp` and `GetIter`.
pub trait Container {
    fn get_item(&self, index: &Val) -> Result<Val>;
    fn set_item(&self, index: &Val, value: Val) -> Result<()>;
    fn get_slice(&self, low: &Val, high: &Val) -> Result<Val>;
    fn length(&self) -> Result<i64>;
    fn contains(&self, value: &Val) -> Result<bool>;
    fn iter(&self) -> Result<Arc<IteratorValue>>;
}

/// Resolve a possibly negative index against `len`.
fn normalize_index(index: &Val, len: usize) -> Result<usize> {
    let i = match index {
        Val::Int(i) => *i,
        other => return Err(type_err(format!("index must be an int (got {})", other.type_name()))),
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(eval_err(format!("index out of range: {i}")));
    }
    Ok(resolved as usize)
}

fn slice_bound(bound: &Val, len: usize, default: usize) -> Result<usize> {
    let i = match bound {
        Val::Nil => return Ok(default),
        Val::Int(i) => *i,
        other => {
            return Err(type_err(format!(
                "slice index must be an int (got {})",
                other.type_name()
            )));
        }
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved > len as i64 {
        return Err(eval_err(format!("slice bounds out of range: {i}")));
    }
    Ok(resolved as usize)
}

fn slice_range(low: &Val, high: &Val, len: usize) -> Result<(usize, usize)> {
    let lo = slice_bound(low, len, 0)?;
    let hi = slice_bound(high, len, len)?;
    if lo > hi {
        return Err(eval_err(format!("invalid slice indices: {lo} > {hi}")));
    }
    Ok((lo, hi))
}

fn map_key(index: &Val) -> Result<&Arc<str>> {
    match index {
        Val::Str(s) => Ok(s),
        other => Err(type_err(format!("map key must be a string (got {})", other.type_name()))),
    }
}

fn not_container<T>(val: &Val, what: &str) -> Result<T> {
    Err(type_err(format!("{} object is not {what}", val.type_name())))
}

impl Container for Val {
    fn get_item(&self, index: &Val) -> Result<Val> {
        match self {
            Val::List(l) => {
                let idx = normalize_index(index, l.len())?;
                l.get(idx).ok_or_else(|| eval_err(format!("index out of range: {idx}")))
            }
            Val::Map(m) => {
                let key = map_key(index)?;
                m.get(key)
                    .ok_or_else(|| eval_err(format!("key error: {:?}", key.as_ref())))
            }
            Val::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = normalize_index(index, chars.len())?;
                Ok(Val::from(chars[idx].to_string()))
            }
            Val::Module(m) => match index {
                Val::Str(name) => m.attr(name),
                other => Err(type_err(format!("module key must be a string (got {})", other.type_name()))),
            },
            other => not_container(other, "subscriptable"),
        }
    }

    fn set_item(&self, index: &Val, value: Val) -> Result<()> {
        match self {
            Val::List(l) => {
                let idx = normalize_index(index, l.len())?;
                if l.set(idx, value) {
                    Ok(())
                } else {
                    Err(eval_err(format!("index out of range: {idx}")))
                }
            }
            Val::Map(m) => {
                m.insert(map_key(index)?.clone(), value);
                Ok(())
            }
            other => not_container(other, "item-assignable"),
        }
    }

    fn get_slice(&self, low: &Val, high: &Val) -> Result<Val> {
        match self {
            Val::List(l) => {
                let items = l.snapshot();
                let (lo, hi) = slice_range(low, high, items.len())?;
                Ok(Val::list(items[lo..hi].to_vec()))
            }
            Val::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (lo, hi) = slice_range(low, high, chars.len())?;
                Ok(Val::from(chars[lo..hi].iter().collect::<String>()))
            }
            other => not_container(other, "sliceable"),
        }
    }

    fn length(&self) -> Result<i64> {
        let n = match self {
            Val::List(l) => l.len(),
            Val::Map(m) => m.len(),
            Val::Set(s) => s.len(),
            Val::Str(s) => s.chars().count(),
            Val::Channel(c) => c.len(),
            Val::Module(m) => m.len(),
            other => return Err(type_err(format!("object of type {} has no len()", other.type_name()))),
        };
        Ok(n as i64)
    }

    fn contains(&self, value: &Val) -> Result<bool> {
        match self {
            Val::List(l) => Ok(l.snapshot().iter().any(|v| v == value)),
            Val::Map(m) => Ok(matches!(value, Val::Str(k) if m.contains_key(k))),
            Val::Set(s) => Ok(s.contains(value)),
            Val::Str(s) => match value {
                Val::Str(sub) => Ok(s.contains(sub.as_ref())),
                other => Err(type_err(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            other => not_container(other, "a container"),
        }
    }

    fn iter(&self) -> Result<Arc<IteratorValue>> {
        let it = match self {
            Val::Iterator(it) => return Ok(it.clone()),
            Val::List(l) => IteratorValue::new(ListIter::new(l.clone())),
            Val::Map(m) => IteratorValue::new(MapIter::new(m.clone())),
            Val::Set(s) => IteratorValue::new(MemberIter::new(s.members())),
            Val::Str(s) => IteratorValue::new(StrIter::new(s)),
            Val::Int(n) => IteratorValue::new(IntIter::new(*n)),
            Val::Channel(c) => IteratorValue::new(ChannelIter::new(c.clone())),
            other => return not_container(other, "iterable"),
        };
        Ok(it)
    }
}
