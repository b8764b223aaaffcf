use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Rem, Sub};
use std::sync::Arc;

use anyhow::Result;

use crate::error::{ErrorKind, err, eval_err, type_err};
use crate::op::{BinaryOpType, CompareOpType};
use crate::util::fast_map::fast_hash_map_with_capacity;

use super::{ListValue, MapValue, SetValue, Val};

fn err_op<R>(l: &Val, op: BinaryOpType, r: &Val) -> Result<R> {
    Err(type_err(format!(
        "unsupported operation: {} {} {}",
        l.type_name(),
        op,
        r.type_name()
    )))
}

fn concat_strings(a: &str, b: &str) -> Val {
    let mut s = String::with_capacity(a.len() + b.len());
    s.push_str(a);
    s.push_str(b);
    Val::Str(Arc::from(s))
}

/// Largest list (in items) or string (in bytes) a single operation may build.
pub const MAX_ALLOC_LEN: usize = 1 << 24;

/// Length of `count` repetitions of `unit`, failing with a `Resource` error
/// past [`MAX_ALLOC_LEN`]. A negative count is zero.
pub fn alloc_len(unit: usize, count: i64) -> Result<usize> {
    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    match unit.checked_mul(count) {
        Some(len) if len <= MAX_ALLOC_LEN => Ok(len),
        _ => Err(err(
            ErrorKind::Resource,
            format!("allocation too large ({count} x {unit}, limit {MAX_ALLOC_LEN})"),
        )),
    }
}

fn repeat<T: Clone>(items: &[T], n: i64) -> Result<Vec<T>> {
    let len = alloc_len(items.len(), n)?;
    let mut out = Vec::new();
    if len == 0 {
        return Ok(out);
    }
    out.try_reserve_exact(len)
        .map_err(|e| err(ErrorKind::Resource, format!("out of memory: {e}")))?;
    for _ in 0..len / items.len() {
        out.extend_from_slice(items);
    }
    Ok(out)
}

impl Add for &Val {
    type Output = Result<Val>;

    /// - Str + Num formats the number.
    /// - List + List and Map + Map produce new containers; Map keys on the right win.
    #[inline]
    fn add(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_add(*b))),
            (Val::Float(a), Val::Float(b)) => Ok(Val::Float(a + b)),
            (Val::Float(a), Val::Int(b)) => Ok(Val::Float(a + *b as f64)),
            (Val::Int(a), Val::Float(b)) => Ok(Val::Float(*a as f64 + b)),
            (Val::Str(a), Val::Str(b)) => {
                if a.is_empty() {
                    return Ok(Val::Str(b.clone()));
                }
                if b.is_empty() {
                    return Ok(Val::Str(a.clone()));
                }
                Ok(concat_strings(a, b))
            }
            (Val::Str(a), Val::Int(b)) => {
                let mut buf = itoa::Buffer::new();
                Ok(concat_strings(a, buf.format(*b)))
            }
            (Val::Str(a), Val::Float(b)) => {
                let mut buf = ryu::Buffer::new();
                Ok(concat_strings(a, buf.format(*b)))
            }
            (Val::Int(a), Val::Str(b)) => {
                let mut buf = itoa::Buffer::new();
                Ok(concat_strings(buf.format(*a), b))
            }
            (Val::Float(a), Val::Str(b)) => {
                let mut buf = ryu::Buffer::new();
                Ok(concat_strings(buf.format(*a), b))
            }
            (Val::List(l), Val::List(r)) => {
                let mut merged = l.snapshot();
                merged.extend(r.snapshot());
                Ok(Val::List(ListValue::new(merged)))
            }
            (Val::Map(l), Val::Map(r)) => {
                let mut merged = fast_hash_map_with_capacity(l.len() + r.len());
                for (k, v) in l.entries().into_iter().chain(r.entries()) {
                    merged.insert(k, v);
                }
                Ok(Val::Map(MapValue::new(merged)))
            }
            _ => err_op(self, BinaryOpType::Add, other),
        }
    }
}

impl Sub for &Val {
    type Output = Result<Val>;

    #[inline]
    fn sub(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_sub(*b))),
            (Val::Float(a), Val::Float(b)) => Ok(Val::Float(a - b)),
            (Val::Float(a), Val::Int(b)) => Ok(Val::Float(a - *b as f64)),
            (Val::Int(a), Val::Float(b)) => Ok(Val::Float(*a as f64 - b)),
            (Val::Set(l), Val::Set(r)) => {
                let out = SetValue::new();
                for v in l.members() {
                    if !r.contains(&v) {
                        out.insert(v);
                    }
                }
                Ok(Val::Set(out))
            }
            _ => err_op(self, BinaryOpType::Sub, other),
        }
    }
}

impl Mul for &Val {
    type Output = Result<Val>;

    #[inline]
    fn mul(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_mul(*b))),
            (Val::Float(a), Val::Float(b)) => Ok(Val::Float(a * b)),
            (Val::Float(a), Val::Int(b)) => Ok(Val::Float(a * *b as f64)),
            (Val::Int(a), Val::Float(b)) => Ok(Val::Float(*a as f64 * b)),
            (Val::Str(s), Val::Int(n)) => {
                let bytes = alloc_len(s.len(), *n)?;
                let count = if s.is_empty() { 0 } else { bytes / s.len() };
                Ok(Val::from(s.repeat(count)))
            }
            (Val::List(l), Val::Int(n)) => Ok(Val::List(ListValue::new(repeat(&l.snapshot(), *n)?))),
            _ => err_op(self, BinaryOpType::Mul, other),
        }
    }
}

impl Div for &Val {
    type Output = Result<Val>;

    /// Int / Int truncates.
    #[inline]
    fn div(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(_), Val::Int(0)) => Err(eval_err("division by zero")),
            (Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_div(*b))),
            (Val::Float(a), Val::Float(b)) => Ok(Val::Float(a / b)),
            (Val::Float(a), Val::Int(b)) => Ok(Val::Float(a / *b as f64)),
            (Val::Int(a), Val::Float(b)) => Ok(Val::Float(*a as f64 / b)),
            _ => err_op(self, BinaryOpType::Div, other),
        }
    }
}

impl Rem for &Val {
    type Output = Result<Val>;

    #[inline]
    fn rem(self, other: Self) -> Self::Output {
        match (self, other) {
            (Val::Int(_), Val::Int(0)) => Err(eval_err("division by zero")),
            (Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_rem(*b))),
            (Val::Float(a), Val::Float(b)) => Ok(Val::Float(a % b)),
            (Val::Float(a), Val::Int(b)) => Ok(Val::Float(a % *b as f64)),
            (Val::Int(a), Val::Float(b)) => Ok(Val::Float(*a as f64 % b)),
            _ => err_op(self, BinaryOpType::Mod, other),
        }
    }
}

impl Val {
    /// Operator dispatch used by `BinaryOp`. `And`/`Or` return one of their
    /// operands, the way the short-circuit jump leaves it.
    pub fn binary_op(&self, op: BinaryOpType, other: &Val) -> Result<Val> {
        match op {
            BinaryOpType::Add => self + other,
            BinaryOpType::Sub => self - other,
            BinaryOpType::Mul => self * other,
            BinaryOpType::Div => self / other,
            BinaryOpType::Mod => self % other,
            BinaryOpType::And => Ok(if self.is_truthy() { other.clone() } else { self.clone() }),
            BinaryOpType::Or => Ok(if self.is_truthy() { self.clone() } else { other.clone() }),
            BinaryOpType::Power => power(self, other),
            _ => bitwise(self, op, other),
        }
    }

    /// Ordering between comparable values; ints and floats compare numerically.
    pub fn compare(&self, other: &Val) -> Result<Ordering> {
        let ord = match (self, other) {
            (Val::Int(a), Val::Int(b)) => Some(a.cmp(b)),
            (Val::Float(a), Val::Float(b)) => a.partial_cmp(b),
            (Val::Int(a), Val::Float(b)) => (*a as f64).partial_cmp(b),
            (Val::Float(a), Val::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
            (Val::Bool(a), Val::Bool(b)) => Some(a.cmp(b)),
            _ => {
                return Err(type_err(format!(
                    "cannot compare {} with {}",
                    self.type_name(),
                    other.type_name()
                )));
            }
        };
        ord.ok_or_else(|| eval_err("comparison with NaN"))
    }

    pub fn compare_op(&self, op: CompareOpType, other: &Val) -> Result<bool> {
        Ok(match op {
            CompareOpType::Eq => self == other,
            CompareOpType::Ne => self != other,
            CompareOpType::Lt => self.compare(other)? == Ordering::Less,
            CompareOpType::Le => self.compare(other)? != Ordering::Greater,
            CompareOpType::Gt => self.compare(other)? == Ordering::Greater,
            CompareOpType::Ge => self.compare(other)? != Ordering::Less,
        })
    }

    pub fn negate(&self) -> Result<Val> {
        match self {
            Val::Int(i) => Ok(Val::Int(i.wrapping_neg())),
            Val::Float(f) => Ok(Val::Float(-f)),
            other => Err(type_err(format!("bad operand type for unary -: {}", other.type_name()))),
        }
    }

    pub fn not(&self) -> Val {
        Val::Bool(!self.is_truthy())
    }
}

fn power(l: &Val, r: &Val) -> Result<Val> {
    match (l, r) {
        (Val::Int(a), Val::Int(b)) if *b >= 0 => Ok(Val::Int(a.wrapping_pow((*b).min(u32::MAX as i64) as u32))),
        (Val::Int(a), Val::Int(b)) => Ok(Val::Float((*a as f64).powf(*b as f64))),
        (Val::Float(a), Val::Float(b)) => Ok(Val::Float(a.powf(*b))),
        (Val::Float(a), Val::Int(b)) => Ok(Val::Float(a.powf(*b as f64))),
        (Val::Int(a), Val::Float(b)) => Ok(Val::Float((*a as f64).powf(*b))),
        _ => err_op(l, BinaryOpType::Power, r),
    }
}

fn bitwise(l: &Val, op: BinaryOpType, r: &Val) -> Result<Val> {
    match (l, r) {
        (Val::Int(a), Val::Int(b)) => {
            let v = match op {
                BinaryOpType::Xor => a ^ b,
                BinaryOpType::BitwiseAnd => a & b,
                BinaryOpType::BitwiseOr => a | b,
                BinaryOpType::LShift if (0..64).contains(b) => a.wrapping_shl(*b as u32),
                BinaryOpType::RShift if (0..64).contains(b) => a.wrapping_shr(*b as u32),
                BinaryOpType::LShift | BinaryOpType::RShift => {
                    return Err(eval_err(format!("invalid shift count: {b}")));
                }
                _ => return err_op(l, op, r),
            };
            Ok(Val::Int(v))
        }
        (Val::Bool(a), Val::Bool(b)) => match op {
            BinaryOpType::Xor => Ok(Val::Bool(a ^ b)),
            BinaryOpType::BitwiseAnd => Ok(Val::Bool(a & b)),
            BinaryOpType::BitwiseOr => Ok(Val::Bool(a | b)),
            _ => err_op(l, op, r),
        },
        (Val::Set(a), Val::Set(b)) => {
            let out = SetValue::new();
            match op {
                BinaryOpType::BitwiseOr => {
                    for v in a.members().into_iter().chain(b.members()) {
                        out.insert(v);
                    }
                }
                BinaryOpType::BitwiseAnd => {
                    for v in a.members() {
                        if b.contains(&v) {
                            out.insert(v);
                        }
                    }
                }
                _ => return err_op(l, op, r),
            }
            Ok(Val::Set(out))
        }
        _ => err_op(l, op, r),
    }
}

/// Value equality: numbers across int/float, containers by content, reference
/// values by identity.
pub(super) fn equals(l: &Val, r: &Val) -> bool {
    match (l, r) {
        (Val::Nil, Val::Nil) => true,
        (Val::Bool(a), Val::Bool(b)) => a == b,
        (Val::Int(a), Val::Int(b)) => a == b,
        (Val::Float(a), Val::Float(b)) => a == b,
        (Val::Int(a), Val::Float(b)) | (Val::Float(b), Val::Int(a)) => (*a as f64) == *b,
        (Val::Str(a), Val::Str(b)) => a == b,
        (Val::List(a), Val::List(b)) => Arc::ptr_eq(a, b) || a.snapshot() == b.snapshot(),
        (Val::Map(a), Val::Map(b)) => Arc::ptr_eq(a, b) || a.entries() == b.entries(),
        (Val::Set(a), Val::Set(b)) => {
            Arc::ptr_eq(a, b) || (a.len() == b.len() && a.members().iter().all(|v| b.contains(v)))
        }
        (Val::Function(a), Val::Function(b)) => Arc::ptr_eq(a, b),
        (Val::Builtin(a), Val::Builtin(b)) => a.same_as(b),
        (Val::BoundMethod(a), Val::BoundMethod(b)) => Arc::ptr_eq(a, b),
        (Val::Partial(a), Val::Partial(b)) => Arc::ptr_eq(a, b),
        (Val::Cell(a), Val::Cell(b)) => Arc::ptr_eq(a, b),
        (Val::Module(a), Val::Module(b)) => Arc::ptr_eq(a, b),
        (Val::Iterator(a), Val::Iterator(b)) => Arc::ptr_eq(a, b),
        (Val::Channel(a), Val::Channel(b)) => Arc::ptr_eq(a, b),
        (Val::Task(a), Val::Task(b)) => Arc::ptr_eq(a, b),
        (Val::Error(a), Val::Error(b)) => a == b,
        _ => false,
    }
}
