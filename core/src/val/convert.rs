use std::sync::Arc;

use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};
use crate::vm::{Constant, Globals};

use super::{FunctionValue, ListValue, MapValue, SetValue, Val};

impl From<String> for Val {
    #[inline]
    fn from(s: String) -> Self {
        Val::Str(Arc::<str>::from(s))
    }
}

impl From<&str> for Val {
    #[inline]
    fn from(s: &str) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Val {
    #[inline]
    fn from(s: Arc<str>) -> Self {
        Val::Str(s)
    }
}

impl From<i64> for Val {
    #[inline]
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<f64> for Val {
    #[inline]
    fn from(f: f64) -> Self {
        Val::Float(f)
    }
}

impl From<bool> for Val {
    #[inline]
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl<T> From<Vec<T>> for Val
where
    T: Into<Val>,
{
    fn from(v: Vec<T>) -> Self {
        Val::List(ListValue::new(v.into_iter().map(Into::into).collect()))
    }
}

impl<V> From<FastHashMap<Arc<str>, V>> for Val
where
    V: Into<Val>,
{
    fn from(m: FastHashMap<Arc<str>, V>) -> Self {
        let mut inner = fast_hash_map_with_capacity(m.len());
        for (k, v) in m {
            inner.insert(k, v.into());
        }
        Val::Map(MapValue::new(inner))
    }
}

impl<T> From<Option<T>> for Val
where
    T: Into<Val>,
{
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Val::Nil)
    }
}

impl Val {
    /// Materialize a constant. Containers are built fresh on every load so
    /// literals and parameter defaults never alias between evaluations.
    pub(crate) fn from_constant(c: &Constant, globals: &Arc<Globals>) -> Val {
        match c {
            Constant::Nil => Val::Nil,
            Constant::Bool(b) => Val::Bool(*b),
            Constant::Int(i) => Val::Int(*i),
            Constant::Float(f) => Val::Float(*f),
            Constant::Str(s) => Val::Str(s.clone()),
            Constant::List(items) => Val::list(items.iter().map(|c| Val::from_constant(c, globals)).collect()),
            Constant::Map(pairs) => Val::Map(MapValue::from_pairs(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Val::from_constant(v, globals)))
                    .collect(),
            )),
            Constant::Set(items) => {
                let set = SetValue::new();
                for item in items {
                    set.insert(Val::from_constant(item, globals));
                }
                Val::Set(set)
            }
            Constant::Function(template) => {
                Val::Function(FunctionValue::new(template.clone(), Vec::new(), globals.clone()))
            }
        }
    }
}
