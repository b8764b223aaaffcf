use std::sync::{Arc, Mutex};

use anyhow::Result;
use core::fmt;

use crate::util::sync::lock;
use crate::vm::VmContext;

use super::{ChannelValue, ListValue, MapValue, Val};

/// Cursor over a container. `entry` is only meaningful right after `next`
/// returned true.
pub trait IteratorState: Send + 'static {
    fn next(&mut self, ctx: &mut VmContext<'_>) -> Result<bool>;

    /// Current `(key, value)` pair.
    fn entry(&self) -> Option<(Val, Val)>;

    fn debug_name(&self) -> &'static str {
        "iterator"
    }
}

/// Runtime handle for iterators; shared so `range` values can be passed around.
pub struct IteratorValue {
    origin: &'static str,
    state: Mutex<Box<dyn IteratorState>>,
}

impl fmt::Debug for IteratorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorValue").field("origin", &self.origin).finish()
    }
}

impl IteratorValue {
    pub fn new<S>(state: S) -> Arc<Self>
    where
        S: IteratorState,
    {
        let origin = state.debug_name();
        Arc::new(Self {
            origin,
            state: Mutex::new(Box::new(state)),
        })
    }

    pub fn next(&self, ctx: &mut VmContext<'_>) -> Result<bool> {
        lock(&self.state).next(ctx)
    }

    pub fn entry(&self) -> Option<(Val, Val)> {
        lock(&self.state).entry()
    }

    pub fn origin(&self) -> &'static str {
        self.origin
    }
}

pub(crate) struct ListIter {
    list: Arc<ListValue>,
    pos: usize,
    current: Option<(Val, Val)>,
}

impl ListIter {
    pub(crate) fn new(list: Arc<ListValue>) -> Self {
        Self {
            list,
            pos: 0,
            current: None,
        }
    }
}

impl IteratorState for ListIter {
    fn next(&mut self, _ctx: &mut VmContext<'_>) -> Result<bool> {
        match self.list.get(self.pos) {
            Some(v) => {
                self.current = Some((Val::Int(self.pos as i64), v));
                self.pos += 1;
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn entry(&self) -> Option<(Val, Val)> {
        self.current.clone()
    }

    fn debug_name(&self) -> &'static str {
        "list_iter"
    }
}

/// Walks a snapshot of the keys in sorted order; keys deleted mid-loop are skipped.
pub(crate) struct MapIter {
    map: Arc<MapValue>,
    keys: Vec<Arc<str>>,
    pos: usize,
    current: Option<(Val, Val)>,
}

impl MapIter {
    pub(crate) fn new(map: Arc<MapValue>) -> Self {
        let keys = map.keys();
        Self {
            map,
            keys,
            pos: 0,
            current: None,
        }
    }
}

impl IteratorState for MapIter {
    fn next(&mut self, _ctx: &mut VmContext<'_>) -> Result<bool> {
        while let Some(key) = self.keys.get(self.pos) {
            self.pos += 1;
            if let Some(v) = self.map.get(key) {
                self.current = Some((Val::Str(key.clone()), v));
                return Ok(true);
            }
        }
        self.current = None;
        Ok(false)
    }

    fn entry(&self) -> Option<(Val, Val)> {
        self.current.clone()
    }

    fn debug_name(&self) -> &'static str {
        "map_iter"
    }
}

/// Iterates over a fixed sequence of values; key and value are both the member.
pub(crate) struct MemberIter {
    members: std::vec::IntoIter<Val>,
    current: Option<Val>,
}

impl MemberIter {
    pub(crate) fn new(members: Vec<Val>) -> Self {
        Self {
            members: members.into_iter(),
            current: None,
        }
    }
}

impl IteratorState for MemberIter {
    fn next(&mut self, _ctx: &mut VmContext<'_>) -> Result<bool> {
        self.current = self.members.next();
        Ok(self.current.is_some())
    }

    fn entry(&self) -> Option<(Val, Val)> {
        self.current.clone().map(|v| (v.clone(), v))
    }

    fn debug_name(&self) -> &'static str {
        "set_iter"
    }
}

pub(crate) struct StrIter {
    chars: Vec<char>,
    pos: usize,
}

impl StrIter {
    pub(crate) fn new(s: &str) -> Self {
        Self {
            chars: s.chars().collect(),
            pos: 0,
        }
    }
}

impl IteratorState for StrIter {
    fn next(&mut self, _ctx: &mut VmContext<'_>) -> Result<bool> {
        if self.pos < self.chars.len() {
            self.pos += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn entry(&self) -> Option<(Val, Val)> {
        let idx = self.pos.checked_sub(1)?;
        let ch = self.chars.get(idx)?;
        let mut buf = [0u8; 4];
        Some((Val::Int(idx as i64), Val::from(&*ch.encode_utf8(&mut buf))))
    }

    fn debug_name(&self) -> &'static str {
        "string_iter"
    }
}

/// `range n`: 0, 1, ..., n-1.
pub(crate) struct IntIter {
    end: i64,
    next: i64,
}

impl IntIter {
    pub(crate) fn new(end: i64) -> Self {
        Self { end, next: 0 }
    }
}

impl IteratorState for IntIter {
    fn next(&mut self, _ctx: &mut VmContext<'_>) -> Result<bool> {
        if self.next < self.end {
            self.next += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn entry(&self) -> Option<(Val, Val)> {
        if self.next == 0 {
            return None;
        }
        let i = Val::Int(self.next - 1);
        Some((i.clone(), i))
    }

    fn debug_name(&self) -> &'static str {
        "int_iter"
    }
}

/// Receives until the channel is closed and drained. The key counts receives.
pub(crate) struct ChannelIter {
    chan: Arc<ChannelValue>,
    received: i64,
    current: Option<Val>,
}

impl ChannelIter {
    pub(crate) fn new(chan: Arc<ChannelValue>) -> Self {
        Self {
            chan,
            received: 0,
            current: None,
        }
    }
}

impl IteratorState for ChannelIter {
    fn next(&mut self, ctx: &mut VmContext<'_>) -> Result<bool> {
        self.current = self.chan.recv(ctx.cancel_token())?;
        if self.current.is_some() {
            self.received += 1;
        }
        Ok(self.current.is_some())
    }

    fn entry(&self) -> Option<(Val, Val)> {
        self.current.clone().map(|v| (Val::Int(self.received), v))
    }

    fn debug_name(&self) -> &'static str {
        "chan_iter"
    }
}
