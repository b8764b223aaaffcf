use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::error::{ErrorKind, err};
use crate::val::Val;
use crate::vm::{Code, Globals};

/// An executed module: its name and the global namespace its body populated.
/// Native modules have no code.
pub struct ModuleValue {
    name: Arc<str>,
    code: Option<Arc<Code>>,
    globals: Arc<Globals>,
}

impl fmt::Debug for ModuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleValue")
            .field("name", &self.name)
            .field("members", &self.globals.len())
            .finish()
    }
}

impl ModuleValue {
    pub fn new(name: impl Into<Arc<str>>, code: Arc<Code>, globals: Arc<Globals>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            code: Some(code),
            globals,
        })
    }

    /// Module backed by host-provided values, importable by name.
    pub fn native<I, S>(name: impl Into<Arc<str>>, members: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (S, Val)>,
        S: Into<Arc<str>>,
    {
        let (names, values): (Vec<Arc<str>>, Vec<Val>) = members.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Arc::new(Self {
            name: name.into(),
            code: None,
            globals: Globals::new(names, values),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> Option<&Arc<Code>> {
        self.code.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<Val> {
        self.globals.lookup(name)
    }

    pub fn attr(&self, name: &str) -> Result<Val> {
        self.get(name).ok_or_else(|| {
            err(
                ErrorKind::Eval,
                format!("attribute \"{name}\" not found on module \"{}\"", self.name),
            )
        })
    }

    /// Member names, sorted.
    pub fn names(&self) -> Vec<Arc<str>> {
        let mut names = self.globals.names();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
