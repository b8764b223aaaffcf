use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::import::Importer;
use crate::rt::ExecContext;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Val;

/// Resource ceilings of one VM. Exceeding any of them is a `Resource` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_args: usize,
    pub max_frames: usize,
    /// Script calls made from native code (deferred calls, `try`, module
    /// bodies) that may be in flight at once on one VM.
    pub max_nesting: usize,
    pub max_stack: usize,
    pub initial_stack: usize,
    pub initial_frames: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_args: 256,
            max_frames: 1024,
            max_nesting: 64,
            max_stack: 1024,
            initial_stack: 64,
            initial_frames: 16,
        }
    }
}

impl Limits {
    /// Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let limits: Limits = toml::from_str(source).context("invalid limits configuration")?;
        limits.validated()
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let limits: Limits = serde_json::from_str(source).context("invalid limits configuration")?;
        limits.validated()
    }

    fn validated(self) -> Result<Self> {
        if self.max_stack == 0 || self.max_frames == 0 || self.max_nesting == 0 {
            anyhow::bail!("max_stack, max_frames and max_nesting must be positive");
        }
        Ok(Self {
            initial_stack: self.initial_stack.min(self.max_stack),
            initial_frames: self.initial_frames.min(self.max_frames),
            ..self
        })
    }
}

/// Everything a [`VirtualMachine`](crate::vm::VirtualMachine) is built from
/// besides its code.
#[derive(Clone, Default)]
pub struct VmOptions {
    pub(crate) globals: FastHashMap<Arc<str>, Val>,
    pub(crate) importer: Option<Arc<dyn Importer>>,
    pub(crate) concurrency: bool,
    pub(crate) limits: Limits,
    pub(crate) context: ExecContext,
}

impl fmt::Debug for VmOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmOptions")
            .field("globals", &self.global_names())
            .field("importer", &self.importer.is_some())
            .field("concurrency", &self.concurrency)
            .field("limits", &self.limits)
            .finish()
    }
}

impl VmOptions {
    pub fn new() -> Self {
        Self {
            globals: fast_hash_map_new(),
            ..Default::default()
        }
    }

    pub fn with_global(mut self, name: impl Into<Arc<str>>, value: Val) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    pub fn with_globals<I, S>(mut self, globals: I) -> Self
    where
        I: IntoIterator<Item = (S, Val)>,
        S: Into<Arc<str>>,
    {
        self.globals.extend(globals.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn with_importer(mut self, importer: impl Importer + 'static) -> Self {
        self.importer = Some(Arc::new(importer));
        self
    }

    pub fn with_shared_importer(mut self, importer: Arc<dyn Importer>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_concurrency(mut self, enabled: bool) -> Self {
        self.concurrency = enabled;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_context(mut self, context: ExecContext) -> Self {
        self.context = context;
        self
    }

    /// Host global names in compile order.
    pub fn global_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.globals.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn concurrency_enabled(&self) -> bool {
        self.concurrency
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}
