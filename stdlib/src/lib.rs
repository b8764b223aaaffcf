pub mod concurrency;
pub mod globals;


use anyhow::Result;
use brook_core::{
    error::{ErrorKind, VmError},
    val::{Builtin, NativeFn, Val},
    vm::{VirtualMachine, VmOptions, compile_source},
};

/// Which builtins [`builtins`] hands out.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinOptions {
    /// Adds `spawn`, `chan` and `close`.
    pub concurrency: bool,
}

impl BuiltinOptions {
    pub fn with_concurrency(mut self, enabled: bool) -> Self {
        self.concurrency = enabled;
        self
    }
}

const CORE: &[(&str, NativeFn)] = &[
    ("len", globals::len),
    ("print", globals::print),
    ("type", globals::type_of),
    ("str", globals::str),
    ("int", globals::int),
    ("float", globals::float),
    ("list", globals::list),
    ("keys", globals::keys),
    ("error", globals::error),
    ("try", globals::try_call),
    ("sorted", globals::sorted),
    ("sleep", globals::sleep),
];

const CONCURRENCY: &[(&str, NativeFn)] = &[
    ("spawn", concurrency::spawn),
    ("chan", concurrency::chan),
    ("close", concurrency::close),
];

/// Global builtin functions, ready for [`VmOptions::with_globals`].
pub fn builtins(options: &BuiltinOptions) -> Vec<(&'static str, Val)> {
    let extra: &[(&str, NativeFn)] = if options.concurrency { CONCURRENCY } else { &[] };
    CORE.iter()
        .chain(extra)
        .map(|&(name, func)| (name, Val::Builtin(Builtin::new(name, func))))
        .collect()
}

/// Add the builtins to `options`. Globals the host already set win.
pub fn install(options: VmOptions) -> VmOptions {
    let builtin_options = BuiltinOptions::default().with_concurrency(options.concurrency_enabled());
    let missing: Vec<_> = builtins(&builtin_options)
        .into_iter()
        .filter(|(name, _)| !options.has_global(name))
        .collect();
    options.with_globals(missing)
}

/// Compile and run `source` with every builtin, concurrency included.
pub fn eval(source: &str) -> Result<Val> {
    eval_with(source, VmOptions::new().with_concurrency(true))
}

/// Compile and run `source` with the builtins added to `options`.
pub fn eval_with(source: &str, options: VmOptions) -> Result<Val> {
    let options = install(options);
    let code = compile_source(source, "main", &options.global_names())?;
    let mut vm = VirtualMachine::new(code, options);
    vm.run()?;
    Ok(vm.tos().unwrap_or_default())
}

/// Error for a builtin called with the wrong number of arguments.
pub(crate) fn require_args(name: &str, args: &[Val], min: usize, max: usize) -> Result<()> {
    let given = args.len();
    if given >= min && given <= max {
        return Ok(());
    }
    let expected = match (min, max) {
        (min, max) if min == max => format!("{min}"),
        (min, usize::MAX) => format!("at least {min}"),
        (min, max) => format!("{min} to {max}"),
    };
    let noun = if (min, max) == (1, 1) { "argument" } else { "arguments" };
    Err(fail(
        ErrorKind::Args,
        format!("{name}() takes {expected} {noun} ({given} given)"),
    ))
}

pub(crate) fn fail(kind: ErrorKind, message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(VmError::new(kind, message))
}

pub(crate) fn type_fail(name: &str, what: &str, got: &Val) -> anyhow::Error {
    fail(
        ErrorKind::Type,
        format!("{name}() {what} ({} given)", got.type_name()),
    )
}
