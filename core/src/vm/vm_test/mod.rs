pub(super) use std::sync::Arc;

pub(super) use anyhow::Result;

pub(super) use crate::{
    error::{ErrorKind, VmError},
    import::MemoryImporter,
    val::{Builtin, ChannelValue, Val},
    vm::{Limits, VirtualMachine, VmContext, VmOptions, compile_source},
};

fn native_len(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    use crate::val::Container;
    Ok(Val::Int(args[0].length()?))
}

/// `apply(f, x)` calls back into the script.
fn native_apply(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    ctx.call(&args[0], &args[1..])
}

fn native_chan(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    let capacity = args.first().and_then(Val::as_int).unwrap_or(0);
    Ok(Val::Channel(ChannelValue::new(capacity.max(0) as usize)))
}

fn native_close(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    match &args[0] {
        Val::Channel(c) => {
            c.close()?;
            Ok(Val::Nil)
        }
        other => Err(anyhow::anyhow!("close: expected chan, got {}", other.type_name())),
    }
}

fn native_fail(_args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    Ok(Val::error("boom"))
}

/// Routes VM logs to the test output. `RUST_LOG=brook_core=trace` shows
/// import and task events.
pub(super) fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Host globals most tests run with.
pub(super) fn options() -> VmOptions {
    VmOptions::new()
        .with_global("len", Val::Builtin(Builtin::new("len", native_len)))
        .with_global("apply", Val::Builtin(Builtin::new("apply", native_apply)))
        .with_global("chan", Val::Builtin(Builtin::new("chan", native_chan)))
        .with_global("close", Val::Builtin(Builtin::new("close", native_close)))
        .with_global("fail", Val::Builtin(Builtin::new("fail", native_fail)))
        .with_concurrency(true)
}

pub(super) fn vm_for(src: &str, options: VmOptions) -> Result<VirtualMachine> {
    let code = compile_source(src, "main", &options.global_names())?;
    Ok(VirtualMachine::new(code, options))
}

pub(super) fn run_with(src: &str, options: VmOptions) -> Result<Val> {
    let mut vm = vm_for(src, options)?;
    vm.run()?;
    Ok(vm.tos().unwrap_or_default())
}

pub(super) fn run(src: &str) -> Val {
    match run_with(src, options()) {
        Ok(v) => v,
        Err(e) => panic!("script failed: {e}\n{src}"),
    }
}

pub(super) fn run_err(src: &str) -> VmError {
    match run_with(src, options()) {
        Ok(v) => panic!("expected failure, got {v}\n{src}"),
        Err(e) => VmError::from_anyhow(&e),
    }
}

pub(super) fn ints(values: &[i64]) -> Val {
    Val::list(values.iter().map(|i| Val::Int(*i)).collect())
}

mod concurrency;
mod control_flow;
mod functions;
mod host;
mod modules;
mod semantics;
