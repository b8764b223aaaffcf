//! Builtins for tasks and channels. Only installed when the VM allows
//! concurrency.

use anyhow::Result;
use brook_core::{
    error::ErrorKind,
    val::{ChannelValue, Val, alloc_len},
    vm::VmContext,
};

use crate::{fail, require_args, type_fail};

/// spawn(f, args...): runs `f(args...)` on the shared runtime and returns
/// its task. `task.wait()` yields the result.
pub fn spawn(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("spawn", args, 1, usize::MAX)?;
    if !ctx.concurrency_enabled() {
        return Err(fail(ErrorKind::Eval, "spawn() is disabled: concurrency is off"));
    }
    let (callee, rest) = (&args[0], &args[1..]);
    let task = ctx.spawn(callee.clone(), rest.to_vec())?;
    Ok(Val::Task(task))
}

/// chan([capacity]): a new channel. Capacity 0 is unbuffered.
pub fn chan(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("chan", args, 0, 1)?;
    let capacity = match args.first() {
        None => 0,
        Some(Val::Int(n)) if *n < 0 => {
            return Err(fail(
                ErrorKind::Eval,
                format!("chan() capacity must be >= 0 ({n} given)"),
            ));
        }
        Some(Val::Int(n)) => alloc_len(1, *n)?,
        Some(other) => return Err(type_fail("chan", "expected an int", other)),
    };
    Ok(Val::Channel(ChannelValue::new(capacity)))
}

pub fn close(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("close", args, 1, 1)?;
    match &args[0] {
        Val::Channel(c) => {
            c.close()?;
            Ok(Val::Nil)
        }
        other => Err(type_fail("close", "expected a channel", other)),
    }
}
