use std::collections::HashMap;

use anyhow::Result;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::error::{ErrorKind, err, eval_err, type_err};
use crate::vm::VmContext;

use super::{Builtin, Container, NativeFn, Val};

// type_name -> method_name -> Builtin
static METHOD_REGISTRY: Lazy<DashMap<String, HashMap<String, Builtin>>> = Lazy::new(|| {
    let registry = DashMap::new();
    install_core_methods(&registry);
    registry
});

/// Register a method for a type name. The receiver is passed as `args[0]`.
pub fn register_method(type_name: &str, method: &'static str, func: NativeFn) {
    METHOD_REGISTRY
        .entry(type_name.to_string())
        .or_default()
        .insert(method.to_string(), Builtin::new(method, func));
}

/// Find a method for a receiver value by its type name.
pub fn find_method_for_val(receiver: &Val, method: &str) -> Option<Builtin> {
    METHOD_REGISTRY
        .get(receiver.type_name())
        .and_then(|methods| methods.get(method).copied())
}

fn install_core_methods(registry: &DashMap<String, HashMap<String, Builtin>>) {
    let table: &[(&str, &'static str, NativeFn)] = &[
        ("list", "append", list_append),
        ("list", "extend", list_extend),
        ("list", "pop", list_pop),
        ("list", "len", any_len),
        ("map", "keys", map_keys),
        ("map", "values", map_values),
        ("map", "get", map_get),
        ("map", "delete", map_delete),
        ("map", "len", any_len),
        ("set", "add", set_add),
        ("set", "remove", set_remove),
        ("set", "len", any_len),
        ("string", "len", any_len),
        ("string", "upper", str_upper),
        ("string", "lower", str_lower),
        ("string", "split", str_split),
        ("string", "contains", str_contains),
        ("chan", "send", chan_send),
        ("chan", "receive", chan_receive),
        ("chan", "close", chan_close),
        ("chan", "len", any_len),
        ("chan", "cap", chan_cap),
        ("task", "wait", task_wait),
        ("error", "message", error_message),
    ];
    for (type_name, method, func) in table {
        registry
            .entry(type_name.to_string())
            .or_default()
            .insert(method.to_string(), Builtin::new(*method, *func));
    }
}

/// `args` includes the receiver; counts exclude it.
fn check_arity(method: &str, args: &[Val], min: usize, max: usize) -> Result<()> {
    let given = args.len().saturating_sub(1);
    if given < min || given > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(err(
            ErrorKind::Args,
            format!("method \"{method}\" takes {expected} arguments ({given} given)"),
        ));
    }
    Ok(())
}

fn any_len(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("len", args, 0, 0)?;
    Ok(Val::Int(args[0].length()?))
}

fn list_append(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    let Val::List(list) = &args[0] else {
        return Err(type_err("append: receiver must be a list"));
    };
    list.extend(args[1..].to_vec());
    Ok(args[0].clone())
}

fn list_extend(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("extend", args, 1, 1)?;
    let Val::List(list) = &args[0] else {
        return Err(type_err("extend: receiver must be a list"));
    };
    match &args[1] {
        Val::List(other) => list.extend(other.snapshot()),
        other => return Err(type_err(format!("extend: expected a list (got {})", other.type_name()))),
    }
    Ok(args[0].clone())
}

fn list_pop(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("pop", args, 0, 0)?;
    let Val::List(list) = &args[0] else {
        return Err(type_err("pop: receiver must be a list"));
    };
    list.pop().ok_or_else(|| eval_err("pop from empty list"))
}

fn map_keys(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("keys", args, 0, 0)?;
    let Val::Map(map) = &args[0] else {
        return Err(type_err("keys: receiver must be a map"));
    };
    Ok(Val::list(map.keys().into_iter().map(Val::Str).collect()))
}

fn map_values(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("values", args, 0, 0)?;
    let Val::Map(map) = &args[0] else {
        return Err(type_err("values: receiver must be a map"));
    };
    Ok(Val::list(map.entries().into_iter().map(|(_, v)| v).collect()))
}

fn map_get(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("get", args, 1, 2)?;
    let Val::Map(map) = &args[0] else {
        return Err(type_err("get: receiver must be a map"));
    };
    let fallback = args.get(2).cloned().unwrap_or_default();
    match &args[1] {
        Val::Str(key) => Ok(map.get(key).unwrap_or(fallback)),
        other => Err(type_err(format!("map key must be a string (got {})", other.type_name()))),
    }
}

fn map_delete(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("delete", args, 1, 1)?;
    let Val::Map(map) = &args[0] else {
        return Err(type_err("delete: receiver must be a map"));
    };
    match &args[1] {
        Val::Str(key) => Ok(map.remove(key).unwrap_or_default()),
        other => Err(type_err(format!("map key must be a string (got {})", other.type_name()))),
    }
}

fn set_add(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("add", args, 1, 1)?;
    let Val::Set(set) = &args[0] else {
        return Err(type_err("add: receiver must be a set"));
    };
    if !set.insert(args[1].clone()) {
        return Err(type_err(format!("unhashable type: {}", args[1].type_name())));
    }
    Ok(args[0].clone())
}

fn set_remove(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("remove", args, 1, 1)?;
    let Val::Set(set) = &args[0] else {
        return Err(type_err("remove: receiver must be a set"));
    };
    Ok(Val::Bool(set.remove(&args[1])))
}

fn receiver_str<'a>(method: &str, args: &'a [Val]) -> Result<&'a str> {
    args[0]
        .as_str()
        .ok_or_else(|| type_err(format!("{method}: receiver must be a string")))
}

fn str_upper(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("upper", args, 0, 0)?;
    Ok(Val::from(receiver_str("upper", args)?.to_uppercase()))
}

fn str_lower(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("lower", args, 0, 0)?;
    Ok(Val::from(receiver_str("lower", args)?.to_lowercase()))
}

fn str_split(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("split", args, 0, 1)?;
    let s = receiver_str("split", args)?;
    let parts: Vec<Val> = match args.get(1) {
        None => s.split_whitespace().map(Val::from).collect(),
        Some(Val::Str(sep)) => s.split(sep.as_ref()).map(Val::from).collect(),
        Some(other) => return Err(type_err(format!("split: separator must be a string (got {})", other.type_name()))),
    };
    Ok(Val::list(parts))
}

fn str_contains(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("contains", args, 1, 1)?;
    Ok(Val::Bool(args[0].contains(&args[1])?))
}

fn chan_send(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("send", args, 1, 1)?;
    let Val::Channel(chan) = &args[0] else {
        return Err(type_err("send: receiver must be a chan"));
    };
    chan.send(args[1].clone(), ctx.cancel_token())?;
    Ok(Val::Nil)
}

fn chan_receive(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("receive", args, 0, 0)?;
    let Val::Channel(chan) = &args[0] else {
        return Err(type_err("receive: receiver must be a chan"));
    };
    // [value, ok]: ok is false once the channel is closed and drained
    let (value, ok) = match chan.recv(ctx.cancel_token())? {
        Some(v) => (v, true),
        None => (Val::Nil, false),
    };
    Ok(Val::list(vec![value, Val::Bool(ok)]))
}

fn chan_close(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("close", args, 0, 0)?;
    let Val::Channel(chan) = &args[0] else {
        return Err(type_err("close: receiver must be a chan"));
    };
    chan.close()?;
    Ok(Val::Nil)
}

fn chan_cap(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("cap", args, 0, 0)?;
    let Val::Channel(chan) = &args[0] else {
        return Err(type_err("cap: receiver must be a chan"));
    };
    Ok(Val::Int(chan.capacity() as i64))
}

fn task_wait(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("wait", args, 0, 0)?;
    let Val::Task(task) = &args[0] else {
        return Err(type_err("wait: receiver must be a task"));
    };
    task.wait(ctx.cancel_token())
}

fn error_message(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    check_arity("message", args, 0, 0)?;
    let Val::Error(e) = &args[0] else {
        return Err(type_err("message: receiver must be an error"));
    };
    Ok(Val::from(e.message.as_str()))
}
