//! Builtins available to every script without an import.

use std::cmp::Ordering;
use std::time::Duration;

use anyhow::Result;
use brook_core::{
    error::{ErrorKind, VmError},
    rt,
    val::{Container, ErrorValue, Val, alloc_len},
    vm::VmContext,
};

use crate::{fail, require_args, type_fail};

/// len(x): length of a string, list, map, set or channel.
pub fn len(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("len", args, 1, 1)?;
    match args[0].length() {
        Ok(n) => Ok(Val::Int(n)),
        Err(_) => Err(type_fail("len", "unsupported argument", &args[0])),
    }
}

/// print(args...): writes the arguments separated by spaces and a newline.
pub fn print(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    let line = args.iter().map(Val::to_string).collect::<Vec<_>>().join(" ");
    println!("{line}");
    Ok(Val::Nil)
}

pub fn type_of(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("type", args, 1, 1)?;
    Ok(Val::from(args[0].type_name()))
}

/// str(x): strings pass through, everything else is rendered.
pub fn str(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("str", args, 0, 1)?;
    Ok(match args.first() {
        None => Val::from(""),
        Some(s @ Val::Str(_)) => s.clone(),
        Some(other) => Val::from(other.to_string()),
    })
}

pub fn int(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("int", args, 0, 1)?;
    let Some(value) = args.first() else {
        return Ok(Val::Int(0));
    };
    match value {
        Val::Int(i) => Ok(Val::Int(*i)),
        Val::Float(f) => Ok(Val::Int(*f as i64)),
        Val::Bool(b) => Ok(Val::Int(i64::from(*b))),
        Val::Str(s) => parse_int(s.trim())
            .map(Val::Int)
            .ok_or_else(|| fail(ErrorKind::Eval, format!("invalid literal for int(): \"{s}\""))),
        other => Err(type_fail("int", "unsupported argument", other)),
    }
}

fn parse_int(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = digits.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if negative { -magnitude } else { magnitude })
}

pub fn float(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("float", args, 0, 1)?;
    let Some(value) = args.first() else {
        return Ok(Val::Float(0.0));
    };
    match value {
        Val::Int(i) => Ok(Val::Float(*i as f64)),
        Val::Float(f) => Ok(Val::Float(*f)),
        Val::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Val::Float)
            .map_err(|_| fail(ErrorKind::Eval, format!("invalid literal for float(): \"{s}\""))),
        other => Err(type_fail("float", "unsupported argument", other)),
    }
}

/// list(): empty list. list(n): n nils. list(iterable): its values; a map
/// gives its keys.
pub fn list(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("list", args, 0, 1)?;
    let Some(value) = args.first() else {
        return Ok(Val::list(Vec::new()));
    };
    match value {
        Val::Int(n) if *n < 0 => Err(fail(
            ErrorKind::Eval,
            format!("list() argument must be >= 0 ({n} given)"),
        )),
        Val::Int(n) => Ok(Val::list(vec![Val::Nil; alloc_len(1, *n)?])),
        Val::List(l) => Ok(Val::list(l.snapshot())),
        Val::Map(m) => Ok(Val::list(m.keys().into_iter().map(Val::Str).collect())),
        other => {
            let it = other
                .iter()
                .map_err(|_| type_fail("list", "expected an iterable", other))?;
            let mut items = Vec::new();
            while it.next(ctx)? {
                if let Some((_, v)) = it.entry() {
                    items.push(v);
                }
            }
            Ok(Val::list(items))
        }
    }
}

/// keys(x): map keys, list indices or set members.
pub fn keys(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("keys", args, 1, 1)?;
    match &args[0] {
        Val::Map(m) => Ok(Val::list(m.keys().into_iter().map(Val::Str).collect())),
        Val::List(l) => Ok(Val::list((0..l.len() as i64).map(Val::Int).collect())),
        Val::Set(s) => Ok(Val::list(s.members())),
        other => Err(type_fail("keys", "unsupported argument", other)),
    }
}

/// error(msg, args...): raises an error. `{}` placeholders in the message
/// are filled from the remaining arguments.
pub fn error(args: &[Val], _ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("error", args, 1, usize::MAX)?;
    match &args[0] {
        e @ Val::Error(_) => Ok(e.clone()),
        Val::Str(msg) => Ok(Val::Error(ErrorValue::new(format_message(msg, &args[1..])))),
        other => Err(type_fail("error", "expected a string", other)),
    }
}

fn format_message(fmt: &str, rest: &[Val]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut rest = rest.iter();
    let mut pieces = fmt.split("{}").peekable();
    while let Some(piece) = pieces.next() {
        out.push_str(piece);
        if pieces.peek().is_some() {
            match rest.next() {
                Some(v) => out.push_str(&v.to_string()),
                None => out.push_str("{}"),
            }
        }
    }
    for v in rest {
        out.push(' ');
        out.push_str(&v.to_string());
    }
    out
}

/// try(a, b, ...): the first argument that succeeds. Callables are invoked;
/// a function taking parameters receives the previous error. Other values
/// succeed as they are. When everything fails the last error is raised.
/// Cancellation and exhausted limits are never recovered.
pub fn try_call(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("try", args, 1, usize::MAX)?;
    let mut last: Option<VmError> = None;
    for candidate in args {
        if !candidate.is_callable() {
            return Ok(candidate.clone());
        }
        let call_args = match (candidate, &last) {
            (Val::Function(f), Some(e)) if !f.params().is_empty() => {
                vec![Val::Error(ErrorValue::with_kind(e.message.clone(), e.kind))]
            }
            _ => Vec::new(),
        };
        match ctx.call(candidate, &call_args) {
            Ok(value) => return Ok(value),
            Err(e) => {
                let e = VmError::from_anyhow(&e);
                if matches!(e.kind, ErrorKind::Cancelled | ErrorKind::Resource) {
                    return Err(anyhow::Error::new(e));
                }
                tracing::trace!(error = %e, "try candidate failed");
                last = Some(e);
            }
        }
    }
    match last {
        Some(e) => Err(anyhow::Error::new(VmError::new(e.kind, e.message))),
        None => Ok(Val::Nil),
    }
}

/// sorted(x[, less]): a new sorted list of a list, set, string or map keys.
/// `less(a, b)` decides the order when given.
pub fn sorted(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("sorted", args, 1, 2)?;
    let mut items = match &args[0] {
        Val::List(l) => l.snapshot(),
        Val::Set(s) => s.members(),
        Val::Map(m) => m.keys().into_iter().map(Val::Str).collect(),
        Val::Str(s) => s.chars().map(|c| Val::from(c.to_string())).collect(),
        other => return Err(type_fail("sorted", "unsupported argument", other)),
    };
    let less = match args.get(1) {
        None => None,
        Some(f) if f.is_callable() => Some(f),
        Some(other) => return Err(type_fail("sorted", "expected a function as the second argument", other)),
    };

    let mut failure: Option<anyhow::Error> = None;
    items.sort_by(|a, b| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        let result = match less {
            None => a.compare(b),
            Some(f) => compare_with(ctx, f, a, b),
        };
        result.unwrap_or_else(|e| {
            failure = Some(e);
            Ordering::Equal
        })
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(Val::list(items)),
    }
}

fn compare_with(ctx: &mut VmContext<'_>, less: &Val, a: &Val, b: &Val) -> Result<Ordering> {
    if ctx.call(less, &[a.clone(), b.clone()])?.is_truthy() {
        return Ok(Ordering::Less);
    }
    if ctx.call(less, &[b.clone(), a.clone()])?.is_truthy() {
        return Ok(Ordering::Greater);
    }
    Ok(Ordering::Equal)
}

/// sleep(seconds): blocks the calling task; cancellation wakes it early.
pub fn sleep(args: &[Val], ctx: &mut VmContext<'_>) -> Result<Val> {
    require_args("sleep", args, 1, 1)?;
    let seconds = match &args[0] {
        Val::Int(i) => *i as f64,
        Val::Float(f) => *f,
        other => return Err(type_fail("sleep", "expected a number", other)),
    };
    if seconds < 0.0 || !seconds.is_finite() {
        return Err(fail(ErrorKind::Eval, format!("sleep() duration must be >= 0 ({seconds} given)")));
    }
    rt::sleep(Duration::from_secs_f64(seconds), ctx.cancel_token())?;
    Ok(Val::Nil)
}
