use std::fmt;

use crate::token::{ParseError, Position};

/// Broad category of a failure, so hosts can tell a failing script from a
/// caller that gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Parse or compile failure; no code was produced.
    Compile,
    /// Wrong operand kind for an operation.
    Type,
    /// Any other runtime failure (missing attribute, bad index, ...).
    Eval,
    /// Wrong number of arguments.
    Args,
    /// Configured stack, frame or argument limits exceeded.
    Resource,
    /// Module not found or requested name missing from a module.
    Import,
    /// Send on a closed channel or double close.
    Channel,
    /// The execution context was cancelled.
    Cancelled,
    /// A panic caught at the `run` boundary.
    Panic,
    /// A native returned an error value.
    Raised,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Compile => "compile error",
            ErrorKind::Type => "type error",
            ErrorKind::Eval => "eval error",
            ErrorKind::Args => "args error",
            ErrorKind::Resource => "resource error",
            ErrorKind::Import => "import error",
            ErrorKind::Channel => "channel error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Panic => "panic",
            ErrorKind::Raised => "error",
        };
        f.write_str(s)
    }
}

/// Structured error carried inside `anyhow::Error` through the compiler and VM.
#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<Position>,
}

impl VmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        if position.is_known() {
            self.position = Some(position);
        }
        self
    }

    /// Kind of an arbitrary error; errors raised without a `VmError` count as `Eval`.
    pub fn kind_of(err: &anyhow::Error) -> ErrorKind {
        err.downcast_ref::<VmError>().map(|e| e.kind).unwrap_or(ErrorKind::Eval)
    }

    /// Converts any error into a `VmError`, keeping the context chain as the message.
    pub fn from_anyhow(err: &anyhow::Error) -> VmError {
        match err.downcast_ref::<VmError>() {
            Some(e) => e.clone(),
            None => VmError::new(ErrorKind::Eval, format!("{err:#}")),
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Raised => write!(f, "{}", self.message)?,
            kind => write!(f, "{kind}: {}", self.message)?,
        }
        if let Some(pos) = self.position {
            write!(f, " (line {}, column {})", pos.line, pos.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for VmError {}

impl From<ParseError> for VmError {
    fn from(err: ParseError) -> Self {
        VmError {
            kind: ErrorKind::Compile,
            message: err.message,
            position: err.span.map(|s| s.start),
        }
    }
}

pub(crate) fn err(kind: ErrorKind, message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(VmError::new(kind, message))
}

pub(crate) fn type_err(message: impl Into<String>) -> anyhow::Error {
    err(ErrorKind::Type, message)
}

pub(crate) fn eval_err(message: impl Into<String>) -> anyhow::Error {
    err(ErrorKind::Eval, message)
}

/// Attach `position` unless an inner frame already did.
pub(crate) fn annotate(error: anyhow::Error, position: Position) -> anyhow::Error {
    if !position.is_known() {
        return error;
    }
    match error.downcast::<VmError>() {
        Ok(mut e) => {
            if e.position.is_none() {
                e.position = Some(position);
            }
            anyhow::Error::new(e)
        }
        Err(other) => anyhow::Error::new(VmError::new(ErrorKind::Eval, format!("{other:#}")).at(position)),
    }
}

/// Attach `position` even when an inner frame already did. Used where a
/// failure belongs to the statement that triggered it, such as an import.
pub(crate) fn relocate(error: anyhow::Error, kind: ErrorKind, position: Position) -> anyhow::Error {
    let mut e = match error.downcast::<VmError>() {
        Ok(e) => e,
        Err(other) => VmError::new(kind, format!("{other:#}")),
    };
    e.position = None;
    anyhow::Error::new(e.at(position))
}
