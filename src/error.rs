//! The closed error-tag set used throughout the interpreter.
//!
//! Every fallible operation in this crate returns [`RunResult<T>`]. The
//! interpreter never catches an error internally — each step either succeeds
//! or propagates the error to the user-facing entry point, which renders a
//! call stack (see [`RunError::render`]). The sole exception is
//! [`ExcType::Mismatch`], which the graph matcher (`graph.rs`) uses as an
//! internal control-flow signal and never lets escape a completed match.

use std::fmt;

/// The closed tagged set of error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum ExcType {
    Runtime,
    InvalidArgument,
    Attribute,
    Name,
    Value,
    Type,
    Index,
    /// Used only as an internal control-flow signal inside the graph matcher;
    /// never surfaced past a successful or exhausted match loop.
    Mismatch,
    Syntax,
}

/// One frame of the rendered call stack attached to a [`RunError`].
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Human-readable description of what was being evaluated, e.g. a
    /// function name or `"<lambda>"`.
    pub what: String,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  in {}", self.what)
    }
}

/// An error produced during lowering, interpretation, or matching.
///
/// Carries a human-readable message and a stack trail accumulated as the
/// error propagates outward. Frames are pushed with [`RunError::with_frame`]
/// at each closure/method boundary the error passes through.
#[derive(Debug, Clone)]
pub struct RunError {
    pub kind: ExcType,
    pub message: String,
    pub stack: Vec<StackFrame>,
}

impl RunError {
    pub fn new(kind: ExcType, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), stack: Vec::new() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ExcType::Runtime, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ExcType::InvalidArgument, message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(ExcType::Attribute, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ExcType::Name, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ExcType::Value, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExcType::Type, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ExcType::Index, message)
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::new(ExcType::Mismatch, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ExcType::Syntax, message)
    }

    /// Appends a stack frame as the error unwinds through a closure or method call.
    #[must_use]
    pub fn with_frame(mut self, what: impl Into<String>) -> Self {
        self.stack.push(StackFrame { what: what.into() });
        self
    }

    /// Renders the error class, message, and call stack for the user-facing
    /// entry point ("a failed lowering, interpretation, or match
    /// prints the error class and message with a stack").
    pub fn render(&self) -> String {
        let mut out = format!("{}: {}", self.kind, self.message);
        for frame in &self.stack {
            out.push('\n');
            out.push_str(&frame.to_string());
        }
        out
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RunError {}

pub type RunResult<T> = Result<T, RunError>;
