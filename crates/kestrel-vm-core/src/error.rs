//! VM error types
//!
//! `VmError` is the abrupt-completion carrier. Every algorithm step that can
//! fail returns `Completion<T>` and is composed with `?`, so the first abrupt
//! completion short-circuits the rest of the algorithm unchanged.

use kestrel_gc::AllocError;
use thiserror::Error;

use crate::value::Value;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (argument is not the required kind of object)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error (index out of bounds, arithmetic overflow)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Syntax error (malformed numeric literal in a string conversion)
    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    /// A buffer was detached between validation and use.
    ///
    /// Surfaces to script as a TypeError.
    #[error("TypeError: {0}")]
    DetachedBuffer(String),

    /// Reentrancy went deeper than the configured call depth
    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    /// Thrown JS exception
    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),

    /// Host resource exhaustion. Not catchable by script.
    #[error(transparent)]
    OutOfMemory(#[from] AllocError),
}

/// A thrown JavaScript value
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// Side-effect-free rendering of the value
    pub message: String,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Kind of a script-visible error object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Plain `Error`
    Error,
    /// `TypeError`
    TypeError,
    /// `RangeError`
    RangeError,
    /// `SyntaxError`
    SyntaxError,
}

impl ErrorKind {
    /// Constructor name of this kind
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
        }
    }
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create a syntax error
    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError(msg.into())
    }

    /// Create a detached-buffer error
    pub fn detached_buffer(msg: impl Into<String>) -> Self {
        Self::DetachedBuffer(msg.into())
    }

    /// Create an exception from a thrown JS value
    pub fn exception(value: Value, message: impl Into<String>) -> Self {
        Self::Exception(Box::new(ThrownValue {
            value,
            message: message.into(),
        }))
    }

    /// Whether script-level error handling may intercept this completion.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, VmError::OutOfMemory(_))
    }

    /// Error object kind this completion materializes as, if it is an engine error.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            VmError::TypeError(_) | VmError::DetachedBuffer(_) => Some(ErrorKind::TypeError),
            VmError::RangeError(_) | VmError::StackOverflow => Some(ErrorKind::RangeError),
            VmError::SyntaxError(_) => Some(ErrorKind::SyntaxError),
            VmError::Exception(_) | VmError::OutOfMemory(_) => None,
        }
    }

    /// Message carried by an engine error.
    pub fn message(&self) -> String {
        match self {
            VmError::TypeError(msg)
            | VmError::RangeError(msg)
            | VmError::SyntaxError(msg)
            | VmError::DetachedBuffer(msg) => msg.clone(),
            VmError::StackOverflow => "Maximum call stack size exceeded".to_string(),
            VmError::Exception(thrown) => thrown.message.clone(),
            VmError::OutOfMemory(err) => err.to_string(),
        }
    }

    /// The thrown value of a user exception.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            VmError::Exception(thrown) => Some(&thrown.value),
            _ => None,
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;

/// Normal completion carrying `T`, or an abrupt completion.
pub type Completion<T = Value> = VmResult<T>;
