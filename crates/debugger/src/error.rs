//! Error types for the debugger engine.
//!
//! Lookup misses (no line, no method, no breakpoint at an address) are not
//! errors; they are reported as `None`. The types here cover the failures a
//! caller has to react to: a full breakpoint table, an expression that does
//! not compile, and a VM exception raised while a compiled unit runs.

use std::fmt;
use thiserror::Error;

/// A numeric VM error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const BAD_TYPE_ADD: Self = Self(2003);
    pub const NUM_VAL_REQD: Self = Self(2004);
    pub const BAD_TYPE_SUB: Self = Self(2007);
    pub const DIVIDE_BY_ZERO: Self = Self(2008);
    pub const INVALID_COMPARISON: Self = Self(2009);
    pub const OBJ_VAL_REQD: Self = Self(2010);
    pub const PROPPTR_VAL_REQD: Self = Self(2011);
    pub const FUNCPTR_VAL_REQD: Self = Self(2013);
    pub const CANNOT_INDEX_TYPE: Self = Self(2014);
    pub const INDEX_OUT_OF_RANGE: Self = Self(2015);
    pub const NUM_OVERFLOW: Self = Self(2023);
    pub const INVALID_OPCODE: Self = Self(2301);
    pub const UNHANDLED_EXC: Self = Self(2302);
    /// Entering the debugger for this code releases the stack reserve.
    pub const STACK_OVERFLOW: Self = Self(2303);
    pub const BREAKPOINT: Self = Self(2307);
    /// Raised when a speculative evaluation would have a side effect.
    pub const BAD_SPEC_EVAL: Self = Self(2501);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VM error {}", self.0)
    }
}

/// A VM exception that crossed the evaluation boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The program threw an exception nobody caught
    #[error("{}", .message.as_deref().unwrap_or("Unhandled program exception"))]
    UnhandledException { message: Option<String> },

    /// The VM itself raised an error
    #[error("{message}")]
    Vm { code: ErrorCode, message: String },

    /// An engine limit (stack size, instruction budget) was exceeded
    #[error("{0}")]
    Limit(String),
}

impl RuntimeError {
    /// Creates a VM error with the given code and message.
    pub fn vm<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self::Vm {
            code,
            message: message.into(),
        }
    }

    /// Creates an unhandled exception error.
    pub fn unhandled(message: Option<String>) -> Self {
        Self::UnhandledException { message }
    }

    pub fn divide_by_zero() -> Self {
        Self::vm(ErrorCode::DIVIDE_BY_ZERO, "division by zero")
    }

    pub fn num_overflow() -> Self {
        Self::vm(ErrorCode::NUM_OVERFLOW, "numeric overflow")
    }

    pub fn index_out_of_range() -> Self {
        Self::vm(ErrorCode::INDEX_OUT_OF_RANGE, "index out of range")
    }

    pub fn bad_speculation() -> Self {
        Self::vm(
            ErrorCode::BAD_SPEC_EVAL,
            "expression has side effects and cannot be evaluated speculatively",
        )
    }

    /// Gets the VM error code, if the error carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Vm { code, .. } => Some(*code),
            Self::UnhandledException { .. } => Some(ErrorCode::UNHANDLED_EXC),
            Self::Limit(_) => None,
        }
    }
}

/// A single-line compiler diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompileError {
    message: String,
}

impl CompileError {
    /// Creates a compile error. Only the first line of the message is kept.
    pub fn new<S: AsRef<str>>(message: S) -> Self {
        let message = message.as_ref();
        let first = message.split('\n').next().unwrap_or(message);
        Self {
            message: first.trim_end_matches('\r').to_string(),
        }
    }

    /// Gets the diagnostic text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Debugger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DebugError {
    #[error("out of internal breakpoint records")]
    BreakpointCapacity,

    #[error("invalid breakpoint")]
    InvalidBreakpoint,

    #[error("{0}")]
    Compile(#[from] CompileError),

    #[error("error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("no debugging information is available at stack level {level}")]
    NoDebugInfo { level: usize },
}

/// Result type for debugger operations
pub type DebugResult<T> = Result<T, DebugError>;
