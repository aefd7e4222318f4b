//! Error types for the Strata engine.
//!
//! Every compile-time failure carries the 0-based offset of the offending
//! token in the SQL text. Compilation aborts on the first error; the compiler
//! instance stays usable for the next statement.

use alloc::format;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for compilation and execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed token.
    #[error("[{position}] {message}")]
    Lex { position: usize, message: String },

    /// Structural grammar violation.
    #[error("[{position}] {message}")]
    Parse { position: usize, message: String },

    /// Unknown or ambiguous column or table reference.
    #[error("[{position}] {message}")]
    ColumnResolution { position: usize, message: String },

    /// Join dependency graph cannot be ordered.
    #[error("[{position}] Cycle")]
    JoinCycle { position: usize },

    /// No function overload accepts the arguments.
    #[error("[{position}] {message}")]
    Signature { position: usize, message: String },

    /// Malformed date or interval literal.
    #[error("[{position}] {message}")]
    IntervalFormat { position: usize, message: String },

    /// Semantically invalid construct.
    #[error("[{position}] {message}")]
    ConstraintViolation { position: usize, message: String },

    /// Accessor or operation not supported by the receiver.
    #[error("unsupported operation: {message}")]
    Unsupported { message: String },

    /// Cursor used outside its lifecycle.
    #[error("cursor misuse: {message}")]
    CursorMisuse { message: String },

    /// Invalid table definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// Storage collaborator failure.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl Error {
    /// Creates a lexer error.
    pub fn lex(position: usize, message: impl Into<String>) -> Self {
        Error::Lex {
            position,
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }

    /// Creates an "Unexpected token" parse error.
    pub fn unexpected_token(position: usize, token: &str) -> Self {
        Self::parse(position, format!("Unexpected token: {}", token))
    }

    /// Creates an unbalanced bracket or block error.
    pub fn unbalanced(position: usize, what: &str) -> Self {
        Self::parse(position, format!("unbalanced {}", what))
    }

    /// Creates an invalid literal error.
    pub fn invalid_literal(position: usize, token: &str) -> Self {
        Self::parse(position, format!("invalid constant: {}", token))
    }

    /// Creates a duplicate alias error.
    pub fn duplicate_alias(position: usize) -> Self {
        Self::parse(position, "Duplicate alias")
    }

    /// Creates a column resolution error.
    pub fn column(position: usize, message: impl Into<String>) -> Self {
        Error::ColumnResolution {
            position,
            message: message.into(),
        }
    }

    /// Creates an "Invalid column" error.
    pub fn invalid_column(position: usize, name: &str) -> Self {
        Self::column(position, format!("Invalid column: {}", name))
    }

    /// Creates an ambiguous column error.
    pub fn ambiguous_column(position: usize) -> Self {
        Self::column(position, "ambiguous column")
    }

    /// Creates an invalid table reference error.
    pub fn invalid_table(position: usize) -> Self {
        Self::column(position, "Invalid table name or alias")
    }

    /// Creates a join cycle error.
    pub fn join_cycle(position: usize) -> Self {
        Error::JoinCycle { position }
    }

    /// Creates a signature error.
    pub fn signature(position: usize, message: impl Into<String>) -> Self {
        Error::Signature {
            position,
            message: message.into(),
        }
    }

    /// Creates an interval format error.
    pub fn interval_format(position: usize, message: impl Into<String>) -> Self {
        Error::IntervalFormat {
            position,
            message: message.into(),
        }
    }

    /// Creates an "Invalid date" error.
    pub fn invalid_date(position: usize) -> Self {
        Self::interval_format(position, "Invalid date")
    }

    /// Creates a constraint violation error.
    pub fn constraint(position: usize, message: impl Into<String>) -> Self {
        Error::ConstraintViolation {
            position,
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported {
            message: message.into(),
        }
    }

    /// Creates a cursor misuse error.
    pub fn cursor_misuse(message: impl Into<String>) -> Self {
        Error::CursorMisuse {
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Returns the source offset of a compile-time error.
    pub fn position(&self) -> Option<usize> {
        match self {
            Error::Lex { position, .. }
            | Error::Parse { position, .. }
            | Error::ColumnResolution { position, .. }
            | Error::JoinCycle { position }
            | Error::Signature { position, .. }
            | Error::IntervalFormat { position, .. }
            | Error::ConstraintViolation { position, .. } => Some(*position),
            _ => None,
        }
    }

    /// Returns the bare message without the position prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Lex { message, .. }
            | Error::Parse { message, .. }
            | Error::ColumnResolution { message, .. }
            | Error::Signature { message, .. }
            | Error::IntervalFormat { message, .. }
            | Error::ConstraintViolation { message, .. }
            | Error::Unsupported { message }
            | Error::CursorMisuse { message }
            | Error::InvalidSchema { message }
            | Error::Storage { message } => message,
            Error::JoinCycle { .. } => "Cycle",
        }
    }
}
