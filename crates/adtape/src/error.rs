//! Error types for adtape.

use thiserror::Error;

/// Errors that can occur while building or differentiating expressions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdError {
    /// Operand is not the expected expression kind (e.g. forward mixed with reverse).
    #[error("unsupported operand for {op}: expected {expected}, got {found}")]
    UnsupportedType {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Binary operation between expressions of different lengths.
    #[error("length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Divisor is, or contains, zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A multi-element expression was nested inside a composite construction.
    #[error("cannot nest an expression of {len} elements; every element must be a scalar")]
    InvalidNesting { len: usize },

    /// Construction from an empty sequence.
    #[error("expression value must contain at least one element")]
    EmptyValue,

    /// Argument outside the domain where the operator is differentiable.
    #[error("{op} is not differentiable at {value}")]
    OutOfDomain { op: &'static str, value: f64 },

    /// Gradient requested for a variable the expression does not carry.
    #[error("no gradient recorded for variable {name:?}")]
    UnknownVariable { name: String },

    /// Element index past the end of an expression.
    #[error("index {index} out of bounds for expression of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Reverse-mode operands recorded on different tapes.
    #[error("operands belong to different tapes")]
    TapeMismatch,

    /// Unrecognized differentiation mode.
    #[error("unknown differentiation mode {0:?}: expected \"forward\" or \"reverse\"")]
    UnknownMode(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AdError>;
