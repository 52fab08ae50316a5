//! Reflection errors

use prism_runtime::{ChanDir, Kind, RuntimeError};
use std::fmt;
use thiserror::Error;

/// Kind as it appears in error messages (`zero Value` for the invalid Value)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindName(pub Kind);

impl fmt::Display for KindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Kind::Invalid => f.write_str("zero Value"),
            kind => write!(f, "{} Value", kind),
        }
    }
}

/// Errors raised by reflection operations
///
/// Every check runs before the operation has any side effect.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReflectError {
    /// Operation applied to a Value of a kind it does not support
    #[error("reflect: call of {method} on {}", KindName(*kind))]
    InvalidKind {
        /// Operation name
        method: &'static str,
        /// Actual kind
        kind: Kind,
    },

    /// Mutation or address of a Value whose storage is not addressable
    #[error("reflect: {method} using unaddressable value")]
    NotAssignable {
        /// Operation name
        method: &'static str,
    },

    /// Mutation, call or exposure of a Value reached through unexported names
    #[error("reflect: {method} using value obtained using unexported field")]
    UnexportedAccess {
        /// Operation name
        method: &'static str,
    },

    /// Value type cannot be stored into the target type
    #[error("{context}: value of type {from} is not assignable to type {to}")]
    NotAssignableTo {
        /// Operation name
        context: &'static str,
        /// Source type
        from: String,
        /// Target type
        to: String,
    },

    /// No conversion exists between the two types
    #[error("reflect.Value.Convert: value of type {from} cannot be converted to type {to}")]
    NotConvertible {
        /// Source type
        from: String,
        /// Target type
        to: String,
    },

    /// Index or bound outside the valid range
    #[error("reflect: {method} index out of range: {index} (bound {bound})")]
    IndexOutOfRange {
        /// Operation name
        method: &'static str,
        /// Offending index
        index: usize,
        /// Bound it violated
        bound: usize,
    },

    /// Dereference of a nil pointer, nil embedded pointer or nil interface
    #[error("reflect: {method} of nil pointer")]
    NilDereference {
        /// Operation name
        method: &'static str,
    },

    /// Call through a nil function value
    #[error("reflect: call of nil function")]
    NilFunctionCall,

    /// Wrong number of call arguments
    #[error("reflect: {method} with {actual} input arguments, want {expected}")]
    ArityMismatch {
        /// Operation name
        method: &'static str,
        /// Declared parameter count (minimum for variadic calls)
        expected: usize,
        /// Supplied argument count
        actual: usize,
    },

    /// Call argument not assignable to its parameter
    #[error("reflect: {method} using {actual} as type {expected} (argument {index})")]
    ArgumentTypeMismatch {
        /// Operation name
        method: &'static str,
        /// Argument position
        index: usize,
        /// Parameter type
        expected: String,
        /// Argument type
        actual: String,
    },

    /// Sequences with different element types
    #[error("reflect.{method}: element type mismatch: {expected} vs {actual}")]
    ElementTypeMismatch {
        /// Operation name
        method: &'static str,
        /// Destination element type
        expected: String,
        /// Source element type
        actual: String,
    },

    /// Construction arguments out of range or type of the wrong shape
    #[error("reflect.{method}: {reason}")]
    InvalidConstructionArgument {
        /// Operation name
        method: &'static str,
        /// What was wrong
        reason: String,
    },

    /// Send on a receive-only channel or receive on a send-only channel
    #[error("reflect: {method} on {dir} channel")]
    WrongChannelDirection {
        /// Operation name
        method: &'static str,
        /// Channel direction
        dir: ChanDir,
    },

    /// `call_slice` of a non-variadic function
    #[error("reflect: {method} of non-variadic function")]
    NotVariadic {
        /// Operation name
        method: &'static str,
    },

    /// Malformed select case
    #[error("reflect.Select: case {index}: {reason}")]
    InvalidSelectCase {
        /// Case position
        index: usize,
        /// What was wrong
        reason: String,
    },

    /// Map or channel primitive failure
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result of a reflection operation
pub type ReflectResult<T> = Result<T, ReflectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_kind_message() {
        let err = ReflectError::InvalidKind {
            method: "Value::int",
            kind: Kind::String,
        };
        assert_eq!(err.to_string(), "reflect: call of Value::int on string Value");

        let err = ReflectError::InvalidKind {
            method: "Value::int",
            kind: Kind::Invalid,
        };
        assert_eq!(err.to_string(), "reflect: call of Value::int on zero Value");
    }

    #[test]
    fn test_runtime_error_is_transparent() {
        let err: ReflectError = RuntimeError::SendOnClosed.into();
        assert_eq!(err.to_string(), "send on closed channel");
    }
}
