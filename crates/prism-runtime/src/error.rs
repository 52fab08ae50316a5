//! Runtime errors

use thiserror::Error;

/// Errors raised while constructing type descriptors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TypeError {
    /// A component has the wrong kind for its position
    #[error("Type mismatch: expected {expected}, got {actual}")]
    Mismatch {
        /// Expected kind or type
        expected: String,
        /// Actual type
        actual: String,
    },

    /// Map key type does not support `==`
    #[error("Invalid map key type: {key} is not comparable")]
    NotComparable {
        /// Offending key type
        key: String,
    },

    /// Variadic signature without a trailing slice parameter
    #[error("Invalid variadic signature: {reason}")]
    InvalidVariadic {
        /// Reason for invalidity
        reason: String,
    },

    /// Two struct fields share a name
    #[error("Duplicate field: {name}")]
    DuplicateField {
        /// Field name
        name: String,
    },

    /// Two methods share a name
    #[error("Duplicate method: {name}")]
    DuplicateMethod {
        /// Method name
        name: String,
    },

    /// Embedded field whose type has no name to use as field name
    #[error("Embedded field of unnamed type {typ}")]
    InvalidEmbedded {
        /// Embedded type
        typ: String,
    },

    /// Methods may only be declared on named non-pointer, non-interface types
    #[error("Invalid receiver type: {typ}")]
    InvalidReceiver {
        /// Receiver type
        typ: String,
    },

    /// Method table already declared for this type
    #[error("Methods already declared for {typ}")]
    MethodsAlreadyDeclared {
        /// Receiver type
        typ: String,
    },
}

/// Errors raised by map and channel primitives
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// Send on a closed channel
    #[error("send on closed channel")]
    SendOnClosed,

    /// Close of a channel that is already closed
    #[error("close of closed channel")]
    CloseOfClosed,

    /// Close of a nil channel
    #[error("close of nil channel")]
    CloseOfNil,

    /// Assignment into a nil map
    #[error("assignment to entry in nil map")]
    NilMap,

    /// Concrete type lacks a method the interface requires
    #[error("{typ} does not implement {iface}")]
    MissingMethod {
        /// Concrete type
        typ: String,
        /// Interface type
        iface: String,
    },

    /// Map key whose dynamic type cannot be hashed
    #[error("hash of unhashable type {typ}")]
    Unhashable {
        /// Dynamic key type
        typ: String,
    },
}

/// Result of a map or channel primitive
pub type RuntimeResult<T> = Result<T, RuntimeError>;
