//! Function objects
//!
//! A non-nil `func` word points at a [`FuncObject`].

use crate::abi::{Code, Frame};
use std::fmt;

/// Where a function body came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    /// Rust body operating directly on the frame
    Native,
    /// Glue around a `Value` handler
    Reflect,
    /// Bound method converted to a plain function
    MethodValue,
}

/// The target of a function word
pub struct FuncObject {
    /// Body
    pub code: Code,
    /// Origin
    pub kind: FuncKind,
}

impl FuncObject {
    /// Allocate a function object and return its word
    ///
    /// Function objects live for the rest of the process.
    pub fn alloc(code: Code, kind: FuncKind) -> usize {
        Box::leak(Box::new(FuncObject { code, kind })) as *const FuncObject as usize
    }

    /// Decode a function word; `None` for nil
    ///
    /// # Safety
    ///
    /// A non-zero `word` must have been produced by [`FuncObject::alloc`].
    pub unsafe fn from_word<'a>(word: usize) -> Option<&'a FuncObject> {
        (word as *const FuncObject).as_ref()
    }

    /// Run the body on `frame`
    pub fn call(&self, frame: &mut Frame) {
        (self.code)(frame)
    }
}

impl fmt::Debug for FuncObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncObject").field("kind", &self.kind).finish()
    }
}
