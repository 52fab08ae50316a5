//! Prism reflection engine
//!
//! Runtime introspection and manipulation of values whose types are only
//! known through prism type descriptors:
//! - [`Value`]: one fixed-size handle for a value of any type
//! - Typed getters and setters with overflow checks
//! - Navigation through fields, elements, map entries and pointers
//! - Conversions following the language's conversion rules
//! - Dynamic calls, and functions backed by Rust handlers
//! - Channel operations and multi-way [`select`]
//! - Zero values, allocation, slices, maps and channels
//!
//! # Example
//!
//! ```text
//! let person = struct_of(&[FieldDecl::new("Name", &STRING), FieldDecl::new("Age", &INT32)])?;
//! let p = new(person).elem()?;
//! p.field_by_name("Age")?.set_int(8)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod access;
mod call;
pub mod chan;
pub mod construct;
mod convert;
pub mod error;
pub mod makefunc;
mod navigate;
pub mod typed;
pub mod value;

pub use chan::{select, SelectCase, SelectDir};
pub use construct::{
    append, append_slice, copy, make_chan, make_map, make_map_with_size, make_slice, new, new_at,
    zero,
};
pub use error::{ReflectError, ReflectResult};
pub use makefunc::{make_func, make_native};
pub use typed::Reflect;
pub use value::{indirect, value_of, value_of_iface, Value};

pub use prism_runtime as runtime;
