//! Prism runtime
//!
//! The runtime pieces the reflection engine operates over:
//! - Type descriptors and the type relations (assignability, interface satisfaction)
//! - The call-frame ABI shared by native bodies and dynamic calls
//! - The allocator and string/slice headers
//! - Map, channel and function objects
//! - Interface carriers and cached itabs
//! - Process-wide runtime configuration

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod abi;
pub mod chan;
pub mod config;
pub mod error;
pub mod func;
pub mod header;
pub mod heap;
pub mod iface;
pub mod map;
pub mod types;

pub use abi::{func_layout, Code, Frame, FrameLayout, Slot};
pub use chan::{ChanObject, SelectOp, Selected};
pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult, TypeError};
pub use func::{FuncKind, FuncObject};
pub use header::{Complex128, Complex64, SliceHeader, StringHeader};
pub use heap::HeapStats;
pub use iface::{CarrierBuilder, Eface, Iface, Itab};
pub use map::MapObject;
pub use types::{ChanDir, Kind, Method, StructField, Type, TypeDetail, PTR_SIZE};
