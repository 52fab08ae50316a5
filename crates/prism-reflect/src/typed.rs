//! Bridge between Rust values and [`Value`]s

use crate::error::{ReflectError, ReflectResult};
use crate::value::{Flag, Value};
use prism_runtime::header::{Complex128, Complex64, StringHeader};
use prism_runtime::types::{
    BOOL, COMPLEX128, COMPLEX64, FLOAT32, FLOAT64, INT, INT16, INT32, INT64, INT8, STRING, UINT,
    UINT16, UINT32, UINT64, UINT8,
};
use prism_runtime::Type;

/// Rust types with a runtime type descriptor
///
/// # Safety
///
/// `Self` must have exactly the size, alignment and representation of the
/// descriptor returned by [`Reflect::rtype`].
pub unsafe trait Reflect: Copy + 'static {
    /// Descriptor of `Self`
    fn rtype() -> &'static Type;
}

macro_rules! reflect_impl {
    ($($t:ty => $desc:expr),* $(,)?) => {
        $(unsafe impl Reflect for $t {
            fn rtype() -> &'static Type {
                &$desc
            }
        })*
    };
}

reflect_impl!(
    bool => BOOL,
    i8 => INT8,
    i16 => INT16,
    i32 => INT32,
    i64 => INT64,
    isize => INT,
    u8 => UINT8,
    u16 => UINT16,
    u32 => UINT32,
    u64 => UINT64,
    usize => UINT,
    f32 => FLOAT32,
    f64 => FLOAT64,
    Complex64 => COMPLEX64,
    Complex128 => COMPLEX128,
    StringHeader => STRING,
);

impl Value {
    /// Value holding a copy of `x`
    pub fn of<T: Reflect>(x: T) -> Value {
        // SAFETY: T has the layout of its descriptor
        unsafe { Value::load_copy(T::rtype(), &x as *const T as *const u8, Flag::EMPTY) }
    }

    /// Copy the value out as `T`, whose descriptor must match exactly
    pub fn get<T: Reflect>(&self) -> ReflectResult<T> {
        let t = self.typ()?;
        if t != T::rtype() || self.flag.has(Flag::METHOD) {
            return Err(ReflectError::NotAssignableTo {
                context: "Value::get",
                from: t.to_string(),
                to: T::rtype().to_string(),
            });
        }
        // SAFETY: the storage holds a T
        Ok(unsafe { (self.data_ptr() as *const T).read_unaligned() })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::of(StringHeader::new(s))
    }
}
