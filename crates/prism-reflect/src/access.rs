//! Typed getters and setters
//!
//! Getters accept a family of kinds and read exactly the type's width.
//! Setters require an addressable, exported Value and write only the type's
//! declared bytes.

use crate::error::{ReflectError, ReflectResult};
use crate::value::{Flag, Value};
use prism_runtime::header::{Complex128, Complex64, SliceHeader, StringHeader};
use prism_runtime::{heap, Kind};

const INT_KINDS: &[Kind] = &[Kind::Int, Kind::Int8, Kind::Int16, Kind::Int32, Kind::Int64];
const UINT_KINDS: &[Kind] = &[
    Kind::Uint,
    Kind::Uint8,
    Kind::Uint16,
    Kind::Uint32,
    Kind::Uint64,
    Kind::Uintptr,
];
const FLOAT_KINDS: &[Kind] = &[Kind::Float32, Kind::Float64];
const COMPLEX_KINDS: &[Kind] = &[Kind::Complex64, Kind::Complex128];

/// Marker whose address stands in for the code of bound methods
static METHOD_VALUE_CALL: u8 = 0;

impl Value {
    fn read<T: Copy>(&self) -> T {
        // SAFETY: callers checked the kind, so the storage holds a T
        unsafe { (self.data_ptr() as *const T).read_unaligned() }
    }

    fn store<T: Copy>(&self, value: T) {
        // SAFETY: assignable values are INDIR and point at a live T
        unsafe { (self.word as *mut T).write_unaligned(value) }
    }

    fn width(&self) -> usize {
        self.typ.map_or(0, |t| t.size())
    }

    /// The underlying `bool`
    pub fn bool(&self) -> ReflectResult<bool> {
        self.must_be("Value::bool", Kind::Bool)?;
        Ok(self.read::<u8>() != 0)
    }

    /// The underlying signed integer, sign-extended
    pub fn int(&self) -> ReflectResult<i64> {
        self.must_be_one_of("Value::int", INT_KINDS)?;
        Ok(match self.width() {
            1 => self.read::<i8>() as i64,
            2 => self.read::<i16>() as i64,
            4 => self.read::<i32>() as i64,
            _ => self.read::<i64>(),
        })
    }

    /// The underlying unsigned integer
    pub fn uint(&self) -> ReflectResult<u64> {
        self.must_be_one_of("Value::uint", UINT_KINDS)?;
        Ok(match self.width() {
            1 => self.read::<u8>() as u64,
            2 => self.read::<u16>() as u64,
            4 => self.read::<u32>() as u64,
            _ => self.read::<u64>(),
        })
    }

    /// The underlying float, widened to `f64`
    pub fn float(&self) -> ReflectResult<f64> {
        self.must_be_one_of("Value::float", FLOAT_KINDS)?;
        Ok(match self.kind() {
            Kind::Float32 => self.read::<f32>() as f64,
            _ => self.read::<f64>(),
        })
    }

    /// The underlying complex number, widened to `complex128`
    pub fn complex(&self) -> ReflectResult<Complex128> {
        self.must_be_one_of("Value::complex", COMPLEX_KINDS)?;
        Ok(match self.kind() {
            Kind::Complex64 => self.read::<Complex64>().into(),
            _ => self.read::<Complex128>(),
        })
    }

    /// Contents of a `[]byte`
    pub fn bytes(&self) -> ReflectResult<Vec<u8>> {
        self.must_be("Value::bytes", Kind::Slice)?;
        let t = self.rtype("Value::bytes")?;
        if t.elem().kind() != Kind::Uint8 {
            return Err(ReflectError::InvalidKind {
                method: "Value::bytes",
                kind: t.elem().kind(),
            });
        }
        let s = self.slice_header();
        if s.len == 0 {
            return Ok(Vec::new());
        }
        // SAFETY: a non-empty slice points at len live bytes
        Ok(unsafe { std::slice::from_raw_parts(s.data, s.len) }.to_vec())
    }

    /// Address held by a pointer-shaped value, or the data pointer of a slice
    pub fn pointer(&self) -> ReflectResult<usize> {
        match self.kind() {
            Kind::Func if self.flag.has(Flag::METHOD) => {
                Ok(&METHOD_VALUE_CALL as *const u8 as usize)
            }
            Kind::Chan | Kind::Func | Kind::Map | Kind::Ptr | Kind::UnsafePointer => {
                Ok(self.ptr_word())
            }
            Kind::Slice => Ok(self.slice_header().data as usize),
            kind => Err(ReflectError::InvalidKind {
                method: "Value::pointer",
                kind,
            }),
        }
    }

    /// Store `x`, which must be assignable to this Value's type
    pub fn set(&self, x: Value) -> ReflectResult<()> {
        self.must_be_assignable("Value::set")?;
        x.must_be_exported("Value::set")?;
        let t = self.rtype("Value::set")?;
        let x = x.assign_to("reflect.Set", t)?;
        // SAFETY: self is addressable storage of t; x now has type t
        unsafe { x.write_to(self.word as *mut u8) };
        Ok(())
    }

    /// Store a `bool`
    pub fn set_bool(&self, x: bool) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_bool")?;
        self.must_be("Value::set_bool", Kind::Bool)?;
        self.store(x as u8);
        Ok(())
    }

    /// Store a signed integer, truncated to the type's width
    pub fn set_int(&self, x: i64) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_int")?;
        self.must_be_one_of("Value::set_int", INT_KINDS)?;
        match self.width() {
            1 => self.store(x as i8),
            2 => self.store(x as i16),
            4 => self.store(x as i32),
            _ => self.store(x),
        }
        Ok(())
    }

    /// Store an unsigned integer, truncated to the type's width
    pub fn set_uint(&self, x: u64) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_uint")?;
        self.must_be_one_of("Value::set_uint", UINT_KINDS)?;
        match self.width() {
            1 => self.store(x as u8),
            2 => self.store(x as u16),
            4 => self.store(x as u32),
            _ => self.store(x),
        }
        Ok(())
    }

    /// Store a float, rounded to `float32` when the type requires it
    pub fn set_float(&self, x: f64) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_float")?;
        self.must_be_one_of("Value::set_float", FLOAT_KINDS)?;
        match self.kind() {
            Kind::Float32 => self.store(x as f32),
            _ => self.store(x),
        }
        Ok(())
    }

    /// Store a complex number
    pub fn set_complex(&self, x: Complex128) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_complex")?;
        self.must_be_one_of("Value::set_complex", COMPLEX_KINDS)?;
        match self.kind() {
            Kind::Complex64 => self.store(Complex64::new(x.re as f32, x.im as f32)),
            _ => self.store(x),
        }
        Ok(())
    }

    /// Store a copy of `x`
    pub fn set_string(&self, x: &str) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_string")?;
        self.must_be("Value::set_string", Kind::String)?;
        self.store(StringHeader::new(x));
        Ok(())
    }

    /// Store a `[]byte` holding a copy of `x`
    pub fn set_bytes(&self, x: &[u8]) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_bytes")?;
        self.must_be("Value::set_bytes", Kind::Slice)?;
        let t = self.rtype("Value::set_bytes")?;
        if t.elem().kind() != Kind::Uint8 {
            return Err(ReflectError::InvalidKind {
                method: "Value::set_bytes",
                kind: t.elem().kind(),
            });
        }
        let data = heap::alloc_bytes(x.len(), 1);
        // SAFETY: fresh allocation of x.len() bytes
        unsafe { heap::memmove(data, x.as_ptr(), x.len()) };
        self.store(SliceHeader {
            data,
            len: x.len(),
            cap: x.len(),
        });
        Ok(())
    }

    /// Change a slice's length; `n` may not exceed the capacity
    pub fn set_len(&self, n: usize) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_len")?;
        self.must_be("Value::set_len", Kind::Slice)?;
        let mut s = self.slice_header();
        if n > s.cap {
            return Err(ReflectError::IndexOutOfRange {
                method: "Value::set_len",
                index: n,
                bound: s.cap,
            });
        }
        s.len = n;
        self.store(s);
        Ok(())
    }

    /// Shrink a slice's capacity to `n`, which must lie in `len..=cap`
    pub fn set_cap(&self, n: usize) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_cap")?;
        self.must_be("Value::set_cap", Kind::Slice)?;
        let mut s = self.slice_header();
        if n < s.len || n > s.cap {
            return Err(ReflectError::IndexOutOfRange {
                method: "Value::set_cap",
                index: n,
                bound: s.cap,
            });
        }
        s.cap = n;
        self.store(s);
        Ok(())
    }

    /// Store a raw address into an `unsafe.Pointer`
    pub fn set_pointer(&self, x: usize) -> ReflectResult<()> {
        self.must_be_assignable("Value::set_pointer")?;
        self.must_be("Value::set_pointer", Kind::UnsafePointer)?;
        self.store(x);
        Ok(())
    }

    /// Whether `x` cannot be represented by this Value's integer type
    pub fn overflow_int(&self, x: i64) -> ReflectResult<bool> {
        self.must_be_one_of("Value::overflow_int", INT_KINDS)?;
        let shift = 64 - self.width() * 8;
        let trunc = (x << shift) >> shift;
        Ok(x != trunc)
    }

    /// Whether `x` cannot be represented by this Value's unsigned type
    pub fn overflow_uint(&self, x: u64) -> ReflectResult<bool> {
        self.must_be_one_of("Value::overflow_uint", UINT_KINDS)?;
        let shift = 64 - self.width() * 8;
        let trunc = (x << shift) >> shift;
        Ok(x != trunc)
    }

    /// Whether `x` cannot be represented by this Value's float type
    pub fn overflow_float(&self, x: f64) -> ReflectResult<bool> {
        self.must_be_one_of("Value::overflow_float", FLOAT_KINDS)?;
        Ok(self.kind() == Kind::Float32 && overflow_float32(x))
    }

    /// Whether either part of `x` cannot be represented by this Value's complex type
    pub fn overflow_complex(&self, x: Complex128) -> ReflectResult<bool> {
        self.must_be_one_of("Value::overflow_complex", COMPLEX_KINDS)?;
        Ok(self.kind() == Kind::Complex64 && (overflow_float32(x.re) || overflow_float32(x.im)))
    }
}

// Infinities stay representable
fn overflow_float32(x: f64) -> bool {
    let x = x.abs();
    (f32::MAX as f64) < x && x <= f64::MAX
}
