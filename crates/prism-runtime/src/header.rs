//! String, slice and complex representations

use crate::heap;
use std::fmt;

/// Runtime representation of a `string`
///
/// The bytes are immutable once published.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringHeader {
    /// First byte (null for the empty string)
    pub data: *const u8,
    /// Length in bytes
    pub len: usize,
}

// SAFETY: string bytes are never mutated after construction
unsafe impl Send for StringHeader {}
unsafe impl Sync for StringHeader {}

impl StringHeader {
    /// The empty string
    pub const EMPTY: StringHeader = StringHeader {
        data: std::ptr::null(),
        len: 0,
    };

    /// Copy `s` into runtime storage
    pub fn new(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    /// Copy `bytes` into runtime storage
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::EMPTY;
        }
        let data = heap::alloc_bytes(bytes.len(), 1);
        // SAFETY: fresh allocation of bytes.len() bytes
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len()) };
        Self {
            data,
            len: bytes.len(),
        }
    }

    /// The string's bytes
    pub fn as_bytes(&self) -> &[u8] {
        if self.len == 0 || self.data.is_null() {
            return &[];
        }
        // SAFETY: data points at len immutable bytes that are never freed
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    /// The string as UTF-8, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the string is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for StringHeader {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for StringHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Runtime representation of a slice
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    /// First element (null for a nil slice)
    pub data: *mut u8,
    /// Number of elements
    pub len: usize,
    /// Number of elements available from `data`
    pub cap: usize,
}

// SAFETY: the header is plain data; synchronizing element access is the caller's job
unsafe impl Send for SliceHeader {}
unsafe impl Sync for SliceHeader {}

impl SliceHeader {
    /// The nil slice
    pub const NIL: SliceHeader = SliceHeader {
        data: std::ptr::null_mut(),
        len: 0,
        cap: 0,
    };

    /// Whether this is the nil slice
    pub fn is_nil(&self) -> bool {
        self.data.is_null()
    }
}

impl Default for SliceHeader {
    fn default() -> Self {
        Self::NIL
    }
}

/// `complex64`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex64 {
    /// Real part
    pub re: f32,
    /// Imaginary part
    pub im: f32,
}

impl Complex64 {
    /// Create a complex number
    pub const fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

/// `complex128`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex128 {
    /// Real part
    pub re: f64,
    /// Imaginary part
    pub im: f64,
}

impl Complex128 {
    /// Create a complex number
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl From<Complex64> for Complex128 {
    fn from(c: Complex64) -> Self {
        Self::new(c.re as f64, c.im as f64)
    }
}

impl fmt::Display for Complex128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}{:+}i)", self.re, self.im)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_header_copies() {
        let owned = String::from("héllo");
        let h = StringHeader::new(&owned);
        drop(owned);
        assert_eq!(h.as_str(), Some("héllo"));
        assert_eq!(h.len(), 6);
        assert_eq!(h.to_string(), "héllo");
    }

    #[test]
    fn test_empty_string_header() {
        let h = StringHeader::new("");
        assert!(h.is_empty());
        assert!(h.data.is_null());
        assert_eq!(h.as_bytes(), b"");
        assert_eq!(StringHeader::default(), StringHeader::EMPTY);
    }

    #[test]
    fn test_complex_display() {
        assert_eq!(Complex128::new(1.0, -2.5).to_string(), "(1-2.5i)");
        assert_eq!(Complex128::from(Complex64::new(0.5, 1.0)), Complex128::new(0.5, 1.0));
    }
}
