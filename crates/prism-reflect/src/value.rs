//! The uniform value handle
//!
//! A [`Value`] is a (type, word, flags) triple that can describe a value of
//! any type through one fixed-size handle.
//!
//! ```text
//! flag bits
//! ┌─────────────────────┬───────────┬────────┬──────┬───────┬────┐
//! │ method index (9..)  │ kind (4..8)│ METHOD │ ADDR │ INDIR │ RO │
//! └─────────────────────┴───────────┴────────┴──────┴───────┴────┘
//! ```
//!
//! With `INDIR` set the word points at the value's storage. Otherwise the
//! value's bytes occupy the word itself; for pointer-shaped kinds that is the
//! pointer. Addressable values are always `INDIR`, and values larger than a
//! word are never stored inline.

use crate::error::{ReflectError, ReflectResult};
use crate::makefunc;
use prism_runtime::header::{SliceHeader, StringHeader};
use prism_runtime::iface::{self, Eface, Iface};
use prism_runtime::types::ptr_to;
use prism_runtime::{heap, ChanObject, Kind, MapObject, Type, PTR_SIZE};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Value flags
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Flag(usize);

impl Flag {
    pub(crate) const EMPTY: Flag = Flag(0);
    /// Reached through an unexported field or method
    pub(crate) const RO: Flag = Flag(1 << 0);
    /// Word points at the storage
    pub(crate) const INDIR: Flag = Flag(1 << 1);
    /// Storage is addressable
    pub(crate) const ADDR: Flag = Flag(1 << 2);
    /// Bound method; the method index lives in the high bits
    pub(crate) const METHOD: Flag = Flag(1 << 3);

    const KIND_SHIFT: usize = 4;
    const KIND_WIDTH: usize = 5;
    const KIND_MASK: usize = (1 << Self::KIND_WIDTH) - 1;
    const METHOD_SHIFT: usize = Self::KIND_SHIFT + Self::KIND_WIDTH;

    /// Flag carrying only `kind`
    pub(crate) fn kind(kind: Kind) -> Flag {
        Flag((kind as usize) << Self::KIND_SHIFT)
    }

    /// Flag marking method `index` of the receiver
    pub(crate) fn method(index: usize) -> Flag {
        Flag(Self::METHOD.0 | (index << Self::METHOD_SHIFT) | Self::kind(Kind::Func).0)
    }

    pub(crate) fn get_kind(self) -> Kind {
        Kind::from_index((self.0 >> Self::KIND_SHIFT) & Self::KIND_MASK)
    }

    pub(crate) fn method_index(self) -> usize {
        self.0 >> Self::METHOD_SHIFT
    }

    pub(crate) fn has(self, bits: Flag) -> bool {
        self.0 & bits.0 != 0
    }

    /// The read-only bit alone
    pub(crate) fn ro(self) -> Flag {
        self & Flag::RO
    }
}

impl BitOr for Flag {
    type Output = Flag;
    fn bitor(self, rhs: Flag) -> Flag {
        Flag(self.0 | rhs.0)
    }
}

impl BitAnd for Flag {
    type Output = Flag;
    fn bitand(self, rhs: Flag) -> Flag {
        Flag(self.0 & rhs.0)
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (bit, name) in [
            (Flag::RO, "RO"),
            (Flag::INDIR, "INDIR"),
            (Flag::ADDR, "ADDR"),
            (Flag::METHOD, "METHOD"),
        ] {
            if self.has(bit) {
                names.push(name);
            }
        }
        write!(f, "{}|{}", self.get_kind(), names.join("|"))?;
        if self.has(Flag::METHOD) {
            write!(f, "#{}", self.method_index())?;
        }
        Ok(())
    }
}

/// Reflection handle for a value of any type
#[derive(Clone, Copy)]
pub struct Value {
    pub(crate) typ: Option<&'static Type>,
    pub(crate) word: usize,
    pub(crate) flag: Flag,
}

// SAFETY: a Value is as shareable as the data it describes; synchronizing
// access to shared storage is the caller's job
unsafe impl Send for Value {}
unsafe impl Sync for Value {}

impl Default for Value {
    fn default() -> Self {
        Value::INVALID
    }
}

impl Value {
    /// The invalid Value
    pub const INVALID: Value = Value {
        typ: None,
        word: 0,
        flag: Flag::EMPTY,
    };

    pub(crate) fn from_parts(typ: &'static Type, word: usize, flag: Flag) -> Value {
        Value {
            typ: Some(typ),
            word,
            flag,
        }
    }

    /// Copy the `typ` value at `p` into a fresh Value
    ///
    /// Values larger than a word get private storage; smaller ones are
    /// loaded into the word.
    ///
    /// # Safety
    ///
    /// `p` must be valid for reads of `typ.size()` bytes.
    pub(crate) unsafe fn load_copy(typ: &'static Type, p: *const u8, fl: Flag) -> Value {
        let fl = fl | Flag::kind(typ.kind());
        if typ.size() > PTR_SIZE {
            Value::from_parts(typ, heap::clone_value(typ, p) as usize, fl | Flag::INDIR)
        } else {
            Value::from_parts(typ, heap::load_scalar(p, typ.size()), fl)
        }
    }

    /// Adopt freshly allocated, unshared storage holding a `typ` value
    ///
    /// # Safety
    ///
    /// `p` must point at a live `typ` value nobody else references.
    pub(crate) unsafe fn from_storage(typ: &'static Type, p: *mut u8, fl: Flag) -> Value {
        let fl = fl | Flag::kind(typ.kind());
        if typ.size() > PTR_SIZE {
            Value::from_parts(typ, p as usize, fl | Flag::INDIR)
        } else {
            Value::from_parts(typ, heap::load_scalar(p, typ.size()), fl)
        }
    }

    /// Whether this is a real value rather than the invalid Value
    pub fn is_valid(&self) -> bool {
        self.typ.is_some()
    }

    /// Kind of the value (`Func` for bound methods, `Invalid` for the invalid Value)
    pub fn kind(&self) -> Kind {
        self.flag.get_kind()
    }

    /// Descriptor, or `InvalidKind` for the invalid Value
    pub(crate) fn rtype(&self, method: &'static str) -> ReflectResult<&'static Type> {
        self.typ.ok_or(ReflectError::InvalidKind {
            method,
            kind: Kind::Invalid,
        })
    }

    /// Type of the value; for a bound method, the method's signature
    pub fn typ(&self) -> ReflectResult<&'static Type> {
        let t = self.rtype("Value::typ")?;
        if !self.flag.has(Flag::METHOD) {
            return Ok(t);
        }
        let i = self.flag.method_index();
        if t.kind() == Kind::Interface {
            Ok(t.interface_methods()[i].typ)
        } else {
            Ok(t.method_set()[i].typ)
        }
    }

    /// Pointer to the value's bytes
    ///
    /// For inline values this points into `self`, so it must not outlive the
    /// borrow.
    pub(crate) fn data_ptr(&self) -> *const u8 {
        if self.flag.has(Flag::INDIR) {
            self.word as *const u8
        } else {
            &self.word as *const usize as *const u8
        }
    }

    /// The pointer held by a pointer-shaped value
    pub(crate) fn ptr_word(&self) -> usize {
        if self.flag.has(Flag::INDIR) {
            // SAFETY: indirect pointer-shaped values point at one word
            unsafe { *(self.word as *const usize) }
        } else {
            self.word
        }
    }

    /// Copy the value's bytes to `dst`
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of the type's size.
    pub(crate) unsafe fn write_to(&self, dst: *mut u8) {
        if let Some(t) = self.typ {
            heap::memmove(dst, self.data_ptr(), t.size());
        }
    }

    /// Encode the value as an interface data word
    ///
    /// Addressable storage is copied so the carrier never aliases it.
    pub(crate) fn iword(&self) -> usize {
        let Some(t) = self.typ else { return 0 };
        if !self.flag.has(Flag::INDIR) {
            return self.word;
        }
        // SAFETY: INDIR values point at a live t
        unsafe {
            if t.size() <= PTR_SIZE {
                heap::load_scalar(self.word as *const u8, t.size())
            } else if self.flag.has(Flag::ADDR) {
                heap::clone_value(t, self.word as *const u8) as usize
            } else {
                self.word
            }
        }
    }

    pub(crate) fn must_be(&self, method: &'static str, kind: Kind) -> ReflectResult<()> {
        if self.kind() != kind {
            return Err(ReflectError::InvalidKind {
                method,
                kind: self.kind(),
            });
        }
        Ok(())
    }

    pub(crate) fn must_be_one_of(&self, method: &'static str, kinds: &[Kind]) -> ReflectResult<()> {
        if !kinds.contains(&self.kind()) {
            return Err(ReflectError::InvalidKind {
                method,
                kind: self.kind(),
            });
        }
        Ok(())
    }

    /// Valid and not reached through unexported names
    pub(crate) fn must_be_exported(&self, method: &'static str) -> ReflectResult<()> {
        if !self.is_valid() {
            return Err(ReflectError::InvalidKind {
                method,
                kind: Kind::Invalid,
            });
        }
        if self.flag.has(Flag::RO) {
            return Err(ReflectError::UnexportedAccess { method });
        }
        Ok(())
    }

    /// Valid, exported and addressable
    pub(crate) fn must_be_assignable(&self, method: &'static str) -> ReflectResult<()> {
        self.must_be_exported(method)?;
        if !self.flag.has(Flag::ADDR) {
            return Err(ReflectError::NotAssignable { method });
        }
        Ok(())
    }

    /// Whether [`Value::addr`] would succeed
    pub fn can_addr(&self) -> bool {
        self.flag.has(Flag::ADDR)
    }

    /// Whether the value can be changed with the setters
    pub fn can_set(&self) -> bool {
        self.flag.has(Flag::ADDR) && !self.flag.has(Flag::RO)
    }

    /// Whether [`Value::interface`] would succeed
    pub fn can_interface(&self) -> bool {
        self.is_valid() && !self.flag.has(Flag::RO)
    }

    /// Pointer to the value's storage
    pub fn addr(&self) -> ReflectResult<Value> {
        let t = self.rtype("Value::addr")?;
        if !self.flag.has(Flag::ADDR) {
            return Err(ReflectError::NotAssignable {
                method: "Value::addr",
            });
        }
        Ok(Value::from_parts(
            ptr_to(t),
            self.word,
            self.flag.ro() | Flag::kind(Kind::Ptr),
        ))
    }

    /// Address of the value's storage
    ///
    /// Using the address bypasses every aliasing and read-only guarantee.
    pub fn unsafe_addr(&self) -> ReflectResult<usize> {
        self.rtype("Value::unsafe_addr")?;
        if !self.flag.has(Flag::ADDR) {
            return Err(ReflectError::NotAssignable {
                method: "Value::unsafe_addr",
            });
        }
        Ok(self.word)
    }

    /// Box the value into an empty-interface carrier
    pub fn interface(&self) -> ReflectResult<Eface> {
        self.must_be_exported("Value::interface")?;
        let v = if self.flag.has(Flag::METHOD) {
            makefunc::make_method_value("Value::interface", *self)?
        } else {
            *self
        };
        let t = v.rtype("Value::interface")?;

        if t.kind() == Kind::Interface {
            // Already a carrier: re-box its dynamic value
            // SAFETY: interface values are INDIR and point at two words
            return Ok(match unsafe { iface::load(t, v.data_ptr()) } {
                None => Eface::NIL,
                Some((dyn_typ, word)) => Eface {
                    typ: dyn_typ,
                    word,
                },
            });
        }

        Ok(Eface {
            typ: t,
            word: v.iword(),
        })
    }

    /// The two raw words of an interface value
    pub fn interface_data(&self) -> ReflectResult<[usize; 2]> {
        self.must_be("Value::interface_data", Kind::Interface)?;
        // SAFETY: interface values are INDIR and point at two words
        unsafe {
            let p = self.data_ptr() as *const usize;
            Ok([*p, *p.add(1)])
        }
    }

    /// Whether a channel, function, interface, map, pointer or slice is nil
    pub fn is_nil(&self) -> ReflectResult<bool> {
        match self.kind() {
            Kind::Func if self.flag.has(Flag::METHOD) => Ok(false),
            Kind::Chan | Kind::Func | Kind::Map | Kind::Ptr | Kind::UnsafePointer => {
                Ok(self.ptr_word() == 0)
            }
            // SAFETY: both kinds are INDIR with a leading pointer word
            Kind::Interface | Kind::Slice => Ok(unsafe { *(self.data_ptr() as *const usize) } == 0),
            kind => Err(ReflectError::InvalidKind {
                method: "Value::is_nil",
                kind,
            }),
        }
    }

    pub(crate) fn string_header(&self) -> StringHeader {
        // SAFETY: caller checked the kind; strings are INDIR
        unsafe { *(self.data_ptr() as *const StringHeader) }
    }

    pub(crate) fn slice_header(&self) -> SliceHeader {
        // SAFETY: caller checked the kind; slices are INDIR
        unsafe { *(self.data_ptr() as *const SliceHeader) }
    }

    /// Length of an array, channel, map, slice or string
    pub fn len(&self) -> ReflectResult<usize> {
        match self.kind() {
            Kind::Array => Ok(self.rtype("Value::len")?.array_len()),
            // SAFETY: non-zero words were produced by the matching allocator
            Kind::Chan => {
                Ok(unsafe { ChanObject::from_word(self.ptr_word()) }.map_or(0, |c| c.len()))
            }
            Kind::Map => {
                Ok(unsafe { MapObject::from_word(self.ptr_word()) }.map_or(0, |m| m.len()))
            }
            Kind::Slice => Ok(self.slice_header().len),
            Kind::String => Ok(self.string_header().len),
            kind => Err(ReflectError::InvalidKind {
                method: "Value::len",
                kind,
            }),
        }
    }

    /// Whether [`Value::len`] is zero
    pub fn is_empty(&self) -> ReflectResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Capacity of an array, channel or slice
    pub fn cap(&self) -> ReflectResult<usize> {
        match self.kind() {
            Kind::Array => Ok(self.rtype("Value::cap")?.array_len()),
            // SAFETY: non-zero words were produced by the channel allocator
            Kind::Chan => {
                Ok(unsafe { ChanObject::from_word(self.ptr_word()) }.map_or(0, |c| c.cap()))
            }
            Kind::Slice => Ok(self.slice_header().cap),
            kind => Err(ReflectError::InvalidKind {
                method: "Value::cap",
                kind,
            }),
        }
    }

    /// Textual form: string contents, or `<T Value>` for other kinds
    pub fn string(&self) -> String {
        self.to_string()
    }
}

/// Unbox an empty-interface carrier; the nil carrier gives the invalid Value
pub fn value_of(e: Eface) -> Value {
    match e.dynamic_type() {
        None => Value::INVALID,
        Some(t) => {
            let fl = Flag::kind(t.kind());
            if t.size() > PTR_SIZE {
                Value::from_parts(t, e.word, fl | Flag::INDIR)
            } else {
                Value::from_parts(t, e.word, fl)
            }
        }
    }
}

/// Unbox a non-empty interface carrier
///
/// # Safety
///
/// `i` must have been produced by the runtime's carrier builder.
pub unsafe fn value_of_iface(i: Iface) -> Value {
    match i.tab.as_ref() {
        None => Value::INVALID,
        Some(tab) => value_of(Eface {
            typ: tab.typ,
            word: i.word,
        }),
    }
}

/// The value `v` points to, or `v` itself if it is not a pointer
pub fn indirect(v: Value) -> ReflectResult<Value> {
    if v.kind() != Kind::Ptr {
        return Ok(v);
    }
    v.elem()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            None => f.write_str("<invalid Value>"),
            Some(_) if self.kind() == Kind::String => write!(f, "{}", self.string_header()),
            Some(t) => match self.typ() {
                Ok(mt) if self.flag.has(Flag::METHOD) => write!(f, "<{} Value>", mt),
                _ => write!(f, "<{} Value>", t),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            None => f.write_str("Value(<invalid>)"),
            Some(t) => f
                .debug_struct("Value")
                .field("typ", &t.to_string())
                .field("word", &format_args!("{:#x}", self.word))
                .field("flag", &self.flag)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_runtime::types::{INT, INT8, STRING};

    #[test]
    fn test_flag_packing() {
        let fl = Flag::method(5) | Flag::RO | Flag::INDIR;
        assert_eq!(fl.get_kind(), Kind::Func);
        assert_eq!(fl.method_index(), 5);
        assert!(fl.has(Flag::RO));
        assert!(!fl.has(Flag::ADDR));
    }

    #[test]
    fn test_invalid_value() {
        let v = Value::INVALID;
        assert!(!v.is_valid());
        assert_eq!(v.kind(), Kind::Invalid);
        assert_eq!(v.to_string(), "<invalid Value>");
        assert!(matches!(
            v.typ(),
            Err(ReflectError::InvalidKind {
                kind: Kind::Invalid,
                ..
            })
        ));
        assert!(v.len().is_err());
    }

    #[test]
    fn test_load_copy_small_and_large() {
        let x: i8 = -3;
        let v = unsafe { Value::load_copy(&INT8, &x as *const i8 as *const u8, Flag::EMPTY) };
        assert!(!v.flag.has(Flag::INDIR));
        assert_eq!(unsafe { *(v.data_ptr() as *const i8) }, -3);

        let s = StringHeader::new("copy");
        let p = &s as *const StringHeader as *const u8;
        let v = unsafe { Value::load_copy(&STRING, p, Flag::EMPTY) };
        assert!(v.flag.has(Flag::INDIR));
        assert_ne!(v.word, &s as *const StringHeader as usize);
        assert_eq!(v.to_string(), "copy");
    }

    #[test]
    fn test_interface_round_trip() {
        let x: isize = 12;
        let v = unsafe { Value::load_copy(&INT, &x as *const isize as *const u8, Flag::EMPTY) };
        let e = v.interface().unwrap();
        assert_eq!(e.dynamic_type(), Some(&INT));
        let back = value_of(e);
        assert_eq!(back.kind(), Kind::Int);
        assert_eq!(back.word, 12);
        assert!(!value_of(Eface::NIL).is_valid());
    }
}
