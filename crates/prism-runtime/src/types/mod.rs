//! Runtime type descriptors
//!
//! A [`Type`] is the immutable metadata for one concrete type: its kind tag,
//! size, alignment and, depending on the kind, element/key types, field table,
//! signature or method table. Descriptors are leaked on construction and
//! shared as `&'static Type`; identity is pointer identity.
//!
//! ```text
//! Kind      Size        Representation
//! bool      1           0 / 1
//! int       word        two's complement
//! string    2 words     StringHeader { data, len }
//! slice     3 words     SliceHeader { data, len, cap }
//! map/chan  word        pointer to MapObject / ChanObject
//! func      word        pointer to FuncObject
//! interface 2 words     [type-or-itab, data word]
//! ```

mod assign;
mod builder;
mod lookup;

pub use assign::{assignable_to, directly_assignable, identical_underlying, implements};
pub use builder::{
    array_of, chan_of, declare_methods, func_of, interface_of, map_of, named, ptr_to, slice_of,
    struct_of, FieldDecl, MethodDecl,
};
pub use lookup::FieldMatch;

use crate::abi::Code;
use once_cell::sync::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Size of a machine word (and of every pointer-shaped value)
pub const PTR_SIZE: usize = std::mem::size_of::<usize>();

/// Structural category of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    /// No type (the invalid Value)
    Invalid = 0,
    /// `bool`
    Bool,
    /// Word-sized signed integer
    Int,
    /// `int8`
    Int8,
    /// `int16`
    Int16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// Word-sized unsigned integer
    Uint,
    /// `uint8`
    Uint8,
    /// `uint16`
    Uint16,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
    /// Unsigned integer large enough to hold an address
    Uintptr,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
    /// Pair of `float32`
    Complex64,
    /// Pair of `float64`
    Complex128,
    /// Fixed-length sequence
    Array,
    /// Channel
    Chan,
    /// Function
    Func,
    /// Sum-type carrier
    Interface,
    /// Associative map
    Map,
    /// Pointer
    Ptr,
    /// Dynamic sequence
    Slice,
    /// Immutable byte string
    String,
    /// Record
    Struct,
    /// Untyped raw pointer
    UnsafePointer,
}

const KINDS: [Kind; 27] = [
    Kind::Invalid,
    Kind::Bool,
    Kind::Int,
    Kind::Int8,
    Kind::Int16,
    Kind::Int32,
    Kind::Int64,
    Kind::Uint,
    Kind::Uint8,
    Kind::Uint16,
    Kind::Uint32,
    Kind::Uint64,
    Kind::Uintptr,
    Kind::Float32,
    Kind::Float64,
    Kind::Complex64,
    Kind::Complex128,
    Kind::Array,
    Kind::Chan,
    Kind::Func,
    Kind::Interface,
    Kind::Map,
    Kind::Ptr,
    Kind::Slice,
    Kind::String,
    Kind::Struct,
    Kind::UnsafePointer,
];

impl Kind {
    /// Decode a kind from its tag; unknown tags decode to `Invalid`
    pub fn from_index(index: usize) -> Kind {
        KINDS.get(index).copied().unwrap_or(Kind::Invalid)
    }

    /// Lower-case kind name
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Invalid => "invalid",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Int8 => "int8",
            Kind::Int16 => "int16",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Uint => "uint",
            Kind::Uint8 => "uint8",
            Kind::Uint16 => "uint16",
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Uintptr => "uintptr",
            Kind::Float32 => "float32",
            Kind::Float64 => "float64",
            Kind::Complex64 => "complex64",
            Kind::Complex128 => "complex128",
            Kind::Array => "array",
            Kind::Chan => "chan",
            Kind::Func => "func",
            Kind::Interface => "interface",
            Kind::Map => "map",
            Kind::Ptr => "ptr",
            Kind::Slice => "slice",
            Kind::String => "string",
            Kind::Struct => "struct",
            Kind::UnsafePointer => "unsafe.Pointer",
        }
    }

    /// Signed integer kinds
    pub fn is_int(self) -> bool {
        matches!(
            self,
            Kind::Int | Kind::Int8 | Kind::Int16 | Kind::Int32 | Kind::Int64
        )
    }

    /// Unsigned integer kinds (including `uintptr`)
    pub fn is_uint(self) -> bool {
        matches!(
            self,
            Kind::Uint | Kind::Uint8 | Kind::Uint16 | Kind::Uint32 | Kind::Uint64 | Kind::Uintptr
        )
    }

    /// Floating point kinds
    pub fn is_float(self) -> bool {
        matches!(self, Kind::Float32 | Kind::Float64)
    }

    /// Complex kinds
    pub fn is_complex(self) -> bool {
        matches!(self, Kind::Complex64 | Kind::Complex128)
    }

    /// Kinds whose whole representation is one pointer word
    pub fn is_pointer_shaped(self) -> bool {
        matches!(
            self,
            Kind::Chan | Kind::Func | Kind::Map | Kind::Ptr | Kind::UnsafePointer
        )
    }

    /// Scalar kinds that are the same for every type of that kind
    pub(crate) fn is_basic(self) -> bool {
        matches!(
            self,
            Kind::Bool | Kind::String | Kind::UnsafePointer
        ) || self.is_int()
            || self.is_uint()
            || self.is_float()
            || self.is_complex()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    /// Receive-only
    Recv = 1,
    /// Send-only
    Send = 2,
    /// Bidirectional
    Both = 3,
}

impl ChanDir {
    /// Whether values may be sent on a channel of this direction
    pub fn can_send(self) -> bool {
        (self as u8) & (ChanDir::Send as u8) != 0
    }

    /// Whether values may be received from a channel of this direction
    pub fn can_recv(self) -> bool {
        (self as u8) & (ChanDir::Recv as u8) != 0
    }
}

impl fmt::Display for ChanDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChanDir::Recv => write!(f, "<-chan"),
            ChanDir::Send => write!(f, "chan<-"),
            ChanDir::Both => write!(f, "chan"),
        }
    }
}

/// One field of a struct type
#[derive(Debug, Clone, Copy)]
pub struct StructField {
    /// Field name (type name for embedded fields)
    pub name: &'static str,
    /// Field type
    pub typ: &'static Type,
    /// Byte offset within the struct
    pub offset: usize,
    /// Position in the field table
    pub index: usize,
    /// Whether the field is embedded
    pub embedded: bool,
}

impl StructField {
    /// Exported fields start with an upper-case letter
    pub fn is_exported(&self) -> bool {
        is_exported(self.name)
    }
}

/// One method of an interface type
#[derive(Debug, Clone, Copy)]
pub struct InterfaceMethod {
    /// Method name
    pub name: &'static str,
    /// Method signature (without receiver)
    pub typ: &'static Type,
}

impl InterfaceMethod {
    /// Exported methods start with an upper-case letter
    pub fn is_exported(&self) -> bool {
        is_exported(self.name)
    }
}

/// One entry of a concrete method table
///
/// The body receives the receiver in the frame's receiver word, encoded the
/// way an interface data word encodes the receiver's type.
#[derive(Clone)]
pub struct Method {
    /// Method name
    pub name: &'static str,
    /// Method signature (without receiver)
    pub typ: &'static Type,
    /// Method body
    pub code: Code,
    /// Whether the method was declared on `*T` rather than `T`
    pub pointer_receiver: bool,
}

impl Method {
    /// Exported methods start with an upper-case letter
    pub fn is_exported(&self) -> bool {
        is_exported(self.name)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("typ", &self.typ)
            .field("pointer_receiver", &self.pointer_receiver)
            .finish()
    }
}

/// Declared methods of a named type, sorted by name
pub(crate) struct MethodTable {
    /// Every declared method (the method set of `*T`)
    pub(crate) all: Vec<Method>,
    /// Value-receiver methods only (the method set of `T`)
    pub(crate) values: Vec<Method>,
}

/// Kind-specific part of a descriptor
#[derive(Debug, Clone, Copy)]
pub enum TypeDetail {
    /// Scalar kinds, strings and raw pointers
    Basic,
    /// `[len]elem`
    Array {
        /// Element type
        elem: &'static Type,
        /// Number of elements
        len: usize,
    },
    /// `chan elem`
    Chan {
        /// Element type
        elem: &'static Type,
        /// Direction
        dir: ChanDir,
    },
    /// `func(params) results`
    Func {
        /// Parameter types
        params: &'static [&'static Type],
        /// Result types
        results: &'static [&'static Type],
        /// Whether the last parameter is variadic
        variadic: bool,
    },
    /// `interface { methods }`
    Interface {
        /// Methods sorted by name
        methods: &'static [InterfaceMethod],
    },
    /// `map[key]elem`
    Map {
        /// Key type
        key: &'static Type,
        /// Value type
        elem: &'static Type,
    },
    /// `*elem`
    Ptr {
        /// Pointed-to type
        elem: &'static Type,
    },
    /// `[]elem`
    Slice {
        /// Element type
        elem: &'static Type,
    },
    /// `struct { fields }`
    Struct {
        /// Field table in declaration order
        fields: &'static [StructField],
    },
}

/// Immutable metadata for one concrete type
pub struct Type {
    pub(crate) kind: Kind,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) pkg_path: Option<&'static str>,
    pub(crate) name: Option<&'static str>,
    pub(crate) repr: &'static str,
    pub(crate) comparable: bool,
    pub(crate) detail: TypeDetail,
    pub(crate) methods: OnceCell<MethodTable>,
    pub(crate) ptr_to: OnceCell<&'static Type>,
}

impl Type {
    const fn basic(kind: Kind, name: &'static str, size: usize, align: usize) -> Type {
        Type {
            kind,
            size,
            align,
            pkg_path: None,
            name: Some(name),
            repr: name,
            comparable: true,
            detail: TypeDetail::Basic,
            methods: OnceCell::new(),
            ptr_to: OnceCell::new(),
        }
    }

    /// Kind tag
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment in bytes
    pub fn align(&self) -> usize {
        self.align
    }

    /// Type name, `None` for unnamed composite types
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Declaring package for named types, `None` for predeclared and unnamed types
    pub fn pkg_path(&self) -> Option<&'static str> {
        self.pkg_path
    }

    /// Whether the type carries a name (predeclared or declared)
    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// Whether values of this type support `==`
    pub fn comparable(&self) -> bool {
        self.comparable
    }

    /// Kind-specific metadata
    pub fn detail(&self) -> &TypeDetail {
        &self.detail
    }

    /// Whether the representation contains any pointer
    pub fn has_pointers(&self) -> bool {
        match self.detail {
            TypeDetail::Array { elem, len } => len > 0 && elem.has_pointers(),
            TypeDetail::Struct { fields } => fields.iter().any(|f| f.typ.has_pointers()),
            _ => matches!(
                self.kind,
                Kind::String | Kind::Slice | Kind::Interface
            ) || self.kind.is_pointer_shaped(),
        }
    }

    /// Element type of an array, chan, map, pointer or slice type
    ///
    /// # Panics
    ///
    /// Panics for any other kind.
    pub fn elem(&self) -> &'static Type {
        match self.detail {
            TypeDetail::Array { elem, .. }
            | TypeDetail::Chan { elem, .. }
            | TypeDetail::Map { elem, .. }
            | TypeDetail::Ptr { elem }
            | TypeDetail::Slice { elem } => elem,
            _ => panic!("prism: elem of {} type {}", self.kind, self),
        }
    }

    /// Key type of a map type
    ///
    /// # Panics
    ///
    /// Panics if the type is not a map.
    pub fn key(&self) -> &'static Type {
        match self.detail {
            TypeDetail::Map { key, .. } => key,
            _ => panic!("prism: key of non-map type {}", self),
        }
    }

    /// Length of an array type
    ///
    /// # Panics
    ///
    /// Panics if the type is not an array.
    pub fn array_len(&self) -> usize {
        match self.detail {
            TypeDetail::Array { len, .. } => len,
            _ => panic!("prism: array_len of non-array type {}", self),
        }
    }

    /// Direction of a channel type
    ///
    /// # Panics
    ///
    /// Panics if the type is not a channel.
    pub fn chan_dir(&self) -> ChanDir {
        match self.detail {
            TypeDetail::Chan { dir, .. } => dir,
            _ => panic!("prism: chan_dir of non-chan type {}", self),
        }
    }

    /// Parameter types of a function type (empty for other kinds)
    pub fn params(&self) -> &'static [&'static Type] {
        match self.detail {
            TypeDetail::Func { params, .. } => params,
            _ => &[],
        }
    }

    /// Result types of a function type (empty for other kinds)
    pub fn results(&self) -> &'static [&'static Type] {
        match self.detail {
            TypeDetail::Func { results, .. } => results,
            _ => &[],
        }
    }

    /// Number of parameters
    pub fn num_in(&self) -> usize {
        self.params().len()
    }

    /// Number of results
    pub fn num_out(&self) -> usize {
        self.results().len()
    }

    /// Whether a function type's last parameter is variadic
    pub fn is_variadic(&self) -> bool {
        matches!(self.detail, TypeDetail::Func { variadic: true, .. })
    }

    /// Field table of a struct type (empty for other kinds)
    pub fn fields(&self) -> &'static [StructField] {
        match self.detail {
            TypeDetail::Struct { fields } => fields,
            _ => &[],
        }
    }

    /// Number of struct fields
    pub fn num_field(&self) -> usize {
        self.fields().len()
    }

    /// Methods of an interface type (empty for other kinds)
    pub fn interface_methods(&self) -> &'static [InterfaceMethod] {
        match self.detail {
            TypeDetail::Interface { methods } => methods,
            _ => &[],
        }
    }

    /// Method set of a concrete type, sorted by name
    ///
    /// A named type exposes its value-receiver methods; an unnamed pointer
    /// to a named type exposes every method declared on the pointee.
    pub fn method_set(&self) -> &[Method] {
        match self.detail {
            TypeDetail::Ptr { elem } if self.name.is_none() => {
                elem.methods.get().map_or(&[][..], |t| &t.all[..])
            }
            TypeDetail::Interface { .. } => &[],
            _ => self.methods.get().map_or(&[][..], |t| &t.values[..]),
        }
    }

    /// Number of methods in the method set (interface methods for interfaces)
    pub fn num_method(&self) -> usize {
        match self.kind {
            Kind::Interface => self.interface_methods().len(),
            _ => self.method_set().len(),
        }
    }

    /// Index of the named method in the method set
    pub fn method_by_name(&self, name: &str) -> Option<usize> {
        match self.kind {
            Kind::Interface => self.interface_methods().iter().position(|m| m.name == name),
            _ => self.method_set().iter().position(|m| m.name == name),
        }
    }

    /// Resolve a field name to a field path, looking through embedded structs
    pub fn field_by_name(&'static self, name: &str) -> Option<FieldMatch> {
        lookup::field_by_name_func(self, &|n| n == name)
    }

    /// Resolve the first field whose name satisfies `matches`
    pub fn field_by_name_func(&'static self, matches: &dyn Fn(&str) -> bool) -> Option<FieldMatch> {
        lookup::field_by_name_func(self, matches)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as *const Type as usize).hash(state);
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.repr)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.repr)
    }
}

/// Exported names start with an upper-case letter
pub fn is_exported(name: &str) -> bool {
    name.chars().next().map_or(false, char::is_uppercase)
}

// ============================================================================
// Predeclared types
// ============================================================================

/// `bool`
pub static BOOL: Type = Type::basic(Kind::Bool, "bool", 1, 1);
/// `int`
pub static INT: Type = Type::basic(Kind::Int, "int", PTR_SIZE, PTR_SIZE);
/// `int8`
pub static INT8: Type = Type::basic(Kind::Int8, "int8", 1, 1);
/// `int16`
pub static INT16: Type = Type::basic(Kind::Int16, "int16", 2, 2);
/// `int32`
pub static INT32: Type = Type::basic(Kind::Int32, "int32", 4, 4);
/// `int64`
pub static INT64: Type = Type::basic(Kind::Int64, "int64", 8, 8);
/// `uint`
pub static UINT: Type = Type::basic(Kind::Uint, "uint", PTR_SIZE, PTR_SIZE);
/// `uint8`
pub static UINT8: Type = Type::basic(Kind::Uint8, "uint8", 1, 1);
/// `uint16`
pub static UINT16: Type = Type::basic(Kind::Uint16, "uint16", 2, 2);
/// `uint32`
pub static UINT32: Type = Type::basic(Kind::Uint32, "uint32", 4, 4);
/// `uint64`
pub static UINT64: Type = Type::basic(Kind::Uint64, "uint64", 8, 8);
/// `uintptr`
pub static UINTPTR: Type = Type::basic(Kind::Uintptr, "uintptr", PTR_SIZE, PTR_SIZE);
/// `float32`
pub static FLOAT32: Type = Type::basic(Kind::Float32, "float32", 4, 4);
/// `float64`
pub static FLOAT64: Type = Type::basic(Kind::Float64, "float64", 8, 8);
/// `complex64`
pub static COMPLEX64: Type = Type::basic(Kind::Complex64, "complex64", 8, 4);
/// `complex128`
pub static COMPLEX128: Type = Type::basic(Kind::Complex128, "complex128", 16, 8);
/// `string`
pub static STRING: Type = Type::basic(Kind::String, "string", 2 * PTR_SIZE, PTR_SIZE);
/// `unsafe.Pointer`
pub static UNSAFE_POINTER: Type =
    Type::basic(Kind::UnsafePointer, "unsafe.Pointer", PTR_SIZE, PTR_SIZE);

/// The empty interface `interface {}`
pub static ANY: Type = Type {
    kind: Kind::Interface,
    size: 2 * PTR_SIZE,
    align: PTR_SIZE,
    pkg_path: None,
    name: None,
    repr: "interface {}",
    comparable: true,
    detail: TypeDetail::Interface { methods: &[] },
    methods: OnceCell::new(),
    ptr_to: OnceCell::new(),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_through_index() {
        for (i, kind) in KINDS.iter().enumerate() {
            assert_eq!(Kind::from_index(i), *kind);
            assert_eq!(*kind as usize, i);
        }
        assert_eq!(Kind::from_index(99), Kind::Invalid);
    }

    #[test]
    fn test_basic_sizes() {
        assert_eq!(BOOL.size(), 1);
        assert_eq!(INT32.size(), 4);
        assert_eq!(COMPLEX64.align(), 4);
        assert_eq!(STRING.size(), 2 * PTR_SIZE);
        assert_eq!(ANY.size(), 2 * PTR_SIZE);
    }

    #[test]
    fn test_chan_dir() {
        assert!(ChanDir::Both.can_send());
        assert!(ChanDir::Both.can_recv());
        assert!(!ChanDir::Recv.can_send());
        assert!(!ChanDir::Send.can_recv());
    }

    #[test]
    fn test_exported() {
        assert!(is_exported("Name"));
        assert!(!is_exported("name"));
        assert!(!is_exported(""));
    }
}
