//! Structural navigation
//!
//! Values derived through `field`, `index` and `elem` alias the storage of
//! the Value they came from. Map lookups and slicing produce fresh storage.

use crate::error::{ReflectError, ReflectResult};
use crate::value::{value_of, Flag, Value};
use prism_runtime::iface::{self, Eface};
use prism_runtime::types::{slice_of, UINT8};
use prism_runtime::{heap, Kind, MapObject, RuntimeError, SliceHeader, StringHeader};

impl Value {
    /// Number of fields of a struct
    pub fn num_field(&self) -> ReflectResult<usize> {
        self.must_be("Value::num_field", Kind::Struct)?;
        Ok(self.rtype("Value::num_field")?.num_field())
    }

    /// Field `i` of a struct
    ///
    /// The result shares the struct's storage and inherits its flags;
    /// unexported fields are read-only.
    pub fn field(&self, i: usize) -> ReflectResult<Value> {
        self.must_be("Value::field", Kind::Struct)?;
        let fields = self.rtype("Value::field")?.fields();
        let f = fields.get(i).ok_or(ReflectError::IndexOutOfRange {
            method: "Value::field",
            index: i,
            bound: fields.len(),
        })?;

        let mut fl = (self.flag & (Flag::RO | Flag::INDIR | Flag::ADDR)) | Flag::kind(f.typ.kind());
        if !f.is_exported() {
            fl = fl | Flag::RO;
        }

        if self.flag.has(Flag::INDIR) {
            return Ok(Value::from_parts(f.typ, self.word + f.offset, fl));
        }
        // The whole struct lives in the word
        // SAFETY: offset + size lies within the struct, which fits in the word
        let word = unsafe {
            let base = &self.word as *const usize as *const u8;
            heap::load_scalar(base.add(f.offset), f.typ.size())
        };
        Ok(Value::from_parts(f.typ, word, fl))
    }

    /// Nested field reached by following `index` through embedded structs
    ///
    /// Embedded pointers to structs are dereferenced along the way.
    pub fn field_by_index(&self, index: &[usize]) -> ReflectResult<Value> {
        self.must_be("Value::field_by_index", Kind::Struct)?;
        let mut v = *self;
        for (depth, &i) in index.iter().enumerate() {
            if depth > 0 && v.kind() == Kind::Ptr {
                let pointee = v.rtype("Value::field_by_index")?.elem();
                if pointee.kind() == Kind::Struct {
                    if v.ptr_word() == 0 {
                        return Err(ReflectError::NilDereference {
                            method: "Value::field_by_index",
                        });
                    }
                    v = v.elem()?;
                }
            }
            v = v.field(i)?;
        }
        Ok(v)
    }

    /// Field with the given name, searching embedded structs; invalid if none
    pub fn field_by_name(&self, name: &str) -> ReflectResult<Value> {
        self.must_be("Value::field_by_name", Kind::Struct)?;
        match self.rtype("Value::field_by_name")?.field_by_name(name) {
            Some(m) => self.field_by_index(&m.index),
            None => Ok(Value::INVALID),
        }
    }

    /// First field whose name satisfies `matches`; invalid if none
    pub fn field_by_name_func(&self, matches: impl Fn(&str) -> bool) -> ReflectResult<Value> {
        self.must_be("Value::field_by_name_func", Kind::Struct)?;
        match self.rtype("Value::field_by_name_func")?.field_by_name_func(&matches) {
            Some(m) => self.field_by_index(&m.index),
            None => Ok(Value::INVALID),
        }
    }

    /// Element `i` of an array, slice or string
    ///
    /// Slice elements are always addressable; string bytes never are.
    pub fn index(&self, i: usize) -> ReflectResult<Value> {
        let t = self.rtype("Value::index")?;
        match self.kind() {
            Kind::Array => {
                let elem = t.elem();
                if i >= t.array_len() {
                    return Err(ReflectError::IndexOutOfRange {
                        method: "Value::index",
                        index: i,
                        bound: t.array_len(),
                    });
                }
                let offset = i * elem.size();
                let fl =
                    (self.flag & (Flag::RO | Flag::INDIR | Flag::ADDR)) | Flag::kind(elem.kind());
                if self.flag.has(Flag::INDIR) {
                    return Ok(Value::from_parts(elem, self.word + offset, fl));
                }
                // SAFETY: the whole array lives in the word
                let word = unsafe {
                    let base = &self.word as *const usize as *const u8;
                    heap::load_scalar(base.add(offset), elem.size())
                };
                Ok(Value::from_parts(elem, word, fl))
            }
            Kind::Slice => {
                let s = self.slice_header();
                if i >= s.len {
                    return Err(ReflectError::IndexOutOfRange {
                        method: "Value::index",
                        index: i,
                        bound: s.len,
                    });
                }
                let elem = t.elem();
                let fl = Flag::ADDR | Flag::INDIR | self.flag.ro() | Flag::kind(elem.kind());
                Ok(Value::from_parts(elem, s.data as usize + i * elem.size(), fl))
            }
            Kind::String => {
                let s = self.string_header();
                let byte = s.as_bytes().get(i).copied().ok_or(ReflectError::IndexOutOfRange {
                    method: "Value::index",
                    index: i,
                    bound: s.len,
                })?;
                Ok(Value::from_parts(
                    &UINT8,
                    byte as usize,
                    self.flag.ro() | Flag::kind(Kind::Uint8),
                ))
            }
            kind => Err(ReflectError::InvalidKind {
                method: "Value::index",
                kind,
            }),
        }
    }

    /// Target of a pointer or the value held by an interface
    ///
    /// A nil pointer or nil interface gives the invalid Value.
    pub fn elem(&self) -> ReflectResult<Value> {
        let t = self.rtype("Value::elem")?;
        match self.kind() {
            Kind::Interface => {
                // SAFETY: interface values are INDIR and point at two words
                let loaded = unsafe { iface::load(t, self.data_ptr()) };
                Ok(match loaded {
                    None => Value::INVALID,
                    Some((typ, word)) => {
                        let mut v = value_of(Eface { typ, word });
                        v.flag = v.flag | self.flag.ro();
                        v
                    }
                })
            }
            Kind::Ptr => {
                let p = self.ptr_word();
                if p == 0 {
                    return Ok(Value::INVALID);
                }
                let elem = t.elem();
                let fl = self.flag.ro() | Flag::INDIR | Flag::ADDR | Flag::kind(elem.kind());
                Ok(Value::from_parts(elem, p, fl))
            }
            kind => Err(ReflectError::InvalidKind {
                method: "Value::elem",
                kind,
            }),
        }
    }

    fn map_object(&self) -> Option<&'static MapObject> {
        // SAFETY: non-zero map words come from MapObject::alloc
        unsafe { MapObject::from_word(self.ptr_word()) }
    }

    /// Value stored under `key`, or the invalid Value if absent
    ///
    /// The result is a copy; it never aliases the map's storage.
    pub fn map_index(&self, key: Value) -> ReflectResult<Value> {
        self.must_be("Value::map_index", Kind::Map)?;
        let t = self.rtype("Value::map_index")?;
        let key = key.assign_to("reflect.Value.MapIndex", t.key())?;
        let Some(m) = self.map_object() else {
            return Ok(Value::INVALID);
        };
        // SAFETY: key now has the map's key type
        let found = unsafe { m.access(key.data_ptr())? };
        Ok(match found {
            None => Value::INVALID,
            // SAFETY: map value storage holds a live elem value
            Some(p) => unsafe { Value::load_copy(t.elem(), p, (self.flag | key.flag).ro()) },
        })
    }

    /// Copies of every key, in unspecified order
    pub fn map_keys(&self) -> ReflectResult<Vec<Value>> {
        self.must_be("Value::map_keys", Kind::Map)?;
        let key_typ = self.rtype("Value::map_keys")?.key();
        let ro = self.flag.ro();
        Ok(self.map_object().map_or_else(Vec::new, |m| {
            m.keys()
                .into_iter()
                // SAFETY: key storage holds a live key value
                .map(|k| unsafe { Value::load_copy(key_typ, k, ro) })
                .collect()
        }))
    }

    /// Store `val` under `key`; an invalid `val` deletes the key
    pub fn set_map_index(&self, key: Value, val: Value) -> ReflectResult<()> {
        self.must_be("Value::set_map_index", Kind::Map)?;
        self.must_be_exported("Value::set_map_index")?;
        key.must_be_exported("Value::set_map_index")?;
        let t = self.rtype("Value::set_map_index")?;
        let key = key.assign_to("reflect.Value.SetMapIndex", t.key())?;

        if !val.is_valid() {
            if let Some(m) = self.map_object() {
                // SAFETY: key has the map's key type
                unsafe { m.delete(key.data_ptr())? };
            }
            return Ok(());
        }

        val.must_be_exported("Value::set_map_index")?;
        let val = val.assign_to("reflect.Value.SetMapIndex", t.elem())?;
        let m = self.map_object().ok_or(RuntimeError::NilMap)?;
        // SAFETY: key and val have the map's key and value types
        unsafe { m.assign(key.data_ptr(), val.data_ptr())? };
        Ok(())
    }

    /// `v[i:j]` for arrays, slices and strings
    pub fn slice(&self, i: usize, j: usize) -> ReflectResult<Value> {
        if self.kind() == Kind::String {
            let t = self.rtype("Value::slice")?;
            let s = self.string_header();
            check_bounds("Value::slice", &[i, j], s.len)?;
            let sub = StringHeader {
                data: if j > i {
                    // SAFETY: i < len, so the offset stays within the string
                    unsafe { s.data.add(i) }
                } else {
                    s.data
                },
                len: j - i,
            };
            let p = heap::alloc(t);
            // SAFETY: fresh storage of a string type
            unsafe {
                (p as *mut StringHeader).write(sub);
                return Ok(Value::from_storage(t, p, self.flag.ro()));
            }
        }
        let (base, cap) = self.sliceable("Value::slice")?;
        check_bounds("Value::slice", &[i, j], cap)?;
        self.make_subslice(base, i, j, cap)
    }

    /// `v[i:j:k]` for arrays and slices
    pub fn slice3(&self, i: usize, j: usize, k: usize) -> ReflectResult<Value> {
        let (base, cap) = self.sliceable("Value::slice3")?;
        check_bounds("Value::slice3", &[i, j, k], cap)?;
        self.make_subslice(base, i, j, k)
    }

    /// Base pointer and capacity of an addressable array or a slice
    fn sliceable(&self, method: &'static str) -> ReflectResult<(*mut u8, usize)> {
        let t = self.rtype(method)?;
        match self.kind() {
            Kind::Array => {
                if !self.flag.has(Flag::ADDR) {
                    return Err(ReflectError::NotAssignable { method });
                }
                Ok((self.word as *mut u8, t.array_len()))
            }
            Kind::Slice => {
                let s = self.slice_header();
                Ok((s.data, s.cap))
            }
            kind => Err(ReflectError::InvalidKind { method, kind }),
        }
    }

    fn make_subslice(&self, base: *mut u8, i: usize, j: usize, k: usize) -> ReflectResult<Value> {
        let t = self.rtype("Value::slice")?;
        let (slice_typ, elem) = match self.kind() {
            Kind::Array => (slice_of(t.elem()), t.elem()),
            _ => (t, t.elem()),
        };
        let data = if k > i {
            // SAFETY: i < k <= cap, so the offset stays within the backing array
            unsafe { base.add(i * elem.size()) }
        } else {
            base
        };
        let header = SliceHeader {
            data,
            len: j - i,
            cap: k - i,
        };
        let p = heap::alloc(slice_typ);
        // SAFETY: fresh storage of a slice type
        unsafe {
            (p as *mut SliceHeader).write(header);
            Ok(Value::from_storage(slice_typ, p, self.flag.ro()))
        }
    }

    /// Number of methods in the value's method set
    pub fn num_method(&self) -> ReflectResult<usize> {
        let t = self.rtype("Value::num_method")?;
        if self.flag.has(Flag::METHOD) {
            return Ok(0);
        }
        Ok(t.num_method())
    }

    /// Method `i` bound to this value as its receiver
    pub fn method(&self, i: usize) -> ReflectResult<Value> {
        let t = self.rtype("Value::method")?;
        if self.flag.has(Flag::METHOD) {
            return Err(ReflectError::InvalidKind {
                method: "Value::method",
                kind: Kind::Func,
            });
        }
        if i >= t.num_method() {
            return Err(ReflectError::IndexOutOfRange {
                method: "Value::method",
                index: i,
                bound: t.num_method(),
            });
        }
        let exported = match t.kind() {
            Kind::Interface => {
                if self.is_nil()? {
                    return Err(ReflectError::NilDereference {
                        method: "Value::method",
                    });
                }
                t.interface_methods()[i].is_exported()
            }
            _ => t.method_set()[i].is_exported(),
        };
        let mut fl = self.flag.ro() | (self.flag & Flag::INDIR) | Flag::method(i);
        if !exported {
            fl = fl | Flag::RO;
        }
        Ok(Value::from_parts(t, self.word, fl))
    }

    /// Method with the given name bound to this value; invalid if none
    pub fn method_by_name(&self, name: &str) -> ReflectResult<Value> {
        let t = self.rtype("Value::method_by_name")?;
        if self.flag.has(Flag::METHOD) {
            return Err(ReflectError::InvalidKind {
                method: "Value::method_by_name",
                kind: Kind::Func,
            });
        }
        match t.method_by_name(name) {
            Some(i) => self.method(i),
            None => Ok(Value::INVALID),
        }
    }
}

/// Bounds must be non-decreasing and at most `cap`
fn check_bounds(method: &'static str, bounds: &[usize], cap: usize) -> ReflectResult<()> {
    let mut prev = 0;
    for &b in bounds {
        if b < prev || b > cap {
            return Err(ReflectError::IndexOutOfRange {
                method,
                index: b,
                bound: if b > cap { cap } else { prev },
            });
        }
        prev = b;
    }
    Ok(())
}
