//! Map objects
//!
//! A non-nil `map` word points at a [`MapObject`]. Keys and values are copied
//! into storage owned by the map; hashing and equality follow the key type.

use crate::error::{RuntimeError, RuntimeResult};
use crate::header::StringHeader;
use crate::heap;
use crate::iface::{self, word_data};
use crate::types::{Kind, Type};
use parking_lot::Mutex;
use rand::Rng;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Key stored in (or probing) a map
struct MapKey {
    typ: &'static Type,
    data: *const u8,
}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // SAFETY: data always points at a live value of typ
        unsafe { hash_value(self.typ, self.data, state) }
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        // SAFETY: as above
        unsafe { equal_value(self.typ, self.data, other.data) }
    }
}

impl Eq for MapKey {}

fn bytes_of<'a>(p: *const u8, n: usize) -> &'a [u8] {
    if n == 0 {
        return &[];
    }
    // SAFETY: callers pass pointers valid for n bytes
    unsafe { std::slice::from_raw_parts(p, n) }
}

/// Hash the `typ` value at `p`
///
/// # Safety
///
/// `p` must point at a live value of `typ`, which must be hashable.
unsafe fn hash_value<H: Hasher>(typ: &Type, p: *const u8, state: &mut H) {
    match typ.kind() {
        Kind::Float32 => {
            let f = *(p as *const f32);
            // +0 and -0 compare equal, so they must hash equal
            let f = if f == 0.0 { 0.0f32 } else { f };
            state.write_u32(f.to_bits());
        }
        Kind::Float64 => {
            let f = *(p as *const f64);
            let f = if f == 0.0 { 0.0f64 } else { f };
            state.write_u64(f.to_bits());
        }
        Kind::Complex64 => {
            hash_value(&crate::types::FLOAT32, p, state);
            hash_value(&crate::types::FLOAT32, p.add(4), state);
        }
        Kind::Complex128 => {
            hash_value(&crate::types::FLOAT64, p, state);
            hash_value(&crate::types::FLOAT64, p.add(8), state);
        }
        Kind::String => {
            state.write((*(p as *const StringHeader)).as_bytes());
        }
        Kind::Array => {
            let elem = typ.elem();
            for i in 0..typ.array_len() {
                hash_value(elem, p.add(i * elem.size()), state);
            }
        }
        Kind::Struct => {
            for f in typ.fields() {
                hash_value(f.typ, p.add(f.offset), state);
            }
        }
        Kind::Interface => match iface::load(typ, p) {
            None => state.write_u8(0),
            Some((dyn_typ, word)) => {
                state.write_usize(dyn_typ as *const Type as usize);
                hash_value(dyn_typ, word_data(dyn_typ, &word), state);
            }
        },
        _ => state.write(bytes_of(p, typ.size())),
    }
}

/// Compare two `typ` values with `==` semantics
///
/// # Safety
///
/// Both pointers must point at live values of `typ`, which must be comparable.
pub unsafe fn equal_value(typ: &Type, a: *const u8, b: *const u8) -> bool {
    match typ.kind() {
        Kind::Float32 => *(a as *const f32) == *(b as *const f32),
        Kind::Float64 => *(a as *const f64) == *(b as *const f64),
        Kind::Complex64 => {
            equal_value(&crate::types::FLOAT32, a, b)
                && equal_value(&crate::types::FLOAT32, a.add(4), b.add(4))
        }
        Kind::Complex128 => {
            equal_value(&crate::types::FLOAT64, a, b)
                && equal_value(&crate::types::FLOAT64, a.add(8), b.add(8))
        }
        Kind::String => {
            (*(a as *const StringHeader)).as_bytes() == (*(b as *const StringHeader)).as_bytes()
        }
        Kind::Array => {
            let elem = typ.elem();
            (0..typ.array_len()).all(|i| {
                let off = i * elem.size();
                equal_value(elem, a.add(off), b.add(off))
            })
        }
        Kind::Struct => typ
            .fields()
            .iter()
            .all(|f| equal_value(f.typ, a.add(f.offset), b.add(f.offset))),
        Kind::Interface => match (iface::load(typ, a), iface::load(typ, b)) {
            (None, None) => true,
            (Some((ta, wa)), Some((tb, wb))) => {
                ta == tb
                    && ta.comparable()
                    && equal_value(ta, word_data(ta, &wa), word_data(tb, &wb))
            }
            _ => false,
        },
        _ => bytes_of(a, typ.size()) == bytes_of(b, typ.size()),
    }
}

/// Reject keys whose interface parts hold non-comparable dynamic values
///
/// # Safety
///
/// `p` must point at a live value of `typ`.
unsafe fn check_hashable(typ: &Type, p: *const u8) -> RuntimeResult<()> {
    match typ.kind() {
        Kind::Interface => match iface::load(typ, p) {
            None => Ok(()),
            Some((dyn_typ, _)) if !dyn_typ.comparable() => Err(RuntimeError::Unhashable {
                typ: dyn_typ.to_string(),
            }),
            Some((dyn_typ, word)) => check_hashable(dyn_typ, word_data(dyn_typ, &word)),
        },
        Kind::Array => {
            let elem = typ.elem();
            for i in 0..typ.array_len() {
                check_hashable(elem, p.add(i * elem.size()))?;
            }
            Ok(())
        }
        Kind::Struct => {
            for f in typ.fields() {
                check_hashable(f.typ, p.add(f.offset))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Associative map with runtime-typed keys and values
pub struct MapObject {
    key: &'static Type,
    elem: &'static Type,
    entries: Mutex<FxHashMap<MapKey, *mut u8>>,
}

// SAFETY: entries is guarded by the mutex; key and value storage is owned by
// the map and never freed
unsafe impl Send for MapObject {}
unsafe impl Sync for MapObject {}

impl MapObject {
    /// Most entries a size hint reserves up front
    pub const MAX_PREALLOC: usize = 1 << 16;

    /// Create an empty map for map type `typ`
    ///
    /// `hint` only sizes the initial table and is capped at
    /// [`MapObject::MAX_PREALLOC`].
    ///
    /// # Panics
    ///
    /// Panics if `typ` is not a map type.
    pub fn new(typ: &'static Type, hint: usize) -> Self {
        let hint = hint.min(Self::MAX_PREALLOC);
        Self {
            key: typ.key(),
            elem: typ.elem(),
            entries: Mutex::new(FxHashMap::with_capacity_and_hasher(hint, Default::default())),
        }
    }

    /// Allocate a map and return its word
    pub fn alloc(typ: &'static Type, hint: usize) -> usize {
        Box::leak(Box::new(Self::new(typ, hint))) as *const MapObject as usize
    }

    /// Decode a map word; `None` for the nil map
    ///
    /// # Safety
    ///
    /// A non-zero `word` must have been produced by [`MapObject::alloc`].
    pub unsafe fn from_word<'a>(word: usize) -> Option<&'a MapObject> {
        (word as *const MapObject).as_ref()
    }

    /// Key type
    pub fn key_type(&self) -> &'static Type {
        self.key
    }

    /// Value type
    pub fn elem_type(&self) -> &'static Type {
        self.elem
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage of the value stored under `key`
    ///
    /// The storage stays valid after later assignments and deletes; callers
    /// copy out of it.
    ///
    /// # Safety
    ///
    /// `key` must point at a live value of the key type.
    pub unsafe fn access(&self, key: *const u8) -> RuntimeResult<Option<*const u8>> {
        check_hashable(self.key, key)?;
        let probe = MapKey {
            typ: self.key,
            data: key,
        };
        Ok(self.entries.lock().get(&probe).map(|&v| v as *const u8))
    }

    /// Store a copy of `val` under a copy of `key`
    ///
    /// # Safety
    ///
    /// `key` and `val` must point at live values of the key and value types.
    pub unsafe fn assign(&self, key: *const u8, val: *const u8) -> RuntimeResult<()> {
        check_hashable(self.key, key)?;
        let stored_key = MapKey {
            typ: self.key,
            data: heap::clone_value(self.key, key),
        };
        let stored_val = heap::clone_value(self.elem, val);
        self.entries.lock().insert(stored_key, stored_val);
        Ok(())
    }

    /// Remove the entry under `key`, if any
    ///
    /// # Safety
    ///
    /// `key` must point at a live value of the key type.
    pub unsafe fn delete(&self, key: *const u8) -> RuntimeResult<()> {
        check_hashable(self.key, key)?;
        let probe = MapKey {
            typ: self.key,
            data: key,
        };
        self.entries.lock().remove(&probe);
        Ok(())
    }

    /// Snapshot of the key storage, starting at a random entry
    pub fn keys(&self) -> Vec<*const u8> {
        let entries = self.entries.lock();
        let mut keys: Vec<*const u8> = entries.keys().map(|k| k.data).collect();
        if keys.len() > 1 {
            let start = rand::thread_rng().gen_range(0..keys.len());
            keys.rotate_left(start);
        }
        keys
    }
}

impl fmt::Debug for MapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapObject")
            .field("key", &self.key)
            .field("elem", &self.elem)
            .field("length", &self.len())
            .finish()
    }
}
