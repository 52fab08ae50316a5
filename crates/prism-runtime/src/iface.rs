//! Interface carriers and itabs
//!
//! ```text
//! empty interface       non-empty interface
//! ┌──────────────┐      ┌──────────────┐      ┌──────────────┐
//! │ *Type        │      │ *Itab ───────┼─────►│ ityp, typ    │
//! ├──────────────┤      ├──────────────┤      │ fun[0..n]    │
//! │ data word    │      │ data word    │      └──────────────┘
//! └──────────────┘      └──────────────┘
//! ```
//!
//! The data word holds the dynamic value itself when it fits in one word,
//! otherwise a pointer to a private copy of it.

use crate::abi::{Code, Frame};
use crate::error::{RuntimeError, RuntimeResult};
use crate::heap;
use crate::types::{implements, Kind, Method, Type, PTR_SIZE};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{compiler_fence, Ordering};
use std::sync::Arc;

/// Empty interface representation
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eface {
    /// Dynamic type (null for a nil interface)
    pub typ: *const Type,
    /// Data word
    pub word: usize,
}

/// Non-empty interface representation
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iface {
    /// Method table (null for a nil interface)
    pub tab: *const Itab,
    /// Data word
    pub word: usize,
}

// SAFETY: both point only at immutable, never-freed runtime metadata
unsafe impl Send for Eface {}
unsafe impl Sync for Eface {}
unsafe impl Send for Iface {}
unsafe impl Sync for Iface {}

impl Eface {
    /// The nil interface
    pub const NIL: Eface = Eface {
        typ: std::ptr::null(),
        word: 0,
    };

    /// Dynamic type, `None` for nil
    pub fn dynamic_type(&self) -> Option<&'static Type> {
        // SAFETY: non-null typ always points at a leaked or static descriptor
        unsafe { self.typ.as_ref() }
    }
}

/// Method table binding a concrete type to an interface type
pub struct Itab {
    /// Interface type
    pub ityp: &'static Type,
    /// Concrete type
    pub typ: &'static Type,
    /// One body per interface method, in interface method order
    pub fun: Vec<Code>,
}

impl fmt::Debug for Itab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Itab")
            .field("ityp", &self.ityp)
            .field("typ", &self.typ)
            .field("fun", &self.fun.len())
            .finish()
    }
}

static ITABS: Lazy<RwLock<FxHashMap<(usize, usize), &'static Itab>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// The itab for (`ityp`, `typ`), built on first use
///
/// Returns `None` if `typ` does not implement `ityp`.
pub fn get_itab(ityp: &'static Type, typ: &'static Type) -> Option<&'static Itab> {
    let key = (ityp as *const Type as usize, typ as *const Type as usize);
    if let Some(tab) = ITABS.read().get(&key).copied() {
        return Some(tab);
    }
    if !implements(ityp, typ) {
        return None;
    }

    let set = typ.method_set();
    let fun = ityp
        .interface_methods()
        .iter()
        .filter_map(|im| set.iter().find(|m| m.name == im.name))
        .map(|m| resolve_method(typ, m))
        .collect();

    let mut cache = ITABS.write();
    let tab = *cache.entry(key).or_insert_with(|| {
        tracing::debug!(iface = %ityp, typ = %typ, "built itab");
        let tab: &'static Itab = Box::leak(Box::new(Itab { ityp, typ, fun }));
        tab
    });
    Some(tab)
}

/// Body to run for method `m` of `recv`'s method set
///
/// The receiver word handed to a method body encodes the type the method was
/// declared on. A value-receiver method reached through `*T` therefore gets
/// a wrapper that dereferences the pointer first.
pub fn resolve_method(recv: &'static Type, m: &Method) -> Code {
    if recv.kind() != Kind::Ptr || recv.name().is_some() || m.pointer_receiver {
        return m.code.clone();
    }

    let elem = recv.elem();
    let name = m.name;
    let code = m.code.clone();
    Arc::new(move |frame: &mut Frame| {
        let p = frame.receiver_word() as *const u8;
        if p.is_null() {
            panic!("value method {}.{} called using nil pointer", elem, name);
        }
        // SAFETY: a non-nil *T receiver points at a live T
        let word = unsafe { pack_word(elem, p) };
        frame.set_receiver_word(word);
        code(frame)
    })
}

/// Whether values of `typ` are stored in the data word itself
pub fn is_direct(typ: &Type) -> bool {
    typ.size() <= PTR_SIZE
}

/// Encode the `typ` value at `p` as a data word
///
/// Values larger than a word are copied to fresh storage.
///
/// # Safety
///
/// `p` must be valid for reads of `typ.size()` bytes.
pub unsafe fn pack_word(typ: &Type, p: *const u8) -> usize {
    if is_direct(typ) {
        heap::load_scalar(p, typ.size())
    } else {
        heap::clone_value(typ, p) as usize
    }
}

/// Pointer to the value a data word encodes
///
/// For direct values this points into `word` itself.
pub fn word_data(typ: &Type, word: &usize) -> *const u8 {
    if is_direct(typ) {
        word as *const usize as *const u8
    } else {
        *word as *const u8
    }
}

/// Read the dynamic type and data word of the `iface` value at `p`
///
/// # Safety
///
/// `p` must point at a valid value of interface type `iface`.
pub unsafe fn load(iface: &Type, p: *const u8) -> Option<(&'static Type, usize)> {
    if iface.interface_methods().is_empty() {
        let e = *(p as *const Eface);
        e.dynamic_type().map(|t| (t, e.word))
    } else {
        let i = *(p as *const Iface);
        i.tab.as_ref().map(|tab| (tab.typ, i.word))
    }
}

/// Writes an interface value so that the type word is never observed ahead
/// of the data word it describes
#[derive(Debug, Clone, Copy)]
pub struct CarrierBuilder {
    iface: &'static Type,
    value: Option<(&'static Type, usize)>,
}

impl CarrierBuilder {
    /// A nil carrier of interface type `iface`
    pub fn new(iface: &'static Type) -> Self {
        Self { iface, value: None }
    }

    /// Hold a value of dynamic type `typ` encoded as `word`
    pub fn with_value(mut self, typ: &'static Type, word: usize) -> Self {
        self.value = Some((typ, word));
        self
    }

    /// Resolve the type word and write the carrier to `dst`
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes of two words.
    pub unsafe fn write(self, dst: *mut u8) -> RuntimeResult<()> {
        let (tword, word) = match self.value {
            None => (0usize, 0usize),
            Some((typ, word)) if self.iface.interface_methods().is_empty() => {
                (typ as *const Type as usize, word)
            }
            Some((typ, word)) => match get_itab(self.iface, typ) {
                Some(tab) => (tab as *const Itab as usize, word),
                None => {
                    return Err(RuntimeError::MissingMethod {
                        typ: typ.to_string(),
                        iface: self.iface.to_string(),
                    })
                }
            },
        };
        let words = dst as *mut usize;
        words.add(1).write_unaligned(word);
        compiler_fence(Ordering::Release);
        words.write_unaligned(tword);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::StringHeader;
    use crate::types::{
        declare_methods, func_of, interface_of, named, ptr_to, MethodDecl, ANY, INT, STRING,
    };

    #[test]
    fn test_pack_direct_and_indirect() {
        let x: isize = -7;
        let w = unsafe { pack_word(&INT, &x as *const isize as *const u8) };
        assert_eq!(unsafe { *(word_data(&INT, &w) as *const isize) }, -7);

        let s = StringHeader::new("boxed");
        let w = unsafe { pack_word(&STRING, &s as *const StringHeader as *const u8) };
        assert_ne!(w, &s as *const StringHeader as usize);
        let copy = unsafe { *(word_data(&STRING, &w) as *const StringHeader) };
        assert_eq!(copy.as_str(), Some("boxed"));
    }

    #[test]
    fn test_carrier_round_trip() {
        let mut slot = [0usize; 2];
        unsafe {
            CarrierBuilder::new(&ANY)
                .with_value(&INT, 5)
                .write(slot.as_mut_ptr() as *mut u8)
                .unwrap();
            let (t, w) = load(&ANY, slot.as_ptr() as *const u8).unwrap();
            assert_eq!(t, &INT);
            assert_eq!(w, 5);

            CarrierBuilder::new(&ANY).write(slot.as_mut_ptr() as *mut u8).unwrap();
            assert!(load(&ANY, slot.as_ptr() as *const u8).is_none());
        }
    }

    #[test]
    fn test_itab_cached_and_pointer_wrapper() {
        let sig = func_of(&[], &[&INT], false).unwrap();
        let getter = interface_of(&[("Get", sig)]).unwrap();
        let t = named("main", "Cell", &INT);
        declare_methods(
            t,
            vec![MethodDecl::value(
                "Get",
                sig,
                Arc::new(|frame: &mut Frame| {
                    let v = frame.receiver_word() as isize;
                    frame.set_result(0, v + 1);
                }),
            )],
        )
        .unwrap();

        let tab = get_itab(getter, ptr_to(t)).unwrap();
        assert!(std::ptr::eq(tab, get_itab(getter, ptr_to(t)).unwrap()));
        assert!(get_itab(getter, &INT).is_none());

        let cell: isize = 41;
        let mut frame = Frame::for_func(sig, true);
        frame.set_receiver_word(&cell as *const isize as usize);
        (tab.fun[0])(&mut frame);
        assert_eq!(frame.result::<isize>(0), 42);
    }
}
