//! Zero values, allocation and growable sequences

use crate::error::{ReflectError, ReflectResult};
use crate::value::{Flag, Value};
use prism_runtime::types::{assignable_to, ptr_to};
use prism_runtime::{
    config, heap, ChanDir, ChanObject, Kind, MapObject, SliceHeader, Type, PTR_SIZE,
};

/// The zero value of `t`; neither addressable nor settable
pub fn zero(t: &'static Type) -> Value {
    let fl = Flag::kind(t.kind());
    if t.size() > PTR_SIZE {
        Value::from_parts(t, heap::alloc(t) as usize, fl | Flag::INDIR)
    } else {
        Value::from_parts(t, 0, fl)
    }
}

/// Pointer to freshly allocated zeroed storage of `t`
pub fn new(t: &'static Type) -> Value {
    let p = heap::alloc(t);
    Value::from_parts(ptr_to(t), p as usize, Flag::kind(Kind::Ptr))
}

/// Pointer of type `*t` to caller-provided storage
///
/// # Safety
///
/// `p` must point at a valid `t` value that outlives every Value derived
/// from the result. Writes through those Values land in `p`.
pub unsafe fn new_at(t: &'static Type, p: *mut u8) -> Value {
    Value::from_parts(ptr_to(t), p as usize, Flag::kind(Kind::Ptr))
}

fn construction_error(method: &'static str, reason: impl Into<String>) -> ReflectError {
    ReflectError::InvalidConstructionArgument {
        method,
        reason: reason.into(),
    }
}

/// New slice of type `t` with the given length and capacity
pub fn make_slice(t: &'static Type, len: usize, cap: usize) -> ReflectResult<Value> {
    if t.kind() != Kind::Slice {
        return Err(construction_error("MakeSlice", format!("non-slice type {}", t)));
    }
    if len > cap {
        return Err(construction_error("MakeSlice", "len > cap"));
    }
    let elem = t.elem();
    let fits = elem.size().checked_mul(cap).map_or(false, heap::fits);
    if !fits {
        return Err(construction_error("MakeSlice", "cap out of range"));
    }

    let header = SliceHeader {
        data: heap::alloc_array(elem, cap),
        len,
        cap,
    };
    let p = heap::alloc(t);
    // SAFETY: p is fresh storage of a slice type
    unsafe {
        (p as *mut SliceHeader).write(header);
        Ok(Value::from_storage(t, p, Flag::EMPTY))
    }
}

/// New channel of type `t` with `buffer` slots
pub fn make_chan(t: &'static Type, buffer: usize) -> ReflectResult<Value> {
    if t.kind() != Kind::Chan {
        return Err(construction_error("MakeChan", format!("non-chan type {}", t)));
    }
    if t.chan_dir() != ChanDir::Both {
        return Err(construction_error("MakeChan", "unidirectional channel type"));
    }
    let fits = ChanObject::buffer_bytes(t.elem(), buffer).map_or(false, heap::fits);
    if !fits {
        return Err(construction_error("MakeChan", "size out of range"));
    }
    let word = ChanObject::alloc(t.elem(), buffer);
    Ok(Value::from_parts(t, word, Flag::kind(Kind::Chan)))
}

/// New empty map of type `t`
pub fn make_map(t: &'static Type) -> ReflectResult<Value> {
    make_map_with_size(t, 0)
}

/// New empty map of type `t` with room for about `n` entries
///
/// `n` is only a hint; large hints reserve at most
/// [`MapObject::MAX_PREALLOC`] entries.
pub fn make_map_with_size(t: &'static Type, n: usize) -> ReflectResult<Value> {
    if t.kind() != Kind::Map {
        return Err(construction_error("MakeMapWithSize", format!("non-map type {}", t)));
    }
    let word = MapObject::alloc(t, n);
    Ok(Value::from_parts(t, word, Flag::kind(Kind::Map)))
}

/// Make room for `extra` more elements
///
/// Returns the old length and a slice of the new length, reallocated when the
/// capacity is too small.
fn grow(s: Value, extra: usize) -> ReflectResult<(usize, Value)> {
    let t = s.rtype("reflect.Append")?;
    let header = s.slice_header();
    let i0 = header.len;
    let i1 = i0
        .checked_add(extra)
        .ok_or_else(|| construction_error("Append", "slice overflow"))?;
    if i1 <= header.cap {
        return Ok((i0, s.slice(0, i1)?));
    }

    let m = config::get().grown_capacity(i0, header.cap, i1);
    let grown = make_slice(t, i1, m)?;
    copy(grown, s)?;
    tracing::debug!(elem = %t.elem(), from = header.cap, to = m, "slice reallocated");
    Ok((i0, grown))
}

/// Append `xs` to slice `s`, returning the resulting slice
///
/// Every element is checked before anything is written.
pub fn append(s: Value, xs: &[Value]) -> ReflectResult<Value> {
    s.must_be("reflect.Append", Kind::Slice)?;
    s.must_be_exported("reflect.Append")?;
    let elem = s.rtype("reflect.Append")?.elem();
    for x in xs {
        x.must_be_exported("reflect.Append")?;
        let xt = x.typ()?;
        if !assignable_to(xt, elem) {
            return Err(ReflectError::NotAssignableTo {
                context: "reflect.Append",
                from: xt.to_string(),
                to: elem.to_string(),
            });
        }
    }

    let (n, s) = grow(s, xs.len())?;
    for (i, x) in xs.iter().enumerate() {
        s.index(n + i)?.set(*x)?;
    }
    Ok(s)
}

/// Append the elements of slice `x` to slice `s`
pub fn append_slice(s: Value, x: Value) -> ReflectResult<Value> {
    s.must_be("reflect.AppendSlice", Kind::Slice)?;
    x.must_be("reflect.AppendSlice", Kind::Slice)?;
    s.must_be_exported("reflect.AppendSlice")?;
    x.must_be_exported("reflect.AppendSlice")?;
    let (se, xe) = (
        s.rtype("reflect.AppendSlice")?.elem(),
        x.rtype("reflect.AppendSlice")?.elem(),
    );
    if se != xe {
        return Err(ReflectError::ElementTypeMismatch {
            method: "AppendSlice",
            expected: se.to_string(),
            actual: xe.to_string(),
        });
    }

    let extra = x.len()?;
    let (n, s) = grow(s, extra)?;
    copy(s.slice(n, n + extra)?, x)?;
    Ok(s)
}

/// Copy elements from `src` into `dst` and return how many were copied
///
/// `dst` is a slice or an addressable array; `src` is a slice or array of
/// the same element type, or a string when `dst` holds bytes.
pub fn copy(dst: Value, src: Value) -> ReflectResult<usize> {
    let dk = dst.kind();
    if dk != Kind::Array && dk != Kind::Slice {
        return Err(ReflectError::InvalidKind {
            method: "reflect.Copy",
            kind: dk,
        });
    }
    if dk == Kind::Array {
        dst.must_be_assignable("reflect.Copy")?;
    }
    dst.must_be_exported("reflect.Copy")?;

    let de = dst.rtype("reflect.Copy")?.elem();
    let sk = src.kind();
    let string_source = sk == Kind::String && de.kind() == Kind::Uint8;
    if sk != Kind::Array && sk != Kind::Slice && !string_source {
        return Err(ReflectError::InvalidKind {
            method: "reflect.Copy",
            kind: sk,
        });
    }
    src.must_be_exported("reflect.Copy")?;
    if !string_source {
        let se = src.rtype("reflect.Copy")?.elem();
        if de != se {
            return Err(ReflectError::ElementTypeMismatch {
                method: "Copy",
                expected: de.to_string(),
                actual: se.to_string(),
            });
        }
    }

    let (dp, dlen) = match dk {
        Kind::Array => (dst.word as *mut u8, dst.rtype("reflect.Copy")?.array_len()),
        _ => {
            let h = dst.slice_header();
            (h.data, h.len)
        }
    };
    let (sp, slen) = match sk {
        Kind::Array => (src.data_ptr(), src.rtype("reflect.Copy")?.array_len()),
        Kind::String => {
            let h = src.string_header();
            (h.data, h.len)
        }
        _ => {
            let h = src.slice_header();
            (h.data as *const u8, h.len)
        }
    };

    let n = dlen.min(slen);
    // SAFETY: both ranges hold at least n elements of de
    unsafe { heap::memmove(dp, sp, n * de.size()) };
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_runtime::types::{array_of, chan_of, map_of, slice_of, INT, INT32, STRING, UINT8};

    #[test]
    fn test_zero_and_new() {
        let z = zero(&STRING);
        assert_eq!(z.to_string(), "");
        assert!(!z.can_set());
        let p = new(&INT32);
        assert_eq!(p.kind(), Kind::Ptr);
        let e = p.elem().unwrap();
        assert!(e.can_set());
        e.set_int(3).unwrap();
        assert_eq!(p.elem().unwrap().int().unwrap(), 3);
    }

    #[test]
    fn test_new_at_aliases_storage() {
        let mut x: i32 = 1;
        let p = unsafe { new_at(&INT32, &mut x as *mut i32 as *mut u8) };
        p.elem().unwrap().set_int(11).unwrap();
        assert_eq!(x, 11);
    }

    #[test]
    fn test_make_slice_arguments() {
        assert!(make_slice(&INT, 0, 0).is_err());
        assert_eq!(
            make_slice(slice_of(&INT), 2, 1).unwrap_err().to_string(),
            "reflect.MakeSlice: len > cap"
        );
        let s = make_slice(slice_of(&INT), 1, 4).unwrap();
        assert_eq!((s.len().unwrap(), s.cap().unwrap()), (1, 4));
    }

    #[test]
    fn test_make_chan_and_map_kinds() {
        assert!(make_chan(chan_of(ChanDir::Send, &INT), 0).is_err());
        assert!(make_chan(&INT, 0).is_err());
        let m = make_map(map_of(&STRING, &INT).unwrap()).unwrap();
        assert_eq!(m.len().unwrap(), 0);
        assert!(make_map(&INT).is_err());
    }

    #[test]
    fn test_append_reuses_spare_capacity() {
        let s = make_slice(slice_of(&INT), 0, 4).unwrap();
        let before = s.pointer().unwrap();
        let s = append(s, &[Value::of(1isize), Value::of(2isize)]).unwrap();
        assert_eq!(s.pointer().unwrap(), before);
        assert_eq!(s.len().unwrap(), 2);
    }

    #[test]
    fn test_append_rejects_before_writing() {
        let s = make_slice(slice_of(&INT), 0, 4).unwrap();
        let err = append(s, &[Value::of(1isize), Value::from("x")]).unwrap_err();
        assert!(matches!(err, ReflectError::NotAssignableTo { .. }));
        assert_eq!(s.len().unwrap(), 0);
    }

    #[test]
    fn test_copy_from_string_into_array() {
        let a = new(array_of(3, &UINT8)).elem().unwrap();
        let n = copy(a, Value::from("hello")).unwrap();
        assert_eq!(n, 3);
        assert_eq!(a.index(2).unwrap().uint().unwrap(), b'l' as u64);
        assert!(copy(zero(array_of(3, &UINT8)), Value::from("x")).is_err());
    }

    #[test]
    fn test_append_slice_element_mismatch() {
        let a = make_slice(slice_of(&INT), 0, 0).unwrap();
        let b = make_slice(slice_of(&INT32), 1, 1).unwrap();
        assert_eq!(
            append_slice(a, b).unwrap_err(),
            ReflectError::ElementTypeMismatch {
                method: "AppendSlice",
                expected: "int".into(),
                actual: "int32".into()
            }
        );
    }
}
