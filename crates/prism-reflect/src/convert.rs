//! Conversions and assignability
//!
//! `convert` follows the language's conversion rules through a table keyed
//! by (source kind, destination kind). `assign_to` is the stricter relation
//! used by `set`, map updates and call arguments: it never changes the
//! representation except to box a value into an interface.

use crate::construct::zero;
use crate::error::{ReflectError, ReflectResult};
use crate::makefunc::make_method_value;
use crate::value::{Flag, Value};
use prism_runtime::header::{Complex128, Complex64, SliceHeader, StringHeader};
use prism_runtime::iface::{self, CarrierBuilder};
use prism_runtime::types::{directly_assignable, identical_underlying, implements};
use prism_runtime::{heap, Kind, Type};

type ConvertOp = fn(Value, &'static Type) -> ReflectResult<Value>;

/// Conversion from `src` to `dst`, if one exists
fn convert_op(dst: &'static Type, src: &'static Type) -> Option<ConvertOp> {
    let (sk, dk) = (src.kind(), dst.kind());
    let op: Option<ConvertOp> = if sk.is_int() {
        match dk {
            k if k.is_int() || k.is_uint() => Some(cvt_int),
            k if k.is_float() => Some(cvt_int_float),
            Kind::String => Some(cvt_int_string),
            _ => None,
        }
    } else if sk.is_uint() {
        match dk {
            k if k.is_int() || k.is_uint() => Some(cvt_uint),
            k if k.is_float() => Some(cvt_uint_float),
            Kind::String => Some(cvt_uint_string),
            _ => None,
        }
    } else if sk.is_float() {
        match dk {
            k if k.is_int() => Some(cvt_float_int),
            k if k.is_uint() => Some(cvt_float_uint),
            k if k.is_float() => Some(cvt_float),
            _ => None,
        }
    } else if sk.is_complex() {
        dk.is_complex().then_some(cvt_complex as ConvertOp)
    } else if sk == Kind::String && dk == Kind::Slice && dst.elem().pkg_path().is_none() {
        match dst.elem().kind() {
            Kind::Uint8 => Some(cvt_string_bytes),
            Kind::Int32 => Some(cvt_string_runes),
            _ => None,
        }
    } else if sk == Kind::Slice && dk == Kind::String && src.elem().pkg_path().is_none() {
        match src.elem().kind() {
            Kind::Uint8 => Some(cvt_bytes_string),
            Kind::Int32 => Some(cvt_runes_string),
            _ => None,
        }
    } else {
        None
    };
    if op.is_some() {
        return op;
    }

    if identical_underlying(dst, src) {
        return Some(cvt_direct);
    }
    // Unnamed pointers to identical underlying types
    if dk == Kind::Ptr
        && !dst.is_named()
        && sk == Kind::Ptr
        && !src.is_named()
        && identical_underlying(dst.elem(), src.elem())
    {
        return Some(cvt_direct);
    }
    if implements(dst, src) {
        if sk == Kind::Interface {
            return Some(cvt_i2i);
        }
        return Some(cvt_t2i);
    }
    None
}

/// Value of type `t` holding a copy of `x`
fn make_scalar<T: Copy>(fl: Flag, x: T, t: &'static Type) -> Value {
    debug_assert_eq!(std::mem::size_of::<T>(), t.size());
    // SAFETY: x is a live T and T has t's size
    unsafe { Value::load_copy(t, &x as *const T as *const u8, fl) }
}

/// Integer of type `t` holding the low bits of `bits`
fn make_int(fl: Flag, bits: u64, t: &'static Type) -> Value {
    match t.size() {
        1 => make_scalar(fl, bits as u8, t),
        2 => make_scalar(fl, bits as u16, t),
        4 => make_scalar(fl, bits as u32, t),
        _ => make_scalar(fl, bits, t),
    }
}

fn make_float(fl: Flag, f: f64, t: &'static Type) -> Value {
    match t.kind() {
        Kind::Float32 => make_scalar(fl, f as f32, t),
        _ => make_scalar(fl, f, t),
    }
}

fn make_complex(fl: Flag, c: Complex128, t: &'static Type) -> Value {
    match t.kind() {
        Kind::Complex64 => make_scalar(fl, Complex64::new(c.re as f32, c.im as f32), t),
        _ => make_scalar(fl, c, t),
    }
}

fn make_string(fl: Flag, bytes: &[u8], t: &'static Type) -> Value {
    make_scalar(fl, StringHeader::from_bytes(bytes), t)
}

/// Slice of type `t` over a fresh copy of `elems`
fn make_slice_of<T: Copy>(fl: Flag, elems: &[T], t: &'static Type) -> Value {
    let data = heap::alloc_array(t.elem(), elems.len());
    // SAFETY: fresh storage for elems.len() elements of t's element type
    unsafe {
        heap::memmove(
            data,
            elems.as_ptr() as *const u8,
            std::mem::size_of_val(elems),
        )
    };
    make_scalar(
        fl,
        SliceHeader {
            data,
            len: elems.len(),
            cap: elems.len(),
        },
        t,
    )
}

fn rune_char(x: i64) -> char {
    u32::try_from(x)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn cvt_int(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_int(v.flag.ro(), v.int()? as u64, t))
}

fn cvt_uint(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_int(v.flag.ro(), v.uint()?, t))
}

fn cvt_float_int(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_int(v.flag.ro(), v.float()? as i64 as u64, t))
}

fn cvt_float_uint(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_int(v.flag.ro(), v.float()? as u64, t))
}

fn cvt_int_float(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_float(v.flag.ro(), v.int()? as f64, t))
}

fn cvt_uint_float(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_float(v.flag.ro(), v.uint()? as f64, t))
}

fn cvt_float(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_float(v.flag.ro(), v.float()?, t))
}

fn cvt_complex(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_complex(v.flag.ro(), v.complex()?, t))
}

fn cvt_int_string(v: Value, t: &'static Type) -> ReflectResult<Value> {
    let x = v.int()?;
    let c = if i32::try_from(x).is_ok() {
        rune_char(x)
    } else {
        char::REPLACEMENT_CHARACTER
    };
    Ok(make_string(v.flag.ro(), c.to_string().as_bytes(), t))
}

fn cvt_uint_string(v: Value, t: &'static Type) -> ReflectResult<Value> {
    let x = v.uint()?;
    let c = match i32::try_from(x) {
        Ok(r) => rune_char(r as i64),
        Err(_) => char::REPLACEMENT_CHARACTER,
    };
    Ok(make_string(v.flag.ro(), c.to_string().as_bytes(), t))
}

fn cvt_bytes_string(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_string(v.flag.ro(), &v.bytes()?, t))
}

fn cvt_string_bytes(v: Value, t: &'static Type) -> ReflectResult<Value> {
    Ok(make_slice_of(v.flag.ro(), v.string_header().as_bytes(), t))
}

fn cvt_runes_string(v: Value, t: &'static Type) -> ReflectResult<Value> {
    let s = v.slice_header();
    let runes: &[i32] = if s.len == 0 {
        &[]
    } else {
        // SAFETY: a non-empty []int32-shaped slice points at len runes
        unsafe { std::slice::from_raw_parts(s.data as *const i32, s.len) }
    };
    let text: String = runes.iter().map(|&r| rune_char(r as i64)).collect();
    Ok(make_string(v.flag.ro(), text.as_bytes(), t))
}

fn cvt_string_runes(v: Value, t: &'static Type) -> ReflectResult<Value> {
    let runes = decode_runes(v.string_header().as_bytes());
    Ok(make_slice_of(v.flag.ro(), &runes, t))
}

/// Decode UTF-8, yielding U+FFFD for every byte that does not start a valid
/// sequence
fn decode_runes(mut bytes: &[u8]) -> Vec<i32> {
    let mut out = Vec::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(s) => {
                out.extend(s.chars().map(|c| c as i32));
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                out.extend(
                    std::str::from_utf8(valid)
                        .unwrap_or_default()
                        .chars()
                        .map(|c| c as i32),
                );
                out.push(char::REPLACEMENT_CHARACTER as i32);
                bytes = &rest[1..];
            }
        }
    }
}

fn cvt_direct(v: Value, t: &'static Type) -> ReflectResult<Value> {
    if v.flag.has(Flag::ADDR) {
        // Addressable storage may change later; take a copy
        // SAFETY: ADDR values point at a live value with t's representation
        return Ok(unsafe { Value::load_copy(t, v.word as *const u8, v.flag.ro()) });
    }
    let fl = v.flag.ro() | (v.flag & Flag::INDIR) | Flag::kind(t.kind());
    Ok(Value::from_parts(t, v.word, fl))
}

fn cvt_t2i(v: Value, t: &'static Type) -> ReflectResult<Value> {
    box_into(v, t)
}

fn cvt_i2i(v: Value, t: &'static Type) -> ReflectResult<Value> {
    if v.is_nil()? {
        let mut z = zero(t);
        z.flag = z.flag | v.flag.ro();
        return Ok(z);
    }
    box_into(v, t)
}

/// Box `v` into fresh storage of interface type `t`
fn box_into(v: Value, t: &'static Type) -> ReflectResult<Value> {
    let vt = v.rtype("reflect.box")?;
    let builder = CarrierBuilder::new(t);
    let builder = if v.kind() == Kind::Interface {
        // SAFETY: interface values are INDIR and point at two words
        match unsafe { iface::load(vt, v.data_ptr()) } {
            None => builder,
            Some((dyn_typ, word)) => builder.with_value(dyn_typ, word),
        }
    } else {
        builder.with_value(vt, v.iword())
    };
    let target = heap::alloc(t);
    // SAFETY: target is fresh storage of an interface type
    unsafe { builder.write(target)? };
    Ok(Value::from_parts(
        t,
        target as usize,
        v.flag.ro() | Flag::INDIR | Flag::kind(Kind::Interface),
    ))
}

impl Value {
    /// Convert to type `t` following the language's conversion rules
    pub fn convert(&self, t: &'static Type) -> ReflectResult<Value> {
        let v = if self.flag.has(Flag::METHOD) {
            make_method_value("Value::convert", *self)?
        } else {
            *self
        };
        let vt = v.rtype("Value::convert")?;
        match convert_op(t, vt) {
            Some(op) => op(v, t),
            None => Err(ReflectError::NotConvertible {
                from: vt.to_string(),
                to: t.to_string(),
            }),
        }
    }

    /// Whether [`Value::convert`] to `t` would succeed
    pub fn can_convert(&self, t: &'static Type) -> bool {
        match self.typ() {
            Ok(vt) => convert_op(t, vt).is_some(),
            Err(_) => false,
        }
    }

    /// This value as type `dst`, for storing into a `dst` location
    ///
    /// Succeeds for directly assignable types (same representation, re-tagged)
    /// and for interfaces the value implements (boxed).
    pub(crate) fn assign_to(
        self,
        context: &'static str,
        dst: &'static Type,
    ) -> ReflectResult<Value> {
        let v = if self.flag.has(Flag::METHOD) {
            make_method_value(context, self)?
        } else {
            self
        };
        let vt = v.rtype(context)?;

        if directly_assignable(dst, vt) {
            let fl = (v.flag & (Flag::ADDR | Flag::INDIR)) | v.flag.ro() | Flag::kind(dst.kind());
            return Ok(Value::from_parts(dst, v.word, fl));
        }
        if implements(dst, vt) {
            if v.kind() == Kind::Interface && v.is_nil()? {
                return Ok(zero(dst));
            }
            return box_into(v, dst);
        }
        Err(ReflectError::NotAssignableTo {
            context,
            from: vt.to_string(),
            to: dst.to_string(),
        })
    }
}
