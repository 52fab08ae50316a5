//! Dynamic invocation
//!
//! Every check (arity, export, assignability) runs before the frame is
//! built, so a failed call never reaches the callee. Panics raised by the
//! callee unwind through `call` unchanged.

use crate::construct::make_slice;
use crate::error::{ReflectError, ReflectResult};
use crate::value::{Flag, Value};
use prism_runtime::iface::{self, Iface};
use prism_runtime::types::assignable_to;
use prism_runtime::{Code, Frame, FuncObject, Kind, Type};

/// Signature, body and receiver word of the bound method `i` of `v`
///
/// The method is looked up in the itab for interface receivers and in the
/// concrete method set otherwise.
pub(crate) fn method_receiver(
    op: &'static str,
    v: Value,
    i: usize,
) -> ReflectResult<(&'static Type, Code, usize)> {
    let t = v.rtype(op)?;
    if t.kind() == Kind::Interface {
        let im = &t.interface_methods()[i];
        if !im.is_exported() {
            return Err(ReflectError::UnexportedAccess { method: op });
        }
        // SAFETY: interfaces with methods hold an Iface; INDIR points at it
        let carrier = unsafe { *(v.data_ptr() as *const Iface) };
        // SAFETY: a non-null tab was written by the carrier builder
        let Some(tab) = (unsafe { carrier.tab.as_ref() }) else {
            return Err(ReflectError::NilDereference { method: op });
        };
        return Ok((im.typ, tab.fun[i].clone(), carrier.word));
    }

    let m = &t.method_set()[i];
    if !m.is_exported() {
        return Err(ReflectError::UnexportedAccess { method: op });
    }
    Ok((m.typ, iface::resolve_method(t, m), v.iword()))
}

impl Value {
    /// Call the function (or bound method) with `args`
    ///
    /// Surplus trailing arguments of a variadic function are packed into a
    /// fresh slice.
    pub fn call(&self, args: &[Value]) -> ReflectResult<Vec<Value>> {
        self.must_be("Value::call", Kind::Func)?;
        self.must_be_exported("Value::call")?;
        self.call_impl("Value::call", args, false)
    }

    /// Call a variadic function whose variadic arguments are already in a slice
    pub fn call_slice(&self, args: &[Value]) -> ReflectResult<Vec<Value>> {
        self.must_be("Value::call_slice", Kind::Func)?;
        self.must_be_exported("Value::call_slice")?;
        self.call_impl("Value::call_slice", args, true)
    }

    fn call_impl(
        &self,
        op: &'static str,
        args: &[Value],
        is_slice: bool,
    ) -> ReflectResult<Vec<Value>> {
        let (ftyp, code, rcvr) = if self.flag.has(Flag::METHOD) {
            let (ftyp, code, word) = method_receiver(op, *self, self.flag.method_index())?;
            (ftyp, code, Some(word))
        } else {
            let ftyp = self.rtype(op)?;
            // SAFETY: non-zero func words come from FuncObject::alloc
            let f = unsafe { FuncObject::from_word(self.ptr_word()) }
                .ok_or(ReflectError::NilFunctionCall)?;
            (ftyp, f.code.clone(), None)
        };

        let n = ftyp.num_in();
        let variadic = ftyp.is_variadic();
        if is_slice {
            if !variadic {
                return Err(ReflectError::NotVariadic { method: op });
            }
            if args.len() != n {
                return Err(ReflectError::ArityMismatch {
                    method: op,
                    expected: n,
                    actual: args.len(),
                });
            }
        } else if variadic {
            if args.len() < n - 1 {
                return Err(ReflectError::ArityMismatch {
                    method: op,
                    expected: n - 1,
                    actual: args.len(),
                });
            }
        } else if args.len() != n {
            return Err(ReflectError::ArityMismatch {
                method: op,
                expected: n,
                actual: args.len(),
            });
        }

        for x in args {
            if !x.is_valid() {
                return Err(ReflectError::InvalidKind {
                    method: op,
                    kind: Kind::Invalid,
                });
            }
            if x.flag.has(Flag::RO) {
                return Err(ReflectError::UnexportedAccess { method: op });
            }
        }

        let fixed = if variadic && !is_slice { n - 1 } else { n };
        for (i, x) in args.iter().enumerate() {
            let target = if i < fixed {
                ftyp.params()[i]
            } else {
                ftyp.params()[n - 1].elem()
            };
            let xt = x.typ()?;
            if !assignable_to(xt, target) {
                return Err(ReflectError::ArgumentTypeMismatch {
                    method: op,
                    index: i,
                    expected: target.to_string(),
                    actual: xt.to_string(),
                });
            }
        }

        let packed;
        let args = if variadic && !is_slice {
            let extra = &args[fixed..];
            let slice = make_slice(ftyp.params()[n - 1], extra.len(), extra.len())?;
            for (k, x) in extra.iter().enumerate() {
                slice.index(k)?.set(*x)?;
            }
            packed = args[..fixed].iter().copied().chain(Some(slice)).collect::<Vec<_>>();
            &packed[..]
        } else {
            args
        };

        let mut frame = Frame::for_func(ftyp, rcvr.is_some());
        if let Some(word) = rcvr {
            frame.set_receiver_word(word);
        }
        for (i, (x, &target)) in args.iter().zip(ftyp.params()).enumerate() {
            let x = x.assign_to("reflect.Value.Call", target)?;
            let slot = frame.param_slot(i);
            // SAFETY: x now has the parameter's type and size
            unsafe { frame.write_from(slot.offset, x.data_ptr(), slot.size) };
        }

        tracing::trace!(func = %ftyp, args = args.len(), method = rcvr.is_some(), "dynamic call");
        code(&mut frame);

        let results = ftyp
            .results()
            .iter()
            .enumerate()
            .map(|(i, &rt)| {
                let slot = frame.result_slot(i);
                // SAFETY: the callee wrote a value of rt at the slot
                unsafe { Value::load_copy(rt, frame.addr(slot.offset), Flag::EMPTY) }
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::makefunc::make_native;
    use prism_runtime::types::{func_of, slice_of, INT};
    use std::sync::Arc;

    fn sum_func() -> Value {
        let ftyp = func_of(&[slice_of(&INT)], &[&INT], true).unwrap();
        make_native(
            ftyp,
            Arc::new(|frame: &mut Frame| {
                let s: prism_runtime::SliceHeader = frame.param(0);
                let xs = unsafe { std::slice::from_raw_parts(s.data as *const isize, s.len) };
                frame.set_result(0, xs.iter().sum::<isize>());
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_variadic_packing() {
        let f = sum_func();
        let out = f
            .call(&[Value::of(1isize), Value::of(2isize), Value::of(3isize)])
            .unwrap();
        assert_eq!(out[0].int().unwrap(), 6);
        let out = f.call(&[]).unwrap();
        assert_eq!(out[0].int().unwrap(), 0);
    }

    #[test]
    fn test_call_slice_requires_variadic_slice() {
        let f = sum_func();
        let s = make_slice(slice_of(&INT), 2, 2).unwrap();
        s.index(0).unwrap().set_int(4).unwrap();
        s.index(1).unwrap().set_int(5).unwrap();
        assert_eq!(f.call_slice(&[s]).unwrap()[0].int().unwrap(), 9);
        assert!(matches!(
            f.call_slice(&[]),
            Err(ReflectError::ArityMismatch { expected: 1, actual: 0, .. })
        ));
    }

    #[test]
    fn test_nil_function_call() {
        let ftyp = func_of(&[], &[], false).unwrap();
        let f = crate::construct::zero(ftyp);
        assert_eq!(f.call(&[]).unwrap_err(), ReflectError::NilFunctionCall);
    }

    #[test]
    fn test_variadic_element_mismatch_reports_position() {
        let f = sum_func();
        let err = f.call(&[Value::of(1isize), Value::of(2u8)]).unwrap_err();
        assert!(matches!(err, ReflectError::ArgumentTypeMismatch { index: 1, .. }));
    }
}
