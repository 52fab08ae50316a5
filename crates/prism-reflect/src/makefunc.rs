//! Functions backed by Rust code
//!
//! [`make_func`] wraps a handler over Values, [`make_native`] wraps a body
//! that works on the frame directly, and bound methods become plain
//! functions through [`make_method_value`]. All three produce ordinary
//! function words that any caller can invoke through a [`Frame`].

use crate::call::method_receiver;
use crate::error::{ReflectError, ReflectResult};
use crate::value::{Flag, Value};
use prism_runtime::{Code, Frame, FuncKind, FuncObject, Kind, Type};
use std::sync::Arc;

fn func_value(ftyp: &'static Type, code: Code, kind: FuncKind, fl: Flag) -> Value {
    let word = FuncObject::alloc(code, kind);
    Value::from_parts(ftyp, word, fl | Flag::kind(Kind::Func))
}

fn must_be_func_type(method: &'static str, ftyp: &Type) -> ReflectResult<()> {
    if ftyp.kind() != Kind::Func {
        return Err(ReflectError::InvalidKind {
            method,
            kind: ftyp.kind(),
        });
    }
    Ok(())
}

/// New function of type `ftyp` whose body runs `handler`
///
/// The handler receives copies of the arguments. It must return exactly the
/// declared results, each of exactly the declared type; anything else is a
/// contract violation and panics inside the call.
pub fn make_func<F>(ftyp: &'static Type, handler: F) -> ReflectResult<Value>
where
    F: Fn(&[Value]) -> Vec<Value> + Send + Sync + 'static,
{
    must_be_func_type("make_func", ftyp)?;
    let code: Code = Arc::new(move |frame: &mut Frame| call_reflect(ftyp, &handler, frame));
    tracing::debug!(func = %ftyp, "make_func");
    Ok(func_value(ftyp, code, FuncKind::Reflect, Flag::EMPTY))
}

/// New function of type `ftyp` with a frame-level body
pub fn make_native(ftyp: &'static Type, code: Code) -> ReflectResult<Value> {
    must_be_func_type("make_native", ftyp)?;
    Ok(func_value(ftyp, code, FuncKind::Native, Flag::EMPTY))
}

fn call_reflect(ftyp: &'static Type, handler: &dyn Fn(&[Value]) -> Vec<Value>, frame: &mut Frame) {
    let args: Vec<Value> = ftyp
        .params()
        .iter()
        .enumerate()
        .map(|(i, &t)| {
            let slot = frame.param_slot(i);
            // SAFETY: the caller wrote a value of t at the slot; it is
            // copied because the frame dies with the call
            unsafe { Value::load_copy(t, frame.addr(slot.offset), Flag::EMPTY) }
        })
        .collect();

    let out = handler(&args);
    if out.len() != ftyp.num_out() {
        panic!(
            "reflect: wrong return count from function created by make_func: got {}, want {}",
            out.len(),
            ftyp.num_out()
        );
    }

    for (i, (v, &rt)) in out.iter().zip(ftyp.results()).enumerate() {
        if !v.is_valid() {
            panic!("reflect: function created by make_func returned zero Value");
        }
        if v.flag.has(Flag::RO) {
            panic!(
                "reflect: function created by make_func returned value obtained from unexported field"
            );
        }
        let v = if v.flag.has(Flag::METHOD) {
            match make_method_value("make_func", *v) {
                Ok(f) => f,
                Err(e) => panic!("{}", e),
            }
        } else {
            *v
        };
        match v.typ() {
            Ok(vt) if vt == rt => {}
            Ok(vt) => panic!(
                "reflect: function created by make_func using closure returned wrong type: have {} for {}",
                vt, rt
            ),
            Err(e) => panic!("{}", e),
        }
        let slot = frame.result_slot(i);
        // SAFETY: v has exactly the result type
        unsafe { frame.write_from(slot.offset, v.data_ptr(), slot.size) };
    }
}

/// Turn a bound method into a plain function value
///
/// The receiver is captured; the method itself is resolved again on every
/// call.
pub(crate) fn make_method_value(op: &'static str, v: Value) -> ReflectResult<Value> {
    if !v.flag.has(Flag::METHOD) {
        return Err(ReflectError::InvalidKind {
            method: op,
            kind: v.kind(),
        });
    }
    let ftyp = v.typ()?;
    let index = v.flag.method_index();
    // Surface a bad receiver now rather than at call time
    method_receiver(op, v, index)?;

    let bound = v;
    let code: Code = Arc::new(move |frame: &mut Frame| {
        let (mtyp, code, rcvr) = match method_receiver("method value call", bound, index) {
            Ok(resolved) => resolved,
            Err(e) => panic!("{}", e),
        };
        let mut inner = Frame::for_func(mtyp, true);
        inner.set_receiver_word(rcvr);
        inner.copy_params_from(frame);
        code(&mut inner);
        frame.copy_results_from(&inner);
    });
    Ok(func_value(ftyp, code, FuncKind::MethodValue, v.flag.ro()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_runtime::types::{func_of, INT, STRING};

    #[test]
    fn test_make_func_round_trip() {
        let ftyp = func_of(&[&INT, &INT], &[&INT], false).unwrap();
        let add = make_func(ftyp, |args| {
            let sum = args[0].int().unwrap() + args[1].int().unwrap();
            vec![Value::of(sum as isize)]
        })
        .unwrap();
        let out = add.call(&[Value::of(40isize), Value::of(2isize)]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].int().unwrap(), 42);
        assert_eq!(out[0].typ().unwrap(), &INT);
    }

    #[test]
    fn test_make_func_rejects_non_func_type() {
        assert!(matches!(
            make_func(&STRING, |_| Vec::new()),
            Err(ReflectError::InvalidKind {
                kind: Kind::String,
                ..
            })
        ));
    }

    #[test]
    #[should_panic(expected = "wrong return count")]
    fn test_make_func_wrong_result_count_panics() {
        let ftyp = func_of(&[], &[&INT], false).unwrap();
        let f = make_func(ftyp, |_| Vec::new()).unwrap();
        let _ = f.call(&[]);
    }

    #[test]
    #[should_panic(expected = "returned wrong type")]
    fn test_make_func_wrong_result_type_panics() {
        let ftyp = func_of(&[], &[&INT], false).unwrap();
        let f = make_func(ftyp, |_| vec![Value::of(1i64)]).unwrap();
        let _ = f.call(&[]);
    }
}
