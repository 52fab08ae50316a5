//! Type relations
//!
//! Implements the assignability relation `V -> T` (a value of type V may be
//! stored where T is expected) on top of structural identity of underlying
//! types and interface satisfaction.

use super::{Kind, Type, TypeDetail};

/// Check whether `a` and `b` have identical underlying types
pub fn identical_underlying(a: &Type, b: &Type) -> bool {
    // Reflexivity
    if a == b {
        return true;
    }
    if a.kind != b.kind {
        return false;
    }
    // Scalars of the same kind share one representation
    if a.kind.is_basic() {
        return true;
    }

    match (&a.detail, &b.detail) {
        (TypeDetail::Array { elem: e1, len: l1 }, TypeDetail::Array { elem: e2, len: l2 }) => {
            l1 == l2 && e1 == e2
        }

        (TypeDetail::Chan { elem: e1, dir: d1 }, TypeDetail::Chan { elem: e2, dir: d2 }) => {
            d1 == d2 && e1 == e2
        }

        (
            TypeDetail::Func {
                params: p1,
                results: r1,
                variadic: v1,
            },
            TypeDetail::Func {
                params: p2,
                results: r2,
                variadic: v2,
            },
        ) => v1 == v2 && same_list(p1, p2) && same_list(r1, r2),

        (TypeDetail::Interface { methods: m1 }, TypeDetail::Interface { methods: m2 }) => {
            m1.len() == m2.len()
                && m1
                    .iter()
                    .zip(m2.iter())
                    .all(|(x, y)| x.name == y.name && x.typ == y.typ)
        }

        (TypeDetail::Map { key: k1, elem: e1 }, TypeDetail::Map { key: k2, elem: e2 }) => {
            k1 == k2 && e1 == e2
        }

        (TypeDetail::Ptr { elem: e1 }, TypeDetail::Ptr { elem: e2 })
        | (TypeDetail::Slice { elem: e1 }, TypeDetail::Slice { elem: e2 }) => e1 == e2,

        (TypeDetail::Struct { fields: f1 }, TypeDetail::Struct { fields: f2 }) => {
            f1.len() == f2.len()
                && f1.iter().zip(f2.iter()).all(|(x, y)| {
                    x.name == y.name
                        && x.typ == y.typ
                        && x.offset == y.offset
                        && x.embedded == y.embedded
                })
        }

        _ => false,
    }
}

fn same_list(a: &[&'static Type], b: &[&'static Type]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Check whether a value of type `src` may be stored directly into `dst`
///
/// True for identical types, for an unnamed type and a type with an
/// identical underlying type, and for a bidirectional channel assigned to a
/// directional channel of the same element.
pub fn directly_assignable(dst: &Type, src: &Type) -> bool {
    if dst == src {
        return true;
    }
    // At least one side must be unnamed
    if (dst.is_named() && src.is_named()) || dst.kind != src.kind {
        return false;
    }
    if let (TypeDetail::Chan { elem: de, .. }, TypeDetail::Chan { elem: se, dir }) =
        (&dst.detail, &src.detail)
    {
        if *dir == super::ChanDir::Both && de == se {
            return true;
        }
    }
    identical_underlying(dst, src)
}

/// Check whether type `v` satisfies interface type `iface`
pub fn implements(iface: &Type, v: &Type) -> bool {
    if iface.kind != Kind::Interface {
        return false;
    }
    let wanted = iface.interface_methods();
    if wanted.is_empty() {
        return true;
    }

    // Both method lists are sorted by name, so one forward scan suffices
    if v.kind == Kind::Interface {
        let have = v.interface_methods();
        let mut j = 0;
        for m in wanted {
            while j < have.len() && have[j].name < m.name {
                j += 1;
            }
            if j == have.len() || have[j].name != m.name || have[j].typ != m.typ {
                return false;
            }
        }
        return true;
    }

    let have = v.method_set();
    let mut j = 0;
    for m in wanted {
        while j < have.len() && have[j].name < m.name {
            j += 1;
        }
        if j == have.len() || have[j].name != m.name || have[j].typ != m.typ {
            return false;
        }
    }
    true
}

/// Check whether a value of type `v` may be assigned to type `t`
pub fn assignable_to(v: &Type, t: &Type) -> bool {
    directly_assignable(t, v) || implements(t, v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{Code, Frame};
    use crate::types::{
        chan_of, declare_methods, func_of, interface_of, named, ptr_to, slice_of, struct_of,
        ChanDir, FieldDecl, MethodDecl, ANY, INT, INT64, STRING,
    };
    use std::sync::Arc;

    fn noop() -> Code {
        Arc::new(|_frame: &mut Frame| {})
    }

    #[test]
    fn test_named_vs_unnamed() {
        let ints = slice_of(&INT);
        let named_ints = named("main", "Ints", ints);
        assert!(directly_assignable(named_ints, ints));
        assert!(directly_assignable(ints, named_ints));

        let other = named("main", "Other", ints);
        assert!(!directly_assignable(named_ints, other));
        assert!(!directly_assignable(&INT, &INT64));
    }

    #[test]
    fn test_chan_direction_assignability() {
        let both = chan_of(ChanDir::Both, &INT);
        let recv = chan_of(ChanDir::Recv, &INT);
        assert!(directly_assignable(recv, both));
        assert!(!directly_assignable(both, recv));
    }

    #[test]
    fn test_struct_identity() {
        let a = struct_of(&[FieldDecl::new("X", &INT)]).unwrap();
        let b = named("main", "P", a);
        assert!(identical_underlying(a, b));
    }

    #[test]
    fn test_implements() {
        let sig = func_of(&[], &[&STRING], false).unwrap();
        let stringer = interface_of(&[("String", sig)]).unwrap();

        let t = named("main", "Name", &STRING);
        declare_methods(t, vec![MethodDecl::pointer("String", sig, noop())]).unwrap();

        assert!(!implements(stringer, t));
        assert!(implements(stringer, ptr_to(t)));
        assert!(implements(&ANY, t));
        assert!(assignable_to(ptr_to(t), stringer));
        assert!(implements(&ANY, stringer));
        assert!(implements(stringer, stringer));
    }
}
