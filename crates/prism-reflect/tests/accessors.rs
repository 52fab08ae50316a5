//! Accessor Tests
//!
//! Reading and writing through Values:
//! - Mutation through addressable paths lands in the original storage
//! - Non-addressable and unexported paths refuse every setter
//! - Getters read exactly the declared width
//! - Overflow predicates at every width boundary
//!
//! # Running Tests
//! ```bash
//! cargo test -p prism-reflect --test accessors
//! ```

use prism_reflect::runtime::types::{
    named, slice_of, struct_of, FieldDecl, BOOL, COMPLEX64, FLOAT32, FLOAT64, INT, INT16, INT32,
    INT64, INT8, STRING, UINT, UINT16, UINT32, UINT64, UINT8,
};
use prism_reflect::runtime::{Complex128, Kind, StringHeader, Type};
use prism_reflect::{make_slice, new, new_at, value_of, zero, ReflectError, Value};

#[repr(C)]
#[derive(Clone, Copy)]
struct Person {
    name: StringHeader,
    age: i32,
}

fn person_type() -> &'static Type {
    struct_of(&[
        FieldDecl::new("Name", &STRING),
        FieldDecl::new("Age", &INT32),
    ])
    .unwrap()
}

// ===== Mutation Through Pointers =====

#[test]
fn test_set_field_through_pointer_updates_record() {
    let mut ana = Person {
        name: StringHeader::new("ana"),
        age: 7,
    };
    let p = unsafe { new_at(person_type(), &mut ana as *mut Person as *mut u8) };

    let age = p.elem().unwrap().field_by_name("Age").unwrap();
    assert!(age.can_set());
    assert_eq!(age.int().unwrap(), 7);
    age.set_int(8).unwrap();

    assert_eq!(ana.age, 8);
    assert_eq!(ana.name.as_str(), Some("ana"));
}

#[test]
fn test_set_string_field() {
    let p = new(person_type());
    let rec = p.elem().unwrap();
    rec.field(0).unwrap().set_string("bo").unwrap();
    rec.field(1).unwrap().set_int(31).unwrap();

    let copy = p.elem().unwrap();
    assert_eq!(copy.field(0).unwrap().to_string(), "bo");
    assert_eq!(copy.field(1).unwrap().int().unwrap(), 31);
}

#[test]
fn test_set_whole_struct() {
    let src = new(person_type()).elem().unwrap();
    src.field(1).unwrap().set_int(40).unwrap();

    let dst = new(person_type()).elem().unwrap();
    dst.set(src).unwrap();
    src.field(1).unwrap().set_int(41).unwrap();
    assert_eq!(dst.field(1).unwrap().int().unwrap(), 40);
}

#[test]
fn test_set_requires_assignable_type() {
    let dst = new(&INT64).elem().unwrap();
    let err = dst.set(Value::of(1i32)).unwrap_err();
    assert_eq!(
        err,
        ReflectError::NotAssignableTo {
            context: "reflect.Set",
            from: "int32".into(),
            to: "int64".into()
        }
    );

    let my_int = named("main", "MyInt", &INT64);
    assert!(new(my_int).elem().unwrap().set(Value::of(1i64)).is_err());
}

#[test]
fn test_slice_elements_are_addressable() {
    let s = make_slice(slice_of(&INT16), 3, 3).unwrap();
    assert!(!s.can_set());
    let e = s.index(1).unwrap();
    assert!(e.can_set());
    e.set_int(-2).unwrap();
    assert_eq!(s.index(1).unwrap().int().unwrap(), -2);
}

// ===== Refused Mutation =====

#[test]
fn test_non_addressable_values_refuse_setters() {
    let v = Value::of(7i32);
    assert!(!v.can_addr());
    assert_eq!(
        v.set_int(8).unwrap_err(),
        ReflectError::NotAssignable {
            method: "Value::set_int"
        }
    );
    assert_eq!(v.int().unwrap(), 7);
    assert!(v.addr().is_err());

    let z = zero(person_type());
    assert!(!z.field(1).unwrap().can_set());
    assert!(z.field(1).unwrap().set_int(1).is_err());
}

#[test]
fn test_unboxed_value_is_not_addressable() {
    let v = value_of(Value::of(3.5f64).interface().unwrap());
    assert!(!v.can_set());
    assert_eq!(v.float().unwrap(), 3.5);
}

#[test]
fn test_unexported_fields_are_readable_only() {
    let t = struct_of(&[
        FieldDecl::new("Public", &INT),
        FieldDecl::new("hidden", &INT),
    ])
    .unwrap();
    let rec = new(t).elem().unwrap();

    let hidden = rec.field(1).unwrap();
    assert!(hidden.can_addr());
    assert!(!hidden.can_set());
    assert!(!hidden.can_interface());
    assert_eq!(hidden.int().unwrap(), 0);
    assert_eq!(
        hidden.set_int(1).unwrap_err(),
        ReflectError::UnexportedAccess {
            method: "Value::set_int"
        }
    );
    assert!(hidden.interface().is_err());

    // An unexported value cannot leak into an exported slot either
    assert!(rec.field(0).unwrap().set(hidden).is_err());
}

#[test]
fn test_setter_on_wrong_kind() {
    let v = new(&STRING).elem().unwrap();
    assert_eq!(
        v.set_int(1).unwrap_err(),
        ReflectError::InvalidKind {
            method: "Value::set_int",
            kind: Kind::String
        }
    );
}

// ===== Getters =====

#[test]
fn test_getters_by_family() {
    assert_eq!(Value::of(-1i8).int().unwrap(), -1);
    assert_eq!(Value::of(i64::MIN).int().unwrap(), i64::MIN);
    assert_eq!(Value::of(u16::MAX).uint().unwrap(), 65535);
    assert_eq!(Value::of(1.5f32).float().unwrap(), 1.5);
    assert!(Value::of(true).bool().unwrap());
    assert!(Value::of(1u8).int().is_err());
    assert!(Value::of(1i8).uint().is_err());
}

#[test]
fn test_setters_write_declared_width_only() {
    let t = struct_of(&[
        FieldDecl::new("A", &UINT8),
        FieldDecl::new("B", &UINT8),
    ])
    .unwrap();
    let rec = new(t).elem().unwrap();
    rec.field(1).unwrap().set_uint(0x1ff).unwrap();
    assert_eq!(rec.field(1).unwrap().uint().unwrap(), 0xff);
    assert_eq!(rec.field(0).unwrap().uint().unwrap(), 0);
}

#[test]
fn test_complex_round_trip_through_storage() {
    let c = new(&COMPLEX64).elem().unwrap();
    c.set_complex(Complex128::new(1.5, -0.25)).unwrap();
    assert_eq!(c.complex().unwrap(), Complex128::new(1.5, -0.25));
}

#[test]
fn test_bytes_and_set_bytes() {
    let b = new(slice_of(&UINT8)).elem().unwrap();
    b.set_bytes(b"prism").unwrap();
    assert_eq!(b.bytes().unwrap(), b"prism".to_vec());
    assert_eq!(b.len().unwrap(), 5);
    assert!(new(slice_of(&INT)).elem().unwrap().set_bytes(b"x").is_err());
}

#[test]
fn test_set_len_and_cap() {
    let cell = new(slice_of(&INT)).elem().unwrap();
    cell.set(make_slice(slice_of(&INT), 2, 5).unwrap()).unwrap();

    cell.set_len(5).unwrap();
    assert_eq!(cell.len().unwrap(), 5);
    assert!(matches!(
        cell.set_len(6),
        Err(ReflectError::IndexOutOfRange { index: 6, bound: 5, .. })
    ));

    cell.set_len(3).unwrap();
    assert!(cell.set_cap(2).is_err());
    cell.set_cap(4).unwrap();
    assert_eq!(cell.cap().unwrap(), 4);
    assert!(cell.set_cap(5).is_err());
}

// ===== Overflow =====

#[test]
fn test_overflow_int_boundaries() {
    let cases: [(&'static Type, i64, i64); 5] = [
        (&INT8, i8::MIN as i64, i8::MAX as i64),
        (&INT16, i16::MIN as i64, i16::MAX as i64),
        (&INT32, i32::MIN as i64, i32::MAX as i64),
        (&INT64, i64::MIN, i64::MAX),
        (&INT, isize::MIN as i64, isize::MAX as i64),
    ];
    for (t, min, max) in cases {
        let v = zero(t);
        assert!(!v.overflow_int(min).unwrap(), "{} min", t);
        assert!(!v.overflow_int(max).unwrap(), "{} max", t);
        if max < i64::MAX {
            assert!(v.overflow_int(max + 1).unwrap(), "{} max+1", t);
            assert!(v.overflow_int(min - 1).unwrap(), "{} min-1", t);
        }
    }
}

#[test]
fn test_overflow_uint_boundaries() {
    let cases: [(&'static Type, u64); 5] = [
        (&UINT8, u8::MAX as u64),
        (&UINT16, u16::MAX as u64),
        (&UINT32, u32::MAX as u64),
        (&UINT64, u64::MAX),
        (&UINT, usize::MAX as u64),
    ];
    for (t, max) in cases {
        let v = zero(t);
        assert!(!v.overflow_uint(0).unwrap());
        assert!(!v.overflow_uint(max).unwrap(), "{} max", t);
        if max < u64::MAX {
            assert!(v.overflow_uint(max + 1).unwrap(), "{} max+1", t);
        }
    }
}

#[test]
fn test_overflow_float() {
    let f32v = zero(&FLOAT32);
    assert!(!f32v.overflow_float(f32::MAX as f64).unwrap());
    assert!(!f32v.overflow_float(-(f32::MAX as f64)).unwrap());
    assert!(f32v.overflow_float(f64::MAX).unwrap());
    assert!(f32v.overflow_float(-1e39).unwrap());
    // Infinity is representable in both widths
    assert!(!f32v.overflow_float(f64::INFINITY).unwrap());
    assert!(!zero(&FLOAT64).overflow_float(f64::MAX).unwrap());
}

#[test]
fn test_overflow_complex_checks_both_parts() {
    let c = zero(&COMPLEX64);
    assert!(!c.overflow_complex(Complex128::new(1.0, 1.0)).unwrap());
    assert!(c.overflow_complex(Complex128::new(1.0, 1e39)).unwrap());
    assert!(c.overflow_complex(Complex128::new(-1e39, 0.0)).unwrap());
}

#[test]
fn test_overflow_on_wrong_kind() {
    assert!(zero(&BOOL).overflow_int(0).is_err());
    assert!(zero(&INT8).overflow_uint(0).is_err());
}
