//! Type descriptor constructors
//!
//! Unnamed composite types are interned: building the same structure twice
//! returns the same descriptor. Named types are always fresh.

use super::{
    ChanDir, InterfaceMethod, Kind, Method, MethodTable, StructField, Type, TypeDetail, PTR_SIZE,
};
use crate::abi::Code;
use crate::error::TypeError;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeKey {
    Slice(usize),
    Array(usize, usize),
    Map(usize, usize),
    Chan(ChanDir, usize),
    Func(Vec<usize>, Vec<usize>, bool),
    Struct(Vec<(String, usize, bool)>),
    Interface(Vec<(String, usize)>),
}

static INTERNED: Lazy<Mutex<FxHashMap<TypeKey, &'static Type>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

fn id(t: &'static Type) -> usize {
    t as *const Type as usize
}

fn leak_str(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

fn composite(
    kind: Kind,
    size: usize,
    align: usize,
    repr: String,
    comparable: bool,
    detail: TypeDetail,
) -> Type {
    Type {
        kind,
        size,
        align,
        pkg_path: None,
        name: None,
        repr: leak_str(repr),
        comparable,
        detail,
        methods: OnceCell::new(),
        ptr_to: OnceCell::new(),
    }
}

fn intern(key: TypeKey, make: impl FnOnce() -> Type) -> &'static Type {
    if let Some(t) = INTERNED.lock().get(&key).copied() {
        return t;
    }
    // Built outside the lock; a racing builder may win, in which case ours is dropped.
    let built = make();
    let mut cache = INTERNED.lock();
    if let Some(t) = cache.get(&key).copied() {
        return t;
    }
    let t: &'static Type = Box::leak(Box::new(built));
    cache.insert(key, t);
    t
}

/// `*elem`
pub fn ptr_to(elem: &'static Type) -> &'static Type {
    *elem.ptr_to.get_or_init(|| {
        let t: &'static Type = Box::leak(Box::new(composite(
            Kind::Ptr,
            PTR_SIZE,
            PTR_SIZE,
            format!("*{}", elem),
            true,
            TypeDetail::Ptr { elem },
        )));
        t
    })
}

/// `[]elem`
pub fn slice_of(elem: &'static Type) -> &'static Type {
    intern(TypeKey::Slice(id(elem)), || {
        composite(
            Kind::Slice,
            3 * PTR_SIZE,
            PTR_SIZE,
            format!("[]{}", elem),
            false,
            TypeDetail::Slice { elem },
        )
    })
}

/// `[len]elem`
pub fn array_of(len: usize, elem: &'static Type) -> &'static Type {
    intern(TypeKey::Array(len, id(elem)), || {
        composite(
            Kind::Array,
            elem.size * len,
            elem.align,
            format!("[{}]{}", len, elem),
            elem.comparable,
            TypeDetail::Array { elem, len },
        )
    })
}

/// `map[key]elem`; the key type must be comparable
pub fn map_of(key: &'static Type, elem: &'static Type) -> Result<&'static Type, TypeError> {
    if !key.comparable {
        return Err(TypeError::NotComparable {
            key: key.to_string(),
        });
    }
    Ok(intern(TypeKey::Map(id(key), id(elem)), || {
        composite(
            Kind::Map,
            PTR_SIZE,
            PTR_SIZE,
            format!("map[{}]{}", key, elem),
            false,
            TypeDetail::Map { key, elem },
        )
    }))
}

/// Channel of `elem` with direction `dir`
pub fn chan_of(dir: ChanDir, elem: &'static Type) -> &'static Type {
    intern(TypeKey::Chan(dir, id(elem)), || {
        // `chan (<-chan T)` needs parentheses to stay unambiguous
        let repr = match (dir, elem.detail) {
            (ChanDir::Both, TypeDetail::Chan { dir: ChanDir::Recv, .. }) => {
                format!("chan ({})", elem)
            }
            _ => format!("{} {}", dir, elem),
        };
        composite(
            Kind::Chan,
            PTR_SIZE,
            PTR_SIZE,
            repr,
            true,
            TypeDetail::Chan { elem, dir },
        )
    })
}

fn signature_repr(params: &[&'static Type], results: &[&'static Type], variadic: bool) -> String {
    let mut s = String::from("(");
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        if variadic && i == params.len() - 1 {
            s.push_str("...");
            s.push_str(&p.elem().to_string());
        } else {
            s.push_str(&p.to_string());
        }
    }
    s.push(')');
    match results {
        [] => {}
        [single] => {
            s.push(' ');
            s.push_str(&single.to_string());
        }
        many => {
            let parts: Vec<String> = many.iter().map(|r| r.to_string()).collect();
            s.push_str(&format!(" ({})", parts.join(", ")));
        }
    }
    s
}

/// `func(params) results`
///
/// A variadic signature needs a trailing slice parameter.
pub fn func_of(
    params: &[&'static Type],
    results: &[&'static Type],
    variadic: bool,
) -> Result<&'static Type, TypeError> {
    if variadic {
        match params.last() {
            None => {
                return Err(TypeError::InvalidVariadic {
                    reason: "no parameters".to_string(),
                })
            }
            Some(last) if last.kind != Kind::Slice => {
                return Err(TypeError::InvalidVariadic {
                    reason: format!("last parameter is {}, not a slice", last),
                })
            }
            _ => {}
        }
    }
    let key = TypeKey::Func(
        params.iter().copied().map(id).collect(),
        results.iter().copied().map(id).collect(),
        variadic,
    );
    Ok(intern(key, || {
        let repr = format!("func{}", signature_repr(params, results, variadic));
        composite(
            Kind::Func,
            PTR_SIZE,
            PTR_SIZE,
            repr,
            false,
            TypeDetail::Func {
                params: Box::leak(params.to_vec().into_boxed_slice()),
                results: Box::leak(results.to_vec().into_boxed_slice()),
                variadic,
            },
        )
    }))
}

/// One field of a struct under construction
#[derive(Debug, Clone)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Field type
    pub typ: &'static Type,
    /// Whether the field is embedded
    pub embedded: bool,
}

impl FieldDecl {
    /// A named field
    pub fn new(name: impl Into<String>, typ: &'static Type) -> Self {
        Self {
            name: name.into(),
            typ,
            embedded: false,
        }
    }

    /// An embedded field, named after its type (or its pointee's type)
    pub fn embedded(typ: &'static Type) -> Self {
        let base = match typ.detail {
            TypeDetail::Ptr { elem } => elem,
            _ => typ,
        };
        Self {
            name: base.name.unwrap_or_default().to_string(),
            typ,
            embedded: true,
        }
    }
}

/// `struct { fields }` with C-style layout
pub fn struct_of(fields: &[FieldDecl]) -> Result<&'static Type, TypeError> {
    let mut seen = HashSet::new();
    for f in fields {
        if f.name.is_empty() {
            return Err(TypeError::InvalidEmbedded {
                typ: f.typ.to_string(),
            });
        }
        if !seen.insert(f.name.as_str()) {
            return Err(TypeError::DuplicateField {
                name: f.name.clone(),
            });
        }
    }

    let key = TypeKey::Struct(
        fields
            .iter()
            .map(|f| (f.name.clone(), id(f.typ), f.embedded))
            .collect(),
    );
    Ok(intern(key, || {
        let mut offset = 0;
        let mut align = 1;
        let mut comparable = true;
        let mut table = Vec::with_capacity(fields.len());
        for (index, f) in fields.iter().enumerate() {
            offset = align_up(offset, f.typ.align);
            align = align.max(f.typ.align);
            comparable &= f.typ.comparable;
            table.push(StructField {
                name: leak_str(f.name.clone()),
                typ: f.typ,
                offset,
                index,
                embedded: f.embedded,
            });
            offset += f.typ.size;
        }

        let repr = if table.is_empty() {
            "struct {}".to_string()
        } else {
            let parts: Vec<String> = table
                .iter()
                .map(|f| {
                    if f.embedded {
                        f.typ.to_string()
                    } else {
                        format!("{} {}", f.name, f.typ)
                    }
                })
                .collect();
            format!("struct {{ {} }}", parts.join("; "))
        };

        composite(
            Kind::Struct,
            align_up(offset, align),
            align,
            repr,
            comparable,
            TypeDetail::Struct {
                fields: Box::leak(table.into_boxed_slice()),
            },
        )
    }))
}

/// `interface { methods }`; methods are sorted by name
pub fn interface_of(methods: &[(&str, &'static Type)]) -> Result<&'static Type, TypeError> {
    let mut sorted: Vec<(&str, &'static Type)> = methods.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for pair in sorted.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(TypeError::DuplicateMethod {
                name: pair[0].0.to_string(),
            });
        }
    }
    for (_, typ) in &sorted {
        if typ.kind != Kind::Func {
            return Err(TypeError::Mismatch {
                expected: "func".to_string(),
                actual: typ.to_string(),
            });
        }
    }
    if sorted.is_empty() {
        return Ok(&super::ANY);
    }

    let key = TypeKey::Interface(sorted.iter().map(|(n, t)| (n.to_string(), id(*t))).collect());
    Ok(intern(key, || {
        let table: Vec<InterfaceMethod> = sorted
            .iter()
            .map(|(name, typ)| InterfaceMethod {
                name: leak_str(name.to_string()),
                typ: *typ,
            })
            .collect();
        let parts: Vec<String> = table
            .iter()
            .map(|m| format!("{}{}", m.name, &m.typ.repr["func".len()..]))
            .collect();
        composite(
            Kind::Interface,
            2 * PTR_SIZE,
            PTR_SIZE,
            format!("interface {{ {} }}", parts.join("; ")),
            true,
            TypeDetail::Interface {
                methods: Box::leak(table.into_boxed_slice()),
            },
        )
    }))
}

/// Declare the named type `pkg.name` with the given underlying type
///
/// Every call produces a distinct type, even for identical arguments.
pub fn named(pkg: &str, name: &str, underlying: &'static Type) -> &'static Type {
    let repr = if pkg.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", pkg, name)
    };
    Box::leak(Box::new(Type {
        kind: underlying.kind,
        size: underlying.size,
        align: underlying.align,
        pkg_path: (!pkg.is_empty()).then(|| leak_str(pkg.to_string())),
        name: Some(leak_str(name.to_string())),
        repr: leak_str(repr),
        comparable: underlying.comparable,
        detail: underlying.detail,
        methods: OnceCell::new(),
        ptr_to: OnceCell::new(),
    }))
}

/// One method declaration for [`declare_methods`]
#[derive(Clone)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Signature without receiver
    pub typ: &'static Type,
    /// Declared on `*T` rather than `T`
    pub pointer_receiver: bool,
    /// Method body
    pub code: Code,
}

impl MethodDecl {
    /// A method with a value receiver
    pub fn value(name: impl Into<String>, typ: &'static Type, code: Code) -> Self {
        Self {
            name: name.into(),
            typ,
            pointer_receiver: false,
            code,
        }
    }

    /// A method with a pointer receiver
    pub fn pointer(name: impl Into<String>, typ: &'static Type, code: Code) -> Self {
        Self {
            name: name.into(),
            typ,
            pointer_receiver: true,
            code,
        }
    }
}

/// Attach the method table of a named type; allowed once per type
pub fn declare_methods(typ: &'static Type, decls: Vec<MethodDecl>) -> Result<(), TypeError> {
    if typ.name.is_none() || matches!(typ.kind, Kind::Ptr | Kind::Interface) {
        return Err(TypeError::InvalidReceiver {
            typ: typ.to_string(),
        });
    }

    let mut all: Vec<Method> = Vec::with_capacity(decls.len());
    for decl in decls {
        if decl.typ.kind != Kind::Func {
            return Err(TypeError::Mismatch {
                expected: "func".to_string(),
                actual: decl.typ.to_string(),
            });
        }
        if all.iter().any(|m| m.name == decl.name) {
            return Err(TypeError::DuplicateMethod { name: decl.name });
        }
        all.push(Method {
            name: leak_str(decl.name),
            typ: decl.typ,
            code: decl.code,
            pointer_receiver: decl.pointer_receiver,
        });
    }
    all.sort_by(|a, b| a.name.cmp(b.name));
    let values: Vec<Method> = all.iter().filter(|m| !m.pointer_receiver).cloned().collect();

    let count = all.len();
    typ.methods
        .set(MethodTable { all, values })
        .map_err(|_| TypeError::MethodsAlreadyDeclared {
            typ: typ.to_string(),
        })?;
    tracing::debug!(typ = %typ, methods = count, "declared method table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::Frame;
    use crate::types::{ANY, BOOL, INT, INT32, INT8, STRING};

    #[test]
    fn test_unnamed_types_are_interned() {
        assert!(std::ptr::eq(slice_of(&INT), slice_of(&INT)));
        assert!(std::ptr::eq(ptr_to(&INT), ptr_to(&INT)));
        assert!(std::ptr::eq(
            map_of(&STRING, &INT).unwrap(),
            map_of(&STRING, &INT).unwrap()
        ));
        assert!(!std::ptr::eq(slice_of(&INT), slice_of(&INT32)));
    }

    #[test]
    fn test_named_types_are_fresh() {
        let a = named("main", "Celsius", &INT);
        let b = named("main", "Celsius", &INT);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "main.Celsius");
        assert_eq!(a.kind(), Kind::Int);
    }

    #[test]
    fn test_struct_layout() {
        let t = struct_of(&[
            FieldDecl::new("A", &INT8),
            FieldDecl::new("B", &INT32),
            FieldDecl::new("C", &INT8),
        ])
        .unwrap();
        let offsets: Vec<usize> = t.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(t.size(), 12);
        assert_eq!(t.align(), 4);
        assert_eq!(t.to_string(), "struct { A int8; B int32; C int8 }");
    }

    #[test]
    fn test_struct_duplicate_field() {
        let err = struct_of(&[FieldDecl::new("A", &INT), FieldDecl::new("A", &BOOL)]).unwrap_err();
        assert_eq!(err, TypeError::DuplicateField { name: "A".into() });
    }

    #[test]
    fn test_map_key_must_be_comparable() {
        assert!(matches!(
            map_of(slice_of(&INT), &INT),
            Err(TypeError::NotComparable { .. })
        ));
    }

    #[test]
    fn test_func_repr() {
        let f = func_of(&[&INT, slice_of(&STRING)], &[&BOOL], true).unwrap();
        assert_eq!(f.to_string(), "func(int, ...string) bool");
        let g = func_of(&[], &[&INT, &BOOL], false).unwrap();
        assert_eq!(g.to_string(), "func() (int, bool)");
        assert!(func_of(&[&INT], &[], true).is_err());
    }

    #[test]
    fn test_chan_repr() {
        assert_eq!(chan_of(ChanDir::Recv, &INT).to_string(), "<-chan int");
        assert_eq!(chan_of(ChanDir::Send, &INT).to_string(), "chan<- int");
        let inner = chan_of(ChanDir::Recv, &INT);
        assert_eq!(chan_of(ChanDir::Both, inner).to_string(), "chan (<-chan int)");
    }

    #[test]
    fn test_empty_interface_is_any() {
        assert!(std::ptr::eq(interface_of(&[]).unwrap(), &ANY));
    }

    #[test]
    fn test_interface_methods_sorted() {
        let sig = func_of(&[], &[&INT], false).unwrap();
        let t = interface_of(&[("Len", sig), ("Cap", sig)]).unwrap();
        let names: Vec<&str> = t.interface_methods().iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Cap", "Len"]);
        assert_eq!(t.to_string(), "interface { Cap() int; Len() int }");
    }

    #[test]
    fn test_declare_methods_once() {
        let t = named("main", "Counter", &INT);
        let sig = func_of(&[], &[&INT], false).unwrap();
        let code: Code = std::sync::Arc::new(|_frame: &mut Frame| {});
        declare_methods(
            t,
            vec![
                MethodDecl::value("Get", sig, code.clone()),
                MethodDecl::pointer("Inc", func_of(&[], &[], false).unwrap(), code.clone()),
            ],
        )
        .unwrap();
        assert_eq!(t.num_method(), 1);
        assert_eq!(ptr_to(t).num_method(), 2);
        assert!(matches!(
            declare_methods(t, vec![]),
            Err(TypeError::MethodsAlreadyDeclared { .. })
        ));
        assert!(matches!(
            declare_methods(slice_of(&INT), vec![]),
            Err(TypeError::InvalidReceiver { .. })
        ));
    }
}
