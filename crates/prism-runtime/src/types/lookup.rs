//! Field resolution through embedded structs

use super::{Kind, StructField, Type};
use rustc_hash::FxHashSet;

/// A resolved field and the index path leading to it
#[derive(Debug, Clone)]
pub struct FieldMatch {
    /// The field found
    pub field: &'static StructField,
    /// Field indices from the outermost struct down to `field`
    pub index: Vec<usize>,
}

/// Breadth-first search for a field whose name satisfies `matches`
///
/// Shallower fields shadow deeper ones. Two matches at the same depth make
/// the name ambiguous, which resolves to `None`.
pub(crate) fn field_by_name_func(
    t: &'static Type,
    matches: &dyn Fn(&str) -> bool,
) -> Option<FieldMatch> {
    if t.kind != Kind::Struct {
        return None;
    }

    let mut current: Vec<(&'static Type, Vec<usize>)> = vec![(t, Vec::new())];
    let mut visited: FxHashSet<usize> = FxHashSet::default();

    while !current.is_empty() {
        let mut next = Vec::new();
        let mut found: Option<FieldMatch> = None;
        let mut count = 0;

        for (st, path) in current {
            if !visited.insert(st as *const Type as usize) {
                continue;
            }
            for field in st.fields() {
                if matches(field.name) {
                    count += 1;
                    let mut index = path.clone();
                    index.push(field.index);
                    found = Some(FieldMatch { field, index });
                    continue;
                }
                if field.embedded {
                    let inner = match field.typ.kind {
                        Kind::Ptr => field.typ.elem(),
                        _ => field.typ,
                    };
                    if inner.kind == Kind::Struct {
                        let mut index = path.clone();
                        index.push(field.index);
                        next.push((inner, index));
                    }
                }
            }
        }

        match count {
            0 => current = next,
            1 => return found,
            _ => return None,
        }
    }
    None
}
