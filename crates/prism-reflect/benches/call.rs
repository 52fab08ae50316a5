//! Dynamic call and access benchmarks
//!
//! Runtime storage is never reclaimed, so nothing here allocates it per
//! iteration.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use prism_reflect::runtime::types::{
    func_of, map_of, struct_of, FieldDecl, INT, INT32, STRING, UINT8,
};
use prism_reflect::runtime::Frame;
use prism_reflect::{make_func, make_map, make_native, new, Value};
use std::sync::Arc;

fn bench_calls(c: &mut Criterion) {
    let ftyp = func_of(&[&INT, &INT], &[&INT], false).unwrap();
    let native = make_native(
        ftyp,
        Arc::new(|frame: &mut Frame| {
            let a: isize = frame.param(0);
            let b: isize = frame.param(1);
            frame.set_result(0, a + b);
        }),
    )
    .unwrap();
    let handler = make_func(ftyp, |args| {
        let sum = args[0].int().unwrap() + args[1].int().unwrap();
        vec![Value::of(sum as isize)]
    })
    .unwrap();
    let args = [Value::of(2isize), Value::of(3isize)];

    let mut group = c.benchmark_group("call");
    group.bench_function("native", |b| b.iter(|| native.call(black_box(&args)).unwrap()));
    group.bench_function("make_func", |b| b.iter(|| handler.call(black_box(&args)).unwrap()));
    group.finish();
}

fn bench_field_access(c: &mut Criterion) {
    let person = struct_of(&[
        FieldDecl::new("Name", &STRING),
        FieldDecl::new("Age", &INT32),
    ])
    .unwrap();
    let rec = new(person).elem().unwrap();

    c.bench_function("field_by_name_set", |b| {
        b.iter(|| {
            rec.field_by_name(black_box("Age"))
                .unwrap()
                .set_int(black_box(8))
                .unwrap()
        })
    });
    c.bench_function("field_index_get", |b| {
        b.iter(|| rec.field(black_box(1)).unwrap().int().unwrap())
    });
}

fn bench_lookup_and_convert(c: &mut Criterion) {
    let m = make_map(map_of(&STRING, &INT).unwrap()).unwrap();
    let keys: Vec<Value> = ["a", "b", "c", "d"].iter().map(|k| Value::from(*k)).collect();
    for (i, k) in keys.iter().enumerate() {
        m.set_map_index(*k, Value::of(i as isize)).unwrap();
    }

    let mut group = c.benchmark_group("lookup");
    for (i, k) in keys.iter().enumerate() {
        group.bench_with_input(BenchmarkId::new("map_index", i), k, |b, k| {
            b.iter(|| m.map_index(black_box(*k)).unwrap())
        });
    }
    group.finish();

    let x = Value::of(300i64);
    c.bench_function("convert_int64_uint8", |b| {
        b.iter(|| black_box(x).convert(&UINT8).unwrap())
    });
}

criterion_group!(benches, bench_calls, bench_field_access, bench_lookup_and_convert);
criterion_main!(benches);
