use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lib0::any::Any;
use lib0::decoding::{Cursor, Read};
use lib0::encoding::Write;
use std::collections::HashMap;
use std::sync::Arc;

fn var_uint_roundtrip(c: &mut Criterion) {
    let values: Vec<u64> = (0..10_000).map(|i| i * 7919).collect();
    c.bench_function("write_var/read_var u64, 10k values", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            for v in &values {
                buf.write_var(*v);
            }
            let mut cursor = Cursor::new(&buf);
            for _ in &values {
                black_box(cursor.read_var::<u64>().unwrap());
            }
        })
    });
}

fn ivar_roundtrip(c: &mut Criterion) {
    let values: Vec<i64> = (0..10_000).map(|i| i * 7919 - 35_000_000).collect();
    c.bench_function("write_ivar/read_ivar i64, 10k values", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            for v in &values {
                buf.write_ivar(*v);
            }
            let mut cursor = Cursor::new(&buf);
            for _ in &values {
                black_box(cursor.read_ivar().unwrap());
            }
        })
    });
}

fn any_map_roundtrip(c: &mut Criterion) {
    let mut map = HashMap::new();
    for i in 0..100 {
        map.insert(format!("key-{i}"), Any::Number(i as f64));
    }
    let value = Any::Map(Arc::new(map));

    c.bench_function("Any::Map encode/decode, 100 keys", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            value.encode(&mut buf);
            let mut cursor = Cursor::new(&buf);
            black_box(Any::decode(&mut cursor).unwrap());
        })
    });
}

fn any_string_array_roundtrip(c: &mut Criterion) {
    let items: Arc<[Any]> = (0..1_000)
        .map(|i| Any::String(Arc::from(format!("item-{i}"))))
        .collect();
    let value = Any::Array(items);

    c.bench_function("Any::Array encode/decode, 1k strings", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            value.encode(&mut buf);
            let mut cursor = Cursor::new(&buf);
            black_box(Any::decode(&mut cursor).unwrap());
        })
    });
}

criterion_group!(
    lib0_benchmarks,
    var_uint_roundtrip,
    ivar_roundtrip,
    any_map_roundtrip,
    any_string_array_roundtrip,
);
criterion_main!(lib0_benchmarks);
