use criterion::{black_box, criterion_group, criterion_main, Criterion};
use yrs::block_store::StateVector;
use yrs::Doc;

fn text_insert(c: &mut Criterion) {
    c.bench_function("text insert 10k chars one at a time", |b| {
        b.iter(|| {
            let doc = Doc::new();
            let text = doc.get_or_insert_text("text");
            let mut txn = doc.transact_mut();
            for i in 0..10_000 {
                text.insert(&mut txn, i % (i + 1), "a");
            }
        })
    });
}

fn array_push_back(c: &mut Criterion) {
    c.bench_function("array push_back 10k ints", |b| {
        b.iter(|| {
            let doc = Doc::new();
            let array = doc.get_or_insert_array("array");
            let mut txn = doc.transact_mut();
            for i in 0..10_000 {
                array.push_back(&mut txn, i as i64);
            }
        })
    });
}

fn map_insert(c: &mut Criterion) {
    c.bench_function("map insert 10k keys", |b| {
        b.iter(|| {
            let doc = Doc::new();
            let map = doc.get_or_insert_map("map");
            let mut txn = doc.transact_mut();
            for i in 0..10_000 {
                map.insert(&mut txn, format!("key-{i}"), i as i64);
            }
        })
    });
}

fn encode_update(c: &mut Criterion) {
    let doc = Doc::new();
    let text = doc.get_or_insert_text("text");
    {
        let mut txn = doc.transact_mut();
        for i in 0..10_000 {
            text.insert(&mut txn, i % (i + 1), "a");
        }
    }
    c.bench_function("encode full update, 10k inserts", |b| {
        b.iter(|| black_box(doc.encode_state_as_update_v1(&StateVector::new())))
    });
}

fn apply_remote_update(c: &mut Criterion) {
    let source = Doc::new();
    let text = source.get_or_insert_text("text");
    {
        let mut txn = source.transact_mut();
        for i in 0..10_000 {
            text.insert(&mut txn, i % (i + 1), "a");
        }
    }
    let bytes = source.encode_state_as_update_v1(&StateVector::new());

    c.bench_function("apply remote update, 10k inserts", |b| {
        b.iter(|| {
            let doc = Doc::new();
            let update = yrs::Update::decode_v1(&bytes).unwrap();
            doc.transact_mut().apply_update(update);
        })
    });
}

fn diff_against_partial_state(c: &mut Criterion) {
    let doc = Doc::new();
    let text = doc.get_or_insert_text("text");
    {
        let mut txn = doc.transact_mut();
        for i in 0..5_000 {
            text.insert(&mut txn, i % (i + 1), "a");
        }
    }
    let sv = doc.transact().state_vector();
    {
        let mut txn = doc.transact_mut();
        for i in 0..5_000 {
            text.insert(&mut txn, i % (i + 1), "b");
        }
    }

    c.bench_function("encode update diff against half-caught-up peer", |b| {
        b.iter(|| black_box(doc.encode_state_as_update_v1(&sv)))
    });
}

criterion_group!(
    benches,
    text_insert,
    array_push_back,
    map_insert,
    encode_update,
    apply_remote_update,
    diff_against_partial_state,
);
criterion_main!(benches);
