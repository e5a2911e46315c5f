use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use missive_core::{Args, Call, Codec, JsonCodec, Method};
use serde_json::json;
use std::hint::black_box;

fn bench_envelope_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_encode");

    for size in [0usize, 1, 10, 100].iter() {
        let call = Call::new("bulk", (0..*size).map(|i| json!(i)).collect());
        group.bench_with_input(BenchmarkId::new("json", size), &call, |b, call| {
            b.iter(|| black_box(JsonCodec.encode_call(call)))
        });
    }

    group.finish();
}

fn bench_envelope_round_trip(c: &mut Criterion) {
    let call = Call::new(
        "call_five",
        vec![json!(1), json!("s"), json!(0.5), json!([1, 2, 3]), json!(null)],
    );
    let encoded = JsonCodec.encode_call(&call).unwrap();

    c.bench_function("envelope_decode", |b| {
        b.iter(|| black_box(JsonCodec.decode_call(&encoded)))
    });
}

fn bench_typed_args(c: &mut Criterion) {
    const ADD: Method<(i64, i64), i64> = Method::new("add");

    c.bench_function("typed_envelope", |b| {
        b.iter(|| black_box(ADD.envelope((1, 2))))
    });
    c.bench_function("typed_decode_args", |b| {
        b.iter(|| black_box(<(i64, i64)>::from_values(vec![json!(1), json!(2)])))
    });
}

criterion_group!(
    benches,
    bench_envelope_encode,
    bench_envelope_round_trip,
    bench_typed_args
);
criterion_main!(benches);
