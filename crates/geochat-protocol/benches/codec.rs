//! Codec benchmarks for geochat-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use geochat_protocol::{codec, ClientFrame, ServerFrame};

fn bench_encode_chat(c: &mut Criterion) {
    let frame = ServerFrame::chat_message("conn_18c2f3a9b7e", "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("msgpack_64B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.bench_function("json_64B", |b| {
        b.iter(|| codec::encode_json(black_box(&frame)))
    });
    group.finish();
}

fn bench_decode_join(c: &mut Criterion) {
    let frame = ClientFrame::join_room(37.7749, -122.4194);
    let encoded = codec::encode(&frame).unwrap();
    let text = codec::encode_json(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.bench_function("msgpack_join_room", |b| {
        b.iter(|| codec::decode::<ClientFrame>(black_box(&encoded)))
    });
    group.bench_function("json_join_room", |b| {
        b.iter(|| codec::decode_json::<ClientFrame>(black_box(&text)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode_chat, bench_decode_join);
criterion_main!(benches);
