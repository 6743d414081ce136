//! Criterion benchmark untuk packet decoding
//!
//! Run dengan: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ottd_admin::protocol::{read_frame, server_registry, unpack_str, PacketId};

fn welcome_payload() -> Vec<u8> {
    let mut payload = b"My Server\x001.10.0\x00\x01Random Map\x00".to_vec();
    payload.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
    payload.push(2);
    payload.extend_from_slice(&712_223u32.to_le_bytes());
    payload.extend_from_slice(&256u16.to_le_bytes());
    payload.extend_from_slice(&512u16.to_le_bytes());
    payload
}

/// Protocol packet with `n` settings records
fn protocol_payload(n: u16) -> Vec<u8> {
    let mut payload = vec![1u8];
    for key in 0..n {
        payload.push(1);
        payload.extend_from_slice(&key.to_le_bytes());
        payload.extend_from_slice(&(key * 2).to_le_bytes());
    }
    payload.push(0);
    payload
}

fn bench_packets(c: &mut Criterion) {
    let registry = server_registry().expect("registry");
    let mut group = c.benchmark_group("packets");
    group.throughput(Throughput::Elements(1));

    // Fixed-width packet
    let date = registry.lookup(PacketId(107)).expect("ServerDate");
    let payload = 712_223u32.to_le_bytes();
    group.bench_function("date", |b| {
        b.iter(|| date.decode(black_box(&payload)));
    });

    // Strings + fixed block
    let welcome = registry.lookup(PacketId(104)).expect("ServerWelcome");
    let payload = welcome_payload();
    group.bench_function("welcome", |b| {
        b.iter(|| welcome.decode(black_box(&payload)));
    });

    group.finish();
}

fn bench_sentinel_lists(c: &mut Criterion) {
    let registry = server_registry().expect("registry");
    let protocol = registry.lookup(PacketId(103)).expect("ServerProtocol");
    let mut group = c.benchmark_group("sentinel_list");

    for records in [1u16, 16, 256].iter() {
        let payload = protocol_payload(*records);
        group.throughput(Throughput::Elements(*records as u64));
        group.bench_function(format!("records_{}", records), |b| {
            b.iter(|| protocol.decode(black_box(&payload)));
        });
    }

    group.finish();
}

fn bench_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("primitives");

    let text = b"Company Name Ltd.\x00".to_vec();
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("unpack_str", |b| {
        b.iter(|| unpack_str(black_box(&text), 0));
    });

    let mut wire = 7u16.to_le_bytes().to_vec();
    wire.push(107);
    wire.extend_from_slice(&712_223u32.to_le_bytes());
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("read_frame", |b| {
        b.iter(|| read_frame(&mut black_box(wire.as_slice())));
    });

    group.finish();
}

criterion_group!(benches, bench_packets, bench_sentinel_lists, bench_primitives);
criterion_main!(benches);
