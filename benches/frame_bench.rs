use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};
use wirecall::core::codec::FrameCodec;

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        let payload = Bytes::from(vec![0u8; size]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || payload.clone(),
                |payload| {
                    let mut buf = BytesMut::with_capacity(size + 32);
                    FrameCodec::new().encode(payload, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        let mut wire = BytesMut::new();
        FrameCodec::new().encode(payload.clone(), &mut wire).unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter_batched(
                || wire.clone(),
                |mut buf| {
                    let frame = FrameCodec::new().decode(&mut buf).unwrap();
                    assert!(frame.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode);
criterion_main!(benches);
