//! Criterion benchmarks for the AudioSync packet codec.
//!
//! Measures the cost of encoding one frame (done once per frame on the
//! server) and of reassembling frames from a stream (done by receivers).
//!
//! Run with:
//! ```bash
//! cargo bench --package audiosync-core --bench packet_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use audiosync_core::audio::{encode_f32_be, ToneSpec};
use audiosync_core::{decode_packet, encode_frame, AudioFrame, PacketDecoder};

/// Payload sizes: one 1024-frame stereo capture buffer and one test tone.
fn payload_sizes() -> Vec<(&'static str, usize)> {
    vec![("capture_1024x2", 1024 * 2 * 2), ("test_tone", 8820 * 2)]
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for (name, size) in payload_sizes() {
        let frame = AudioFrame::new(123_456, vec![0x5A; size]);
        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, frame| {
            b.iter(|| encode_frame(black_box(frame)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_packet");
    for (name, size) in payload_sizes() {
        let bytes = encode_frame(&AudioFrame::new(123_456, vec![0x5A; size]));
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| decode_packet(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

fn bench_stream_reassembly(c: &mut Criterion) {
    let payload = ToneSpec::default().render_be();
    let mut stream = Vec::new();
    for ts in 0..8u64 {
        stream.extend(encode_frame(&AudioFrame::new(ts, payload.clone())));
    }

    c.bench_function("packet_decoder_8_tones_1500b_chunks", |b| {
        b.iter(|| {
            let mut decoder = PacketDecoder::new(payload.len());
            let mut count = 0;
            for chunk in stream.chunks(1500) {
                decoder.push(black_box(chunk));
                while decoder.next_frame().is_some() {
                    count += 1;
                }
            }
            count
        })
    });
}

fn bench_sample_conversion(c: &mut Criterion) {
    let buffer: Vec<f32> = (0..2048).map(|i| (i as f32 / 2048.0) * 2.0 - 1.0).collect();
    c.bench_function("encode_f32_be_2048", |b| {
        b.iter(|| encode_f32_be(black_box(&buffer)))
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_stream_reassembly,
    bench_sample_conversion
);
criterion_main!(benches);
