use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::NamedTempFile;
use vraw::packing::{pack, unpack};
use vraw::{
    BitDepth, Compression, FrameMetadata, LogCurve, PixelEncoding, VrawReader, VrawWriter,
    WriterConfig,
};

const WIDTH: usize = 1920;
const HEIGHT: usize = 1080;

fn sensor_frame() -> Vec<u16> {
    (0..WIDTH * HEIGHT)
        .map(|i| (64 + (i % WIDTH) * 2 + (i / WIDTH) % 97) as u16 & 0x0FFF)
        .collect()
}

fn bench_packing(c: &mut Criterion) {
    let frame = sensor_frame();
    let mut group = c.benchmark_group("packing");
    group.throughput(Throughput::Elements(frame.len() as u64));

    for depth in [BitDepth::Ten, BitDepth::Twelve] {
        let masked: Vec<u16> = frame.iter().map(|&s| s & depth.max_value()).collect();
        let mut packed = vec![0u8; depth.packed_len(masked.len())];
        let mut unpacked = vec![0u16; masked.len()];

        group.bench_function(format!("pack_{}bit", depth.bits()), |b| {
            b.iter(|| pack(depth, black_box(&masked), &mut packed));
        });

        pack(depth, &masked, &mut packed);
        group.bench_function(format!("unpack_{}bit", depth.bits()), |b| {
            b.iter(|| unpack(depth, black_box(&packed), &mut unpacked));
        });
    }

    group.finish();
}

fn bench_log_curve(c: &mut Criterion) {
    let frame = sensor_frame();
    let curve = LogCurve::new(64, 4095, BitDepth::Twelve);
    let mut encoded = vec![0u16; frame.len()];

    let mut group = c.benchmark_group("log_curve");
    group.throughput(Throughput::Elements(frame.len() as u64));
    group.bench_function("encode_12bit", |b| {
        b.iter(|| curve.encode(black_box(&frame), &mut encoded));
    });
    group.finish();

    c.bench_function("build_curve_12bit", |b| {
        b.iter(|| LogCurve::new(black_box(64), 4095, BitDepth::Twelve));
    });
}

fn bench_write_frames(c: &mut Criterion) {
    let frame = sensor_frame();
    let mut config = WriterConfig::new(WIDTH as u32, HEIGHT as u32);
    config.encoding = PixelEncoding::Log12;
    config.packed = true;
    config.compression = Compression::Lz4Fast;

    c.bench_function("write_10_frames_log12_packed_lz4", |b| {
        b.iter(|| {
            let mut writer = VrawWriter::new();
            writer.init(Cursor::new(Vec::new()), &config).unwrap();
            writer.start().unwrap();
            for n in 0..10u64 {
                writer
                    .submit_frame(black_box(&frame), n * 41_667, &FrameMetadata::default())
                    .unwrap();
            }
            writer.stop().unwrap()
        });
    });
}

fn bench_read_frames(c: &mut Criterion) {
    let file = NamedTempFile::new().unwrap();
    let frame = sensor_frame();
    let mut config = WriterConfig::new(WIDTH as u32, HEIGHT as u32);
    config.packed = true;

    // Setup: write 10 frames
    {
        let mut writer = VrawWriter::create(file.path(), &config).unwrap();
        writer.start().unwrap();
        for n in 0..10u64 {
            writer
                .submit_frame(&frame, n * 41_667, &FrameMetadata::default())
                .unwrap();
        }
        writer.stop().unwrap();
    }

    c.bench_function("read_frame_linear12_packed_lz4", |b| {
        let mut reader = VrawReader::open(file.path()).unwrap();
        let mut i = 0;
        b.iter(|| {
            let frame = reader.read_frame(black_box(i % 10)).unwrap();
            i += 1;
            frame
        });
    });
}

criterion_group!(
    benches,
    bench_packing,
    bench_log_curve,
    bench_write_frames,
    bench_read_frames
);
criterion_main!(benches);
