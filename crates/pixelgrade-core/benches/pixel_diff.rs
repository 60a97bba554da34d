use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pixelgrade_core::diff::{compare, DiffOptions, Frame};

/// A white frame with a dark rectangle, roughly a rendered card.
fn card_frame(width: u32, height: u32, shift: u32) -> Frame {
    let mut frame = Frame::solid(width, height, [255, 255, 255, 255]);
    for y in 100..300 {
        for x in (200 + shift)..(600 + shift) {
            frame.put_pixel(x, y, [40, 40, 60, 255]);
        }
    }
    frame
}

fn bench_pixel_diff(c: &mut Criterion) {
    let options = DiffOptions::default();
    let expected = card_frame(1280, 720, 0);
    let identical = expected.clone();
    let shifted = card_frame(1280, 720, 8);

    let mut group = c.benchmark_group("pixel_diff");
    group.sample_size(20);

    group.bench_function("1280x720/identical", |b| {
        b.iter(|| compare(black_box(&identical), black_box(&expected), &options))
    });

    group.bench_function("1280x720/shifted", |b| {
        b.iter(|| compare(black_box(&shifted), black_box(&expected), &options))
    });

    group.finish();
}

criterion_group!(benches, bench_pixel_diff);
criterion_main!(benches);
