//! Benchmarks for CPU-side staging: batch appends, capacity growth,
//! and the specialized pen stamp routines. No GPU required.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stipple_core::{Color, Pen, PenShape};
use stipple_render::batch::{Batch, BatchKind};
use stipple_render::order::DrawOrderTracker;
use stipple_render::pen::CompiledPen;

fn bench_push_pixels(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pixels");
    for &count in &[1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut batch = Batch::new(BatchKind::Points);
            let color = Color::rgb(200, 100, 50);
            b.iter(|| {
                let _ = batch.reserve(count);
                for i in 0..count {
                    batch.push_point(black_box(i as f32), black_box(0.5), black_box(color));
                }
                batch.reset(std::time::Instant::now());
            });
        });
    }
    group.finish();
}

fn bench_reserve_growth(c: &mut Criterion) {
    c.bench_function("reserve_growth_from_min", |b| {
        b.iter(|| {
            let mut batch = Batch::new(BatchKind::Points);
            let _ = black_box(batch.reserve(black_box(500_000)));
        });
    });
}

fn bench_pen_stamps(c: &mut Criterion) {
    let mut group = c.benchmark_group("pen_stamp");
    for (label, shape, size) in [
        ("pixel", PenShape::Pixel, 1),
        ("square_8", PenShape::Square, 8),
        ("circle_8", PenShape::Circle, 8),
    ] {
        group.bench_function(label, |b| {
            let pen = Pen {
                shape,
                size,
                noise: 0,
            };
            let mut compiled = CompiledPen::compile(pen, 1920, 1080);
            let mut batch = Batch::new(BatchKind::Points);
            let color = Color::rgb(255, 255, 255);
            b.iter(|| {
                let _ = batch.reserve(compiled.max_pixels());
                compiled.run(&mut batch, black_box(960), black_box(540), black_box(color));
                batch.reset(std::time::Instant::now());
            });
        });
    }
    group.finish();
}

fn bench_noisy_stamp(c: &mut Criterion) {
    c.bench_function("pen_stamp_square_8_noise", |b| {
        let pen = Pen {
            shape: PenShape::Square,
            size: 8,
            noise: 16,
        };
        let mut compiled = CompiledPen::compile(pen, 1920, 1080);
        let mut batch = Batch::new(BatchKind::Points);
        let color = Color::rgb(128, 128, 128);
        b.iter(|| {
            let _ = batch.reserve(compiled.max_pixels());
            compiled.run(&mut batch, black_box(960), black_box(540), black_box(color));
            batch.reset(std::time::Instant::now());
        });
    });
}

fn bench_order_tracking(c: &mut Criterion) {
    c.bench_function("order_tracker_1k_switches", |b| {
        b.iter(|| {
            let mut tracker = DrawOrderTracker::new();
            let (mut points, mut image) = (0, 0);
            for i in 0..1_000 {
                if i % 2 == 0 {
                    tracker.switch_to(BatchKind::Points, image, points);
                    points += 3;
                } else {
                    tracker.switch_to(BatchKind::Image, points, image);
                    image += 3;
                }
            }
            black_box(tracker.drain(image));
        });
    });
}

criterion_group!(
    benches,
    bench_push_pixels,
    bench_reserve_growth,
    bench_pen_stamps,
    bench_noisy_stamp,
    bench_order_tracking,
);
criterion_main!(benches);
