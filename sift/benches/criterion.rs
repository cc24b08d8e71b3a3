use criterion::{criterion_group, criterion_main, Criterion};
use sift::image::{gaussian_kernel, horizontal_filter, vertical_filter, GrayFloatImage};
use sift::Sift;

/// A reproducible test pattern with blobs at several scales.
fn synthetic_image(size: usize) -> GrayFloatImage {
    let mut image = GrayFloatImage::new(size, size);
    for y in 0..size {
        for x in 0..size {
            let mut value = 0.0f32;
            for (cx, cy, radius) in [
                (40.0, 40.0, 4.0),
                (180.0, 60.0, 9.0),
                (90.0, 200.0, 16.0),
                (200.0, 190.0, 6.0),
            ] {
                let distance = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                if distance <= radius {
                    value = 1.0;
                }
            }
            image.put(x, y, value);
        }
    }
    image
}

fn extract(c: &mut Criterion) {
    let image = synthetic_image(256);
    c.bench_function("extract", |b| {
        b.iter(|| {
            Sift::default()
                .extract_from_gray_float_image(&image)
                .unwrap()
        })
    });
}

criterion_group!(
    name = sift;
    config = Criterion::default().sample_size(10);
    targets = extract
);

fn bench_horizontal_filter(c: &mut Criterion) {
    let image = synthetic_image(256);
    let small_kernel = gaussian_kernel(1.0, 7);
    c.bench_function("horizontal_filter_small_kernel", |b| {
        b.iter(|| horizontal_filter(&image, &small_kernel))
    });
    let large_kernel = gaussian_kernel(10.0, 59);
    c.bench_function("horizontal_filter_large_kernel", |b| {
        b.iter(|| horizontal_filter(&image, &large_kernel))
    });
}

fn bench_vertical_filter(c: &mut Criterion) {
    let image = synthetic_image(256);
    let small_kernel = gaussian_kernel(1.0, 7);
    c.bench_function("vertical_filter_small_kernel", |b| {
        b.iter(|| vertical_filter(&image, &small_kernel))
    });
    let large_kernel = gaussian_kernel(10.0, 59);
    c.bench_function("vertical_filter_large_kernel", |b| {
        b.iter(|| vertical_filter(&image, &large_kernel))
    });
}

criterion_group!(
    name = sift_image;
    config = Criterion::default().sample_size(10);
    targets = bench_horizontal_filter, bench_vertical_filter
);

criterion_main!(sift, sift_image);
