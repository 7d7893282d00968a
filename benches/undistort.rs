// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};

use descriptor_export_rs::core::distortion_map::DistortionMap;
use descriptor_export_rs::core::frame;
use descriptor_export_rs::core::undistort::{Interpolation, Remapper};
use descriptor_export_rs::misc::type_aliases::Point2;

const WIDTH: usize = 640;
const HEIGHT: usize = 480;

/// Barrel-like map: sources are pushed away from the center.
fn barrel_map() -> DistortionMap {
    let (cx, cy) = (WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0);
    let mapping = (0..WIDTH * HEIGHT)
        .map(|i| {
            let (x, y) = ((i % WIDTH) as f32 - cx, (i / WIDTH) as f32 - cy);
            let r2 = (x * x + y * y) / (cx * cx);
            let k = 1.0 + 0.15 * r2;
            Point2::new(cx + k * x, cy + k * y)
        })
        .collect();
    DistortionMap::from_mapping(WIDTH, HEIGHT, WIDTH, HEIGHT, mapping).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let map = barrel_map();
    let raw = RgbImage::from_fn(WIDTH as u32, HEIGHT as u32, |x, y| {
        Rgb([x as u8, y as u8, (x ^ y) as u8])
    });
    let bilinear = Remapper::new(&map, Interpolation::Bilinear);
    let nearest = Remapper::new(&map, Interpolation::Nearest);

    c.bench_function("remap bilinear 640x480", |b| {
        b.iter(|| bilinear.apply(black_box(&raw)).unwrap())
    });
    c.bench_function("remap nearest 640x480", |b| {
        b.iter(|| nearest.apply(black_box(&raw)).unwrap())
    });
    c.bench_function("build remapper 640x480", |b| {
        b.iter(|| Remapper::new(black_box(&map), Interpolation::Bilinear))
    });
    c.bench_function("rotate 640x480", |b| {
        b.iter(|| frame::rotate_ccw(black_box(&raw), frame::CANONICAL_QUARTER_TURNS))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
