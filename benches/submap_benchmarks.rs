//! Benchmarks for scan integration and feature computation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;

use meru_map::{MapperParameters, PointCloud, Submap, Transform};

fn bench_params() -> MapperParameters {
    let mut params = MapperParameters::default();
    params.map_builder.map_voxel_size = 0.1;
    params.map_builder.carving.carve_space_every_n_sec = 0.0;
    params.submaps.min_seconds_between_feature_computation = 0.0;
    params
}

/// Synthetic spiral wall scan, roughly what a 3D LiDAR returns indoors.
fn spiral_scan(n: usize) -> PointCloud {
    let mut points = Vec::with_capacity(n);
    for i in 0..n {
        let t = i as f64 / n as f64;
        let angle = t * 40.0;
        let radius = 3.0 + t;
        points.push(Vector3::new(
            radius * angle.cos(),
            radius * angle.sin(),
            t * 2.0 - 1.0,
        ));
    }
    PointCloud::from_points(points)
}

fn bench_insert_scan(c: &mut Criterion) {
    let scan = spiral_scan(2000);
    c.bench_function("insert_scan_2k_points", |b| {
        b.iter_batched(
            || Submap::new(0, 0, bench_params()).unwrap(),
            |submap| {
                submap.insert_scan(
                    black_box(&scan),
                    black_box(&scan),
                    &Transform::identity(),
                    1,
                    false,
                );
                submap
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_insert_scan_with_carving(c: &mut Criterion) {
    let scan = spiral_scan(2000);
    c.bench_function("insert_scan_2k_points_carving", |b| {
        b.iter_batched(
            || {
                let submap = Submap::new(0, 0, bench_params()).unwrap();
                submap.insert_scan(&scan, &scan, &Transform::identity(), 1, false);
                submap
            },
            |submap| {
                submap.insert_scan(
                    black_box(&scan),
                    black_box(&scan),
                    &Transform::identity(),
                    2,
                    true,
                );
                submap
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_compute_features(c: &mut Criterion) {
    let scan = spiral_scan(2000);
    c.bench_function("compute_features_2k_points", |b| {
        b.iter_batched(
            || {
                let submap = Submap::new(0, 0, bench_params()).unwrap();
                submap.insert_scan(&scan, &scan, &Transform::identity(), 1, false);
                submap
            },
            |submap| {
                submap.compute_features();
                submap
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_insert_scan,
    bench_insert_scan_with_carving,
    bench_compute_features
);
criterion_main!(benches);
