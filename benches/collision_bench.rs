//! Benchmarks for collision detection and octree classification
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{DQuat, DVec3};
use sdf_engine::octree::{classify, create_cube};
use sdf_engine::physics::{bodies_intersect, detect, Material, Matter};
use sdf_engine::sdf::{create_sdf_arena, insert_sdf, Shape};

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision");

    let mut arena = create_sdf_arena();
    let sphere = insert_sdf(&mut arena, Shape::Sphere { radius: 1.0 }, [255; 4]).unwrap();
    let cuboid = insert_sdf(
        &mut arena,
        Shape::Cuboid {
            half_extents: DVec3::new(1.0, 0.5, 0.75),
        },
        [255; 4],
    )
    .unwrap();

    let a = Matter::new(sphere, Material::default(), DVec3::ZERO, DQuat::IDENTITY);
    let b = Matter::new(
        cuboid,
        Material::default(),
        DVec3::new(1.4, 0.3, 0.0),
        DQuat::from_rotation_y(0.4),
    );
    // Sample mass properties outside the timed loop
    a.properties(&arena).unwrap();
    b.properties(&arena).unwrap();

    group.bench_function("detect_sphere_cuboid", |bench| {
        bench.iter(|| detect(black_box(&arena), black_box(&a), black_box(&b)));
    });

    group.bench_function("intersect_sphere_cuboid", |bench| {
        bench.iter(|| bodies_intersect(black_box(&arena), black_box(&a), black_box(&b)));
    });

    group.finish();
}

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree");

    let mut arena = create_sdf_arena();
    let sphere = insert_sdf(&mut arena, Shape::Sphere { radius: 3.0 }, [255; 4]).unwrap();
    let cube = create_cube(DVec3::new(2.0, 0.0, 0.0), 1.0);

    group.bench_function("classify_surface_cube", |bench| {
        bench.iter(|| classify(black_box(&arena), black_box(&cube), sphere));
    });

    group.finish();
}

criterion_group!(benches, bench_detection, bench_classification);
criterion_main!(benches);
