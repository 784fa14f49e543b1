use criterion::{Criterion, black_box, criterion_group, criterion_main};

use terrasect::core::config::TerrainConfig;
use terrasect::dispatch::{SlotPool, build_sector_mesh};
use terrasect::math::Aabb;
use terrasect::terrain::{GeneratorParams, NoiseHeightfield, SectorKey, Terrain};

use glam::Vec3;

fn build_terrain(size_units: u32) -> Terrain {
    let cfg = TerrainConfig {
        sector_size: 64,
        unit_size: 1.0,
        flatness_threshold: 0.0,
        ocean_level: 0.0,
    };
    let source = NoiseHeightfield::new(GeneratorParams::default());
    Terrain::build(&cfg, size_units, &source).expect("terrain build failed")
}

fn bench_terrain_build_256(c: &mut Criterion) {
    let source = NoiseHeightfield::new(GeneratorParams::default());
    let cfg = TerrainConfig {
        sector_size: 64,
        unit_size: 1.0,
        flatness_threshold: 0.0,
        ocean_level: 0.0,
    };

    c.bench_function("terrain_build_256", |b| {
        b.iter(|| Terrain::build(black_box(&cfg), black_box(256), &source));
    });
}

fn bench_sector_mesh(c: &mut Criterion) {
    let terrain = build_terrain(256);
    let snapshot = terrain
        .sector_snapshot(SectorKey { x: 0, y: 0, level: 0 })
        .expect("snapshot failed");
    let pool = SlotPool::new(2, 65);

    c.bench_function("sector_mesh_lod0", |b| {
        let mut slot = pool.checkout().expect("slot missing");
        b.iter(|| build_sector_mesh(black_box(&snapshot), 0, &mut slot));
    });

    c.bench_function("sector_mesh_lod2", |b| {
        let mut slot = pool.checkout().expect("slot missing");
        b.iter(|| build_sector_mesh(black_box(&snapshot), 2, &mut slot));
    });
}

fn bench_height_queries(c: &mut Criterion) {
    let terrain = build_terrain(256);

    c.bench_function("height_query", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(37);
            terrain.height_at(black_box((i % 256) as f32), black_box((i / 7 % 256) as f32))
        });
    });
}

fn bench_sector_intersection(c: &mut Criterion) {
    let terrain = build_terrain(256);
    let area = Aabb::new(Vec3::new(40.0, 40.0, 0.0), Vec3::new(180.0, 180.0, 100.0));

    c.bench_function("sectors_in_box", |b| {
        b.iter(|| terrain.sectors_in_box(black_box(&area)));
    });
}

criterion_group!(
    benches,
    bench_terrain_build_256,
    bench_sector_mesh,
    bench_height_queries,
    bench_sector_intersection
);
criterion_main!(benches);
