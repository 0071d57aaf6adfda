use criterion::{criterion_group, criterion_main, Criterion, black_box};

use dukat::collision::{BodyDesc, CollisionManager};
use dukat::config::{ClipMapConfig, CollisionConfig};
use dukat::math::Aabb2;
use dukat::terrain::clipmap::{ClipMapMeshes, CpuTerrainBackend, RecordingRenderer};
use dukat::terrain::generator::diamond_square;
use dukat::terrain::{ClipMap, HeightMap};

use glam::{Vec2, Vec3};

fn clipmap(level_size: u32, backend: &mut CpuTerrainBackend) -> ClipMap {
    let heightmap = HeightMap::from_heights(diamond_square(256, 0.55, 7), 64.0).unwrap();
    ClipMap::new(ClipMapConfig::new(6, level_size), heightmap, backend).unwrap()
}

fn bench_mesh_build_255(c: &mut Criterion) {
    c.bench_function("clipmap_meshes_255", |b| {
        b.iter(|| ClipMapMeshes::build(black_box(255)));
    });
}

fn bench_clipmap_walk(c: &mut Criterion) {
    let mut backend = CpuTerrainBackend::new();
    let mut map = clipmap(63, &mut backend);
    map.update(Vec3::new(0.0, 10.0, 0.0), &mut backend).unwrap();

    c.bench_function("clipmap_update_walk_63", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame += 1;
            let observer = Vec3::new(frame as f32 * 1.5, 10.0, frame as f32 * 0.5);
            map.update(black_box(observer), &mut backend).unwrap();
        });
    });
}

fn bench_clipmap_render(c: &mut Criterion) {
    let mut backend = CpuTerrainBackend::new();
    let mut map = clipmap(255, &mut backend);
    map.update(Vec3::new(0.0, 10.0, 0.0), &mut backend).unwrap();
    let mut renderer = RecordingRenderer::new();

    c.bench_function("clipmap_render_255", |b| {
        b.iter(|| map.render(&mut renderer, None).unwrap());
    });
}

fn scattered_bodies(count: usize) -> CollisionManager {
    let mut manager = CollisionManager::new(CollisionConfig::default()).unwrap();
    for i in 0..count {
        let angle = i as f32 * 2.399;
        let radius = 4.0 * (i as f32).sqrt();
        let center = Vec2::new(angle.cos(), angle.sin()) * radius;
        let bounds = Aabb2::from_center_half_extent(center, Vec2::splat(1.5));
        manager.create_body(BodyDesc::dynamic(bounds, 1.0)).unwrap();
    }
    manager
}

fn bench_collision_update_1000(c: &mut Criterion) {
    let mut manager = scattered_bodies(1000);

    c.bench_function("collision_update_1000", |b| {
        b.iter(|| {
            manager.update();
            black_box(manager.drain_events());
        });
    });
}

fn bench_collision_ray_query(c: &mut Criterion) {
    let mut manager = scattered_bodies(1000);
    manager.update();
    let ray = dukat::math::Ray2::new(Vec2::new(-200.0, 3.0), Vec2::X);

    c.bench_function("collision_find_closest", |b| {
        b.iter(|| manager.find_closest(black_box(&ray), 400.0, |_| true));
    });
}

criterion_group!(
    benches,
    bench_mesh_build_255,
    bench_clipmap_walk,
    bench_clipmap_render,
    bench_collision_update_1000,
    bench_collision_ray_query,
);
criterion_main!(benches);
