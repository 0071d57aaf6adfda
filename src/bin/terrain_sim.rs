//! Headless terrain + collision simulation.
//!
//! Flies an observer across a generated heightmap, streaming the clipmap
//! into in-memory textures and recording its draws, while a handful of
//! boxes drift through a walled arena. Prints per-run statistics as JSON.
//!
//! Usage: cargo run --release --bin terrain_sim -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Engine config JSON (default: built-in settings)
//!   --frames <N>      Frames to simulate (default: 600)
//!   --speed <S>       Observer speed in world units per frame (default: 3.0)
//!   --bodies <N>      Moving boxes in the arena (default: 32)

use std::time::Instant;

use glam::{Mat4, Vec2, Vec3};
use serde_json::json;

use dukat::collision::{BodyDesc, CollisionEvent, CollisionManager, OwnerId};
use dukat::config::EngineConfig;
use dukat::core::Result;
use dukat::math::{Aabb2, Frustum};
use dukat::terrain::clipmap::{CpuTerrainBackend, RecordingRenderer};
use dukat::terrain::{ClipMap, HeightMap};

const ARENA: f32 = 100.0;

fn main() {
    dukat::core::logging::init();

    if let Err(e) = run() {
        log::error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let frames = parse_u32_arg(&args, "--frames").unwrap_or(600);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(3.0);
    let body_count = parse_u32_arg(&args, "--bodies").unwrap_or(32);

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => EngineConfig::load(&path)?,
        None => {
            let mut config = EngineConfig::default();
            config.heightmap.size = 512;
            config.clipmap.level_size = 63;
            config
        }
    };

    println!("=== Dukat Terrain Simulation ===");
    println!("Heightmap: {}²", config.heightmap.size);
    println!("Clipmap:   {} levels of {}", config.clipmap.num_levels, config.clipmap.level_size);
    println!("Frames:    {}", frames);
    println!();

    let heightmap = HeightMap::from_config(&config.heightmap)?;
    let mut textures = CpuTerrainBackend::new();
    let mut clipmap = ClipMap::new(config.clipmap.clone(), heightmap, &mut textures)?;
    let mut renderer = RecordingRenderer::new();
    clipmap.upload_meshes(&mut renderer)?;

    let mut collisions = CollisionManager::new(config.collision.clone())?;
    build_arena(&mut collisions, body_count)?;

    let projection = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.5, 20_000.0);
    let direction = Vec3::new(1.0, 0.0, 0.35).normalize();

    let mut texels = 0u64;
    let mut draws = 0u64;
    let mut culled = 0u64;
    let mut events: Vec<CollisionEvent> = Vec::new();
    let mut terrain_time = 0.0f64;
    let mut collision_time = 0.0f64;

    for frame in 0..frames {
        let xz = direction * speed * frame as f32;
        let ground = clipmap.height_at(xz.x, xz.z);
        let observer = Vec3::new(xz.x, ground + 12.0, xz.z);

        let start = Instant::now();
        clipmap.update(observer, &mut textures)?;
        let view = Mat4::look_to_rh(observer, direction - Vec3::Y * 0.2, Vec3::Y);
        let frustum = Frustum::from_view_projection(&(projection * view));
        clipmap.render(&mut renderer, Some(&frustum))?;
        terrain_time += start.elapsed().as_secs_f64();

        let stats = clipmap.stats();
        texels += stats.texels_uploaded;
        draws += stats.draws as u64;
        culled += stats.culled as u64;

        let start = Instant::now();
        step_bodies(&mut collisions, frame);
        collisions.update();
        collisions.dispatch(&mut events);
        collision_time += start.elapsed().as_secs_f64();

        if frame % 100 == 0 {
            log::info!(
                "Frame {}: observer ({:.0}, {:.0}, {:.0}), min level {}, {} draws, {} contacts",
                frame,
                observer.x,
                observer.y,
                observer.z,
                clipmap.min_level(),
                stats.draws,
                collisions.stats().contacts
            );
        }
    }

    let begins = events.iter().filter(|e| matches!(e, CollisionEvent::Begin { .. })).count();
    let ends = events.iter().filter(|e| matches!(e, CollisionEvent::End { .. })).count();
    let resolves = events.iter().filter(|e| matches!(e, CollisionEvent::Resolve { .. })).count();

    let report = json!({
        "frames": frames,
        "terrain": {
            "texels_uploaded": texels,
            "draws": draws,
            "culled": culled,
            "seconds": terrain_time,
            "last_frame": clipmap.stats(),
        },
        "collision": {
            "bodies": collisions.len(),
            "begin_events": begins,
            "end_events": ends,
            "resolve_events": resolves,
            "seconds": collision_time,
            "last_update": collisions.stats(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Four static walls around a square arena plus `count` movable boxes
fn build_arena(collisions: &mut CollisionManager, count: u32) -> Result<()> {
    let walls = [
        Aabb2::new(Vec2::new(-ARENA - 2.0, -ARENA - 2.0), Vec2::new(ARENA + 2.0, -ARENA)),
        Aabb2::new(Vec2::new(-ARENA - 2.0, ARENA), Vec2::new(ARENA + 2.0, ARENA + 2.0)),
        Aabb2::new(Vec2::new(-ARENA - 2.0, -ARENA), Vec2::new(-ARENA, ARENA)),
        Aabb2::new(Vec2::new(ARENA, -ARENA), Vec2::new(ARENA + 2.0, ARENA)),
    ];
    for wall in walls {
        collisions.create_body(BodyDesc::fixed(wall))?;
    }

    for i in 0..count {
        let angle = i as f32 * 2.399;
        let radius = ARENA * 0.8 * ((i + 1) as f32 / count.max(1) as f32).sqrt();
        let center = Vec2::new(angle.cos(), angle.sin()) * radius;
        let size = 2.0 + (i % 4) as f32;
        let desc = BodyDesc::dynamic(Aabb2::from_center_half_extent(center, Vec2::splat(size * 0.5)), size * size)
            .with_owner(OwnerId(i as u64));
        let desc = if i % 7 == 0 { desc.sensor() } else { desc };
        collisions.create_body(desc)?;
    }
    Ok(())
}

/// Drift every dynamic body on a slowly turning heading
fn step_bodies(collisions: &mut CollisionManager, frame: u32) {
    let handles: Vec<_> = collisions
        .bodies()
        .filter(|(_, body)| body.dynamic)
        .map(|(handle, _)| handle)
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        if let Some(body) = collisions.body_mut(handle) {
            let heading = i as f32 * 0.7 + frame as f32 * 0.01;
            let velocity = Vec2::new(heading.cos(), heading.sin()) * 0.5;
            // Steer back towards the middle once near the walls
            let pull = -body.center() / ARENA * 0.4;
            body.translate(velocity + pull);
        }
    }
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
