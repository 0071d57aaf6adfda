//! Heightmap generator binary: writes a tileable 16-bit PNG heightmap.
//!
//! Usage: cargo run --release --bin generate_heightmap -- [OPTIONS]
//!
//! Options:
//!   --size <N>          Samples per side, power of two (default: 1024)
//!   --kind <KIND>       flat | diamond | perlin (default: diamond)
//!   --seed <SEED>       Random seed (default: 12345)
//!   --roughness <R>     Diamond-square roughness (default: 0.55)
//!   --scale <S>         Perlin feature size in samples (default: 256)
//!   --octaves <N>       Perlin octaves (default: 6)
//!   --height <H>        Flat height in [0, 1] (default: 0.5)
//!   --out <PATH>        Output PNG (default: heightmap.png)
//!   --config <PATH>     Also write an engine config pointing at these settings

use std::path::PathBuf;
use std::time::Instant;

use dukat::config::{EngineConfig, HeightMapConfig};
use dukat::core::Result;
use dukat::terrain::{GeneratorKind, HeightMap, HeightSource, PerlinParams};

fn main() {
    dukat::core::logging::init();

    if let Err(e) = run() {
        log::error!("Heightmap generation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let size = parse_u32_arg(&args, "--size").unwrap_or(1024);
    let seed = parse_u32_arg(&args, "--seed").unwrap_or(12345);
    let kind = parse_str_arg(&args, "--kind").unwrap_or_else(|| "diamond".to_string());
    let out = PathBuf::from(parse_str_arg(&args, "--out").unwrap_or_else(|| "heightmap.png".to_string()));

    let generator = match kind.as_str() {
        "flat" => GeneratorKind::Flat {
            height: parse_f32_arg(&args, "--height").unwrap_or(0.5),
        },
        "perlin" => GeneratorKind::Perlin(PerlinParams {
            seed,
            scale: parse_f32_arg(&args, "--scale").unwrap_or(256.0),
            octaves: parse_u32_arg(&args, "--octaves").unwrap_or(6),
            ..Default::default()
        }),
        "diamond" => GeneratorKind::DiamondSquare {
            seed,
            roughness: parse_f32_arg(&args, "--roughness").unwrap_or(0.55),
        },
        other => {
            return Err(dukat::core::Error::InvalidConfig(format!(
                "unknown generator '{}', expected flat, diamond or perlin",
                other
            )));
        }
    };

    println!("=== Dukat Heightmap Generator ===");
    println!("Size:      {} x {}", size, size);
    println!("Generator: {:?}", generator);
    println!("Output:    {}", out.display());
    println!();

    let config = HeightMapConfig {
        size,
        generator,
        ..Default::default()
    };

    let start = Instant::now();
    let heightmap = HeightMap::from_config(&config)?;
    log::info!(
        "Generated {} levels in {:.2}s",
        heightmap.num_levels(),
        start.elapsed().as_secs_f64()
    );

    heightmap.save_png(&out)?;
    log::info!("Wrote {}", out.display());

    if let Some(path) = parse_str_arg(&args, "--config") {
        let engine = EngineConfig {
            heightmap: config,
            ..Default::default()
        };
        engine.save(&path)?;
        log::info!("Wrote config {}", path);
    }
    Ok(())
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
