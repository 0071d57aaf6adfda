//! Procedural heightfield generation.
//!
//! Both generators produce tileable `size × size` grids normalised to
//! [0, 1], so a heightmap can wrap around and back an unbounded terrain.

use std::f64::consts::TAU;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::heightmap::HeightLevel;

/// Parameters controlling fractal Perlin generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerlinParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal feature size in texels (larger = smoother)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
}

impl Default for PerlinParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 256.0,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Which algorithm fills a heightmap
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorKind {
    Flat { height: f32 },
    DiamondSquare { seed: u32, roughness: f32 },
    Perlin(PerlinParams),
}

impl Default for GeneratorKind {
    fn default() -> Self {
        GeneratorKind::DiamondSquare { seed: 12345, roughness: 0.55 }
    }
}

impl GeneratorKind {
    /// Produce a `size × size` level (size must be a power of two)
    pub fn generate(&self, size: u32) -> HeightLevel {
        match self {
            GeneratorKind::Flat { height } => {
                let mut level = HeightLevel::new(size);
                level.data_mut().fill(height.clamp(0.0, 1.0));
                level
            }
            GeneratorKind::DiamondSquare { seed, roughness } => diamond_square(size, *roughness, *seed),
            GeneratorKind::Perlin(params) => perlin(size, params),
        }
    }
}

/// Integer hash producing a value in [0, 1].
fn hash_2d(ix: i32, iz: i32, seed: u32) -> f32 {
    let mut h = (ix as u32).wrapping_mul(374761393)
        .wrapping_add((iz as u32).wrapping_mul(668265263))
        .wrapping_add(seed.wrapping_mul(1274126177));
    h = (h ^ (h >> 13)).wrapping_mul(1103515245);
    h = h ^ (h >> 16);
    (h & 0x7FFFFFFF) as f32 / 0x7FFFFFFF_u32 as f32
}

/// Toroidal diamond-square midpoint displacement.
///
/// Samples wrap at the edges, so the result tiles. `roughness` scales the
/// displacement amplitude from one subdivision step to the next.
pub fn diamond_square(size: u32, roughness: f32, seed: u32) -> HeightLevel {
    let mut level = HeightLevel::new(size);
    if size < 2 {
        return level;
    }

    let n = size as i32;
    let mut step = n;
    let mut amplitude = 1.0f32;
    level.set(0, 0, hash_2d(0, 0, seed));

    while step > 1 {
        let half = step / 2;
        let salt = seed ^ (step as u32).wrapping_mul(0x9E3779B9);

        // Diamond: square centres from their four corners
        for y in (0..n).step_by(step as usize) {
            for x in (0..n).step_by(step as usize) {
                let avg = (level.get(x, y)
                    + level.get(x + step, y)
                    + level.get(x, y + step)
                    + level.get(x + step, y + step))
                    * 0.25;
                let offset = (hash_2d(x + half, y + half, salt) * 2.0 - 1.0) * amplitude;
                level.set(x + half, y + half, avg + offset);
            }
        }

        // Square: edge midpoints from their four diamond neighbours
        for y in (0..n).step_by(half as usize) {
            let x0 = if (y / half) % 2 == 0 { half } else { 0 };
            for x in (x0..n).step_by(step as usize) {
                let avg = (level.get(x - half, y)
                    + level.get(x + half, y)
                    + level.get(x, y - half)
                    + level.get(x, y + half))
                    * 0.25;
                let offset = (hash_2d(x, y, salt.rotate_left(7)) * 2.0 - 1.0) * amplitude;
                level.set(x, y, avg + offset);
            }
        }

        amplitude *= roughness;
        step = half;
    }

    normalize(level.data_mut());
    level
}

/// Fractal Perlin noise sampled on a 4D torus so the result tiles
pub fn perlin(size: u32, params: &PerlinParams) -> HeightLevel {
    let noise = Fbm::<Perlin>::new(params.seed)
        .set_octaves(params.octaves as usize)
        .set_persistence(params.persistence as f64)
        .set_lacunarity(params.lacunarity as f64);

    let mut level = HeightLevel::new(size);
    let radius = size as f64 / (TAU * params.scale.max(f32::EPSILON) as f64);
    let width = size as usize;

    level
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let b = TAU * y as f64 / size as f64;
            for (x, value) in row.iter_mut().enumerate() {
                let a = TAU * x as f64 / size as f64;
                let p = [
                    radius * a.cos(),
                    radius * a.sin(),
                    radius * b.cos(),
                    radius * b.sin(),
                ];
                *value = noise.get(p) as f32;
            }
        });

    normalize(level.data_mut());
    level
}

/// Rescale values in place to span [0, 1]
fn normalize(data: &mut [f32]) {
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        data.fill(0.5);
        return;
    }
    for v in data.iter_mut() {
        *v = (*v - min) / range;
    }
}
