//! Multi-resolution heightmap.
//!
//! Level 0 holds one sample per world unit; each coarser level halves the
//! resolution by 2×2 averaging. Coordinates wrap, so a heightmap tiles and
//! can be sampled anywhere in the plane.

use std::path::Path;

use image::{ImageBuffer, Luma};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::config::HeightMapConfig;

/// Integer rectangle in grid (texel) coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl GridRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One square grid of elevations in [0, 1]
#[derive(Clone, Debug, PartialEq)]
pub struct HeightLevel {
    size: u32,
    data: Vec<f32>,
}

impl HeightLevel {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            data: vec![0.0; size as usize * size as usize],
        }
    }

    /// Wrap row-major `data` of a `size × size` grid
    pub fn from_data(size: u32, data: Vec<f32>) -> Result<Self> {
        if data.len() != size as usize * size as usize {
            return Err(Error::InvalidConfig(format!(
                "height level of size {} needs {} samples, got {}",
                size,
                size as usize * size as usize,
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        let size = self.size as i32;
        x.rem_euclid(size) as usize + y.rem_euclid(size) as usize * self.size as usize
    }

    /// Sample at integer coordinates, wrapping around the edges
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: i32, y: i32, value: f32) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    /// Bilinear sample at fractional texel coordinates
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (ix, iy) = (x0 as i32, y0 as i32);

        let top = self.get(ix, iy) * (1.0 - fx) + self.get(ix + 1, iy) * fx;
        let bottom = self.get(ix, iy + 1) * (1.0 - fx) + self.get(ix + 1, iy + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Half-resolution copy built from 2×2 box averages
    pub fn downsample(&self) -> HeightLevel {
        let size = (self.size / 2).max(1);
        let mut out = HeightLevel::new(size);
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                let avg = (self.get(2 * x, 2 * y)
                    + self.get(2 * x + 1, 2 * y)
                    + self.get(2 * x, 2 * y + 1)
                    + self.get(2 * x + 1, 2 * y + 1))
                    * 0.25;
                out.set(x, y, avg);
            }
        }
        out
    }
}

/// Height-sampling interface consumed by the clipmap
pub trait HeightSource {
    fn num_levels(&self) -> usize;

    fn get_level(&self, index: usize) -> &HeightLevel;

    /// Multiplier from stored [0, 1] values to world units
    fn get_scale_factor(&self) -> f32;

    /// Copy a (wrapping) sub-rectangle of `level` into `out`, row-major.
    fn get_data(&self, level: usize, rect: GridRect, out: &mut [f32]) {
        let source = self.get_level(level);
        let width = rect.width as usize;
        for (row, line) in out.chunks_mut(width).take(rect.height as usize).enumerate() {
            let y = rect.y + row as i32;
            for (col, value) in line.iter_mut().enumerate() {
                *value = source.get(rect.x + col as i32, y);
            }
        }
    }

    /// Bilinear world-space elevation (world units) at `(x, y)` on `level`.
    ///
    /// Level `k` has a texel spacing of `2^k` world units.
    fn get_elevation(&self, x: f32, y: f32, level: usize) -> f32 {
        let level = level.min(self.num_levels().saturating_sub(1));
        let spacing = (1u32 << level) as f32;
        self.get_level(level).sample_bilinear(x / spacing, y / spacing) * self.get_scale_factor()
    }
}

/// Elevation levels plus the vertical scale applied to them
#[derive(Clone, Debug)]
pub struct HeightMap {
    levels: Vec<HeightLevel>,
    scale_factor: f32,
}

impl HeightMap {
    /// Flat heightmap; `size` must be a power of two
    pub fn new(size: u32, scale_factor: f32) -> Result<Self> {
        Self::from_heights(HeightLevel::new(size), scale_factor)
    }

    /// Build all coarser levels from a finest level
    pub fn from_heights(finest: HeightLevel, scale_factor: f32) -> Result<Self> {
        let size = finest.size();
        if size < 2 || !size.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "heightmap size {} must be a power of two >= 2",
                size
            )));
        }
        let mut map = Self {
            levels: vec![finest],
            scale_factor,
        };
        map.rebuild_levels();
        Ok(map)
    }

    /// Generate level 0 with the configured generator
    pub fn from_config(config: &HeightMapConfig) -> Result<Self> {
        log::info!(
            "Generating {}x{} heightmap ({:?})",
            config.size,
            config.size,
            config.generator
        );
        Self::from_heights(config.generator.generate(config.size), config.scale_factor)
    }

    pub fn size(&self) -> u32 {
        self.levels[0].size()
    }

    /// Mutable access to the finest level; call [`rebuild_levels`](Self::rebuild_levels) after editing.
    pub fn finest_mut(&mut self) -> &mut HeightLevel {
        &mut self.levels[0]
    }

    pub fn set_scale_factor(&mut self, scale_factor: f32) {
        self.scale_factor = scale_factor;
    }

    /// Regenerate every coarser level from level 0
    pub fn rebuild_levels(&mut self) {
        self.levels.truncate(1);
        while self.levels[self.levels.len() - 1].size() > 1 {
            let next = self.levels[self.levels.len() - 1].downsample();
            self.levels.push(next);
        }
    }

    /// Save level 0 as a 16-bit grayscale PNG
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let finest = &self.levels[0];
        let size = finest.size();
        let pixels: Vec<u16> = finest
            .data()
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16)
            .collect();
        let image: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(size, size, pixels)
            .ok_or_else(|| Error::InvalidConfig("heightmap buffer size mismatch".into()))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        image.save(path.as_ref())?;
        log::info!("Saved {}x{} heightmap to {}", size, size, path.as_ref().display());
        Ok(())
    }

    /// Load a grayscale PNG as level 0 and rebuild the coarser levels
    pub fn load_png(path: impl AsRef<Path>, scale_factor: f32) -> Result<Self> {
        let image = image::open(path.as_ref())?.into_luma16();
        let (width, height) = image.dimensions();
        if width != height {
            return Err(Error::InvalidConfig(format!(
                "heightmap image must be square, got {}x{}",
                width, height
            )));
        }
        let data = image
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / u16::MAX as f32)
            .collect();
        let map = Self::from_heights(HeightLevel::from_data(width, data)?, scale_factor)?;
        log::info!("Loaded {}x{} heightmap from {}", width, height, path.as_ref().display());
        Ok(map)
    }
}

impl HeightSource for HeightMap {
    fn num_levels(&self) -> usize {
        self.levels.len()
    }

    fn get_level(&self, index: usize) -> &HeightLevel {
        &self.levels[index]
    }

    fn get_scale_factor(&self) -> f32 {
        self.scale_factor
    }
}
