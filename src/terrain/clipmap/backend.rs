//! GPU-facing interfaces of the clipmap plus an in-memory implementation.
//!
//! The clipmap never talks to a graphics API directly: texture uploads go
//! through [`TerrainTextures`] and draw calls through [`TerrainRenderer`].
//! The wgpu implementations live in `crate::render`; the CPU ones here back
//! the tests and headless tools.

use bytemuck::{Pod, Zeroable};

use crate::core::error::Error;
use crate::core::types::Result;

use super::mesh::{ClipMapMeshes, MeshKind};

/// Sub-rectangle of one texture layer, in texels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TexelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TexelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Per-draw parameters (matches `DrawParams` in clipmap_terrain.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DrawParams {
    /// World-space lower corner of the level
    pub origin: [f32; 2],
    /// Mesh offset inside the level, in cells
    pub offset: [f32; 2],
    /// Torus offset of the level inside its layer, in texels
    pub texture_offset: [f32; 2],
    /// Torus texel of the level origin inside the parent layer, for
    /// blending towards the coarser level
    pub parent_texture_offset: [f32; 2],
    /// World units per cell
    pub scale: f32,
    /// LOD blend weight, `1 - index / num_levels`
    pub blend: f32,
    pub layer: u32,
    pub _pad: u32,
}

/// Per-frame parameters shared by every draw
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameParams {
    pub observer: [f32; 3],
    pub height_scale: f32,
    pub level_size: u32,
    pub texture_size: u32,
    pub num_levels: u32,
    pub min_level: u32,
}

/// Parameters for regenerating one normal-map layer
/// (matches `NormalParams` in clipmap_normals.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct NormalParams {
    pub layer: u32,
    /// Elevation texture size; the normal layer is twice this
    pub texture_size: u32,
    /// World units per elevation texel
    pub grid_scale: f32,
    /// World units per stored elevation unit
    pub height_scale: f32,
    /// Torus texel of the level origin; differences never cross the seam
    /// just below it
    pub texture_offset: [u32; 2],
    pub _pad: [u32; 2],
}

/// Storage for the elevation and normal texture arrays
pub trait TerrainTextures {
    /// Allocate `layers` elevation layers of `texture_size²` and normal
    /// layers of `(2 * texture_size)²`.
    fn allocate(&mut self, texture_size: u32, layers: u32) -> Result<()>;

    /// Overwrite `rect` of one elevation layer with row-major `data`
    fn write_elevation(&mut self, layer: u32, rect: TexelRect, data: &[f32]) -> Result<()>;

    /// Rebuild one normal layer from its elevation layer
    fn update_normals(&mut self, params: &NormalParams) -> Result<()>;
}

/// Sink for clipmap draw calls
pub trait TerrainRenderer {
    /// Upload the shared meshes; called once before the first frame
    fn upload_meshes(&mut self, meshes: &ClipMapMeshes) -> Result<()>;

    fn begin_frame(&mut self, frame: &FrameParams) -> Result<()>;

    fn draw(&mut self, mesh: MeshKind, params: &DrawParams);

    fn end_frame(&mut self) -> Result<()>;
}

/// Normal at normal-texel `(u, v)` of a 2x resolution layer.
///
/// Heights are sampled bilinearly from the torus-addressed elevation layer,
/// with central differences one elevation texel wide. Coordinates are taken
/// relative to the level origin and clamped to the resident window, so
/// texels on either side of the wrap seam (world cells `origin + T - 1` and
/// `origin`) are never mixed; the difference turns one-sided there.
pub fn compute_normal(elevation: &[f32], params: &NormalParams, u: u32, v: u32) -> [f32; 4] {
    let size = params.texture_size as i32;
    let last = (params.texture_size - 1) as f32;
    let [ox, oz] = params.texture_offset.map(|o| o as i32);
    let texel = |x: i32, y: i32| {
        elevation[((x + ox).rem_euclid(size) + (y + oz).rem_euclid(size) * size) as usize]
    };
    // Bilinear height at window-local coordinates
    let height = |x: f32, y: f32| {
        let (x, y) = (x.clamp(0.0, last), y.clamp(0.0, last));
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let (ix, iy) = (x0 as i32, y0 as i32);
        let low = texel(ix, iy) * (1.0 - fx) + texel(ix + 1, iy) * fx;
        let high = texel(ix, iy + 1) * (1.0 - fx) + texel(ix + 1, iy + 1) * fx;
        low * (1.0 - fy) + high * fy
    };

    let local = |t: u32, offset: i32| (t as f32 * 0.5 - offset as f32).rem_euclid(size as f32);
    let (lx, lz) = (local(u, ox), local(v, oz));
    let factor = params.height_scale / params.grid_scale;
    let slope = |a: f32, b: f32, h: &dyn Fn(f32) -> f32| {
        let (a, b) = (a.max(0.0), b.min(last));
        (h(b) - h(a)) / (b - a)
    };
    let dhdx = slope(lx - 0.5, lx + 0.5, &|x| height(x, lz)) * factor;
    let dhdz = slope(lz - 0.5, lz + 0.5, &|z| height(lx, z)) * factor;
    let n = glam::Vec3::new(-dhdx, 1.0, -dhdz).normalize();
    [n.x, n.y, n.z, 1.0]
}

/// In-memory texture arrays
#[derive(Debug, Default)]
pub struct CpuTerrainBackend {
    texture_size: u32,
    elevation: Vec<Vec<f32>>,
    normals: Vec<Vec<[f32; 4]>>,
    texels_written: usize,
    writes: usize,
    normal_updates: usize,
}

impl CpuTerrainBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    pub fn layers(&self) -> u32 {
        self.elevation.len() as u32
    }

    /// Row-major texels of one elevation layer
    pub fn elevation_layer(&self, layer: u32) -> &[f32] {
        &self.elevation[layer as usize]
    }

    pub fn elevation(&self, layer: u32, x: u32, y: u32) -> f32 {
        self.elevation[layer as usize][(x + y * self.texture_size) as usize]
    }

    pub fn normal_layer(&self, layer: u32) -> &[[f32; 4]] {
        &self.normals[layer as usize]
    }

    pub fn normal(&self, layer: u32, x: u32, y: u32) -> [f32; 4] {
        self.normals[layer as usize][(x + y * 2 * self.texture_size) as usize]
    }

    /// Texels written since the last [`reset_counters`](Self::reset_counters)
    pub fn texels_written(&self) -> usize {
        self.texels_written
    }

    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn normal_update_count(&self) -> usize {
        self.normal_updates
    }

    pub fn reset_counters(&mut self) {
        self.texels_written = 0;
        self.writes = 0;
        self.normal_updates = 0;
    }

    fn check_layer(&self, layer: u32) -> Result<()> {
        if layer as usize >= self.elevation.len() {
            return Err(Error::Gpu(format!(
                "texture layer {} out of range ({} allocated)",
                layer,
                self.elevation.len()
            )));
        }
        Ok(())
    }
}

impl TerrainTextures for CpuTerrainBackend {
    fn allocate(&mut self, texture_size: u32, layers: u32) -> Result<()> {
        if texture_size == 0 || layers == 0 {
            return Err(Error::Gpu(format!(
                "cannot allocate {} layers of {}x{}",
                layers, texture_size, texture_size
            )));
        }
        let texels = texture_size as usize * texture_size as usize;
        self.texture_size = texture_size;
        self.elevation = vec![vec![0.0; texels]; layers as usize];
        self.normals = vec![vec![[0.0, 1.0, 0.0, 1.0]; texels * 4]; layers as usize];
        self.reset_counters();
        Ok(())
    }

    fn write_elevation(&mut self, layer: u32, rect: TexelRect, data: &[f32]) -> Result<()> {
        self.check_layer(layer)?;
        if rect.x + rect.width > self.texture_size || rect.y + rect.height > self.texture_size {
            return Err(Error::Gpu(format!("elevation write {:?} outside {}²", rect, self.texture_size)));
        }
        if data.len() != rect.area() {
            return Err(Error::Gpu(format!(
                "elevation write {:?} needs {} texels, got {}",
                rect,
                rect.area(),
                data.len()
            )));
        }

        let size = self.texture_size as usize;
        let target = &mut self.elevation[layer as usize];
        for (row, line) in data.chunks(rect.width.max(1) as usize).enumerate() {
            let start = rect.x as usize + (rect.y as usize + row) * size;
            target[start..start + line.len()].copy_from_slice(line);
        }
        self.texels_written += data.len();
        self.writes += 1;
        Ok(())
    }

    fn update_normals(&mut self, params: &NormalParams) -> Result<()> {
        self.check_layer(params.layer)?;
        let size = self.texture_size;
        let normal_size = size * 2;
        let elevation = &self.elevation[params.layer as usize];
        let normals = &mut self.normals[params.layer as usize];
        for v in 0..normal_size {
            for u in 0..normal_size {
                normals[(u + v * normal_size) as usize] =
                    compute_normal(elevation, params, u, v);
            }
        }
        self.normal_updates += 1;
        Ok(())
    }
}

/// One recorded draw
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawCall {
    pub mesh: MeshKind,
    pub params: DrawParams,
}

/// Renderer that keeps the draws of the last frame for inspection
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    frame: Option<FrameParams>,
    draws: Vec<DrawCall>,
    meshes_uploaded: bool,
    frames: usize,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> Option<&FrameParams> {
        self.frame.as_ref()
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn meshes_uploaded(&self) -> bool {
        self.meshes_uploaded
    }

    /// Draws issued for one level
    pub fn draws_for_layer(&self, layer: u32) -> impl Iterator<Item = &DrawCall> {
        self.draws.iter().filter(move |d| d.params.layer == layer)
    }

    /// Distinct levels drawn this frame, ascending
    pub fn layers_drawn(&self) -> Vec<u32> {
        let mut layers: Vec<u32> = self.draws.iter().map(|d| d.params.layer).collect();
        layers.dedup();
        layers
    }
}

impl TerrainRenderer for RecordingRenderer {
    fn upload_meshes(&mut self, _meshes: &ClipMapMeshes) -> Result<()> {
        self.meshes_uploaded = true;
        Ok(())
    }

    fn begin_frame(&mut self, frame: &FrameParams) -> Result<()> {
        self.frame = Some(*frame);
        self.draws.clear();
        Ok(())
    }

    fn draw(&mut self, mesh: MeshKind, params: &DrawParams) {
        self.draws.push(DrawCall { mesh, params: *params });
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}
