//! Geometric clipmap terrain.
//!
//! `num_levels` nested grids of `level_size²` vertices follow the observer,
//! each level twice as coarse as the one inside it. Elevations live in a
//! texture array with one `T × T` layer per level (`T = level_size + 1`)
//! addressed as a torus: grid cell `(x, z)` of a level is always stored at
//! texel `(x mod T, z mod T)`, so when a level moves only the newly exposed
//! strips are sampled and uploaded.

pub mod backend;
pub mod level;
pub mod mesh;

pub use backend::{
    CpuTerrainBackend, DrawCall, DrawParams, FrameParams, NormalParams, RecordingRenderer,
    TerrainRenderer, TerrainTextures, TexelRect,
};
pub use level::{ClipMapLevel, Orientation};
pub use mesh::{ClipMapMeshes, Mesh, MeshKind};

use glam::{IVec2, Vec2, Vec3};
use serde::Serialize;

use crate::config::ClipMapConfig;
use crate::core::types::Result;
use crate::math::{Aabb, Culler};

use super::heightmap::{GridRect, HeightMap, HeightSource};

/// Counters for the last update and render
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClipMapStats {
    pub levels_shifted: u32,
    pub full_refreshes: u32,
    pub partial_strips: u32,
    pub texels_uploaded: u64,
    pub normal_layers_updated: u32,
    pub draws: u32,
    pub culled: u32,
}

/// Clipmap terrain over a height source
#[derive(Clone, Debug)]
pub struct ClipMap<H: HeightSource = HeightMap> {
    config: ClipMapConfig,
    height: H,
    levels: Vec<ClipMapLevel>,
    meshes: ClipMapMeshes,
    texture_size: u32,
    min_level: u32,
    observer: Vec3,
    placed: bool,
    stats: ClipMapStats,
}

impl<H: HeightSource> ClipMap<H> {
    /// Build the levels and meshes and allocate the texture arrays.
    ///
    /// Fails with `InvalidLevelSize` unless `level_size` is `2^k - 1` and at
    /// least 7.
    pub fn new<T>(config: ClipMapConfig, height: H, textures: &mut T) -> Result<Self>
    where
        T: TerrainTextures + ?Sized,
    {
        config.validate()?;
        let texture_size = config.level_size + 1;
        textures.allocate(texture_size, config.num_levels)?;

        let meshes = ClipMapMeshes::build(config.level_size);
        let local_boxes = meshes.local_boxes();
        let height_scale = height.get_scale_factor();
        let levels = (0..config.num_levels)
            .map(|i| ClipMapLevel::new(i, config.level_size, &local_boxes, height_scale))
            .collect();

        log::info!(
            "Clipmap: {} levels of {}x{} vertices, {}x{} elevation layers",
            config.num_levels,
            config.level_size,
            config.level_size,
            texture_size,
            texture_size
        );

        Ok(Self {
            config,
            height,
            levels,
            meshes,
            texture_size,
            min_level: 0,
            observer: Vec3::ZERO,
            placed: false,
            stats: ClipMapStats::default(),
        })
    }

    pub fn config(&self) -> &ClipMapConfig {
        &self.config
    }

    pub fn levels(&self) -> &[ClipMapLevel] {
        &self.levels
    }

    /// Finest level currently drawn
    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    pub fn meshes(&self) -> &ClipMapMeshes {
        &self.meshes
    }

    pub fn stats(&self) -> &ClipMapStats {
        &self.stats
    }

    pub fn observer(&self) -> Vec3 {
        self.observer
    }

    pub fn height_source(&self) -> &H {
        &self.height
    }

    /// Mutable height source; call [`invalidate`](Self::invalidate) after editing it.
    pub fn height_source_mut(&mut self) -> &mut H {
        &mut self.height
    }

    /// Terrain elevation in world units under `(x, z)`
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.height.get_elevation(x, z, 0)
    }

    /// Force every layer to be re-uploaded on the next update
    pub fn invalidate(&mut self) {
        for level in &mut self.levels {
            level.invalidate();
        }
    }

    /// Re-centre every level on `position` without moving through the
    /// intermediate positions. The next update re-uploads every layer.
    pub fn teleport(&mut self, position: Vec3) {
        self.place_levels(position);
        self.observer = position;
        self.placed = true;
        self.update_min_level();
    }

    /// Follow the observer: shift levels, refresh the exposed texture strips
    /// and the affected normal layers.
    pub fn update<T>(&mut self, observer: Vec3, textures: &mut T) -> Result<()>
    where
        T: TerrainTextures + ?Sized,
    {
        self.stats = ClipMapStats::default();

        if self.placed {
            self.update_levels(observer);
        } else {
            self.place_levels(observer);
            self.placed = true;
        }
        self.observer = observer;
        self.update_min_level();

        if let Some(max_index) = self.update_elevation_maps(textures)? {
            self.update_normal_maps(max_index, textures)?;
        }

        log::debug!(
            "Clipmap update: min level {}, {} levels shifted, {} full / {} partial uploads, {} texels",
            self.min_level,
            self.stats.levels_shifted,
            self.stats.full_refreshes,
            self.stats.partial_strips,
            self.stats.texels_uploaded
        );
        Ok(())
    }

    /// Hand the shared meshes to a renderer; needed once per renderer
    pub fn upload_meshes<R>(&self, renderer: &mut R) -> Result<()>
    where
        R: TerrainRenderer + ?Sized,
    {
        renderer.upload_meshes(&self.meshes)
    }

    /// Emit the draws for every visible level, finest first.
    ///
    /// Culling is applied only when enabled in the config and a culler is
    /// given.
    pub fn render<R>(&mut self, renderer: &mut R, culler: Option<&dyn Culler>) -> Result<()>
    where
        R: TerrainRenderer + ?Sized,
    {
        let culler = culler.filter(|_| self.config.culling);
        let num_levels = self.levels.len() as u32;
        let texture_size = self.texture_size;

        renderer.begin_frame(&FrameParams {
            observer: self.observer.to_array(),
            height_scale: self.height.get_scale_factor(),
            level_size: self.config.level_size,
            texture_size,
            num_levels,
            min_level: self.min_level,
        })?;

        let block_offsets = self.meshes.block_offsets();
        let inner_offsets = self.meshes.inner_offsets();
        let mut draws = 0;
        let mut culled = 0;
        let mut emit = |renderer: &mut R, aabb: &Aabb, mesh: MeshKind, params: DrawParams| {
            if culler.is_some_and(|c| c.is_clipped(aabb)) {
                culled += 1;
            } else {
                renderer.draw(mesh, &params);
                draws += 1;
            }
        };

        for i in self.min_level as usize..self.levels.len() {
            let level = &self.levels[i];
            // Torus texel of this level's origin inside the parent layer
            let parent_offset = if i + 1 < self.levels.len() {
                (level.origin() / 2).rem_euclid(IVec2::splat(texture_size as i32))
            } else {
                level.texture_offset(texture_size)
            };
            let base = DrawParams {
                origin: level.world_origin().to_array(),
                offset: [0.0; 2],
                texture_offset: level.texture_offset(texture_size).as_vec2().to_array(),
                parent_texture_offset: parent_offset.as_vec2().to_array(),
                scale: level.scale(),
                blend: 1.0 - i as f32 / num_levels as f32,
                layer: i as u32,
                _pad: 0,
            };
            let at = |offset: Vec2| DrawParams { offset: offset.to_array(), ..base };
            let bounds = level.bounds();

            if i == self.min_level as usize {
                for (q, offset) in inner_offsets.iter().enumerate() {
                    emit(renderer, level.inner_box(q), MeshKind::Inner, at(*offset));
                }
            } else {
                let child = self.levels[i - 1].orientation();
                emit(renderer, &bounds, MeshKind::Fill(child), base);
            }

            for (b, offset) in block_offsets.iter().enumerate() {
                emit(renderer, level.block_box(b), MeshKind::Block, at(*offset));
            }
            emit(renderer, &bounds, MeshKind::Ring, base);
            if self.config.perimeter_stitching && i + 1 < self.levels.len() {
                emit(renderer, &bounds, MeshKind::Perimeter, base);
            }
        }

        self.stats.draws = draws;
        self.stats.culled = culled;
        renderer.end_frame()
    }

    /// Place every level around `position` from scratch
    fn place_levels(&mut self, position: Vec3) {
        let m = self.meshes.block_size() as i32;
        let s0 = self.levels[0].scale();
        let cell = (Vec2::new(position.x, position.z) / s0).floor().as_ivec2();
        let origin = even_floor(cell - IVec2::splat(2 * m - 1));
        self.levels[0].place(origin);

        for i in 1..self.levels.len() {
            // child = 2 * parent + 2 * (m - 1 + b)
            let h = self.levels[i - 1].origin() / 2 - IVec2::splat(m - 1);
            let b = h.rem_euclid(IVec2::splat(2));
            self.levels[i - 1].set_orientation(Orientation::from_offsets(b));
            self.levels[i].place(h - b);
        }
    }

    /// Shift the finest level towards the observer and ripple the shift
    /// outwards. A level only moves when its child's offset inside it wraps
    /// past the second parent cell.
    fn update_levels(&mut self, observer: Vec3) {
        let finest = &self.levels[0];
        let delta = Vec2::new(observer.x, observer.z) - finest.center();
        let mut steps = (delta / (2.0 * finest.scale())).trunc().as_ivec2();

        let count = self.levels.len();
        for i in 0..count {
            if steps == IVec2::ZERO {
                break;
            }
            self.levels[i].translate(steps, self.texture_size);
            self.stats.levels_shifted += 1;
            if i + 1 == count {
                break;
            }
            let total = self.levels[i].orientation().offsets() + steps;
            let bits = total.rem_euclid(IVec2::splat(2));
            self.levels[i].set_orientation(Orientation::from_offsets(bits));
            steps = IVec2::new(total.x.div_euclid(2), total.y.div_euclid(2));
        }
    }

    /// Skip levels that are too fine to matter at the observer's altitude
    fn update_min_level(&mut self) {
        let ground = self.height.get_elevation(self.observer.x, self.observer.z, 0);
        let altitude = (self.observer.y - ground).max(0.0);
        let threshold = self.config.lod_altitude_factor * altitude;

        let mut min_level = 0;
        while min_level + 1 < self.levels.len() && self.levels[min_level].width() < threshold {
            min_level += 1;
        }
        if min_level as u32 != self.min_level {
            log::debug!("Clipmap min level {} -> {}", self.min_level, min_level);
        }
        self.min_level = min_level as u32;
    }

    /// Upload whatever each dirty level needs; returns the highest level
    /// touched.
    fn update_elevation_maps<T>(&mut self, textures: &mut T) -> Result<Option<usize>>
    where
        T: TerrainTextures + ?Sized,
    {
        let size = self.texture_size as i32;
        let mut max_index = None;

        for i in 0..self.levels.len() {
            let level = &self.levels[i];
            if !level.is_dirty() {
                continue;
            }
            let origin = level.origin();

            if level.needs_full_refresh() {
                self.upload_region(i, origin, IVec2::splat(size), textures)?;
                self.stats.full_refreshes += 1;
            } else {
                let cells = level.last_shift() * 2;
                let far = origin + IVec2::splat(size);

                if cells.x != 0 {
                    let x = if cells.x > 0 { far.x - cells.x } else { origin.x };
                    let start = IVec2::new(x, origin.y);
                    self.upload_region(i, start, IVec2::new(cells.x.abs(), size), textures)?;
                    self.stats.partial_strips += 1;
                }
                if cells.y != 0 {
                    let x = if cells.x > 0 { origin.x } else { origin.x - cells.x };
                    let z = if cells.y > 0 { far.y - cells.y } else { origin.y };
                    let extent = IVec2::new(size - cells.x.abs(), cells.y.abs());
                    self.upload_region(i, IVec2::new(x, z), extent, textures)?;
                    self.stats.partial_strips += 1;
                }
            }

            self.levels[i].mark_clean();
            max_index = Some(i);
        }
        Ok(max_index)
    }

    /// Sample grid cells `[start, start + extent)` of level `index` and write
    /// them to their torus texels, splitting at the wrap boundary.
    fn upload_region<T>(&mut self, index: usize, start: IVec2, extent: IVec2, textures: &mut T) -> Result<()>
    where
        T: TerrainTextures + ?Sized,
    {
        if extent.x <= 0 || extent.y <= 0 {
            return Ok(());
        }
        let size = self.texture_size as i32;
        let texel = start.rem_euclid(IVec2::splat(size));
        let split = (IVec2::splat(size) - texel).min(extent);

        let xs = [(start.x, texel.x, split.x), (start.x + split.x, 0, extent.x - split.x)];
        let zs = [(start.y, texel.y, split.y), (start.y + split.y, 0, extent.y - split.y)];

        let mut buffer = Vec::new();
        for &(cz, tz, rows) in zs.iter().filter(|z| z.2 > 0) {
            for &(cx, tx, cols) in xs.iter().filter(|x| x.2 > 0) {
                let cells = GridRect::new(cx, cz, cols as u32, rows as u32);
                buffer.resize(cells.area(), 0.0);
                sample_cells(&self.height, index, cells, &mut buffer);

                let rect = TexelRect::new(tx as u32, tz as u32, cols as u32, rows as u32);
                log::trace!("Clipmap level {} upload {:?} -> {:?}", index, cells, rect);
                textures.write_elevation(index as u32, rect, &buffer)?;
                self.stats.texels_uploaded += buffer.len() as u64;
            }
        }
        Ok(())
    }

    fn update_normal_maps<T>(&mut self, max_index: usize, textures: &mut T) -> Result<()>
    where
        T: TerrainTextures + ?Sized,
    {
        let height_scale = self.height.get_scale_factor();
        for level in &self.levels[..=max_index] {
            textures.update_normals(&NormalParams {
                layer: level.index(),
                texture_size: self.texture_size,
                grid_scale: level.scale(),
                height_scale,
                texture_offset: level.texture_offset(self.texture_size).as_uvec2().to_array(),
                _pad: [0; 2],
            })?;
            self.stats.normal_layers_updated += 1;
        }
        Ok(())
    }
}

/// Round each component down to an even number
fn even_floor(v: IVec2) -> IVec2 {
    v - v.rem_euclid(IVec2::splat(2))
}

/// Read level-`level` grid cells from the height source. Clipmap levels
/// coarser than the source's last level sample that level with a stride.
fn sample_cells<H: HeightSource + ?Sized>(height: &H, level: usize, cells: GridRect, out: &mut [f32]) {
    let last = height.num_levels().saturating_sub(1);
    if level <= last {
        height.get_data(level, cells, out);
        return;
    }

    let source = height.get_level(last);
    let stride = 1i64 << (level - last);
    let size = source.size() as i64;
    let width = cells.width as usize;
    for (row, line) in out.chunks_mut(width).take(cells.height as usize).enumerate() {
        let y = ((cells.y as i64 + row as i64) * stride).rem_euclid(size) as i32;
        for (col, value) in line.iter_mut().enumerate() {
            let x = ((cells.x as i64 + col as i64) * stride).rem_euclid(size) as i32;
            *value = source.get(x, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::terrain::generator::diamond_square;

    struct ClipAll;

    impl Culler for ClipAll {
        fn is_clipped(&self, _aabb: &Aabb) -> bool {
            true
        }
    }

    /// Clips everything whose box lies entirely at x < 0
    struct ClipNegativeX;

    impl Culler for ClipNegativeX {
        fn is_clipped(&self, aabb: &Aabb) -> bool {
            aabb.max.x < 0.0
        }
    }

    fn terrain() -> HeightMap {
        HeightMap::from_heights(diamond_square(64, 0.6, 99), 16.0).unwrap()
    }

    fn clipmap(levels: u32, size: u32, backend: &mut CpuTerrainBackend) -> ClipMap {
        ClipMap::new(ClipMapConfig::new(levels, size), terrain(), backend).unwrap()
    }

    /// Fully rebuild a copy of `map` at its current origins into a new backend
    fn rebuilt(map: &ClipMap) -> CpuTerrainBackend {
        let mut fresh = CpuTerrainBackend::new();
        fresh.allocate(map.texture_size(), map.levels().len() as u32).unwrap();
        let mut copy = map.clone();
        copy.invalidate();
        copy.update(map.observer(), &mut fresh).unwrap();
        for (a, b) in copy.levels().iter().zip(map.levels()) {
            assert_eq!(a.origin(), b.origin());
        }
        fresh
    }

    fn assert_nested(map: &ClipMap) {
        let m = map.meshes().block_size() as i32;
        for pair in map.levels().windows(2) {
            let (child, parent) = (&pair[0], &pair[1]);
            let b = child.orientation().offsets();
            assert_eq!(
                child.origin(),
                parent.origin() * 2 + (IVec2::splat(m - 1) + b) * 2,
                "level {} not nested in level {}",
                child.index(),
                parent.index()
            );
        }
        for level in map.levels() {
            assert_eq!(level.origin().rem_euclid(IVec2::splat(2)), IVec2::ZERO);
        }
    }

    #[test]
    fn test_rejects_bad_level_size() {
        let mut backend = CpuTerrainBackend::new();
        let result = ClipMap::new(ClipMapConfig::new(4, 64), terrain(), &mut backend);
        assert!(matches!(result, Err(Error::InvalidLevelSize(64))));
        let result = ClipMap::new(ClipMapConfig::new(4, 3), terrain(), &mut backend);
        assert!(matches!(result, Err(Error::InvalidLevelSize(3))));
    }

    #[test]
    fn test_level_scales_nest() {
        let mut backend = CpuTerrainBackend::new();
        let map = clipmap(5, 31, &mut backend);
        assert_eq!(map.texture_size(), 32);
        assert_eq!(backend.layers(), 5);
        assert_eq!(map.levels()[0].scale(), 1.0);
        for pair in map.levels().windows(2) {
            assert_eq!(pair[1].scale(), 2.0 * pair[0].scale());
            assert_eq!(pair[1].width(), pair[1].scale() * 30.0);
        }
    }

    #[test]
    fn test_first_update_centres_levels_and_uploads_everything() {
        crate::core::logging::init_test();
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(3, 15, &mut backend);
        let observer = Vec3::new(100.3, 5.0, -37.8);
        map.update(observer, &mut backend).unwrap();

        assert_nested(&map);
        for level in map.levels() {
            let d = (Vec2::new(observer.x, observer.z) - level.center()).abs();
            assert!(d.max_element() <= 2.0 * level.scale(), "level {} centred at {}", level.index(), level.center());
            assert!(!level.is_dirty());
        }
        let stats = map.stats();
        assert_eq!(stats.full_refreshes, 3);
        assert_eq!(stats.texels_uploaded, 3 * 16 * 16);
        assert_eq!(stats.normal_layers_updated, 3);
    }

    #[test]
    fn test_torus_updates_match_full_rebuild() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(3, 15, &mut backend);

        let moves = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.5, 0.0),
            Vec2::new(3.0, 1.0),
            Vec2::new(-4.0, 7.5),
            Vec2::new(-9.0, -6.0),
            Vec2::new(0.6, 13.0),
            Vec2::new(21.0, -2.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(-30.0, 4.0),
            Vec2::new(5.0, -25.0),
        ];
        let mut position = Vec3::new(7.0, 1.0, -3.0);
        for (frame, step) in moves.iter().enumerate() {
            position += Vec3::new(step.x, 0.0, step.y);
            map.update(position, &mut backend).unwrap();
            assert_nested(&map);

            let fresh = rebuilt(&map);
            for layer in 0..3 {
                assert_eq!(
                    backend.elevation_layer(layer),
                    fresh.elevation_layer(layer),
                    "elevation layer {} differs after move {}",
                    layer,
                    frame
                );
                assert_eq!(
                    backend.normal_layer(layer),
                    fresh.normal_layer(layer),
                    "normal layer {} differs after move {}",
                    layer,
                    frame
                );
            }
        }
    }

    #[test]
    fn test_single_step_uploads_strips_only() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(3, 15, &mut backend);
        map.update(Vec3::new(0.5, 0.0, 0.5), &mut backend).unwrap();
        backend.reset_counters();

        map.update(Vec3::new(2.5, 0.0, 0.5), &mut backend).unwrap();
        let stats = *map.stats();
        assert_eq!(stats.full_refreshes, 0);
        assert!(stats.levels_shifted >= 1);
        assert!(stats.partial_strips >= 1);
        // Two columns of the finest layer, plus at most two per coarser level
        assert!(stats.texels_uploaded >= 2 * 16);
        assert!(stats.texels_uploaded <= 3 * 2 * 16);
        assert_eq!(backend.texels_written() as u64, stats.texels_uploaded);
    }

    #[test]
    fn test_small_moves_do_not_shift() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(3, 15, &mut backend);
        map.update(Vec3::new(0.5, 0.0, 0.5), &mut backend).unwrap();
        let origins: Vec<IVec2> = map.levels().iter().map(|l| l.origin()).collect();

        map.update(Vec3::new(0.9, 0.0, 0.2), &mut backend).unwrap();
        let after: Vec<IVec2> = map.levels().iter().map(|l| l.origin()).collect();
        assert_eq!(origins, after);
        assert_eq!(map.stats().texels_uploaded, 0);
        assert_eq!(map.stats().normal_layers_updated, 0);
    }

    #[test]
    fn test_orientation_flips_once_per_parent_cell() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(4, 15, &mut backend);
        map.update(Vec3::new(0.0, 0.0, 0.0), &mut backend).unwrap();

        for frame in 1..=40 {
            let before: Vec<(IVec2, Orientation)> =
                map.levels().iter().map(|l| (l.origin(), l.orientation())).collect();
            map.update(Vec3::new(2.0 * frame as f32, 0.0, 0.0), &mut backend).unwrap();
            assert_nested(&map);

            for (i, level) in map.levels().iter().enumerate().take(3) {
                let (origin, orientation) = before[i];
                let moved = (level.origin() - origin) / 2;
                assert!(moved.x.abs() <= 1, "level {} jumped {:?}", i, moved);
                assert_eq!(moved.y, 0);
                // x bit toggles exactly when the level moved a step
                assert_eq!(orientation.is_right() != level.orientation().is_right(), moved.x != 0);
                assert_eq!(orientation.is_top(), level.orientation().is_top());
            }
        }
    }

    #[test]
    fn test_draw_count_without_culling() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(4, 63, &mut backend);
        map.update(Vec3::new(10.0, 1.0, 10.0), &mut backend).unwrap();
        assert_eq!(map.min_level(), 0);

        let mut renderer = RecordingRenderer::new();
        map.render(&mut renderer, None).unwrap();
        assert_eq!(renderer.draws().len(), 18 + 15 + 15 + 14);
        assert_eq!(map.stats().draws, 62);
        assert_eq!(renderer.layers_drawn(), vec![0, 1, 2, 3]);

        let inner = renderer.draws().iter().filter(|d| d.mesh == MeshKind::Inner).count();
        let perimeter = renderer.draws().iter().filter(|d| d.mesh == MeshKind::Perimeter).count();
        assert_eq!(inner, 4);
        assert_eq!(perimeter, 3);

        let fill = renderer.draws_for_layer(1).find(|d| matches!(d.mesh, MeshKind::Fill(_))).unwrap();
        assert_eq!(fill.mesh, MeshKind::Fill(map.levels()[0].orientation()));
        assert_eq!(fill.params.blend, 0.75);
        assert_eq!(renderer.frame().unwrap().num_levels, 4);
    }

    #[test]
    fn test_parent_texture_offset_addresses_parent_layer() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(3, 15, &mut backend);
        map.update(Vec3::new(-41.0, 0.0, 77.0), &mut backend).unwrap();
        let mut renderer = RecordingRenderer::new();
        map.upload_meshes(&mut renderer).unwrap();
        assert!(renderer.meshes_uploaded());
        map.render(&mut renderer, None).unwrap();

        let t = map.texture_size() as i32;
        let ring = |layer: u32| renderer.draws_for_layer(layer).find(|d| d.mesh == MeshKind::Ring).unwrap().params;
        let level0 = &map.levels()[0];
        let expected = (level0.origin() / 2).rem_euclid(IVec2::splat(t));
        assert_eq!(ring(0).parent_texture_offset, expected.as_vec2().to_array());

        // That texel of layer 1 holds the parent's height under the child origin
        let parent = ring(0).parent_texture_offset;
        let cell = level0.origin() / 2;
        assert_eq!(
            backend.elevation(1, parent[0] as u32, parent[1] as u32),
            map.height_source().get_level(1).get(cell.x, cell.y)
        );

        let last = ring(2);
        assert_eq!(last.parent_texture_offset, last.texture_offset);
    }

    #[test]
    fn test_culling() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(4, 63, &mut backend);
        map.update(Vec3::new(0.0, 1.0, 0.0), &mut backend).unwrap();
        let mut renderer = RecordingRenderer::new();

        map.render(&mut renderer, Some(&ClipAll)).unwrap();
        assert!(renderer.draws().is_empty());
        assert_eq!(map.stats().culled, 62);

        map.render(&mut renderer, Some(&ClipNegativeX)).unwrap();
        assert!(map.stats().culled > 0);
        assert!(map.stats().draws > 0);
        assert_eq!(map.stats().draws + map.stats().culled, 62);
    }

    #[test]
    fn test_culling_disabled_in_config() {
        let mut backend = CpuTerrainBackend::new();
        let config = ClipMapConfig { culling: false, perimeter_stitching: false, ..ClipMapConfig::new(4, 63) };
        let mut map = ClipMap::new(config, terrain(), &mut backend).unwrap();
        map.update(Vec3::ZERO, &mut backend).unwrap();
        let mut renderer = RecordingRenderer::new();
        map.render(&mut renderer, Some(&ClipAll)).unwrap();
        assert_eq!(renderer.draws().len(), 62 - 3);
    }

    #[test]
    fn test_altitude_skips_fine_levels() {
        let mut backend = CpuTerrainBackend::new();
        let flat = HeightMap::new(64, 16.0).unwrap();
        let mut map = ClipMap::new(ClipMapConfig::new(4, 63), flat, &mut backend).unwrap();
        let mut renderer = RecordingRenderer::new();

        map.update(Vec3::new(0.0, 10.0, 0.0), &mut backend).unwrap();
        assert_eq!(map.min_level(), 0);
        map.render(&mut renderer, None).unwrap();
        assert_eq!(renderer.layers_drawn(), vec![0, 1, 2, 3]);

        // Level 0 is 62 wide; 2.5 * 30 = 75 exceeds it
        map.update(Vec3::new(0.0, 30.0, 0.0), &mut backend).unwrap();
        assert_eq!(map.min_level(), 1);
        map.render(&mut renderer, None).unwrap();
        assert_eq!(renderer.layers_drawn(), vec![1, 2, 3]);
        assert_eq!(renderer.draws_for_layer(1).filter(|d| d.mesh == MeshKind::Inner).count(), 4);
        assert_eq!(map.levels().len(), 4);
        assert_eq!(backend.layers(), 4);

        map.update(Vec3::new(0.0, 10_000.0, 0.0), &mut backend).unwrap();
        assert_eq!(map.min_level(), 3);
    }

    #[test]
    fn test_teleport_forces_full_refresh() {
        let mut backend = CpuTerrainBackend::new();
        let mut map = clipmap(3, 15, &mut backend);
        map.update(Vec3::ZERO, &mut backend).unwrap();

        let target = Vec3::new(5000.0, 0.0, -5000.0);
        map.teleport(target);
        map.update(target, &mut backend).unwrap();
        assert_eq!(map.stats().full_refreshes, 3);
        assert_eq!(map.stats().levels_shifted, 0);
        assert_nested(&map);
        let fresh = rebuilt(&map);
        assert_eq!(backend.elevation_layer(2), fresh.elevation_layer(2));
    }

    #[test]
    fn test_levels_past_heightmap_sample_with_stride() {
        // A 4x4 heightmap has 3 levels; clipmap level 4 strides the last one
        let mut finest = crate::terrain::heightmap::HeightLevel::new(4);
        finest.data_mut().iter_mut().enumerate().for_each(|(i, v)| *v = i as f32 / 16.0);
        let map = HeightMap::from_heights(finest, 1.0).unwrap();
        let mut out = [0.0; 2];
        sample_cells(&map, 4, GridRect::new(0, 0, 2, 1), &mut out);
        let last = map.get_level(2);
        assert_eq!(out, [last.get(0, 0), last.get(4, 0)]);
    }
}
