//! Static grid meshes shared by every clipmap level.
//!
//! With `n = level_size` vertices per side and block size `m = (n + 1) / 4`,
//! one level is laid out along each axis as
//!
//! ```text
//! | block m-1 | block m-1 | fix 2 | block m-1 | block m-1 |   = 4m - 2 = n - 1 cells
//! ```
//!
//! The outer ring of 12 blocks plus the four 2-cell fix-up strips leave a
//! central hole spanning cells `[m-1, 3m-1]`, which holds either the next
//! finer level plus an L-shaped fill, or four inner quadrant patches at the
//! finest visible level. Vertex positions are in cell units; blocks and
//! inner patches are positioned per draw, everything else is level-absolute.

use glam::Vec2;

use super::level::{Orientation, BLOCK_COUNT, INNER_BOXES};

/// Which shared mesh a draw uses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshKind {
    Inner,
    Block,
    Ring,
    Fill(Orientation),
    Perimeter,
}

/// Indexed triangle list over 2D grid positions
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append a `width × height` cell grid with its lower corner at `(x0, z0)`
    fn add_grid(&mut self, x0: u32, z0: u32, width: u32, height: u32) {
        let base = self.vertices.len() as u32;
        let stride = width + 1;
        for z in 0..=height {
            for x in 0..=width {
                self.vertices.push([(x0 + x) as f32, (z0 + z) as f32]);
            }
        }
        for z in 0..height {
            for x in 0..width {
                let i0 = base + z * stride + x;
                let i1 = i0 + 1;
                let i2 = i0 + stride;
                let i3 = i2 + 1;
                self.indices.extend_from_slice(&[i0, i2, i1, i1, i2, i3]);
            }
        }
    }

    fn add_vertex(&mut self, x: u32, z: u32) -> u32 {
        self.vertices.push([x as f32, z as f32]);
        self.vertices.len() as u32 - 1
    }
}

/// Every mesh a clipmap draws, built once per level size
#[derive(Clone, Debug)]
pub struct ClipMapMeshes {
    level_size: u32,
    block_size: u32,
    inner: Mesh,
    block: Mesh,
    ring: Mesh,
    fill: [Mesh; 4],
    perimeter: Mesh,
}

impl ClipMapMeshes {
    pub fn build(level_size: u32) -> Self {
        let m = (level_size + 1) / 4;
        let n = level_size;

        let mut inner = Mesh::default();
        inner.add_grid(0, 0, m, m);

        let mut block = Mesh::default();
        block.add_grid(0, 0, m - 1, m - 1);

        let mut ring = Mesh::default();
        ring.add_grid(2 * m - 2, 0, 2, m - 1);
        ring.add_grid(2 * m - 2, 3 * m - 1, 2, m - 1);
        ring.add_grid(0, 2 * m - 2, m - 1, 2);
        ring.add_grid(3 * m - 1, 2 * m - 2, m - 1, 2);

        let fill = Orientation::ALL.map(|child| Self::build_fill(m, child));

        // Degenerate triangles along the outer edge; they add no area but
        // close T-junction cracks against the coarser neighbour.
        let mut perimeter = Mesh::default();
        let last = n - 1;
        let edge = |points: &dyn Fn(u32) -> (u32, u32), mesh: &mut Mesh| {
            let mut i = 0;
            while i + 2 <= last {
                let (ax, az) = points(i);
                let (bx, bz) = points(i + 1);
                let (cx, cz) = points(i + 2);
                let a = mesh.add_vertex(ax, az);
                let b = mesh.add_vertex(bx, bz);
                let c = mesh.add_vertex(cx, cz);
                mesh.indices.extend_from_slice(&[a, b, c]);
                i += 2;
            }
        };
        edge(&|i| (i, 0), &mut perimeter);
        edge(&|i| (last, i), &mut perimeter);
        edge(&|i| (last - i, last), &mut perimeter);
        edge(&|i| (0, last - i), &mut perimeter);

        Self {
            level_size,
            block_size: m,
            inner,
            block,
            ring,
            fill,
            perimeter,
        }
    }

    /// L-shaped strip filling the one-cell gap left beside a finer level
    /// sitting in the given quadrant of the hole.
    fn build_fill(m: u32, child: Orientation) -> Mesh {
        let mut mesh = Mesh::default();
        let hole_min = m - 1;
        let hole_cells = 2 * m;

        let column = if child.is_right() { hole_min } else { 3 * m - 2 };
        mesh.add_grid(column, hole_min, 1, hole_cells);

        let row = if child.is_top() { hole_min } else { 3 * m - 2 };
        let row_start = if child.is_right() { hole_min + 1 } else { hole_min };
        mesh.add_grid(row_start, row, hole_cells - 1, 1);
        mesh
    }

    pub fn level_size(&self) -> u32 {
        self.level_size
    }

    /// Vertices per block side (`m`)
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn get(&self, kind: MeshKind) -> &Mesh {
        match kind {
            MeshKind::Inner => &self.inner,
            MeshKind::Block => &self.block,
            MeshKind::Ring => &self.ring,
            MeshKind::Fill(orientation) => &self.fill[orientation.index()],
            MeshKind::Perimeter => &self.perimeter,
        }
    }

    /// All meshes in a fixed order
    pub fn iter(&self) -> impl Iterator<Item = (MeshKind, &Mesh)> {
        [MeshKind::Inner, MeshKind::Block, MeshKind::Ring, MeshKind::Perimeter]
            .into_iter()
            .chain(Orientation::ALL.into_iter().map(MeshKind::Fill))
            .map(move |kind| (kind, self.get(kind)))
    }

    /// Cell offsets of the 12 ring blocks
    pub fn block_offsets(&self) -> [Vec2; BLOCK_COUNT] {
        let m = self.block_size;
        let steps = [0, m - 1, 2 * m, 3 * m - 1];
        let mut offsets = [Vec2::ZERO; BLOCK_COUNT];
        let mut k = 0;
        for (j, &z) in steps.iter().enumerate() {
            for (i, &x) in steps.iter().enumerate() {
                if (1..=2).contains(&i) && (1..=2).contains(&j) {
                    continue;
                }
                offsets[k] = Vec2::new(x as f32, z as f32);
                k += 1;
            }
        }
        offsets
    }

    /// Cell offsets of the four inner quadrant patches
    pub fn inner_offsets(&self) -> [Vec2; INNER_BOXES] {
        let m = self.block_size as f32;
        let lo = m - 1.0;
        [
            Vec2::new(lo, lo),
            Vec2::new(lo + m, lo),
            Vec2::new(lo, lo + m),
            Vec2::new(lo + m, lo + m),
        ]
    }

    /// Level-local (min, max) cell extents of the inner patches then blocks
    pub fn local_boxes(&self) -> [(Vec2, Vec2); INNER_BOXES + BLOCK_COUNT] {
        let inner_extent = Vec2::splat(self.block_size as f32);
        let block_extent = Vec2::splat(self.block_size as f32 - 1.0);

        let mut boxes = [(Vec2::ZERO, Vec2::ZERO); INNER_BOXES + BLOCK_COUNT];
        for (slot, offset) in boxes.iter_mut().zip(self.inner_offsets()) {
            *slot = (offset, offset + inner_extent);
        }
        for (slot, offset) in boxes[INNER_BOXES..].iter_mut().zip(self.block_offsets()) {
            *slot = (offset, offset + block_extent);
        }
        boxes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Cells covered by `mesh` placed at `offset`, keyed by lower corner
    fn covered_cells(mesh: &Mesh, offset: Vec2, cells: &mut Vec<(i32, i32)>) {
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec2::from(mesh.vertices[i as usize]) + offset);
            let min = a.min(b).min(c);
            let max = a.max(b).max(c);
            let area = (b - a).perp_dot(c - a).abs();
            if area == 0.0 {
                continue;
            }
            assert_eq!(max - min, Vec2::ONE, "triangles span one cell");
            cells.push((min.x as i32, min.y as i32));
        }
    }

    #[test]
    fn test_block_layout() {
        let meshes = ClipMapMeshes::build(63);
        assert_eq!(meshes.block_size(), 16);
        let offsets = meshes.block_offsets();
        assert_eq!(offsets[0], Vec2::ZERO);
        assert_eq!(offsets[11], Vec2::new(47.0, 47.0));
        assert_eq!(meshes.get(MeshKind::Block).vertices.len(), 16 * 16);
    }

    #[test]
    fn test_ring_blocks_and_inner_tile_level_exactly() {
        let meshes = ClipMapMeshes::build(31);
        let mut cells = Vec::new();
        for offset in meshes.block_offsets() {
            covered_cells(meshes.get(MeshKind::Block), offset, &mut cells);
        }
        covered_cells(meshes.get(MeshKind::Ring), Vec2::ZERO, &mut cells);
        for offset in meshes.inner_offsets() {
            covered_cells(meshes.get(MeshKind::Inner), offset, &mut cells);
        }

        // Two triangles per cell, each cell exactly once
        let unique: HashSet<_> = cells.iter().copied().collect();
        assert_eq!(cells.len(), 2 * unique.len());
        assert_eq!(unique.len(), 30 * 30);
        assert!(unique.iter().all(|&(x, z)| (0..30).contains(&x) && (0..30).contains(&z)));
    }

    #[test]
    fn test_fill_closes_gap_around_child() {
        let meshes = ClipMapMeshes::build(31);
        let m = 8;
        for child in Orientation::ALL {
            let mut cells = Vec::new();
            covered_cells(meshes.get(MeshKind::Fill(child)), Vec2::ZERO, &mut cells);
            let fill: HashSet<_> = cells.iter().copied().collect();
            assert_eq!(cells.len(), 2 * fill.len());

            // Child covers 2m - 1 parent cells starting one cell in when offset
            let cx = m - 1 + child.offsets().x;
            let cz = m - 1 + child.offsets().y;
            let mut hole = HashSet::new();
            for z in (m - 1)..(3 * m - 1) {
                for x in (m - 1)..(3 * m - 1) {
                    let in_child = (cx..cx + 2 * m - 1).contains(&x) && (cz..cz + 2 * m - 1).contains(&z);
                    if !in_child {
                        hole.insert((x, z));
                    }
                }
            }
            assert_eq!(fill, hole, "fill for {:?}", child);
        }
    }

    #[test]
    fn test_perimeter_is_degenerate() {
        let meshes = ClipMapMeshes::build(15);
        let perimeter = meshes.get(MeshKind::Perimeter);
        // (n - 1) / 2 triangles per edge
        assert_eq!(perimeter.triangle_count(), 4 * 7);
        let mut cells = Vec::new();
        covered_cells(perimeter, Vec2::ZERO, &mut cells);
        assert!(cells.is_empty());
    }

    #[test]
    fn test_iter_covers_all_meshes() {
        let meshes = ClipMapMeshes::build(15);
        assert_eq!(meshes.iter().count(), 8);
    }
}
