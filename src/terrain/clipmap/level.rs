//! One nested ring of the clipmap

use glam::{IVec2, Vec2, Vec3};

use crate::math::Aabb;

/// Quadrant of its parent's central hole that a level occupies.
///
/// A level is always offset by one parent cell from one side of the hole
/// on each axis; the remaining one-cell L-shaped gap is closed by the
/// parent's fill mesh. `Left`/`Right` is the x axis, `Bottom`/`Top` is z.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Orientation {
    #[default]
    BottomLeft,
    BottomRight,
    TopLeft,
    TopRight,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::BottomLeft,
        Orientation::BottomRight,
        Orientation::TopLeft,
        Orientation::TopRight,
    ];

    pub fn from_sides(right: bool, top: bool) -> Self {
        match (right, top) {
            (false, false) => Orientation::BottomLeft,
            (true, false) => Orientation::BottomRight,
            (false, true) => Orientation::TopLeft,
            (true, true) => Orientation::TopRight,
        }
    }

    /// Offset bits (0 or 1 parent cells) on x and z
    pub fn from_offsets(offsets: IVec2) -> Self {
        Self::from_sides(offsets.x != 0, offsets.y != 0)
    }

    pub fn is_right(self) -> bool {
        matches!(self, Orientation::BottomRight | Orientation::TopRight)
    }

    pub fn is_top(self) -> bool {
        matches!(self, Orientation::TopLeft | Orientation::TopRight)
    }

    pub fn offsets(self) -> IVec2 {
        IVec2::new(self.is_right() as i32, self.is_top() as i32)
    }

    pub fn flipped_x(self) -> Self {
        Self::from_sides(!self.is_right(), self.is_top())
    }

    pub fn flipped_z(self) -> Self {
        Self::from_sides(self.is_right(), !self.is_top())
    }

    /// Index into the fill mesh table
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Number of inner quadrant boxes; block boxes follow them
pub const INNER_BOXES: usize = 4;
pub const BLOCK_COUNT: usize = 12;

/// A single level of detail.
///
/// `origin` is the lower corner in this level's own cell units, so the
/// world-space corner is `origin * scale`. Origins only ever move in steps
/// of two cells (one parent cell) and stay even.
#[derive(Clone, Debug)]
pub struct ClipMapLevel {
    index: u32,
    scale: f32,
    width: f32,
    origin: IVec2,
    orientation: Orientation,
    /// World-space boxes: 4 inner quadrants then 12 blocks
    bounding_boxes: [Aabb; INNER_BOXES + BLOCK_COUNT],
    dirty: bool,
    full_refresh: bool,
    last_shift: IVec2,
}

impl ClipMapLevel {
    /// Create a level whose boxes are laid out from `local_boxes`
    /// (level-local cell units, x/z only).
    pub(crate) fn new(
        index: u32,
        level_size: u32,
        local_boxes: &[(Vec2, Vec2); INNER_BOXES + BLOCK_COUNT],
        height_scale: f32,
    ) -> Self {
        let scale = (1u32 << index) as f32;
        let mut bounding_boxes = [Aabb::default(); INNER_BOXES + BLOCK_COUNT];
        for (aabb, (min, max)) in bounding_boxes.iter_mut().zip(local_boxes) {
            *aabb = Aabb::new(
                Vec3::new(min.x * scale, 0.0, min.y * scale),
                Vec3::new(max.x * scale, height_scale, max.y * scale),
            );
        }

        Self {
            index,
            scale,
            width: scale * (level_size - 1) as f32,
            origin: IVec2::ZERO,
            orientation: Orientation::default(),
            bounding_boxes,
            dirty: true,
            full_refresh: true,
            last_shift: IVec2::ZERO,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// World units between adjacent vertices
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// World-space side length of the level's grid
    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn origin(&self) -> IVec2 {
        self.origin
    }

    pub fn world_origin(&self) -> Vec2 {
        self.origin.as_vec2() * self.scale
    }

    /// World-space centre of the grid
    pub fn center(&self) -> Vec2 {
        self.world_origin() + Vec2::splat(self.width * 0.5)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Steps (of two cells) accumulated since the last texture refresh
    pub fn last_shift(&self) -> IVec2 {
        self.last_shift
    }

    pub fn bounding_boxes(&self) -> &[Aabb; INNER_BOXES + BLOCK_COUNT] {
        &self.bounding_boxes
    }

    pub fn inner_box(&self, quadrant: usize) -> &Aabb {
        &self.bounding_boxes[quadrant]
    }

    pub fn block_box(&self, block: usize) -> &Aabb {
        &self.bounding_boxes[INNER_BOXES + block]
    }

    /// Union of all boxes
    pub fn bounds(&self) -> Aabb {
        self.bounding_boxes[1..]
            .iter()
            .fold(self.bounding_boxes[0], |acc, b| acc.merged(b))
    }

    /// Torus offset of the origin inside a `texture_size` texture
    pub fn texture_offset(&self, texture_size: u32) -> IVec2 {
        self.origin.rem_euclid(IVec2::splat(texture_size as i32))
    }

    /// Move the origin by `steps` (two cells each) and mark the level dirty.
    ///
    /// The bounding boxes are translated, not rebuilt.
    pub(crate) fn translate(&mut self, steps: IVec2, texture_size: u32) {
        if steps == IVec2::ZERO {
            return;
        }
        let cells = steps * 2;
        self.origin += cells;
        let offset = cells.as_vec2() * self.scale;
        for aabb in &mut self.bounding_boxes {
            aabb.translate(Vec3::new(offset.x, 0.0, offset.y));
        }

        self.last_shift += steps;
        self.dirty = true;
        let exposed = self.last_shift.abs() * 2;
        if exposed.max_element() >= texture_size as i32 {
            self.full_refresh = true;
        }
    }

    /// Jump to `origin` without an incremental path; forces a full refresh.
    pub(crate) fn place(&mut self, origin: IVec2) {
        let cells = origin - self.origin;
        let offset = cells.as_vec2() * self.scale;
        for aabb in &mut self.bounding_boxes {
            aabb.translate(Vec3::new(offset.x, 0.0, offset.y));
        }
        self.origin = origin;
        self.invalidate();
    }

    pub(crate) fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    pub(crate) fn invalidate(&mut self) {
        self.dirty = true;
        self.full_refresh = true;
        self.last_shift = IVec2::ZERO;
    }

    /// True when the next refresh must re-upload the whole layer
    pub(crate) fn needs_full_refresh(&self) -> bool {
        self.full_refresh || self.last_shift == IVec2::ZERO
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
        self.full_refresh = false;
        self.last_shift = IVec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes() -> [(Vec2, Vec2); INNER_BOXES + BLOCK_COUNT] {
        [(Vec2::ZERO, Vec2::ONE); INNER_BOXES + BLOCK_COUNT]
    }

    #[test]
    fn test_orientation_flips() {
        let o = Orientation::BottomLeft;
        assert_eq!(o.flipped_x(), Orientation::BottomRight);
        assert_eq!(o.flipped_z(), Orientation::TopLeft);
        assert_eq!(o.flipped_x().flipped_z(), Orientation::TopRight);
        for o in Orientation::ALL {
            assert_eq!(Orientation::from_offsets(o.offsets()), o);
            assert_eq!(o.flipped_x().flipped_x(), o);
        }
    }

    #[test]
    fn test_scale_and_width() {
        let level = ClipMapLevel::new(3, 63, &boxes(), 1.0);
        assert_eq!(level.scale(), 8.0);
        assert_eq!(level.width(), 8.0 * 62.0);
    }

    #[test]
    fn test_translate_moves_boxes_and_marks_dirty() {
        let mut level = ClipMapLevel::new(1, 63, &boxes(), 10.0);
        level.mark_clean();
        level.translate(IVec2::new(1, -1), 64);

        assert!(level.is_dirty());
        assert_eq!(level.origin(), IVec2::new(2, -2));
        assert_eq!(level.last_shift(), IVec2::new(1, -1));
        assert!(!level.needs_full_refresh());
        // 2 cells at scale 2
        assert_eq!(level.inner_box(0).min, Vec3::new(4.0, 0.0, -4.0));
        assert_eq!(level.block_box(0).max, Vec3::new(6.0, 10.0, -2.0));
    }

    #[test]
    fn test_large_shift_requests_full_refresh() {
        let mut level = ClipMapLevel::new(0, 63, &boxes(), 1.0);
        level.mark_clean();
        level.translate(IVec2::new(32, 0), 64);
        assert!(level.needs_full_refresh());
    }

    #[test]
    fn test_texture_offset_wraps() {
        let mut level = ClipMapLevel::new(0, 63, &boxes(), 1.0);
        level.place(IVec2::new(-2, 130));
        assert_eq!(level.texture_offset(64), IVec2::new(62, 2));
    }
}
