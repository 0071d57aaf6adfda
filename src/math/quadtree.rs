//! Arena-indexed quadtree over 2D bounding boxes.
//!
//! Nodes live in a flat `Vec` and reference their four children by the
//! index of the first child (children are always allocated together).
//! Items are stored at the deepest node whose bounds fully contain them;
//! items that straddle a split line, or that lie outside the root bounds,
//! stay at the node above. The tree is cheap to [`clear`](QuadTree::clear)
//! and refill, which is how the collision broad phase uses it.

use crate::core::types::Vec2;
use super::aabb::Aabb2;
use super::ray::Ray2;

/// Index of the root node
pub const ROOT: u32 = 0;

/// A value stored in the tree together with the bounds it was inserted with
#[derive(Clone, Debug)]
pub struct QuadItem<T> {
    pub bounds: Aabb2,
    pub value: T,
}

/// A single node of the quadtree
#[derive(Clone, Debug)]
pub struct QuadNode<T> {
    pub bounds: Aabb2,
    pub depth: u32,
    pub items: Vec<QuadItem<T>>,
    /// Index of the first of four consecutive children
    pub first_child: Option<u32>,
}

impl<T> QuadNode<T> {
    fn new(bounds: Aabb2, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            items: Vec::new(),
            first_child: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }
}

/// Generic quadtree partitioning items by their bounds
pub struct QuadTree<T> {
    nodes: Vec<QuadNode<T>>,
    max_depth: u32,
    node_capacity: usize,
    len: usize,
}

impl<T> QuadTree<T> {
    /// Create an empty tree.
    ///
    /// Leaves split once they hold more than `node_capacity` items, unless
    /// they are already at `max_depth`.
    pub fn new(bounds: Aabb2, max_depth: u32, node_capacity: usize) -> Self {
        Self {
            nodes: vec![QuadNode::new(bounds, 0)],
            max_depth,
            node_capacity: node_capacity.max(1),
            len: 0,
        }
    }

    /// Remove every item and reset the root to `bounds`, keeping allocations.
    pub fn clear(&mut self, bounds: Aabb2) {
        self.nodes.truncate(1);
        let root = &mut self.nodes[ROOT as usize];
        root.bounds = bounds;
        root.items.clear();
        root.first_child = None;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn bounds(&self) -> Aabb2 {
        self.nodes[ROOT as usize].bounds
    }

    pub fn node(&self, index: u32) -> &QuadNode<T> {
        &self.nodes[index as usize]
    }

    /// Quadrant of `node_bounds` that fully contains `item`, if any.
    ///
    /// Quadrant numbering matches [`Aabb2::child_quadrant`]: bit 0 selects
    /// the +x half, bit 1 the +y half.
    pub fn get_index(node_bounds: &Aabb2, item: &Aabb2) -> Option<usize> {
        if !node_bounds.contains(item) {
            return None;
        }
        let center = node_bounds.center();

        let x = if item.max.x <= center.x {
            0
        } else if item.min.x >= center.x {
            1
        } else {
            return None;
        };
        let y = if item.max.y <= center.y {
            0
        } else if item.min.y >= center.y {
            2
        } else {
            return None;
        };
        Some(x | y)
    }

    /// Insert a value with the given bounds
    pub fn insert(&mut self, bounds: Aabb2, value: T) {
        let mut index = ROOT;
        while let Some(first) = self.nodes[index as usize].first_child {
            match Self::get_index(&self.nodes[index as usize].bounds, &bounds) {
                Some(quadrant) => index = first + quadrant as u32,
                None => break,
            }
        }

        let node = &mut self.nodes[index as usize];
        node.items.push(QuadItem { bounds, value });
        self.len += 1;

        if node.is_leaf() && node.items.len() > self.node_capacity && node.depth < self.max_depth {
            self.split(index);
        }
    }

    fn split(&mut self, index: u32) {
        let first = self.nodes.len() as u32;
        let (bounds, depth) = {
            let node = &self.nodes[index as usize];
            (node.bounds, node.depth)
        };
        for quadrant in 0..4 {
            self.nodes.push(QuadNode::new(bounds.child_quadrant(quadrant), depth + 1));
        }

        let items = std::mem::take(&mut self.nodes[index as usize].items);
        self.nodes[index as usize].first_child = Some(first);

        let mut kept = Vec::new();
        for item in items {
            match Self::get_index(&bounds, &item.bounds) {
                Some(quadrant) => self.nodes[(first + quadrant as u32) as usize].items.push(item),
                None => kept.push(item),
            }
        }
        self.nodes[index as usize].items = kept;
    }

    /// Visit every item stored along the branches that could hold an item
    /// overlapping `area`.
    ///
    /// Where `area` fits inside a single quadrant only that child is walked;
    /// otherwise every child whose bounds intersect `area` is. Items are
    /// reported regardless of whether their own bounds intersect `area`, so
    /// callers run their own exact test.
    pub fn for_each_candidate(&self, area: &Aabb2, mut visit: impl FnMut(&QuadItem<T>)) {
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            node.items.iter().for_each(&mut visit);

            let Some(first) = node.first_child else { continue };
            match Self::get_index(&node.bounds, area) {
                Some(quadrant) => stack.push(first + quadrant as u32),
                None => {
                    for child in first..first + 4 {
                        if self.nodes[child as usize].bounds.intersects(area) {
                            stack.push(child);
                        }
                    }
                }
            }
        }
    }

    /// Visit items whose bounds contain `point`
    pub fn query_point(&self, point: Vec2, mut visit: impl FnMut(&QuadItem<T>)) {
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            for item in &node.items {
                if item.bounds.contains_point(point) {
                    visit(item);
                }
            }
            if let Some(first) = node.first_child {
                for child in first..first + 4 {
                    if self.nodes[child as usize].bounds.contains_point(point) {
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// Visit items whose bounds intersect `area`
    pub fn query_area(&self, area: &Aabb2, mut visit: impl FnMut(&QuadItem<T>)) {
        self.for_each_candidate(area, |item| {
            if item.bounds.intersects(area) {
                visit(item);
            }
        });
    }

    /// Visit items hit by `ray` within `[0, max_t]`, passing the entry distance
    pub fn query_ray(&self, ray: &Ray2, max_t: f32, mut visit: impl FnMut(&QuadItem<T>, f32)) {
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            for item in &node.items {
                if let Some((t_near, _)) = ray.intersects_aabb(&item.bounds) {
                    if t_near <= max_t {
                        visit(item, t_near);
                    }
                }
            }
            if let Some(first) = node.first_child {
                for child in first..first + 4 {
                    let hit = ray.intersects_aabb(&self.nodes[child as usize].bounds);
                    if matches!(hit, Some((t_near, _)) if t_near <= max_t) {
                        stack.push(child);
                    }
                }
            }
        }
    }

    /// Closest item hit by `ray` within `[0, max_t]` that satisfies `filter`.
    ///
    /// The search limit shrinks as hits are found so that farther nodes are
    /// pruned before their items are examined.
    pub fn find_closest(
        &self,
        ray: &Ray2,
        max_t: f32,
        mut filter: impl FnMut(&T) -> bool,
    ) -> Option<(&QuadItem<T>, f32)> {
        let mut best = None;
        let mut limit = max_t;
        self.closest_in_node(ROOT, ray, &mut limit, &mut filter, &mut best);
        best
    }

    fn closest_in_node<'a>(
        &'a self,
        index: u32,
        ray: &Ray2,
        max_t: &mut f32,
        filter: &mut impl FnMut(&T) -> bool,
        best: &mut Option<(&'a QuadItem<T>, f32)>,
    ) {
        let node = &self.nodes[index as usize];
        for item in &node.items {
            if let Some((t_near, _)) = ray.intersects_aabb(&item.bounds) {
                if t_near <= *max_t && filter(&item.value) {
                    *max_t = t_near;
                    *best = Some((item, t_near));
                }
            }
        }

        let Some(first) = node.first_child else { return };

        let mut children: Vec<(u32, f32)> = (first..first + 4)
            .filter_map(|child| {
                ray.intersects_aabb(&self.nodes[child as usize].bounds)
                    .map(|(t_near, _)| (child, t_near))
            })
            .collect();
        children.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (child, t_near) in children {
            if t_near > *max_t {
                break;
            }
            self.closest_in_node(child, ray, max_t, filter, best);
        }
    }
}

impl<T: Clone> QuadTree<T> {
    /// Values whose bounds contain `point`
    pub fn find_at_point(&self, point: Vec2) -> Vec<T> {
        let mut found = Vec::new();
        self.query_point(point, |item| found.push(item.value.clone()));
        found
    }

    /// Values whose bounds intersect `area`
    pub fn find_in_area(&self, area: &Aabb2) -> Vec<T> {
        let mut found = Vec::new();
        self.query_area(area, |item| found.push(item.value.clone()));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> Aabb2 {
        Aabb2::new(Vec2::ZERO, Vec2::splat(100.0))
    }

    fn unit_box(x: f32, y: f32) -> Aabb2 {
        Aabb2::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    #[test]
    fn test_get_index() {
        let bounds = world();
        assert_eq!(QuadTree::<u32>::get_index(&bounds, &unit_box(10.0, 10.0)), Some(0));
        assert_eq!(QuadTree::<u32>::get_index(&bounds, &unit_box(60.0, 10.0)), Some(1));
        assert_eq!(QuadTree::<u32>::get_index(&bounds, &unit_box(10.0, 60.0)), Some(2));
        assert_eq!(QuadTree::<u32>::get_index(&bounds, &unit_box(60.0, 60.0)), Some(3));
        // Straddles the vertical split line
        assert_eq!(QuadTree::<u32>::get_index(&bounds, &unit_box(49.5, 10.0)), None);
        // Outside the node entirely
        assert_eq!(QuadTree::<u32>::get_index(&bounds, &unit_box(120.0, 10.0)), None);
    }

    #[test]
    fn test_split_distributes_items() {
        let mut tree = QuadTree::new(world(), 4, 2);
        tree.insert(unit_box(10.0, 10.0), 0);
        tree.insert(unit_box(60.0, 10.0), 1);
        assert_eq!(tree.node_count(), 1);

        tree.insert(unit_box(60.0, 60.0), 2);
        tree.insert(unit_box(49.5, 49.5), 3);
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.len(), 4);

        let root = tree.node(ROOT);
        assert_eq!(root.items.len(), 1);
        assert_eq!(root.items[0].value, 3);
    }

    #[test]
    fn test_point_and_area_queries() {
        let mut tree = QuadTree::new(world(), 6, 1);
        for i in 0..10 {
            tree.insert(unit_box(i as f32 * 10.0, i as f32 * 10.0), i);
        }

        assert_eq!(tree.find_at_point(Vec2::new(30.5, 30.5)), vec![3]);
        assert!(tree.find_at_point(Vec2::new(35.0, 30.5)).is_empty());

        let mut hits = tree.find_in_area(&Aabb2::new(Vec2::splat(15.0), Vec2::splat(45.0)));
        hits.sort();
        assert_eq!(hits, vec![2, 3, 4]);
    }

    #[test]
    fn test_items_outside_root_are_kept() {
        let mut tree = QuadTree::new(world(), 4, 1);
        tree.insert(unit_box(-50.0, -50.0), 7);
        tree.insert(unit_box(1.0, 1.0), 8);
        tree.insert(unit_box(2.0, 2.0), 9);
        assert_eq!(tree.find_at_point(Vec2::splat(-49.5)), vec![7]);
    }

    #[test]
    fn test_ray_queries() {
        let mut tree = QuadTree::new(world(), 6, 1);
        tree.insert(unit_box(20.0, 50.0), "near");
        tree.insert(unit_box(70.0, 50.0), "far");
        tree.insert(unit_box(40.0, 80.0), "off_axis");

        let ray = Ray2::new(Vec2::new(0.0, 50.5), Vec2::X);
        let mut hits = Vec::new();
        tree.query_ray(&ray, 1000.0, |item, t| hits.push((item.value, t)));
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "near");

        let (closest, t) = tree.find_closest(&ray, 1000.0, |_| true).unwrap();
        assert_eq!(closest.value, "near");
        assert!((t - 20.0).abs() < 1e-4);

        let (closest, _) = tree.find_closest(&ray, 1000.0, |v| *v != "near").unwrap();
        assert_eq!(closest.value, "far");

        assert!(tree.find_closest(&ray, 10.0, |_| true).is_none());
    }

    #[test]
    fn test_clear_resets_tree() {
        let mut tree = QuadTree::new(world(), 4, 1);
        for i in 0..8 {
            tree.insert(unit_box(i as f32 * 12.0, 5.0), i);
        }
        assert!(tree.node_count() > 1);

        tree.clear(Aabb2::new(Vec2::ZERO, Vec2::splat(10.0)));
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.bounds().max, Vec2::splat(10.0));
    }
}
