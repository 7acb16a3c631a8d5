// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The quad/oct variant behind a container and the query regions it answers.

use percept_tree::{Aabb, ElementId, OcTree, QuadTree, TreeConfig};

use crate::stimulus::SensedStimulus;
use crate::{Aabb3, Vec3};

/// Which tree a container builds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TreeKind {
    /// 2D quadtree over the x/y projection. Heights do not affect placement
    /// or queries but are kept with each record.
    Quad,
    /// 3D octree.
    #[default]
    Oct,
}

/// A region a sensor asks about.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Region {
    /// Everything intersecting a box.
    Box(Aabb3),
    /// Everything intersecting a ball.
    Sphere {
        /// Ball center.
        center: Vec3,
        /// Ball radius.
        radius: f64,
    },
    /// Everything intersecting both a box and a ball.
    BoxSphere {
        /// Box bounds.
        bounds: Aabb3,
        /// Ball center.
        center: Vec3,
        /// Ball radius.
        radius: f64,
    },
}

impl Region {
    /// Box that bounds the region.
    pub fn bounds(&self) -> Aabb3 {
        match *self {
            Self::Box(b) => b,
            Self::Sphere { center, radius } => Aabb::around(center, radius),
            Self::BoxSphere {
                bounds,
                center,
                radius,
            } => bounds.intersect(&Aabb::around(center, radius)),
        }
    }

    fn ball(&self) -> Option<(Vec3, f64)> {
        match *self {
            Self::Box(_) => None,
            Self::Sphere { center, radius } | Self::BoxSphere { center, radius, .. } => {
                Some((center, radius * radius))
            }
        }
    }
}

pub(crate) fn flatten(b: &Aabb3) -> Aabb<f64, 2> {
    Aabb::new([b.min[0], b.min[1]], [b.max[0], b.max[1]])
}

fn lift(b: &Aabb<f64, 2>, z: [f64; 2]) -> Aabb3 {
    Aabb::new([b.min[0], b.min[1], z[0]], [b.max[0], b.max[1], z[1]])
}

/// Quad payload: the record plus the z extent its flat cell drops.
#[derive(Clone, Debug)]
pub(crate) struct Layered {
    record: SensedStimulus,
    z: [f64; 2],
}

impl Layered {
    fn new(record: SensedStimulus, bounds: &Aabb3) -> Self {
        Self {
            record,
            z: [bounds.min[2], bounds.max[2]],
        }
    }
}

#[derive(Debug)]
pub(crate) enum SpatialTree {
    Quad(QuadTree<Layered>),
    Oct(OcTree<SensedStimulus>),
}

impl SpatialTree {
    pub(crate) fn new(kind: TreeKind, config: TreeConfig<f64>) -> Self {
        match kind {
            TreeKind::Quad => Self::Quad(QuadTree::new(config)),
            TreeKind::Oct => Self::Oct(OcTree::new(config)),
        }
    }

    pub(crate) fn kind(&self) -> TreeKind {
        match self {
            Self::Quad(_) => TreeKind::Quad,
            Self::Oct(_) => TreeKind::Oct,
        }
    }

    pub(crate) fn reserve(&mut self, nodes: usize, elements: usize) {
        match self {
            Self::Quad(t) => t.reserve(nodes, elements),
            Self::Oct(t) => t.reserve(nodes, elements),
        }
    }

    pub(crate) fn insert(&mut self, record: SensedStimulus, bounds: &Aabb3) -> ElementId {
        let id = match self {
            Self::Quad(t) => t.insert(flatten(bounds), Layered::new(record, bounds)),
            Self::Oct(t) => t.insert(*bounds, record),
        };
        if let Some(r) = self.get_mut(id) {
            r.handle = Some(id);
        }
        id
    }

    pub(crate) fn update(&mut self, id: ElementId, bounds: &Aabb3) -> bool {
        match self {
            Self::Quad(t) => {
                if !t.update(id, flatten(bounds)) {
                    return false;
                }
                if let Some(entry) = t.get_mut(id) {
                    entry.z = [bounds.min[2], bounds.max[2]];
                }
                true
            }
            Self::Oct(t) => t.update(id, *bounds),
        }
    }

    pub(crate) fn remove(&mut self, id: ElementId) -> Option<SensedStimulus> {
        match self {
            Self::Quad(t) => t.remove(id).map(|entry| entry.record),
            Self::Oct(t) => t.remove(id),
        }
    }

    pub(crate) fn get(&self, id: ElementId) -> Option<&SensedStimulus> {
        match self {
            Self::Quad(t) => t.get(id).map(|entry| &entry.record),
            Self::Oct(t) => t.get(id),
        }
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut SensedStimulus> {
        match self {
            Self::Quad(t) => t.get_mut(id).map(|entry| &mut entry.record),
            Self::Oct(t) => t.get_mut(id),
        }
    }

    /// Stored bounds, with the z extent the record was placed with.
    pub(crate) fn bounds(&self, id: ElementId) -> Option<Aabb3> {
        match self {
            Self::Quad(t) => {
                let entry = t.get(id)?;
                t.shape(id).map(|b| lift(&b, entry.z))
            }
            Self::Oct(t) => t.shape(id),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Quad(t) => t.len(),
            Self::Oct(t) => t.len(),
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        match self {
            Self::Quad(t) => t.node_count(),
            Self::Oct(t) => t.node_count(),
        }
    }

    pub(crate) fn clear(&mut self) {
        match self {
            Self::Quad(t) => t.clear(),
            Self::Oct(t) => t.clear(),
        }
    }

    pub(crate) fn collapse(&mut self) {
        match self {
            Self::Quad(t) => t.collapse(true),
            Self::Oct(t) => t.collapse(true),
        }
    }

    pub(crate) fn hold_slot_reuse(&mut self) {
        match self {
            Self::Quad(t) => t.hold_slot_reuse(),
            Self::Oct(t) => t.hold_slot_reuse(),
        }
    }

    pub(crate) fn release_slot_reuse(&mut self) {
        match self {
            Self::Quad(t) => t.release_slot_reuse(),
            Self::Oct(t) => t.release_slot_reuse(),
        }
    }

    /// Bounds of the smallest cell covering `query`. Quad trees keep the query's z range.
    pub(crate) fn max_intersect(&self, query: &Aabb3) -> Option<Aabb3> {
        match self {
            Self::Quad(t) => {
                let cell = t.max_intersect(&flatten(query))?;
                t.cell_bounds(cell)
                    .map(|b| lift(&b, [query.min[2], query.max[2]]))
            }
            Self::Oct(t) => {
                let cell = t.max_intersect(query)?;
                t.cell_bounds(cell)
            }
        }
    }

    /// Handles of records inside `region` on any of `channels`.
    pub(crate) fn collect(&self, region: &Region, channels: u64, out: &mut impl Extend<ElementId>) {
        let bounds = region.bounds();
        if bounds.is_empty() {
            return;
        }
        let ball = region.ball();
        match self {
            Self::Quad(t) => {
                let ball = ball.map(|(c, r2)| ([c[0], c[1]], r2));
                t.for_each_in(&flatten(&bounds), |id, shape, entry| {
                    let in_ball = ball.is_none_or(|(c, r2)| shape.intersects_sphere(&c, r2));
                    if in_ball && entry.record.on_channels(channels) {
                        out.extend(Some(id));
                    }
                });
            }
            Self::Oct(t) => {
                t.for_each_in(&bounds, |id, shape, record| {
                    let in_ball = ball.is_none_or(|(c, r2)| shape.intersects_sphere(&c, r2));
                    if in_ball && record.on_channels(channels) {
                        out.extend(Some(id));
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(x: f64, y: f64, z: f64, h: f64) -> Aabb3 {
        Aabb::new([x - h, y - h, z - h], [x + h, y + h, z + h])
    }

    fn ids(tree: &SpatialTree, region: &Region, channels: u64) -> Vec<ElementId> {
        let mut out = Vec::new();
        tree.collect(region, channels, &mut out);
        out.sort();
        out
    }

    #[test]
    fn sphere_rejects_box_corners() {
        let mut tree = SpatialTree::new(TreeKind::Oct, TreeConfig::default());
        let near = tree.insert(SensedStimulus::new(1, 1), &cube(10.0, 0.0, 0.0, 1.0));
        // Inside the sphere's bounding box but outside the ball.
        let corner = tree.insert(SensedStimulus::new(2, 1), &cube(45.0, 45.0, 45.0, 1.0));
        let region = Region::Sphere {
            center: [0.0, 0.0, 0.0],
            radius: 50.0,
        };
        assert_eq!(ids(&tree, &region, u64::MAX), vec![near]);
        assert_eq!(
            ids(&tree, &Region::Box(region.bounds()), u64::MAX),
            vec![near, corner]
        );
    }

    #[test]
    fn channel_mask_filters() {
        let mut tree = SpatialTree::new(TreeKind::Oct, TreeConfig::default());
        let a = tree.insert(SensedStimulus::new(1, 0b01), &cube(0.0, 0.0, 0.0, 1.0));
        let b = tree.insert(SensedStimulus::new(2, 0b10), &cube(1.0, 0.0, 0.0, 1.0));
        let region = Region::Box(cube(0.0, 0.0, 0.0, 10.0));
        assert_eq!(ids(&tree, &region, 0b01), vec![a]);
        assert_eq!(ids(&tree, &region, 0b10), vec![b]);
        assert!(ids(&tree, &region, 0b100).is_empty());
    }

    #[test]
    fn quad_ignores_height() {
        let mut tree = SpatialTree::new(TreeKind::Quad, TreeConfig::default());
        let high = tree.insert(SensedStimulus::new(1, 1), &cube(5.0, 5.0, 900.0, 1.0));
        let region = Region::Box(cube(5.0, 5.0, 0.0, 3.0));
        assert_eq!(ids(&tree, &region, u64::MAX), vec![high]);
        assert_eq!(tree.bounds(high), Some(cube(5.0, 5.0, 900.0, 1.0)));
        assert_eq!(tree.kind(), TreeKind::Quad);
    }

    #[test]
    fn quad_update_keeps_new_height() {
        let mut tree = SpatialTree::new(TreeKind::Quad, TreeConfig::default());
        let id = tree.insert(SensedStimulus::new(1, 1), &cube(5.0, 5.0, 10.0, 1.0));
        assert!(tree.update(id, &cube(8.0, 5.0, -40.0, 2.0)));
        assert_eq!(tree.bounds(id), Some(cube(8.0, 5.0, -40.0, 2.0)));
        assert_eq!(tree.get(id).and_then(|r| r.handle), Some(id));
        assert_eq!(tree.remove(id).map(|r| r.owner), Some(1));
        assert_eq!(tree.bounds(id), None);
    }

    #[test]
    fn box_sphere_is_the_intersection() {
        let mut tree = SpatialTree::new(TreeKind::Oct, TreeConfig::default());
        let inside = tree.insert(SensedStimulus::new(1, 1), &cube(2.0, 2.0, 2.0, 0.5));
        tree.insert(SensedStimulus::new(2, 1), &cube(-20.0, 0.0, 0.0, 0.5));
        let region = Region::BoxSphere {
            bounds: Aabb::new([0.0, 0.0, 0.0], [30.0, 30.0, 30.0]),
            center: [0.0, 0.0, 0.0],
            radius: 25.0,
        };
        assert_eq!(ids(&tree, &region, u64::MAX), vec![inside]);
    }

    #[test]
    fn insert_records_handle() {
        let mut tree = SpatialTree::new(TreeKind::Oct, TreeConfig::default());
        let id = tree.insert(SensedStimulus::new(9, 1), &cube(0.0, 0.0, 0.0, 1.0));
        assert_eq!(tree.get(id).and_then(|r| r.handle), Some(id));
    }
}
