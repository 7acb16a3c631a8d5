// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The locked container and its deferred-removal sessions.

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use percept_tree::{ElementId, TreeConfig};
use tracing::{debug, trace};

use crate::spatial::{Region, SpatialTree, TreeKind};
use crate::stimulus::{SenseFlags, SensedPoint, SensedStimulus};
use crate::{Aabb3, Vec3};

/// Construction parameters for a [`SenseContainer`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContainerConfig {
    /// Quadtree over x/y or octree.
    pub kind: TreeKind,
    /// Seed cell edge length.
    pub min_cell_size: f64,
    /// Elements per leaf before it splits.
    pub split_threshold: usize,
    /// Cells to reserve up front.
    pub node_reserve: usize,
    /// Records to reserve up front.
    pub element_reserve: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            kind: TreeKind::Oct,
            min_cell_size: 100.0,
            split_threshold: 8,
            node_reserve: 128,
            element_reserve: 128,
        }
    }
}

#[derive(Debug, Default)]
struct RemoveControl {
    sessions: u32,
    removed: bool,
    pending: Vec<ElementId>,
}

impl RemoveControl {
    fn reset(&mut self) {
        self.removed = false;
        self.pending.clear();
    }

    fn is_pending(&self, id: ElementId) -> bool {
        self.sessions > 0 && self.removed && self.pending.contains(&id)
    }
}

#[derive(Debug)]
struct Inner {
    tree: SpatialTree,
    removals: RemoveControl,
}

/// A stimulus index shared between the thread that owns the stimuli and any
/// number of query threads.
///
/// Every structural change takes the write lock. Queries take the read lock and
/// copy handles or records out before releasing it, so nothing returned borrows
/// the container.
///
/// Query threads that hold on to handles across several calls bracket that work
/// with [`SenseContainer::remove_session`]. Removals made during a session are
/// remembered, and the freed slots are not reused until the last session ends.
#[derive(Debug)]
pub struct SenseContainer {
    inner: RwLock<Inner>,
}

impl Default for SenseContainer {
    fn default() -> Self {
        Self::new(ContainerConfig::default())
    }
}

impl SenseContainer {
    /// Build an empty container.
    pub fn new(config: ContainerConfig) -> Self {
        let mut tree = SpatialTree::new(
            config.kind,
            TreeConfig {
                min_cell_size: config.min_cell_size,
                split_threshold: config.split_threshold,
            },
        );
        tree.reserve(config.node_reserve, config.element_reserve);
        debug!(
            kind = ?config.kind,
            min_cell_size = config.min_cell_size,
            split_threshold = config.split_threshold,
            "sense container created"
        );
        Self {
            inner: RwLock::new(Inner {
                tree,
                removals: RemoveControl::default(),
            }),
        }
    }

    /// The tree variant in use.
    pub fn kind(&self) -> TreeKind {
        self.inner.read().tree.kind()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.inner.read().tree.len()
    }

    /// Whether the container is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live tree cells.
    pub fn node_count(&self) -> usize {
        self.inner.read().tree.node_count()
    }

    /// Insert a record covering `bounds`. The record's `handle` is set to the result.
    pub fn insert(&self, record: SensedStimulus, bounds: Aabb3) -> ElementId {
        let mut inner = self.inner.write();
        let id = inner.tree.insert(record, &bounds);
        trace!(?id, "stimulus inserted");
        id
    }

    /// Move a record. Returns `false` for a stale handle.
    pub fn update(&self, id: ElementId, bounds: Aabb3) -> bool {
        self.inner.write().tree.update(id, &bounds)
    }

    /// Remove a record. Returns `false` for a stale handle.
    pub fn remove(&self, id: ElementId) -> bool {
        let mut inner = self.inner.write();
        let removed = inner.tree.remove(id).is_some();
        if removed && inner.removals.sessions > 0 {
            inner.removals.pending.push(id);
            inner.removals.removed = true;
            trace!(?id, "removal deferred behind active session");
        }
        removed
    }

    /// Drop every record.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tree.clear();
        debug!("sense container cleared");
    }

    /// Shrink an oversized root and flatten sparse subtrees. Meant for a slow timer.
    pub fn collapse(&self) {
        let mut inner = self.inner.write();
        let before = inner.tree.node_count();
        inner.tree.collapse();
        debug!(before, after = inner.tree.node_count(), "sense container collapsed");
    }

    /// Begin a deferred-removal session. The session ends when the guard drops.
    pub fn remove_session(&self) -> RemoveSession<'_> {
        let mut inner = self.inner.write();
        if inner.removals.sessions == 0 {
            inner.removals.reset();
            inner.tree.hold_slot_reuse();
            debug!("remove control engaged");
        }
        inner.removals.sessions += 1;
        RemoveSession { container: self }
    }

    fn end_session(&self) {
        let mut inner = self.inner.write();
        inner.removals.sessions = inner.removals.sessions.saturating_sub(1);
        if inner.removals.sessions == 0 {
            let pending = inner.removals.pending.len();
            inner.removals.reset();
            inner.tree.release_slot_reuse();
            debug!(pending, "remove control released");
        }
    }

    /// Forget a pending removal once a reader is done with its handle.
    pub fn retire_pending(&self, id: ElementId) {
        let mut inner = self.inner.write();
        let pending = &mut inner.removals.pending;
        if let Some(pos) = pending.iter().position(|&p| p == id) {
            pending.swap_remove(pos);
        }
        if pending.is_empty() {
            inner.removals.removed = false;
        }
    }

    /// Whether no session is active.
    pub fn is_remove_control_clear(&self) -> bool {
        self.inner.read().removals.sessions == 0
    }

    /// Removals recorded during the active sessions and not yet retired.
    pub fn pending_removals(&self) -> usize {
        self.inner.read().removals.pending.len()
    }

    /// Copy of a record.
    ///
    /// A handle removed during the active session reports `None` and is retired
    /// from the pending list.
    pub fn sensed_copy_ts(&self, id: ElementId) -> Option<SensedStimulus> {
        {
            let inner = self.inner.read();
            if !inner.removals.is_pending(id) {
                return inner.tree.get(id).cloned();
            }
        }
        self.retire_pending(id);
        None
    }

    /// Copy of a record, without consulting the pending list.
    pub fn sensed_copy_simple_ts(&self, id: ElementId) -> Option<SensedStimulus> {
        self.inner.read().tree.get(id).cloned()
    }

    /// Stored bounds of a record.
    pub fn bounds_ts(&self, id: ElementId) -> Option<Aabb3> {
        self.inner.read().tree.bounds(id)
    }

    /// Whether `id` is live, still carries `hash`, and is enabled.
    pub fn is_live_ts(&self, id: ElementId, hash: u32) -> bool {
        self.inner
            .read()
            .tree
            .get(id)
            .is_some_and(|r| r.hash == hash && r.is_enabled())
    }

    /// The handles whose records still carry the paired fingerprint.
    pub fn check_hash_ts(&self, expected: &[(ElementId, u32)]) -> Vec<ElementId> {
        let inner = self.inner.read();
        expected
            .iter()
            .filter(|&&(id, hash)| inner.tree.get(id).is_some_and(|r| r.hash == hash))
            .map(|&(id, _)| id)
            .collect()
    }

    /// [`Self::check_hash_ts`] over a map of handle to fingerprint.
    pub fn check_hash_map_ts(&self, expected: &AHashMap<ElementId, u32>) -> Vec<ElementId> {
        let inner = self.inner.read();
        expected
            .iter()
            .filter(|&(&id, &hash)| inner.tree.get(id).is_some_and(|r| r.hash == hash))
            .map(|(&id, _)| id)
            .collect()
    }

    /// [`Self::check_hash_map_ts`] returning a set.
    pub fn check_hash_set_ts(&self, expected: &AHashMap<ElementId, u32>) -> AHashSet<ElementId> {
        let inner = self.inner.read();
        expected
            .iter()
            .filter(|&(&id, &hash)| inner.tree.get(id).is_some_and(|r| r.hash == hash))
            .map(|(&id, _)| id)
            .collect()
    }

    fn modify(&self, id: ElementId, f: impl FnOnce(&mut SensedStimulus)) -> bool {
        let mut inner = self.inner.write();
        match inner.tree.get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Set a record's forget age.
    pub fn set_age_ts(&self, id: ElementId, age: f64) -> bool {
        self.modify(id, |r| r.age = age)
    }

    /// Set a record's score.
    pub fn set_score_ts(&self, id: ElementId, score: f32) -> bool {
        self.modify(id, |r| r.score = score)
    }

    /// Set a record's channel mask.
    pub fn set_channels_ts(&self, id: ElementId, channels: u64) -> bool {
        self.modify(id, |r| r.channels = channels)
    }

    /// Replace a record's sensed points and stamp the detection time.
    pub fn set_sensed_points_ts(&self, id: ElementId, points: Vec<SensedPoint>, now: f64) -> bool {
        self.modify(id, |r| {
            r.sensed_points = points;
            r.sensed_time = now;
        })
    }

    /// Set a record's lifecycle flags.
    pub fn set_flags_ts(&self, id: ElementId, flags: SenseFlags) -> bool {
        self.modify(id, |r| r.flags = flags)
    }

    /// Handles of records in `region` on any of `channels`.
    pub fn query_ids(&self, region: &Region, channels: u64) -> Vec<ElementId> {
        let mut out = Vec::new();
        self.inner.read().tree.collect(region, channels, &mut out);
        out
    }

    /// [`Self::query_ids`] as a set.
    pub fn query_id_set(&self, region: &Region, channels: u64) -> AHashSet<ElementId> {
        let mut out = AHashSet::new();
        self.inner.read().tree.collect(region, channels, &mut out);
        out
    }

    /// Handles of records intersecting `bounds`.
    pub fn in_box_ids(&self, bounds: Aabb3, channels: u64) -> Vec<ElementId> {
        self.query_ids(&Region::Box(bounds), channels)
    }

    /// Handles of records intersecting the ball.
    pub fn in_radius_ids(&self, center: Vec3, radius: f64, channels: u64) -> Vec<ElementId> {
        self.query_ids(&Region::Sphere { center, radius }, channels)
    }

    /// Handles of records intersecting both `bounds` and the ball.
    pub fn in_box_radius_ids(
        &self,
        bounds: Aabb3,
        center: Vec3,
        radius: f64,
        channels: u64,
    ) -> Vec<ElementId> {
        self.query_ids(
            &Region::BoxSphere {
                bounds,
                center,
                radius,
            },
            channels,
        )
    }

    /// [`Self::in_box_ids`] as a set.
    pub fn in_box_id_set(&self, bounds: Aabb3, channels: u64) -> AHashSet<ElementId> {
        self.query_id_set(&Region::Box(bounds), channels)
    }

    /// [`Self::in_radius_ids`] as a set.
    pub fn in_radius_id_set(&self, center: Vec3, radius: f64, channels: u64) -> AHashSet<ElementId> {
        self.query_id_set(&Region::Sphere { center, radius }, channels)
    }

    /// [`Self::in_box_radius_ids`] as a set.
    pub fn in_box_radius_id_set(
        &self,
        bounds: Aabb3,
        center: Vec3,
        radius: f64,
        channels: u64,
    ) -> AHashSet<ElementId> {
        self.query_id_set(
            &Region::BoxSphere {
                bounds,
                center,
                radius,
            },
            channels,
        )
    }

    /// Bounds of the smallest cell holding everything that can intersect `query`.
    pub fn max_intersect(&self, query: &Aabb3) -> Option<Aabb3> {
        self.inner.read().tree.max_intersect(query)
    }
}

/// A deferred-removal session on a [`SenseContainer`].
///
/// Sessions nest. Slot reuse stays held and removals keep being recorded until
/// the outermost guard drops.
#[derive(Debug)]
#[must_use = "the session ends as soon as the guard is dropped"]
pub struct RemoveSession<'a> {
    container: &'a SenseContainer,
}

impl RemoveSession<'_> {
    /// The container this session belongs to.
    pub fn container(&self) -> &SenseContainer {
        self.container
    }
}

impl Drop for RemoveSession<'_> {
    fn drop(&mut self) {
        self.container.end_session();
    }
}
