// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The loose tree: structure, insertion, movement and removal.

use alloc::vec::Vec;
use core::fmt;
use core::mem;

use crate::pool::{Arena, ElementId, ElementSlab, NodeIdx};
use crate::shape::{Shape, single_child};
use crate::types::{Aabb, Scalar, child_code, lt};

/// Upper bound on root doublings for a single insert or update.
///
/// Finite `f64` input needs far fewer; the bound only matters for NaN input,
/// which can never fit any cell.
const MAX_GROWTH_STEPS: usize = 2048;

/// Tuning for a [`Tree`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TreeConfig<T> {
    /// Edge length of the seed cell. Leaves stop splitting once they are within
    /// 1.5 times this size.
    pub min_cell_size: T,
    /// Element count at which a leaf splits. Subtrees at or below it are flattened
    /// back into their top node.
    pub split_threshold: usize,
}

impl<T: Scalar> Default for TreeConfig<T> {
    fn default() -> Self {
        Self {
            min_cell_size: T::from_f64(100.0),
            split_threshold: 8,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Node<T, const D: usize> {
    pub(crate) bounds: Aabb<T, D>,
    pub(crate) center: [T; D],
    pub(crate) parent: Option<NodeIdx>,
    /// Empty for leaves, otherwise exactly `2^D` entries in Morton order.
    pub(crate) children: Vec<NodeIdx>,
    /// Elements in this node's subtree, including `items`.
    pub(crate) count: usize,
    pub(crate) items: Vec<usize>,
}

impl<T, const D: usize> Node<T, D> {
    fn new(bounds: Aabb<T, D>, center: [T; D], parent: Option<NodeIdx>) -> Self {
        Self {
            bounds,
            center,
            parent,
            children: Vec::new(),
            count: 0,
            items: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Element<S, E> {
    pub(crate) shape: S,
    pub(crate) node: NodeIdx,
    pub(crate) payload: E,
}

/// A loose quadtree (`D == 2`) or octree (`D == 3`) over elements of shape `S`
/// carrying payloads `E`.
///
/// The root grows on demand to cover whatever is inserted, leaves split once they
/// pass [`TreeConfig::split_threshold`], and removal flattens subtrees that fall
/// back to the threshold. Box elements that straddle a cell center stay in that
/// cell, which keeps updates local at the cost of some query looseness.
pub struct Tree<T: Scalar, const D: usize, S: Shape<T, D>, E> {
    pub(crate) config: TreeConfig<T>,
    pub(crate) root: Option<NodeIdx>,
    pub(crate) nodes: Arena<Node<T, D>>,
    pub(crate) elements: ElementSlab<Element<S, E>>,
}

impl<T: Scalar, const D: usize, S: Shape<T, D>, E> fmt::Debug for Tree<T, D, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("nodes", &self.node_count())
            .field("root", &self.root_bounds())
            .finish_non_exhaustive()
    }
}

impl<T: Scalar, const D: usize, S: Shape<T, D>, E> Default for Tree<T, D, S, E> {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl<T: Scalar, const D: usize, S: Shape<T, D>, E> Tree<T, D, S, E> {
    pub(crate) const CHILDREN: usize = 1 << D;

    /// Create an empty tree. No cell exists until the first insert.
    pub fn new(config: TreeConfig<T>) -> Self {
        const { assert!(D >= 1 && D <= 3, "trees support one to three axes") };
        debug_assert!(
            lt(T::zero(), config.min_cell_size),
            "minimum cell size must be positive"
        );
        Self {
            config,
            root: None,
            nodes: Arena::default(),
            elements: ElementSlab::default(),
        }
    }

    /// The configuration this tree was built with.
    pub fn config(&self) -> &TreeConfig<T> {
        &self.config
    }

    /// Reserve room for `nodes` more cells and `elements` more elements.
    pub fn reserve(&mut self, nodes: usize, elements: usize) {
        self.nodes.reserve(nodes);
        self.elements.reserve(elements);
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the tree holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.len() == 0
    }

    /// Number of live cells.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the root cell, if one exists.
    pub fn root_bounds(&self) -> Option<Aabb<T, D>> {
        self.root.map(|r| self.nodes[r].bounds)
    }

    /// Depth of the deepest cell; a lone root has depth 1.
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = alloc::vec![(root, 1_usize)];
        while let Some((idx, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(self.nodes[idx].children.iter().map(|&c| (c, depth + 1)));
        }
        deepest
    }

    /// Payload of an element.
    pub fn get(&self, id: ElementId) -> Option<&E> {
        self.elements.get(id).map(|e| &e.payload)
    }

    /// Mutable payload of an element. The geometry can only change via [`Self::update`].
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut E> {
        self.elements.get_mut(id).map(|e| &mut e.payload)
    }

    /// Current geometry of an element.
    pub fn shape(&self, id: ElementId) -> Option<S> {
        self.elements.get(id).map(|e| e.shape)
    }

    /// Whether the handle refers to a live element.
    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.get(id).is_some()
    }

    /// Iterate over all elements in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &S, &E)> + '_ {
        self.elements
            .iter()
            .map(|(id, e)| (id, &e.shape, &e.payload))
    }

    /// Park freed element slots instead of reusing them.
    ///
    /// Handles stay unique while held, so a snapshot of handles taken during a
    /// read session cannot alias elements inserted afterwards.
    pub fn hold_slot_reuse(&mut self) {
        self.elements.hold_reuse();
    }

    /// Return parked slots to the free list.
    pub fn release_slot_reuse(&mut self) {
        self.elements.release_reuse();
    }

    /// Whether slot reuse is currently held.
    pub fn is_holding_slot_reuse(&self) -> bool {
        self.elements.is_holding()
    }

    /// Number of freed slots waiting for [`Self::release_slot_reuse`].
    pub fn parked_slots(&self) -> usize {
        self.elements.parked()
    }

    /// Remove every element and cell. Existing handles become stale.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.elements.clear();
        self.root = None;
    }

    /// Insert an element and return its handle.
    ///
    /// The first insert seeds a root cell of [`TreeConfig::min_cell_size`] aligned to
    /// that grid. Elements that fall outside the root grow it until they fit.
    pub fn insert(&mut self, shape: S, payload: E) -> ElementId {
        debug_assert!(shape.is_finite(), "insert: non-finite coordinates");
        let seed = match self.root {
            Some(root) => root,
            None => self.seed_root(&shape.center()),
        };
        let grew = self.grow_to_fit(&shape);
        let root = self.root.unwrap_or(seed);
        let id = self.elements.insert(Element {
            shape,
            node: root,
            payload,
        });
        self.insert_from(root, id.index());
        if grew {
            self.collapse(true);
        }
        id
    }

    /// Move an element. Returns `false` for a stale handle.
    ///
    /// An element that still fits its cell, and does not newly fit a single child
    /// of it, is changed in place. Otherwise it climbs from its cell to the nearest
    /// ancestor that owns the new geometry and is inserted downward from there.
    pub fn update(&mut self, id: ElementId, shape: S) -> bool {
        debug_assert!(shape.is_finite(), "update: non-finite coordinates");
        let Some(element) = self.elements.get_mut(id) else {
            return false;
        };
        if element.shape == shape {
            return true;
        }
        element.shape = shape;
        let home = element.node;

        let node = &self.nodes[home];
        let relocate = !shape.fits(&node.bounds)
            || (!node.is_leaf() && single_child(shape.child_mask(&node.center)).is_some());
        if relocate {
            self.grow_to_fit(&shape);
            self.relocate(home, id.index());
        }
        true
    }

    /// Remove an element and return its payload. Returns `None` for a stale handle.
    pub fn remove(&mut self, id: ElementId) -> Option<E> {
        let element = self.elements.remove(id)?;
        self.detach(element.node, id.index());
        self.unwind(element.node);
        Some(element.payload)
    }

    /// Maintenance pass.
    ///
    /// Replaces the root by its deepest descendant that holds every element, then,
    /// when `subtrees` is set, flattens every subtree at or below the split threshold.
    /// An empty tree drops its root, so the next insert seeds a fresh one.
    pub fn collapse(&mut self, subtrees: bool) {
        let Some(root) = self.root else {
            return;
        };
        let total = self.nodes[root].count;
        if total == 0 {
            self.nodes.clear();
            self.root = None;
            return;
        }
        let mut target = root;
        while let Some(&next) = self.nodes[target]
            .children
            .iter()
            .find(|&&c| self.nodes[c].count == total)
        {
            target = next;
        }
        if target != root {
            if let Some(parent) = self.nodes[target].parent {
                let siblings = &mut self.nodes[parent].children;
                if let Some(pos) = siblings.iter().position(|&c| c == target) {
                    siblings.swap_remove(pos);
                }
            }
            self.nodes[target].parent = None;
            self.free_subtree(root);
            self.root = Some(target);
        }
        if subtrees {
            self.collapse_subtrees(target);
        }
    }

    fn seed_root(&mut self, p: &[T; D]) -> NodeIdx {
        let size = self.config.min_cell_size;
        let mut min = *p;
        let mut max = *p;
        for i in 0..D {
            max[i] = T::ceil(T::div(p[i], size)) * size;
            min[i] = max[i] - size;
        }
        let cell = Aabb::new(min, max);
        let root = self.nodes.alloc(Node::new(cell, cell.center(), None));
        self.root = Some(root);
        root
    }

    /// Double the root until it owns `shape`. Returns whether it grew.
    fn grow_to_fit(&mut self, shape: &S) -> bool {
        let mut grew = false;
        for _ in 0..MAX_GROWTH_STEPS {
            let Some(root) = self.root else {
                break;
            };
            if shape.fits(&self.nodes[root].bounds) {
                break;
            }
            self.grow_root(&shape.center());
            grew = true;
        }
        grew
    }

    /// Replace the root by a parent of twice its size, extended toward `toward`.
    ///
    /// On each axis the new center is the old root's min corner when `toward` lies
    /// below the old center, and its max corner otherwise.
    fn grow_root(&mut self, toward: &[T; D]) {
        let Some(old) = self.root else {
            return;
        };
        let Node {
            bounds,
            center,
            count,
            ..
        } = self.nodes[old];
        let size = bounds.size();
        let mut pivot = center;
        let mut grown = bounds;
        for i in 0..D {
            if lt(toward[i], center[i]) {
                pivot[i] = bounds.min[i];
                grown.min[i] = bounds.min[i] - size[i];
            } else {
                pivot[i] = bounds.max[i];
                grown.max[i] = bounds.max[i] + size[i];
            }
        }

        self.nodes.reserve(Self::CHILDREN + 1);
        let new_root = self.nodes.alloc(Node::new(grown, pivot, None));
        self.nodes[new_root].count = count;
        self.nodes[old].parent = Some(new_root);
        self.create_children(new_root, Some((child_code(&pivot, &center), old)));
        self.root = Some(new_root);
    }

    /// Give a leaf its `2^D` children, optionally reusing an existing node for one slot.
    fn create_children(&mut self, idx: NodeIdx, existing: Option<(usize, NodeIdx)>) {
        let Node { bounds, center, .. } = self.nodes[idx];
        self.nodes.reserve(Self::CHILDREN);
        let mut children = Vec::with_capacity(Self::CHILDREN);
        for code in 0..Self::CHILDREN {
            if let Some((slot, node)) = existing
                && slot == code
            {
                children.push(node);
                continue;
            }
            let mut cell = bounds;
            for i in 0..D {
                if code & (1 << i) != 0 {
                    cell.max[i] = center[i];
                } else {
                    cell.min[i] = center[i];
                }
            }
            children.push(self.nodes.alloc(Node::new(cell, cell.center(), Some(idx))));
        }
        self.nodes[idx].children = children;
    }

    fn can_split(&self, idx: NodeIdx) -> bool {
        let node = &self.nodes[idx];
        let tolerance = T::from_f64(1.5) * self.config.min_cell_size;
        node.is_leaf()
            && node.count >= self.config.split_threshold
            && lt(tolerance, node.bounds.size()[0])
    }

    /// Push a node's own elements into its children, creating them for a leaf.
    /// Elements that straddle the center stay.
    pub(crate) fn split(&mut self, idx: NodeIdx) {
        if self.nodes[idx].is_leaf() {
            self.create_children(idx, None);
        }
        let center = self.nodes[idx].center;
        let items = mem::take(&mut self.nodes[idx].items);
        let mut kept = Vec::new();
        for slot in items {
            let Some(shape) = self.elements.at(slot).map(|e| e.shape) else {
                continue;
            };
            match single_child(shape.child_mask(&center)) {
                Some(code) => {
                    let child = self.nodes[idx].children[code];
                    self.insert_from(child, slot);
                }
                None => kept.push(slot),
            }
        }
        self.nodes[idx].items = kept;
    }

    /// Route an element down from `start`, counting it in every node passed.
    pub(crate) fn insert_from(&mut self, start: NodeIdx, slot: usize) -> NodeIdx {
        let Some(shape) = self.elements.at(slot).map(|e| e.shape) else {
            return start;
        };
        let mut cur = start;
        loop {
            let node = &self.nodes[cur];
            if node.is_leaf() {
                if self.can_split(cur) {
                    self.split(cur);
                    continue;
                }
                break;
            }
            let Some(code) = single_child(shape.child_mask(&node.center)) else {
                break;
            };
            let next = node.children[code];
            self.nodes[cur].count += 1;
            cur = next;
        }
        let node = &mut self.nodes[cur];
        node.items.push(slot);
        node.count += 1;
        self.set_home(slot, cur);
        cur
    }

    fn relocate(&mut self, home: NodeIdx, slot: usize) {
        let Some(shape) = self.elements.at(slot).map(|e| e.shape) else {
            return;
        };
        if shape.fits(&self.nodes[home].bounds) {
            self.split(home);
            return;
        }
        self.detach(home, slot);
        let mut cur = Some(home);
        while let Some(idx) = cur {
            let node = &mut self.nodes[idx];
            node.count = node.count.saturating_sub(1);
            if shape.fits(&node.bounds) {
                self.insert_from(idx, slot);
                return;
            }
            cur = node.parent;
            self.settle(idx);
        }
        if let Some(root) = self.root {
            self.insert_from(root, slot);
        }
    }

    fn detach(&mut self, idx: NodeIdx, slot: usize) {
        let items = &mut self.nodes[idx].items;
        if let Some(pos) = items.iter().position(|&s| s == slot) {
            items.swap_remove(pos);
        }
    }

    /// Decrement counts from `start` to the root, settling each node on the way.
    fn unwind(&mut self, start: NodeIdx) {
        let mut cur = Some(start);
        while let Some(idx) = cur {
            let node = &mut self.nodes[idx];
            debug_assert!(node.count > 0, "count underflow");
            node.count = node.count.saturating_sub(1);
            cur = node.parent;
            self.settle(idx);
        }
    }

    /// Empty a node whose count reached zero, or flatten one at the threshold.
    fn settle(&mut self, idx: NodeIdx) {
        let node = &self.nodes[idx];
        if node.count == 0 {
            self.empty_node(idx);
        } else if !node.is_leaf() && node.count <= self.config.split_threshold {
            self.collect_into(idx);
        }
    }

    fn empty_node(&mut self, idx: NodeIdx) {
        let node = &mut self.nodes[idx];
        node.items.clear();
        for child in mem::take(&mut node.children) {
            self.free_subtree(child);
        }
    }

    /// Move every element below `idx` into `idx` and free its descendants.
    pub(crate) fn collect_into(&mut self, idx: NodeIdx) {
        let mut stack = mem::take(&mut self.nodes[idx].children);
        let mut gathered = Vec::new();
        while let Some(child) = stack.pop() {
            let node = &mut self.nodes[child];
            gathered.append(&mut node.items);
            stack.append(&mut node.children);
            self.nodes.release(child);
        }
        for &slot in &gathered {
            self.set_home(slot, idx);
        }
        self.nodes[idx].items.append(&mut gathered);
    }

    fn collapse_subtrees(&mut self, start: NodeIdx) {
        let mut stack = alloc::vec![start];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                continue;
            }
            if node.count <= self.config.split_threshold {
                self.collect_into(idx);
            } else {
                stack.extend_from_slice(&node.children);
            }
        }
    }

    fn free_subtree(&mut self, start: NodeIdx) {
        let mut stack = alloc::vec![start];
        while let Some(idx) = stack.pop() {
            let node = &mut self.nodes[idx];
            node.items.clear();
            stack.append(&mut node.children);
            self.nodes.release(idx);
        }
    }

    fn set_home(&mut self, slot: usize, idx: NodeIdx) {
        if let Some(element) = self.elements.at_mut(slot) {
            element.node = idx;
        }
    }
}

/// A broken structural invariant reported by [`Tree::verify`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// A cell's count differs from its own list plus its children's counts.
    CountMismatch {
        /// Direct items plus child counts.
        expected: usize,
        /// Recorded count.
        found: usize,
    },
    /// A split cell does not have exactly `2^D` children.
    ChildCount(usize),
    /// A child does not point back at its parent.
    ParentLink,
    /// The root count differs from the number of live elements.
    TotalMismatch {
        /// Live elements.
        elements: usize,
        /// Root count.
        counted: usize,
    },
    /// An element is not owned by the root cell.
    OutsideRoot(ElementId),
    /// An element's cell does not list it.
    LostElement(ElementId),
    /// An element cannot be reached from the root by following child codes.
    Misplaced(ElementId),
}

impl<T: Scalar, const D: usize, S: Shape<T, D>, E> Tree<T, D, S, E> {
    /// Check every structural invariant. Intended for tests and debug tooling.
    pub fn verify(&self) -> Result<(), Violation> {
        let Some(root) = self.root else {
            return match self.len() {
                0 => Ok(()),
                n => Err(Violation::TotalMismatch {
                    elements: n,
                    counted: 0,
                }),
            };
        };
        let counted = self.nodes[root].count;
        if counted != self.len() {
            return Err(Violation::TotalMismatch {
                elements: self.len(),
                counted,
            });
        }

        let mut stack = alloc::vec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !node.is_leaf() && node.children.len() != Self::CHILDREN {
                return Err(Violation::ChildCount(node.children.len()));
            }
            let mut expected = node.items.len();
            for &child in &node.children {
                if self.nodes[child].parent != Some(idx) {
                    return Err(Violation::ParentLink);
                }
                expected += self.nodes[child].count;
                stack.push(child);
            }
            if expected != node.count {
                return Err(Violation::CountMismatch {
                    expected,
                    found: node.count,
                });
            }
            for &slot in &node.items {
                match self.elements.entry(slot) {
                    Some((_, e)) if e.node == idx => {}
                    Some((id, _)) => return Err(Violation::LostElement(id)),
                    None => {
                        return Err(Violation::CountMismatch {
                            expected,
                            found: node.count,
                        });
                    }
                }
            }
        }

        let root_bounds = self.nodes[root].bounds;
        for (id, element) in self.elements.iter() {
            if !element.shape.fits(&root_bounds) {
                return Err(Violation::OutsideRoot(id));
            }
            let mut cur = root;
            while cur != element.node {
                let node = &self.nodes[cur];
                let next = single_child(element.shape.child_mask(&node.center))
                    .and_then(|code| node.children.get(code));
                match next {
                    Some(&child) => cur = child,
                    None => return Err(Violation::Misplaced(id)),
                }
            }
            if !self.nodes[cur].items.contains(&id.index()) {
                return Err(Violation::LostElement(id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;
    use alloc::vec;

    type Boxes2 = Tree<f64, 2, Aabb<f64, 2>, u32>;
    type Points3 = Tree<f64, 3, Point<f64, 3>, u32>;

    struct Rng(u64);

    impl Rng {
        fn next_f64(&mut self) -> f64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            (self.0 >> 11) as f64 / (1_u64 << 53) as f64
        }

        fn range(&mut self, lo: f64, hi: f64) -> f64 {
            lo + (hi - lo) * self.next_f64()
        }

        fn rect(&mut self, extent: f64, max_size: f64) -> Aabb<f64, 2> {
            let x = self.range(-extent, extent);
            let y = self.range(-extent, extent);
            let w = self.range(0.5, max_size);
            let h = self.range(0.5, max_size);
            Aabb::new([x, y], [x + w, y + h])
        }
    }

    fn config() -> TreeConfig<f64> {
        TreeConfig {
            min_cell_size: 100.0,
            split_threshold: 8,
        }
    }

    fn ids_in(tree: &Boxes2, q: &Aabb<f64, 2>) -> Vec<ElementId> {
        let mut out = Vec::new();
        tree.query_ids(q, |_, _| true, &mut out);
        out.sort();
        out
    }

    fn leaf_held(tree: &Boxes2) -> usize {
        let Some(root) = tree.root else {
            return 0;
        };
        let mut total = 0;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            total += tree.nodes[idx].items.len();
            stack.extend_from_slice(&tree.nodes[idx].children);
        }
        total
    }

    #[test]
    fn thousand_random_boxes_are_retrievable_by_their_bounds() {
        let mut tree = Boxes2::new(config());
        let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
        let mut inserted = Vec::new();
        for i in 0..1000 {
            let r = rng.rect(5_000.0, 80.0);
            inserted.push((tree.insert(r, i), r));
        }
        assert_eq!(tree.verify(), Ok(()));
        assert_eq!(tree.len(), 1000);
        assert_eq!(leaf_held(&tree), 1000);
        assert!(tree.depth() > 1, "1000 elements must split the root");
        for (id, r) in &inserted {
            assert!(ids_in(&tree, r).contains(id));
        }
    }

    #[test]
    fn far_insert_grows_root() {
        let mut tree = Boxes2::new(config());
        tree.insert(Aabb::new([1.0, 1.0], [2.0, 2.0]), 0);
        assert_eq!(tree.root_bounds(), Some(Aabb::new([0.0, 0.0], [100.0, 100.0])));
        let far = Aabb::new([25_000.0, -40_000.0], [25_010.0, -39_990.0]);
        let id = tree.insert(far, 1);
        let root = tree.root_bounds().unwrap();
        assert!(root.owns_box(&far));
        assert!(root.size()[0] >= 50_000.0);
        assert_eq!(tree.verify(), Ok(()));
        assert_eq!(ids_in(&tree, &far), vec![id]);
    }

    #[test]
    fn seed_cell_is_snapped_and_half_open() {
        let mut tree = Points3::new(config());
        tree.insert(Point::new([100.0, 150.0, -50.0]), 0);
        assert_eq!(
            tree.root_bounds(),
            Some(Aabb::new([0.0, 100.0, -100.0], [100.0, 200.0, 0.0]))
        );
    }

    #[test]
    fn growth_toward_lower_side_keeps_old_root_as_child() {
        let mut tree = Boxes2::new(config());
        tree.insert(Aabb::new([10.0, 10.0], [20.0, 20.0]), 0);
        tree.insert(Aabb::new([-30.0, 40.0], [-20.0, 50.0]), 1);
        let root = tree.root.unwrap();
        // The new element sits below the old center on both axes.
        assert_eq!(tree.nodes[root].bounds, Aabb::new([-100.0, -100.0], [100.0, 100.0]));
        assert_eq!(tree.verify(), Ok(()));
    }

    #[test]
    fn insert_then_remove_restores_structure() {
        let mut tree = Boxes2::new(config());
        let mut rng = Rng(42);
        for i in 0..200 {
            tree.insert(rng.rect(1_000.0, 30.0), i);
        }
        tree.collapse(true);
        let nodes = tree.node_count();
        let extra = rng.rect(1_000.0, 30.0);
        let id = tree.insert(extra, 999);
        assert_eq!(tree.remove(id), Some(999));
        tree.collapse(true);
        assert_eq!(tree.len(), 200);
        assert_eq!(tree.node_count(), nodes);
        assert_eq!(tree.verify(), Ok(()));
        assert!(!tree.contains(id));
        assert_eq!(tree.remove(id), None);
    }

    #[test]
    fn removal_flattens_to_single_leaf() {
        let mut tree = Boxes2::new(config());
        let mut rng = Rng(7);
        let ids: Vec<_> = (0..100).map(|i| tree.insert(rng.rect(800.0, 10.0), i)).collect();
        assert!(tree.node_count() > 1);
        for id in &ids[..92] {
            tree.remove(*id);
            assert_eq!(tree.verify(), Ok(()));
        }
        let root = tree.root.unwrap();
        assert!(tree.nodes[root].is_leaf());
        assert_eq!(tree.nodes[root].items.len(), 8);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn collapse_replaces_oversized_root() {
        let mut tree = Boxes2::new(config());
        let mut rng = Rng(5);
        let near: Vec<_> = (0..20)
            .map(|i| {
                let x = rng.range(10.0, 60.0);
                tree.insert(Aabb::new([x, x], [x + 1.0, x + 1.0]), i)
            })
            .collect();
        let far = tree.insert(Aabb::new([9_000.0, 9_000.0], [9_001.0, 9_001.0]), 99);
        let grown = tree.root_bounds().unwrap();
        tree.remove(far);
        tree.collapse(true);
        let shrunk = tree.root_bounds().unwrap();
        assert!(shrunk.size()[0] < grown.size()[0]);
        assert_eq!(shrunk, Aabb::new([0.0, 0.0], [100.0, 100.0]));
        assert_eq!(tree.verify(), Ok(()));
        assert!(near.iter().all(|id| tree.contains(*id)));
    }

    #[test]
    fn collapse_of_emptied_tree_drops_root() {
        let mut tree = Boxes2::new(config());
        let near = tree.insert(Aabb::new([10.0, 10.0], [11.0, 11.0]), 0);
        let far = tree.insert(Aabb::new([9_000.0, 9_000.0], [9_001.0, 9_001.0]), 1);
        assert!(tree.node_count() > 1);
        tree.remove(near);
        tree.remove(far);
        tree.collapse(true);
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.root_bounds(), None);
        assert_eq!(tree.verify(), Ok(()));

        // The next insert seeds a minimum cell again.
        tree.insert(Aabb::new([10.0, 10.0], [11.0, 11.0]), 2);
        assert_eq!(tree.root_bounds(), Some(Aabb::new([0.0, 0.0], [100.0, 100.0])));
        assert!(!tree.contains(far));
    }

    #[test]
    fn local_update_stays_in_place() {
        let mut tree = Boxes2::new(config());
        let id = tree.insert(Aabb::new([10.0, 10.0], [20.0, 20.0]), 0);
        let nodes = tree.node_count();
        assert!(tree.update(id, Aabb::new([12.0, 12.0], [22.0, 22.0])));
        assert_eq!(tree.node_count(), nodes);
        assert_eq!(tree.verify(), Ok(()));
        assert!(tree.update(id, Aabb::new([12.0, 12.0], [22.0, 22.0])));
    }

    #[test]
    fn update_moves_between_subtrees() {
        let mut tree = Boxes2::new(config());
        let mut rng = Rng(99);
        let ids: Vec<_> = (0..300).map(|i| tree.insert(rng.rect(2_000.0, 20.0), i)).collect();
        for (n, id) in ids.iter().enumerate() {
            let target = rng.rect(4_000.0, 20.0);
            assert!(tree.update(*id, target));
            if n % 25 == 0 {
                assert_eq!(tree.verify(), Ok(()));
            }
            assert!(ids_in(&tree, &target).contains(id));
        }
        assert_eq!(tree.verify(), Ok(()));
        assert_eq!(tree.len(), 300);
    }

    #[test]
    fn straddling_box_pushed_down_when_it_fits_a_child() {
        let mut tree = Boxes2::new(config());
        let mut rng = Rng(3);
        for i in 0..64 {
            tree.insert(rng.rect(3_000.0, 5.0), i);
        }
        let root = tree.root.unwrap();
        let center = tree.nodes[root].center;
        let across = Aabb::new([center[0] - 5.0, center[1] - 5.0], [center[0] + 5.0, center[1] + 5.0]);
        let id = tree.insert(across, 100);
        assert!(tree.nodes[root].items.contains(&id.index()));
        let inside = Aabb::new([center[0] + 5.0, center[1] + 5.0], [center[0] + 15.0, center[1] + 15.0]);
        tree.update(id, inside);
        assert!(!tree.nodes[root].items.contains(&id.index()));
        assert_eq!(tree.verify(), Ok(()));
    }

    #[test]
    fn query_visits_stay_bounded_under_churn() {
        let mut tree = Boxes2::new(config());
        let mut rng = Rng(0xDEAD_BEEF);
        let ids: Vec<_> = (0..500).map(|i| tree.insert(rng.rect(3_000.0, 15.0), i)).collect();
        let query = Aabb::new([-200.0, -200.0], [200.0, 200.0]);

        let mut fresh = Boxes2::new(config());
        let mut peak = 0;
        for round in 0..20 {
            for id in &ids {
                let Some(cur) = tree.shape(*id) else { continue };
                let dx = rng.range(-60.0, 60.0);
                let dy = rng.range(-60.0, 60.0);
                let moved = Aabb::new(
                    [cur.min[0] + dx, cur.min[1] + dy],
                    [cur.max[0] + dx, cur.max[1] + dy],
                );
                tree.update(*id, moved);
            }
            if round % 5 == 4 {
                tree.collapse(true);
            }
            peak = peak.max(tree.probe(&query).nodes_visited);
        }
        for (_, shape, payload) in tree.iter() {
            fresh.insert(*shape, *payload);
        }
        let rebuilt = fresh.probe(&query).nodes_visited;
        assert_eq!(tree.verify(), Ok(()));
        assert_eq!(tree.probe(&query).hits, fresh.probe(&query).hits);
        assert!(
            peak <= rebuilt * 3 + 8,
            "churned tree visited {peak} cells, rebuilt tree {rebuilt}"
        );
    }

    #[test]
    fn point_tree_holds_payload_only_in_leaves() {
        let mut tree = Points3::new(config());
        let mut rng = Rng(11);
        for i in 0..400 {
            let p = [
                rng.range(-900.0, 900.0),
                rng.range(-900.0, 900.0),
                rng.range(-900.0, 900.0),
            ];
            tree.insert(Point::new(p), i);
        }
        assert_eq!(tree.verify(), Ok(()));
        let mut stack = vec![tree.root.unwrap()];
        while let Some(idx) = stack.pop() {
            let node = &tree.nodes[idx];
            assert!(node.is_leaf() || node.items.is_empty());
            stack.extend_from_slice(&node.children);
        }
    }

    #[test]
    fn split_stops_at_minimum_size() {
        let mut tree = Points3::new(config());
        for i in 0..50 {
            tree.insert(Point::new([10.0, 10.0, 10.0]), i);
        }
        assert_eq!(tree.verify(), Ok(()));
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn hold_slot_reuse_keeps_handles_unique() {
        let mut tree = Boxes2::new(config());
        let a = tree.insert(Aabb::new([1.0, 1.0], [2.0, 2.0]), 0);
        tree.hold_slot_reuse();
        tree.remove(a);
        let b = tree.insert(Aabb::new([1.0, 1.0], [2.0, 2.0]), 1);
        assert_ne!(a.index(), b.index());
        assert_eq!(tree.parked_slots(), 1);
        tree.release_slot_reuse();
        let c = tree.insert(Aabb::new([3.0, 3.0], [4.0, 4.0]), 2);
        assert_eq!(c.index(), a.index());
        assert_eq!(tree.get(a), None);
        assert_eq!(tree.get(c), Some(&2));
    }

    #[test]
    fn clear_invalidates_handles() {
        let mut tree = Boxes2::new(config());
        let a = tree.insert(Aabb::new([1.0, 1.0], [2.0, 2.0]), 0);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.root_bounds(), None);
        let b = tree.insert(Aabb::new([1.0, 1.0], [2.0, 2.0]), 1);
        assert_eq!(tree.get(a), None);
        assert_eq!(tree.get(b), Some(&1));
    }
}
