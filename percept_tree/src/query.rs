// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Range and nearest-neighbour queries.

use alloc::vec::Vec;

use crate::pool::{ElementId, NodeIdx};
use crate::shape::{Shape, single_child};
use crate::tree::{Element, Tree};
use crate::types::{Aabb, Scalar, dist_sq, lt};

/// Handle to a tree cell, valid until the next structural mutation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CellId(NodeIdx);

/// Work done by one range query, as reported by [`Tree::probe`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Cells whose lists or children were examined.
    pub nodes_visited: usize,
    /// Elements tested against the query box.
    pub elements_tested: usize,
    /// Elements that intersected.
    pub hits: usize,
}

impl<T: Scalar, const D: usize, S: Shape<T, D>, E> Tree<T, D, S, E> {
    /// The smallest cell whose subtree holds every element that can intersect `query`.
    ///
    /// Returns `None` when nothing can intersect.
    pub fn max_intersect(&self, query: &Aabb<T, D>) -> Option<CellId> {
        self.max_intersect_node(query).map(CellId)
    }

    /// Bounds of a cell returned by [`Self::max_intersect`].
    pub fn cell_bounds(&self, cell: CellId) -> Option<Aabb<T, D>> {
        self.nodes.get(cell.0).map(|n| n.bounds)
    }

    pub(crate) fn max_intersect_node(&self, query: &Aabb<T, D>) -> Option<NodeIdx> {
        let mut cur = self.root?;
        let mut clipped = *query;
        loop {
            let node = &self.nodes[cur];
            if node.count == 0 || !node.bounds.intersects(&clipped) {
                return None;
            }
            clipped = clipped.intersect(&node.bounds);
            if node.is_leaf() {
                return Some(cur);
            }
            // Straddling boxes kept here are outside every child.
            let anchored = node.items.iter().any(|&slot| {
                self.elements
                    .at(slot)
                    .is_some_and(|e| e.shape.intersects(&clipped))
            });
            if anchored {
                return Some(cur);
            }
            match single_child(Shape::<T, D>::child_mask(&clipped, &node.center)) {
                Some(code) => cur = node.children[code],
                None => return Some(cur),
            }
        }
    }

    /// Call `f` for every element intersecting `query`.
    pub fn for_each_in(&self, query: &Aabb<T, D>, mut f: impl FnMut(ElementId, &S, &E)) {
        let mut stats = QueryStats::default();
        self.visit(query, &mut stats, |id, e| f(id, &e.shape, &e.payload));
    }

    /// Append the handles of elements intersecting `query` and accepted by `filter`.
    pub fn query_ids(
        &self,
        query: &Aabb<T, D>,
        mut filter: impl FnMut(&S, &E) -> bool,
        out: &mut Vec<ElementId>,
    ) {
        let mut stats = QueryStats::default();
        self.visit(query, &mut stats, |id, e| {
            if filter(&e.shape, &e.payload) {
                out.push(id);
            }
        });
    }

    /// Copies of the payloads of elements intersecting `query` and accepted by `filter`.
    pub fn elements_in(
        &self,
        query: &Aabb<T, D>,
        mut filter: impl FnMut(&S, &E) -> bool,
    ) -> Vec<E>
    where
        E: Clone,
    {
        let mut out = Vec::new();
        let mut stats = QueryStats::default();
        self.visit(query, &mut stats, |_, e| {
            if filter(&e.shape, &e.payload) {
                out.push(e.payload.clone());
            }
        });
        out
    }

    /// Run a range query and report how much of the tree it touched.
    pub fn probe(&self, query: &Aabb<T, D>) -> QueryStats {
        let mut stats = QueryStats::default();
        self.visit(query, &mut stats, |_, _| {});
        stats
    }

    /// Visit from the smallest covering cell down. Point trees only test leaves;
    /// box trees test every list on the way.
    fn visit(
        &self,
        query: &Aabb<T, D>,
        stats: &mut QueryStats,
        mut f: impl FnMut(ElementId, &Element<S, E>),
    ) {
        let Some(start) = self.max_intersect_node(query) else {
            return;
        };
        let mut stack = alloc::vec![start];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            stats.nodes_visited += 1;
            if !S::IS_POINT || node.is_leaf() {
                for &slot in &node.items {
                    let Some((id, element)) = self.elements.entry(slot) else {
                        continue;
                    };
                    stats.elements_tested += 1;
                    if element.shape.intersects(query) {
                        stats.hits += 1;
                        f(id, element);
                    }
                }
            }
            for &child in &node.children {
                let c = &self.nodes[child];
                if c.count > 0 && c.bounds.intersects(query) {
                    stack.push(child);
                }
            }
        }
    }

    /// The element whose center is closest to `id`'s center, excluding `id`.
    ///
    /// Searches the nearest ancestor cell holding more than `id`, then the lists of
    /// the cells above it. Elements in neighbouring cells outside that ancestor are
    /// not considered, so the answer is local rather than global.
    pub fn find_nearest(&self, id: ElementId) -> Option<ElementId> {
        let element = self.elements.get(id)?;
        let origin = element.shape.center();
        let mut anchor = element.node;
        while self.nodes[anchor].count <= 1 {
            anchor = self.nodes[anchor].parent?;
        }

        let mut best: Option<(T, usize)> = None;
        let mut consider = |slot: usize| {
            if slot == id.index() {
                return;
            }
            let Some(e) = self.elements.at(slot) else {
                return;
            };
            let d = dist_sq(&origin, &e.shape.center());
            if best.is_none_or(|(bd, _)| lt(d, bd)) {
                best = Some((d, slot));
            }
        };

        let mut stack = alloc::vec![anchor];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            node.items.iter().for_each(|&slot| consider(slot));
            stack.extend_from_slice(&node.children);
        }
        let mut up = self.nodes[anchor].parent;
        while let Some(idx) = up {
            let node = &self.nodes[idx];
            node.items.iter().for_each(|&slot| consider(slot));
            up = node.parent;
        }

        best.and_then(|(_, slot)| self.elements.entry(slot).map(|(id, _)| id))
    }
}
