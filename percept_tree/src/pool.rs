// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot pools for nodes and elements.

use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

/// Generational handle for tree elements.
///
/// A handle stays valid until its element is removed. Slots are recycled, but
/// each reuse bumps the generation, so a stale handle never resolves to a newer
/// element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u32, u32);

impl ElementId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Element slots are 32-bit; a pool never grows past u32::MAX entries."
    )]
    pub(crate) const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    /// Slot index of the element.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Generation of the slot at the time the handle was issued.
    pub const fn generation(self) -> u32 {
        self.1
    }
}

#[derive(Clone, Debug)]
struct Slot<V> {
    generation: u32,
    value: Option<V>,
}

/// Element storage with generations and optionally deferred slot reuse.
#[derive(Clone, Debug)]
pub(crate) struct ElementSlab<V> {
    slots: Vec<Slot<V>>,
    free: Vec<usize>,
    parked: Vec<usize>,
    hold_reuse: bool,
    len: usize,
}

impl<V> Default for ElementSlab<V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            parked: Vec::new(),
            hold_reuse: false,
            len: 0,
        }
    }
}

impl<V> ElementSlab<V> {
    pub(crate) fn reserve(&mut self, n: usize) {
        self.slots.reserve(n);
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn insert(&mut self, value: V) -> ElementId {
        self.len += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            return ElementId::new(idx, slot.generation);
        }
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        ElementId::new(self.slots.len() - 1, 1)
    }

    pub(crate) fn remove(&mut self, id: ElementId) -> Option<V> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        self.len -= 1;
        if self.hold_reuse {
            self.parked.push(id.index());
        } else {
            self.free.push(id.index());
        }
        Some(value)
    }

    pub(crate) fn get(&self, id: ElementId) -> Option<&V> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut V> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Access by raw slot index, for slots the tree knows to be occupied.
    pub(crate) fn entry(&self, idx: usize) -> Option<(ElementId, &V)> {
        let slot = self.slots.get(idx)?;
        slot.value
            .as_ref()
            .map(|v| (ElementId::new(idx, slot.generation), v))
    }

    pub(crate) fn at(&self, idx: usize) -> Option<&V> {
        self.slots.get(idx).and_then(|s| s.value.as_ref())
    }

    pub(crate) fn at_mut(&mut self, idx: usize) -> Option<&mut V> {
        self.slots.get_mut(idx).and_then(|s| s.value.as_mut())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ElementId, &V)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.value
                .as_ref()
                .map(|v| (ElementId::new(idx, slot.generation), v))
        })
    }

    /// Stop handing freed slots back out until [`Self::release_reuse`].
    pub(crate) fn hold_reuse(&mut self) {
        self.hold_reuse = true;
    }

    pub(crate) fn release_reuse(&mut self) {
        self.hold_reuse = false;
        self.free.append(&mut self.parked);
    }

    pub(crate) fn is_holding(&self) -> bool {
        self.hold_reuse
    }

    pub(crate) fn parked(&self) -> usize {
        self.parked.len()
    }

    /// Drop every element, keeping generations so old handles stay stale.
    pub(crate) fn clear(&mut self) {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                if self.hold_reuse {
                    self.parked.push(idx);
                } else {
                    self.free.push(idx);
                }
            }
        }
        self.len = 0;
    }
}

/// Index of a node in the node arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeIdx(u32);

impl NodeIdx {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Node arenas are 32-bit indexed."
    )]
    const fn new(i: usize) -> Self {
        Self(i as u32)
    }

    pub(crate) const fn get(self) -> usize {
        self.0 as usize
    }
}

/// Node storage. Node indices are internal, so no generations are kept.
///
/// Released nodes stay in place until their index is handed out again, so growth
/// never moves a live node to a different index.
#[derive(Clone, Debug)]
pub(crate) struct Arena<N> {
    nodes: Vec<N>,
    live: Vec<bool>,
    free: Vec<usize>,
}

impl<N> Default for Arena<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            live: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<N> Arena<N> {
    /// Make room for `n` more nodes without reallocating.
    pub(crate) fn reserve(&mut self, n: usize) {
        let spare = self.free.len() + (self.nodes.capacity() - self.nodes.len());
        if spare < n {
            self.nodes.reserve(n - spare);
            self.live.reserve(n - spare);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub(crate) fn alloc(&mut self, node: N) -> NodeIdx {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = node;
            self.live[idx] = true;
            return NodeIdx::new(idx);
        }
        self.nodes.push(node);
        self.live.push(true);
        NodeIdx::new(self.nodes.len() - 1)
    }

    pub(crate) fn release(&mut self, idx: NodeIdx) {
        let Some(live) = self.live.get_mut(idx.get()) else {
            return;
        };
        debug_assert!(*live, "node released twice");
        if core::mem::replace(live, false) {
            self.free.push(idx.get());
        }
    }

    pub(crate) fn get(&self, idx: NodeIdx) -> Option<&N> {
        if !self.live.get(idx.get()).copied().unwrap_or(false) {
            return None;
        }
        self.nodes.get(idx.get())
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.live.clear();
        self.free.clear();
    }
}

impl<N> Index<NodeIdx> for Arena<N> {
    type Output = N;

    #[inline]
    fn index(&self, idx: NodeIdx) -> &N {
        &self.nodes[idx.get()]
    }
}

impl<N> IndexMut<NodeIdx> for Arena<N> {
    #[inline]
    fn index_mut(&mut self, idx: NodeIdx) -> &mut N {
        &mut self.nodes[idx.get()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_does_not_resolve_after_reuse() {
        let mut slab = ElementSlab::default();
        let a = slab.insert('a');
        assert_eq!(slab.remove(a), Some('a'));
        let b = slab.insert('b');
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert_eq!(slab.get(a), None);
        assert_eq!(slab.get(b), Some(&'b'));
        assert_eq!(slab.remove(a), None);
    }

    #[test]
    fn held_slots_are_not_reused() {
        let mut slab = ElementSlab::default();
        let a = slab.insert(1);
        slab.hold_reuse();
        slab.remove(a);
        let b = slab.insert(2);
        assert_ne!(a.index(), b.index());
        assert_eq!(slab.parked(), 1);
        slab.release_reuse();
        let c = slab.insert(3);
        assert_eq!(c.index(), a.index());
        assert_eq!(slab.len(), 2);
    }

    #[test]
    fn arena_recycles_indices() {
        let mut arena = Arena::default();
        let a = arena.alloc(10);
        let b = arena.alloc(20);
        arena.release(a);
        assert_eq!(arena.get(a), None);
        assert_eq!(arena[b], 20);
        let c = arena.alloc(30);
        assert_eq!(c, a);
        assert_eq!(arena[c], 30);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn arena_lookup_tracks_liveness() {
        let mut arena = Arena::default();
        let idx: Vec<_> = (0..64).map(|i| arena.alloc(i)).collect();
        for &i in idx.iter().step_by(2) {
            arena.release(i);
        }
        for (n, &i) in idx.iter().enumerate() {
            let expected = (n % 2 == 1).then_some(n);
            assert_eq!(arena.get(i).copied(), expected);
        }
        assert_eq!(arena.len(), 32);
        let again = arena.alloc(100);
        assert_eq!(arena.get(again), Some(&100));
        arena.clear();
        assert_eq!(arena.get(again), None);
        assert_eq!(arena.len(), 0);
    }
}
