// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-channel detection state machine.

use core::mem;

use percept_container::{INVALID_HASH, SensedStimulus};
use percept_sorted::{ByKey, SortOrder, difference, insert_unique, is_sorted_unique, merge};
use tracing::trace;

use crate::best::best_by_score;

/// Handle to a record inside one [`DetectPool`].
///
/// Valid until the record leaves every event array, which at the latest happens one
/// cycle after it is reported in [`SenseEvent::Forget`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectId(u32);

impl DetectId {
    /// Slot index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// How many detection tiers a pool maintains. Each tier includes the ones before it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DetectDepth {
    /// Only the current matches.
    Current,
    /// Current plus newly detected.
    New,
    /// Also remember lost detections.
    Lost,
    /// Also age lost detections into forgotten ones.
    #[default]
    Forget,
}

/// The event arrays of a pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SenseEvent {
    /// Detected this cycle and not the previous one.
    New,
    /// Detected this cycle.
    Current,
    /// Detected the previous cycle and not this one.
    LostCurrent,
    /// Lost and still remembered.
    Lost,
    /// Aged out of [`SenseEvent::Lost`] this cycle.
    Forget,
}

/// Per-channel tuning.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DetectConfig {
    /// Tiers to maintain.
    pub depth: DetectDepth,
    /// Size of the best-score set; `0` disables tracking.
    pub track_best: usize,
    /// Records scoring below this are neither staged nor tracked.
    pub min_best_score: f32,
    /// Cut each cycle's matches down to the best-score set.
    pub force_by_best_score: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            depth: DetectDepth::Forget,
            track_best: 0,
            min_best_score: 0.0,
            force_by_best_score: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Slots {
    items: Vec<Option<SensedStimulus>>,
    free: Vec<u32>,
    len: usize,
}

impl Slots {
    fn alloc(&mut self, record: SensedStimulus) -> DetectId {
        self.len += 1;
        if let Some(i) = self.free.pop() {
            self.items[i as usize] = Some(record);
            return DetectId(i);
        }
        self.items.push(Some(record));
        #[allow(
            clippy::cast_possible_truncation,
            reason = "A pool holds far fewer than u32::MAX records."
        )]
        DetectId((self.items.len() - 1) as u32)
    }

    fn release(&mut self, id: DetectId) {
        if self.items.get_mut(id.index()).and_then(Option::take).is_some() {
            self.len -= 1;
            self.free.push(id.0);
        }
    }

    fn release_all(&mut self, ids: &mut Vec<DetectId>) {
        for id in ids.drain(..) {
            self.release(id);
        }
    }

    fn get(&self, id: DetectId) -> Option<&SensedStimulus> {
        self.items.get(id.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: DetectId) -> Option<&mut SensedStimulus> {
        self.items.get_mut(id.index()).and_then(Option::as_mut)
    }

    fn hash(&self, id: DetectId) -> u32 {
        self.get(id).map_or(INVALID_HASH, |r| r.hash)
    }

    fn score(&self, id: DetectId) -> f32 {
        self.get(id).map_or(f32::NEG_INFINITY, |r| r.score)
    }

    fn clear(&mut self) {
        self.items.clear();
        self.free.clear();
        self.len = 0;
    }
}

/// Order handles by the fingerprint of the record they point at.
fn by_hash(slots: &Slots) -> ByKey<impl Fn(&DetectId) -> u32 + '_> {
    ByKey(move |id: &DetectId| slots.hash(*id))
}

fn find(slots: &Slots, ids: &[DetectId], hash: u32) -> Option<DetectId> {
    ids.binary_search_by_key(&hash, |id| slots.hash(*id))
        .ok()
        .map(|i| ids[i])
}

/// Detection state of one sensor channel.
///
/// Each cycle a sensor stages its matches with [`DetectPool::add`], then calls
/// [`DetectPool::new_sensed_update`] (or [`DetectPool::empty_update`] when nothing
/// matched) followed by [`DetectPool::new_age_update`]. Afterwards the event arrays
/// describe what changed:
///
/// - `Current` holds this cycle's matches and `New` the subset not matched last cycle.
/// - `Lost` holds earlier matches still within their age, `LostCurrent` those lost
///   this cycle.
/// - `Forget` holds entries that aged out of `Lost` this cycle. Their records are
///   released at the start of the next update.
///
/// Every array is sorted by record fingerprint. `Current`, `Lost` and `Forget` are
/// pairwise disjoint, and `New` is disjoint from `Lost` and `Forget`.
#[derive(Clone, Debug, Default)]
pub struct DetectPool {
    config: DetectConfig,
    slots: Slots,
    new: Vec<DetectId>,
    current: Vec<DetectId>,
    lost_current: Vec<DetectId>,
    lost: Vec<DetectId>,
    forget: Vec<DetectId>,
    detect_new: Vec<DetectId>,
    detect_current: Vec<DetectId>,
    best: Vec<DetectId>,
}

impl DetectPool {
    /// An empty pool.
    pub fn new(config: DetectConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The pool's configuration.
    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.slots.len
    }

    /// Whether no records are held.
    pub fn is_empty(&self) -> bool {
        self.slots.len == 0
    }

    /// Record behind a handle.
    pub fn get(&self, id: DetectId) -> Option<&SensedStimulus> {
        self.slots.get(id)
    }

    /// Handles in an event array, sorted by fingerprint.
    pub fn events(&self, event: SenseEvent) -> &[DetectId] {
        match event {
            SenseEvent::New => &self.new,
            SenseEvent::Current => &self.current,
            SenseEvent::LostCurrent => &self.lost_current,
            SenseEvent::Lost => &self.lost,
            SenseEvent::Forget => &self.forget,
        }
    }

    /// Copies of the records in an event array.
    pub fn copy_of(&self, event: SenseEvent) -> Vec<SensedStimulus> {
        self.events(event)
            .iter()
            .filter_map(|&id| self.slots.get(id))
            .filter(|r| r.has_identity())
            .cloned()
            .collect()
    }

    /// The best-score set of the latest cycle, best first.
    pub fn best_ids(&self) -> &[DetectId] {
        &self.best
    }

    /// The current entry with fingerprint `hash`.
    pub fn contains_in_current(&self, hash: u32) -> Option<DetectId> {
        find(&self.slots, &self.current, hash)
    }

    /// The lost entry with fingerprint `hash`.
    pub fn contains_in_lost(&self, hash: u32) -> Option<DetectId> {
        find(&self.slots, &self.lost, hash)
    }

    /// Stage a match for the next update.
    ///
    /// Records without identity or scoring below the minimum are dropped. A
    /// record matching a current entry keeps that entry's `first_sensed_time`;
    /// one matching a lost entry restarts it at `now`.
    pub fn add(&mut self, now: f64, mut record: SensedStimulus) -> bool {
        if !record.has_identity() || record.score < self.config.min_best_score {
            return false;
        }
        record.sensed_time = now;
        let hash = record.hash;

        let (id, keep_first) = if let Some(id) = find(&self.slots, &self.current, hash) {
            (id, true)
        } else if let Some(id) = find(&self.slots, &self.lost, hash) {
            (id, false)
        } else if let Some(id) = find(&self.slots, &self.detect_new, hash) {
            (id, true)
        } else {
            record.first_sensed_time = now;
            let id = self.slots.alloc(record);
            insert_unique(&mut self.detect_new, id, &by_hash(&self.slots), false);
            return true;
        };

        if let Some(slot) = self.slots.get_mut(id) {
            record.first_sensed_time = if keep_first {
                slot.first_sensed_time
            } else {
                now
            };
            *slot = record;
        }
        if find(&self.slots, &self.detect_new, hash).is_none() {
            insert_unique(&mut self.detect_current, id, &by_hash(&self.slots), false);
        }
        true
    }

    /// Fold the staged matches in, replacing the previous state when
    /// `override_state` is set and adding to it otherwise.
    ///
    /// Either way, New holds this batch minus what was already current. In the
    /// additive form nothing leaves Current, and a re-match only takes a record
    /// out of Lost.
    pub fn new_sensed_update(&mut self, override_state: bool) {
        if override_state {
            self.new_sensed();
        } else {
            self.add_sensed();
        }
        self.trace_cycle("sensed");
    }

    /// Take the staged matches as a sorted candidate set, after the best-score cut.
    fn take_candidates(&mut self) -> Vec<DetectId> {
        let mut candidates = mem::take(&mut self.detect_current);
        merge(&mut candidates, &self.detect_new, &by_hash(&self.slots), false);
        self.best_score_update(&mut candidates, self.config.force_by_best_score);

        // Fresh records cut by the best-score pass are dropped outright.
        let mut dropped = mem::take(&mut self.detect_new);
        difference(&mut dropped, &candidates, &by_hash(&self.slots));
        self.slots.release_all(&mut dropped);
        candidates
    }

    fn new_sensed(&mut self) {
        self.slots.release_all(&mut self.forget);
        let matched = self.take_candidates();
        let depth = self.config.depth;

        if depth >= DetectDepth::New {
            self.new.clone_from(&matched);
            difference(&mut self.new, &self.current, &by_hash(&self.slots));
            let mut gone = mem::take(&mut self.current);
            difference(&mut gone, &matched, &by_hash(&self.slots));

            if depth >= DetectDepth::Lost {
                difference(&mut self.lost, &matched, &by_hash(&self.slots));
                if depth >= DetectDepth::Forget {
                    merge(&mut self.lost, &gone, &by_hash(&self.slots), false);
                } else {
                    self.slots.release_all(&mut self.lost);
                    self.lost.clone_from(&gone);
                }
                self.lost_current = gone;
            } else {
                self.slots.release_all(&mut gone);
                self.release_lost();
            }
        } else {
            let mut gone = mem::take(&mut self.current);
            difference(&mut gone, &matched, &by_hash(&self.slots));
            self.slots.release_all(&mut gone);
            self.release_lost();
            self.new.clear();
        }
        self.current = matched;
        self.debug_check();
    }

    /// Additive fold: Current grows by the batch, New is the batch minus the old
    /// Current, and LostCurrent is cleared.
    fn add_sensed(&mut self) {
        self.slots.release_all(&mut self.forget);
        let matched = self.take_candidates();

        if self.config.depth >= DetectDepth::New {
            self.new.clone_from(&matched);
            difference(&mut self.new, &self.current, &by_hash(&self.slots));
        } else {
            self.new.clear();
        }
        difference(&mut self.lost, &matched, &by_hash(&self.slots));
        self.lost_current.clear();
        merge(&mut self.current, &matched, &by_hash(&self.slots), false);
        self.debug_check();
    }

    /// A cycle without matches.
    ///
    /// With `override_state` everything current becomes lost. Without it the state
    /// is kept, minus entries `is_alive` rejects.
    pub fn empty_update(&mut self, override_state: bool, is_alive: impl Fn(&SensedStimulus) -> bool) {
        self.slots.release_all(&mut self.forget);
        self.slots.release_all(&mut self.detect_new);
        self.detect_current.clear();
        let depth = self.config.depth;

        if override_state {
            self.best.clear();
            self.new.clear();
            let mut gone = mem::take(&mut self.current);
            if depth >= DetectDepth::Lost {
                if depth >= DetectDepth::Forget {
                    merge(&mut self.lost, &gone, &by_hash(&self.slots), false);
                } else {
                    self.slots.release_all(&mut self.lost);
                    self.lost.clone_from(&gone);
                }
                self.lost_current = gone;
            } else {
                self.slots.release_all(&mut gone);
                self.release_lost();
            }
        } else {
            self.lost_current.clear();
            let slots = &self.slots;
            self.new
                .retain(|&id| slots.get(id).is_some_and(|r| is_alive(r)));
            let (alive, mut dead): (Vec<_>, Vec<_>) = self
                .current
                .iter()
                .copied()
                .partition(|&id| slots.get(id).is_some_and(|r| is_alive(r)));
            self.slots.release_all(&mut dead);
            let mut current = alive;
            self.best_score_update(&mut current, false);
            self.current = current;
        }
        self.debug_check();
        self.trace_cycle("empty");
    }

    /// Age lost entries.
    ///
    /// A lost entry is forgotten once `now >= sensed_time + age`, or immediately
    /// when its age is zero. Entries `is_alive` rejects are dropped, including from
    /// `LostCurrent`.
    pub fn new_age_update(&mut self, now: f64, is_alive: impl Fn(&SensedStimulus) -> bool) {
        if self.config.depth < DetectDepth::Forget {
            self.slots.release_all(&mut self.forget);
            return;
        }
        if self.lost.is_empty() {
            return;
        }
        let mut kept = Vec::with_capacity(self.lost.len());
        let mut expired = Vec::new();
        let mut dead = Vec::new();
        for &id in &self.lost {
            match self.slots.get(id) {
                Some(r) if is_alive(r) => {
                    if r.age == 0.0 || now >= r.sensed_time + r.age {
                        expired.push(id);
                    } else {
                        kept.push(id);
                    }
                }
                _ => dead.push(id),
            }
        }
        self.lost = kept;
        merge(&mut self.forget, &expired, &by_hash(&self.slots), false);
        difference(&mut self.lost_current, &dead, &by_hash(&self.slots));
        self.slots.release_all(&mut dead);
        self.debug_check();
        if !self.forget.is_empty() {
            trace!(forgotten = self.forget.len(), lost = self.lost.len(), "detect age pass");
        }
    }

    /// Apply a channel mask to every record. Records left without channels are
    /// evicted from every array.
    pub fn retain_channels(&mut self, mask: u64) {
        let mut evicted = Vec::new();
        for (i, slot) in self.slots.items.iter_mut().enumerate() {
            if let Some(record) = slot {
                record.channels &= mask;
                if record.channels == 0 {
                    #[allow(
                        clippy::cast_possible_truncation,
                        reason = "Slot indices come from DetectId."
                    )]
                    evicted.push(DetectId(i as u32));
                }
            }
        }
        if evicted.is_empty() {
            return;
        }
        let hit = |id: &DetectId| evicted.contains(id);
        for array in [
            &mut self.new,
            &mut self.current,
            &mut self.lost_current,
            &mut self.lost,
            &mut self.forget,
            &mut self.detect_new,
            &mut self.detect_current,
            &mut self.best,
        ] {
            array.retain(|id| !hit(id));
        }
        for id in evicted {
            self.slots.release(id);
        }
        self.debug_check();
    }

    /// Drop every record and event.
    pub fn clear(&mut self) {
        self.slots.clear();
        for array in [
            &mut self.new,
            &mut self.current,
            &mut self.lost_current,
            &mut self.lost,
            &mut self.forget,
            &mut self.detect_new,
            &mut self.detect_current,
            &mut self.best,
        ] {
            array.clear();
        }
    }

    /// Whether every array is sorted and duplicate-free, the tiers are disjoint as
    /// documented on [`DetectPool`], and every handle resolves.
    pub fn check_sorted(&self) -> bool {
        let order = by_hash(&self.slots);
        let arrays = [
            &self.new,
            &self.current,
            &self.lost_current,
            &self.lost,
            &self.forget,
            &self.detect_new,
            &self.detect_current,
        ];
        let resolved = arrays
            .iter()
            .all(|a| a.iter().all(|&id| self.slots.get(id).is_some()));
        let sorted = arrays.iter().all(|a| is_sorted_unique(a.as_slice(), &order));
        let disjoint = |a: &[DetectId], b: &[DetectId]| {
            a.iter().all(|x| b.binary_search_by(|y| order.compare(y, x)).is_err())
        };
        resolved
            && sorted
            && disjoint(&self.current, &self.lost)
            && disjoint(&self.current, &self.forget)
            && disjoint(&self.lost, &self.forget)
            && disjoint(&self.new, &self.lost)
            && disjoint(&self.new, &self.forget)
    }

    fn debug_check(&self) {
        debug_assert!(self.check_sorted(), "detect pool arrays out of order");
    }

    fn release_lost(&mut self) {
        self.slots.release_all(&mut self.forget);
        self.slots.release_all(&mut self.lost);
        self.lost_current.clear();
    }

    /// Recompute the best-score set over `candidates`, and with `force` cut the
    /// candidates down to it.
    fn best_score_update(&mut self, candidates: &mut Vec<DetectId>, force: bool) {
        let count = self.config.track_best;
        if count == 0 {
            self.best.clear();
            return;
        }
        let scores: Vec<f32> = candidates.iter().map(|&id| self.slots.score(id)).collect();
        let picked = best_by_score(&scores, count, self.config.min_best_score);
        self.best = picked.iter().map(|&i| candidates[i]).collect();
        if force && candidates.len() > self.best.len() {
            let mut kept = self.best.clone();
            kept.sort_unstable_by_key(|&id| self.slots.hash(id));
            *candidates = kept;
        }
    }

    fn trace_cycle(&self, kind: &'static str) {
        trace!(
            kind,
            new = self.new.len(),
            current = self.current.len(),
            lost = self.lost.len(),
            forget = self.forget.len(),
            pooled = self.slots.len,
            "detect cycle"
        );
    }
}
