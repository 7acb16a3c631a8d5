// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Percept Detect: turn per-cycle matches into detection events.
//!
//! A sensor keeps one [`DetectPool`] per channel. Each cycle it stages the stimuli
//! that passed its tests, and the pool derives which are new, still current, just
//! lost, remembered as lost, or forgotten after their age ran out. All bookkeeping
//! is set algebra over handle arrays sorted by stimulus fingerprint, using
//! [`percept_sorted`].
//!
//! [`best_by_score`] picks the highest-scoring matches and can optionally cut the
//! cycle down to them.
//!
//! # Example
//!
//! ```rust
//! use percept_container::SensedStimulus;
//! use percept_detect::{DetectConfig, DetectPool, SenseEvent};
//!
//! let mut pool = DetectPool::new(DetectConfig::default());
//! pool.add(0.0, SensedStimulus::new(7, 1).with_age(2.0));
//! pool.new_sensed_update(true);
//! pool.new_age_update(0.0, |_| true);
//! assert_eq!(pool.events(SenseEvent::New).len(), 1);
//!
//! // Nothing sensed: the stimulus is lost, then forgotten once its age runs out.
//! pool.empty_update(true, |_| true);
//! pool.new_age_update(1.0, |_| true);
//! assert_eq!(pool.events(SenseEvent::Lost).len(), 1);
//! pool.empty_update(true, |_| true);
//! pool.new_age_update(2.5, |_| true);
//! assert_eq!(pool.copy_of(SenseEvent::Forget)[0].owner, 7);
//! ```

mod best;
mod pool;

pub use best::{Strategy, best_by_score, best_with};
pub use pool::{DetectConfig, DetectDepth, DetectId, DetectPool, SenseEvent};
