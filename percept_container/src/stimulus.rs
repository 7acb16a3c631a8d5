// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-stimulus record stored in a container.

use ahash::RandomState;
use bitflags::bitflags;
use percept_sorted::Fingerprint;
use percept_tree::ElementId;

use crate::Vec3;

/// Fingerprint value reserved for "no identity".
pub const INVALID_HASH: u32 = u32::MAX;

/// Fixed seeds so a given owner always maps to the same fingerprint within a build.
const FINGERPRINT_HASHER: RandomState = RandomState::with_seeds(
    0x243F_6A88_85A3_08D3,
    0x1319_8A2E_0370_7344,
    0xA409_3822_299F_31D0,
    0x082E_FA98_EC4E_6C89,
);

/// The 32-bit fingerprint of an owner id. Never returns [`INVALID_HASH`].
pub fn fingerprint(owner: u64) -> u32 {
    let h = FINGERPRINT_HASHER.hash_one(owner);
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Folding the two halves is the point."
    )]
    let folded = (h ^ (h >> 32)) as u32;
    if folded == INVALID_HASH {
        INVALID_HASH - 1
    } else {
        folded
    }
}

bitflags! {
    /// Lifecycle flags of a stimulus.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SenseFlags: u8 {
        /// The stimulus can currently be sensed.
        const ENABLED    = 0b0000_0001;
        /// The stimulus is registered with its owner framework.
        const REGISTERED = 0b0000_0010;
    }
}

impl Default for SenseFlags {
    fn default() -> Self {
        Self::ENABLED | Self::REGISTERED
    }
}

/// One location on a stimulus that a sensor test matched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensedPoint {
    /// World position.
    pub point: Vec3,
    /// Score the test assigned to this point.
    pub score: f32,
    /// Index of the test in the sensor's chain.
    pub test: u8,
}

/// A stimulus as seen by the sense system.
///
/// Two records are equal when their fingerprints are, whatever their other fields.
#[derive(Clone, Debug)]
pub struct SensedStimulus {
    /// Identifier assigned by the owning framework.
    pub owner: u64,
    /// Content fingerprint; [`INVALID_HASH`] marks a record that must not be tracked.
    pub hash: u32,
    /// Detection score in `[0, 1]` after the sensor's tests.
    pub score: f32,
    /// How long a lost detection is remembered before it is forgotten.
    pub age: f64,
    /// Time of the latest detection.
    pub sensed_time: f64,
    /// Time of the first detection in the current streak, or `-1` if never detected.
    pub first_sensed_time: f64,
    /// Channel bitmask.
    pub channels: u64,
    /// Points matched by the latest detection.
    pub sensed_points: Vec<SensedPoint>,
    /// Lifecycle flags.
    pub flags: SenseFlags,
    /// Handle inside the container, set on insert.
    pub handle: Option<ElementId>,
}

impl Default for SensedStimulus {
    fn default() -> Self {
        Self {
            owner: 0,
            hash: INVALID_HASH,
            score: 1.0,
            age: 0.0,
            sensed_time: 0.0,
            first_sensed_time: -1.0,
            channels: u64::MAX,
            sensed_points: Vec::new(),
            flags: SenseFlags::default(),
            handle: None,
        }
    }
}

impl SensedStimulus {
    /// A record for `owner` on `channels`, fingerprinted from the owner id.
    pub fn new(owner: u64, channels: u64) -> Self {
        Self {
            owner,
            hash: fingerprint(owner),
            channels,
            ..Self::default()
        }
    }

    /// Builder-style age setter.
    #[must_use]
    pub fn with_age(mut self, age: f64) -> Self {
        self.age = age;
        self
    }

    /// Builder-style score setter.
    #[must_use]
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Whether the record carries an identity.
    pub fn has_identity(&self) -> bool {
        self.hash != INVALID_HASH
    }

    /// Whether the record is trackable right now.
    pub fn is_enabled(&self) -> bool {
        self.has_identity() && self.flags.contains(SenseFlags::ENABLED)
    }

    /// Whether any of `mask`'s channels are set on this record.
    pub fn on_channels(&self, mask: u64) -> bool {
        self.channels & mask != 0
    }
}

impl PartialEq for SensedStimulus {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for SensedStimulus {}

impl Fingerprint for SensedStimulus {
    #[inline]
    fn fingerprint(&self) -> u32 {
        self.hash
    }
}
