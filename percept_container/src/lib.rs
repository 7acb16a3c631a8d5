// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Percept Container: a thread-safe stimulus index.
//!
//! [`SenseContainer`] wraps a [`percept_tree`] quadtree or octree of
//! [`SensedStimulus`] records behind a reader/writer lock.
//!
//! - The owning thread inserts, moves and removes stimuli under the write lock.
//! - Query threads ask for handles in a box, ball, or box-and-ball [`Region`],
//!   filtered by a 64-bit channel mask, under the read lock.
//! - Records are only ever copied out (`*_ts` accessors), never borrowed.
//!
//! ## Remove sessions
//!
//! A reader that collects handles and then examines them one by one opens a
//! [`RemoveSession`]. While any session is open, removals are recorded and freed
//! slots are held back, so no handle from the snapshot can be recycled for a
//! different stimulus. [`SenseContainer::sensed_copy_ts`] reports a handle removed
//! during the session as not found.
//!
//! ```rust
//! use percept_container::{SenseContainer, SensedStimulus};
//! use percept_tree::Aabb;
//!
//! let container = SenseContainer::default();
//! let id = container.insert(
//!     SensedStimulus::new(42, 0b1),
//!     Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]),
//! );
//!
//! let session = container.remove_session();
//! let seen = container.in_radius_ids([0.5, 0.5, 0.5], 10.0, 0b1);
//! assert_eq!(seen, [id]);
//!
//! container.remove(id);
//! assert!(container.sensed_copy_ts(seen[0]).is_none());
//! drop(session);
//! ```

mod container;
mod spatial;
mod stimulus;

pub use container::{ContainerConfig, RemoveSession, SenseContainer};
pub use percept_tree::ElementId;
pub use spatial::{Region, TreeKind};
pub use stimulus::{INVALID_HASH, SenseFlags, SensedPoint, SensedStimulus, fingerprint};

/// A 3D position.
pub type Vec3 = [f64; 3];

/// A 3D box.
pub type Aabb3 = percept_tree::Aabb<f64, 3>;
