// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Percept Sorted: set algebra over sorted dynamic arrays.
//!
//! Every operation works on a `Vec<T>` (or slice) kept strictly increasing under a
//! [`SortOrder`]. Elements comparing equal are the same set element, so an array
//! of small handles can be ordered by a fingerprint that lives in a separate pool.
//!
//! - [`insert_unique`] / [`remove_sorted`]: binary search then shift.
//! - [`merge`]: sorted union with an overwrite policy for duplicates, with fast paths
//!   for empty, singleton, and disjoint inputs, and an in-place back-to-front merge
//!   otherwise.
//! - [`difference`]: removes every element of `b` from `a`, choosing between a linear
//!   scan and per-element binary search from the overlap sizes.
//! - [`hash`]: the same operations keyed by a 32-bit [`Fingerprint`].
//!
//! # Example
//!
//! ```rust
//! use percept_sorted::{Natural, difference, merge};
//!
//! let mut current = vec![2_u16, 5, 9];
//! merge(&mut current, &[3, 5, 11], &Natural, false);
//! assert_eq!(current, [2, 3, 5, 9, 11]);
//!
//! difference(&mut current, &[5, 9], &Natural);
//! assert_eq!(current, [2, 3, 11]);
//! ```
//!
//! Inputs must already be sorted and duplicate-free. Debug builds assert this on
//! `merge` and `difference`.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod hash;
pub mod ops;
pub mod order;

pub use hash::{ByHash, Fingerprint};
pub use ops::{
    contains, dedup_sorted, difference, difference_binary, difference_linear,
    has_adjacent_duplicates, insert_unique, is_sorted_unique, lower_bound, merge, merge_vec,
    overlap_bounds, remove_sorted, search,
};
pub use order::{ByFn, ByKey, Natural, SortOrder};
