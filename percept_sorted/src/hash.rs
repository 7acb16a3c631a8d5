// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Convenience wrappers keyed by a stable 32-bit fingerprint.

use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::ops;
use crate::order::SortOrder;

/// A value with a stable 32-bit content fingerprint.
pub trait Fingerprint {
    /// The fingerprint. Values with equal fingerprints are the same set element.
    fn fingerprint(&self) -> u32;
}

impl Fingerprint for u32 {
    #[inline]
    fn fingerprint(&self) -> u32 {
        *self
    }
}

impl<T: Fingerprint + ?Sized> Fingerprint for &T {
    #[inline]
    fn fingerprint(&self) -> u32 {
        (**self).fingerprint()
    }
}

/// Order values by [`Fingerprint::fingerprint`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ByHash;

impl<T: Fingerprint + ?Sized> SortOrder<T> for ByHash {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.fingerprint().cmp(&b.fingerprint())
    }
}

/// Sort by fingerprint.
pub fn sort_by_hash<T: Fingerprint>(a: &mut [T]) {
    a.sort_unstable_by_key(Fingerprint::fingerprint);
}

/// Index of the element with fingerprint `hash`.
pub fn search_hash<T: Fingerprint>(a: &[T], hash: u32) -> Option<usize> {
    a.binary_search_by_key(&hash, Fingerprint::fingerprint).ok()
}

/// Whether an element with fingerprint `hash` is present.
pub fn contains_hash<T: Fingerprint>(a: &[T], hash: u32) -> bool {
    search_hash(a, hash).is_some()
}

/// [`ops::insert_unique`] by fingerprint.
pub fn insert_unique_hash<T: Fingerprint>(a: &mut Vec<T>, value: T, overwrite: bool) -> usize {
    ops::insert_unique(a, value, &ByHash, overwrite)
}

/// Remove the element with fingerprint `hash`. Returns whether one was removed.
pub fn remove_hash<T: Fingerprint>(a: &mut Vec<T>, hash: u32) -> bool {
    match search_hash(a, hash) {
        Some(i) => {
            a.remove(i);
            true
        }
        None => false,
    }
}
