// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Operations over arrays kept sorted and duplicate-free under a [`SortOrder`].

use alloc::vec::Vec;
use core::cmp::Ordering;
use core::ops::Range;

use crate::order::SortOrder;

/// First index whose element does not sort before `value`.
#[inline]
pub fn lower_bound<T, O: SortOrder<T>>(a: &[T], value: &T, order: &O) -> usize {
    a.partition_point(|x| order.less(x, value))
}

/// Binary search; `Ok(index)` of the equal element or `Err(insertion point)`.
#[inline]
pub fn search<T, O: SortOrder<T>>(a: &[T], value: &T, order: &O) -> Result<usize, usize> {
    a.binary_search_by(|x| order.compare(x, value))
}

/// Whether `value` is present.
#[inline]
pub fn contains<T, O: SortOrder<T>>(a: &[T], value: &T, order: &O) -> bool {
    search(a, value, order).is_ok()
}

/// Insert `value` unless an equal element exists, in which case it is replaced
/// when `overwrite` is set and left alone otherwise.
///
/// Returns the index of the element equal to `value` after the call.
pub fn insert_unique<T, O: SortOrder<T>>(
    a: &mut Vec<T>,
    value: T,
    order: &O,
    overwrite: bool,
) -> usize {
    match search(a, &value, order) {
        Ok(i) => {
            if overwrite {
                a[i] = value;
            }
            i
        }
        Err(i) => {
            a.insert(i, value);
            i
        }
    }
}

/// Remove the element equal to `value`. Returns whether one was removed.
pub fn remove_sorted<T, O: SortOrder<T>>(a: &mut Vec<T>, value: &T, order: &O) -> bool {
    match search(a, value, order) {
        Ok(i) => {
            a.remove(i);
            true
        }
        Err(_) => false,
    }
}

/// Whether the array is strictly increasing, i.e. sorted and free of duplicates.
pub fn is_sorted_unique<T, O: SortOrder<T>>(a: &[T], order: &O) -> bool {
    a.windows(2).all(|w| order.less(&w[0], &w[1]))
}

/// Whether two neighbours compare equal.
pub fn has_adjacent_duplicates<T, O: SortOrder<T>>(a: &[T], order: &O) -> bool {
    a.windows(2).any(|w| order.equal(&w[0], &w[1]))
}

/// Drop all but the first of each run of equal neighbours. Returns the number removed.
pub fn dedup_sorted<T, O: SortOrder<T>>(a: &mut Vec<T>, order: &O) -> usize {
    let before = a.len();
    a.dedup_by(|x, y| order.equal(x, y));
    before - a.len()
}

/// The index range of `a` that can hold elements of `b`.
///
/// Everything in `a` before the range sorts before `b[0]`; everything after it
/// sorts after the last element of `b`.
pub fn overlap_bounds<T, O: SortOrder<T>>(a: &[T], b: &[T], order: &O) -> Range<usize> {
    let (Some(first), Some(last)) = (b.first(), b.last()) else {
        return 0..0;
    };
    let start = lower_bound(a, first, order);
    let mut end = start + lower_bound(&a[start..], last, order);
    if end < a.len() && order.equal(&a[end], last) {
        end += 1;
    }
    start..end
}

/// Sorted union of `a` and `b`, written into `a`.
///
/// Equal elements are resolved in favour of `b` when `overwrite` is set.
/// The general case inserts `b` once at the end of the overlap and merges back to
/// front in place, so the only extra storage is the growth of `a` itself.
pub fn merge<T: Clone, O: SortOrder<T>>(a: &mut Vec<T>, b: &[T], order: &O, overwrite: bool) {
    debug_assert!(is_sorted_unique(a, order), "merge: left side is not sorted");
    debug_assert!(is_sorted_unique(b, order), "merge: right side is not sorted");

    let (Some(b_first), Some(b_last)) = (b.first(), b.last()) else {
        return;
    };
    let (Some(a_first), Some(a_last)) = (a.first(), a.last()) else {
        a.extend_from_slice(b);
        return;
    };
    if b.len() == 1 {
        insert_unique(a, b_first.clone(), order, overwrite);
        return;
    }
    if order.less(a_last, b_first) {
        a.extend_from_slice(b);
        return;
    }
    if order.less(b_last, a_first) {
        a.splice(0..0, b.iter().cloned());
        return;
    }

    let Range { start, end } = overlap_bounds(a, b, order);
    a.splice(end..end, b.iter().cloned());

    // `dest - i` stays at `j + duplicates`, so writes never overtake unread `a` items.
    let mut dest = end + b.len();
    let mut i = end;
    let mut j = b.len();
    let mut duplicates = 0;
    while j > 0 {
        dest -= 1;
        if i > start {
            match order.compare(&a[i - 1], &b[j - 1]) {
                Ordering::Greater => {
                    a.swap(dest, i - 1);
                    i -= 1;
                }
                Ordering::Less => {
                    a[dest] = b[j - 1].clone();
                    j -= 1;
                }
                Ordering::Equal => {
                    if overwrite {
                        a[dest] = b[j - 1].clone();
                    } else {
                        a.swap(dest, i - 1);
                    }
                    i -= 1;
                    j -= 1;
                    duplicates += 1;
                }
            }
        } else {
            a[dest] = b[j - 1].clone();
            j -= 1;
        }
    }
    a.drain(i..i + duplicates);
}

/// [`merge`] taking ownership of `b`, which avoids cloning in the fast paths.
pub fn merge_vec<T: Clone, O: SortOrder<T>>(a: &mut Vec<T>, b: Vec<T>, order: &O, overwrite: bool) {
    if a.is_empty() {
        *a = b;
        return;
    }
    if let (Some(a_last), Some(b_first)) = (a.last(), b.first())
        && order.less(a_last, b_first)
    {
        a.extend(b);
        return;
    }
    merge(a, &b, order, overwrite);
}

/// Remove from `a` every element present in `b`. Returns the number removed.
///
/// Compares the overlap sizes of both arrays and picks per-element binary search
/// into `b` when `a`'s overlap is no larger than `b`'s, and a linear merge scan
/// otherwise.
pub fn difference<T, O: SortOrder<T>>(a: &mut Vec<T>, b: &[T], order: &O) -> usize {
    debug_assert!(is_sorted_unique(a, order), "difference: left side is not sorted");
    debug_assert!(is_sorted_unique(b, order), "difference: right side is not sorted");

    let a_range = overlap_bounds(a, b, order);
    if a_range.is_empty() {
        return 0;
    }
    let b_range = overlap_bounds(b, &a[a_range.clone()], order);
    if b_range.is_empty() {
        return 0;
    }
    if a_range.len() <= b_range.len() {
        difference_binary_in(a, a_range, &b[b_range], order)
    } else {
        difference_linear_in(a, a_range, &b[b_range], order)
    }
}

/// [`difference`] forced onto the linear merge-scan strategy.
pub fn difference_linear<T, O: SortOrder<T>>(a: &mut Vec<T>, b: &[T], order: &O) -> usize {
    let a_range = overlap_bounds(a, b, order);
    if a_range.is_empty() {
        return 0;
    }
    difference_linear_in(a, a_range, b, order)
}

/// [`difference`] forced onto the binary-search-per-element strategy.
pub fn difference_binary<T, O: SortOrder<T>>(a: &mut Vec<T>, b: &[T], order: &O) -> usize {
    let a_range = overlap_bounds(a, b, order);
    if a_range.is_empty() {
        return 0;
    }
    difference_binary_in(a, a_range, b, order)
}

fn difference_linear_in<T, O: SortOrder<T>>(
    a: &mut Vec<T>,
    range: Range<usize>,
    b: &[T],
    order: &O,
) -> usize {
    let mut write = range.start;
    let mut i = range.start;
    let mut j = 0;
    while i < range.end && j < b.len() {
        match order.compare(&a[i], &b[j]) {
            Ordering::Less => {
                a.swap(write, i);
                write += 1;
                i += 1;
            }
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    a.drain(write..i);
    i - write
}

fn difference_binary_in<T, O: SortOrder<T>>(
    a: &mut Vec<T>,
    range: Range<usize>,
    b: &[T],
    order: &O,
) -> usize {
    let mut write = range.start;
    for i in range.clone() {
        if search(b, &a[i], order).is_err() {
            a.swap(write, i);
            write += 1;
        }
    }
    a.drain(write..range.end);
    range.end - write
}
