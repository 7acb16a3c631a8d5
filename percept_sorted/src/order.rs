// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Total orders used by the sorted-array operations.

use core::cmp::Ordering;
use core::fmt;

/// A total order over `T`.
///
/// Two values that compare [`Ordering::Equal`] are treated as the same set element,
/// even if other fields differ. This is what lets a handle array be ordered by a
/// fingerprint stored elsewhere.
pub trait SortOrder<T: ?Sized> {
    /// Compare two values.
    fn compare(&self, a: &T, b: &T) -> Ordering;

    /// `a` sorts strictly before `b`.
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// `a` and `b` are the same set element.
    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

impl<T: ?Sized, O: SortOrder<T> + ?Sized> SortOrder<T> for &O {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (**self).compare(a, b)
    }
}

/// The type's own [`Ord`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Natural;

impl<T: Ord + ?Sized> SortOrder<T> for Natural {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Order by a key extracted from each value.
///
/// The key function is called on every comparison, so it should be cheap
/// (a field read or a slot lookup).
#[derive(Copy, Clone)]
pub struct ByKey<F>(pub F);

impl<F> fmt::Debug for ByKey<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByKey").finish_non_exhaustive()
    }
}

impl<T: ?Sized, K: Ord, F: Fn(&T) -> K> SortOrder<T> for ByKey<F> {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.0)(a).cmp(&(self.0)(b))
    }
}

/// Order by an arbitrary comparator closure.
#[derive(Copy, Clone)]
pub struct ByFn<F>(pub F);

impl<F> fmt::Debug for ByFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByFn").finish_non_exhaustive()
    }
}

impl<T: ?Sized, F: Fn(&T, &T) -> Ordering> SortOrder<T> for ByFn<F> {
    #[inline]
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.0)(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_key_treats_equal_keys_as_same_element() {
        let order = ByKey(|v: &(u32, char)| v.0);
        assert!(order.equal(&(3, 'a'), &(3, 'z')));
        assert!(order.less(&(1, 'z'), &(3, 'a')));
    }

    #[test]
    fn by_fn_reverses() {
        let order = ByFn(|a: &i32, b: &i32| b.cmp(a));
        assert!(order.less(&5, &2));
        assert_eq!(Natural.compare(&5, &2), Ordering::Greater);
    }
}
