// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two element geometries a tree can store.

use core::fmt::Debug;

use crate::types::{Aabb, Point, Scalar, child_code};

/// Geometry of a tree element: either a [`Point`] or an [`Aabb`].
///
/// Point elements always land in a single child, so only leaves hold them.
/// Box elements that straddle a cell's center stay in that cell's own list.
pub trait Shape<T: Scalar, const D: usize>: Copy + PartialEq + Debug {
    /// True for point elements.
    const IS_POINT: bool;

    /// Representative position used for root growth and nearest queries.
    fn center(&self) -> [T; D];

    /// Tight bounds of the element.
    fn bounds(&self) -> Aabb<T, D>;

    /// Whether a cell owns the element (half-open on every corner).
    fn fits(&self, cell: &Aabb<T, D>) -> bool;

    /// Bit mask of the children of a cell centered at `center` that the element touches.
    fn child_mask(&self, center: &[T; D]) -> u8;

    /// Whether the element overlaps the query box.
    fn intersects(&self, query: &Aabb<T, D>) -> bool;

    /// Whether every coordinate is finite.
    fn is_finite(&self) -> bool;
}

impl<T: Scalar, const D: usize> Shape<T, D> for Point<T, D> {
    const IS_POINT: bool = true;

    #[inline]
    fn center(&self) -> [T; D] {
        self.0
    }

    #[inline]
    fn bounds(&self) -> Aabb<T, D> {
        Aabb::from_point(self.0)
    }

    #[inline]
    fn fits(&self, cell: &Aabb<T, D>) -> bool {
        cell.owns_point(&self.0)
    }

    #[inline]
    fn child_mask(&self, center: &[T; D]) -> u8 {
        1 << child_code(center, &self.0)
    }

    #[inline]
    fn intersects(&self, query: &Aabb<T, D>) -> bool {
        query.contains_point(&self.0)
    }

    #[inline]
    fn is_finite(&self) -> bool {
        self.0.iter().all(|v| T::is_finite(*v))
    }
}

impl<T: Scalar, const D: usize> Shape<T, D> for Aabb<T, D> {
    const IS_POINT: bool = false;

    #[inline]
    fn center(&self) -> [T; D] {
        Self::center(self)
    }

    #[inline]
    fn bounds(&self) -> Aabb<T, D> {
        *self
    }

    #[inline]
    fn fits(&self, cell: &Aabb<T, D>) -> bool {
        cell.owns_box(self)
    }

    fn child_mask(&self, center: &[T; D]) -> u8 {
        let mut mask = 0_u8;
        for corner in 0..(1_usize << D) {
            mask |= 1 << child_code(center, &self.corner(corner));
        }
        mask
    }

    #[inline]
    fn intersects(&self, query: &Aabb<T, D>) -> bool {
        Self::intersects(self, query)
    }

    #[inline]
    fn is_finite(&self) -> bool {
        Self::is_finite(self)
    }
}

/// The child slot for a mask that names exactly one child.
#[inline]
pub(crate) fn single_child(mask: u8) -> Option<usize> {
    mask.is_power_of_two().then(|| mask.trailing_zeros() as usize)
}
