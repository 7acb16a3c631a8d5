// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types and helpers.

use core::cmp::Ordering;
use core::fmt::Debug;
use core::ops::{Add, Mul, Sub};

/// Numeric scalar abstraction for tree cells.
///
/// Only floating-point scalars are supported: cells are halved on split and
/// doubled on root growth, and the seed cell is snapped with a ceiling.
pub trait Scalar:
    Copy + PartialOrd + Debug + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self>
{
    /// Zero value for the scalar type.
    fn zero() -> Self;

    /// Midpoint between a and b.
    fn mid(a: Self, b: Self) -> Self;

    /// Smallest integral value not below `v`.
    fn ceil(v: Self) -> Self;

    /// Whether the value is neither infinite nor NaN.
    fn is_finite(v: Self) -> bool;

    /// Convert from `f64`, rounding to the nearest representable value.
    fn from_f64(v: f64) -> Self;

    /// Division, used for snapping to the cell grid.
    fn div(a: Self, b: Self) -> Self;
}

impl Scalar for f32 {
    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn mid(a: Self, b: Self) -> Self {
        0.5 * (a + b)
    }

    #[inline]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Values outside the i64 range are already integral."
    )]
    fn ceil(v: Self) -> Self {
        if !(-9.0e18..9.0e18).contains(&v) {
            return v;
        }
        let t = v as i64 as Self;
        if t < v { t + 1.0 } else { t }
    }

    #[inline]
    fn is_finite(v: Self) -> bool {
        v.is_finite()
    }

    #[inline]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Configuration constants are given in f64 and narrowed on purpose."
    )]
    fn from_f64(v: f64) -> Self {
        v as Self
    }

    #[inline]
    fn div(a: Self, b: Self) -> Self {
        a / b
    }
}

impl Scalar for f64 {
    #[inline]
    fn zero() -> Self {
        0.0
    }

    #[inline]
    fn mid(a: Self, b: Self) -> Self {
        0.5 * (a + b)
    }

    #[inline]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Values outside the i64 range are already integral."
    )]
    fn ceil(v: Self) -> Self {
        if !(-9.0e18..9.0e18).contains(&v) {
            return v;
        }
        let t = v as i64 as Self;
        if t < v { t + 1.0 } else { t }
    }

    #[inline]
    fn is_finite(v: Self) -> bool {
        v.is_finite()
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn div(a: Self, b: Self) -> Self {
        a / b
    }
}

/// A point in `D` dimensions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point<T, const D: usize>(pub [T; D]);

impl<T, const D: usize> Point<T, D> {
    /// Create a point from its coordinates.
    pub const fn new(coords: [T; D]) -> Self {
        Self(coords)
    }
}

/// Axis-aligned bounding box in `D` dimensions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb<T, const D: usize> {
    /// Minimum corner.
    pub min: [T; D],
    /// Maximum corner.
    pub max: [T; D],
}

impl<T, const D: usize> Aabb<T, D> {
    /// Create a new AABB from min/max corners.
    pub const fn new(min: [T; D], max: [T; D]) -> Self {
        Self { min, max }
    }
}

impl<T: Scalar, const D: usize> Aabb<T, D> {
    /// A degenerate box at `p`.
    pub fn from_point(p: [T; D]) -> Self {
        Self { min: p, max: p }
    }

    /// A box spanning `center ± extent` on every axis.
    pub fn from_center_extent(center: [T; D], extent: [T; D]) -> Self {
        let mut min = center;
        let mut max = center;
        for i in 0..D {
            min[i] = center[i] - extent[i];
            max[i] = center[i] + extent[i];
        }
        Self { min, max }
    }

    /// A cube spanning `center ± radius`.
    pub fn around(center: [T; D], radius: T) -> Self {
        Self::from_center_extent(center, [radius; D])
    }

    /// Center point.
    pub fn center(&self) -> [T; D] {
        let mut c = self.min;
        for (i, v) in c.iter_mut().enumerate() {
            *v = T::mid(self.min[i], self.max[i]);
        }
        c
    }

    /// Edge length per axis.
    pub fn size(&self) -> [T; D] {
        let mut s = self.min;
        for (i, v) in s.iter_mut().enumerate() {
            *v = self.max[i] - self.min[i];
        }
        s
    }

    /// Half-open containment (`min < p <= max` on every axis).
    ///
    /// This is the cell ownership test: two neighbouring cells never both own a
    /// point on their shared face.
    pub fn owns_point(&self, p: &[T; D]) -> bool {
        (0..D).all(|i| lt(self.min[i], p[i]) && le(p[i], self.max[i]))
    }

    /// Half-open containment of both corners of `other`.
    pub fn owns_box(&self, other: &Self) -> bool {
        self.owns_point(&other.min) && self.owns_point(&other.max)
    }

    /// Closed containment (`min <= p <= max` on every axis).
    pub fn contains_point(&self, p: &[T; D]) -> bool {
        (0..D).all(|i| le(self.min[i], p[i]) && le(p[i], self.max[i]))
    }

    /// Whether the boxes overlap. Boxes that only touch count as overlapping.
    pub fn intersects(&self, other: &Self) -> bool {
        (0..D).all(|i| le(self.min[i], other.max[i]) && le(other.min[i], self.max[i]))
    }

    /// The intersection of two AABBs.
    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = *self;
        for i in 0..D {
            out.min[i] = max_t(self.min[i], other.min[i]);
            out.max[i] = min_t(self.max[i], other.max[i]);
        }
        out
    }

    /// Whether the box overlaps the ball of squared radius `radius_sq` at `center`.
    pub fn intersects_sphere(&self, center: &[T; D], radius_sq: T) -> bool {
        let mut dist = T::zero();
        for i in 0..D {
            let d = if lt(center[i], self.min[i]) {
                self.min[i] - center[i]
            } else if lt(self.max[i], center[i]) {
                center[i] - self.max[i]
            } else {
                continue;
            };
            dist = dist + d * d;
        }
        le(dist, radius_sq)
    }

    /// Return true if the AABB is inverted on some axis. Assumes no NaN.
    pub fn is_empty(&self) -> bool {
        (0..D).any(|i| lt(self.max[i], self.min[i]))
    }

    /// Whether every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| T::is_finite(*v))
    }

    /// The corner selected by `code`: bit `i` picks `min[i]`, otherwise `max[i]`.
    pub fn corner(&self, code: usize) -> [T; D] {
        let mut p = self.max;
        for (i, v) in p.iter_mut().enumerate() {
            if code & (1 << i) != 0 {
                *v = self.min[i];
            }
        }
        p
    }
}

/// Morton child index of `p` relative to a cell center.
///
/// Bit `i` is set when `p[i] <= center[i]`, which puts the shared face in the
/// lower cell and matches [`Aabb::owns_point`].
pub fn child_code<T: Scalar, const D: usize>(center: &[T; D], p: &[T; D]) -> usize {
    let mut code = 0;
    for i in 0..D {
        if le(p[i], center[i]) {
            code |= 1 << i;
        }
    }
    code
}

/// Squared distance between two points.
pub fn dist_sq<T: Scalar, const D: usize>(a: &[T; D], b: &[T; D]) -> T {
    let mut acc = T::zero();
    for i in 0..D {
        let d = a[i] - b[i];
        acc = acc + d * d;
    }
    acc
}

pub(crate) fn min_t<T: PartialOrd + Copy>(a: T, b: T) -> T {
    match a.partial_cmp(&b) {
        Some(Ordering::Greater) => b,
        _ => a,
    }
}

pub(crate) fn max_t<T: PartialOrd + Copy>(a: T, b: T) -> T {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => b,
        _ => a,
    }
}

pub(crate) fn le<T: PartialOrd>(a: T, b: T) -> bool {
    a.partial_cmp(&b)
        .map(|o| o != Ordering::Greater)
        .unwrap_or(false)
}

pub(crate) fn lt<T: PartialOrd>(a: T, b: T) -> bool {
    a.partial_cmp(&b)
        .map(|o| o == Ordering::Less)
        .unwrap_or(false)
}
