// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversions between Kurbo's 2D geometry and the tree's types.

use crate::types::{Aabb, Point};

impl From<kurbo::Rect> for Aabb<f64, 2> {
    fn from(r: kurbo::Rect) -> Self {
        let r = r.abs();
        Self::new([r.x0, r.y0], [r.x1, r.y1])
    }
}

impl From<Aabb<f64, 2>> for kurbo::Rect {
    fn from(b: Aabb<f64, 2>) -> Self {
        Self::new(b.min[0], b.min[1], b.max[0], b.max[1])
    }
}

impl From<kurbo::Point> for Point<f64, 2> {
    fn from(p: kurbo::Point) -> Self {
        Self::new([p.x, p.y])
    }
}

impl From<Point<f64, 2>> for kurbo::Point {
    fn from(p: Point<f64, 2>) -> Self {
        Self::new(p.0[0], p.0[1])
    }
}
