// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Percept Tree: a loose quadtree/octree for stimuli that move every frame.
//!
//! - Insert, update, and remove points or axis-aligned boxes with user payloads.
//! - Query by intersecting box, find the smallest covering cell, or find the nearest
//!   neighbour of an element.
//! - The root grows toward whatever is inserted; there is no fixed world size.
//!
//! The tree is generic over the scalar `T`, the number of axes `D` (2 or 3), and the
//! element geometry `S` ([`Point`] or [`Aabb`]). The aliases [`QuadTree`], [`OcTree`],
//! [`QuadPointTree`] and [`OcPointTree`] cover the usual cases.
//!
//! # Example
//!
//! ```rust
//! use percept_tree::{Aabb, QuadTree, TreeConfig};
//!
//! let mut tree: QuadTree<&str> = QuadTree::new(TreeConfig {
//!     min_cell_size: 100.0,
//!     split_threshold: 8,
//! });
//! let a = tree.insert(Aabb::new([10.0, 10.0], [20.0, 20.0]), "a");
//! let _b = tree.insert(Aabb::new([500.0, 40.0], [520.0, 60.0]), "b");
//!
//! let mut hits = Vec::new();
//! tree.query_ids(&Aabb::new([0.0, 0.0], [50.0, 50.0]), |_, _| true, &mut hits);
//! assert_eq!(hits, [a]);
//!
//! // Moving far away climbs to a covering ancestor instead of rebuilding.
//! tree.update(a, Aabb::new([900.0, 900.0], [910.0, 910.0]));
//! assert!(tree.root_bounds().unwrap().owns_box(&Aabb::new([900.0, 900.0], [910.0, 910.0])));
//! ```
//!
//! ## Cells
//!
//! A cell owns a point when `min < p <= max` on every axis, so neighbouring cells
//! never both claim a point on their shared face. Child `c` of a cell covers the
//! lower half on axis `i` when bit `i` of `c` is set (Morton order). A box lands in
//! a child only when all of its corners map to that child; otherwise it stays in the
//! cell that straddles it.
//!
//! A leaf splits once it holds [`TreeConfig::split_threshold`] elements and is more
//! than 1.5 times [`TreeConfig::min_cell_size`] wide. After a removal, any subtree at
//! or below the threshold is flattened back into its top cell. [`Tree::collapse`]
//! additionally shrinks an oversized root.
//!
//! ## Handles
//!
//! [`ElementId`] is generational. [`Tree::hold_slot_reuse`] parks freed slots so
//! that handles captured by a reader stay unique until [`Tree::release_slot_reuse`].
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs for coordinates. Debug builds assert.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

#[cfg(feature = "kurbo")]
mod kurbo_interop;
mod pool;
mod query;
pub mod shape;
mod tree;
pub mod types;

pub use pool::ElementId;
pub use query::{CellId, QueryStats};
pub use shape::Shape;
pub use tree::{Tree, TreeConfig, Violation};
pub use types::{Aabb, Point, Scalar, child_code, dist_sq};

/// A tree of boxes.
pub type BoxTree<T, const D: usize, E> = Tree<T, D, Aabb<T, D>, E>;

/// A tree of points.
pub type PointTree<T, const D: usize, E> = Tree<T, D, Point<T, D>, E>;

/// 2D box tree over `f64`.
pub type QuadTree<E> = BoxTree<f64, 2, E>;

/// 3D box tree over `f64`.
pub type OcTree<E> = BoxTree<f64, 3, E>;

/// 2D point tree over `f64`.
pub type QuadPointTree<E> = PointTree<f64, 2, E>;

/// 3D point tree over `f64`.
pub type OcPointTree<E> = PointTree<f64, 3, E>;
