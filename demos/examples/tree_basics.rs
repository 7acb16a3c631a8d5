// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loose tree basics.
//!
//! Insert a few boxes, move one across the world, query, and look up neighbours.
//!
//! Run:
//! - `cargo run -p percept_demos --example tree_basics`

use percept_tree::{Aabb, OcPointTree, Point, QuadTree, TreeConfig};

fn main() {
    let config = TreeConfig {
        min_cell_size: 50.0,
        split_threshold: 4,
    };

    // Boxes in 2D
    let mut tree: QuadTree<&str> = QuadTree::new(config);
    let crate_a = tree.insert(Aabb::new([10.0, 10.0], [20.0, 20.0]), "crate");
    let barrel = tree.insert(Aabb::new([30.0, 12.0], [36.0, 18.0]), "barrel");
    let _tower = tree.insert(Aabb::new([400.0, 400.0], [460.0, 520.0]), "tower");
    for i in 0..16 {
        let x = i as f64 * 12.0;
        tree.insert(Aabb::new([x, 100.0], [x + 4.0, 104.0]), "fence");
    }
    println!(
        "{} elements in {} cells, depth {}",
        tree.len(),
        tree.node_count(),
        tree.depth()
    );

    let near_origin = Aabb::new([0.0, 0.0], [40.0, 40.0]);
    let mut hits = Vec::new();
    tree.query_ids(&near_origin, |_, _| true, &mut hits);
    hits.sort();
    assert_eq!(hits, {
        let mut v = vec![crate_a, barrel];
        v.sort();
        v
    });

    // Moving far outside the root grows the root instead of rebuilding.
    let before = tree.root_bounds();
    tree.update(crate_a, Aabb::new([-900.0, -900.0], [-890.0, -890.0]));
    println!("root grew from {:?} to {:?}", before, tree.root_bounds());

    hits.clear();
    tree.query_ids(&near_origin, |_, name| *name != "fence", &mut hits);
    assert_eq!(hits, [barrel], "the crate moved away");

    let stats = tree.probe(&near_origin);
    println!(
        "probe: {} cells visited, {} elements tested, {} hits",
        stats.nodes_visited, stats.elements_tested, stats.hits
    );

    tree.remove(barrel);
    tree.collapse(true);
    tree.verify().expect("tree invariants hold");

    // Points in 3D
    let mut points: OcPointTree<u32> = OcPointTree::new(config);
    let ids: Vec<_> = [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [50.0, 50.0, 50.0]]
        .into_iter()
        .enumerate()
        .map(|(i, p)| points.insert(Point(p), i as u32))
        .collect();
    let nearest = points.find_nearest(ids[0]).expect("other points exist");
    println!("nearest to point 0 is point {}", points.get(nearest).unwrap());
    assert_eq!(nearest, ids[1]);
}
