// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![cfg(feature = "compare_rstar")]

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use percept_tree::{Aabb, OcTree, QuadTree, TreeConfig};

use rstar::primitives::Rectangle;
use rstar::{AABB, RTree};

fn gen_grid_boxes(n: usize, cell: f64) -> Vec<Aabb<f64, 2>> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            let x0 = x as f64 * cell;
            let y0 = y as f64 * cell;
            out.push(Aabb::new([x0, y0], [x0 + cell, y0 + cell]));
        }
    }
    out
}

fn gen_cube_lattice(n: usize, cell: f64) -> Vec<Aabb<f64, 3>> {
    let mut out = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let c = [
                    (x as f64 + 0.5) * cell,
                    (y as f64 + 0.5) * cell,
                    (z as f64 + 0.5) * cell,
                ];
                out.push(Aabb::around(c, cell * 0.4));
            }
        }
    }
    out
}

fn to_rstar<const D: usize>(v: &[Aabb<f64, D>]) -> Vec<Rectangle<[f64; D]>>
where
    [f64; D]: rstar::Point,
{
    v.iter()
        .map(|r| Rectangle::from_corners(r.min, r.max))
        .collect()
}

fn config() -> TreeConfig<f64> {
    TreeConfig {
        min_cell_size: 64.0,
        split_threshold: 8,
    }
}

fn bench_rtree_external_compare_2d(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree_external_compare_2d");
    for &n in &[64usize, 128] {
        let boxes = gen_grid_boxes(n, 10.0);
        let query = Aabb::new([100.0, 100.0], [500.0, 500.0]);
        group.throughput(Throughput::Elements((n * n) as u64));

        group.bench_function(format!("percept_build_query_n{}", n), |b| {
            b.iter_batched(
                || QuadTree::<u32>::new(config()),
                |mut tree| {
                    for (i, r) in boxes.iter().copied().enumerate() {
                        tree.insert(r, i as u32);
                    }
                    let mut hits = Vec::new();
                    tree.query_ids(&query, |_, _| true, &mut hits);
                    black_box(hits.len());
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("rstar_build_query_bulk_n{}", n), |b| {
            b.iter_batched(
                || to_rstar(&boxes),
                |rectangles| {
                    let tree = RTree::bulk_load(rectangles);
                    let aabb = AABB::from_corners(query.min, query.max);
                    let hits = tree.locate_in_envelope_intersecting(&aabb).count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("rstar_build_query_incremental_n{}", n), |b| {
            b.iter_batched(
                || to_rstar(&boxes),
                |rectangles| {
                    let mut tree = RTree::new();
                    for r in rectangles {
                        tree.insert(r);
                    }
                    let aabb = AABB::from_corners(query.min, query.max);
                    let hits = tree.locate_in_envelope_intersecting(&aabb).count();
                    black_box(hits);
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_rtree_external_compare_moving_3d(c: &mut Criterion) {
    let mut group = c.benchmark_group("rtree_external_compare_moving_3d");
    let boxes = gen_cube_lattice(16, 40.0);
    let shifted: Vec<_> = boxes
        .iter()
        .map(|b| Aabb::new(b.min.map(|v| v + 7.0), b.max.map(|v| v + 7.0)))
        .collect();
    let query = Aabb::new([100.0; 3], [300.0; 3]);
    group.throughput(Throughput::Elements(boxes.len() as u64));

    // Moving every element once, then querying: the loose tree updates in place,
    // the R-tree removes and reinserts.
    let mut tree = OcTree::<u32>::new(config());
    let ids: Vec<_> = boxes
        .iter()
        .copied()
        .enumerate()
        .map(|(i, r)| tree.insert(r, i as u32))
        .collect();
    group.bench_function("percept_move_query", |b| {
        let mut flip = false;
        b.iter(|| {
            let src = if flip { &boxes } else { &shifted };
            for (id, r) in ids.iter().zip(src) {
                tree.update(*id, *r);
            }
            flip = !flip;
            let mut hits = Vec::new();
            tree.query_ids(&query, |_, _| true, &mut hits);
            black_box(hits.len());
        });
    });

    let mut rtree = RTree::bulk_load(to_rstar(&boxes));
    let from = to_rstar(&boxes);
    let to = to_rstar(&shifted);
    group.bench_function("rstar_move_query", |b| {
        let mut flip = false;
        b.iter(|| {
            let (old, new) = if flip { (&to, &from) } else { (&from, &to) };
            for (o, n) in old.iter().zip(new) {
                rtree.remove(o);
                rtree.insert(n.clone());
            }
            flip = !flip;
            let aabb = AABB::from_corners(query.min, query.max);
            black_box(rtree.locate_in_envelope_intersecting(&aabb).count());
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_rtree_external_compare_2d,
    bench_rtree_external_compare_moving_3d
);
criterion_main!(benches);
