// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use percept_container::{ContainerConfig, Region, SenseContainer, SensedStimulus, TreeKind};
use percept_tree::{Aabb, OcPointTree, OcTree, Point, QuadTree, TreeConfig};

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

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_random_cubes(count: usize, world: f64, size: f64, seed: u64) -> Vec<Aabb<f64, 3>> {
    let mut rng = Rng::new(seed);
    (0..count)
        .map(|_| {
            let c = [
                rng.next_f64() * world,
                rng.next_f64() * world,
                rng.next_f64() * world,
            ];
            Aabb::around(c, size * 0.5)
        })
        .collect()
}

fn gen_clustered_points(n_clusters: usize, per_cluster: usize, spread: f64) -> Vec<[f64; 3]> {
    let mut rng = Rng::new(0xC1A5_7E55_9999_ABCD);
    let mut out = Vec::with_capacity(n_clusters * per_cluster);
    for _ in 0..n_clusters {
        let c = [
            rng.next_f64() * 4000.0,
            rng.next_f64() * 4000.0,
            rng.next_f64() * 400.0,
        ];
        for _ in 0..per_cluster {
            out.push([
                c[0] + (rng.next_f64() - 0.5) * spread,
                c[1] + (rng.next_f64() - 0.5) * spread,
                c[2] + (rng.next_f64() - 0.5) * spread,
            ]);
        }
    }
    out
}

fn config() -> TreeConfig<f64> {
    TreeConfig {
        min_cell_size: 64.0,
        split_threshold: 8,
    }
}

fn bench_quadtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree_f64");
    let query = Aabb::new([100.0, 100.0], [500.0, 500.0]);
    for &n in &[32usize, 64, 128] {
        let boxes = gen_grid_boxes(n, 10.0);
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_function(format!("insert_query_n{}", n), |b| {
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
    }
    group.finish();
}

fn bench_octree_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_churn_f64");
    let boxes = gen_random_cubes(4096, 2000.0, 12.0, 0xCAFE_F00D_DEAD_BEEF);
    let moved = gen_random_cubes(4096, 2000.0, 12.0, 0xFACE_FEED_CAFE_BABE);
    let mut tree = OcTree::<u32>::new(config());
    let ids: Vec<_> = boxes
        .iter()
        .copied()
        .enumerate()
        .map(|(i, r)| tree.insert(r, i as u32))
        .collect();
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_function("update_all", |b| {
        let mut flip = false;
        b.iter(|| {
            let src = if flip { &boxes } else { &moved };
            for (id, r) in ids.iter().zip(src) {
                tree.update(*id, *r);
            }
            flip = !flip;
            black_box(tree.node_count());
        });
    });
    let query = Aabb::new([800.0, 800.0, 800.0], [1200.0, 1200.0, 1200.0]);
    group.bench_function("query_after_churn", |b| {
        let mut hits = Vec::new();
        b.iter(|| {
            hits.clear();
            tree.query_ids(&query, |_, _| true, &mut hits);
            black_box(hits.len());
        });
    });
    group.finish();
}

fn bench_point_nearest(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_points");
    let points = gen_clustered_points(32, 128, 60.0);
    let mut tree = OcPointTree::<u32>::new(config());
    let ids: Vec<_> = points
        .iter()
        .enumerate()
        .map(|(i, p)| tree.insert(Point(*p), i as u32))
        .collect();
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_function("find_nearest_all", |b| {
        b.iter(|| {
            let mut found = 0;
            for id in &ids {
                if tree.find_nearest(*id).is_some() {
                    found += 1;
                }
            }
            black_box(found);
        });
    });
    group.finish();
}

fn bench_container_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("container");
    for kind in [TreeKind::Quad, TreeKind::Oct] {
        let container = SenseContainer::new(ContainerConfig {
            kind,
            min_cell_size: 64.0,
            ..ContainerConfig::default()
        });
        for (i, r) in gen_random_cubes(4096, 2000.0, 12.0, 0x5EED_0000_1234_5678)
            .into_iter()
            .enumerate()
        {
            let channels = 1 << (i % 4);
            container.insert(SensedStimulus::new(i as u64, channels), r);
        }
        let region = Region::Sphere {
            center: [1000.0, 1000.0, 1000.0],
            radius: 300.0,
        };
        group.bench_function(format!("query_ids_{:?}", kind), |b| {
            b.iter(|| {
                let ids = container.query_ids(&region, 0b11);
                black_box(ids.len());
            });
        });
        group.bench_function(format!("session_copy_{:?}", kind), |b| {
            b.iter(|| {
                let _session = container.remove_session();
                let mut total = 0.0_f32;
                for id in container.query_ids(&region, 0b11) {
                    if let Some(record) = container.sensed_copy_ts(id) {
                        total += record.score;
                    }
                }
                black_box(total);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_quadtree,
    bench_octree_churn,
    bench_point_nearest,
    bench_container_queries,
);
criterion_main!(benches);
