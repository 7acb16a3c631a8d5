// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use percept_container::SensedStimulus;
use percept_detect::{DetectConfig, DetectPool, SenseEvent, Strategy, best_with};
use percept_sorted::{Natural, difference_binary, difference_linear, merge};

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
    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

fn sorted_keys(count: usize, stride: u32, offset: u32) -> Vec<u32> {
    (0..count as u32).map(|i| i * stride + offset).collect()
}

fn bench_set_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_sets");
    for &n in &[256usize, 4096] {
        let a = sorted_keys(n, 2, 0);
        let small = sorted_keys(n / 16, 32, 0);
        let dense = sorted_keys(n, 3, 0);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("merge_interleaved_n{}", n), |b| {
            b.iter_batched(
                || a.clone(),
                |mut left| {
                    merge(&mut left, &dense, &Natural, false);
                    black_box(left.len());
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("difference_linear_small_n{}", n), |b| {
            b.iter_batched(
                || a.clone(),
                |mut left| black_box(difference_linear(&mut left, &small, &Natural)),
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("difference_binary_small_n{}", n), |b| {
            b.iter_batched(
                || a.clone(),
                |mut left| black_box(difference_binary(&mut left, &small, &Natural)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_best_by_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_by_score");
    let mut rng = Rng::new(0xBADC_F00D_1234_5678);
    let scores: Vec<f32> = (0..4096).map(|_| rng.next_f32()).collect();
    for &count in &[1usize, 8, 256] {
        for strategy in [Strategy::Heap, Strategy::Select] {
            group.bench_function(format!("{:?}_k{}", strategy, count), |b| {
                b.iter(|| black_box(best_with(strategy, &scores, count, 0.0)));
            });
        }
    }
    group.bench_function("Linear_k1", |b| {
        b.iter(|| black_box(best_with(Strategy::Linear, &scores, 1, 0.0)));
    });
    group.finish();
}

fn bench_pool_cycles(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_pool");
    let records: Vec<SensedStimulus> = (0..1024)
        .map(|i| SensedStimulus::new(i, 1).with_age(0.5))
        .collect();
    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("sliding_window_cycle", |b| {
        let mut pool = DetectPool::new(DetectConfig::default());
        let mut now = 0.0;
        let mut start = 0;
        b.iter(|| {
            // Each cycle a window of 768 records shifts by 64, so every cycle has
            // new, current, lost and forgotten entries.
            for r in records.iter().cycle().skip(start).take(768) {
                pool.add(now, r.clone());
            }
            pool.new_sensed_update(true);
            pool.new_age_update(now, |_| true);
            black_box(pool.events(SenseEvent::Lost).len());
            start = (start + 64) % records.len();
            now += 0.25;
        });
    });
    group.bench_function("tracked_best_cycle", |b| {
        let mut pool = DetectPool::new(DetectConfig {
            track_best: 16,
            force_by_best_score: true,
            ..DetectConfig::default()
        });
        let mut rng = Rng::new(0x5EED_5EED_5EED_5EED);
        b.iter(|| {
            for r in &records {
                pool.add(0.0, r.clone().with_score(rng.next_f32()));
            }
            pool.new_sensed_update(true);
            black_box(pool.best_ids().len());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_set_ops, bench_best_by_score, bench_pool_cycles);
criterion_main!(benches);
