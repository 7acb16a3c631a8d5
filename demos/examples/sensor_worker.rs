// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sensors on the background worker.
//!
//! Load a configuration, install logging, and let two sensors track a stimulus
//! walking past them. Set `RUST_LOG=percept_detect=trace` to watch each cycle.
//!
//! Run:
//! - `cargo run -p percept_demos --example sensor_worker`

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use percept_container::{Region, SenseContainer, SensedStimulus};
use percept_detect::SenseEvent;
use percept_runtime::{
    DistanceTest, PerceptConfig, SenseWorker, Sensor, SensorTask, apply_environment_overrides,
    init_logging, validate_config,
};
use percept_tree::Aabb;
use tracing::info;

const CONFIG: &str = r#"
[container]
kind = "oct"
min_cell_size = 20.0
split_threshold = 4

[[channels]]
channel = 1
track_best = 1

[[channels]]
channel = 2
forget_age = 0.5

[sensor]
depth = "forget"
mode = "override"

[queue]
per_wake_cap = 4

[logging]
level = "info"
"#;

fn main() {
    let mut config = PerceptConfig::from_toml_str(CONFIG).expect("demo config parses");
    apply_environment_overrides(&mut config);
    let problems = validate_config(&config);
    assert!(problems.is_empty(), "invalid config: {problems:?}");
    init_logging(&config.logging).expect("valid log filter");

    let container = Arc::new(SenseContainer::new(config.container.container_config()));
    let walker = container.insert(
        SensedStimulus::new(7, 0b11).with_age(1.0),
        Aabb::around([-60.0, 0.0, 0.0], 1.0),
    );
    let _statue = container.insert(
        SensedStimulus::new(8, 0b01).with_age(1.0),
        Aabb::around([5.0, 5.0, 0.0], 1.0),
    );

    // The simulation clock advances a tenth of a second per step.
    let ticks = Arc::new(AtomicU64::new(0));
    let clock = {
        let ticks = Arc::clone(&ticks);
        move || ticks.load(Ordering::Acquire) as f64 * 0.1
    };

    let tasks: Vec<_> = [[0.0, 0.0, 0.0], [40.0, 0.0, 0.0]]
        .into_iter()
        .map(|origin| {
            let region = Region::Sphere {
                center: origin,
                radius: 30.0,
            };
            let sensor = Sensor::from_config(Arc::clone(&container), &config, origin, region)
                .with_test(DistanceTest::new(25.0).with_lost_distance(30.0));
            SensorTask::new(sensor, clock.clone())
        })
        .collect();

    let mut worker = SenseWorker::spawn(&config.queue).expect("worker thread starts");
    for step in 0..40_u64 {
        ticks.store(step, Ordering::Release);
        let x = -60.0 + step as f64 * 4.0;
        container.update(walker, Aabb::around([x, 0.0, 0.0], 1.0));

        for (i, task) in tasks.iter().enumerate() {
            task.schedule(&worker, i == 0).expect("lane has room");
        }
        let deadline = Instant::now() + Duration::from_secs(1);
        while tasks.iter().any(|t| t.cycles() <= step) && Instant::now() < deadline {
            thread::sleep(Duration::from_micros(200));
        }

        for (i, task) in tasks.iter().enumerate() {
            let sensor = task.sensor();
            for (event, label) in [
                (SenseEvent::New, "new"),
                (SenseEvent::LostCurrent, "lost"),
                (SenseEvent::Forget, "forgotten"),
            ] {
                for record in sensor.events(2, event) {
                    info!(sensor = i, step, owner = record.owner, x, "{label} on channel 2");
                }
            }
        }
    }

    let sensor = tasks[0].sensor();
    let best: Vec<_> = sensor
        .pool(1)
        .map(|pool| {
            pool.best_ids()
                .iter()
                .filter_map(|&id| pool.get(id).map(|r| r.owner))
                .collect()
        })
        .unwrap_or_default();
    println!("sensor 0 best on channel 1: {best:?}");
    drop(sensor);

    worker.shutdown();
    println!(
        "worker ran {} jobs, skipped {}",
        worker.completed(),
        worker.skipped()
    );
}
