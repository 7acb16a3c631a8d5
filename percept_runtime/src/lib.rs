// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Percept Runtime: configuration, logging, the sense job worker, and sensors.
//!
//! - [`PerceptConfig`] is read from TOML with [`load_config`], overridden from
//!   `PERCEPT_*` environment variables and validated.
//! - [`init_logging`] installs a `tracing` subscriber filtered by `RUST_LOG` or the
//!   configured level.
//! - [`SenseWorker`] runs [`SenseJob`]s on one background thread, high priority lane
//!   first.
//! - [`Sensor`] queries a shared [`percept_container::SenseContainer`], scores what
//!   it finds with a chain of [`SenseTest`]s, and keeps one
//!   [`percept_detect::DetectPool`] per channel. [`SensorTask`] wraps a sensor as a
//!   job.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use percept_container::{Region, SenseContainer, SensedStimulus};
//! use percept_detect::SenseEvent;
//! use percept_runtime::{DistanceTest, PerceptConfig, Sensor};
//! use percept_tree::Aabb;
//!
//! let config = PerceptConfig::from_toml_str(
//!     r#"
//!     [container]
//!     kind = "oct"
//!
//!     [[channels]]
//!     channel = 1
//!
//!     [sensor]
//!     depth = "forget"
//!     "#,
//! )
//! .unwrap();
//!
//! let container = Arc::new(SenseContainer::new(config.container.container_config()));
//! container.insert(
//!     SensedStimulus::new(42, 0b1),
//!     Aabb::new([4.0, -1.0, -1.0], [6.0, 1.0, 1.0]),
//! );
//!
//! let region = Region::Sphere { center: [0.0; 3], radius: 20.0 };
//! let mut sensor = Sensor::from_config(container, &config, [0.0; 3], region)
//!     .with_test(DistanceTest::new(20.0));
//! sensor.update_cycle(0.0);
//! assert_eq!(sensor.events(1, SenseEvent::New)[0].owner, 42);
//! ```

mod config;
mod logging;
mod sensor;
mod worker;

pub use config::{
    ChannelConfig, ConfigError, ConfigValidationError, ContainerSection, DepthName,
    ENV_LOG_LEVEL, ENV_MIN_CELL_SIZE, ENV_SPLIT_THRESHOLD, LoggingConfig, PerceptConfig,
    QueueConfig, SenseMode, SensorSection, TreeKindName, apply_environment_overrides,
    apply_overrides_from, load_config, validate_config,
};
pub use logging::{env_filter, init_logging};
pub use sensor::{CycleSummary, DistanceTest, SenseTest, Sensor, SensorTask, TestOutcome};
pub use worker::{Lane, QueueError, SenseJob, SenseWorker};
