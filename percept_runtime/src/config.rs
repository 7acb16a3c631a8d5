// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! TOML configuration with environment overrides and a collecting validator.
//!
//! Loading happens in three steps: parse the file, apply `PERCEPT_*` environment
//! overrides, then validate. Every section is `#[serde(default)]`, so a file only
//! needs the keys it changes.
//!
//! ```toml
//! [container]
//! kind = "quad"
//! min_cell_size = 250.0
//!
//! [[channels]]
//! channel = 1
//! track_best = 3
//! forget_age = 2.5
//!
//! [sensor]
//! depth = "lost"
//! mode = "additive"
//! ```

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use percept_container::{ContainerConfig, TreeKind};
use percept_detect::{DetectConfig, DetectDepth};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG_LEVEL: &str = "PERCEPT_LOG_LEVEL";
/// Environment variable overriding [`ContainerSection::min_cell_size`].
pub const ENV_MIN_CELL_SIZE: &str = "PERCEPT_MIN_CELL_SIZE";
/// Environment variable overriding [`ContainerSection::split_threshold`].
pub const ENV_SPLIT_THRESHOLD: &str = "PERCEPT_SPLIT_THRESHOLD";

/// Failure to produce a usable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for [`PerceptConfig`].
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration parsed but failed validation.
    #[error("configuration validation failed:{}", join_lines(.0))]
    Validation(Vec<ConfigValidationError>),
    /// A log filter directive could not be parsed.
    #[error("invalid log filter `{filter}`: {reason}")]
    Filter {
        /// The directive as given.
        filter: String,
        /// Parser message.
        reason: String,
    },
}

fn join_lines(errors: &[ConfigValidationError]) -> String {
    errors.iter().map(|e| format!("\n  - {e}")).collect()
}

/// One problem found by [`validate_config`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigValidationError {
    /// A value is outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted key of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Two channel sections name the same channel.
    #[error("channel {0} is configured more than once")]
    DuplicateChannel(u8),
}

impl ConfigValidationError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Root configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PerceptConfig {
    /// Stimulus container and its tree.
    pub container: ContainerSection,
    /// Per-channel detection policies.
    pub channels: Vec<ChannelConfig>,
    /// Sensor update policy shared by all channels.
    pub sensor: SensorSection,
    /// Background worker.
    pub queue: QueueConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Tree variant as named in configuration files.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeKindName {
    /// 2D quadtree over x/y.
    Quad,
    /// 3D octree.
    #[default]
    Oct,
}

impl From<TreeKindName> for TreeKind {
    fn from(kind: TreeKindName) -> Self {
        match kind {
            TreeKindName::Quad => Self::Quad,
            TreeKindName::Oct => Self::Oct,
        }
    }
}

/// `[container]`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainerSection {
    /// Quadtree or octree.
    pub kind: TreeKindName,
    /// Seed cell edge length.
    pub min_cell_size: f64,
    /// Elements per leaf before it splits.
    pub split_threshold: usize,
    /// Cells to reserve up front.
    pub node_reserve: usize,
    /// Records to reserve up front.
    pub element_reserve: usize,
}

impl Default for ContainerSection {
    fn default() -> Self {
        let defaults = ContainerConfig::default();
        Self {
            kind: TreeKindName::Oct,
            min_cell_size: defaults.min_cell_size,
            split_threshold: defaults.split_threshold,
            node_reserve: defaults.node_reserve,
            element_reserve: defaults.element_reserve,
        }
    }
}

impl ContainerSection {
    /// Construction parameters for a [`percept_container::SenseContainer`].
    pub fn container_config(&self) -> ContainerConfig {
        ContainerConfig {
            kind: self.kind.into(),
            min_cell_size: self.min_cell_size,
            split_threshold: self.split_threshold,
            node_reserve: self.node_reserve,
            element_reserve: self.element_reserve,
        }
    }
}

/// `[[channels]]`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel number, `1..=64`.
    pub channel: u8,
    /// Size of the best-score set; `0` disables tracking.
    pub track_best: usize,
    /// Matches scoring below this are ignored on this channel.
    pub min_best_score: f32,
    /// Cut each cycle's matches down to the best-score set.
    pub force_by_best_score: bool,
    /// Overrides the stimulus's own forget age on this channel.
    pub forget_age: Option<f64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: 1,
            track_best: 0,
            min_best_score: 0.0,
            force_by_best_score: false,
            forget_age: None,
        }
    }
}

impl ChannelConfig {
    /// A default policy on `channel`.
    pub fn on(channel: u8) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    /// The channel's bit in a 64-bit mask, or `0` when out of range.
    pub fn bit(&self) -> u64 {
        match self.channel {
            1..=64 => 1 << (self.channel - 1),
            _ => 0,
        }
    }

    /// Detection pool settings for this channel at `depth`.
    pub fn detect_config(&self, depth: DetectDepth) -> DetectConfig {
        DetectConfig {
            depth,
            track_best: self.track_best,
            min_best_score: self.min_best_score,
            force_by_best_score: self.force_by_best_score,
        }
    }
}

/// Detection depth as named in configuration files.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthName {
    /// Current matches only.
    Current,
    /// Current and new.
    New,
    /// Current, new and lost.
    Lost,
    /// Every tier.
    #[default]
    Forget,
}

impl From<DepthName> for DetectDepth {
    fn from(depth: DepthName) -> Self {
        match depth {
            DepthName::Current => Self::Current,
            DepthName::New => Self::New,
            DepthName::Lost => Self::Lost,
            DepthName::Forget => Self::Forget,
        }
    }
}

/// How a cycle's matches are folded into the pools.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SenseMode {
    /// Each cycle is a full re-scan that replaces the previous state.
    #[default]
    Override,
    /// Each cycle adds to the previous state; entries leave only by aging.
    Additive,
}

/// `[sensor]`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorSection {
    /// Tiers every channel maintains.
    pub depth: DepthName,
    /// Override or additive updates.
    pub mode: SenseMode,
}

/// `[queue]`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs each lane holds before `enqueue` fails.
    pub lane_capacity: usize,
    /// Jobs run per wake before the worker pauses for [`Self::idle_wait_us`].
    pub per_wake_cap: usize,
    /// Pause after a full wake or an unfinished job, in microseconds.
    pub idle_wait_us: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lane_capacity: 1024,
            per_wake_cap: 10,
            idle_wait_us: 100,
        }
    }
}

impl QueueConfig {
    /// [`Self::idle_wait_us`] as a duration.
    pub fn idle_wait(&self) -> Duration {
        Duration::from_micros(self.idle_wait_us)
    }
}

/// `[logging]`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `info` or `percept_detect=trace,info`.
    pub level: String,
    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            ansi: true,
        }
    }
}

impl PerceptConfig {
    /// Parse a configuration from TOML text. No overrides or validation are applied.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Detection settings per configured channel, in file order.
    pub fn detect_configs(&self) -> Vec<(u64, DetectConfig)> {
        let depth = self.sensor.depth.into();
        self.channels
            .iter()
            .map(|c| (c.bit(), c.detect_config(depth)))
            .collect()
    }

    /// Union of all configured channel bits.
    pub fn channel_mask(&self) -> u64 {
        self.channels.iter().fold(0, |mask, c| mask | c.bit())
    }
}

/// Read, override from the environment, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<PerceptConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    let mut config = PerceptConfig::from_toml_str(&text)?;
    apply_environment_overrides(&mut config);
    let errors = validate_config(&config);
    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Validation(errors))
    }
}

/// Apply `PERCEPT_*` environment variables.
///
/// - `PERCEPT_LOG_LEVEL` -> `logging.level`
/// - `PERCEPT_MIN_CELL_SIZE` -> `container.min_cell_size`
/// - `PERCEPT_SPLIT_THRESHOLD` -> `container.split_threshold`
pub fn apply_environment_overrides(config: &mut PerceptConfig) {
    apply_overrides_from(config, |key| env::var(key).ok());
}

/// [`apply_environment_overrides`] with an arbitrary variable source.
///
/// Values that do not parse are skipped with a warning.
pub fn apply_overrides_from(config: &mut PerceptConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
    if let Some(value) = lookup(ENV_MIN_CELL_SIZE) {
        match value.trim().parse::<f64>() {
            Ok(size) => config.container.min_cell_size = size,
            Err(_) => warn!(key = ENV_MIN_CELL_SIZE, value, "ignoring unparsable override"),
        }
    }
    if let Some(value) = lookup(ENV_SPLIT_THRESHOLD) {
        match value.trim().parse::<usize>() {
            Ok(threshold) => config.container.split_threshold = threshold,
            Err(_) => warn!(key = ENV_SPLIT_THRESHOLD, value, "ignoring unparsable override"),
        }
    }
}

/// Every problem with `config`. An empty result means it is usable.
pub fn validate_config(config: &PerceptConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_container(&config.container, &mut errors);
    validate_channels(&config.channels, &mut errors);
    validate_queue(&config.queue, &mut errors);
    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
        errors.push(ConfigValidationError::invalid("logging.level", e.to_string()));
    }
    errors
}

fn validate_container(c: &ContainerSection, errors: &mut Vec<ConfigValidationError>) {
    if !(c.min_cell_size.is_finite() && c.min_cell_size > 0.0) {
        errors.push(ConfigValidationError::invalid(
            "container.min_cell_size",
            format!("must be positive and finite, got {}", c.min_cell_size),
        ));
    }
    if c.split_threshold == 0 {
        errors.push(ConfigValidationError::invalid(
            "container.split_threshold",
            "must be at least 1",
        ));
    }
}

fn validate_channels(channels: &[ChannelConfig], errors: &mut Vec<ConfigValidationError>) {
    let mut seen = 0_u64;
    for (i, c) in channels.iter().enumerate() {
        let bit = c.bit();
        if bit == 0 {
            errors.push(ConfigValidationError::invalid(
                format!("channels[{i}].channel"),
                format!("must be in 1..=64, got {}", c.channel),
            ));
        } else if seen & bit != 0 {
            errors.push(ConfigValidationError::DuplicateChannel(c.channel));
        }
        seen |= bit;
        if !c.min_best_score.is_finite() {
            errors.push(ConfigValidationError::invalid(
                format!("channels[{i}].min_best_score"),
                "must be finite",
            ));
        }
        if c.force_by_best_score && c.track_best == 0 {
            errors.push(ConfigValidationError::invalid(
                format!("channels[{i}].force_by_best_score"),
                "requires track_best > 0",
            ));
        }
        if let Some(age) = c.forget_age
            && !(age.is_finite() && age >= 0.0)
        {
            errors.push(ConfigValidationError::invalid(
                format!("channels[{i}].forget_age"),
                format!("must be non-negative and finite, got {age}"),
            ));
        }
    }
}

fn validate_queue(q: &QueueConfig, errors: &mut Vec<ConfigValidationError>) {
    if q.lane_capacity == 0 {
        errors.push(ConfigValidationError::invalid(
            "queue.lane_capacity",
            "must be at least 1",
        ));
    }
    if q.per_wake_cap == 0 {
        errors.push(ConfigValidationError::invalid(
            "queue.per_wake_cap",
            "must be at least 1",
        ));
    }
}
