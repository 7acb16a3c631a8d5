// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A sensor: one container query, a chain of scoring tests, and a detection pool
//! per channel.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use percept_container::{Aabb3, Region, SenseContainer, SensedPoint, SensedStimulus, Vec3};
use percept_detect::{DetectConfig, DetectDepth, DetectPool, SenseEvent};
use percept_sorted::hash::{contains_hash, insert_unique_hash, remove_hash};
use percept_tree::dist_sq;
use tracing::trace;

use crate::config::{ChannelConfig, PerceptConfig, SenseMode};
use crate::worker::{QueueError, SenseJob, SenseWorker};

/// Verdict of one test on one stimulus.
///
/// Outcomes combine by taking the worst, so a single `Lost` rejects the stimulus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestOutcome {
    /// Fully matched.
    Sensed,
    /// Not matched, but kept on channels that already track it as current.
    NotLost,
    /// Rejected.
    Lost,
}

/// A scoring function in a sensor's chain.
pub trait SenseTest: Send + fmt::Debug {
    /// Bounds outside which this test can never report [`TestOutcome::Sensed`] or
    /// [`TestOutcome::NotLost`], if it has any.
    fn reach(&self, origin: Vec3) -> Option<Aabb3> {
        let _ = origin;
        None
    }

    /// Score a stimulus occupying `bounds`, as seen from `origin`.
    ///
    /// Tests multiply their factor into `record.score` and may append to
    /// `record.sensed_points`. `index` is the test's position in the chain.
    fn run(
        &self,
        index: u8,
        origin: Vec3,
        record: &mut SensedStimulus,
        bounds: &Aabb3,
    ) -> TestOutcome;
}

/// Score by distance from the sensor origin to the stimulus center.
///
/// Within `max_distance` the score falls linearly from 1 to 0.1; between
/// `max_distance` and `max_distance_lost` it falls on to 0 and the stimulus is
/// only kept if already current. Beyond that it is lost.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DistanceTest {
    /// Radius of full detection.
    pub max_distance: f64,
    /// Radius beyond which a stimulus is lost. Never less than `max_distance`.
    pub max_distance_lost: f64,
    /// Scores below this degrade a match to [`TestOutcome::NotLost`].
    pub min_score: f32,
}

impl DistanceTest {
    /// A test with the same radius for detection and loss.
    pub fn new(max_distance: f64) -> Self {
        Self {
            max_distance,
            max_distance_lost: max_distance,
            min_score: 0.0,
        }
    }

    /// Builder-style loss radius, clamped to at least `max_distance`.
    #[must_use]
    pub fn with_lost_distance(mut self, max_distance_lost: f64) -> Self {
        self.max_distance_lost = max_distance_lost.max(self.max_distance);
        self
    }

    /// Builder-style minimum score.
    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Score factor at `distance`.
    pub fn falloff(&self, distance: f64) -> f64 {
        let lost = self.max_distance_lost.max(self.max_distance);
        if distance <= self.max_distance {
            if self.max_distance <= 0.0 {
                return 1.0;
            }
            1.0 - 0.9 * distance / self.max_distance
        } else if distance <= lost {
            0.1 * (lost - distance) / (lost - self.max_distance)
        } else {
            0.0
        }
    }
}

impl SenseTest for DistanceTest {
    fn reach(&self, origin: Vec3) -> Option<Aabb3> {
        Some(Aabb3::around(origin, self.max_distance_lost.max(self.max_distance)))
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "Scores are stored as f32."
    )]
    fn run(
        &self,
        index: u8,
        origin: Vec3,
        record: &mut SensedStimulus,
        bounds: &Aabb3,
    ) -> TestOutcome {
        let point = bounds.center();
        let d2 = dist_sq(&origin, &point);
        let lost = self.max_distance_lost.max(self.max_distance);
        if d2 > lost * lost {
            record.score = 0.0;
            return TestOutcome::Lost;
        }
        let distance = d2.sqrt();
        record.score *= self.falloff(distance) as f32;
        record.sensed_points.push(SensedPoint {
            point,
            score: record.score,
            test: index,
        });
        if distance > self.max_distance || record.score < self.min_score {
            TestOutcome::NotLost
        } else {
            TestOutcome::Sensed
        }
    }
}

#[derive(Debug)]
struct Channel {
    setup: ChannelConfig,
    pool: DetectPool,
    staged: usize,
}

/// What one [`Sensor::update_cycle`] saw.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Handles returned by the container query.
    pub queried: usize,
    /// Stimuli that passed the test chain on at least one channel.
    pub matched: usize,
    /// Handles removed concurrently between the query and their copy.
    pub vanished: usize,
}

/// A sensor over a shared [`SenseContainer`].
///
/// Each [`Sensor::update_cycle`] queries its [`Region`] for stimuli on its channels,
/// copies each record out inside a remove session, runs the test chain, stages
/// the survivors in the per-channel pools, and finishes with the pools' update and
/// age passes.
pub struct Sensor {
    container: Arc<SenseContainer>,
    region: Region,
    origin: Vec3,
    tests: Vec<Box<dyn SenseTest>>,
    channels: Vec<Channel>,
    mode: SenseMode,
    /// Fingerprints never reported, kept sorted.
    ignored: Vec<u32>,
}

impl fmt::Debug for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sensor")
            .field("region", &self.region)
            .field("origin", &self.origin)
            .field("tests", &self.tests)
            .field("channels", &self.channels)
            .field("mode", &self.mode)
            .field("ignored", &self.ignored.len())
            .finish_non_exhaustive()
    }
}

impl Sensor {
    /// A sensor at `origin` querying `region`, without tests or channels.
    pub fn new(container: Arc<SenseContainer>, origin: Vec3, region: Region) -> Self {
        Self {
            container,
            region,
            origin,
            tests: Vec::new(),
            channels: Vec::new(),
            mode: SenseMode::Override,
            ignored: Vec::new(),
        }
    }

    /// A sensor with the channels and update mode of `config`.
    pub fn from_config(
        container: Arc<SenseContainer>,
        config: &PerceptConfig,
        origin: Vec3,
        region: Region,
    ) -> Self {
        let depth = config.sensor.depth.into();
        let mut sensor = Self::new(container, origin, region).with_mode(config.sensor.mode);
        for setup in &config.channels {
            sensor.add_channel(setup.clone(), depth);
        }
        sensor
    }

    /// Builder-style update mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SenseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder-style test.
    #[must_use]
    pub fn with_test(mut self, test: impl SenseTest + 'static) -> Self {
        self.tests.push(Box::new(test));
        self
    }

    /// Builder-style channel.
    #[must_use]
    pub fn with_channel(mut self, setup: ChannelConfig, depth: DetectDepth) -> Self {
        self.add_channel(setup, depth);
        self
    }

    /// Add a channel, or replace the pool of an existing one with the same bit.
    pub fn add_channel(&mut self, setup: ChannelConfig, depth: DetectDepth) {
        let pool = DetectPool::new(setup.detect_config(depth));
        let channel = Channel {
            setup,
            pool,
            staged: 0,
        };
        match self
            .channels
            .iter_mut()
            .find(|c| c.setup.bit() == channel.setup.bit())
        {
            Some(existing) => *existing = channel,
            None => self.channels.push(channel),
        }
    }

    /// Move the sensor.
    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    /// Replace the query region.
    pub fn set_region(&mut self, region: Region) {
        self.region = region;
    }

    /// The query region.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Union of the channel bits this sensor listens on.
    pub fn channel_mask(&self) -> u64 {
        self.channels.iter().fold(0, |m, c| m | c.setup.bit())
    }

    /// Never report the stimulus with fingerprint `hash`.
    pub fn ignore(&mut self, hash: u32) {
        insert_unique_hash(&mut self.ignored, hash, false);
    }

    /// Undo [`Self::ignore`]. Returns whether it was ignored.
    pub fn unignore(&mut self, hash: u32) -> bool {
        remove_hash(&mut self.ignored, hash)
    }

    /// The detection pool of a channel number.
    pub fn pool(&self, channel: u8) -> Option<&DetectPool> {
        self.channel(channel).map(|c| &c.pool)
    }

    /// Detection settings of a channel number.
    pub fn detect_config(&self, channel: u8) -> Option<&DetectConfig> {
        self.pool(channel).map(DetectPool::config)
    }

    /// Copies of the records in one event array of a channel.
    pub fn events(&self, channel: u8, event: SenseEvent) -> Vec<SensedStimulus> {
        self.pool(channel)
            .map(|p| p.copy_of(event))
            .unwrap_or_default()
    }

    fn channel(&self, channel: u8) -> Option<&Channel> {
        let bit = ChannelConfig::on(channel).bit();
        self.channels.iter().find(|c| c.setup.bit() == bit)
    }

    /// Run one full cycle at time `now`.
    pub fn update_cycle(&mut self, now: f64) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let mask = self.channel_mask();
        let region = self.clipped_region();
        for channel in &mut self.channels {
            channel.staged = 0;
        }

        if mask != 0 && !self.tests.is_empty() {
            let container = Arc::clone(&self.container);
            let session = container.remove_session();
            let ids = container.query_ids(&region, mask);
            summary.queried = ids.len();
            for id in ids {
                let Some(record) = container.sensed_copy_ts(id) else {
                    summary.vanished += 1;
                    continue;
                };
                let Some(bounds) = container.bounds_ts(id) else {
                    summary.vanished += 1;
                    continue;
                };
                if self.sense(now, record, &bounds, mask) {
                    summary.matched += 1;
                }
            }
            drop(session);
        }

        let override_state = self.mode == SenseMode::Override;
        let container = &self.container;
        let is_alive =
            |r: &SensedStimulus| r.handle.is_some_and(|h| container.is_live_ts(h, r.hash));
        for channel in &mut self.channels {
            if channel.staged > 0 {
                channel.pool.new_sensed_update(override_state);
            } else {
                channel.pool.empty_update(override_state, is_alive);
            }
            channel.pool.new_age_update(now, is_alive);
        }
        trace!(
            queried = summary.queried,
            matched = summary.matched,
            vanished = summary.vanished,
            "sensor cycle"
        );
        summary
    }

    /// Tighten the region to the reach of the test chain.
    fn clipped_region(&self) -> Region {
        let reach = self
            .tests
            .iter()
            .filter_map(|t| t.reach(self.origin))
            .reduce(|a, b| a.intersect(&b));
        match (reach, self.region) {
            (None, region) => region,
            (Some(reach), Region::Box(b)) => Region::Box(b.intersect(&reach)),
            (Some(reach), Region::Sphere { center, radius }) => Region::BoxSphere {
                bounds: reach,
                center,
                radius,
            },
            (
                Some(reach),
                Region::BoxSphere {
                    bounds,
                    center,
                    radius,
                },
            ) => Region::BoxSphere {
                bounds: bounds.intersect(&reach),
                center,
                radius,
            },
        }
    }

    /// Test one stimulus and stage it on the channels it qualifies for.
    fn sense(&mut self, now: f64, mut record: SensedStimulus, bounds: &Aabb3, mask: u64) -> bool {
        if !record.is_enabled() || contains_hash(&self.ignored, record.hash) {
            return false;
        }
        record.channels &= mask;
        record.sensed_points.clear();

        let mut outcome = TestOutcome::Sensed;
        for (index, test) in self.tests.iter().enumerate() {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Test chains are short; the index only labels sensed points."
            )]
            let result = test.run(index as u8, self.origin, &mut record, bounds);
            outcome = outcome.max(result);
            if outcome == TestOutcome::Lost {
                return false;
            }
        }

        let mut staged = false;
        for channel in &mut self.channels {
            let bit = channel.setup.bit();
            if !record.on_channels(bit) {
                continue;
            }
            if outcome == TestOutcome::NotLost
                && channel.pool.contains_in_current(record.hash).is_none()
            {
                continue;
            }
            let mut copy = record.clone();
            if let Some(age) = channel.setup.forget_age {
                copy.age = age;
            }
            if channel.pool.add(now, copy) {
                channel.staged += 1;
                staged = true;
            }
        }
        staged
    }
}

/// A [`SenseJob`] running a shared [`Sensor`] against a clock.
pub struct SensorTask {
    sensor: Mutex<Sensor>,
    clock: Box<dyn Fn() -> f64 + Send + Sync>,
    ready: AtomicBool,
    cycles: AtomicU64,
}

impl fmt::Debug for SensorTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorTask")
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SensorTask {
    /// Wrap a sensor. `clock` supplies the time passed to each cycle.
    pub fn new(sensor: Sensor, clock: impl Fn() -> f64 + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            sensor: Mutex::new(sensor),
            clock: Box::new(clock),
            ready: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
        })
    }

    /// Mark the task ready and queue it.
    pub fn schedule(
        self: &Arc<Self>,
        worker: &SenseWorker,
        high_priority: bool,
    ) -> Result<(), QueueError> {
        self.ready.store(true, Ordering::Release);
        let job: Arc<dyn SenseJob> = Arc::clone(self) as Arc<dyn SenseJob>;
        worker.enqueue(job, high_priority)
    }

    /// Withdraw a pending schedule; the worker will skip the queued job.
    pub fn cancel(&self) {
        self.ready.store(false, Ordering::Release);
    }

    /// Completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Lock the sensor, e.g. to read events or move it between cycles.
    pub fn sensor(&self) -> MutexGuard<'_, Sensor> {
        self.sensor.lock()
    }
}

impl SenseJob for SensorTask {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn run(&self) -> bool {
        let now = (self.clock)();
        self.sensor.lock().update_cycle(now);
        self.ready.store(false, Ordering::Release);
        self.cycles.fetch_add(1, Ordering::AcqRel);
        true
    }
}
