// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two-lane background worker that runs sensor updates.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Select, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::QueueConfig;

/// How long an idle worker sleeps between checks when nothing wakes it.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Unit of work for a [`SenseWorker`].
pub trait SenseJob: Send + Sync {
    /// Whether the job still wants to run. Jobs that do not are skipped.
    fn is_ready(&self) -> bool {
        true
    }

    /// Do the work. Returning `false` keeps the job at the head of its lane to be
    /// retried after the idle wait.
    fn run(&self) -> bool;
}

/// A queue lane.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Always drained before [`Lane::Low`].
    High,
    /// Runs when the high lane is empty.
    Low,
}

/// Failure to hand a job to the worker.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The lane is at capacity.
    #[error("{0:?} priority lane is full")]
    Full(Lane),
    /// The worker has shut down.
    #[error("sense worker has stopped")]
    Stopped,
    /// The worker thread could not be started.
    #[error("failed to spawn sense worker: {0}")]
    Spawn(#[from] std::io::Error),
}

type Job = Arc<dyn SenseJob>;

#[derive(Debug, Default)]
struct Shared {
    shutdown: AtomicBool,
    paused: AtomicBool,
    completed: AtomicU64,
    skipped: AtomicU64,
}

/// One worker thread draining a high and a low priority lane.
///
/// Within a lane jobs run in FIFO order, and the high lane is always empty before
/// a low-lane job starts. After [`QueueConfig::per_wake_cap`] jobs, or a job that
/// reports itself unfinished, the worker waits [`QueueConfig::idle_wait`] before
/// continuing. With both lanes empty it blocks until a job arrives.
pub struct SenseWorker {
    high: Sender<Job>,
    low: Sender<Job>,
    wake: Sender<()>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for SenseWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseWorker")
            .field("high_queued", &self.high.len())
            .field("low_queued", &self.low.len())
            .field("shared", &self.shared)
            .field("running", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl SenseWorker {
    /// Start the worker thread.
    pub fn spawn(config: &QueueConfig) -> Result<Self, QueueError> {
        let capacity = config.lane_capacity.max(1);
        let (high, high_rx) = channel::bounded(capacity);
        let (low, low_rx) = channel::bounded(capacity);
        let (wake, wake_rx) = channel::bounded(1);
        let shared = Arc::new(Shared::default());

        let mut pump = Pump {
            lanes: [high_rx, low_rx],
            wake: wake_rx,
            heads: [None, None],
            shared: Arc::clone(&shared),
            per_wake_cap: config.per_wake_cap.max(1),
            idle_wait: config.idle_wait(),
        };
        let handle = thread::Builder::new()
            .name("percept-sense".to_owned())
            .spawn(move || pump.run())?;
        debug!(capacity, per_wake_cap = config.per_wake_cap, "sense worker started");

        Ok(Self {
            high,
            low,
            wake,
            shared,
            handle: Some(handle),
        })
    }

    /// Queue a job on the high or low lane.
    pub fn enqueue(&self, job: Arc<dyn SenseJob>, high_priority: bool) -> Result<(), QueueError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(QueueError::Stopped);
        }
        let (lane, sender) = if high_priority {
            (Lane::High, &self.high)
        } else {
            (Lane::Low, &self.low)
        };
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full(lane),
            TrySendError::Disconnected(_) => QueueError::Stopped,
        })
    }

    /// Stop running jobs until [`Self::resume`]. Jobs can still be queued.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::AcqRel) {
            debug!("sense worker paused");
        }
    }

    /// Continue after [`Self::pause`].
    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            // A wake already pending covers this one.
            let _ = self.wake.try_send(());
            debug!("sense worker resumed");
        }
    }

    /// Whether the worker is paused.
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Jobs queued and not yet taken by the worker.
    pub fn queued(&self) -> usize {
        self.high.len() + self.low.len()
    }

    /// Jobs that ran to completion.
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Jobs dropped because they were not ready.
    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it. Queued jobs are dropped.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.wake.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sense worker panicked");
            }
            debug!(completed = self.completed(), "sense worker stopped");
        }
    }
}

impl Drop for SenseWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Pump {
    lanes: [Receiver<Job>; 2],
    wake: Receiver<()>,
    /// Unfinished jobs, retried before anything else on their lane.
    heads: [Option<Job>; 2],
    shared: Arc<Shared>,
    per_wake_cap: usize,
    idle_wait: Duration,
}

enum Step {
    Ran,
    Unfinished,
    Empty,
}

impl Pump {
    fn stopping(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    fn run(&mut self) {
        while !self.stopping() {
            if self.shared.paused.load(Ordering::Acquire) {
                let _ = self.wake.recv_timeout(IDLE_POLL);
                continue;
            }
            let mut processed = 0;
            let rest = loop {
                if self.stopping() || self.shared.paused.load(Ordering::Acquire) {
                    break None;
                }
                if processed >= self.per_wake_cap {
                    break Some(self.idle_wait);
                }
                match self.step() {
                    Step::Ran => processed += 1,
                    Step::Unfinished => break Some(self.idle_wait),
                    Step::Empty => break None,
                }
            };
            match rest {
                Some(wait) => thread::sleep(wait),
                None if processed == 0 => self.wait_for_work(),
                None => {}
            }
        }
        trace!("sense worker loop exited");
    }

    /// Run the job at the front of the first non-empty lane.
    fn step(&mut self) -> Step {
        for lane in 0..2 {
            let job = match self.heads[lane].take() {
                Some(job) => job,
                None => match self.lanes[lane].try_recv() {
                    Ok(job) => job,
                    Err(_) => continue,
                },
            };
            if !job.is_ready() {
                self.shared.skipped.fetch_add(1, Ordering::AcqRel);
                return Step::Ran;
            }
            if job.run() {
                self.shared.completed.fetch_add(1, Ordering::AcqRel);
                return Step::Ran;
            }
            self.heads[lane] = Some(job);
            return Step::Unfinished;
        }
        Step::Empty
    }

    /// Block until a lane has a job or the control channel fires.
    fn wait_for_work(&self) {
        if self.heads.iter().any(Option::is_some) {
            return;
        }
        let mut select = Select::new();
        for lane in &self.lanes {
            select.recv(lane);
        }
        select.recv(&self.wake);
        if let Ok(index) = select.ready_timeout(IDLE_POLL)
            && index == 2
        {
            let _ = self.wake.try_recv();
        }
    }
}
