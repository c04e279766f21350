//! # Measurement Primitives
//!
//! Pure bookkeeping used by the benchmark driver: queue-depth observations,
//! the drain tracker that turns a sequence of observations into a
//! [`RunResult`], and the send-phase progress counter and aggregation.
//!
//! Nothing here performs I/O, so the drain logic can be exercised with
//! synthetic observations and instants.

use crate::results::RunResult;
use crate::utils::create_progress_indicator;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Depths of the input and output queue observed at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub input: u64,
    pub output: u64,
}

impl QueueSnapshot {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Input empty and at least `target` messages on the output queue
    pub fn is_drained(&self, target: u64) -> bool {
        self.input == 0 && self.output >= target
    }
}

impl std::fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "In queue count: {} Out queue count: {}",
            self.input, self.output
        )
    }
}

/// Turns successive queue observations into a drain measurement
///
/// The start instant is the first observation with a strictly positive
/// output depth. The measurement completes on the first observation that
/// satisfies both drain conditions at once.
#[derive(Debug, Clone)]
pub struct DrainTracker {
    target: u64,
    start: Option<Instant>,
    observations: usize,
}

impl DrainTracker {
    pub fn new(target: u64) -> Self {
        Self {
            target,
            start: None,
            observations: 0,
        }
    }

    /// Record an observation; returns the result once the queues drained
    pub fn observe(&mut self, snapshot: QueueSnapshot, at: Instant) -> Option<RunResult> {
        self.observations += 1;

        if snapshot.output > 0 && self.start.is_none() {
            debug!("First output observed after {} polls", self.observations);
            self.start = Some(at);
        }

        if snapshot.is_drained(self.target) {
            Some(RunResult {
                start: self.start,
                end: at,
                observations: self.observations,
            })
        } else {
            None
        }
    }

    pub fn start(&self) -> Option<Instant> {
        self.start
    }

    pub fn observations(&self) -> usize {
        self.observations
    }
}

/// Shared count of messages acknowledged by the queue service
///
/// Cloned into every batch-send task; only successful publishes add to it.
#[derive(Debug, Clone)]
pub struct SendProgress {
    sent: Arc<Mutex<u64>>,
    total: u64,
}

impl SendProgress {
    pub fn new(total: u64) -> Self {
        Self {
            sent: Arc::new(Mutex::new(0)),
            total,
        }
    }

    /// Add `messages` to the counter and return the new total
    pub fn record(&self, messages: u64) -> u64 {
        let mut sent = self.sent.lock();
        let before = *sent;
        *sent += messages;
        let after = *sent;
        // Report on every tenth of the way so large runs stay readable.
        let step = (self.total / 10).max(1);
        if before / step != after / step || after == self.total {
            info!(
                "Sending messages [{}] {}/{}",
                create_progress_indicator(after as usize, self.total as usize, 30),
                after,
                self.total
            );
        }
        after
    }

    pub fn sent(&self) -> u64 {
        *self.sent.lock()
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Outcome of one batch-send unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Sent { messages: usize },
    Failed { error: String },
}

/// Aggregate of every batch outcome from the send phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    pub batches_attempted: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub messages_sent: u64,
    /// First few distinct failure messages, for the console and the report
    pub errors: Vec<String>,
}

impl SendReport {
    const MAX_REPORTED_ERRORS: usize = 5;

    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = BatchOutcome>,
    {
        let mut report = Self::default();
        for outcome in outcomes {
            report.batches_attempted += 1;
            match outcome {
                BatchOutcome::Sent { messages } => {
                    report.batches_sent += 1;
                    report.messages_sent += messages as u64;
                }
                BatchOutcome::Failed { error } => {
                    report.batches_failed += 1;
                    if report.errors.len() < Self::MAX_REPORTED_ERRORS
                        && !report.errors.contains(&error)
                    {
                        report.errors.push(error);
                    }
                }
            }
        }
        report
    }

    pub fn is_complete(&self) -> bool {
        self.batches_failed == 0
    }
}
