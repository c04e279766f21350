//! # Benchmark Driver Module
//!
//! Orchestrates one end-to-end throughput trial against a queue-triggered
//! consumer and reports how long the consumer needed to move every message
//! from the input queue to the output queue.
//!
//! ## Run Lifecycle
//!
//! 1. **StopConsumer**: Stop the function app and wait for in-flight work to settle
//! 2. **LoadPayload**: Read the message body from disk once
//! 3. **ResetQueues**: Delete and recreate both queues in parallel
//! 4. **PreflightStats**: Confirm both queues are reachable and report their depth
//! 5. **Send**: Publish `message_count / batch_size` batches concurrently
//! 6. **StartConsumer**: Start the function app and let it warm up
//! 7. **Poll**: Observe queue depths until the pipeline has drained
//! 8. **Report**: Build the run report
//!
//! Any external failure ends the run with an error naming the phase. The one
//! exception is a single batch publish: its failure is recorded in the
//! [`SendReport`] and the remaining batches carry on.

use crate::clients::{ComputeControl, Messaging, QueueAdmin, ServiceClients};
use crate::config::RunConfig;
use crate::error::{DrainError, ServiceError};
use crate::metrics::{BatchOutcome, DrainTracker, QueueSnapshot, SendProgress, SendReport};
use crate::results::{RunReport, RunResult};
use crate::task_group::TaskGroup;
use crate::utils::Console;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Phases of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    StopConsumer,
    LoadPayload,
    ResetQueues,
    PreflightStats,
    Send,
    StartConsumer,
    Poll,
    Report,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::StopConsumer => "stop consumer",
            RunPhase::LoadPayload => "load payload",
            RunPhase::ResetQueues => "reset queues",
            RunPhase::PreflightStats => "preflight stats",
            RunPhase::Send => "send messages",
            RunPhase::StartConsumer => "start consumer",
            RunPhase::Poll => "measure drain",
            RunPhase::Report => "report",
        };
        write!(f, "{}", name)
    }
}

/// Drives a single benchmark run
///
/// Owns the run configuration and the collaborator handles; each phase is a
/// public method so it can be exercised on its own.
pub struct BenchmarkDriver {
    config: RunConfig,
    queues: Arc<dyn QueueAdmin>,
    messaging: Arc<dyn Messaging>,
    compute: Arc<dyn ComputeControl>,
    console: Console,
}

impl BenchmarkDriver {
    pub fn new(config: RunConfig, clients: ServiceClients) -> Self {
        Self {
            config,
            queues: clients.queues,
            messaging: clients.messaging,
            compute: clients.compute,
            console: Console::stdout(),
        }
    }

    /// Send queue-count lines somewhere other than stdout
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute every phase in order and build the report
    ///
    /// `shutdown` cancels the drain measurement when it flips to `true`.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<RunReport> {
        self.config.validate()?;
        info!(
            "Starting throughput run: {} messages in batches of {} against {}/{}",
            self.config.message_count,
            self.config.batch_size,
            self.config.namespace,
            self.config.in_queue
        );

        let phase = self.enter(RunPhase::StopConsumer);
        self.stop_consumer().await.context(phase)?;

        let phase = self.enter(RunPhase::LoadPayload);
        let payload = self.load_test_message().await.context(phase)?;

        let phase = self.enter(RunPhase::ResetQueues);
        self.reset_queues().await.context(phase)?;

        let phase = self.enter(RunPhase::PreflightStats);
        self.report_queue_stats().await.context(phase)?;

        let phase = self.enter(RunPhase::Send);
        let send_report = self.send_messages(payload).await.context(phase)?;

        let phase = self.enter(RunPhase::StartConsumer);
        self.start_consumer().await.context(phase)?;

        let phase = self.enter(RunPhase::Poll);
        let result = self.measure_drain(shutdown).await.context(phase)?;

        self.enter(RunPhase::Report);
        Ok(RunReport::new(&self.config, send_report, &result))
    }

    fn enter(&self, phase: RunPhase) -> RunPhase {
        debug!("Entering phase: {}", phase);
        phase
    }

    /// Stop the consumer and wait for in-flight processing to settle
    pub async fn stop_consumer(&self) -> Result<()> {
        info!("Stopping function app...");
        self.compute
            .stop(&self.config.function_app)
            .await
            .with_context(|| format!("Failed to stop function app '{}'", self.config.function_app))?;
        sleep(self.config.stop_cooldown).await;
        Ok(())
    }

    /// Start the consumer and give it time to warm up
    pub async fn start_consumer(&self) -> Result<()> {
        info!("Starting function app...");
        self.compute
            .start(&self.config.function_app)
            .await
            .with_context(|| {
                format!("Failed to start function app '{}'", self.config.function_app)
            })?;
        sleep(self.config.start_warmup).await;
        Ok(())
    }

    /// Read the payload every message of the run carries
    pub async fn load_test_message(&self) -> Result<Bytes> {
        let path = &self.config.message_file;
        let contents = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read test message from {}", path.display()))?;
        debug!("Loaded {} byte test message from {}", contents.len(), path.display());
        Ok(Bytes::from(contents))
    }

    /// Delete and recreate both queues, one task per queue
    ///
    /// Both tasks are always joined; if either failed the phase fails, even
    /// when the other queue was recreated successfully.
    pub async fn reset_queues(&self) -> Result<()> {
        let mut group = TaskGroup::new();
        for queue in [&self.config.in_queue, &self.config.out_queue] {
            let admin = self.queues.clone();
            let queue = queue.clone();
            group.spawn(async move {
                info!("Recreating queue {}", queue);
                admin
                    .delete_queue(&queue)
                    .await
                    .with_context(|| format!("Failed to delete queue '{}'", queue))?;
                admin
                    .create_queue(&queue)
                    .await
                    .with_context(|| format!("Failed to create queue '{}'", queue))?;
                Ok::<_, anyhow::Error>(())
            });
        }

        let mut first_error = None;
        for result in group.join_all().await {
            let outcome = result
                .map_err(|e| anyhow!("Queue reset task failed: {}", e))
                .and_then(|r| r);
            if let Err(e) = outcome {
                error!("{:#}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fetch both queue depths concurrently and print them
    ///
    /// The count line goes to the console at every log level.
    pub async fn report_queue_stats(&self) -> Result<QueueSnapshot> {
        let mut group = TaskGroup::new();
        for queue in [&self.config.in_queue, &self.config.out_queue] {
            let admin = self.queues.clone();
            let queue = queue.clone();
            group.spawn(async move {
                admin
                    .get_queue(&queue)
                    .await
                    .with_context(|| format!("Failed to get queue '{}'", queue))
            });
        }

        let mut depths = Vec::with_capacity(2);
        for result in group.join_all().await {
            let properties = result.map_err(|e| anyhow!("Queue stats task failed: {}", e))??;
            depths.push(properties.message_count);
        }

        let snapshot = QueueSnapshot::new(depths[0], depths[1]);
        self.console.line(snapshot);
        debug!(
            input = snapshot.input,
            output = snapshot.output,
            "Observed queue depths"
        );
        Ok(snapshot)
    }

    /// Publish `message_count / batch_size` batches, all in flight at once
    ///
    /// Each unit opens its own batch, fills it with `batch_size` copies of
    /// the payload and publishes it. A failed unit is logged and recorded in
    /// the returned report; it never stops its siblings and never counts
    /// toward progress.
    pub async fn send_messages(&self, payload: Bytes) -> Result<SendReport> {
        let batch_count = self.config.batch_count();
        let batch_size = self.config.batch_size;

        let sender = self
            .messaging
            .sender(&self.config.in_queue)
            .await
            .with_context(|| format!("Failed to open sender for queue '{}'", self.config.in_queue))?;

        // A batch that cannot hold `batch_size` copies would fail every unit,
        // whether from size or from a body the wire encoding cannot carry.
        let mut trial_batch = sender
            .new_batch()
            .await
            .context("Failed to open message batch")?;
        for _ in 0..batch_size {
            trial_batch.try_add(payload.clone()).with_context(|| {
                format!(
                    "Cannot batch {} copies of the {} byte test message",
                    batch_size,
                    payload.len()
                )
            })?;
        }

        info!(
            "Sending {} messages in {} batches of {}",
            self.config.messages_to_send(),
            batch_count,
            batch_size
        );
        let progress = SendProgress::new(self.config.messages_to_send() as u64);

        let mut group = TaskGroup::new();
        for _ in 0..batch_count {
            let sender = sender.clone();
            let payload = payload.clone();
            let progress = progress.clone();
            group.spawn(async move {
                let result: Result<(), ServiceError> = async {
                    let mut batch = sender.new_batch().await?;
                    for _ in 0..batch_size {
                        batch.try_add(payload.clone())?;
                    }
                    sender.send_batch(batch).await
                }
                .await;

                match result {
                    Ok(()) => {
                        progress.record(batch_size as u64);
                        BatchOutcome::Sent {
                            messages: batch_size,
                        }
                    }
                    Err(e) => {
                        warn!("error sending message: {}", e);
                        BatchOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            });
        }

        let outcomes = group.join_all().await.into_iter().map(|r| match r {
            Ok(outcome) => outcome,
            Err(e) => BatchOutcome::Failed {
                error: format!("batch task failed: {}", e),
            },
        });
        let report = SendReport::from_outcomes(outcomes);

        if report.is_complete() {
            info!("Sent {} messages", report.messages_sent);
        } else {
            warn!(
                "Sent {} messages; {} of {} batches failed",
                report.messages_sent, report.batches_failed, report.batches_attempted
            );
        }
        Ok(report)
    }

    /// Poll queue depths until the pipeline drains
    ///
    /// Observes both queues once per poll interval. The first observation
    /// with a non-empty output queue starts the clock; the first observation
    /// with an empty input queue and at least `message_count` messages on the
    /// output queue stops it. Polling ends early with [`DrainError`] when
    /// `shutdown` fires or the configured poll timeout passes.
    pub async fn measure_drain(&self, mut shutdown: watch::Receiver<bool>) -> Result<RunResult> {
        let started = Instant::now();
        let deadline = self.config.poll_timeout.map(|t| started + t);
        let mut tracker = DrainTracker::new(self.config.message_count as u64);

        loop {
            let snapshot = self.report_queue_stats().await?;
            let now = Instant::now();
            if let Some(result) = tracker.observe(snapshot, now) {
                if result.start.is_none() {
                    warn!("Queues drained without any output being observed");
                }
                return Ok(result);
            }

            if let Some(deadline) = deadline {
                if now >= deadline {
                    return Err(DrainError::TimedOut {
                        waited: now.duration_since(started),
                    }
                    .into());
                }
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {}
                _ = cancelled(&mut shutdown) => {
                    return Err(DrainError::Cancelled.into());
                }
            }
        }
    }
}

/// Resolves once the shutdown flag is set; never resolves if the sender is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeServices;
    use std::io::Write;
    use std::time::Duration;

    fn config(message_count: usize, batch_size: usize) -> RunConfig {
        RunConfig {
            namespace: "ns".to_string(),
            subscription_id: "sub".to_string(),
            function_app: "fn".to_string(),
            message_count,
            batch_size,
            ..Default::default()
        }
    }

    fn driver(services: &FakeServices, config: RunConfig) -> BenchmarkDriver {
        BenchmarkDriver::new(config, services.clients())
    }

    fn never_cancelled() -> watch::Receiver<bool> {
        // A dropped sender means nobody can cancel.
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_send_issues_one_publish_per_batch() {
        let services = FakeServices::default();
        let driver = driver(&services, config(10, 5));
        let payload = Bytes::from_static(br#"{"hello":"world"}"#);

        let report = driver.send_messages(payload.clone()).await.unwrap();

        let published = services.messaging.published();
        assert_eq!(published.len(), 2);
        assert!(published
            .iter()
            .all(|batch| batch.len() == 5 && batch.iter().all(|m| *m == payload)));
        assert_eq!(report.batches_sent, 2);
        assert_eq!(report.messages_sent, 10);
        assert_eq!(services.journal.count("sender in"), 1);
    }

    #[tokio::test]
    async fn test_send_truncates_remainder() {
        let services = FakeServices::default();
        let driver = driver(&services, config(12, 5));

        let report = driver
            .send_messages(Bytes::from_static(b"m"))
            .await
            .unwrap();

        assert_eq!(services.messaging.send_attempts(), 2);
        assert_eq!(report.messages_sent, 10);
    }

    #[tokio::test]
    async fn test_failed_publish_is_soft() {
        let services = FakeServices::default();
        services.messaging.fail_first_sends(3);
        let driver = driver(&services, config(50, 5));

        let report = driver
            .send_messages(Bytes::from_static(b"m"))
            .await
            .unwrap();

        assert_eq!(services.messaging.send_attempts(), 10);
        assert_eq!(services.messaging.published().len(), 7);
        assert_eq!(report.batches_failed, 3);
        assert_eq!(report.batches_sent, 7);
        assert_eq!(report.messages_sent, 35);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_send_rejects_batch_over_capacity() {
        let services = FakeServices::new(64);
        let driver = driver(&services, config(10, 5));

        let err = driver
            .send_messages(Bytes::from(vec![b'x'; 32]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Cannot batch 5 copies"));
        assert!(format!("{:#}", err).contains("does not fit in batch"));
        assert_eq!(services.messaging.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_rejects_payload_the_encoding_cannot_carry() {
        let services = FakeServices::default();
        services.messaging.require_text_bodies();
        let driver = driver(&services, config(10, 5));

        let err = driver
            .send_messages(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("not valid UTF-8"));
        assert_eq!(services.messaging.send_attempts(), 0);
        assert!(services.messaging.published().is_empty());
    }

    #[tokio::test]
    async fn test_text_payload_is_published_unchanged() {
        let services = FakeServices::default();
        services.messaging.require_text_bodies();
        let driver = driver(&services, config(10, 5));
        let payload = Bytes::from("{\"name\":\"caf\u{e9}\"}");

        driver.send_messages(payload.clone()).await.unwrap();

        let published = services.messaging.published();
        assert_eq!(published.len(), 2);
        assert!(published.iter().flatten().all(|m| *m == payload));
    }

    #[tokio::test]
    async fn test_reset_deletes_then_creates_each_queue() {
        let services = FakeServices::default();
        let driver = driver(&services, config(10, 5));

        driver.reset_queues().await.unwrap();

        let journal = &services.journal;
        for queue in ["in", "out"] {
            let deleted = journal.position(&format!("delete {}", queue)).unwrap();
            let created = journal.position(&format!("create {}", queue)).unwrap();
            assert!(deleted < created);
        }
        assert_eq!(journal.entries().len(), 4);
    }

    #[tokio::test]
    async fn test_reset_fails_if_either_queue_fails() {
        let services = FakeServices::default();
        services.queues.fail_on("create out");
        let driver = driver(&services, config(10, 5));

        let err = driver.reset_queues().await.unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to create queue 'out'"));
        // The other queue was still recreated before the phase failed.
        assert!(services.journal.position("create in").is_some());
    }

    #[tokio::test]
    async fn test_reset_skips_create_after_failed_delete() {
        let services = FakeServices::default();
        services.queues.fail_on("delete in");
        let driver = driver(&services, config(10, 5));

        assert!(driver.reset_queues().await.is_err());
        assert_eq!(services.journal.position("create in"), None);
    }

    #[tokio::test]
    async fn test_queue_stats_pairs_input_and_output() {
        let services = FakeServices::default();
        services.queues.script_snapshots("in", "out", &[(7, 3)]);
        let driver = driver(&services, config(10, 5));

        let snapshot = driver.report_queue_stats().await.unwrap();
        assert_eq!(snapshot, QueueSnapshot::new(7, 3));
    }

    #[tokio::test]
    async fn test_queue_stats_failure_is_fatal() {
        let services = FakeServices::default();
        services.queues.fail_on("get out");
        let driver = driver(&services, config(10, 5));

        assert!(driver.report_queue_stats().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_drain_scenario() {
        let services = FakeServices::default();
        services
            .queues
            .script_snapshots("in", "out", &[(10, 0), (5, 5), (0, 10)]);
        let driver = driver(&services, config(10, 5));

        let result = driver.measure_drain(never_cancelled()).await.unwrap();

        assert_eq!(result.observations, 3);
        assert_eq!(result.elapsed(), Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_counts_printed_on_every_poll() {
        let services = FakeServices::default();
        services
            .queues
            .script_snapshots("in", "out", &[(10, 0), (5, 5), (0, 10)]);
        let console = Console::capturing();
        let driver = driver(&services, config(10, 5)).with_console(console.clone());

        driver.measure_drain(never_cancelled()).await.unwrap();

        assert_eq!(
            console.lines(),
            vec![
                "In queue count: 10 Out queue count: 0",
                "In queue count: 5 Out queue count: 5",
                "In queue count: 0 Out queue count: 10",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_drain_needs_both_conditions_together() {
        let services = FakeServices::default();
        services.queues.script_snapshots(
            "in",
            "out",
            &[(0, 0), (0, 4), (3, 10), (0, 9), (0, 10)],
        );
        let driver = driver(&services, config(10, 5));

        let result = driver.measure_drain(never_cancelled()).await.unwrap();

        assert_eq!(result.observations, 5);
        // Clock starts at the second observation (first positive output).
        assert_eq!(result.elapsed(), Some(Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_drain_times_out() {
        let services = FakeServices::default();
        services.queues.script_snapshots("in", "out", &[(10, 0)]);
        let mut config = config(10, 5);
        config.poll_timeout = Some(Duration::from_secs(5));
        let driver = driver(&services, config);

        let err = driver.measure_drain(never_cancelled()).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<DrainError>(),
            Some(&DrainError::TimedOut {
                waited: Duration::from_secs(5)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_drain_cancelled() {
        let services = FakeServices::default();
        services.queues.script_snapshots("in", "out", &[(10, 0)]);
        let driver = driver(&services, config(10, 5));
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            let _ = tx.send(true);
        });
        let err = driver.measure_drain(rx).await.unwrap_err();

        assert_eq!(err.downcast_ref::<DrainError>(), Some(&DrainError::Cancelled));
        assert_eq!(services.journal.count("get in"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_waits() {
        let services = FakeServices::default();
        let driver = driver(&services, config(10, 5));

        let start = Instant::now();
        driver.stop_consumer().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(20));
        driver.start_consumer().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(40));
        assert_eq!(services.journal.entries(), vec!["stop fn", "start fn"]);
    }

    #[tokio::test]
    async fn test_stop_failure_is_fatal() {
        let services = FakeServices::default();
        services.compute.fail_on("stop fn");
        let driver = driver(&services, config(10, 5));

        let err = driver.stop_consumer().await.unwrap_err();
        assert!(err.to_string().contains("Failed to stop function app 'fn'"));
    }

    #[tokio::test]
    async fn test_load_test_message() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00raw bytes\xff").unwrap();
        let services = FakeServices::default();
        let mut config = config(10, 5);
        config.message_file = file.path().to_path_buf();
        let driver = driver(&services, config);

        let payload = driver.load_test_message().await.unwrap();
        assert_eq!(&payload[..], b"\x00raw bytes\xff");
    }

    #[tokio::test]
    async fn test_load_missing_message_fails() {
        let services = FakeServices::default();
        let mut config = config(10, 5);
        config.message_file = "/nonexistent/testmessage.json".into();
        let driver = driver(&services, config);

        assert!(driver.load_test_message().await.is_err());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::ResetQueues.to_string(), "reset queues");
        assert_eq!(RunPhase::Poll.to_string(), "measure drain");
    }
}
