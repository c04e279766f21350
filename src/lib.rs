//! # Queue Throughput Bench Library
//!
//! Measures the end-to-end throughput of a queue-triggered function: how long
//! a consumer takes to move a fixed number of messages from an input queue to
//! an output queue.
//!
//! ## How a Run Works
//!
//! The consumer is stopped, both queues are recreated empty, the input queue
//! is flooded with `message_count` copies of a payload (published in
//! concurrent batches), and the consumer is started again. Queue depths are
//! then polled once per interval; the clock runs from the first observation
//! with output to the first observation where the input queue is empty and the
//! output queue holds every message.
//!
//! ## Architecture Overview
//!
//! - `benchmark`: The run driver and its phases
//! - `cli`: Command-line parsing
//! - `clients`: Service traits and their Azure bindings
//! - `config`: The immutable run configuration
//! - `credential`: Bearer-token resolution for the service bindings
//! - `metrics`: Queue snapshots, drain tracking and send-phase bookkeeping
//! - `results`: The run result and report output
//! - `task_group`: Fork/join helper used by the fan-out phases
//! - `testing`: In-memory service fakes
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use queue_throughput_bench::{BenchmarkDriver, RunConfig, ServiceClients};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig {
//!         namespace: "my-namespace".to_string(),
//!         subscription_id: "00000000-0000-0000-0000-000000000000".to_string(),
//!         message_count: 1000,
//!         ..Default::default()
//!     };
//!
//!     let clients = ServiceClients::from_config(&config)?;
//!     let driver = BenchmarkDriver::new(config, clients);
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let report = driver.run(shutdown_rx).await?;
//!
//!     println!("{}", report.time_taken_line());
//!     Ok(())
//! }
//! ```

pub mod benchmark;
pub mod cli;

/// Service abstractions and their Azure implementations
///
/// The driver only sees the `QueueAdmin`, `Messaging` and `ComputeControl`
/// traits. The Azure bindings speak the Resource Manager and Service Bus
/// REST APIs with `reqwest`.
pub mod clients;

pub mod config;
pub mod credential;
pub mod error;
pub mod logging;

/// Queue-depth observations and send-phase accounting
pub mod metrics;

pub mod results;
pub mod task_group;
pub mod testing;
pub mod utils;

pub use benchmark::{BenchmarkDriver, RunPhase};
pub use cli::Args;
pub use clients::{
    BodyEncoding, ComputeControl, MessageBatch, MessageSender, Messaging, QueueAdmin,
    ServiceClients,
};
pub use config::RunConfig;
pub use error::{DrainError, ServiceError};
pub use metrics::{QueueSnapshot, SendReport};
pub use results::{RunReport, RunResult};

/// The current version of the benchmark
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const RESOURCE_GROUP: &str = "sb-functions-throughput-test";

    pub const FUNCTION_APP: &str = "sb-functions-throughput-test";

    pub const IN_QUEUE: &str = "in";

    pub const OUT_QUEUE: &str = "out";

    /// Messages per published batch
    pub const BATCH_SIZE: usize = 5;

    /// Total messages per run
    pub const MESSAGE_COUNT: usize = 5000;

    pub const MESSAGE_FILE: &str = "testmessage.json";

    /// Upper bound on messages in one batch accepted by the queue service
    pub const MAX_BATCH_SIZE: usize = 2048;

    /// Batch byte capacity of a Standard-tier namespace (256 KiB)
    pub const MAX_BATCH_BYTES: usize = 256 * 1024;

    /// Wait after stopping or starting the consumer
    ///
    /// Stopping needs time for in-flight invocations to finish before the
    /// queues are deleted; starting needs time for the host to come up and
    /// attach its queue listener.
    pub const LIFECYCLE_WAIT: Duration = Duration::from_secs(20);

    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
}
