use crate::config::RunConfig;
use crate::metrics::SendReport;
use crate::utils::{format_duration, format_message_rate, print_table_row, print_table_separator};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Outcome of the drain measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    /// First observation with output depth > 0, if there was one
    pub start: Option<Instant>,
    /// Observation at which the queues were found drained
    pub end: Instant,
    /// Number of queue observations taken while measuring
    pub observations: usize,
}

impl RunResult {
    /// Time from first output activity to drain completion
    ///
    /// `None` when the output queue was never seen non-empty; there is no
    /// meaningful baseline to measure from in that case.
    pub fn elapsed(&self) -> Option<Duration> {
        self.start.map(|start| self.end.duration_since(start))
    }
}

/// Subset of the run configuration recorded with the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedConfiguration {
    pub namespace: String,
    pub function_app: String,
    pub in_queue: String,
    pub out_queue: String,
    pub batch_size: usize,
    pub message_count: usize,
    pub batch_count: usize,
}

impl From<&RunConfig> for ReportedConfiguration {
    fn from(config: &RunConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            function_app: config.function_app.clone(),
            in_queue: config.in_queue.clone(),
            out_queue: config.out_queue.clone(),
            batch_size: config.batch_size,
            message_count: config.message_count,
            batch_count: config.batch_count(),
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub configuration: ReportedConfiguration,
    pub send: SendReport,
    pub observations: usize,
    /// Seconds from first output activity to drain; null if undefined
    pub elapsed_seconds: Option<f64>,
    pub messages_per_second: Option<f64>,
}

impl RunReport {
    pub fn new(config: &RunConfig, send: SendReport, result: &RunResult) -> Self {
        let elapsed = result.elapsed();
        // Rate over what was actually enqueued, not what was configured.
        let messages_per_second = elapsed
            .filter(|e| !e.is_zero())
            .map(|e| send.messages_sent as f64 / e.as_secs_f64());

        Self {
            run_id: crate::utils::generate_run_id(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            configuration: config.into(),
            send,
            observations: result.observations,
            elapsed_seconds: elapsed.map(|e| e.as_secs_f64()),
            messages_per_second,
        }
    }

    /// The single console line carrying the measurement
    pub fn time_taken_line(&self) -> String {
        match self.elapsed_seconds {
            Some(seconds) => format!("Time taken:  {}", seconds),
            None => "Time taken:  undefined (output queue was never observed non-empty)"
                .to_string(),
        }
    }

    /// Print the measurement and a summary table to stdout
    pub fn print_summary(&self) {
        println!("{}", self.time_taken_line());

        let widths = [22, 24];
        let elapsed = self
            .elapsed_seconds
            .map(|s| format_duration(Duration::from_secs_f64(s)))
            .unwrap_or_else(|| "undefined".to_string());
        let rate = self
            .messages_per_second
            .map(format_message_rate)
            .unwrap_or_else(|| "n/a".to_string());

        println!();
        print_table_separator(&widths);
        print_table_row(&["Run", &self.run_id[..8]], &widths);
        print_table_separator(&widths);
        print_table_row(
            &["Messages configured", &self.configuration.message_count.to_string()],
            &widths,
        );
        print_table_row(
            &["Messages sent", &self.send.messages_sent.to_string()],
            &widths,
        );
        print_table_row(
            &[
                "Batches sent/failed",
                &format!("{}/{}", self.send.batches_sent, self.send.batches_failed),
            ],
            &widths,
        );
        print_table_row(&["Queue observations", &self.observations.to_string()], &widths);
        print_table_row(&["Drain time", &elapsed], &widths);
        print_table_row(&["Throughput", &rate], &widths);
        print_table_separator(&widths);
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Results written to: {:?}", path);
        Ok(())
    }
}
