//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the benchmark driver, the result reporting code and
//! the command-line layer.
//!
//! ## Key Functionality Categories
//!
//! - **Formatting**: Human-readable display of durations and message rates
//! - **Validation**: Run-configuration checks with clear error messages
//! - **Display Helpers**: Table formatting, the send-phase progress bar and
//!   the [`Console`] that result lines are written to
//!
//! ## Usage Examples
//!
//! ```rust
//! use queue_throughput_bench::utils::*;
//! use std::time::Duration;
//!
//! let duration_str = format_duration(Duration::from_micros(1500));
//! assert_eq!(duration_str, "1.50ms");
//!
//! let rate_str = format_message_rate(1500.0);
//! assert_eq!(rate_str, "1.50K msg/s");
//!
//! # fn main() -> anyhow::Result<()> {
//! validate_batch_size(5)?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use parking_lot::Mutex;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Generate a unique identifier for a benchmark run
///
/// The identifier is written into the JSON report so results from repeated
/// runs against the same namespace can be told apart.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format a duration in a human-readable way
///
/// Converts a Duration to a human-readable string, automatically selecting
/// the most appropriate unit based on the magnitude.
///
/// ## Unit Selection Logic
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use queue_throughput_bench::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format a message rate in a human-readable way
///
/// Uses decimal scaling (powers of 1000):
/// - Messages/sec: < 1,000 (e.g., "750 msg/s")
/// - Thousands: < 1,000,000 (e.g., "15.50K msg/s")
/// - Millions: ≥ 1,000,000 (e.g., "2.30M msg/s")
///
/// ```rust
/// # use queue_throughput_bench::utils::format_message_rate;
/// assert_eq!(format_message_rate(750.0), "750 msg/s");
/// assert_eq!(format_message_rate(15500.0), "15.50K msg/s");
/// ```
pub fn format_message_rate(messages_per_second: f64) -> String {
    if messages_per_second < 1000.0 {
        format!("{:.0} msg/s", messages_per_second)
    } else if messages_per_second < 1_000_000.0 {
        format!("{:.2}K msg/s", messages_per_second / 1000.0)
    } else {
        format!("{:.2}M msg/s", messages_per_second / 1_000_000.0)
    }
}

/// Validate the number of messages placed in each published batch
///
/// A batch must carry at least one message. The upper bound mirrors the
/// hard per-batch message limit of the queue service; anything above it is
/// rejected by the service regardless of the byte capacity of the batch.
pub fn validate_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(anyhow::anyhow!("Batch size must be greater than 0"));
    }

    if batch_size > crate::defaults::MAX_BATCH_SIZE {
        return Err(anyhow::anyhow!(
            "Batch size too large (max {} messages per batch)",
            crate::defaults::MAX_BATCH_SIZE
        ));
    }

    Ok(())
}

/// Validate the total number of messages to enqueue
pub fn validate_message_count(message_count: usize) -> Result<()> {
    if message_count == 0 {
        return Err(anyhow::anyhow!("Message count must be greater than 0"));
    }

    Ok(())
}

/// Validate a queue name
///
/// Queue names become part of management and messaging URLs, so they must be
/// non-empty and limited to the characters the queue service accepts
/// (letters, digits, `.`, `-`, `_` and `/`).
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("Queue name cannot be empty"));
    }

    if name.len() > 260 {
        return Err(anyhow::anyhow!(
            "Queue name '{}' is too long (max 260 characters)",
            name
        ));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/')))
    {
        return Err(anyhow::anyhow!(
            "Queue name '{}' contains invalid character '{}'",
            name,
            bad
        ));
    }

    Ok(())
}

/// Print a formatted table row
///
/// ```rust
/// # use queue_throughput_bench::utils::{print_table_row, print_table_separator};
/// let widths = [20, 12];
/// print_table_separator(&widths);
/// print_table_row(&["Messages sent", "5000"], &widths);
/// print_table_separator(&widths);
/// ```
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    print!("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        print!(" {:width$} |", column, width = width);
    }
    println!();
}

/// Print a table separator
pub fn print_table_separator(widths: &[usize]) {
    print!("+");
    for &width in widths {
        print!("{}+", "-".repeat(width + 2));
    }
    println!();
}

/// Destination of the lines that are shown at every log level
///
/// Queue counts and the measurement belong to the program's output, not its
/// log, so `-q` must not hide them. The default console writes to stdout; a
/// capturing console keeps the lines for inspection instead.
#[derive(Debug, Clone, Default)]
pub struct Console {
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::default()
    }

    pub fn capturing() -> Self {
        Self {
            captured: Some(Arc::default()),
        }
    }

    pub fn line(&self, line: impl Display) {
        match &self.captured {
            Some(lines) => lines.lock().push(line.to_string()),
            None => println!("{}", line),
        }
    }

    /// Lines written so far; always empty for the stdout console
    pub fn lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|lines| lines.lock().clone())
            .unwrap_or_default()
    }
}

/// Create a text progress bar
///
/// Used to report send-phase progress as batches are acknowledged.
///
/// ```rust
/// # use queue_throughput_bench::utils::create_progress_indicator;
/// assert_eq!(create_progress_indicator(0, 100, 10), "░░░░░░░░░░");
/// assert_eq!(create_progress_indicator(50, 100, 10), "█████░░░░░");
/// assert_eq!(create_progress_indicator(100, 100, 10), "██████████");
/// ```
pub fn create_progress_indicator(current: usize, total: usize, width: usize) -> String {
    if total == 0 {
        return "█".repeat(width);
    }

    let progress = (current as f64 / total as f64).min(1.0);
    let filled = ((progress * width as f64) as usize).min(width);
    let empty = width - filled;

    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}
