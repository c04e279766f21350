use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Queue Throughput Bench - measure how fast a queue-triggered function drains a queue
///
/// Stops the consumer, recreates the input and output queues, floods the
/// input queue, restarts the consumer and reports how long it takes until
/// every message has moved to the output queue.
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Service Bus namespace holding both queues
    #[clap(long, env = "SB_NAMESPACE", help_heading = "Resources")]
    pub namespace: String,

    /// Subscription containing the namespace and the function app
    #[clap(long, env = "AZURE_SUBSCRIPTION_ID", help_heading = "Resources")]
    pub subscription_id: String,

    /// Resource group containing the namespace and the function app
    #[clap(long, env = "AZURE_RESOURCE_GROUP", default_value = crate::defaults::RESOURCE_GROUP, help_heading = "Resources")]
    pub resource_group: String,

    /// Function app that consumes the input queue
    #[clap(long, env = "FUNCTION_APP", default_value = crate::defaults::FUNCTION_APP, help_heading = "Resources")]
    pub function_app: String,

    /// Queue the benchmark floods
    #[clap(long, default_value = crate::defaults::IN_QUEUE, help_heading = "Resources")]
    pub in_queue: String,

    /// Queue the consumer writes results to
    #[clap(long, default_value = crate::defaults::OUT_QUEUE, help_heading = "Resources")]
    pub out_queue: String,

    /// Bearer token to use instead of the Azure CLI login
    #[clap(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true, help_heading = "Resources")]
    pub access_token: Option<String>,

    /// Messages per published batch
    #[clap(short = 'b', long, default_value_t = crate::defaults::BATCH_SIZE, help_heading = "Workload")]
    pub batch_size: usize,

    /// Total messages to enqueue (should be a multiple of the batch size)
    #[clap(short = 'n', long, default_value_t = crate::defaults::MESSAGE_COUNT, help_heading = "Workload")]
    pub message_count: usize,

    /// File whose raw contents become the body of every message
    #[clap(short = 'f', long, default_value = crate::defaults::MESSAGE_FILE, help_heading = "Workload")]
    pub message_file: PathBuf,

    /// Byte capacity of one message batch
    #[clap(long, default_value_t = crate::defaults::MAX_BATCH_BYTES, help_heading = "Workload")]
    pub max_batch_bytes: usize,

    /// Wait after stopping the consumer before the queues are reset
    #[clap(long, value_parser = parse_duration, default_value = "20s", help_heading = "Timing")]
    pub stop_cooldown: Duration,

    /// Wait after starting the consumer before polling begins
    #[clap(long, value_parser = parse_duration, default_value = "20s", help_heading = "Timing")]
    pub start_warmup: Duration,

    /// Interval between queue-depth observations
    #[clap(long, value_parser = parse_duration, default_value = "1s", help_heading = "Timing")]
    pub poll_interval: Duration,

    /// Give up if the queues have not drained after this long (default: wait forever)
    #[clap(long, value_parser = parse_duration, help_heading = "Timing")]
    pub poll_timeout: Option<Duration>,

    /// Write the run report as JSON to this file
    #[clap(short = 'o', long, help_heading = "Output")]
    pub output_file: Option<PathBuf>,

    /// Also write a detailed log to this file
    #[clap(long, help_heading = "Output")]
    pub log_file: Option<PathBuf>,

    /// Increase console verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = clap::ArgAction::Count, help_heading = "Output")]
    pub verbose: u8,

    /// Only print warnings, errors and the final result
    #[clap(short = 'q', long, default_value_t = false, help_heading = "Output")]
    pub quiet: bool,
}

/// Parse duration from string (e.g., "10s", "5m", "1h", "500ms")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let duration = match unit {
        // Scale after conversion so fractional milliseconds stay exact.
        "ms" => Duration::try_from_secs_f64(num).map(|d| d / 1000),
        "s" => Duration::try_from_secs_f64(num),
        "m" => Duration::try_from_secs_f64(num * 60.0),
        "h" => Duration::try_from_secs_f64(num * 3600.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    duration.map_err(|_| format!("Duration is too large: {}", s))
}
