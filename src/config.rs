//! # Run Configuration
//!
//! The immutable description of one benchmark run. It is built once from the
//! command line (or by a library caller starting from [`RunConfig::default`])
//! and then only read.

use crate::cli::Args;
use crate::utils::{validate_batch_size, validate_message_count, validate_queue_name};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Service Bus namespace holding both queues
    pub namespace: String,
    pub resource_group: String,
    /// Function app consuming the input queue
    pub function_app: String,
    pub subscription_id: String,
    pub in_queue: String,
    pub out_queue: String,

    /// Messages per published batch
    pub batch_size: usize,

    /// Messages the run is expected to push through the pipeline
    ///
    /// Only whole batches are sent: a remainder after dividing by
    /// `batch_size` is never enqueued, yet the drain condition still waits
    /// for the full count on the output queue.
    pub message_count: usize,

    pub message_file: PathBuf,

    /// Bearer token overriding ambient credential resolution
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Byte capacity of a message batch
    pub max_batch_bytes: usize,

    pub stop_cooldown: Duration,
    pub start_warmup: Duration,
    pub poll_interval: Duration,

    /// Upper bound on the drain measurement; `None` polls forever
    pub poll_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            resource_group: crate::defaults::RESOURCE_GROUP.to_string(),
            function_app: crate::defaults::FUNCTION_APP.to_string(),
            subscription_id: String::new(),
            in_queue: crate::defaults::IN_QUEUE.to_string(),
            out_queue: crate::defaults::OUT_QUEUE.to_string(),
            batch_size: crate::defaults::BATCH_SIZE,
            message_count: crate::defaults::MESSAGE_COUNT,
            message_file: PathBuf::from(crate::defaults::MESSAGE_FILE),
            access_token: None,
            max_batch_bytes: crate::defaults::MAX_BATCH_BYTES,
            stop_cooldown: crate::defaults::LIFECYCLE_WAIT,
            start_warmup: crate::defaults::LIFECYCLE_WAIT,
            poll_interval: crate::defaults::POLL_INTERVAL,
            poll_timeout: None,
        }
    }
}

impl RunConfig {
    /// Create a validated run configuration from CLI arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            namespace: args.namespace.clone(),
            resource_group: args.resource_group.clone(),
            function_app: args.function_app.clone(),
            subscription_id: args.subscription_id.clone(),
            in_queue: args.in_queue.clone(),
            out_queue: args.out_queue.clone(),
            batch_size: args.batch_size,
            message_count: args.message_count,
            message_file: args.message_file.clone(),
            access_token: args.access_token.clone(),
            max_batch_bytes: args.max_batch_bytes,
            stop_cooldown: args.stop_cooldown,
            start_warmup: args.start_warmup,
            poll_interval: args.poll_interval,
            poll_timeout: args.poll_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before any external call is made
    ///
    /// A message count that is not a multiple of the batch size is accepted
    /// with a warning; the remainder is dropped from the run.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(anyhow!("Namespace must be set"));
        }
        if self.subscription_id.trim().is_empty() {
            return Err(anyhow!("Subscription id must be set"));
        }
        if self.resource_group.trim().is_empty() {
            return Err(anyhow!("Resource group must be set"));
        }
        if self.function_app.trim().is_empty() {
            return Err(anyhow!("Function app must be set"));
        }
        validate_queue_name(&self.in_queue)?;
        validate_queue_name(&self.out_queue)?;
        if self.in_queue == self.out_queue {
            return Err(anyhow!(
                "Input and output queues must differ (both are '{}')",
                self.in_queue
            ));
        }
        validate_batch_size(self.batch_size)?;
        validate_message_count(self.message_count)?;
        if self.max_batch_bytes == 0 {
            return Err(anyhow!("Batch capacity must be greater than 0 bytes"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("Poll interval must be greater than zero"));
        }

        if self.dropped_messages() > 0 {
            warn!(
                "Message count {} is not a multiple of batch size {}: only {} messages will be sent, {} dropped",
                self.message_count,
                self.batch_size,
                self.messages_to_send(),
                self.dropped_messages()
            );
        }

        Ok(())
    }

    /// Number of batches published by the send phase (integer division)
    pub fn batch_count(&self) -> usize {
        self.message_count / self.batch_size
    }

    /// Messages actually enqueued: whole batches only
    pub fn messages_to_send(&self) -> usize {
        self.batch_count() * self.batch_size
    }

    /// Messages lost to truncation when the count is not a batch multiple
    pub fn dropped_messages(&self) -> usize {
        self.message_count % self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn valid() -> RunConfig {
        RunConfig {
            namespace: "ns".to_string(),
            subscription_id: "sub".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_values() {
        let config = RunConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.message_count, 5000);
        assert_eq!(config.in_queue, "in");
        assert_eq!(config.out_queue, "out");
        assert_eq!(config.stop_cooldown, Duration::from_secs(20));
        assert_eq!(config.start_warmup, Duration::from_secs(20));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.poll_timeout, None);
    }

    #[test]
    fn test_from_args() {
        let args = Args::try_parse_from([
            "queue-throughput-bench",
            "--namespace",
            "bench-ns",
            "--subscription-id",
            "0000",
            "-n",
            "10",
        ])
        .unwrap();
        let config = RunConfig::from_args(&args).unwrap();
        assert_eq!(config.namespace, "bench-ns");
        assert_eq!(config.subscription_id, "0000");
        assert_eq!(config.message_count, 10);
        assert_eq!(config.batch_count(), 2);
    }

    #[test]
    fn test_batch_arithmetic_truncates() {
        let config = RunConfig {
            message_count: 12,
            batch_size: 5,
            ..valid()
        };
        assert_eq!(config.batch_count(), 2);
        assert_eq!(config.messages_to_send(), 10);
        assert_eq!(config.dropped_messages(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_arithmetic_exact() {
        let config = valid();
        assert_eq!(config.batch_count(), 1000);
        assert_eq!(config.messages_to_send(), 5000);
        assert_eq!(config.dropped_messages(), 0);
    }

    #[test]
    fn test_validation_failures() {
        assert!(valid().validate().is_ok());
        assert!(RunConfig::default().validate().is_err());
        assert!(RunConfig {
            batch_size: 0,
            ..valid()
        }
        .validate()
        .is_err());
        assert!(RunConfig {
            message_count: 0,
            ..valid()
        }
        .validate()
        .is_err());
        assert!(RunConfig {
            out_queue: "in".to_string(),
            ..valid()
        }
        .validate()
        .is_err());
        assert!(RunConfig {
            poll_interval: Duration::ZERO,
            ..valid()
        }
        .validate()
        .is_err());
        assert!(RunConfig {
            max_batch_bytes: 0,
            ..valid()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_access_token_not_serialized() {
        let config = RunConfig {
            access_token: Some("secret".to_string()),
            ..valid()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
