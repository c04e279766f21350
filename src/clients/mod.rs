use crate::config::RunConfig;
use crate::credential::{CredentialProvider, DefaultCredential};
use crate::error::ServiceError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub mod http;
pub mod messaging;
pub mod queue_admin;
pub mod web_apps;

pub use messaging::ServiceBusMessaging;
pub use queue_admin::ArmQueueAdmin;
pub use web_apps::ArmWebApps;

/// Fixed encoding overhead counted for every message added to a batch
pub const MESSAGE_OVERHEAD_BYTES: usize = 16;

/// Queue properties returned by the management API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueProperties {
    /// Messages currently enqueued and undelivered
    pub message_count: u64,
}

/// Queue administration: inspect, delete and create queues
#[async_trait]
pub trait QueueAdmin: Send + Sync {
    /// Fetch the current properties of a queue
    async fn get_queue(&self, queue: &str) -> Result<QueueProperties, ServiceError>;

    /// Delete a queue; deleting a queue that does not exist succeeds
    async fn delete_queue(&self, queue: &str) -> Result<(), ServiceError>;

    /// Create (or update) a queue with default properties
    async fn create_queue(&self, queue: &str) -> Result<(), ServiceError>;
}

/// Lifecycle control for the application that consumes the input queue
#[async_trait]
pub trait ComputeControl: Send + Sync {
    async fn stop(&self, app: &str) -> Result<(), ServiceError>;

    async fn start(&self, app: &str) -> Result<(), ServiceError>;
}

/// Messaging endpoint able to open senders for a queue
#[async_trait]
pub trait Messaging: Send + Sync {
    async fn sender(&self, queue: &str) -> Result<Arc<dyn MessageSender>, ServiceError>;
}

/// A sender bound to one queue
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Open an empty batch sized by the messaging service's limits
    async fn new_batch(&self) -> Result<MessageBatch, ServiceError>;

    /// Publish every message in the batch with a single call
    async fn send_batch(&self, batch: MessageBatch) -> Result<(), ServiceError>;
}

/// How message bodies are carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    /// Bodies travel as opaque bytes
    #[default]
    Raw,
    /// Bodies travel as JSON strings: they must be UTF-8 and are sized
    /// after escaping
    JsonText,
}

impl BodyEncoding {
    /// Bytes `body` occupies once encoded, excluding per-message overhead
    pub fn encoded_len(self, body: &[u8]) -> Result<usize, ServiceError> {
        match self {
            BodyEncoding::Raw => Ok(body.len()),
            BodyEncoding::JsonText => Ok(json_string_len(body_text(body)?)),
        }
    }
}

/// View a body as text for encodings that cannot carry arbitrary bytes
pub(crate) fn body_text(body: &[u8]) -> Result<&str, ServiceError> {
    std::str::from_utf8(body).map_err(|e| {
        ServiceError::InvalidBody(format!(
            "body is not valid UTF-8 and cannot be sent as text ({})",
            e
        ))
    })
}

/// Length of `text` serialized as a JSON string, quotes included
fn json_string_len(text: &str) -> usize {
    2 + text
        .chars()
        .map(|c| match c {
            '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
            c if (c as u32) < 0x20 => 6,
            c => c.len_utf8(),
        })
        .sum::<usize>()
}

/// A bounded group of message bodies published in one call
///
/// The capacity belongs to whoever opened the batch; callers only learn about
/// it when [`MessageBatch::try_add`] refuses a message.
#[derive(Debug, Clone)]
pub struct MessageBatch {
    messages: Vec<Bytes>,
    encoding: BodyEncoding,
    size_in_bytes: usize,
    max_size_in_bytes: usize,
}

impl MessageBatch {
    pub fn new(max_size_in_bytes: usize) -> Self {
        Self::with_encoding(max_size_in_bytes, BodyEncoding::Raw)
    }

    pub fn with_encoding(max_size_in_bytes: usize, encoding: BodyEncoding) -> Self {
        Self {
            messages: Vec::new(),
            encoding,
            size_in_bytes: 0,
            max_size_in_bytes,
        }
    }

    /// Append a message body, failing if it would overflow the batch or
    /// cannot be carried by the batch's encoding
    pub fn try_add(&mut self, body: Bytes) -> Result<(), ServiceError> {
        let encoded = self.encoding.encoded_len(&body)? + MESSAGE_OVERHEAD_BYTES;
        if self.size_in_bytes + encoded > self.max_size_in_bytes {
            return Err(ServiceError::BatchFull {
                capacity: self.max_size_in_bytes,
            });
        }
        self.size_in_bytes += encoded;
        self.messages.push(body);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn max_size_in_bytes(&self) -> usize {
        self.max_size_in_bytes
    }

    pub fn encoding(&self) -> BodyEncoding {
        self.encoding
    }

    pub fn messages(&self) -> &[Bytes] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Bytes> {
        self.messages
    }
}

/// The collaborator handles one benchmark run works with
#[derive(Clone)]
pub struct ServiceClients {
    pub queues: Arc<dyn QueueAdmin>,
    pub messaging: Arc<dyn Messaging>,
    pub compute: Arc<dyn ComputeControl>,
}

impl ServiceClients {
    /// Construct the Azure-backed clients for a run
    ///
    /// All three share one credential chain, so a token resolved for the
    /// management scope is reused by both management clients.
    pub fn from_config(config: &RunConfig) -> Result<Self, ServiceError> {
        let credential: Arc<dyn CredentialProvider> =
            Arc::new(DefaultCredential::new(config.access_token.clone()));

        let queues = ArmQueueAdmin::new(
            credential.clone(),
            &config.subscription_id,
            &config.resource_group,
            &config.namespace,
        )?;
        let compute = ArmWebApps::new(
            credential.clone(),
            &config.subscription_id,
            &config.resource_group,
        )?;
        let messaging =
            ServiceBusMessaging::new(credential, &config.namespace, config.max_batch_bytes)?;

        Ok(Self {
            queues: Arc::new(queues),
            messaging: Arc::new(messaging),
            compute: Arc::new(compute),
        })
    }
}
