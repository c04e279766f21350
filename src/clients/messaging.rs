use super::http::AzureHttpClient;
use super::{body_text, BodyEncoding, MessageBatch, MessageSender, Messaging};
use crate::credential::{CredentialProvider, MESSAGING_SCOPE};
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

const BATCH_CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";

/// Service Bus data-plane client using the REST batch-send endpoint
pub struct ServiceBusMessaging {
    http: Arc<AzureHttpClient>,
    max_batch_bytes: usize,
}

impl ServiceBusMessaging {
    pub fn new(
        credential: Arc<dyn CredentialProvider>,
        namespace: &str,
        max_batch_bytes: usize,
    ) -> Result<Self, ServiceError> {
        let endpoint = format!("https://{}.servicebus.windows.net/", namespace);
        Ok(Self {
            http: Arc::new(AzureHttpClient::new(&endpoint, MESSAGING_SCOPE, credential)?),
            max_batch_bytes,
        })
    }
}

#[async_trait]
impl Messaging for ServiceBusMessaging {
    async fn sender(&self, queue: &str) -> Result<Arc<dyn MessageSender>, ServiceError> {
        Ok(Arc::new(ServiceBusSender {
            http: self.http.clone(),
            path: format!("{}/messages", queue),
            max_batch_bytes: self.max_batch_bytes,
        }))
    }
}

/// Sender bound to a single queue
pub struct ServiceBusSender {
    http: Arc<AzureHttpClient>,
    path: String,
    max_batch_bytes: usize,
}

#[derive(Serialize)]
struct BatchEntry<'a> {
    #[serde(rename = "Body")]
    body: &'a str,
}

/// Encode a batch in the JSON array form the batch-send endpoint expects
///
/// The endpoint only carries text bodies. A body that is not UTF-8 is an
/// error; it is never rewritten.
fn encode_batch(batch: &MessageBatch) -> Result<Vec<u8>, ServiceError> {
    let entries = batch
        .messages()
        .iter()
        .map(|body| body_text(body).map(|body| BatchEntry { body }))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_vec(&entries)?)
}

#[async_trait]
impl MessageSender for ServiceBusSender {
    async fn new_batch(&self) -> Result<MessageBatch, ServiceError> {
        Ok(MessageBatch::with_encoding(
            self.max_batch_bytes,
            BodyEncoding::JsonText,
        ))
    }

    async fn send_batch(&self, batch: MessageBatch) -> Result<(), ServiceError> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = encode_batch(&batch)?;
        self.http
            .post_body(&self.path, BATCH_CONTENT_TYPE, body)
            .await?;
        Ok(())
    }
}
