use super::http::AzureHttpClient;
use super::{QueueAdmin, QueueProperties};
use crate::credential::{CredentialProvider, MANAGEMENT_SCOPE};
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com/";
const API_VERSION: &str = "2021-11-01";

/// Service Bus queue administration through Azure Resource Manager
#[derive(Debug)]
pub struct ArmQueueAdmin {
    http: AzureHttpClient,
    namespace_path: String,
}

#[derive(Debug, Default, Deserialize)]
struct SbQueue {
    #[serde(default)]
    properties: SbQueueProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SbQueueProperties {
    #[serde(default)]
    message_count: Option<u64>,
}

#[derive(Debug, Default, Serialize)]
struct CreateQueueRequest {
    properties: serde_json::Map<String, serde_json::Value>,
}

impl ArmQueueAdmin {
    pub fn new(
        credential: Arc<dyn CredentialProvider>,
        subscription_id: &str,
        resource_group: &str,
        namespace: &str,
    ) -> Result<Self, ServiceError> {
        Self::with_endpoint(
            MANAGEMENT_ENDPOINT,
            credential,
            subscription_id,
            resource_group,
            namespace,
        )
    }

    pub fn with_endpoint(
        endpoint: &str,
        credential: Arc<dyn CredentialProvider>,
        subscription_id: &str,
        resource_group: &str,
        namespace: &str,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            http: AzureHttpClient::new(endpoint, MANAGEMENT_SCOPE, credential)?,
            namespace_path: format!(
                "subscriptions/{}/resourceGroups/{}/providers/Microsoft.ServiceBus/namespaces/{}",
                subscription_id, resource_group, namespace
            ),
        })
    }

    fn queue_path(&self, queue: &str) -> String {
        format!("{}/queues/{}", self.namespace_path, queue)
    }

    fn parse_queue(body: &[u8]) -> Result<QueueProperties, ServiceError> {
        let queue: SbQueue = serde_json::from_slice(body)?;
        Ok(QueueProperties {
            message_count: queue.properties.message_count.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl QueueAdmin for ArmQueueAdmin {
    async fn get_queue(&self, queue: &str) -> Result<QueueProperties, ServiceError> {
        let response = self
            .http
            .get(&self.queue_path(queue), &[("api-version", API_VERSION)])
            .await?;
        let body = response.bytes().await?;
        Self::parse_queue(&body)
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), ServiceError> {
        let response = self
            .http
            .delete(&self.queue_path(queue), &[("api-version", API_VERSION)])
            .await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            debug!("Queue '{}' did not exist", queue);
        }
        Ok(())
    }

    async fn create_queue(&self, queue: &str) -> Result<(), ServiceError> {
        self.http
            .put(
                &self.queue_path(queue),
                &[("api-version", API_VERSION)],
                &CreateQueueRequest::default(),
            )
            .await?;
        Ok(())
    }
}
