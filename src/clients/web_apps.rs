use super::http::AzureHttpClient;
use super::ComputeControl;
use crate::credential::{CredentialProvider, MANAGEMENT_SCOPE};
use crate::error::ServiceError;
use async_trait::async_trait;
use std::sync::Arc;

const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com/";
const API_VERSION: &str = "2022-03-01";

/// Start/stop of a function app through the App Service management API
#[derive(Debug)]
pub struct ArmWebApps {
    http: AzureHttpClient,
    sites_path: String,
}

impl ArmWebApps {
    pub fn new(
        credential: Arc<dyn CredentialProvider>,
        subscription_id: &str,
        resource_group: &str,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            http: AzureHttpClient::new(MANAGEMENT_ENDPOINT, MANAGEMENT_SCOPE, credential)?,
            sites_path: format!(
                "subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites",
                subscription_id, resource_group
            ),
        })
    }

    fn action_path(&self, app: &str, action: &str) -> String {
        format!("{}/{}/{}", self.sites_path, app, action)
    }
}

#[async_trait]
impl ComputeControl for ArmWebApps {
    async fn stop(&self, app: &str) -> Result<(), ServiceError> {
        self.http
            .post_action(&self.action_path(app, "stop"), &[("api-version", API_VERSION)])
            .await?;
        Ok(())
    }

    async fn start(&self, app: &str) -> Result<(), ServiceError> {
        self.http
            .post_action(&self.action_path(app, "start"), &[("api-version", API_VERSION)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticTokenCredential;

    #[test]
    fn test_action_path() {
        let apps = ArmWebApps::new(Arc::new(StaticTokenCredential::new("t")), "sub", "rg").unwrap();
        assert_eq!(
            apps.action_path("fn-app", "stop"),
            "subscriptions/sub/resourceGroups/rg/providers/Microsoft.Web/sites/fn-app/stop"
        );
    }
}
