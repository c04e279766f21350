use crate::credential::CredentialProvider;
use crate::error::ServiceError;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

/// Authenticated HTTP client rooted at one service endpoint
///
/// Every request carries a bearer token for `scope`; any non-2xx answer is
/// turned into [`ServiceError::Status`].
pub struct AzureHttpClient {
    pub base_url: Url,
    scope: String,
    credential: Arc<dyn CredentialProvider>,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureHttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("scope", &self.scope)
            .finish()
    }
}

impl AzureHttpClient {
    pub fn new(
        base_url: &str,
        scope: &str,
        credential: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ServiceError::Url(format!("{}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("queue-throughput-bench/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            scope: scope.to_string(),
            credential,
            client,
        })
    }

    pub fn get_url(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path)
            .map_err(|e| ServiceError::Url(format!("{}: {}", path, e)))
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response, ServiceError> {
        let request = self.request(Method::GET, path)?.query(query);
        self.send(request).await
    }

    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        payload: &T,
    ) -> Result<Response, ServiceError> {
        let request = self.request(Method::PUT, path)?.query(query).json(payload);
        self.send(request).await
    }

    pub async fn delete(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, ServiceError> {
        let request = self.request(Method::DELETE, path)?.query(query);
        self.send(request).await
    }

    /// POST with no body, as used by management actions such as `start`
    pub async fn post_action(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, ServiceError> {
        let request = self
            .request(Method::POST, path)?
            .query(query)
            .header(reqwest::header::CONTENT_LENGTH, 0);
        self.send(request).await
    }

    /// POST a pre-encoded body with an explicit content type
    pub async fn post_body(
        &self,
        path: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Response, ServiceError> {
        let request = self
            .request(Method::POST, path)?
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        self.send(request).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ServiceError> {
        let url = self.get_url(path)?;
        trace!("{} {}", method, url);
        Ok(self.client.request(method, url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let token = self.credential.token(&self.scope).await?;
        let response = request.bearer_auth(&token.token).send().await?;
        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
