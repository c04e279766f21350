//! # Credential Resolution
//!
//! Supplies bearer tokens for the management API and the messaging endpoint.
//! Resolution is ambient: a token passed on the command line (or through
//! `AZURE_ACCESS_TOKEN`) wins, otherwise the Azure CLI login of the current
//! user is asked for one. Tokens are cached per scope until shortly before
//! they expire.

use crate::error::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Audience for Azure Resource Manager calls
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/";

/// Audience for Service Bus data-plane calls
pub const MESSAGING_SCOPE: &str = "https://servicebus.azure.net/";

/// Tokens closer than this to expiry are refreshed
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// A bearer token and the instant it stops being valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable at `now`, leaving a refresh margin
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::minutes(REFRESH_MARGIN_MINUTES) > now
    }
}

/// Source of bearer tokens for a given scope
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self, scope: &str) -> Result<AccessToken, ServiceError>;

    /// Name used in diagnostics
    fn name(&self) -> &'static str;
}

/// A pre-issued token used for every scope
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenCredential {
    async fn token(&self, _scope: &str) -> Result<AccessToken, ServiceError> {
        Ok(AccessToken {
            token: self.token.clone(),
            // Lifetime is unknown; the service rejects it once it lapses.
            expires_at: DateTime::<Utc>::MAX_UTC,
        })
    }

    fn name(&self) -> &'static str {
        "static token"
    }
}

/// Token obtained from `az account get-access-token`
pub struct AzureCliCredential {
    program: String,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            program: "az".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    // Newer CLI releases also emit a POSIX timestamp.
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

impl AzureCliCredential {
    /// Use a different executable, e.g. a wrapper script
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn parse_response(stdout: &[u8]) -> Result<AccessToken, ServiceError> {
        let response: CliTokenResponse = serde_json::from_slice(stdout)?;

        let expires_at = if let Some(epoch) = response.expires_on_epoch {
            Utc.timestamp_opt(epoch, 0).single()
        } else {
            response.expires_on.as_deref().and_then(|text| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .and_then(|naive| chrono::Local.from_local_datetime(&naive).single())
                    .map(|local| local.with_timezone(&Utc))
            })
        }
        .ok_or_else(|| ServiceError::Credential("Azure CLI token has no expiry".to_string()))?;

        Ok(AccessToken {
            token: response.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl CredentialProvider for AzureCliCredential {
    async fn token(&self, scope: &str) -> Result<AccessToken, ServiceError> {
        debug!("Requesting token for {} from Azure CLI", scope);
        let output = Command::new(&self.program)
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(scope)
            .output()
            .await
            .map_err(|e| {
                ServiceError::Credential(format!("cannot run '{}': {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(ServiceError::Credential(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Self::parse_response(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "Azure CLI"
    }
}

/// Cached token for one scope; held across a refresh so concurrent callers
/// wait for the single fetch in progress.
type TokenSlot = Arc<AsyncMutex<Option<AccessToken>>>;

/// Ambient credential chain with a per-scope token cache
pub struct DefaultCredential {
    sources: Vec<Box<dyn CredentialProvider>>,
    cache: Mutex<HashMap<String, TokenSlot>>,
}

impl DefaultCredential {
    /// Build the chain: an explicit token first, then the Azure CLI
    pub fn new(access_token: Option<String>) -> Self {
        let mut sources: Vec<Box<dyn CredentialProvider>> = Vec::new();
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            sources.push(Box::new(StaticTokenCredential::new(token)));
        }
        sources.push(Box::new(AzureCliCredential::default()));
        Self::from_sources(sources)
    }

    pub fn from_sources(sources: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self {
            sources,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, scope: &str) -> TokenSlot {
        self.cache
            .lock()
            .entry(scope.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl CredentialProvider for DefaultCredential {
    async fn token(&self, scope: &str) -> Result<AccessToken, ServiceError> {
        let slot = self.slot(scope);
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.clone());
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            match source.token(scope).await {
                Ok(token) => {
                    debug!("Resolved token for {} via {}", scope, source.name());
                    *cached = Some(token.clone());
                    return Ok(token);
                }
                Err(e) => failures.push(format!("{}: {}", source.name(), e)),
            }
        }

        Err(ServiceError::Credential(format!(
            "no credential source produced a token for {} ({})",
            scope,
            failures.join("; ")
        )))
    }

    fn name(&self) -> &'static str {
        "default chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCredential {
        calls: Arc<AtomicUsize>,
        lifetime_minutes: i64,
    }

    #[async_trait]
    impl CredentialProvider for CountingCredential {
        async fn token(&self, scope: &str) -> Result<AccessToken, ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // Stand-in for the latency of spawning the CLI.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(AccessToken {
                token: format!("{}-{}", scope, n),
                expires_at: Utc::now() + ChronoDuration::minutes(self.lifetime_minutes),
            })
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct FailingCredential;

    #[async_trait]
    impl CredentialProvider for FailingCredential {
        async fn token(&self, _scope: &str) -> Result<AccessToken, ServiceError> {
            Err(ServiceError::Credential("not logged in".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_chain_caches_per_scope() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = DefaultCredential::from_sources(vec![Box::new(CountingCredential {
            calls: calls.clone(),
            lifetime_minutes: 60,
        })]);

        let first = credential.token(MANAGEMENT_SCOPE).await.unwrap();
        let second = credential.token(MANAGEMENT_SCOPE).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        credential.token(MESSAGING_SCOPE).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_fetch_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = Arc::new(DefaultCredential::from_sources(vec![Box::new(
            CountingCredential {
                calls: calls.clone(),
                lifetime_minutes: 60,
            },
        )]));

        let handles: Vec<_> = (0..1000)
            .map(|_| {
                let credential = credential.clone();
                tokio::spawn(async move { credential.token(MESSAGING_SCOPE).await })
            })
            .collect();
        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.token, format!("{}-0", MESSAGING_SCOPE));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scopes_refresh_independently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = Arc::new(DefaultCredential::from_sources(vec![Box::new(
            CountingCredential {
                calls: calls.clone(),
                lifetime_minutes: 60,
            },
        )]));

        let management = {
            let credential = credential.clone();
            tokio::spawn(async move { credential.token(MANAGEMENT_SCOPE).await })
        };
        let messaging = credential.token(MESSAGING_SCOPE).await.unwrap();
        let management = management.await.unwrap().unwrap();

        assert_ne!(messaging.token, management.token);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_chain_refreshes_near_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = DefaultCredential::from_sources(vec![Box::new(CountingCredential {
            calls: calls.clone(),
            lifetime_minutes: 2,
        })]);

        credential.token(MANAGEMENT_SCOPE).await.unwrap();
        credential.token(MANAGEMENT_SCOPE).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_chain_falls_through_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = DefaultCredential::from_sources(vec![
            Box::new(FailingCredential),
            Box::new(CountingCredential {
                calls: calls.clone(),
                lifetime_minutes: 60,
            }),
        ]);

        let token = credential.token(MESSAGING_SCOPE).await.unwrap();
        assert!(token.token.starts_with(MESSAGING_SCOPE));
    }

    #[tokio::test]
    async fn test_default_chain_reports_every_failure() {
        let credential = DefaultCredential::from_sources(vec![Box::new(FailingCredential)]);
        let err = credential.token(MANAGEMENT_SCOPE).await.unwrap_err();
        assert!(err.to_string().contains("failing: credential unavailable"));
    }

    #[tokio::test]
    async fn test_static_token_never_expires() {
        let credential = StaticTokenCredential::new("abc");
        let token = credential.token(MANAGEMENT_SCOPE).await.unwrap();
        assert_eq!(token.token, "abc");
        assert!(token.is_fresh(Utc::now()));
    }

    #[test]
    fn test_parse_cli_response_with_epoch() {
        let json = br#"{"accessToken":"tok","expiresOn":"2030-01-01 00:00:00.000000","expires_on":1893456000,"tokenType":"Bearer"}"#;
        let token = AzureCliCredential::parse_response(json).unwrap();
        assert_eq!(token.token, "tok");
        assert_eq!(token.expires_at.timestamp(), 1893456000);
    }

    #[test]
    fn test_parse_cli_response_with_local_time_only() {
        let json = br#"{"accessToken":"tok","expiresOn":"2030-01-01 00:00:00.000000"}"#;
        let token = AzureCliCredential::parse_response(json).unwrap();
        assert!(token.is_fresh(Utc::now()));
    }

    #[test]
    fn test_parse_cli_response_without_expiry_fails() {
        let json = br#"{"accessToken":"tok"}"#;
        assert!(AzureCliCredential::parse_response(json).is_err());
    }
}
