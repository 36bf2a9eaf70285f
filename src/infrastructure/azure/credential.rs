//! Token credentials for Azure Monitor.
//!
//! Two sources are supported: the managed identity endpoint exposed by IMDS
//! and a service principal using the client-credentials flow. Both are
//! usually wrapped in [`CachingCredential`] so that per-call token requests
//! stay cheap.

use crate::domain::errors::CredentialError;
use crate::domain::ports::{AccessToken, TokenCredential};
use crate::infrastructure::core::http_client_factory::{FORWARD_TIMEOUT, HttpClientFactory};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Default Microsoft Entra ID authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens closer than this to expiry are refreshed.
const REFRESH_MARGIN: Duration = Duration::minutes(5);

/// Lifetime assumed when the token endpoint reports none.
const FALLBACK_LIFETIME: Duration = Duration::minutes(5);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    expires_on: Option<Value>,
}

impl TokenResponse {
    /// IMDS reports expiry as numeric strings, Entra ID as numbers.
    fn into_access_token(self, now: DateTime<Utc>) -> AccessToken {
        let expires_on = self
            .expires_on
            .as_ref()
            .and_then(seconds)
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
            .or_else(|| {
                self.expires_in
                    .as_ref()
                    .and_then(seconds)
                    .map(|secs| now + Duration::seconds(secs))
            })
            .unwrap_or(now + FALLBACK_LIFETIME);

        AccessToken {
            token: self.access_token,
            expires_on,
        }
    }
}

fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resource identifier for the v1 managed identity endpoint
fn resource_from_scope(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

async fn read_token(response: reqwest::Response) -> Result<AccessToken, CredentialError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CredentialError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: TokenResponse = response.json().await.map_err(|e| CredentialError::Malformed {
        reason: e.to_string(),
    })?;
    if parsed.access_token.is_empty() {
        return Err(CredentialError::Malformed {
            reason: "empty access_token".to_string(),
        });
    }
    Ok(parsed.into_access_token(Utc::now()))
}

/// Managed identity via the IMDS token endpoint
pub struct ManagedIdentityCredential {
    client: ClientWithMiddleware,
    imds_endpoint: String,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// `client_id` selects a user-assigned identity; `None` uses the
    /// system-assigned one.
    pub fn new(imds_endpoint: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            client: HttpClientFactory::create_retrying_client(FORWARD_TIMEOUT),
            imds_endpoint: imds_endpoint.into().trim_end_matches('/').to_string(),
            client_id,
        }
    }

    fn token_url(&self, scope: &str) -> Result<Url, CredentialError> {
        let mut url = Url::parse(&format!(
            "{}/metadata/identity/oauth2/token",
            self.imds_endpoint
        ))
        .map_err(|e| CredentialError::NotConfigured {
            reason: format!("invalid IMDS endpoint: {}", e),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-version", "2018-02-01")
                .append_pair("resource", resource_from_scope(scope));
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let url = self.token_url(scope)?;
        debug!("ManagedIdentityCredential: requesting token for {}", scope);

        let response = self
            .client
            .get(url.as_str())
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| CredentialError::Request {
                reason: e.to_string(),
            })?;

        read_token(response).await
    }
}

/// Service principal using the OAuth2 client-credentials grant
pub struct ClientSecretCredential {
    client: ClientWithMiddleware,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: HttpClientFactory::create_retrying_client(FORWARD_TIMEOUT),
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn form_body(&self, scope: &str) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("scope", scope)
            .finish()
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        );
        debug!("ClientSecretCredential: requesting token for {}", scope);

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(self.form_body(scope))
            .send()
            .await
            .map_err(|e| CredentialError::Request {
                reason: e.to_string(),
            })?;

        read_token(response).await
    }
}

/// Caches tokens per scope and refreshes them shortly before expiry
pub struct CachingCredential {
    inner: Arc<dyn TokenCredential>,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl CachingCredential {
    pub fn new(inner: Arc<dyn TokenCredential>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TokenCredential for CachingCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.get(scope)
            && token.expires_on - Utc::now() > REFRESH_MARGIN
        {
            return Ok(token.clone());
        }

        let token = self.inner.get_token(scope).await?;
        info!(
            "CachingCredential: acquired token for {} (expires {})",
            scope, token.expires_on
        );
        cache.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}
