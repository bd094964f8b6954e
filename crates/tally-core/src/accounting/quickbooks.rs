//! QuickBooks Online client
//!
//! # Configuration
//!
//! Environment variables:
//! - `QBO_CLIENT_ID`: OAuth client id (required)
//! - `QBO_CLIENT_SECRET`: OAuth client secret (required)
//! - `QBO_ENVIRONMENT`: `production` or `sandbox` (default: sandbox)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::ai::http_client;
use crate::error::{Error, Result};
use crate::models::TokenGrant;

use super::{AccountingApi, QueryRequest};

const TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
const PRODUCTION_API: &str = "https://quickbooks.api.intuit.com";
const SANDBOX_API: &str = "https://sandbox-quickbooks.api.intuit.com";
const MINOR_VERSION: &str = "65";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// QuickBooks API environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QboEnvironment {
    Production,
    #[default]
    Sandbox,
}

impl QboEnvironment {
    pub fn api_base(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_API,
            Self::Sandbox => SANDBOX_API,
        }
    }
}

impl std::str::FromStr for QboEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "sandbox" | "development" | "dev" => Ok(Self::Sandbox),
            other => Err(format!("Unknown QuickBooks environment: {}", other)),
        }
    }
}

/// QuickBooks Online API client
#[derive(Clone)]
pub struct QuickBooksClient {
    http_client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base: String,
}

impl QuickBooksClient {
    pub fn new(client_id: &str, client_secret: &str, environment: QboEnvironment) -> Self {
        Self {
            http_client: http_client(DEFAULT_TIMEOUT),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_url: TOKEN_URL.to_string(),
            api_base: environment.api_base().to_string(),
        }
    }

    /// Create from environment variables
    ///
    /// Returns None when the client credentials are not set.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("QBO_CLIENT_ID").ok().filter(|s| !s.is_empty())?;
        let client_secret = std::env::var("QBO_CLIENT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())?;
        let environment = match std::env::var("QBO_ENVIRONMENT") {
            Ok(env) => env.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{}, using sandbox", e);
                QboEnvironment::Sandbox
            }),
            Err(_) => QboEnvironment::default(),
        };
        Some(Self::new(&client_id, &client_secret, environment))
    }

    /// Point token refresh and queries at another server (mock servers in tests)
    pub fn with_base_urls(mut self, token_url: &str, api_base: &str) -> Self {
        self.token_url = token_url.to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = http_client(timeout);
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl AccountingApi for QuickBooksClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RefreshFailed(format!("{}: {}", status, body)));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| Error::RefreshFailed(format!("Invalid token response: {}", e)))
    }

    async fn query(
        &self,
        realm_id: &str,
        access_token: &str,
        request: &QueryRequest,
    ) -> Result<Vec<Value>> {
        let query = request.to_query();
        debug!(realm = %realm_id, "QuickBooks query: {}", query);

        let response = self
            .http_client
            .get(format!("{}/v3/company/{}/query", self.api_base, realm_id))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .query(&[("query", query.as_str()), ("minorversion", MINOR_VERSION)])
            .send()
            .await
            .map_err(|e| Error::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FetchFailed(format!(
                "{} query returned {}: {}",
                request.entity.as_str(),
                status,
                body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::FetchFailed(format!("Invalid query response: {}", e)))?;

        records_from_response(body, request.entity.as_str())
    }
}

/// Pull the entity array out of a `QueryResponse` envelope.
///
/// QuickBooks omits the array entirely when a page is empty.
fn records_from_response(body: Value, entity: &str) -> Result<Vec<Value>> {
    let Some(envelope) = body.get("QueryResponse") else {
        return Err(Error::FetchFailed(
            "Response has no QueryResponse envelope".into(),
        ));
    };
    match envelope.get(entity) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(Error::FetchFailed(format!(
            "QueryResponse.{} is not an array",
            entity
        ))),
        None => Ok(Vec::new()),
    }
}
