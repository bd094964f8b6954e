//! Token refresh manager
//!
//! Hands out a usable access token for a tenant, refreshing through the
//! accounting platform when the stored one is inside the refresh margin.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::accounting::AccountingApi;
use crate::db::Database;
use crate::error::{Error, Result};

/// Access token ready for API calls
#[derive(Clone)]
pub struct ValidCredential {
    pub realm_id: String,
    pub access_token: String,
    /// Whether this call performed a refresh
    pub refreshed: bool,
}

impl std::fmt::Debug for ValidCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidCredential")
            .field("realm_id", &self.realm_id)
            .field("refreshed", &self.refreshed)
            .finish_non_exhaustive()
    }
}

pub struct TokenManager {
    db: Database,
    api: Arc<dyn AccountingApi>,
    refresh_margin: chrono::Duration,
}

impl TokenManager {
    pub fn new(db: Database, api: Arc<dyn AccountingApi>, refresh_margin: Duration) -> Self {
        Self {
            db,
            api,
            refresh_margin: chrono::Duration::from_std(refresh_margin)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Return a valid access token for the tenant, refreshing if needed
    pub async fn ensure_access_token(&self, tenant_id: &str) -> Result<ValidCredential> {
        self.ensure_access_token_at(tenant_id, Utc::now()).await
    }

    /// Same as `ensure_access_token` with an explicit clock
    pub async fn ensure_access_token_at(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidCredential> {
        let connection = self
            .db
            .get_connection(tenant_id)?
            .ok_or_else(|| Error::ConnectionNotFound(tenant_id.to_string()))?;

        if connection.access_token_expires_at > now + self.refresh_margin {
            debug!(tenant = %tenant_id, "Access token still valid");
            return Ok(ValidCredential {
                realm_id: connection.realm_id,
                access_token: connection.access_token,
                refreshed: false,
            });
        }

        if connection.refresh_token_expires_at <= now {
            warn!(tenant = %tenant_id, "Refresh token expired, reconnect required");
            return Err(Error::RefreshFailed(format!(
                "Refresh token for tenant {} expired at {}",
                tenant_id, connection.refresh_token_expires_at
            )));
        }

        info!(tenant = %tenant_id, "Refreshing access token");
        let grant = self.api.refresh(&connection.refresh_token).await.map_err(|e| match e {
            Error::RefreshFailed(_) => e,
            other => Error::RefreshFailed(other.to_string()),
        })?;

        self.db.update_connection_tokens(tenant_id, &grant, now)?;

        Ok(ValidCredential {
            realm_id: connection.realm_id,
            access_token: grant.access_token,
            refreshed: true,
        })
    }
}
