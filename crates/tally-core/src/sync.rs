//! Sync orchestrator
//!
//! One sync run per tenant: lease, token, fetch, upsert, categorize, release.
//! Everything is fetched before anything is written, so a token or fetch
//! failure leaves the local store untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::accounting::AccountingApi;
use crate::categorize::Categorizer;
use crate::config::{SyncConfig, TallyConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetch::DataFetcher;
use crate::models::SyncSummary;
use crate::token::TokenManager;

static NEXT_ORCHESTRATOR: AtomicU64 = AtomicU64::new(1);

pub struct SyncOrchestrator {
    db: Database,
    tokens: TokenManager,
    fetcher: DataFetcher,
    categorizer: Option<Arc<dyn Categorizer>>,
    config: SyncConfig,
    instance: String,
    runs: AtomicU64,
}

impl SyncOrchestrator {
    pub fn new(
        db: Database,
        api: Arc<dyn AccountingApi>,
        categorizer: Option<Arc<dyn Categorizer>>,
        config: &TallyConfig,
    ) -> Self {
        Self {
            tokens: TokenManager::new(db.clone(), api.clone(), config.tokens.refresh_margin),
            fetcher: DataFetcher::new(api, &config.sync),
            db,
            categorizer,
            config: config.sync.clone(),
            instance: format!(
                "pid{}-{}",
                std::process::id(),
                NEXT_ORCHESTRATOR.fetch_add(1, Ordering::Relaxed)
            ),
            runs: AtomicU64::new(0),
        }
    }

    /// Sync one tenant.
    ///
    /// Fails with `SyncInProgress` if another run holds the tenant's lease.
    pub async fn sync_tenant(&self, tenant_id: &str) -> Result<SyncSummary> {
        let holder = format!(
            "{}-run{}",
            self.instance,
            self.runs.fetch_add(1, Ordering::Relaxed)
        );
        if !self
            .db
            .acquire_sync_lease(tenant_id, &holder, self.config.lease_ttl)?
        {
            warn!(tenant = %tenant_id, "Sync already running, skipping");
            return Err(Error::SyncInProgress(tenant_id.to_string()));
        }

        let result = self.run_locked(tenant_id).await;

        if let Err(e) = self.db.release_sync_lease(tenant_id, &holder) {
            warn!(tenant = %tenant_id, "Failed to release sync lease: {}", e);
        }
        if let Err(ref e) = result {
            error!(tenant = %tenant_id, "Sync failed: {}", e);
        }
        result
    }

    /// Sync every tenant that has a connection, one after another
    pub async fn sync_all(&self) -> Result<Vec<(String, Result<SyncSummary>)>> {
        let tenants = self.db.list_connected_tenants()?;
        info!(tenants = tenants.len(), "Syncing all connected tenants");

        let mut outcomes = Vec::with_capacity(tenants.len());
        for tenant_id in tenants {
            let outcome = self.sync_tenant(&tenant_id).await;
            outcomes.push((tenant_id, outcome));
        }
        Ok(outcomes)
    }

    async fn run_locked(&self, tenant_id: &str) -> Result<SyncSummary> {
        info!(tenant = %tenant_id, "Starting sync");

        let credential = self.tokens.ensure_access_token(tenant_id).await?;
        let accounts = self.fetcher.fetch_accounts(&credential).await?;
        let transactions = self
            .fetcher
            .fetch_transactions(&credential, self.config.window_days)
            .await?;

        self.db.upsert_accounts(tenant_id, &accounts)?;
        let stats = self.db.upsert_transactions(tenant_id, &transactions)?;
        info!(
            tenant = %tenant_id,
            accounts = accounts.len(),
            transactions = transactions.len(),
            inserted = stats.inserted,
            updated = stats.updated,
            "Stored fetched records"
        );

        let categorization = match self.categorizer {
            Some(ref categorizer) => match categorizer.categorize_pending(tenant_id).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    error!(tenant = %tenant_id, "Categorization failed after sync: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(SyncSummary {
            tenant_id: tenant_id.to_string(),
            accounts_fetched: accounts.len(),
            transactions_fetched: transactions.len(),
            categorization,
        })
    }
}
