//! External data fetcher
//!
//! Pages through the accounting platform's query endpoint and decodes the
//! raw records. Nothing here touches the local store.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::accounting::records::{decode_account, decode_purchase};
use crate::accounting::{AccountingApi, Entity, QueryRequest};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{ExternalAccount, ExternalTransaction};
use crate::token::ValidCredential;

pub struct DataFetcher {
    api: Arc<dyn AccountingApi>,
    page_size: u32,
    max_pages: u32,
}

impl DataFetcher {
    pub fn new(api: Arc<dyn AccountingApi>, config: &SyncConfig) -> Self {
        Self {
            api,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        }
    }

    /// The full chart of accounts
    pub async fn fetch_accounts(
        &self,
        credential: &ValidCredential,
    ) -> Result<Vec<ExternalAccount>> {
        let raw = self.fetch_all(credential, Entity::Account, None).await?;
        Ok(decode_all(raw, decode_account))
    }

    /// Purchases dated after `today - window_days`
    pub async fn fetch_transactions(
        &self,
        credential: &ValidCredential,
        window_days: u32,
    ) -> Result<Vec<ExternalTransaction>> {
        let since = window_start(Utc::now().date_naive(), window_days);
        let filter = format!("TxnDate > '{}'", since.format("%Y-%m-%d"));
        let raw = self
            .fetch_all(credential, Entity::Purchase, Some(filter))
            .await?;
        Ok(decode_all(raw, decode_purchase))
    }

    async fn fetch_all(
        &self,
        credential: &ValidCredential,
        entity: Entity,
        filter: Option<String>,
    ) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut start_position = 1;

        for page in 0..self.max_pages {
            let request = QueryRequest {
                entity,
                filter: filter.clone(),
                start_position,
                max_results: self.page_size,
            };
            let batch = self
                .api
                .query(&credential.realm_id, &credential.access_token, &request)
                .await
                .map_err(|e| match e {
                    Error::FetchFailed(_) => e,
                    other => Error::FetchFailed(other.to_string()),
                })?;

            let count = batch.len();
            records.extend(batch);
            debug!(entity = entity.as_str(), page, count, "Fetched page");

            if count < self.page_size as usize {
                return Ok(records);
            }
            start_position += self.page_size;
        }

        warn!(
            entity = entity.as_str(),
            max_pages = self.max_pages,
            "Stopped paging at max_pages; results may be incomplete"
        );
        Ok(records)
    }
}

fn window_start(today: NaiveDate, window_days: u32) -> NaiveDate {
    today - chrono::Duration::days(i64::from(window_days))
}

fn decode_all<T>(raw: Vec<Value>, decode: fn(Value) -> std::result::Result<T, String>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|record| match decode(record) {
            Ok(item) => Some(item),
            Err(reason) => {
                warn!("Skipping record: {}", reason);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenGrant;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves `total` purchases and remembers each request
    struct PagedApi {
        total: usize,
        requests: Mutex<Vec<QueryRequest>>,
    }

    #[async_trait]
    impl AccountingApi for PagedApi {
        async fn refresh(&self, _: &str) -> Result<TokenGrant> {
            Err(Error::RefreshFailed("unused".into()))
        }

        async fn query(&self, _: &str, _: &str, request: &QueryRequest) -> Result<Vec<Value>> {
            self.requests.lock().unwrap().push(request.clone());
            let start = request.start_position as usize - 1;
            let end = (start + request.max_results as usize).min(self.total);
            Ok((start..end)
                .map(|i| json!({"Id": (i + 1).to_string(), "TotalAmt": 1.0}))
                .collect())
        }
    }

    fn credential() -> ValidCredential {
        ValidCredential {
            realm_id: "realm".into(),
            access_token: "tok".into(),
            refreshed: false,
        }
    }

    fn fetcher(api: Arc<PagedApi>, page_size: u32, max_pages: u32) -> DataFetcher {
        let config = SyncConfig {
            page_size,
            max_pages,
            ..SyncConfig::default()
        };
        DataFetcher::new(api, &config)
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let api = Arc::new(PagedApi {
            total: 5,
            requests: Mutex::new(Vec::new()),
        });
        let txs = fetcher(api.clone(), 2, 10)
            .fetch_transactions(&credential(), 30)
            .await
            .unwrap();

        assert_eq!(txs.len(), 5);
        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests.iter().map(|r| r.start_position).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
        assert!(requests[0]
            .filter
            .as_deref()
            .unwrap()
            .starts_with("TxnDate > '"));
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let api = Arc::new(PagedApi {
            total: 4,
            requests: Mutex::new(Vec::new()),
        });
        let txs = fetcher(api.clone(), 2, 10)
            .fetch_transactions(&credential(), 30)
            .await
            .unwrap();
        assert_eq!(txs.len(), 4);
        assert_eq!(api.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_max_pages_guard() {
        let api = Arc::new(PagedApi {
            total: 100,
            requests: Mutex::new(Vec::new()),
        });
        let txs = fetcher(api.clone(), 10, 3)
            .fetch_transactions(&credential(), 30)
            .await
            .unwrap();
        assert_eq!(txs.len(), 30);
        assert_eq!(api.requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_window_start() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            window_start(today, 30),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn test_records_without_id_are_skipped() {
        let decoded = decode_all(
            vec![json!({"Id": "1"}), json!({"TotalAmt": 3.0}), json!({"Id": "2"})],
            decode_purchase,
        );
        assert_eq!(decoded.len(), 2);
    }
}
