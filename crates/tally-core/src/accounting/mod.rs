//! Accounting platform access
//!
//! `AccountingApi` is the seam between the pipeline and the external ledger:
//! token refresh plus a paginated query endpoint returning raw JSON records.
//! `QuickBooksClient` is the production implementation; tests substitute
//! their own.

mod quickbooks;
pub mod records;

pub use quickbooks::{QboEnvironment, QuickBooksClient};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::TokenGrant;

/// Entities the fetcher reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// Chart of accounts
    Account,
    /// Expense transactions (card, check, cash)
    Purchase,
}

impl Entity {
    /// Name used in the query language and the response envelope
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Purchase => "Purchase",
        }
    }
}

/// One page of an entity query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub entity: Entity,
    /// Optional WHERE clause body, e.g. `TxnDate > '2024-01-01'`
    pub filter: Option<String>,
    /// 1-based offset
    pub start_position: u32,
    pub max_results: u32,
}

impl QueryRequest {
    /// Render as a QuickBooks query statement
    pub fn to_query(&self) -> String {
        let mut q = format!("select * from {}", self.entity.as_str());
        if let Some(ref filter) = self.filter {
            q.push_str(" WHERE ");
            q.push_str(filter);
        }
        q.push_str(&format!(
            " STARTPOSITION {} MAXRESULTS {}",
            self.start_position, self.max_results
        ));
        q
    }
}

/// External accounting platform
#[async_trait]
pub trait AccountingApi: Send + Sync {
    /// Exchange a refresh token for new tokens.
    ///
    /// Any failure surfaces as `Error::RefreshFailed`.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Run one page of a query; returns the raw entity records.
    ///
    /// Any failure surfaces as `Error::FetchFailed`.
    async fn query(&self, realm_id: &str, access_token: &str, request: &QueryRequest)
        -> Result<Vec<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rendering() {
        let req = QueryRequest {
            entity: Entity::Purchase,
            filter: Some("TxnDate > '2024-01-01'".into()),
            start_position: 1,
            max_results: 1000,
        };
        assert_eq!(
            req.to_query(),
            "select * from Purchase WHERE TxnDate > '2024-01-01' STARTPOSITION 1 MAXRESULTS 1000"
        );

        let req = QueryRequest {
            entity: Entity::Account,
            filter: None,
            start_position: 1001,
            max_results: 1000,
        };
        assert_eq!(
            req.to_query(),
            "select * from Account STARTPOSITION 1001 MAXRESULTS 1000"
        );
    }
}
