//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No credential record exists for the tenant
    #[error("No accounting connection found for tenant {0}")]
    ConnectionNotFound(String),

    /// The accounting platform rejected or could not complete a token refresh
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// An accounting platform query failed
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// Transaction text was empty after normalization
    #[error("Nothing to embed for transaction {0}")]
    EmbeddingEmpty(i64),

    /// Model output could not be read as a categorization decision
    #[error("Malformed inference response: {0}")]
    InferenceMalformed(String),

    /// A rule points at an account the tenant does not own
    #[error("Rule target account {account_id} is not an account of tenant {tenant_id}")]
    RuleTargetInvalid { tenant_id: String, account_id: i64 },

    /// Another sync currently holds the tenant's lease
    #[error("A sync is already running for tenant {0}")]
    SyncInProgress(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl Error {
    /// Whether this failure is contained to a single transaction.
    ///
    /// Soft failures leave the transaction eligible for the next pass and
    /// never abort a categorization batch.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingEmpty(_)
                | Error::InferenceMalformed(_)
                | Error::RuleTargetInvalid { .. }
                | Error::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_classification() {
        assert!(Error::EmbeddingEmpty(1).is_soft());
        assert!(Error::InferenceMalformed("bad".into()).is_soft());
        assert!(Error::Timeout("slow".into()).is_soft());
        assert!(!Error::ConnectionNotFound("t1".into()).is_soft());
        assert!(!Error::RefreshFailed("revoked".into()).is_soft());
        assert!(!Error::FetchFailed("500".into()).is_soft());
    }
}
