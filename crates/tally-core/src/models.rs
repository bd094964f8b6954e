//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An isolated organization owning accounts, transactions, rules and one connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Stored OAuth credentials for a tenant's accounting platform
#[derive(Clone, Serialize, Deserialize)]
pub struct Connection {
    pub tenant_id: String,
    /// Company identifier on the accounting platform (QuickBooks realm)
    pub realm_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Tokens stay out of logs
impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("tenant_id", &self.tenant_id)
            .field("realm_id", &self.realm_id)
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Credentials for creating or replacing a tenant's connection
#[derive(Clone)]
pub struct NewConnection {
    pub realm_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl NewConnection {
    /// Build from a token grant received at `now`
    pub fn from_grant(realm_id: &str, grant: &TokenGrant, now: DateTime<Utc>) -> Self {
        let (access_token_expires_at, refresh_token_expires_at) = grant.expiries(now);
        Self {
            realm_id: realm_id.to_string(),
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone(),
            access_token_expires_at,
            refresh_token_expires_at,
        }
    }
}

/// Token response from the accounting platform's token endpoint
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token lifetime in seconds
    #[serde(alias = "x_refresh_token_expires_in")]
    pub refresh_expires_in: i64,
}

impl TokenGrant {
    /// Absolute expiry timestamps (access, refresh) for a grant received at `now`
    pub fn expiries(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now + chrono::Duration::seconds(self.expires_in),
            now + chrono::Duration::seconds(self.refresh_expires_in),
        )
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish_non_exhaustive()
    }
}

/// A chart-of-accounts entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub tenant_id: String,
    /// Identifier on the accounting platform, unique per tenant
    pub external_id: String,
    pub name: String,
    /// e.g. "Expense", "Asset"
    pub classification: Option<String>,
    pub account_sub_type: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An account as read from the accounting platform (no local id yet)
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalAccount {
    pub external_id: String,
    pub name: String,
    pub classification: Option<String>,
    pub account_sub_type: Option<String>,
    pub description: Option<String>,
}

/// Review lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Awaiting human review
    #[default]
    Pending,
    /// Human confirmed the account
    Approved,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a suggestion came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    /// A tenant reconciliation rule matched
    Rule,
    /// The language model chose the account
    Model,
}

impl SuggestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Model => "model",
        }
    }
}

impl std::str::FromStr for SuggestionSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(Self::Rule),
            "model" => Ok(Self::Model),
            _ => Err(format!("Unknown suggestion source: {}", s)),
        }
    }
}

/// An imported financial transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub tenant_id: String,
    pub external_id: String,
    pub payee_name: Option<String>,
    pub description: Option<String>,
    /// Signed amount as reported by the accounting platform
    pub amount: f64,
    pub transaction_date: Option<NaiveDate>,
    pub status: TransactionStatus,
    /// Human-confirmed account
    pub assigned_account_id: Option<i64>,
    pub ai_suggested_account_id: Option<i64>,
    pub ai_confidence_score: Option<f64>,
    pub ai_reasoning: Option<String>,
    pub ai_source: Option<SuggestionSource>,
    /// Number of categorization attempts that ended without a suggestion
    pub ai_attempts: i64,
    pub ai_last_error: Option<String>,
    pub has_embedding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transaction as read from the accounting platform (no local id yet)
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTransaction {
    pub external_id: String,
    pub payee_name: String,
    pub description: String,
    pub amount: f64,
    pub transaction_date: Option<NaiveDate>,
}

/// A tenant-defined keyword → account mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRule {
    pub id: i64,
    pub tenant_id: String,
    /// Case-insensitive substring matched against payee and description
    pub keyword: String,
    pub target_account_id: i64,
    /// Classification tag, e.g. "transfer"
    pub match_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The (account, confidence, reasoning) triple stored for human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub account_id: i64,
    pub confidence: f64,
    pub reasoning: String,
    pub source: SuggestionSource,
}

/// An already-categorized transaction close to the one being processed
#[derive(Debug, Clone)]
pub struct SimilarTransaction {
    pub transaction_id: i64,
    pub payee_name: Option<String>,
    pub description: Option<String>,
    pub assigned_account_id: i64,
    pub assigned_account_name: Option<String>,
    pub similarity: f32,
}

/// A transaction awaiting approval along with its suggested account name
#[derive(Debug, Clone, Serialize)]
pub struct PendingReview {
    pub transaction: Transaction,
    pub suggested_account_name: Option<String>,
}

/// Outcome counts for one categorization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorizationSummary {
    /// Transactions selected by the queue predicate
    pub selected: usize,
    pub by_rule: usize,
    pub by_model: usize,
    /// Soft failures (left unsuggested for the next pass)
    pub failed: usize,
}

/// Result of one sync cycle for a tenant
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub tenant_id: String,
    pub accounts_fetched: usize,
    pub transactions_fetched: usize,
    /// None when categorization failed; the sync itself still succeeded
    pub categorization: Option<CategorizationSummary>,
}

/// Kind of AI call recorded in metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiOperation {
    Embed,
    Categorize,
}

impl AiOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embed => "embed",
            Self::Categorize => "categorize",
        }
    }
}

/// A single AI call to be recorded
#[derive(Debug, Clone)]
pub struct NewAiMetric {
    pub operation: AiOperation,
    pub model: String,
    pub tenant_id: String,
    pub transaction_id: Option<i64>,
    pub latency_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Aggregated AI call statistics for one operation
#[derive(Debug, Clone, Serialize)]
pub struct AiOperationStats {
    pub operation: String,
    pub call_count: i64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

/// Per-tenant counts for status output
#[derive(Debug, Clone, Default, Serialize)]
pub struct TenantStats {
    pub accounts: i64,
    pub transactions: i64,
    pub awaiting_suggestion: i64,
    pub awaiting_review: i64,
    pub approved: i64,
    pub dead_lettered: i64,
    pub rules: i64,
}
