//! QuickBooks record decoding
//!
//! Maps raw entity JSON onto the platform-neutral `ExternalAccount` and
//! `ExternalTransaction` models.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{ExternalAccount, ExternalTransaction};

/// Payee used when neither the vendor nor the funding account has a name
pub const UNKNOWN_PAYEE: &str = "Unknown";
/// Description used when neither a memo nor a document number is present
pub const NO_DESCRIPTION: &str = "No description";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QboAccount {
    pub id: Option<String>,
    pub name: Option<String>,
    pub classification: Option<String>,
    pub account_sub_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QboRef {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QboPurchase {
    pub id: Option<String>,
    pub entity_ref: Option<QboRef>,
    pub account_ref: Option<QboRef>,
    pub private_note: Option<String>,
    pub doc_number: Option<String>,
    pub total_amt: Option<f64>,
    pub txn_date: Option<String>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

impl QboAccount {
    /// None when the record has no id
    pub fn into_external(self) -> Option<ExternalAccount> {
        let external_id = non_empty(self.id.as_deref())?.to_string();
        Some(ExternalAccount {
            name: non_empty(self.name.as_deref())
                .unwrap_or(&external_id)
                .to_string(),
            external_id,
            classification: self.classification,
            account_sub_type: self.account_sub_type,
            description: self.description,
        })
    }
}

impl QboPurchase {
    /// None when the record has no id
    pub fn into_external(self) -> Option<ExternalTransaction> {
        let external_id = non_empty(self.id.as_deref())?.to_string();

        let payee = non_empty(self.entity_ref.as_ref().and_then(|r| r.name.as_deref()))
            .or_else(|| non_empty(self.account_ref.as_ref().and_then(|r| r.name.as_deref())))
            .unwrap_or(UNKNOWN_PAYEE)
            .to_string();

        let description = non_empty(self.private_note.as_deref())
            .or_else(|| non_empty(self.doc_number.as_deref()))
            .unwrap_or(NO_DESCRIPTION)
            .to_string();

        Some(ExternalTransaction {
            external_id,
            payee_name: payee,
            description,
            amount: self.total_amt.unwrap_or(0.0),
            transaction_date: self
                .txn_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
        })
    }
}

/// Decode an Account record; None (with the reason) when unusable
pub fn decode_account(raw: Value) -> std::result::Result<ExternalAccount, String> {
    let record: QboAccount =
        serde_json::from_value(raw).map_err(|e| format!("Invalid Account record: {}", e))?;
    record
        .into_external()
        .ok_or_else(|| "Account record without Id".to_string())
}

/// Decode a Purchase record
pub fn decode_purchase(raw: Value) -> std::result::Result<ExternalTransaction, String> {
    let record: QboPurchase =
        serde_json::from_value(raw).map_err(|e| format!("Invalid Purchase record: {}", e))?;
    record
        .into_external()
        .ok_or_else(|| "Purchase record without Id".to_string())
}
