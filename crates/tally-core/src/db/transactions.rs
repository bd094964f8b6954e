//! Transaction operations: upsert, categorization queue, similarity, review

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    ExternalTransaction, PendingReview, SimilarTransaction, Suggestion, SuggestionSource,
    Transaction, TransactionStatus,
};
use crate::vector::{bytes_to_vec, cosine_similarity, vec_to_bytes};

/// Counts from a transaction upsert batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

const TRANSACTION_COLUMNS: &str = "t.id, t.tenant_id, t.external_id, t.payee_name, \
     t.description, t.amount, t.transaction_date, t.status, t.assigned_account_id, \
     t.ai_suggested_account_id, t.ai_confidence_score, t.ai_reasoning, t.ai_source, \
     t.ai_attempts, t.ai_last_error, t.embedding IS NOT NULL, t.created_at, t.updated_at";

impl Database {
    /// Insert or update transactions keyed by (tenant, external id).
    ///
    /// Review state and suggestions are left alone. When payee, description or
    /// amount changed upstream, the stored embedding and failure counter are
    /// cleared so the row re-enters the categorization queue.
    pub fn upsert_transactions(
        &self,
        tenant_id: &str,
        transactions: &[ExternalTransaction],
    ) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if transactions.is_empty() {
            return Ok(stats);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut exists_stmt = tx.prepare(
                "SELECT 1 FROM transactions WHERE tenant_id = ? AND external_id = ?",
            )?;
            let mut upsert_stmt = tx.prepare(
                r#"
                INSERT INTO transactions (
                    tenant_id, external_id, payee_name, description, amount, transaction_date
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, external_id) DO UPDATE SET
                    ai_attempts = CASE WHEN ai_suggested_account_id IS NULL AND (
                            payee_name IS NOT excluded.payee_name
                            OR description IS NOT excluded.description
                            OR amount != excluded.amount)
                        THEN 0 ELSE ai_attempts END,
                    ai_last_error = CASE WHEN ai_suggested_account_id IS NULL AND (
                            payee_name IS NOT excluded.payee_name
                            OR description IS NOT excluded.description
                            OR amount != excluded.amount)
                        THEN NULL ELSE ai_last_error END,
                    embedding = CASE WHEN
                            payee_name IS NOT excluded.payee_name
                            OR description IS NOT excluded.description
                            OR amount != excluded.amount
                        THEN NULL ELSE embedding END,
                    payee_name = excluded.payee_name,
                    description = excluded.description,
                    amount = excluded.amount,
                    transaction_date = excluded.transaction_date,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )?;

            for t in transactions {
                let existed = exists_stmt.exists(params![tenant_id, t.external_id])?;
                upsert_stmt.execute(params![
                    tenant_id,
                    t.external_id,
                    t.payee_name,
                    t.description,
                    t.amount,
                    t.transaction_date.map(|d| d.to_string()),
                ])?;
                if existed {
                    stats.updated += 1;
                } else {
                    stats.inserted += 1;
                }
            }
        }
        tx.commit()?;

        Ok(stats)
    }

    /// The categorization queue.
    ///
    /// Selects `tenant_id = ? AND status = 'pending' AND ai_suggested_account_id
    /// IS NULL AND (max_attempts = 0 OR ai_attempts < max_attempts)` in id order.
    pub fn list_uncategorized(
        &self,
        tenant_id: &str,
        limit: u32,
        max_attempts: u32,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}
            FROM transactions t
            WHERE t.tenant_id = ?1
              AND t.status = 'pending'
              AND t.ai_suggested_account_id IS NULL
              AND (?2 = 0 OR t.ai_attempts < ?2)
            ORDER BY t.id
            LIMIT ?3
            "#,
            TRANSACTION_COLUMNS
        ))?;

        let transactions = stmt
            .query_map(params![tenant_id, max_attempts, limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Get one of a tenant's transactions
    pub fn get_transaction(&self, tenant_id: &str, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let transaction = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions t WHERE t.tenant_id = ? AND t.id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![tenant_id, id],
                row_to_transaction,
            )
            .optional()?;
        Ok(transaction)
    }

    /// Look up a transaction by its external id
    pub fn get_transaction_by_external_id(
        &self,
        tenant_id: &str,
        external_id: &str,
    ) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let transaction = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions t WHERE t.tenant_id = ? AND t.external_id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![tenant_id, external_id],
                row_to_transaction,
            )
            .optional()?;
        Ok(transaction)
    }

    /// List a tenant's transactions, newest first
    pub fn list_transactions(
        &self,
        tenant_id: &str,
        status: Option<TransactionStatus>,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}
            FROM transactions t
            WHERE t.tenant_id = ?1 AND (?2 IS NULL OR t.status = ?2)
            ORDER BY t.transaction_date DESC, t.id DESC
            LIMIT ?3
            "#,
            TRANSACTION_COLUMNS
        ))?;

        let transactions = stmt
            .query_map(
                params![tenant_id, status.map(|s| s.as_str()), limit],
                row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Store a transaction's embedding
    pub fn save_embedding(&self, tenant_id: &str, id: i64, embedding: &[f32]) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE transactions SET embedding = ? WHERE tenant_id = ? AND id = ?",
            params![vec_to_bytes(embedding), tenant_id, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Transaction {}", id)));
        }
        Ok(())
    }

    /// Read a transaction's stored embedding
    pub fn get_embedding(&self, tenant_id: &str, id: i64) -> Result<Option<Vec<f32>>> {
        let conn = self.conn()?;
        let bytes: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT embedding FROM transactions WHERE tenant_id = ? AND id = ?",
                params![tenant_id, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.flatten().map(|b| bytes_to_vec(&b)))
    }

    /// Write a suggestion onto a pending transaction.
    ///
    /// Status stays `pending`. Returns false if the row was approved meanwhile.
    pub fn save_suggestion(
        &self,
        tenant_id: &str,
        id: i64,
        suggestion: &Suggestion,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE transactions SET
                ai_suggested_account_id = ?,
                ai_confidence_score = ?,
                ai_reasoning = ?,
                ai_source = ?,
                ai_last_error = NULL,
                ai_last_attempted_at = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE tenant_id = ? AND id = ? AND status = 'pending'
            "#,
            params![
                suggestion.account_id,
                suggestion.confidence,
                suggestion.reasoning,
                suggestion.source.as_str(),
                format_datetime(Utc::now()),
                tenant_id,
                id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Count a failed categorization attempt against a transaction
    pub fn record_categorization_failure(
        &self,
        tenant_id: &str,
        id: i64,
        error: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE transactions SET
                ai_attempts = ai_attempts + 1,
                ai_last_error = ?,
                ai_last_attempted_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
            params![error, format_datetime(Utc::now()), tenant_id, id],
        )?;
        Ok(())
    }

    /// Make dead-lettered transactions eligible again
    pub fn reset_failed_attempts(&self, tenant_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            r#"
            UPDATE transactions SET ai_attempts = 0, ai_last_error = NULL
            WHERE tenant_id = ? AND status = 'pending'
              AND ai_suggested_account_id IS NULL AND ai_attempts > 0
            "#,
            params![tenant_id],
        )?;
        Ok(count)
    }

    /// Approved transactions of the same tenant closest to `embedding`.
    ///
    /// Only rows with a human-assigned account and a stored embedding count.
    /// Results have similarity strictly above `threshold`, best first.
    pub fn find_similar_transactions(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        exclude_id: i64,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarTransaction>> {
        if limit == 0 || embedding.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.payee_name, t.description, t.assigned_account_id, a.name, t.embedding
            FROM transactions t
            LEFT JOIN chart_of_accounts a
                ON a.id = t.assigned_account_id AND a.tenant_id = t.tenant_id
            WHERE t.tenant_id = ?
              AND t.id != ?
              AND t.assigned_account_id IS NOT NULL
              AND t.embedding IS NOT NULL
            "#,
        )?;

        let rows = stmt.query_map(params![tenant_id, exclude_id], |row| {
            let bytes: Vec<u8> = row.get(5)?;
            Ok((
                SimilarTransaction {
                    transaction_id: row.get(0)?,
                    payee_name: row.get(1)?,
                    description: row.get(2)?,
                    assigned_account_id: row.get(3)?,
                    assigned_account_name: row.get(4)?,
                    similarity: 0.0,
                },
                bytes,
            ))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (mut similar, bytes) = row?;
            let sim = cosine_similarity(embedding, &bytes_to_vec(&bytes));
            if sim > threshold {
                similar.similarity = sim;
                scored.push(similar);
            }
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.transaction_id.cmp(&b.transaction_id))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    /// Pending transactions that carry a suggestion
    pub fn list_pending_review(&self, tenant_id: &str, limit: i64) -> Result<Vec<PendingReview>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}, a.name
            FROM transactions t
            LEFT JOIN chart_of_accounts a
                ON a.id = t.ai_suggested_account_id AND a.tenant_id = t.tenant_id
            WHERE t.tenant_id = ?
              AND t.status = 'pending'
              AND t.ai_suggested_account_id IS NOT NULL
            ORDER BY t.id
            LIMIT ?
            "#,
            TRANSACTION_COLUMNS
        ))?;

        let pending = stmt
            .query_map(params![tenant_id, limit], |row| {
                Ok(PendingReview {
                    transaction: row_to_transaction(row)?,
                    suggested_account_name: row.get(18)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pending)
    }

    /// Approve a pending transaction.
    ///
    /// Assigns `account_override` when given, otherwise the stored suggestion.
    /// The account must belong to the same tenant.
    pub fn approve_transaction(
        &self,
        tenant_id: &str,
        id: i64,
        account_override: Option<i64>,
    ) -> Result<Transaction> {
        let transaction = self
            .get_transaction(tenant_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))?;

        if transaction.status == TransactionStatus::Approved {
            return Err(Error::InvalidData(format!(
                "Transaction {} is already approved",
                id
            )));
        }

        let account_id = account_override
            .or(transaction.ai_suggested_account_id)
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "Transaction {} has no suggestion; an account is required",
                    id
                ))
            })?;

        if self.get_account(tenant_id, account_id)?.is_none() {
            return Err(Error::NotFound(format!(
                "Account {} for tenant {}",
                account_id, tenant_id
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE transactions SET
                assigned_account_id = ?,
                status = 'approved',
                updated_at = CURRENT_TIMESTAMP
            WHERE tenant_id = ? AND id = ? AND status = 'pending'
            "#,
            params![account_id, tenant_id, id],
        )?;
        drop(conn);

        self.get_transaction(tenant_id, id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))
    }
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let date: Option<String> = row.get(6)?;
    let status: String = row.get(7)?;
    let source: Option<String> = row.get(12)?;
    let created_at: String = row.get(16)?;
    let updated_at: String = row.get(17)?;

    Ok(Transaction {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        external_id: row.get(2)?,
        payee_name: row.get(3)?,
        description: row.get(4)?,
        amount: row.get(5)?,
        transaction_date: date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        status: status.parse().unwrap_or_default(),
        assigned_account_id: row.get(8)?,
        ai_suggested_account_id: row.get(9)?,
        ai_confidence_score: row.get(10)?,
        ai_reasoning: row.get(11)?,
        ai_source: source.and_then(|s| s.parse::<SuggestionSource>().ok()),
        ai_attempts: row.get(13)?,
        ai_last_error: row.get(14)?,
        has_embedding: row.get(15)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}
