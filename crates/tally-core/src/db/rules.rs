//! Reconciliation rule operations

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::ReconciliationRule;

impl Database {
    /// Create a rule; the target must be one of the tenant's accounts
    pub fn create_rule(
        &self,
        tenant_id: &str,
        keyword: &str,
        target_account_id: i64,
        match_type: Option<&str>,
    ) -> Result<i64> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(Error::InvalidData("Rule keyword cannot be empty".into()));
        }

        if self.get_account(tenant_id, target_account_id)?.is_none() {
            return Err(Error::RuleTargetInvalid {
                tenant_id: tenant_id.to_string(),
                account_id: target_account_id,
            });
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO reconciliation_rules (tenant_id, keyword, target_account_id, match_type)
            VALUES (?, ?, ?, ?)
            "#,
            params![tenant_id, keyword, target_account_id, match_type],
        )?;
        let rule_id = tx.last_insert_rowid();

        // Matching rows that ran out of attempts re-enter the queue; the rule
        // answers them without a model call.
        tx.execute(
            r#"
            UPDATE transactions SET ai_attempts = 0, ai_last_error = NULL
            WHERE tenant_id = ?1 AND status = 'pending'
              AND ai_suggested_account_id IS NULL AND ai_attempts > 0
              AND (instr(lower(COALESCE(payee_name, '')), lower(?2)) > 0
                OR instr(lower(COALESCE(description, '')), lower(?2)) > 0)
            "#,
            params![tenant_id, keyword],
        )?;

        tx.commit()?;
        Ok(rule_id)
    }

    /// List a tenant's rules in id order
    pub fn list_rules(&self, tenant_id: &str) -> Result<Vec<ReconciliationRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, tenant_id, keyword, target_account_id, match_type, created_at
            FROM reconciliation_rules
            WHERE tenant_id = ?
            ORDER BY id
            "#,
        )?;

        let rules = stmt
            .query_map(params![tenant_id], |row| {
                let created_at: String = row.get(5)?;
                Ok(ReconciliationRule {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    keyword: row.get(2)?,
                    target_account_id: row.get(3)?,
                    match_type: row.get(4)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rules)
    }

    /// Delete one of a tenant's rules
    pub fn delete_rule(&self, tenant_id: &str, rule_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM reconciliation_rules WHERE tenant_id = ? AND id = ?",
            params![tenant_id, rule_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Rule {}", rule_id)));
        }
        Ok(())
    }
}
