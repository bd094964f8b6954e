//! AI call metrics

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::models::{AiOperationStats, NewAiMetric};

impl Database {
    /// Record an AI call metric
    pub fn record_ai_metric(&self, metric: &NewAiMetric) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO ai_metrics (
                operation, model, tenant_id, transaction_id, latency_ms, success, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                metric.operation.as_str(),
                metric.model,
                metric.tenant_id,
                metric.transaction_id,
                metric.latency_ms,
                metric.success,
                metric.error_message,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Per-operation call counts, success rate and mean latency for a tenant
    pub fn get_ai_stats(&self, tenant_id: &str) -> Result<Vec<AiOperationStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                operation,
                COUNT(*) as calls,
                CAST(SUM(CASE WHEN success THEN 1 ELSE 0 END) AS REAL) / COUNT(*) as success_rate,
                COALESCE(AVG(latency_ms), 0) as avg_latency
            FROM ai_metrics
            WHERE tenant_id = ?
            GROUP BY operation
            ORDER BY operation
            "#,
        )?;

        let stats = stmt
            .query_map(params![tenant_id], |row| {
                Ok(AiOperationStats {
                    operation: row.get(0)?,
                    call_count: row.get(1)?,
                    success_rate: row.get(2)?,
                    avg_latency_ms: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stats)
    }
}
