//! Embedding cache keyed by (tenant, model, content hash)

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::Result;
use crate::vector::{bytes_to_vec, vec_to_bytes};

impl Database {
    pub fn get_cached_embedding(
        &self,
        tenant_id: &str,
        model: &str,
        content_hash: &str,
    ) -> Result<Option<Vec<f32>>> {
        let conn = self.conn()?;
        let bytes: Option<Vec<u8>> = conn
            .query_row(
                r#"
                SELECT embedding FROM embedding_cache
                WHERE tenant_id = ? AND model = ? AND content_hash = ?
                "#,
                params![tenant_id, model, content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.map(|b| bytes_to_vec(&b)))
    }

    pub fn cache_embedding(
        &self,
        tenant_id: &str,
        model: &str,
        content_hash: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO embedding_cache (tenant_id, model, content_hash, embedding)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(tenant_id, model, content_hash) DO UPDATE SET
                embedding = excluded.embedding,
                created_at = CURRENT_TIMESTAMP
            "#,
            params![tenant_id, model, content_hash, vec_to_bytes(embedding)],
        )?;
        Ok(())
    }
}
