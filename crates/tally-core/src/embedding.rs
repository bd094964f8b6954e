//! Embedding generator
//!
//! Turns a transaction into a dense vector via the AI backend. Vectors are
//! cached per (tenant, model, text hash) so a transaction retried after a
//! failed pass does not pay for the same embedding twice.

use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::ai::{AIBackend, AIClient};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{AiOperation, NewAiMetric, Transaction};

/// Text sent to the embedding model: `payee description amount`, whitespace collapsed.
///
/// Returns None when payee and description carry no text; an amount alone
/// says nothing about the account.
pub fn embedding_text(payee: &str, description: &str, amount: f64) -> Option<String> {
    let words = format!("{} {}", payee, description);
    let words = words.split_whitespace().collect::<Vec<_>>().join(" ");
    if words.is_empty() {
        return None;
    }
    Some(format!("{} {}", words, amount))
}

/// Cache key for embedding text
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Clone)]
pub struct EmbeddingGenerator {
    db: Database,
    ai: AIClient,
    /// Expected vector length; 0 accepts any
    dimensions: usize,
}

impl EmbeddingGenerator {
    pub fn new(db: Database, ai: AIClient, dimensions: usize) -> Self {
        Self { db, ai, dimensions }
    }

    pub fn model(&self) -> &str {
        self.ai.embedding_model()
    }

    /// Embed a stored transaction.
    ///
    /// Fails with `EmbeddingEmpty` when the transaction has no text to embed.
    pub async fn embed_transaction(&self, transaction: &Transaction) -> Result<Vec<f32>> {
        let text = embedding_text(
            transaction.payee_name.as_deref().unwrap_or_default(),
            transaction.description.as_deref().unwrap_or_default(),
            transaction.amount,
        )
        .ok_or(Error::EmbeddingEmpty(transaction.id))?;

        let tenant_id = &transaction.tenant_id;
        let model = self.ai.embedding_model().to_string();
        let hash = content_hash(&text);

        if let Some(cached) = self.db.get_cached_embedding(tenant_id, &model, &hash)? {
            if self.dimensions == 0 || cached.len() == self.dimensions {
                debug!(transaction_id = transaction.id, "Embedding cache hit");
                return Ok(cached);
            }
        }

        let start = Instant::now();
        let result = self.ai.embed(&text).await.and_then(|v| self.check(v));
        let latency_ms = start.elapsed().as_millis() as i64;

        let metric = NewAiMetric {
            operation: AiOperation::Embed,
            model: model.clone(),
            tenant_id: tenant_id.clone(),
            transaction_id: Some(transaction.id),
            latency_ms,
            success: result.is_ok(),
            error_message: result.as_ref().err().map(|e| e.to_string()),
        };
        if let Err(e) = self.db.record_ai_metric(&metric) {
            warn!("Failed to record embedding metric: {}", e);
        }

        let embedding = result?;
        self.db.cache_embedding(tenant_id, &model, &hash, &embedding)?;
        Ok(embedding)
    }

    fn check(&self, embedding: Vec<f32>) -> Result<Vec<f32>> {
        if embedding.is_empty() {
            return Err(Error::InvalidData("Embedding model returned an empty vector".into()));
        }
        if self.dimensions > 0 && embedding.len() != self.dimensions {
            return Err(Error::InvalidData(format!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::models::ExternalTransaction;

    #[test]
    fn test_embedding_text() {
        assert_eq!(
            embedding_text("Staples", "Printer\npaper  ", -42.5).unwrap(),
            "Staples Printer paper -42.5"
        );
        assert_eq!(embedding_text("  ", "\n", 10.0), None);
        assert_eq!(embedding_text("Uber", "", 12.0).unwrap(), "Uber 12");
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }

    fn stored(db: &Database, payee: &str, description: &str) -> Transaction {
        db.upsert_tenant("t1", "Tenant One").unwrap();
        db.upsert_transactions(
            "t1",
            &[ExternalTransaction {
                external_id: format!("{}-{}", payee, description),
                payee_name: payee.into(),
                description: description.into(),
                amount: -20.0,
                transaction_date: None,
            }],
        )
        .unwrap();
        db.list_uncategorized("t1", 100, 0)
            .unwrap()
            .into_iter()
            .last()
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_embed_hits_cache() {
        let db = Database::in_memory().unwrap();
        let mock = MockBackend::new();
        let generator = EmbeddingGenerator::new(db.clone(), AIClient::Mock(mock.clone()), 1536);
        let tx = stored(&db, "Staples", "Paper");

        let first = generator.embed_transaction(&tx).await.unwrap();
        let second = generator.embed_transaction(&tx).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.embedding_count(), 1);

        let stats = db.get_ai_stats("t1").unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].call_count, 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_without_a_call() {
        let db = Database::in_memory().unwrap();
        let mock = MockBackend::new();
        let generator = EmbeddingGenerator::new(db.clone(), AIClient::Mock(mock.clone()), 1536);
        let tx = stored(&db, " ", "");

        let err = generator.embed_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingEmpty(id) if id == tx.id));
        assert_eq!(mock.embedding_count(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let db = Database::in_memory().unwrap();
        let mock = MockBackend::new().with_dimensions(8);
        let generator = EmbeddingGenerator::new(db.clone(), AIClient::Mock(mock), 1536);
        let tx = stored(&db, "Staples", "Paper");

        assert!(matches!(
            generator.embed_transaction(&tx).await,
            Err(Error::InvalidData(_))
        ));
        let stats = db.get_ai_stats("t1").unwrap();
        assert_eq!(stats[0].success_rate, 0.0);
    }
}
