//! Categorization engine
//!
//! Works through a tenant's queue of unsuggested transactions one at a time:
//!
//! 1. Reconciliation rules. A hit is written with confidence 1.0 and the
//!    transaction is done.
//! 2. Embedding, persisted on the row.
//! 3. Retrieval of similar transactions the accountant already approved.
//! 4. One model call with the tenant's candidate accounts (denylist removed)
//!    and that history, validated before it is written.
//!
//! Suggestions never change `status`; approval is a separate human step.
//! Per-item failures are recorded on the row and do not stop the pass. Only
//! storage errors abort it.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::ai::parsing::parse_suggestion;
use crate::ai::{AIBackend, AIClient};
use crate::config::{CategorizationConfig, TallyConfig};
use crate::db::Database;
use crate::embedding::EmbeddingGenerator;
use crate::error::{Error, Result};
use crate::models::{
    Account, AiOperation, CategorizationSummary, NewAiMetric, SimilarTransaction, Suggestion,
    SuggestionSource, Transaction,
};
use crate::prompts::{Prompt, PromptId, PromptLibrary};
use crate::rules::RuleMatcher;

/// Something that can run a categorization pass for a tenant
#[async_trait]
pub trait Categorizer: Send + Sync {
    async fn categorize_pending(&self, tenant_id: &str) -> Result<CategorizationSummary>;
}

/// How a single queued transaction ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Suggested,
    /// Approved by a human while we were working on it
    AlreadyReviewed,
}

pub struct CategorizationEngine {
    db: Database,
    ai: AIClient,
    embeddings: EmbeddingGenerator,
    prompt: Prompt,
    config: CategorizationConfig,
}

impl CategorizationEngine {
    pub fn new(
        db: Database,
        ai: AIClient,
        prompt: Prompt,
        config: CategorizationConfig,
        embedding_dimensions: usize,
    ) -> Self {
        let embeddings = EmbeddingGenerator::new(db.clone(), ai.clone(), embedding_dimensions);
        Self {
            db,
            ai,
            embeddings,
            prompt,
            config,
        }
    }

    /// Build with the categorization prompt from a prompt library
    pub fn from_config(
        db: Database,
        ai: AIClient,
        prompts: &mut PromptLibrary,
        config: &TallyConfig,
    ) -> Result<Self> {
        let prompt = prompts.get(PromptId::CategorizeTransaction)?.clone();
        Ok(Self::new(
            db,
            ai,
            prompt,
            config.categorization.clone(),
            config.ai.embedding_dimensions,
        ))
    }

    pub fn config(&self) -> &CategorizationConfig {
        &self.config
    }

    /// Run one pass over the tenant's queue
    pub async fn run(&self, tenant_id: &str) -> Result<CategorizationSummary> {
        let accounts = self.db.list_accounts(tenant_id)?;
        let account_ids: HashSet<i64> = accounts.iter().map(|a| a.id).collect();
        let rules = RuleMatcher::new(
            self.db.list_rules(tenant_id)?,
            &account_ids,
            self.config.rule_priority,
        );
        let candidates: Vec<&Account> = accounts
            .iter()
            .filter(|a| !self.config.is_denied(&a.name))
            .collect();

        let queue = self.db.list_uncategorized(
            tenant_id,
            self.config.batch_size,
            self.config.max_attempts,
        )?;

        let mut summary = CategorizationSummary {
            selected: queue.len(),
            ..CategorizationSummary::default()
        };
        if queue.is_empty() {
            debug!(tenant = %tenant_id, "Nothing to categorize");
            return Ok(summary);
        }

        info!(
            tenant = %tenant_id,
            queued = queue.len(),
            rules = rules.len(),
            candidates = candidates.len(),
            "Categorizing transactions"
        );
        if candidates.is_empty() {
            warn!(tenant = %tenant_id, "No candidate accounts; only rules will apply this pass");
        }

        let last = queue.len() - 1;
        for (i, tx) in queue.iter().enumerate() {
            if let Some(suggestion) = rules.suggest(tx) {
                if self.db.save_suggestion(tenant_id, tx.id, &suggestion)? {
                    debug!(transaction_id = tx.id, "{}", suggestion.reasoning);
                    summary.by_rule += 1;
                }
                continue;
            }

            if candidates.is_empty() {
                continue;
            }

            let result = tokio::time::timeout(
                self.config.item_timeout,
                self.categorize_with_model(tx, &candidates),
            )
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout(format!(
                    "Transaction {} took longer than {:?}",
                    tx.id, self.config.item_timeout
                )))
            });

            match result {
                Ok(Outcome::Suggested) => summary.by_model += 1,
                Ok(Outcome::AlreadyReviewed) => {}
                Err(e @ (Error::Database(_) | Error::Pool(_))) => {
                    error!(tenant = %tenant_id, "Storage failure, aborting pass: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    if e.is_soft() {
                        warn!(transaction_id = tx.id, "Categorization failed: {}", e);
                    } else {
                        error!(transaction_id = tx.id, "Categorization failed: {}", e);
                    }
                    self.db
                        .record_categorization_failure(tenant_id, tx.id, &e.to_string())?;
                    summary.failed += 1;
                }
            }

            if i < last && !self.config.inference_delay.is_zero() {
                tokio::time::sleep(self.config.inference_delay).await;
            }
        }

        info!(
            tenant = %tenant_id,
            by_rule = summary.by_rule,
            by_model = summary.by_model,
            failed = summary.failed,
            "Categorization pass complete"
        );
        Ok(summary)
    }

    async fn categorize_with_model(
        &self,
        tx: &Transaction,
        candidates: &[&Account],
    ) -> Result<Outcome> {
        let tenant_id = &tx.tenant_id;

        let embedding = self.embeddings.embed_transaction(tx).await?;
        self.db.save_embedding(tenant_id, tx.id, &embedding)?;

        let similar = self.db.find_similar_transactions(
            tenant_id,
            &embedding,
            tx.id,
            self.config.similarity_threshold,
            self.config.similarity_limit,
        )?;
        debug!(transaction_id = tx.id, similar = similar.len(), "Retrieved history");

        let vars = prompt_vars(tx, candidates, &similar);
        let system = self.prompt.render_system(&vars);
        let user = self.prompt.render_user(&vars);
        let candidate_ids: Vec<i64> = candidates.iter().map(|a| a.id).collect();

        let start = Instant::now();
        let result = self
            .ai
            .complete_json(system.as_deref(), &user)
            .await
            .and_then(|response| parse_suggestion(&response, &candidate_ids));
        let latency_ms = start.elapsed().as_millis() as i64;

        let metric = NewAiMetric {
            operation: AiOperation::Categorize,
            model: self.ai.model().to_string(),
            tenant_id: tenant_id.clone(),
            transaction_id: Some(tx.id),
            latency_ms,
            success: result.is_ok(),
            error_message: result.as_ref().err().map(|e| e.to_string()),
        };
        if let Err(e) = self.db.record_ai_metric(&metric) {
            warn!("Failed to record categorization metric: {}", e);
        }

        let decision = result?;
        let suggestion = Suggestion {
            account_id: decision.account_id,
            confidence: decision.confidence,
            reasoning: decision.reasoning,
            source: SuggestionSource::Model,
        };

        if self.db.save_suggestion(tenant_id, tx.id, &suggestion)? {
            debug!(
                transaction_id = tx.id,
                account_id = suggestion.account_id,
                confidence = suggestion.confidence,
                "Model suggestion saved"
            );
            Ok(Outcome::Suggested)
        } else {
            Ok(Outcome::AlreadyReviewed)
        }
    }
}

#[async_trait]
impl Categorizer for CategorizationEngine {
    async fn categorize_pending(&self, tenant_id: &str) -> Result<CategorizationSummary> {
        self.run(tenant_id).await
    }
}

/// `- Name (Classification): Description [ID: 7]`
fn account_line(account: &Account) -> String {
    let mut line = format!("- {}", account.name);
    if let Some(ref classification) = account.classification {
        line.push_str(&format!(" ({})", classification));
    }
    let description = account.description.as_deref().map(str::trim);
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        line.push_str(&format!(": {}", description));
    }
    line.push_str(&format!(" [ID: {}]", account.id));
    line
}

/// `- Payee (Description): Categorized to account ID 7`
fn history_line(similar: &SimilarTransaction) -> String {
    format!(
        "- {} ({}): Categorized to account ID {}",
        similar.payee_name.as_deref().unwrap_or("Unknown"),
        similar.description.as_deref().unwrap_or(""),
        similar.assigned_account_id
    )
}

fn prompt_vars(
    tx: &Transaction,
    candidates: &[&Account],
    similar: &[SimilarTransaction],
) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert(
        "payee",
        tx.payee_name.clone().unwrap_or_else(|| "Unknown".to_string()),
    );
    vars.insert("description", tx.description.clone().unwrap_or_default());
    vars.insert("amount", format!("{:.2}", tx.amount));
    vars.insert(
        "date",
        tx.transaction_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    );
    vars.insert(
        "accounts",
        candidates
            .iter()
            .map(|a| account_line(a))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    vars.insert(
        "history",
        similar.iter().map(history_line).collect::<Vec<_>>().join("\n"),
    );
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(
        id: i64,
        name: &str,
        classification: Option<&str>,
        description: Option<&str>,
    ) -> Account {
        Account {
            id,
            tenant_id: "t1".into(),
            external_id: id.to_string(),
            name: name.into(),
            classification: classification.map(String::from),
            account_sub_type: None,
            description: description.map(String::from),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_account_line() {
        assert_eq!(
            account_line(&account(7, "Office Supplies", Some("Expense"), Some("Paper and pens"))),
            "- Office Supplies (Expense): Paper and pens [ID: 7]"
        );
        assert_eq!(
            account_line(&account(3, "Travel", None, Some(" "))),
            "- Travel [ID: 3]"
        );
    }

    #[test]
    fn test_prompt_vars() {
        let office = account(7, "Office Supplies", Some("Expense"), None);
        let tx = Transaction {
            id: 1,
            tenant_id: "t1".into(),
            payee_name: Some("Staples".into()),
            description: Some("Printer paper".into()),
            amount: -42.5,
            ..Transaction::default()
        };
        let similar = vec![SimilarTransaction {
            transaction_id: 9,
            payee_name: Some("Staples".into()),
            description: Some("Toner".into()),
            assigned_account_id: 7,
            assigned_account_name: Some("Office Supplies".into()),
            similarity: 0.93,
        }];

        let vars = prompt_vars(&tx, &[&office], &similar);
        assert_eq!(vars["amount"], "-42.50");
        assert_eq!(vars["date"], "unknown");
        assert_eq!(vars["accounts"], "- Office Supplies (Expense) [ID: 7]");
        assert_eq!(
            vars["history"],
            "- Staples (Toner): Categorized to account ID 7"
        );

        let empty = prompt_vars(&tx, &[&office], &[]);
        assert_eq!(empty["history"], "");
    }
}
