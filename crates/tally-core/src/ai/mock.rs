//! Mock backend for testing
//!
//! Deterministic stand-in for a model provider. Embeddings are hashed
//! bag-of-words vectors, so identical text embeds identically and texts that
//! share words score higher. Completions read the candidate accounts out of
//! the rendered prompt and pick one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Error, Result};

use super::AIBackend;

const MOCK_DIMENSIONS: usize = 1536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCallKind {
    Completion,
    Embedding,
}

/// A recorded call to the mock
#[derive(Debug, Clone)]
pub struct MockCall {
    pub kind: MockCallKind,
    pub input: String,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    /// lowercase keyword -> account name
    hints: HashMap<String, String>,
    /// transactions containing these return non-JSON
    malformed_on: Vec<String>,
    /// embedding input containing these fails
    embed_errors_on: Vec<String>,
}

/// Mock AI backend for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    dimensions: usize,
    latency: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            dimensions: MOCK_DIMENSIONS,
            latency: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Embedding vector length
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Sleep before answering each completion
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Transactions mentioning `keyword` go to the account named `account_name`
    pub fn hint(self, keyword: &str, account_name: &str) -> Self {
        self.lock()
            .hints
            .insert(keyword.to_lowercase(), account_name.to_string());
        self
    }

    /// Transactions mentioning `keyword` get a non-JSON answer
    pub fn malformed_on(self, keyword: &str) -> Self {
        self.lock().malformed_on.push(keyword.to_lowercase());
        self
    }

    /// Embedding calls whose text mentions `keyword` fail
    pub fn embed_error_on(self, keyword: &str) -> Self {
        self.lock().embed_errors_on.push(keyword.to_lowercase());
        self
    }

    /// All calls seen so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn completion_count(&self) -> usize {
        self.count(MockCallKind::Completion)
    }

    pub fn embedding_count(&self) -> usize {
        self.count(MockCallKind::Embedding)
    }

    fn count(&self, kind: MockCallKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind == kind).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not poison the others
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, kind: MockCallKind, input: &str) {
        self.lock().calls.push(MockCall {
            kind,
            input: input.to_string(),
        });
    }

    /// Pick an account from the prompt
    fn decide(&self, prompt: &str) -> String {
        let field = |name: &str| -> String {
            Regex::new(&format!(r"(?m)^{}: (.*)$", name))
                .ok()
                .and_then(|re| re.captures(prompt).map(|c| c[1].trim().to_string()))
                .unwrap_or_default()
        };
        let tx_text = format!("{} {}", field("Payee"), field("Description")).to_lowercase();

        let state = self.lock();
        if state.malformed_on.iter().any(|k| tx_text.contains(k)) {
            return "I think this belongs in office supplies.".to_string();
        }

        let candidates = parse_candidates(prompt);
        if candidates.is_empty() {
            return r#"{"suggested_account_id": null, "confidence": 0, "reasoning": ""}"#
                .to_string();
        }

        // Approved history wins
        let history = parse_history(prompt);
        let approved = most_common(&history).filter(|id| candidates.iter().any(|c| c.id == *id));
        if let Some(id) = approved {
            return answer(id, 0.9, "Matches similar approved transactions");
        }

        for (keyword, account_name) in &state.hints {
            if tx_text.contains(keyword) {
                if let Some(c) = candidates
                    .iter()
                    .find(|c| c.text.starts_with(&account_name.to_lowercase()))
                {
                    return answer(c.id, 0.85, &format!("Merchant sells {}", account_name));
                }
            }
        }

        let tx_words = words(&tx_text);
        let best = candidates
            .iter()
            .map(|c| {
                let overlap = words(&c.text)
                    .iter()
                    .filter(|w| tx_words.contains(*w))
                    .count();
                (overlap, c.id)
            })
            .filter(|(overlap, _)| *overlap > 0)
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        match best {
            Some((_, id)) => answer(id, 0.6, "Description overlaps the account"),
            None => answer(candidates[0].id, 0.3, "Best available guess"),
        }
    }
}

struct Candidate {
    id: i64,
    /// lowercase account line without the id tag
    text: String,
}

fn parse_candidates(prompt: &str) -> Vec<Candidate> {
    let Ok(re) = Regex::new(r"(?m)^- (.+) \[ID: (\d+)\]\s*$") else {
        return Vec::new();
    };
    re.captures_iter(prompt)
        .filter_map(|c| {
            Some(Candidate {
                id: c[2].parse().ok()?,
                text: c[1].to_lowercase(),
            })
        })
        .collect()
}

fn parse_history(prompt: &str) -> Vec<i64> {
    let Ok(re) = Regex::new(r"Categorized to account ID (\d+)") else {
        return Vec::new();
    };
    re.captures_iter(prompt)
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

fn most_common(ids: &[i64]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for id in ids {
        *counts.entry(*id).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(id, _)| id)
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

fn answer(id: i64, confidence: f64, reasoning: &str) -> String {
    serde_json::json!({
        "suggested_account_id": id,
        "confidence": confidence,
        "reasoning": reasoning,
    })
    .to_string()
}

/// FNV-1a
fn hash_word(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete_json(&self, _system: Option<&str>, prompt: &str) -> Result<String> {
        self.record(MockCallKind::Completion, prompt);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.decide(prompt))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.record(MockCallKind::Embedding, text);

        let lower = text.to_lowercase();
        if self.lock().embed_errors_on.iter().any(|k| lower.contains(k)) {
            return Err(Error::InvalidData("Mock embedding failure".into()));
        }

        let mut v = vec![0.0_f32; self.dimensions.max(1)];
        for word in lower.split_whitespace() {
            let idx = (hash_word(word) % v.len() as u64) as usize;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn embedding_model(&self) -> &str {
        "mock-embedding"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::cosine_similarity;

    const PROMPT: &str = "Transaction:\nPayee: Staples\nDescription: Printer paper\nAmount: -42.50\n\n\
        Chart of accounts:\n- Travel (Expense): Flights and hotels [ID: 3]\n\
        - Office Supplies (Expense): Paper and pens [ID: 7]\n";

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let mock = MockBackend::new();
        let a = mock.embed("Staples Printer paper -42.5").await.unwrap();
        let b = mock.embed("Staples Printer paper -42.5").await.unwrap();
        let c = mock.embed("Delta flight to Denver").await.unwrap();
        assert_eq!(a.len(), MOCK_DIMENSIONS);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
        assert!(cosine_similarity(&a, &c) < 0.5);
        assert_eq!(mock.embedding_count(), 3);
    }

    #[tokio::test]
    async fn test_completion_picks_overlapping_account() {
        let mock = MockBackend::new();
        let out = mock.complete_json(None, PROMPT).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["suggested_account_id"], 7);
        assert_eq!(mock.completion_count(), 1);
    }

    #[tokio::test]
    async fn test_hint_and_history() {
        let mock = MockBackend::new().hint("staples", "Travel");
        let out = mock.complete_json(None, PROMPT).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["suggested_account_id"], 3);

        let with_history = format!(
            "{}\n- Staples (Paper): Categorized to account ID 7\n",
            PROMPT
        );
        let out = mock.complete_json(None, &with_history).await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["suggested_account_id"], 7);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mock = MockBackend::new()
            .malformed_on("staples")
            .embed_error_on("broken");
        let out = mock.complete_json(None, PROMPT).await.unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&out).is_err());
        assert!(mock.embed("broken text").await.is_err());
    }
}
