//! Tally Core Library
//!
//! Shared functionality for the Tally bookkeeping pipeline:
//! - Encrypted multi-tenant store (credentials, chart of accounts, transactions, rules)
//! - Accounting platform client (QuickBooks Online) and token refresh
//! - Paginated fetch and idempotent reconciliation upserts
//! - Rule matching, embeddings and similarity retrieval
//! - Model-backed categorization with pluggable AI backends
//! - Per-tenant sync orchestration
//! - Prompt library for customizable AI prompts

pub mod accounting;
pub mod ai;
pub mod categorize;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod models;
pub mod prompts;
pub mod rules;
pub mod sync;
pub mod token;
pub mod vector;

/// Test utilities including mock QuickBooks and OpenAI-compatible servers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use accounting::{AccountingApi, QboEnvironment, QuickBooksClient};
pub use ai::{AIBackend, AIClient, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use categorize::{CategorizationEngine, Categorizer};
pub use config::TallyConfig;
pub use db::Database;
pub use embedding::EmbeddingGenerator;
pub use error::{Error, Result};
pub use fetch::DataFetcher;
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use rules::{RuleMatcher, RulePriority};
pub use sync::SyncOrchestrator;
pub use token::{TokenManager, ValidCredential};
