//! Pluggable AI backend abstraction
//!
//! The categorization pipeline needs two things from a model provider:
//! a JSON-constrained completion and a text embedding.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai_compatible, ollama, mock). Default: openai_compatible
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (default: https://api.openai.com when a key is set)
//! - `OPENAI_COMPATIBLE_MODEL`: Chat model (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_EMBEDDING_MODEL`: Embedding model (default: text-embedding-3-small)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key (falls back to `OPENAI_API_KEY`)
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Chat model (default: llama3.2)
//! - `OLLAMA_EMBEDDING_MODEL`: Embedding model (default: nomic-embed-text)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::{MockBackend, MockCall, MockCallKind};
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Default HTTP timeout for model calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Run a prompt whose answer must be a single JSON object.
    ///
    /// Returns the raw model text; callers parse and validate it.
    async fn complete_json(&self, system: Option<&str>, prompt: &str) -> Result<String>;

    /// Embed text into a dense vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Chat model name
    fn model(&self) -> &str;

    /// Embedding model name
    fn embedding_model(&self) -> &str;

    /// Backend host URL
    fn host(&self) -> &str;
}

/// Concrete AI client
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI or any server implementing its chat completions and embeddings API
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use.
    /// Returns None if the selected backend isn't configured.
    pub fn from_env() -> Option<Self> {
        Self::from_env_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Same as `from_env` with an explicit HTTP timeout
    pub fn from_env_with_timeout(timeout: Duration) -> Option<Self> {
        let backend =
            std::env::var("AI_BACKEND").unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env(timeout).map(AIClient::OpenAICompatible)
            }
            "ollama" => OllamaBackend::from_env(timeout).map(AIClient::Ollama),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(
                    backend = %backend,
                    "Unknown AI_BACKEND, falling back to openai_compatible"
                );
                OpenAICompatibleBackend::from_env(timeout).map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Backend name for display
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Ollama(_) => "ollama",
            AIClient::Mock(_) => "mock",
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn complete_json(&self, system: Option<&str>, prompt: &str) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete_json(system, prompt).await,
            AIClient::Ollama(b) => b.complete_json(system, prompt).await,
            AIClient::Mock(b) => b.complete_json(system, prompt).await,
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self {
            AIClient::OpenAICompatible(b) => b.embed(text).await,
            AIClient::Ollama(b) => b.embed(text).await,
            AIClient::Mock(b) => b.embed(text).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn embedding_model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.embedding_model(),
            AIClient::Ollama(b) => b.embedding_model(),
            AIClient::Mock(b) => b.embedding_model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Build an HTTP client with a bounded timeout
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout: {}", e);
            reqwest::Client::new()
        })
}
