//! AI backend response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use serde::{Deserialize, Serialize};

/// A validated categorization decision from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySuggestion {
    /// Local id of the chosen account (one of the offered candidates)
    pub account_id: i64,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub reasoning: String,
}
