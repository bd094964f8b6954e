//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config, backend construction)
//! - `prompts` - Prompt library commands
//! - `review` - Suggestion review and approval
//! - `rules` - Reconciliation rule management
//! - `status` - Database and per-tenant status
//! - `sync` - Sync, categorize and watch
//! - `tenants` - Tenant and connection management
//! - `transactions` - Account and transaction listings

pub mod core;
pub mod prompts;
pub mod review;
pub mod rules;
pub mod status;
pub mod sync;
pub mod tenants;
pub mod transactions;

// Re-export command functions for main.rs
pub use core::*;
pub use prompts::*;
pub use review::*;
pub use rules::*;
pub use status::*;
pub use sync::*;
pub use tenants::*;
pub use transactions::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
