//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Pipeline config from a file or the defaults
//! - `accounting_client` / `ai_client` - Backends from the environment
//! - `resolve_account` - Look up an account by ID or name
//! - `cmd_init` - Initialize the database

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tally_core::config::default_config_path;
use tally_core::models::Account;
use tally_core::{AIClient, AccountingApi, Database, QuickBooksClient, TallyConfig};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load pipeline config from `path`, or the override location, or the built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<TallyConfig> {
    match path {
        Some(path) => TallyConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => TallyConfig::load().context("Failed to load config"),
    }
}

/// QuickBooks client from QBO_* environment variables
pub fn accounting_client() -> Result<Arc<dyn AccountingApi>> {
    let client = QuickBooksClient::from_env()
        .context("QuickBooks is not configured: set QBO_CLIENT_ID and QBO_CLIENT_SECRET")?;
    Ok(Arc::new(client))
}

/// AI backend from AI_BACKEND and its host/model variables
pub fn ai_client(config: &TallyConfig) -> Result<AIClient> {
    AIClient::from_env_with_timeout(config.ai.timeout).context(
        "AI backend is not configured: set OPENAI_COMPATIBLE_HOST, \
         or OLLAMA_HOST with AI_BACKEND=ollama, or AI_BACKEND=mock",
    )
}

/// Find one of a tenant's accounts by local ID or exact name
pub fn resolve_account(db: &Database, tenant_id: &str, id_or_name: &str) -> Result<Account> {
    let account = match id_or_name.trim().parse::<i64>() {
        Ok(id) => db.get_account(tenant_id, id)?,
        Err(_) => db.find_account_by_name(tenant_id, id_or_name.trim())?,
    };
    account.with_context(|| format!("Account '{}' not found for tenant {}", id_or_name, tenant_id))
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    if let Some(path) = default_config_path() {
        println!("   Config overrides: {}", path.display());
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!(
        "  1. Connect a tenant: tally connect <tenant> --realm <id> \
         --access-token <t> --refresh-token <t>"
    );
    println!("  2. Sync it: tally sync --tenant <tenant>");
    println!("  3. Review suggestions: tally review --tenant <tenant>");

    Ok(())
}
