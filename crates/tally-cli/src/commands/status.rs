//! Status command

use std::path::Path;

use anyhow::Result;
use tally_core::ai::AIBackend;
use tally_core::TallyConfig;

use super::{ai_client, open_db};

pub fn cmd_status(db_path: &Path, no_encrypt: bool, config: &TallyConfig) -> Result<()> {
    use std::fs;
    use tally_core::db::DB_KEY_ENV;

    println!();
    println!("📊 Tally Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    // Backends
    match ai_client(config) {
        Ok(ai) => println!(
            "   AI: {} ({}, embeddings {}) at {}",
            ai.backend_name(),
            ai.model(),
            ai.embedding_model(),
            ai.host()
        ),
        Err(_) => println!("   AI: not configured (set AI_BACKEND / OPENAI_COMPATIBLE_HOST)"),
    }
    let qbo = std::env::var("QBO_CLIENT_ID").is_ok() && std::env::var("QBO_CLIENT_SECRET").is_ok();
    println!(
        "   QuickBooks: {}",
        if qbo { "configured" } else { "not configured (set QBO_CLIENT_ID / QBO_CLIENT_SECRET)" }
    );

    if !db_path.exists() {
        return Ok(());
    }

    let db = match open_db(db_path, no_encrypt) {
        Ok(db) => db,
        Err(e) => {
            println!();
            println!("   ❌ Error opening database: {}", e);
            if !no_encrypt && !has_key {
                println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
            } else if has_key {
                println!("      Check that {} matches the key used to create it", DB_KEY_ENV);
            }
            return Ok(());
        }
    };

    let max_attempts = config.categorization.max_attempts;
    for tenant in db.list_tenants()? {
        let stats = db.get_tenant_stats(&tenant.id, max_attempts)?;
        println!();
        println!("   🏢 {} ({})", tenant.name, tenant.id);
        println!(
            "      Accounts: {}   Rules: {}   Transactions: {}",
            stats.accounts, stats.rules, stats.transactions
        );
        println!(
            "      Awaiting suggestion: {}   Awaiting review: {}   Approved: {}",
            stats.awaiting_suggestion, stats.awaiting_review, stats.approved
        );
        if stats.dead_lettered > 0 {
            println!(
                "      ⚠️  {} transaction(s) failed {} times (tally categorize --retry-failed)",
                stats.dead_lettered, max_attempts
            );
        }

        for op in db.get_ai_stats(&tenant.id)? {
            println!(
                "      AI {}: {} call(s), {:.0}% ok, {:.0} ms avg",
                op.operation,
                op.call_count,
                op.success_rate * 100.0,
                op.avg_latency_ms
            );
        }
    }

    Ok(())
}
