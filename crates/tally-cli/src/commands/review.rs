//! Suggestion review commands

use anyhow::Result;
use tally_core::db::Database;

use super::{resolve_account, truncate};

pub fn cmd_review_list(db: &Database, tenant_id: &str, limit: i64) -> Result<()> {
    let pending = db.list_pending_review(tenant_id, limit)?;

    if pending.is_empty() {
        println!("Nothing to review for {}.", tenant_id);
        return Ok(());
    }

    println!();
    println!("📝 Suggestions awaiting review ({})", pending.len());
    println!(
        "   {:>6}  {:<10}  {:<24} {:>10}  {:<24} {:>5}  {}",
        "ID", "DATE", "PAYEE", "AMOUNT", "SUGGESTED", "CONF", "SOURCE"
    );
    println!("   {}", "-".repeat(96));

    for item in pending {
        let tx = &item.transaction;
        let date = tx
            .transaction_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let suggested = item
            .suggested_account_name
            .clone()
            .or_else(|| tx.ai_suggested_account_id.map(|id| format!("#{}", id)))
            .unwrap_or_default();
        let confidence = tx
            .ai_confidence_score
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "   {:>6}  {:<10}  {:<24} {:>10.2}  {:<24} {:>5}  {}",
            tx.id,
            date,
            truncate(tx.payee_name.as_deref().unwrap_or(""), 24),
            tx.amount,
            truncate(&suggested, 24),
            confidence,
            tx.ai_source.map(|s| s.as_str()).unwrap_or("-")
        );
        if let Some(ref reasoning) = tx.ai_reasoning {
            println!("           ↳ {}", truncate(reasoning, 88));
        }
    }

    println!();
    println!(
        "Approve with: tally review --tenant {} approve <ID> [--account <ID or name>]",
        tenant_id
    );
    Ok(())
}

pub fn cmd_review_approve(
    db: &Database,
    tenant_id: &str,
    transaction_id: i64,
    account: Option<&str>,
) -> Result<()> {
    let account_override = match account {
        Some(id_or_name) => Some(resolve_account(db, tenant_id, id_or_name)?.id),
        None => None,
    };

    let tx = db.approve_transaction(tenant_id, transaction_id, account_override)?;
    let account_name = match tx.assigned_account_id {
        Some(id) => db
            .get_account(tenant_id, id)?
            .map(|a| a.name)
            .unwrap_or_else(|| format!("#{}", id)),
        None => "-".to_string(),
    };

    println!(
        "✅ Approved transaction {} → {}",
        transaction_id, account_name
    );
    Ok(())
}
