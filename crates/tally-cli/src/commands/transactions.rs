//! Account and transaction listings

use anyhow::Result;
use tally_core::db::Database;
use tally_core::models::TransactionStatus;

use super::truncate;

pub fn cmd_accounts(db: &Database, tenant_id: &str) -> Result<()> {
    let accounts = db.list_accounts(tenant_id)?;

    if accounts.is_empty() {
        println!("No accounts for {}. Run: tally sync --tenant {}", tenant_id, tenant_id);
        return Ok(());
    }

    println!();
    println!("📒 Chart of accounts ({})", accounts.len());
    println!(
        "   {:>5}  {:<10} {:<32} {:<14} {}",
        "ID", "QBO ID", "NAME", "CLASS", "SUBTYPE"
    );
    println!("   {}", "-".repeat(80));

    for account in accounts {
        println!(
            "   {:>5}  {:<10} {:<32} {:<14} {}",
            account.id,
            truncate(&account.external_id, 10),
            truncate(&account.name, 32),
            account.classification.as_deref().unwrap_or("-"),
            account.account_sub_type.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

pub fn cmd_transactions_list(
    db: &Database,
    tenant_id: &str,
    status: Option<&str>,
    limit: i64,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<TransactionStatus>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;
    let transactions = db.list_transactions(tenant_id, status, limit)?;

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:>6}  {:<10}  {:<28} {:>10}  {:<9} {}",
        "ID", "DATE", "PAYEE", "AMOUNT", "STATUS", "NOTE"
    );
    println!("{}", "-".repeat(90));

    for tx in transactions {
        let date = tx
            .transaction_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let note = match tx.ai_suggested_account_id {
            Some(id) => format!("suggested #{}", id),
            None if tx.ai_attempts > 0 => format!(
                "{} failed attempt(s): {}",
                tx.ai_attempts,
                truncate(tx.ai_last_error.as_deref().unwrap_or(""), 40)
            ),
            None => String::new(),
        };

        println!(
            "{:>6}  {:<10}  {:<28} {:>10.2}  {:<9} {}",
            tx.id,
            date,
            truncate(tx.payee_name.as_deref().unwrap_or(""), 28),
            tx.amount,
            tx.status,
            note
        );
    }

    Ok(())
}
