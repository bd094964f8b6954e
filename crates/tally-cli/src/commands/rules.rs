//! Reconciliation rule commands

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tally_core::db::Database;
use tally_core::{RuleMatcher, RulePriority};

use super::resolve_account;

pub fn cmd_rules_list(db: &Database, tenant_id: &str) -> Result<()> {
    let rules = db.list_rules(tenant_id)?;

    if rules.is_empty() {
        println!("No rules for {}.", tenant_id);
        println!(
            "Add one with: tally rules --tenant {} add <keyword> --account <ID or name>",
            tenant_id
        );
        return Ok(());
    }

    let names: HashMap<i64, String> = db
        .list_accounts(tenant_id)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    println!();
    println!("📏 Rules ({})", rules.len());
    println!("   {:>5}  {:<28} {:<28} {}", "ID", "KEYWORD", "ACCOUNT", "TYPE");
    println!("   {}", "-".repeat(72));

    for rule in rules {
        let account = names
            .get(&rule.target_account_id)
            .cloned()
            .unwrap_or_else(|| format!("#{} (missing)", rule.target_account_id));
        println!(
            "   {:>5}  {:<28} {:<28} {}",
            rule.id,
            super::truncate(&rule.keyword, 28),
            super::truncate(&account, 28),
            rule.match_type.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

pub fn cmd_rules_add(
    db: &Database,
    tenant_id: &str,
    keyword: &str,
    account: &str,
    match_type: Option<&str>,
) -> Result<()> {
    let account = resolve_account(db, tenant_id, account)?;
    let id = db.create_rule(tenant_id, keyword, account.id, match_type)?;

    println!(
        "✅ Rule {}: \"{}\" → {}",
        id,
        keyword.trim(),
        account.name
    );
    Ok(())
}

pub fn cmd_rules_delete(db: &Database, tenant_id: &str, id: i64) -> Result<()> {
    db.delete_rule(tenant_id, id)?;
    println!("🗑️  Deleted rule {}", id);
    Ok(())
}

/// Show which rule the categorization pass would apply
pub fn cmd_rules_test(
    db: &Database,
    tenant_id: &str,
    payee: &str,
    description: &str,
    priority: RulePriority,
) -> Result<()> {
    let accounts = db.list_accounts(tenant_id)?;
    let account_ids: HashSet<i64> = accounts.iter().map(|a| a.id).collect();
    let matcher = RuleMatcher::new(db.list_rules(tenant_id)?, &account_ids, priority);

    match matcher.find(payee, description) {
        Some(rule) => {
            let account = accounts
                .iter()
                .find(|a| a.id == rule.target_account_id)
                .map(|a| a.name.as_str())
                .unwrap_or("?");
            println!(
                "✓ Rule {} matches (\"{}\") → {}",
                rule.id, rule.keyword, account
            );
        }
        None => println!(
            "No rule matches; the model would decide ({} rule(s) checked)",
            matcher.len()
        ),
    }

    Ok(())
}
