//! Tenant and connection commands

use anyhow::{Context, Result};
use chrono::Utc;
use tally_core::db::Database;
use tally_core::models::{NewConnection, TokenGrant};

pub fn cmd_tenants_list(db: &Database) -> Result<()> {
    let tenants = db.list_tenants()?;

    if tenants.is_empty() {
        println!("No tenants yet. Add one with: tally tenants add <id>");
        return Ok(());
    }

    println!();
    println!("🏢 Tenants ({})", tenants.len());
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   {:<20} {:<28} {}", "ID", "NAME", "CONNECTION");

    for tenant in tenants {
        let connection = match db.get_connection(&tenant.id)? {
            Some(conn) if conn.refresh_token_expires_at <= Utc::now() => {
                "❌ refresh token expired".to_string()
            }
            Some(conn) => format!("✓ realm {}", conn.realm_id),
            None => "-".to_string(),
        };
        println!(
            "   {:<20} {:<28} {}",
            super::truncate(&tenant.id, 20),
            super::truncate(&tenant.name, 28),
            connection
        );
    }

    Ok(())
}

pub fn cmd_tenants_add(db: &Database, id: &str, name: Option<&str>) -> Result<()> {
    let id = id.trim();
    if id.is_empty() {
        anyhow::bail!("Tenant ID cannot be empty");
    }

    let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(id);
    db.upsert_tenant(id, name)
        .context("Failed to save tenant")?;

    println!("✅ Tenant {} ({})", id, name);
    Ok(())
}

/// Store credentials obtained from the OAuth consent flow
pub fn cmd_connect(
    db: &Database,
    tenant_id: &str,
    realm_id: &str,
    access_token: &str,
    refresh_token: &str,
    expires_in: i64,
    refresh_expires_in: i64,
) -> Result<()> {
    if expires_in <= 0 || refresh_expires_in <= 0 {
        anyhow::bail!("Token lifetimes must be positive");
    }

    let grant = TokenGrant {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        expires_in,
        refresh_expires_in,
    };
    let connection = NewConnection::from_grant(realm_id, &grant, Utc::now());
    db.upsert_connection(tenant_id, &connection)
        .context("Failed to save connection")?;

    println!("🔗 Connected {} to QuickBooks realm {}", tenant_id, realm_id);
    println!(
        "   Access token expires:  {}",
        connection.access_token_expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "   Refresh token expires: {}",
        connection.refresh_token_expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}
