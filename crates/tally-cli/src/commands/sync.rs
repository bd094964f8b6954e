//! Sync, categorize and watch commands

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tally_core::models::{CategorizationSummary, SyncSummary};
use tally_core::{
    CategorizationEngine, Categorizer, Database, PromptLibrary, SyncOrchestrator, TallyConfig,
};
use tokio::time::interval;
use tracing::{error, info, warn};

use super::{accounting_client, ai_client};

/// Which tenants a sync run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    Tenant(String),
    All,
}

/// Categorization engine from the environment's AI backend and the prompt library
fn build_engine(db: &Database, config: &TallyConfig) -> Result<CategorizationEngine> {
    let ai = ai_client(config)?;
    let mut prompts = PromptLibrary::new();
    CategorizationEngine::from_config(db.clone(), ai, &mut prompts, config)
        .context("Failed to load categorization prompt")
}

fn build_orchestrator(
    db: &Database,
    config: &TallyConfig,
    categorize: bool,
) -> Result<SyncOrchestrator> {
    let api = accounting_client()?;

    let categorizer: Option<Arc<dyn Categorizer>> = if categorize {
        match build_engine(db, config) {
            Ok(engine) => Some(Arc::new(engine)),
            Err(e) => {
                println!("   ⚠️  Categorization disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(SyncOrchestrator::new(db.clone(), api, categorizer, config))
}

pub async fn cmd_sync(
    db: Database,
    config: &TallyConfig,
    target: SyncTarget,
    no_categorize: bool,
) -> Result<()> {
    let orchestrator = build_orchestrator(&db, config, !no_categorize)?;

    match target {
        SyncTarget::Tenant(tenant_id) => {
            println!("🔄 Syncing {}...", tenant_id);
            let summary = orchestrator.sync_tenant(&tenant_id).await?;
            print_sync_summary(&summary);
        }
        SyncTarget::All => {
            println!("🔄 Syncing all connected tenants...");
            let failed = run_all(&orchestrator).await?;
            if failed > 0 {
                anyhow::bail!("{} tenant(s) failed to sync", failed);
            }
        }
    }

    Ok(())
}

pub async fn cmd_categorize(
    db: Database,
    config: &TallyConfig,
    tenant_id: &str,
    retry_failed: bool,
) -> Result<()> {
    if db.get_tenant(tenant_id)?.is_none() {
        anyhow::bail!("Tenant {} not found", tenant_id);
    }

    if retry_failed {
        let reset = db.reset_failed_attempts(tenant_id)?;
        println!("♻️  Reset {} failed transaction(s)", reset);
    }

    let engine = build_engine(&db, config)?;
    println!("🤖 Categorizing {}...", tenant_id);
    let summary = engine.run(tenant_id).await?;
    print_categorization_summary(&summary);

    Ok(())
}

/// Sync every connected tenant each `interval_mins` until Ctrl-C
pub async fn cmd_watch(db: Database, config: &TallyConfig, interval_mins: u64) -> Result<()> {
    if interval_mins == 0 {
        anyhow::bail!("--interval-mins must be at least 1");
    }

    let orchestrator = build_orchestrator(&db, config, true)?;
    println!(
        "👀 Syncing all tenants every {} minute(s). Press Ctrl-C to stop.",
        interval_mins
    );

    let mut ticker = interval(Duration::from_secs(interval_mins * 60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("Running scheduled sync...");
                match run_all(&orchestrator).await {
                    Ok(0) => info!("Scheduled sync completed"),
                    Ok(failed) => warn!(failed, "Scheduled sync completed with failures"),
                    Err(e) => error!("Scheduled sync failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("👋 Stopping watch");
                return Ok(());
            }
        }
    }
}

/// Sync all tenants, printing each outcome; returns the number of failures
async fn run_all(orchestrator: &SyncOrchestrator) -> Result<usize> {
    let outcomes = orchestrator.sync_all().await?;
    if outcomes.is_empty() {
        println!("   No connected tenants. Add one with: tally connect");
        return Ok(0);
    }

    let mut failed = 0;
    for (tenant_id, outcome) in outcomes {
        match outcome {
            Ok(summary) => print_sync_summary(&summary),
            Err(e) => {
                println!("   ❌ {}: {}", tenant_id, e);
                failed += 1;
            }
        }
    }
    Ok(failed)
}

fn print_sync_summary(summary: &SyncSummary) {
    println!(
        "   ✓ {}: {} account(s), {} transaction(s) fetched",
        summary.tenant_id, summary.accounts_fetched, summary.transactions_fetched
    );
    match summary.categorization {
        Some(ref categorization) => print_categorization_summary(categorization),
        None => println!("     Categorization: skipped"),
    }
}

fn print_categorization_summary(summary: &CategorizationSummary) {
    println!(
        "     Categorized {} of {}: {} by rule, {} by model, {} failed",
        summary.by_rule + summary.by_model,
        summary.selected,
        summary.by_rule,
        summary.by_model,
        summary.failed
    );
}
