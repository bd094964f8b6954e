//! Tally CLI - QuickBooks sync and transaction categorization
//!
//! Usage:
//!   tally init                                   Initialize database
//!   tally connect acme --realm R --access-token A --refresh-token R
//!   tally sync --all                             Sync and categorize every tenant
//!   tally review --tenant acme                   Show suggestions awaiting approval
//!   tally watch --interval-mins 15               Sync on a schedule

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Tenants { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(TenantsAction::List) => commands::cmd_tenants_list(&db),
                Some(TenantsAction::Add { id, name }) => {
                    commands::cmd_tenants_add(&db, &id, name.as_deref())
                }
            }
        }
        Commands::Connect {
            tenant,
            realm,
            access_token,
            refresh_token,
            expires_in,
            refresh_expires_in,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_connect(
                &db,
                &tenant,
                &realm,
                &access_token,
                &refresh_token,
                expires_in,
                refresh_expires_in,
            )
        }
        Commands::Sync {
            tenant,
            all,
            no_categorize,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            let target = match (tenant, all) {
                (Some(tenant), false) => commands::SyncTarget::Tenant(tenant),
                (None, true) => commands::SyncTarget::All,
                _ => anyhow::bail!("Pass --tenant <ID> or --all"),
            };
            commands::cmd_sync(db, &config, target, no_categorize).await
        }
        Commands::Categorize {
            tenant,
            retry_failed,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_categorize(db, &config, &tenant, retry_failed).await
        }
        Commands::Review { tenant, action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_review_list(&db, &tenant, 50),
                Some(ReviewAction::List { limit }) => {
                    commands::cmd_review_list(&db, &tenant, limit)
                }
                Some(ReviewAction::Approve { id, account }) => {
                    commands::cmd_review_approve(&db, &tenant, id, account.as_deref())
                }
            }
        }
        Commands::Rules { tenant, action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(RulesAction::List) => commands::cmd_rules_list(&db, &tenant),
                Some(RulesAction::Add {
                    keyword,
                    account,
                    match_type,
                }) => {
                    commands::cmd_rules_add(&db, &tenant, &keyword, &account, match_type.as_deref())
                }
                Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, &tenant, id),
                Some(RulesAction::Test { payee, description }) => {
                    let config = commands::load_config(config_path)?;
                    commands::cmd_rules_test(
                        &db,
                        &tenant,
                        &payee,
                        &description,
                        config.categorization.rule_priority,
                    )
                }
            }
        }
        Commands::Accounts { tenant } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_accounts(&db, &tenant)
        }
        Commands::Transactions {
            tenant,
            status,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transactions_list(&db, &tenant, status.as_deref(), limit)
        }
        Commands::Status => {
            let config = commands::load_config(config_path)?;
            commands::cmd_status(&cli.db, cli.no_encrypt, &config)
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { id }) => commands::cmd_prompts_show(&id),
        },
        Commands::Watch { interval_mins } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_watch(db, &config, interval_mins).await
        }
    }
}
