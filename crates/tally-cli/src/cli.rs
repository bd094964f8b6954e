//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Sync bookkeeping data and suggest account categories
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Multi-tenant QuickBooks sync and transaction categorization", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Pipeline config file (defaults to the override location, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage tenants (list, add)
    Tenants {
        #[command(subcommand)]
        action: Option<TenantsAction>,
    },

    /// Store QuickBooks credentials for a tenant
    Connect {
        /// Tenant ID (created if missing)
        tenant: String,

        /// QuickBooks company (realm) ID
        #[arg(long)]
        realm: String,

        /// OAuth access token
        #[arg(long)]
        access_token: String,

        /// OAuth refresh token
        #[arg(long)]
        refresh_token: String,

        /// Access token lifetime in seconds
        #[arg(long, default_value = "3600")]
        expires_in: i64,

        /// Refresh token lifetime in seconds
        #[arg(long, default_value = "8726400")]
        refresh_expires_in: i64,
    },

    /// Sync tenants from QuickBooks and categorize new transactions
    Sync {
        /// Tenant to sync
        #[arg(long, conflicts_with = "all")]
        tenant: Option<String>,

        /// Sync every connected tenant
        #[arg(long)]
        all: bool,

        /// Skip the categorization pass
        #[arg(long)]
        no_categorize: bool,
    },

    /// Run a categorization pass without syncing
    Categorize {
        /// Tenant ID
        #[arg(long)]
        tenant: String,

        /// Give dead-lettered transactions another chance first
        #[arg(long)]
        retry_failed: bool,
    },

    /// Review suggestions (list, approve)
    Review {
        /// Tenant ID
        #[arg(long)]
        tenant: String,

        #[command(subcommand)]
        action: Option<ReviewAction>,
    },

    /// Manage reconciliation rules (list, add, delete, test)
    Rules {
        /// Tenant ID
        #[arg(long)]
        tenant: String,

        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// List a tenant's chart of accounts
    Accounts {
        /// Tenant ID
        #[arg(long)]
        tenant: String,
    },

    /// List a tenant's transactions
    Transactions {
        /// Tenant ID
        #[arg(long)]
        tenant: String,

        /// Filter by status (pending, approved)
        #[arg(long)]
        status: Option<String>,

        /// Number of transactions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// Show database, backend and per-tenant status
    Status,

    /// Manage AI prompts (list, show)
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Sync all tenants on a fixed interval until interrupted
    Watch {
        /// Minutes between runs
        #[arg(long, default_value = "15")]
        interval_mins: u64,
    },
}

#[derive(Subcommand)]
pub enum TenantsAction {
    /// List tenants and whether they are connected
    List,

    /// Create or rename a tenant
    Add {
        /// Tenant ID
        id: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReviewAction {
    /// List suggestions awaiting approval
    List {
        /// Number of suggestions to show
        #[arg(short = 'n', long, default_value = "50")]
        limit: i64,
    },

    /// Approve a suggestion, optionally choosing a different account
    Approve {
        /// Transaction ID
        id: i64,

        /// Account ID or name to assign instead of the suggestion
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules
    List,

    /// Add a keyword rule
    Add {
        /// Keyword matched (case-insensitive) against payee and description
        keyword: String,

        /// Target account ID or name
        #[arg(long)]
        account: String,

        /// Optional classification tag (e.g. "transfer")
        #[arg(long)]
        match_type: Option<String>,
    },

    /// Delete a rule by ID
    Delete {
        /// Rule ID
        id: i64,
    },

    /// Show which rule would match a payee/description
    Test {
        /// Payee name
        payee: String,

        /// Description or memo
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and whether they are overridden
    List,

    /// Show a prompt's content
    Show {
        /// Prompt ID (e.g. "categorize_transaction")
        id: String,
    },
}
