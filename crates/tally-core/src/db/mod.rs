//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `tenants` - Tenant records
//! - `connections` - Per-tenant OAuth credentials
//! - `accounts` - Chart of accounts upserts and lookups
//! - `transactions` - Transaction upserts, categorization queue, review
//! - `rules` - Reconciliation rules
//! - `leases` - Per-tenant sync leases
//! - `embedding_cache` - Content-addressed embedding cache
//! - `ai_metrics` - AI call tracking
//!
//! Every query filters by `tenant_id`.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod accounts;
mod ai_metrics;
mod connections;
mod embedding_cache;
mod leases;
mod rules;
mod tenants;
mod transactions;

pub use transactions::UpsertStats;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Timestamp format shared with SQLite's CURRENT_TIMESTAMP
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does, so stored
/// values compare correctly as text
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2. OAuth tokens are stored in this file.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: stored OAuth tokens will be readable by anyone with the file.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"'; PRAGMA foreign_keys = ON;", key);

            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            let manager =
                manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "tally_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block the sync writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Tenants (isolated organizations)
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- OAuth credentials, one row per tenant
            CREATE TABLE IF NOT EXISTS connections (
                tenant_id TEXT PRIMARY KEY REFERENCES tenants(id),
                realm_id TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                access_token_expires_at DATETIME NOT NULL,
                refresh_token_expires_at DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Chart of accounts mirrored from the accounting platform
            CREATE TABLE IF NOT EXISTS chart_of_accounts (
                id INTEGER PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                external_id TEXT NOT NULL,
                name TEXT NOT NULL,
                classification TEXT,
                account_sub_type TEXT,
                description TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(tenant_id, external_id)
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_tenant ON chart_of_accounts(tenant_id);

            -- Transactions mirrored from the accounting platform
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                external_id TEXT NOT NULL,
                payee_name TEXT,
                description TEXT,
                amount REAL NOT NULL,
                transaction_date DATE,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'approved')),
                assigned_account_id INTEGER REFERENCES chart_of_accounts(id),
                ai_suggested_account_id INTEGER REFERENCES chart_of_accounts(id),
                ai_confidence_score REAL
                    CHECK (ai_confidence_score IS NULL
                        OR (ai_confidence_score >= 0 AND ai_confidence_score <= 1)),
                ai_reasoning TEXT,
                ai_source TEXT,                           -- rule, model
                ai_attempts INTEGER NOT NULL DEFAULT 0,   -- failed categorization attempts
                ai_last_attempted_at DATETIME,
                ai_last_error TEXT,
                embedding BLOB,                           -- little-endian f32
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(tenant_id, external_id)
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_queue
                ON transactions(tenant_id, status, ai_suggested_account_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_assigned
                ON transactions(tenant_id, assigned_account_id);

            -- Keyword rules that short-circuit the model
            CREATE TABLE IF NOT EXISTS reconciliation_rules (
                id INTEGER PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                keyword TEXT NOT NULL,
                target_account_id INTEGER NOT NULL REFERENCES chart_of_accounts(id),
                match_type TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_rules_tenant ON reconciliation_rules(tenant_id);

            -- One running sync per tenant
            CREATE TABLE IF NOT EXISTS sync_leases (
                tenant_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                acquired_at DATETIME NOT NULL,
                expires_at DATETIME NOT NULL
            );

            -- Embeddings keyed by normalized text hash
            CREATE TABLE IF NOT EXISTS embedding_cache (
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                model TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (tenant_id, model, content_hash)
            );

            -- AI call tracking
            CREATE TABLE IF NOT EXISTS ai_metrics (
                id INTEGER PRIMARY KEY,
                operation TEXT NOT NULL,                  -- embed, categorize
                model TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                transaction_id INTEGER,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                latency_ms INTEGER NOT NULL,
                success BOOLEAN NOT NULL,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_ai_metrics_tenant ON ai_metrics(tenant_id, operation);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
