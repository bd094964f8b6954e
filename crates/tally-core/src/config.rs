//! Pipeline configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/config/tally.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their default values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::rules::RulePriority;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/tally.toml");

/// Fetch window and pagination
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub window_days: u32,
    pub page_size: u32,
    pub max_pages: u32,
    pub lease_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            page_size: 1000,
            max_pages: 50,
            lease_ttl: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Refresh when the access token expires within this window
    pub refresh_margin: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(300),
        }
    }
}

/// Categorization engine policy
#[derive(Debug, Clone)]
pub struct CategorizationConfig {
    pub batch_size: u32,
    pub inference_delay: Duration,
    pub similarity_threshold: f32,
    pub similarity_limit: usize,
    /// 0 disables the dead-letter threshold
    pub max_attempts: u32,
    pub item_timeout: Duration,
    pub rule_priority: RulePriority,
    pub denylist: Vec<String>,
}

impl Default for CategorizationConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            inference_delay: Duration::from_millis(200),
            similarity_threshold: 0.8,
            similarity_limit: 5,
            max_attempts: 5,
            item_timeout: Duration::from_secs(60),
            rule_priority: RulePriority::LongestKeyword,
            denylist: vec![
                "Uncategorized".to_string(),
                "Ask My Accountant".to_string(),
                "Suspense".to_string(),
            ],
        }
    }
}

impl CategorizationConfig {
    /// Whether an account name contains a denylisted keyword (case-insensitive)
    pub fn is_denied(&self, account_name: &str) -> bool {
        let name = account_name.to_lowercase();
        self.denylist
            .iter()
            .map(|d| d.trim().to_lowercase())
            .any(|d| !d.is_empty() && name.contains(&d))
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub embedding_dimensions: usize,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: 1536,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct TallyConfig {
    pub sync: SyncConfig,
    pub tokens: TokenConfig,
    pub categorization: CategorizationConfig,
    pub ai: AiConfig,
}

impl TallyConfig {
    /// Load from the default override location, falling back to embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse TOML content on top of the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    /// The embedded default config text
    pub fn default_toml() -> &'static str {
        DEFAULT_CONFIG
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("tally.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<TallyConfig> {
    let path = match override_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            Some(p.to_path_buf())
        }
        None => default_config_path().filter(|p| p.exists()),
    };

    let content = match path {
        Some(p) => fs::read_to_string(&p)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", p.display(), e)))?,
        None => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    sync: Option<RawSync>,
    tokens: Option<RawTokens>,
    categorization: Option<RawCategorization>,
    ai: Option<RawAi>,
}

#[derive(Debug, Deserialize)]
struct RawSync {
    window_days: Option<u32>,
    page_size: Option<u32>,
    max_pages: Option<u32>,
    lease_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawTokens {
    refresh_margin_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawCategorization {
    batch_size: Option<u32>,
    inference_delay_ms: Option<u64>,
    similarity_threshold: Option<f32>,
    similarity_limit: Option<usize>,
    max_attempts: Option<u32>,
    item_timeout_secs: Option<u64>,
    rule_priority: Option<String>,
    denylist: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawAi {
    embedding_dimensions: Option<usize>,
    timeout_secs: Option<u64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<TallyConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = TallyConfig::default();

    if let Some(sync) = raw.sync {
        if let Some(days) = sync.window_days {
            config.sync.window_days = days;
        }
        if let Some(size) = sync.page_size {
            if size == 0 {
                return Err(Error::Config("sync.page_size must be positive".into()));
            }
            config.sync.page_size = size;
        }
        if let Some(pages) = sync.max_pages {
            config.sync.max_pages = pages.max(1);
        }
        if let Some(ttl) = sync.lease_ttl_secs {
            config.sync.lease_ttl = Duration::from_secs(ttl);
        }
    }

    if let Some(tokens) = raw.tokens {
        if let Some(margin) = tokens.refresh_margin_secs {
            config.tokens.refresh_margin = Duration::from_secs(margin);
        }
    }

    if let Some(cat) = raw.categorization {
        if let Some(size) = cat.batch_size {
            config.categorization.batch_size = size;
        }
        if let Some(delay) = cat.inference_delay_ms {
            config.categorization.inference_delay = Duration::from_millis(delay);
        }
        if let Some(threshold) = cat.similarity_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(Error::Config(format!(
                    "categorization.similarity_threshold out of range: {}",
                    threshold
                )));
            }
            config.categorization.similarity_threshold = threshold;
        }
        if let Some(limit) = cat.similarity_limit {
            config.categorization.similarity_limit = limit;
        }
        if let Some(max) = cat.max_attempts {
            config.categorization.max_attempts = max;
        }
        if let Some(timeout) = cat.item_timeout_secs {
            config.categorization.item_timeout = Duration::from_secs(timeout);
        }
        if let Some(priority) = cat.rule_priority {
            config.categorization.rule_priority = priority
                .parse()
                .map_err(|e: String| Error::Config(e))?;
        }
        if let Some(denylist) = cat.denylist {
            config.categorization.denylist = denylist;
        }
    }

    if let Some(ai) = raw.ai {
        if let Some(dims) = ai.embedding_dimensions {
            config.ai.embedding_dimensions = dims;
        }
        if let Some(timeout) = ai.timeout_secs {
            config.ai.timeout = Duration::from_secs(timeout);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.sync.window_days, 30);
        assert_eq!(config.sync.page_size, 1000);
        assert_eq!(config.tokens.refresh_margin, Duration::from_secs(300));
        assert_eq!(config.categorization.batch_size, 20);
        assert_eq!(
            config.categorization.inference_delay,
            Duration::from_millis(200)
        );
        assert_eq!(config.categorization.similarity_limit, 5);
        assert_eq!(config.categorization.max_attempts, 5);
        assert_eq!(
            config.categorization.rule_priority,
            RulePriority::LongestKeyword
        );
        assert_eq!(config.ai.embedding_dimensions, 1536);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = parse_config(
            r#"
            [categorization]
            batch_size = 5
            rule_priority = "first_match"
            "#,
        )
        .unwrap();
        assert_eq!(config.categorization.batch_size, 5);
        assert_eq!(config.categorization.rule_priority, RulePriority::FirstMatch);
        assert_eq!(config.categorization.similarity_limit, 5);
        assert_eq!(config.sync.window_days, 30);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse_config("[categorization]\nrule_priority = \"random\"").is_err());
        assert!(parse_config("[sync]\npage_size = 0").is_err());
        assert!(parse_config("[categorization]\nsimilarity_threshold = 2.5").is_err());
        assert!(parse_config("not toml [").is_err());
    }

    #[test]
    fn test_denylist_is_case_insensitive() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        let cat = &config.categorization;
        assert!(cat.is_denied("Ask My Accountant"));
        assert!(cat.is_denied("uncategorized expense"));
        assert!(cat.is_denied("  SUSPENSE "));
        assert!(cat.is_denied("Uncategorized Asset"));
        assert!(!cat.is_denied("Office Supplies"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync]\nwindow_days = 7").unwrap();

        let config = TallyConfig::load_from(file.path()).unwrap();
        assert_eq!(config.sync.window_days, 7);

        let missing = TallyConfig::load_from(Path::new("/nonexistent/tally.toml"));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
