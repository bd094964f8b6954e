//! Prompt library
//!
//! Prompts are markdown files with YAML frontmatter and `# System` / `# User`
//! sections. Defaults are compiled into the binary; a file with the same name
//! in the override directory (~/.local/share/tally/prompts/overrides) wins.
//!
//! Templates use `{{var}}` substitution and `{{#if var}}...{{/if}}` blocks
//! that are kept only when `var` is non-empty.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

mod defaults {
    pub const CATEGORIZE_TRANSACTION: &str =
        include_str!("../../../prompts/categorize_transaction.md");
}

/// Known prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Choose an account for a transaction
    CategorizeTransaction,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CategorizeTransaction => "categorize_transaction",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::CategorizeTransaction]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::CategorizeTransaction => defaults::CATEGORIZE_TRANSACTION,
        }
    }
}

impl std::str::FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("Unknown prompt: {}", s))
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Bumped whenever the wording changes
    pub version: u32,
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// Body after the frontmatter
    pub content: String,
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the user section (or the whole body if it has none)
    pub fn render_user(&self, vars: &HashMap<&str, String>) -> String {
        render_template(self.user_section().unwrap_or(&self.content), vars)
    }

    /// Render the system section
    pub fn render_system(&self, vars: &HashMap<&str, String>) -> Option<String> {
        self.system_section().map(|s| render_template(s, vars))
    }
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with the default override directory
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// No override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("Prompt {}", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(ref override_dir) = self.override_dir {
            let override_path = override_dir.join(format!("{}.md", id.as_str()));
            if override_path.exists() {
                let content = fs::read_to_string(&override_path).map_err(|e| {
                    Error::Config(format!(
                        "Failed to read prompt override {}: {}",
                        override_path.display(),
                        e
                    ))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Prompt {
                    metadata,
                    content: body,
                    is_override: true,
                    override_path: Some(override_path),
                });
            }
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    /// Whether a prompt has an override file
    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_dir
            .as_ref()
            .is_some_and(|d| d.join(format!("{}.md", id.as_str())).exists())
    }

    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::Config(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::Config("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Config(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}

/// Resolve conditionals, then substitute `{{name}}` in one left-to-right pass.
///
/// Inserted values are never scanned again. Unknown placeholders are kept.
fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let resolved = resolve_conditionals(template, vars);
    let mut result = String::with_capacity(resolved.len());
    let mut rest = resolved.as_str();

    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            rest = &rest[open..];
            break;
        };

        let name = &after_open[..close];
        match vars.get(name.trim()) {
            Some(value) => result.push_str(value),
            None => {
                result.push_str("{{");
                result.push_str(name);
                result.push_str("}}");
            }
        }
        rest = &after_open[close + 2..];
    }

    result.push_str(rest);
    result
}

fn resolve_conditionals(content: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_end) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = result[var_start..var_start + var_end].trim().to_string();
        let block_start = var_start + var_end + 2;

        let Some(endif_pos) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let block_content = result[block_start..block_start + endif_pos].to_string();
        let full_end = block_start + endif_pos + 7;

        let keep = vars
            .get(var_name.as_str())
            .is_some_and(|v| !v.trim().is_empty());

        result = if keep {
            format!("{}{}{}", &result[..if_start], block_content, &result[full_end..])
        } else {
            format!("{}{}", &result[..if_start], &result[full_end..])
        };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_parse_prompt() {
        let content = "---\nid: test_prompt\nversion: 2\ntask_type: reasoning\n---\n\n\
            # System\nBe brief.\n\n# User\nHi {{name}}";
        let (meta, body) = parse_prompt(content).unwrap();
        assert_eq!(meta.id, "test_prompt");
        assert_eq!(meta.version, 2);
        assert!(body.starts_with("# System"));
    }

    #[test]
    fn test_parse_prompt_requires_frontmatter() {
        assert!(parse_prompt("# User\nhello").is_err());
        assert!(parse_prompt("---\nid: x\n").is_err());
    }

    #[test]
    fn test_conditional_blocks() {
        let template = "A{{#if history}}\nH: {{history}}{{/if}}\nB";
        assert_eq!(render_template(template, &vars(&[])), "A\nB");
        assert_eq!(
            render_template(template, &vars(&[("history", "x")])),
            "A\nH: x\nB"
        );
        assert_eq!(
            render_template(template, &vars(&[("history", "  ")])),
            "A\nB"
        );
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let out = render_template("P: {{payee}}", &vars(&[("payee", "{{#if x}}weird")]));
        assert_eq!(out, "P: {{#if x}}weird");
    }

    #[test]
    fn test_placeholders_inside_values_stay_literal() {
        let vars = vars(&[
            ("description", "note {{accounts}}"),
            ("accounts", "- Secret [ID: 9]"),
        ]);
        for _ in 0..50 {
            assert_eq!(
                render_template("D: {{description}}\n{{accounts}}", &vars),
                "D: note {{accounts}}\n- Secret [ID: 9]"
            );
        }
    }

    #[test]
    fn test_unknown_and_unclosed_placeholders_are_kept() {
        let vars = vars(&[("payee", "Uber")]);
        assert_eq!(
            render_template("{{payee}} {{missing}} {{payee", &vars),
            "Uber {{missing}} {{payee"
        );
    }

    #[test]
    fn test_default_categorize_prompt() {
        let mut lib = PromptLibrary::embedded_only();
        let prompt = lib.get(PromptId::CategorizeTransaction).unwrap();
        assert_eq!(prompt.metadata.id, "categorize_transaction");
        assert!(!prompt.is_override);
        assert!(prompt.system_section().unwrap().contains("bookkeeper"));

        let user = prompt.render_user(&vars(&[
            ("payee", "Staples"),
            ("description", "Paper"),
            ("amount", "-42.50"),
            ("date", "2024-03-01"),
            ("accounts", "- Office Supplies (Expense) [ID: 7]"),
        ]));
        assert!(user.contains("Payee: Staples"));
        assert!(user.contains("[ID: 7]"));
        assert!(!user.contains("{{"));
        assert!(!user.contains("already approved"));
    }

    #[test]
    fn test_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("categorize_transaction.md"),
            "---\nid: categorize_transaction\nversion: 9\ntask_type: custom\n---\n\
             # User\nCustom {{payee}}",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path().to_path_buf());
        assert!(lib.has_override(PromptId::CategorizeTransaction));
        let prompt = lib.get(PromptId::CategorizeTransaction).unwrap();
        assert!(prompt.is_override);
        assert_eq!(prompt.metadata.version, 9);
        assert_eq!(
            prompt.render_user(&vars(&[("payee", "Uber")])),
            "Custom Uber"
        );
    }

    #[test]
    fn test_prompt_id_parse() {
        assert_eq!(
            "categorize_transaction".parse::<PromptId>().unwrap(),
            PromptId::CategorizeTransaction
        );
        assert!("nope".parse::<PromptId>().is_err());
    }
}
