//! Reconciliation rule matching
//!
//! A rule fires when its keyword appears (case-insensitively) in a
//! transaction's payee or description. Rule hits are final: no embedding and
//! no model call happen for that transaction.

use std::collections::HashSet;

use tracing::warn;

use crate::models::{ReconciliationRule, Suggestion, SuggestionSource, Transaction};

/// How to choose between several matching rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RulePriority {
    /// Longest keyword wins; lower rule id breaks ties
    #[default]
    LongestKeyword,
    /// First rule in id order
    FirstMatch,
}

impl RulePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LongestKeyword => "longest_keyword",
            Self::FirstMatch => "first_match",
        }
    }
}

impl std::str::FromStr for RulePriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "longest_keyword" => Ok(Self::LongestKeyword),
            "first_match" => Ok(Self::FirstMatch),
            other => Err(format!(
                "Unknown rule priority '{}' (expected longest_keyword or first_match)",
                other
            )),
        }
    }
}

/// Reasoning text stored with a rule-based suggestion
pub fn rule_reasoning(keyword: &str) -> String {
    format!("Matched Reconciliation Rule: \"{}\"", keyword)
}

/// A tenant's rules, prepared for matching
pub struct RuleMatcher {
    /// (rule, lowercase keyword), in id order
    rules: Vec<(ReconciliationRule, String)>,
    priority: RulePriority,
}

impl RuleMatcher {
    /// Build a matcher from a tenant's rules.
    ///
    /// Rules whose target is not in `valid_account_ids` are dropped with a
    /// warning, as are rules with a blank keyword.
    pub fn new(
        mut rules: Vec<ReconciliationRule>,
        valid_account_ids: &HashSet<i64>,
        priority: RulePriority,
    ) -> Self {
        rules.sort_by_key(|r| r.id);
        let rules = rules
            .into_iter()
            .filter_map(|rule| {
                if !valid_account_ids.contains(&rule.target_account_id) {
                    warn!(
                        tenant = %rule.tenant_id,
                        rule_id = rule.id,
                        target = rule.target_account_id,
                        "Ignoring rule whose target is not an account of this tenant"
                    );
                    return None;
                }
                let needle = rule.keyword.trim().to_lowercase();
                if needle.is_empty() {
                    warn!(rule_id = rule.id, "Ignoring rule with empty keyword");
                    return None;
                }
                Some((rule, needle))
            })
            .collect();

        Self { rules, priority }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rule that applies to this payee/description, if any
    pub fn find(&self, payee: &str, description: &str) -> Option<&ReconciliationRule> {
        let payee = payee.to_lowercase();
        let description = description.to_lowercase();
        let mut hits = self
            .rules
            .iter()
            .filter(|(_, needle)| payee.contains(needle) || description.contains(needle));

        let hit = match self.priority {
            RulePriority::FirstMatch => hits.next(),
            // Ties keep the earlier rule
            RulePriority::LongestKeyword => {
                hits.fold(None::<&(ReconciliationRule, String)>, |best, candidate| {
                    match best {
                        Some(b) if b.1.chars().count() >= candidate.1.chars().count() => Some(b),
                        _ => Some(candidate),
                    }
                })
            }
        };
        hit.map(|(rule, _)| rule)
    }

    /// Suggestion for a stored transaction, if a rule matches
    pub fn suggest(&self, transaction: &Transaction) -> Option<Suggestion> {
        let rule = self.find(
            transaction.payee_name.as_deref().unwrap_or_default(),
            transaction.description.as_deref().unwrap_or_default(),
        )?;
        Some(Suggestion {
            account_id: rule.target_account_id,
            confidence: 1.0,
            reasoning: rule_reasoning(&rule.keyword),
            source: SuggestionSource::Rule,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(id: i64, keyword: &str, target: i64) -> ReconciliationRule {
        ReconciliationRule {
            id,
            tenant_id: "t1".into(),
            keyword: keyword.into(),
            target_account_id: target,
            match_type: None,
            created_at: Utc::now(),
        }
    }

    fn valid(ids: &[i64]) -> HashSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_case_insensitive_match_on_payee_or_description() {
        let matcher = RuleMatcher::new(
            vec![rule(1, "Stripe", 10)],
            &valid(&[10]),
            RulePriority::LongestKeyword,
        );
        assert!(matcher.find("STRIPE PAYMENTS", "").is_some());
        assert!(matcher.find("Unknown", "payout via stripe").is_some());
        assert!(matcher.find("Square", "card reader").is_none());
    }

    #[test]
    fn test_longest_keyword_wins() {
        let rules = vec![rule(1, "amazon", 10), rule(2, "amazon web services", 20)];
        let matcher = RuleMatcher::new(rules, &valid(&[10, 20]), RulePriority::LongestKeyword);
        assert_eq!(
            matcher.find("Amazon Web Services", "").unwrap().target_account_id,
            20
        );
        assert_eq!(matcher.find("Amazon.com", "").unwrap().target_account_id, 10);
    }

    #[test]
    fn test_equal_length_prefers_lower_id() {
        let rules = vec![rule(7, "uber", 20), rule(3, "eats", 10)];
        let matcher = RuleMatcher::new(rules, &valid(&[10, 20]), RulePriority::LongestKeyword);
        assert_eq!(matcher.find("Uber Eats", "").unwrap().id, 3);
    }

    #[test]
    fn test_first_match_uses_id_order() {
        let rules = vec![rule(2, "amazon web services", 20), rule(1, "amazon", 10)];
        let matcher = RuleMatcher::new(rules, &valid(&[10, 20]), RulePriority::FirstMatch);
        assert_eq!(
            matcher.find("Amazon Web Services", "").unwrap().target_account_id,
            10
        );
    }

    #[test]
    fn test_invalid_targets_and_blank_keywords_are_dropped() {
        let rules = vec![rule(1, "stripe", 999), rule(2, "  ", 10), rule(3, "gusto", 10)];
        let matcher = RuleMatcher::new(rules, &valid(&[10]), RulePriority::LongestKeyword);
        assert_eq!(matcher.len(), 1);
        assert!(matcher.find("Stripe", "").is_none());
        assert!(matcher.find("Gusto payroll", "").is_some());
    }

    #[test]
    fn test_suggestion_shape() {
        let matcher = RuleMatcher::new(
            vec![rule(1, "Stripe", 10)],
            &valid(&[10]),
            RulePriority::LongestKeyword,
        );
        let tx = Transaction {
            payee_name: Some("Stripe".into()),
            ..Transaction::default()
        };
        let s = matcher.suggest(&tx).unwrap();
        assert_eq!(s.account_id, 10);
        assert_eq!(s.confidence, 1.0);
        assert_eq!(s.reasoning, "Matched Reconciliation Rule: \"Stripe\"");
        assert_eq!(s.source, SuggestionSource::Rule);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(
            "first_match".parse::<RulePriority>().unwrap(),
            RulePriority::FirstMatch
        );
        assert!("random".parse::<RulePriority>().is_err());
    }
}
