//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose or code fences, so the object
//! between the first `{` and the last `}` is taken.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

use super::types::CategorySuggestion;

/// Truncate model output for error messages
fn truncated(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Slice out the outermost JSON object
pub fn extract_json_object(response: &str) -> Option<&str> {
    let response = response.trim();
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    suggested_account_id: Option<Value>,
    confidence: Option<Value>,
    reasoning: Option<String>,
}

/// Accept numbers or numeric strings
fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse and validate a categorization response.
///
/// The account must be one of `candidates`, confidence must be a finite
/// number in [0, 1] and reasoning must be non-empty. Anything else is
/// `InferenceMalformed`.
pub fn parse_suggestion(response: &str, candidates: &[i64]) -> Result<CategorySuggestion> {
    let json_str = extract_json_object(response).ok_or_else(|| {
        Error::InferenceMalformed(format!(
            "No JSON found in AI response | Raw: {}",
            truncated(response)
        ))
    })?;

    let raw: RawSuggestion = serde_json::from_str(json_str).map_err(|e| {
        Error::InferenceMalformed(format!(
            "Invalid JSON from AI: {} | Raw: {}",
            e,
            truncated(json_str)
        ))
    })?;

    let account_id = raw
        .suggested_account_id
        .as_ref()
        .and_then(as_i64)
        .ok_or_else(|| {
            Error::InferenceMalformed("Missing or non-numeric suggested_account_id".into())
        })?;

    if !candidates.contains(&account_id) {
        return Err(Error::InferenceMalformed(format!(
            "Suggested account {} was not among the candidates",
            account_id
        )));
    }

    let confidence = raw
        .confidence
        .as_ref()
        .and_then(as_f64)
        .ok_or_else(|| Error::InferenceMalformed("Missing or non-numeric confidence".into()))?;

    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(Error::InferenceMalformed(format!(
            "Confidence out of range: {}",
            confidence
        )));
    }

    let reasoning = raw.reasoning.unwrap_or_default().trim().to_string();
    if reasoning.is_empty() {
        return Err(Error::InferenceMalformed("Empty reasoning".into()));
    }

    Ok(CategorySuggestion {
        account_id,
        confidence,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let s = parse_suggestion(
            r#"{"suggested_account_id": 7, "confidence": 0.92, "reasoning": "Office retailer"}"#,
            &[3, 7],
        )
        .unwrap();
        assert_eq!(s.account_id, 7);
        assert!((s.confidence - 0.92).abs() < 1e-9);
        assert_eq!(s.reasoning, "Office retailer");
    }

    #[test]
    fn test_parse_wrapped_and_stringly_typed() {
        let response = "Sure! Here you go:\n```json\n\
            {\"suggested_account_id\": \"12\", \"confidence\": \"0.5\", \"reasoning\": \" fuel \"}\n```";
        let s = parse_suggestion(response, &[12]).unwrap();
        assert_eq!(s.account_id, 12);
        assert_eq!(s.reasoning, "fuel");
    }

    #[test]
    fn test_rejects_malformed() {
        let cases = [
            "no json here",
            "{not json}",
            r#"{"confidence": 0.9, "reasoning": "x"}"#,
            r#"{"suggested_account_id": 99, "confidence": 0.9, "reasoning": "x"}"#,
            r#"{"suggested_account_id": 7, "confidence": 1.5, "reasoning": "x"}"#,
            r#"{"suggested_account_id": 7, "confidence": -0.1, "reasoning": "x"}"#,
            r#"{"suggested_account_id": 7, "confidence": 0.9, "reasoning": "   "}"#,
            r#"{"suggested_account_id": 7, "confidence": "high", "reasoning": "x"}"#,
            r#"{"suggested_account_id": null, "confidence": 0.9, "reasoning": "x"}"#,
        ];
        for case in cases {
            let err = parse_suggestion(case, &[7]).unwrap_err();
            assert!(
                matches!(err, Error::InferenceMalformed(_)),
                "expected malformed for {}",
                case
            );
        }
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("x {\"a\":1} y"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("} {"), None);
        assert_eq!(extract_json_object(""), None);
    }
}
