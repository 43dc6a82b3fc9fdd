//! Parse the model's advisory reply
//!
//! The model answers with `{action, success, data, error}`. Only `success`
//! is required; `data` is informational and never applied to state.

use crate::core::error::ModelError;
use serde::Deserialize;
use serde_json::Value;

/// The model's verdict on a command
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdvisoryVerdict {
    /// Action the model believes it handled
    #[serde(default)]
    pub action: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl AdvisoryVerdict {
    /// Reason reported for a veto
    pub fn reason(&self) -> String {
        match self.error.as_deref().map(str::trim) {
            Some(reason) if !reason.is_empty() => reason.to_string(),
            _ => "rejected without a reason".into(),
        }
    }
}

/// Parse a raw model reply into a verdict
pub fn parse_verdict(reply: &str) -> Result<AdvisoryVerdict, ModelError> {
    let json_str = extract_json(reply)?;
    serde_json::from_str(json_str).map_err(|e| {
        ModelError::MalformedReply(format!("{} - Response: {}", e, reply))
    })
}

/// Extract JSON object from the reply (handles surrounding text)
fn extract_json(reply: &str) -> Result<&str, ModelError> {
    let start = reply
        .find('{')
        .ok_or_else(|| ModelError::MalformedReply("no JSON found in reply".into()))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ModelError::MalformedReply("no closing brace found in reply".into()))?;
    Ok(&reply[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_simple() {
        let reply = r#"{"success": true}"#;
        assert_eq!(extract_json(reply).unwrap(), reply);
    }

    #[test]
    fn test_extract_json_with_surrounding_text() {
        let reply = "Sure, here you go:\n{\"action\": \"read\", \"success\": true}\nAnything else?";
        let json = extract_json(reply).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_extract_json_no_json() {
        assert!(extract_json("I cannot help with that").is_err());
        assert!(extract_json("} backwards {").is_err());
    }

    #[test]
    fn test_full_verdict() {
        let verdict = parse_verdict(
            r#"{"action": "create", "success": false, "data": {}, "error": "duplicate email"}"#,
        )
        .unwrap();
        assert_eq!(verdict.action.as_deref(), Some("create"));
        assert!(!verdict.success);
        assert_eq!(verdict.reason(), "duplicate email");
    }

    #[test]
    fn test_minimal_verdict() {
        let verdict = parse_verdict(r#"{"success": true}"#).unwrap();
        assert!(verdict.success);
        assert_eq!(verdict.data, Value::Null);
        assert_eq!(verdict.error, None);

        let verdict = parse_verdict(r#"{"success": false, "error": null}"#).unwrap();
        assert_eq!(verdict.reason(), "rejected without a reason");
    }

    #[test]
    fn test_missing_success_is_malformed() {
        let result = parse_verdict(r#"{"action": "read", "data": []}"#);
        assert!(matches!(result, Err(ModelError::MalformedReply(_))));

        let result = parse_verdict(r#"{"success": "yes"}"#);
        assert!(matches!(result, Err(ModelError::MalformedReply(_))));
    }
}
