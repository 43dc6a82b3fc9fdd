//! Intent resolution - converts free text into a structured Command
//!
//! Classification is keyword based: the action comes from substring
//! matches anywhere in the normalized text, the entity from exact word
//! matches in the phrase before the `json:` marker, and the data from the
//! JSON object after it.

use crate::core::error::ParseError;
use crate::core::types::{Action, Command, Entity, Record};

/// Separates the command phrase from its JSON payload
pub const DATA_MARKER: &str = "json:";

/// Keyword sets, checked in this order; the first set with a hit wins.
const ACTION_KEYWORDS: [(Action, &[&str]); 4] = [
    (Action::Create, &["create", "add"]),
    (Action::Read, &["read", "get", "list", "show"]),
    (Action::Update, &["update", "modify", "change"]),
    (Action::Delete, &["delete", "remove"]),
];

/// Resolves raw query text to a Command
#[derive(Debug, Clone, Default)]
pub struct IntentResolver {
    preserve_payload_case: bool,
}

impl IntentResolver {
    /// Lower-cases the whole query, payload included.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies on the lower-cased phrase but parses the payload from the
    /// query as written, so `{"name":"Ada"}` keeps its capital.
    pub fn preserving_payload_case() -> Self {
        Self {
            preserve_payload_case: true,
        }
    }

    /// Resolve a query into a command with empty requester fields
    pub fn resolve(&self, query: &str) -> Result<Command, ParseError> {
        let trimmed = query.trim();
        let normalized = trimmed.to_lowercase();

        if normalized.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        let action = classify_action(&normalized);

        let (phrase, payload) = match normalized.find(DATA_MARKER) {
            Some(idx) => (
                &normalized[..idx],
                Some(&normalized[idx + DATA_MARKER.len()..]),
            ),
            None => (normalized.as_str(), None),
        };

        let entity = classify_entity(phrase)
            .ok_or_else(|| ParseError::UnknownEntity(normalized.clone()))?;

        let payload = if self.preserve_payload_case {
            // ASCII lowering keeps byte offsets aligned with `trimmed`
            trimmed
                .to_ascii_lowercase()
                .find(DATA_MARKER)
                .map(|idx| &trimmed[idx + DATA_MARKER.len()..])
        } else {
            payload
        };

        let data = match payload {
            Some(raw) => parse_payload(raw)?,
            None => Record::new(),
        };

        Ok(Command::new(action, entity, data))
    }
}

/// First keyword set with a substring hit; `read` when nothing matches.
fn classify_action(normalized: &str) -> Action {
    ACTION_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| normalized.contains(kw)))
        .map(|(action, _)| *action)
        .unwrap_or(Action::Read)
}

/// Last whitespace-separated word naming an entity wins.
fn classify_entity(phrase: &str) -> Option<Entity> {
    phrase
        .split_whitespace()
        .filter_map(Entity::from_word)
        .last()
}

fn parse_payload(raw: &str) -> Result<Record, ParseError> {
    serde_json::from_str::<Record>(raw.trim())
        .map_err(|e| ParseError::InvalidData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_list_users() {
        let cmd = IntentResolver::new().resolve("list users").unwrap();
        assert_eq!(cmd.action, Action::Read);
        assert_eq!(cmd.entity, Entity::User);
        assert!(cmd.data.is_empty());
        assert!(cmd.user_id.is_empty());
    }

    #[test]
    fn test_create_user_with_payload_is_lowercased() {
        let cmd = IntentResolver::new()
            .resolve(r#"create user json:{"name":"A","email":"b@c.com"}"#)
            .unwrap();
        assert_eq!(cmd.action, Action::Create);
        assert_eq!(cmd.entity, Entity::User);
        assert_eq!(cmd.data.get("name"), Some(&json!("a")));
        assert_eq!(cmd.data.get("email"), Some(&json!("b@c.com")));
    }

    #[test]
    fn test_preserving_payload_case() {
        let cmd = IntentResolver::preserving_payload_case()
            .resolve(r#"Create User JSON:{"name":"Ada Lovelace"}"#)
            .unwrap();
        assert_eq!(cmd.action, Action::Create);
        assert_eq!(cmd.entity, Entity::User);
        assert_eq!(cmd.data.get("name"), Some(&json!("Ada Lovelace")));
    }

    #[test]
    fn test_action_keywords() {
        let resolver = IntentResolver::new();
        let cases = [
            ("add product", Action::Create),
            ("show orders", Action::Read),
            ("get user", Action::Read),
            ("modify product", Action::Update),
            ("change user", Action::Update),
            ("remove order", Action::Delete),
            ("products please", Action::Read),
        ];
        for (query, expected) in cases {
            assert_eq!(
                resolver.resolve(query).unwrap().action,
                expected,
                "{}",
                query
            );
        }
    }

    #[test]
    fn test_create_checked_before_other_actions() {
        let cmd = IntentResolver::new()
            .resolve("delete and re-create user")
            .unwrap();
        assert_eq!(cmd.action, Action::Create);
    }

    #[test]
    fn test_last_entity_word_wins() {
        let cmd = IntentResolver::new().resolve("list user orders").unwrap();
        assert_eq!(cmd.entity, Entity::Order);
    }

    #[test]
    fn test_entity_ignored_inside_payload() {
        let result = IntentResolver::new()
            .resolve(r#"create thing json:{"kind":"user"}"#);
        assert!(matches!(result, Err(ParseError::UnknownEntity(_))));
    }

    #[test]
    fn test_entity_requires_exact_word() {
        let result = IntentResolver::new().resolve("list usernames");
        assert!(matches!(result, Err(ParseError::UnknownEntity(_))));
    }

    #[test]
    fn test_unknown_entity() {
        let result = IntentResolver::new().resolve("create unknown");
        assert_eq!(
            result,
            Err(ParseError::UnknownEntity("create unknown".to_string()))
        );
    }

    #[test]
    fn test_empty_query() {
        let resolver = IntentResolver::new();
        assert_eq!(resolver.resolve(""), Err(ParseError::EmptyQuery));
        assert_eq!(resolver.resolve("   \n\t"), Err(ParseError::EmptyQuery));
    }

    #[test]
    fn test_invalid_payload() {
        let resolver = IntentResolver::new();
        assert!(matches!(
            resolver.resolve("create user json:{not json"),
            Err(ParseError::InvalidData(_))
        ));
        assert!(matches!(
            resolver.resolve("create user json:"),
            Err(ParseError::InvalidData(_))
        ));
        assert!(matches!(
            resolver.resolve("create user json:[1, 2]"),
            Err(ParseError::InvalidData(_))
        ));
    }

    #[test]
    fn test_payload_with_nested_values() {
        let query = r#"create order json:{"items":[{"product_id":"1","quantity":2}]}"#;
        let cmd = IntentResolver::new().resolve(query).unwrap();
        assert_eq!(cmd.entity, Entity::Order);
        assert_eq!(
            cmd.data.get("items"),
            Some(&json!([{"product_id": "1", "quantity": 2}]))
        );
    }

    proptest! {
        #[test]
        fn property_resolved_commands_are_closed(query in "\\PC{0,64}") {
            if let Ok(cmd) = IntentResolver::new().resolve(&query) {
                prop_assert!(Entity::ALL.contains(&cmd.entity));
                prop_assert!(Action::ALL.contains(&cmd.action));
            }
        }

        #[test]
        fn property_entity_word_always_resolves(
            prefix in "[a-z ]{0,16}",
            word in prop::sample::select(vec![
                "user", "users", "product", "products", "order", "orders",
            ]),
        ) {
            let query = format!("{} {}", prefix, word);
            let cmd = IntentResolver::new().resolve(&query).unwrap();
            prop_assert_eq!(Some(cmd.entity), Entity::from_word(word));
        }
    }
}
