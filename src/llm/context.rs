//! Build advisory prompts
//!
//! A prompt embeds the backend's current data snapshot and every field of
//! the command, then asks for a verdict in a fixed JSON shape.

use crate::core::types::{Action, Command, Entity, Record};
use serde_json::Value;

/// Everything the model sees about one request
#[derive(Debug, Clone)]
pub struct AdvisoryContext {
    /// Current data state of the backend
    pub snapshot: Value,
    pub action: Action,
    pub entity: Entity,
    pub data: Record,
    pub user_id: String,
    pub user_role: String,
}

impl AdvisoryContext {
    pub fn new(command: &Command, snapshot: Value) -> Self {
        Self {
            snapshot,
            action: command.action,
            entity: command.entity,
            data: command.data.clone(),
            user_id: command.user_id.clone(),
            user_role: command.user_role.clone(),
        }
    }

    /// Command details, one per line
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("- Action: {}\n", self.action));
        s.push_str(&format!("- Entity: {}\n", self.entity));
        s.push_str(&format!("- Data: {}\n", Value::Object(self.data.clone())));
        s.push_str(&format!("- UserID: {}\n", self.user_id));
        s.push_str(&format!("- UserRole: {}\n", self.user_role));
        s
    }

    pub fn prompt(&self) -> String {
        format!(
            "{}\n\nCurrent data state:\n{}\n\nCommand details:\n{}\n{}",
            ADVISORY_PREAMBLE,
            self.snapshot,
            self.summary(),
            ADVISORY_INSTRUCTIONS
        )
    }
}

const ADVISORY_PREAMBLE: &str =
    "You are a data management assistant. Review the CRUD command below against the current data.";

const ADVISORY_INSTRUCTIONS: &str = r#"Instructions:
1. Decide whether the command can be carried out against the current data
2. For CREATE: the new item must not conflict with existing items
3. For READ: the requested item must exist if an ID is given
4. For UPDATE and DELETE: the referenced item must exist
5. Return your response in JSON format with the following structure:
   {"action": "create|read|update|delete", "success": true|false, "data": {...}, "error": "error message if any"}

Respond only with valid JSON."#;
