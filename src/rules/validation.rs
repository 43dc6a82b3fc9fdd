//! Per-entity, per-action business rules
//!
//! Rules are looked up by `(entity, action)`. Pairs without a rule pass;
//! existence and authorization are checked elsewhere.

use crate::core::error::ValidationError;
use crate::core::types::{Action, Command, Entity, Record};
use serde_json::Value;
use std::collections::HashMap;

type Rule = fn(&Record) -> Result<(), ValidationError>;

/// Dispatches commands to their registered business rule
#[derive(Clone)]
pub struct RuleValidator {
    rules: HashMap<(Entity, Action), Rule>,
}

impl std::fmt::Debug for RuleValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.rules.keys().collect();
        keys.sort();
        f.debug_struct("RuleValidator")
            .field("rules", &keys)
            .finish()
    }
}

impl RuleValidator {
    pub fn new() -> Self {
        let mut rules: HashMap<(Entity, Action), Rule> = HashMap::new();
        rules.insert((Entity::User, Action::Create), validate_user_create);
        rules.insert((Entity::User, Action::Update), validate_non_empty_update);
        rules.insert((Entity::Product, Action::Create), validate_product_create);
        rules.insert((Entity::Product, Action::Update), validate_non_empty_update);
        rules.insert((Entity::Order, Action::Create), validate_order_create);
        Self { rules }
    }

    pub fn validate(&self, command: &Command) -> Result<(), ValidationError> {
        match self.rules.get(&(command.entity, command.action)) {
            Some(rule) => rule(&command.data),
            None => Ok(()),
        }
    }

    pub fn has_rule(&self, entity: Entity, action: Action) -> bool {
        self.rules.contains_key(&(entity, action))
    }
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_str<'a>(data: &'a Record, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn validate_user_create(data: &Record) -> Result<(), ValidationError> {
    non_empty_str(data, "name").ok_or(ValidationError::UserNameRequired)?;
    non_empty_str(data, "email").ok_or(ValidationError::UserEmailRequired)?;
    Ok(())
}

/// At least one field besides `id`
fn validate_non_empty_update(data: &Record) -> Result<(), ValidationError> {
    if data.keys().all(|key| key == "id") {
        return Err(ValidationError::EmptyUpdate);
    }
    Ok(())
}

fn validate_product_create(data: &Record) -> Result<(), ValidationError> {
    non_empty_str(data, "name").ok_or(ValidationError::ProductNameRequired)?;
    match data.get("price").and_then(Value::as_f64) {
        Some(price) if price > 0.0 => Ok(()),
        _ => Err(ValidationError::ProductPriceNotPositive),
    }
}

fn validate_order_create(data: &Record) -> Result<(), ValidationError> {
    match data.get("items").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err(ValidationError::OrderItemsRequired),
    }
}
