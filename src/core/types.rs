//! Core type definitions used throughout the pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Schema-free item stored by the in-memory backend, and the shape of every
/// command payload.
pub type Record = serde_json::Map<String, Value>;

/// CRUD action requested by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of domain nouns a command can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    User,
    Product,
    Order,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::User, Entity::Product, Entity::Order];

    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::User => "user",
            Entity::Product => "product",
            Entity::Order => "order",
        }
    }

    /// Relational table backing this entity
    pub fn table(&self) -> &'static str {
        match self {
            Entity::User => "users",
            Entity::Product => "products",
            Entity::Order => "orders",
        }
    }

    /// Match a single word, singular or plural, exactly.
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "user" | "users" => Some(Entity::User),
            "product" | "products" => Some(Entity::Product),
            "order" | "orders" => Some(Entity::Order),
            _ => None,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requester resolved from an access token. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
        }
    }
}

/// Structured CRUD command built by the intent resolver
///
/// `user_id` and `user_role` are empty until the pipeline binds the
/// authenticated identity; after that the command is not mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: Action,
    pub entity: Entity,
    pub data: Record,
    pub user_id: String,
    pub user_role: String,
}

impl Command {
    pub fn new(action: Action, entity: Entity, data: Record) -> Self {
        Self {
            action,
            entity,
            data,
            user_id: String::new(),
            user_role: String::new(),
        }
    }

    /// Bind the requester. Consumes the command so the binding happens once.
    pub fn with_identity(mut self, identity: &Identity) -> Self {
        self.user_id = identity.id.clone();
        self.user_role = identity.role.clone();
        self
    }

    /// The `id` carried in the payload, if any.
    ///
    /// Ids are strings on the wire; numeric ids are accepted and rendered
    /// in decimal.
    pub fn payload_id(&self) -> Option<String> {
        match self.data.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Payload fields other than `id`
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter().filter(|(key, _)| key.as_str() != "id")
    }
}
