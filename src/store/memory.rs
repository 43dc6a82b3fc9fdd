//! Deterministic in-memory backend
//!
//! Each entity table sits behind its own `RwLock`, so every operation sees
//! one consistent view of its table. Ids come from a per-table counter that
//! only moves forward; ids of deleted records are never handed out again.

use crate::core::error::ExecutionError;
use crate::core::types::{Action, Command, Entity, Record};
use crate::store::{Backend, CommandExecutor, Execution};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Table {
    rows: BTreeMap<String, Record>,
    next_id: u64,
}

impl Table {
    fn seeded(rows: Vec<Record>) -> Self {
        let mut table = Self {
            rows: BTreeMap::new(),
            next_id: 1,
        };
        for mut row in rows {
            let id = table.allocate_id();
            row.insert("id".into(), Value::String(id.clone()));
            table.rows.insert(id, row);
        }
        table
    }

    fn allocate_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }
}

/// In-memory store owning one table per entity
#[derive(Debug)]
pub struct MemoryStore {
    users: RwLock<Table>,
    products: RwLock<Table>,
    orders: RwLock<Table>,
}

impl MemoryStore {
    /// Empty tables
    pub fn empty() -> Self {
        Self {
            users: RwLock::new(Table::seeded(Vec::new())),
            products: RwLock::new(Table::seeded(Vec::new())),
            orders: RwLock::new(Table::seeded(Vec::new())),
        }
    }

    /// Two users and two products; no orders
    pub fn seeded() -> Self {
        let now = timestamp();
        let fixture = |value: Value| -> Record {
            let mut record = value.as_object().cloned().unwrap_or_default();
            record.insert("created_at".into(), Value::String(now.clone()));
            record.insert("updated_at".into(), Value::String(now.clone()));
            record
        };

        let users = vec![
            fixture(json!({"name": "John Doe", "email": "john@example.com"})),
            fixture(json!({"name": "Jane Smith", "email": "jane@example.com"})),
        ];
        let products = vec![
            fixture(json!({
                "name": "Laptop",
                "price": 999.99,
                "description": "Gaming laptop"
            })),
            fixture(json!({
                "name": "Mouse",
                "price": 29.99,
                "description": "Wireless mouse"
            })),
        ];

        Self {
            users: RwLock::new(Table::seeded(users)),
            products: RwLock::new(Table::seeded(products)),
            orders: RwLock::new(Table::seeded(Vec::new())),
        }
    }

    fn table(&self, entity: Entity) -> &RwLock<Table> {
        match entity {
            Entity::User => &self.users,
            Entity::Product => &self.products,
            Entity::Order => &self.orders,
        }
    }

    /// Number of records currently stored for an entity
    pub async fn len(&self, entity: Entity) -> usize {
        self.table(entity).read().await.rows.len()
    }

    async fn create(&self, command: &Command) -> Result<Value, ExecutionError> {
        let mut table = self.table(command.entity).write().await;
        let id = table.allocate_id();
        let now = timestamp();

        let mut record = command.data.clone();
        record.insert("id".into(), Value::String(id.clone()));
        record.insert("created_at".into(), Value::String(now.clone()));
        record.insert("updated_at".into(), Value::String(now));

        table.rows.insert(id, record.clone());
        Ok(Value::Object(record))
    }

    async fn read(&self, command: &Command) -> Result<Value, ExecutionError> {
        let table = self.table(command.entity).read().await;
        match command.payload_id() {
            Some(id) => table
                .rows
                .get(&id)
                .map(|record| Value::Object(record.clone()))
                .ok_or(ExecutionError::NotFound(command.entity)),
            None => Ok(Value::Array(
                table.rows.values().cloned().map(Value::Object).collect(),
            )),
        }
    }

    async fn update(&self, command: &Command) -> Result<Value, ExecutionError> {
        let id = required_id(command)?;
        let mut table = self.table(command.entity).write().await;
        let record = table
            .rows
            .get_mut(&id)
            .ok_or(ExecutionError::NotFound(command.entity))?;

        for (key, value) in command.fields() {
            record.insert(key.clone(), value.clone());
        }
        record.insert("updated_at".into(), Value::String(timestamp()));

        Ok(Value::Object(record.clone()))
    }

    async fn delete(&self, command: &Command) -> Result<Value, ExecutionError> {
        let id = required_id(command)?;
        let mut table = self.table(command.entity).write().await;
        table
            .rows
            .remove(&id)
            .ok_or(ExecutionError::NotFound(command.entity))?;
        Ok(json!({"message": "deleted successfully"}))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::seeded()
    }
}

#[async_trait]
impl CommandExecutor for MemoryStore {
    async fn execute(&self, command: &Command) -> Result<Execution, ExecutionError> {
        let value = match command.action {
            Action::Create => self.create(command).await?,
            Action::Read => self.read(command).await?,
            Action::Update => self.update(command).await?,
            Action::Delete => self.delete(command).await?,
        };
        Ok(Execution::deterministic(value))
    }
}

#[async_trait]
impl Backend for MemoryStore {
    /// entity → id → record, for every table
    async fn snapshot(&self) -> Result<Value, ExecutionError> {
        let mut snapshot = serde_json::Map::new();
        for entity in Entity::ALL {
            let table = self.table(entity).read().await;
            let rows: serde_json::Map<String, Value> = table
                .rows
                .iter()
                .map(|(id, record)| (id.clone(), Value::Object(record.clone())))
                .collect();
            snapshot.insert(entity.as_str().into(), Value::Object(rows));
        }
        Ok(Value::Object(snapshot))
    }
}

fn required_id(command: &Command) -> Result<String, ExecutionError> {
    command.payload_id().ok_or(ExecutionError::MissingId {
        entity: command.entity,
        action: command.action,
    })
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
