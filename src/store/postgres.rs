//! Deterministic relational backend over a Postgres pool
//!
//! Every command is a single autocommit statement bounded by the store's
//! statement deadline. Concurrency control is left to the pool and the
//! database.

use crate::core::error::ExecutionError;
use crate::core::types::{Action, Command, Entity, Record};
use crate::store::models::{Order, Product, User, ORDER_COLUMNS, PRODUCT_COLUMNS, USER_COLUMNS};
use crate::store::{Backend, CommandExecutor, Execution};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Rows per table included in a snapshot
const SNAPSHOT_ROWS: i64 = 5;

pub struct PostgresStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Run one statement under the deadline. Dropping the future on timeout
    /// cancels the round trip.
    async fn bounded<T, F>(&self, statement: F) -> Result<T, ExecutionError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        let deadline = self.statement_timeout;
        match tokio::time::timeout(deadline, statement).await {
            Ok(result) => result.map_err(classify),
            Err(_) => {
                let reason = format!("statement timed out after {:?}", deadline);
                Err(ExecutionError::BackendUnavailable(reason))
            }
        }
    }

    async fn create_user(&self, data: &Record) -> Result<Value, ExecutionError> {
        let name = required_text(Entity::User, data, "name")?;
        let email = required_text(Entity::User, data, "email")?;

        let sql = format!(
            "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING {}",
            USER_COLUMNS
        );
        let user = self
            .bounded(
                sqlx::query_as::<_, User>(&sql)
                    .bind(name)
                    .bind(email)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(serde_json::to_value(user)?)
    }

    async fn create_product(&self, data: &Record) -> Result<Value, ExecutionError> {
        let name = required_text(Entity::Product, data, "name")?;
        let price = positive_price(data)?;
        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let sql = format!(
            "INSERT INTO products (name, price, description) VALUES ($1, $2, $3) RETURNING {}",
            PRODUCT_COLUMNS
        );
        let product = self
            .bounded(
                sqlx::query_as::<_, Product>(&sql)
                    .bind(name)
                    .bind(price)
                    .bind(description)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(serde_json::to_value(product)?)
    }

    async fn create_order(&self, data: &Record) -> Result<Value, ExecutionError> {
        let items = data.get("items").ok_or(ExecutionError::MissingField {
            entity: Entity::Order,
            field: "items",
        })?;
        let items = serde_json::to_string(items)?;
        let user_id = data.get("user_id").and_then(integer_value);
        let total_amount = data.get("total_amount").and_then(Value::as_f64);
        let status = data
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("pending")
            .to_string();

        let sql = format!(
            "INSERT INTO orders (user_id, items, total_amount, status) VALUES ($1, $2, $3, $4) RETURNING {}",
            ORDER_COLUMNS
        );
        let order = self
            .bounded(
                sqlx::query_as::<_, Order>(&sql)
                    .bind(user_id)
                    .bind(items)
                    .bind(total_amount)
                    .bind(status)
                    .fetch_one(&self.pool),
            )
            .await?;
        Ok(serde_json::to_value(order)?)
    }

    async fn read<T>(&self, entity: Entity, id: Option<i32>) -> Result<Value, ExecutionError>
    where
        T: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin,
    {
        let columns = columns(entity);
        match id {
            Some(id) => {
                let sql = format!("SELECT {} FROM {} WHERE id = $1", columns, entity.table());
                let row = self
                    .bounded(
                        sqlx::query_as::<_, T>(&sql)
                            .bind(id)
                            .fetch_optional(&self.pool),
                    )
                    .await?
                    .ok_or(ExecutionError::NotFound(entity))?;
                Ok(serde_json::to_value(row)?)
            }
            None => {
                let sql = format!("SELECT {} FROM {} ORDER BY id", columns, entity.table());
                let rows = self
                    .bounded(sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool))
                    .await?;
                Ok(serde_json::to_value(rows)?)
            }
        }
    }

    async fn update<T>(&self, command: &Command) -> Result<Value, ExecutionError>
    where
        T: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin,
    {
        let id = required_id(command)?;
        let assignments = update_assignments(command.entity, &command.data)?;
        let mut query = build_update(command.entity, id, assignments);
        debug!(sql = query.sql(), "relational update");

        let row = self
            .bounded(query.build_query_as::<T>().fetch_optional(&self.pool))
            .await?
            .ok_or(ExecutionError::NotFound(command.entity))?;
        Ok(serde_json::to_value(row)?)
    }

    async fn delete(&self, command: &Command) -> Result<Value, ExecutionError> {
        let id = required_id(command)?;
        let sql = format!("DELETE FROM {} WHERE id = $1", command.entity.table());
        let result = self
            .bounded(sqlx::query(&sql).bind(id).execute(&self.pool))
            .await?;

        if result.rows_affected() == 0 {
            return Err(ExecutionError::NotFound(command.entity));
        }
        let message = format!("{} deleted successfully", command.entity);
        Ok(json!({ "message": message }))
    }

    async fn first_rows<T>(&self, entity: Entity) -> Result<Value, ExecutionError>
    where
        T: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin,
    {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id LIMIT $1",
            columns(entity),
            entity.table()
        );
        let rows = self
            .bounded(
                sqlx::query_as::<_, T>(&sql)
                    .bind(SNAPSHOT_ROWS)
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(serde_json::to_value(rows)?)
    }
}

#[async_trait]
impl CommandExecutor for PostgresStore {
    async fn execute(&self, command: &Command) -> Result<Execution, ExecutionError> {
        let value = match (command.action, command.entity) {
            (Action::Create, Entity::User) => self.create_user(&command.data).await?,
            (Action::Create, Entity::Product) => self.create_product(&command.data).await?,
            (Action::Create, Entity::Order) => self.create_order(&command.data).await?,
            (Action::Read, entity) => {
                let id = optional_id(command)?;
                match entity {
                    Entity::User => self.read::<User>(entity, id).await?,
                    Entity::Product => self.read::<Product>(entity, id).await?,
                    Entity::Order => self.read::<Order>(entity, id).await?,
                }
            }
            (Action::Update, Entity::User) => self.update::<User>(command).await?,
            (Action::Update, Entity::Product) => self.update::<Product>(command).await?,
            (Action::Update, Entity::Order) => self.update::<Order>(command).await?,
            (Action::Delete, _) => self.delete(command).await?,
        };
        Ok(Execution::deterministic(value))
    }
}

#[async_trait]
impl Backend for PostgresStore {
    async fn snapshot(&self) -> Result<Value, ExecutionError> {
        Ok(json!({
            "users": self.first_rows::<User>(Entity::User).await?,
            "products": self.first_rows::<Product>(Entity::Product).await?,
            "orders": self.first_rows::<Order>(Entity::Order).await?,
        }))
    }
}

/// A value bound into a dynamic `SET` clause
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    Text(String),
    Float(f64),
}

fn columns(entity: Entity) -> &'static str {
    match entity {
        Entity::User => USER_COLUMNS,
        Entity::Product => PRODUCT_COLUMNS,
        Entity::Order => ORDER_COLUMNS,
    }
}

/// Recognized fields present in the payload, in column order.
///
/// Unrecognized keys are ignored. Nothing recognized is an error.
pub(crate) fn update_assignments(
    entity: Entity,
    data: &Record,
) -> Result<Vec<(&'static str, BindValue)>, ExecutionError> {
    let text = |key: &str| data.get(key).and_then(Value::as_str).map(str::to_string);
    let non_empty = |key: &str| text(key).filter(|s| !s.is_empty());
    let float = |key: &str| data.get(key).and_then(Value::as_f64);

    let mut assignments = Vec::new();
    match entity {
        Entity::User => {
            if let Some(name) = non_empty("name") {
                assignments.push(("name", BindValue::Text(name)));
            }
            if let Some(email) = non_empty("email") {
                assignments.push(("email", BindValue::Text(email)));
            }
        }
        Entity::Product => {
            if let Some(name) = non_empty("name") {
                assignments.push(("name", BindValue::Text(name)));
            }
            if let Some(price) = float("price").filter(|p| *p > 0.0) {
                assignments.push(("price", BindValue::Float(price)));
            }
            if let Some(description) = text("description") {
                assignments.push(("description", BindValue::Text(description)));
            }
        }
        Entity::Order => {
            if let Some(items) = data.get("items") {
                assignments.push(("items", BindValue::Text(serde_json::to_string(items)?)));
            }
            if let Some(total) = float("total_amount") {
                assignments.push(("total_amount", BindValue::Float(total)));
            }
            if let Some(status) = text("status") {
                assignments.push(("status", BindValue::Text(status)));
            }
        }
    }

    if assignments.is_empty() {
        return Err(ExecutionError::NoFieldsToUpdate);
    }
    Ok(assignments)
}

/// `UPDATE <table> SET a = $1, ..., updated_at = NOW() WHERE id = $n RETURNING <columns>`
pub(crate) fn build_update(
    entity: Entity,
    id: i32,
    assignments: Vec<(&'static str, BindValue)>,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("UPDATE {} SET ", entity.table()));
    {
        let mut set = query.separated(", ");
        for (column, value) in assignments {
            set.push(format!("{} = ", column));
            match value {
                BindValue::Text(text) => set.push_bind_unseparated(text),
                BindValue::Float(number) => set.push_bind_unseparated(number),
            };
        }
        set.push("updated_at = NOW()");
    }
    query
        .push(" WHERE id = ")
        .push_bind(id)
        .push(" RETURNING ")
        .push(columns(entity));
    query
}

fn parse_id(entity: Entity, raw: String) -> Result<i32, ExecutionError> {
    raw.trim()
        .parse()
        .map_err(|_| ExecutionError::InvalidId { entity, value: raw })
}

fn optional_id(command: &Command) -> Result<Option<i32>, ExecutionError> {
    command
        .payload_id()
        .map(|raw| parse_id(command.entity, raw))
        .transpose()
}

fn required_id(command: &Command) -> Result<i32, ExecutionError> {
    let raw = command.payload_id().ok_or(ExecutionError::MissingId {
        entity: command.entity,
        action: command.action,
    })?;
    parse_id(command.entity, raw)
}

fn required_text(
    entity: Entity,
    data: &Record,
    field: &'static str,
) -> Result<String, ExecutionError> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(ExecutionError::MissingField { entity, field })
}

fn positive_price(data: &Record) -> Result<f64, ExecutionError> {
    data.get("price")
        .and_then(Value::as_f64)
        .filter(|price| *price > 0.0)
        .ok_or(ExecutionError::NotPositive {
            entity: Entity::Product,
            field: "price",
        })
}

/// `user_id` arrives as a decimal string or a number; anything else is dropped
fn integer_value(value: &Value) -> Option<i32> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        _ => None,
    }
}

/// Connectivity problems surface as an unavailable backend
fn classify(err: sqlx::Error) -> ExecutionError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ExecutionError::BackendUnavailable(err.to_string())
        }
        other => {
            warn!(error = %other, "Database statement failed");
            ExecutionError::Database(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn command(action: Action, entity: Entity, data: Value) -> Command {
        Command::new(action, entity, record(data))
    }

    #[test]
    fn test_update_sql_user() {
        let data = record(json!({"id": "1", "name": "a", "email": "b"}));
        let assignments = update_assignments(Entity::User, &data).unwrap();
        let query = build_update(Entity::User, 1, assignments);
        assert_eq!(
            query.sql(),
            "UPDATE users SET name = $1, email = $2, updated_at = NOW() WHERE id = $3 \
             RETURNING id, name, email, created_at, updated_at"
        );
    }

    #[test]
    fn test_update_sql_only_supplied_fields() {
        let data = record(json!({"id": "2", "description": ""}));
        let assignments = update_assignments(Entity::Product, &data).unwrap();
        assert_eq!(
            assignments,
            vec![("description", BindValue::Text(String::new()))]
        );

        let query = build_update(Entity::Product, 2, assignments);
        assert_eq!(
            query.sql(),
            "UPDATE products SET description = $1, updated_at = NOW() WHERE id = $2 \
             RETURNING id, name, price, description, created_at, updated_at"
        );
    }

    #[test]
    fn test_update_assignments_skip_invalid_values() {
        // empty name and non-positive price are not applied
        let result = update_assignments(
            Entity::Product,
            &record(json!({"id": "2", "name": "", "price": -3.0})),
        );
        assert!(matches!(result, Err(ExecutionError::NoFieldsToUpdate)));

        let data = record(json!({"id": "1", "nickname": "x"}));
        let result = update_assignments(Entity::User, &data);
        assert!(matches!(result, Err(ExecutionError::NoFieldsToUpdate)));
    }

    #[test]
    fn test_order_items_bound_as_json_text() {
        let assignments = update_assignments(
            Entity::Order,
            &record(json!({"items": ["a", {"qty": 2}], "status": "shipped"})),
        )
        .unwrap();
        assert_eq!(
            assignments,
            vec![
                ("items", BindValue::Text("[\"a\",{\"qty\":2}]".into())),
                ("status", BindValue::Text("shipped".into())),
            ]
        );
    }

    #[test]
    fn test_id_parsing() {
        let cmd = command(Action::Delete, Entity::User, json!({"id": "12"}));
        assert_eq!(required_id(&cmd).unwrap(), 12);

        let cmd = command(Action::Delete, Entity::User, json!({"id": 12}));
        assert_eq!(required_id(&cmd).unwrap(), 12);

        let cmd = command(Action::Delete, Entity::User, json!({"id": "abc"}));
        let err = required_id(&cmd).unwrap_err();
        assert_eq!(err.to_string(), "invalid user ID: abc");

        let cmd = command(Action::Update, Entity::Order, json!({"status": "x"}));
        let err = required_id(&cmd).unwrap_err();
        assert_eq!(err.to_string(), "order ID is required for update");

        let cmd = command(Action::Read, Entity::Order, json!({}));
        assert_eq!(optional_id(&cmd).unwrap(), None);
    }

    #[test]
    fn test_product_price_must_be_positive() {
        let price = positive_price(&record(json!({"price": 9.5}))).unwrap();
        assert_eq!(price, 9.5);

        for price in [json!(0), json!(-1.0), json!("3"), Value::Null] {
            let data = record(json!({ "price": price }));
            let err = positive_price(&data).unwrap_err();
            assert_eq!(err.to_string(), "product price must be positive");
        }
    }

    #[test]
    fn test_integer_value() {
        assert_eq!(integer_value(&json!("7")), Some(7));
        assert_eq!(integer_value(&json!(7)), Some(7));
        assert_eq!(integer_value(&json!("seven")), None);
        assert_eq!(integer_value(&json!(1.5)), None);
    }

    #[test]
    fn test_classify_pool_errors() {
        assert!(matches!(
            classify(sqlx::Error::PoolTimedOut),
            ExecutionError::BackendUnavailable(_)
        ));
        assert!(matches!(
            classify(sqlx::Error::RowNotFound),
            ExecutionError::Database(_)
        ));
    }

    /// Full CRUD cycle against a live database; set DATABASE_URL to run.
    #[tokio::test]
    #[ignore]
    async fn test_live_crud_cycle() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::store::database::ensure_schema(&pool).await.unwrap();
        let store = PostgresStore::new(pool, Duration::from_secs(5));

        let created = store
            .execute(&command(
                Action::Create,
                Entity::Product,
                json!({"name": "cable", "price": 4.5}),
            ))
            .await
            .unwrap();
        assert_eq!(created.value["description"], "");
        let id = created.value["id"].as_i64().unwrap().to_string();

        let updated = store
            .execute(&command(
                Action::Update,
                Entity::Product,
                json!({"id": id, "price": 5.0}),
            ))
            .await
            .unwrap();
        assert_eq!(updated.value["price"], 5.0);
        assert_eq!(updated.value["name"], "cable");

        let deleted = store
            .execute(&command(Action::Delete, Entity::Product, json!({"id": id})))
            .await
            .unwrap();
        assert_eq!(deleted.value["message"], "product deleted successfully");

        let err = store
            .execute(&command(Action::Read, Entity::Product, json!({"id": id})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(Entity::Product)));
    }
}
