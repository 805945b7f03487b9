//! Persistence gateway.
//!
//! Every table is append-only. Rows are JSON objects holding the entity
//! columns plus `user_id`; the backend adds `id` and `created_at`. "Latest"
//! always means the most recently created row for a given owner.

mod file;
mod memory;
mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use heater_common::{EntityKind, Record, StoreConfig};
use serde_json::{Map, Value};
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Rejected(String),
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("row encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0} rows must encode as JSON objects")]
    NotAnObject(EntityKind),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, kind: EntityKind, row: Row) -> Result<(), StoreError>;

    async fn latest(&self, kind: EntityKind, owner: &str) -> Result<Option<Value>, StoreError>;
}

/// Serializes `record` into a row for its table, tagging it with `owner` if given.
pub fn encode_row<R: Record>(record: &R, owner: Option<&str>) -> Result<Row, StoreError> {
    let Value::Object(mut row) = serde_json::to_value(record)? else {
        return Err(StoreError::NotAnObject(R::KIND));
    };
    row.insert(
        "user_id".to_string(),
        owner.map_or(Value::Null, |owner| Value::String(owner.to_string())),
    );
    Ok(row)
}

pub async fn insert_record<R: Record>(
    store: &dyn RecordStore,
    record: &R,
    owner: Option<&str>,
) -> Result<(), StoreError> {
    let row = encode_row(record, owner)?;
    store.insert(R::KIND, row).await
}

pub fn open(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match config {
        StoreConfig::Supabase {
            url,
            key,
            timeout_ms,
        } => Arc::new(SupabaseStore::new(
            url,
            key,
            std::time::Duration::from_millis(*timeout_ms),
        )?),
        StoreConfig::File { dir } => Arc::new(FileStore::new(dir.clone())),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

/// Adds the columns a hosted table would fill in on insert.
fn stamp_row(mut row: Row, id: u64) -> Value {
    row.insert("id".to_string(), Value::from(id));
    row.insert(
        "created_at".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    Value::Object(row)
}

/// Whether `row` belongs to `owner`. Rows without a tag never match.
fn owned_by(row: &Value, owner: &str) -> bool {
    row.get("user_id").and_then(Value::as_str) == Some(owner)
}

#[cfg(test)]
mod tests {
    use heater_common::{HeaterMode, HeaterStatus, TemperatureReading};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_row_adds_owner_column() {
        let row = encode_row(&TemperatureReading { value: 30.5 }, Some("user-1")).unwrap();
        assert_eq!(Value::Object(row), json!({"suhu": 30.5, "user_id": "user-1"}));

        let row = encode_row(
            &HeaterStatus {
                status: HeaterMode::Off,
            },
            None,
        )
        .unwrap();
        assert_eq!(Value::Object(row), json!({"status": "off", "user_id": null}));
    }

    #[test]
    fn rows_without_owner_are_never_matched() {
        assert!(owned_by(&json!({"user_id": "a"}), "a"));
        assert!(!owned_by(&json!({"user_id": "b"}), "a"));
        assert!(!owned_by(&json!({"user_id": null}), "a"));
        assert!(!owned_by(&json!({}), "a"));
    }
}
