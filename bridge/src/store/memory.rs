use std::collections::HashMap;

use async_trait::async_trait;
use heater_common::EntityKind;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{owned_by, stamp_row, RecordStore, Row, StoreError};

/// Process-local tables. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    next_id: u64,
    rows: HashMap<EntityKind, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn rows(&self, kind: EntityKind) -> Vec<Value> {
        let tables = self.inner.lock().await;
        tables.rows.get(&kind).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, kind: EntityKind, row: Row) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        tables.next_id += 1;
        let stamped = stamp_row(row, tables.next_id);
        tables.rows.entry(kind).or_default().push(stamped);
        Ok(())
    }

    async fn latest(&self, kind: EntityKind, owner: &str) -> Result<Option<Value>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .rows
            .get(&kind)
            .and_then(|rows| rows.iter().rev().find(|row| owned_by(row, owner)))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use heater_common::{TemperatureReading, DEVICE_OWNER_ID};

    use super::*;
    use crate::store::insert_record;

    #[tokio::test]
    async fn latest_is_last_insert_for_owner() {
        let store = MemoryStore::new();
        for (value, owner) in [(20.0, "a"), (21.0, "b"), (22.0, "a"), (23.0, "b")] {
            insert_record(&store, &TemperatureReading { value }, Some(owner))
                .await
                .unwrap();
        }

        let latest = store
            .latest(EntityKind::SensorData, "a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest["suhu"], 22.0);
        assert_eq!(latest["user_id"], "a");
        assert_eq!(latest["id"], 3);
        assert!(latest["created_at"].is_string());
    }

    #[tokio::test]
    async fn untagged_rows_are_stored_but_not_returned() {
        let store = MemoryStore::new();
        insert_record(&store, &TemperatureReading { value: 25.0 }, None)
            .await
            .unwrap();

        assert_eq!(store.rows(EntityKind::SensorData).await.len(), 1);
        assert!(store
            .latest(EntityKind::SensorData, DEVICE_OWNER_ID)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .latest(EntityKind::Riwayat, DEVICE_OWNER_ID)
            .await
            .unwrap()
            .is_none());
    }
}
