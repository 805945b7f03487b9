use std::{collections::HashMap, io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use heater_common::EntityKind;
use serde_json::Value;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::warn;

use super::{owned_by, stamp_row, RecordStore, Row, StoreError};

/// One JSON-lines file per table under `dir`.
pub struct FileStore {
    dir: PathBuf,
    // Last id handed out per table; loaded from disk on first use.
    ids: Mutex<HashMap<EntityKind, u64>>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            ids: Mutex::new(HashMap::new()),
        }
    }

    fn table_path(&self, kind: EntityKind) -> PathBuf {
        self.dir.join(format!("{}.jsonl", kind.table()))
    }

    async fn read_rows(&self, kind: EntityKind) -> Result<Vec<Value>, StoreError> {
        let path = self.table_path(kind);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut rows = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(row) => rows.push(row),
                Err(err) => warn!(
                    "skipping unreadable row {} in {}: {err}",
                    index + 1,
                    path.display()
                ),
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn insert(&self, kind: EntityKind, row: Row) -> Result<(), StoreError> {
        let mut ids = self.ids.lock().await;
        let cached = ids.get(&kind).copied();
        let last_id = match cached {
            Some(id) => id,
            None => self
                .read_rows(kind)
                .await?
                .iter()
                .filter_map(|row| row.get("id").and_then(Value::as_u64))
                .max()
                .unwrap_or(0),
        };
        let id = last_id + 1;

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut line = serde_json::to_vec(&stamp_row(row, id))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(kind))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        ids.insert(kind, id);
        Ok(())
    }

    async fn latest(&self, kind: EntityKind, owner: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.ids.lock().await;
        let rows = self.read_rows(kind).await?;
        Ok(rows.into_iter().rev().find(|row| owned_by(row, owner)))
    }
}
