//! JSON-file record store
//!
//! One document per record at `<dir>/records/<id>.json`. Writes land in a
//! temporary file that is renamed into place, so readers never observe a
//! partially written record. Listings skip files that fail to parse;
//! `get` on such an id still reports the corruption.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, TierMemError};
use crate::memory::types::{Record, Tier};
use crate::storage::{RecordStore, RecordStream};

const RECORDS_DIR: &str = "records";
const RECORD_EXT: &str = "json";

#[derive(Debug, Clone)]
pub struct FileStore {
    records_dir: PathBuf,
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> TierMemError {
    TierMemError::StorageUnavailable(format!("{context}: {e}"))
}

impl FileStore {
    pub async fn open(dir: &Path) -> Result<Self> {
        let records_dir = dir.join(RECORDS_DIR);
        fs::create_dir_all(&records_dir).await.map_err(|e| {
            storage_err(
                &format!("Failed to create record directory {}", records_dir.display()),
                e,
            )
        })?;
        Ok(Self { records_dir })
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.records_dir.join(format!("{id}.{RECORD_EXT}"))
    }

    async fn read_record(path: &Path) -> Result<Option<Record>> {
        match fs::read(path).await {
            Ok(bytes) => {
                let record: Record = serde_json::from_slice(&bytes).map_err(|e| {
                    TierMemError::Serialization(format!(
                        "Corrupt record file {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err(
                &format!("Failed to read {}", path.display()),
                e,
            )),
        }
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT)
}

#[async_trait]
impl RecordStore for FileStore {
    async fn put(&self, record: &Record) -> Result<Uuid> {
        let bytes = serde_json::to_vec(record)?;
        let path = self.record_path(record.id);
        let tmp = self
            .records_dir
            .join(format!("{}.{}.tmp", record.id, Uuid::new_v4().simple()));

        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| storage_err("Failed to write record", e))?;

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(storage_err("Failed to commit record", e));
        }

        Ok(record.id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Record>> {
        Self::read_record(&self.record_path(id)).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_err("Failed to delete record", e)),
        }
    }

    async fn list_by_tier(&self, tier: Tier) -> Result<RecordStream> {
        let entries = fs::read_dir(&self.records_dir)
            .await
            .map_err(|e| storage_err("Failed to list records", e))?;

        let records = stream::unfold(Some(entries), move |state| async move {
            let mut entries = state?;
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let path = entry.path();
                        if !is_record_file(&path) {
                            continue;
                        }
                        match Self::read_record(&path).await {
                            Ok(Some(record)) if record.tier == tier => {
                                return Some((Ok(record), Some(entries)));
                            }
                            // Deleted between listing and reading, or another tier
                            Ok(_) => continue,
                            Err(TierMemError::Serialization(reason)) => {
                                warn!(%reason, "Skipping unreadable record file");
                                continue;
                            }
                            Err(e) => return Some((Err(e), Some(entries))),
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => return Some((Err(storage_err("Failed to list records", e)), None)),
                }
            }
        });

        Ok(Box::pin(records))
    }
}
