//! LanceDB record store: one `records` table per namespace, upserts via `merge_insert`

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::{TryStreamExt, stream};
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use uuid::Uuid;

use crate::error::{Result, TierMemError};
use crate::memory::types::{Record, RecordKind, Tier};
use crate::storage::{RecordStore, RecordStream};

const RECORDS_TABLE: &str = "records";

fn storage_err(msg: impl Into<String>) -> TierMemError {
    TierMemError::StorageUnavailable(msg.into())
}

/// LanceDB-backed record store. One table per namespace directory.
pub struct LanceStore {
    connection: Connection,
    table: Table,
    dimension: usize,
}

impl LanceStore {
    /// Connect to `path` and open the records table, creating it on first use
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| storage_err("Invalid path encoding"))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| storage_err(format!("Failed to connect to LanceDB: {e}")))?;

        let existing = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| storage_err(format!("Failed to list tables: {e}")))?;

        let table = if existing.iter().any(|n| n == RECORDS_TABLE) {
            connection
                .open_table(RECORDS_TABLE)
                .execute()
                .await
                .map_err(|e| storage_err(format!("Failed to open records table: {e}")))?
        } else {
            let schema = Self::records_schema(dimension)?;
            let batch = Self::records_to_batch(&[], schema.clone(), dimension)?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(RECORDS_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| storage_err(format!("Failed to create records table: {e}")))?
        };

        Ok(Self {
            connection,
            table,
            dimension,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn records_schema(dimension: usize) -> Result<Arc<Schema>> {
        let size = i32::try_from(dimension)
            .map_err(|_| storage_err(format!("Embedding dimension {dimension} too large")))?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), size),
                false,
            ),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "last_accessed",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("access_count", DataType::Int64, false),
            Field::new("tier", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
        ])))
    }

    /// Convert records to an Arrow RecordBatch
    fn records_to_batch(
        records: &[Record],
        schema: Arc<Schema>,
        dimension: usize,
    ) -> Result<RecordBatch> {
        let size = i32::try_from(dimension)
            .map_err(|_| storage_err(format!("Embedding dimension {dimension} too large")))?;

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            return Err(TierMemError::Serialization(format!(
                "Record {} has a {}-dimensional embedding, table expects {dimension}",
                bad.id,
                bad.embedding.len()
            )));
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let kinds: Vec<&str> = records.iter().map(|r| r.kind.as_str()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();

        let embeddings: Vec<Option<Vec<Option<f32>>>> = records
            .iter()
            .map(|r| Some(r.embedding.iter().map(|&v| Some(v)).collect()))
            .collect();

        let created_at: Vec<i64> = records
            .iter()
            .map(|r| r.created_at.timestamp_micros())
            .collect();
        let last_accessed: Vec<i64> = records
            .iter()
            .map(|r| r.last_accessed.timestamp_micros())
            .collect();
        let access_counts: Vec<i64> = records.iter().map(|r| i64::from(r.access_count)).collect();
        let tiers: Vec<&str> = records.iter().map(|r| r.tier.as_str()).collect();

        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<std::result::Result<_, _>>()?;
        let metadata_refs: Vec<&str> = metadata.iter().map(String::as_str).collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(id_refs)),
                Arc::new(StringArray::from(kinds)),
                Arc::new(StringArray::from(texts)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, size)),
                Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
                Arc::new(TimestampMicrosecondArray::from(last_accessed).with_timezone("UTC")),
                Arc::new(Int64Array::from(access_counts)),
                Arc::new(StringArray::from(tiers)),
                Arc::new(StringArray::from(metadata_refs)),
            ],
        )
        .map_err(|e| storage_err(format!("Failed to create RecordBatch: {e}")))
    }

    fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<T>())
            .ok_or_else(|| storage_err(format!("Failed to get {name} column")))
    }

    fn timestamp(array: &TimestampMicrosecondArray, row: usize, name: &str) -> Result<DateTime<Utc>> {
        Utc.timestamp_micros(array.value(row))
            .single()
            .ok_or_else(|| storage_err(format!("Failed to parse {name} timestamp")))
    }

    /// Convert an Arrow RecordBatch row back to a Record
    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<Record> {
        let id_array = Self::column::<StringArray>(batch, "id")?;
        let kind_array = Self::column::<StringArray>(batch, "kind")?;
        let text_array = Self::column::<StringArray>(batch, "text")?;
        let embedding_array = Self::column::<FixedSizeListArray>(batch, "embedding")?;
        let created_at_array = Self::column::<TimestampMicrosecondArray>(batch, "created_at")?;
        let last_accessed_array =
            Self::column::<TimestampMicrosecondArray>(batch, "last_accessed")?;
        let access_count_array = Self::column::<Int64Array>(batch, "access_count")?;
        let tier_array = Self::column::<StringArray>(batch, "tier")?;
        let metadata_array = Self::column::<StringArray>(batch, "metadata")?;

        let id = Uuid::parse_str(id_array.value(row))
            .map_err(|e| storage_err(format!("Failed to parse UUID: {e}")))?;

        let embedding_list = embedding_array.value(row);
        let embedding_values = embedding_list
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| storage_err("Failed to get embedding values"))?;
        let embedding: Vec<f32> = embedding_values.values().to_vec();

        let metadata: BTreeMap<String, String> = serde_json::from_str(metadata_array.value(row))?;

        Ok(Record {
            id,
            kind: kind_array.value(row).parse::<RecordKind>()?,
            text: text_array.value(row).to_string(),
            embedding,
            created_at: Self::timestamp(created_at_array, row, "created_at")?,
            last_accessed: Self::timestamp(last_accessed_array, row, "last_accessed")?,
            access_count: u32::try_from(access_count_array.value(row)).unwrap_or(u32::MAX),
            tier: tier_array.value(row).parse::<Tier>()?,
            metadata,
        })
    }
}

#[async_trait]
impl RecordStore for LanceStore {
    async fn put(&self, record: &Record) -> Result<Uuid> {
        let schema = Self::records_schema(self.dimension)?;
        let batch = Self::records_to_batch(std::slice::from_ref(record), schema.clone(), self.dimension)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge_insert = self.table.merge_insert(&["id"]);
        merge_insert
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge_insert
            .execute(Box::new(reader))
            .await
            .map_err(|e| storage_err(format!("Failed to upsert record: {e}")))?;

        Ok(record.id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Record>> {
        let stream = self
            .table
            .query()
            .only_if(format!("id = '{id}'"))
            .execute()
            .await
            .map_err(|e| storage_err(format!("Failed to query record: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| storage_err(format!("Failed to collect query results: {e}")))?;

        match batches.iter().find(|b| b.num_rows() > 0) {
            Some(batch) => Ok(Some(Self::batch_to_record(batch, 0)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let exists = self
            .table
            .count_rows(Some(format!("id = '{id}'")))
            .await
            .map_err(|e| storage_err(format!("Failed to look up record: {e}")))?
            > 0;

        if exists {
            self.table
                .delete(&format!("id = '{id}'"))
                .await
                .map_err(|e| storage_err(format!("Failed to delete record: {e}")))?;
        }

        Ok(exists)
    }

    async fn list_by_tier(&self, tier: Tier) -> Result<RecordStream> {
        let batches = self
            .table
            .query()
            .only_if(format!("tier = '{}'", tier.as_str()))
            .execute()
            .await
            .map_err(|e| storage_err(format!("Failed to query by tier: {e}")))?;

        let records = batches
            .map_err(|e| storage_err(format!("Failed to read tier results: {e}")))
            .map_ok(|batch| {
                let rows: Vec<Result<Record>> = (0..batch.num_rows())
                    .map(|row| Self::batch_to_record(&batch, row))
                    .collect();
                stream::iter(rows)
            })
            .try_flatten();

        Ok(Box::pin(records))
    }

    async fn count_by_tier(&self, tier: Tier) -> Result<usize> {
        self.table
            .count_rows(Some(format!("tier = '{}'", tier.as_str())))
            .await
            .map_err(|e| storage_err(format!("Failed to count by tier: {e}")))
    }

    async fn total_count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| storage_err(format!("Failed to count records: {e}")))
    }
}
