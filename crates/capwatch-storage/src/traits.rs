//! Storage sink traits
//!
//! Backends implement [`ObjectSink`] (key/value blobs) or [`TableSink`]
//! (typed items with a composite key). The [`StorageEngine`](crate::StorageEngine)
//! decides what is written where.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Table {table} not ready: {reason}")]
    TableNotReady { table: String, reason: String },

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object-store backend (S3 bucket, local directory, memory)
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Backend name used in outcomes and logs, e.g. `s3://bucket`.
    fn name(&self) -> &str;

    /// Write `data` under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<()>;
}

/// Typed attribute value of a table item
#[derive(Debug, Clone, PartialEq)]
pub enum TableValue {
    S(String),
    N(f64),
    Bool(bool),
}

impl TableValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TableValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TableValue::N(n) => Some(*n),
            _ => None,
        }
    }

    /// Stored size in bytes. Numbers are counted at their largest encoding.
    pub fn size(&self) -> usize {
        match self {
            TableValue::S(s) => s.len(),
            TableValue::N(_) => 21,
            TableValue::Bool(_) => 1,
        }
    }
}

impl From<&str> for TableValue {
    fn from(value: &str) -> Self {
        TableValue::S(value.to_string())
    }
}

impl From<String> for TableValue {
    fn from(value: String) -> Self {
        TableValue::S(value)
    }
}

impl From<f64> for TableValue {
    fn from(value: f64) -> Self {
        TableValue::N(value)
    }
}

impl From<usize> for TableValue {
    fn from(value: usize) -> Self {
        TableValue::N(value as f64)
    }
}

impl From<bool> for TableValue {
    fn from(value: bool) -> Self {
        TableValue::Bool(value)
    }
}

pub type TableItem = BTreeMap<String, TableValue>;

/// Largest item a table backend accepts (the DynamoDB item limit).
pub const MAX_ITEM_BYTES: usize = 400 * 1024;

/// Stored size of `item`: attribute names plus values.
pub fn item_size(item: &TableItem) -> usize {
    item.iter().map(|(name, value)| name.len() + value.size()).sum()
}

/// Lifecycle state of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Missing,
    Creating,
    Active,
}

/// Key layout of the monitoring table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub partition_key: String,
    pub sort_key: String,
    pub index_name: String,
    pub index_partition_key: String,
}

impl TableSchema {
    /// Composite key (`id`, `timestamp`) with a `TargetIdIndex` on (`target_id`, `timestamp`).
    pub fn monitoring(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key: "id".to_string(),
            sort_key: "timestamp".to_string(),
            index_name: "TargetIdIndex".to_string(),
            index_partition_key: "target_id".to_string(),
        }
    }
}

/// Table-store backend (DynamoDB, memory)
#[async_trait]
pub trait TableSink: Send + Sync {
    fn name(&self) -> &str;

    async fn put_item(&self, item: TableItem) -> StorageResult<()>;

    async fn describe_table(&self) -> StorageResult<TableState>;

    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()>;
}
