//! Capwatch Storage Library
//!
//! Persists utilization batches and consolidated reports to any number of
//! object-store and table-store backends. Backends are written independently:
//! one failing never blocks another.
//!
//! # Key format
//!
//! Object keys live under a configurable prefix:
//!
//! - **Results**: `{prefix}/metrics/{YYYY-MM-DD}/{target}/{HHMMSS}-{id8}.json`
//! - **Latest results**: `{prefix}/metrics/latest/{target}.json`
//! - **Reports**: `{prefix}/reports/{YYYY/MM/DD}/quota_report_{YYYYMMDD_HHMMSS}-{id8}.json`
//! - **Latest report**: `{prefix}/reports/latest/quota_report.json`
//!
//! Table items use the composite key (`id`, `timestamp`). Latest pointers are
//! the items `{target}#latest` and `report#latest` with timestamp `LATEST`.

pub mod engine;
pub(crate) mod keys;
#[cfg(feature = "storage-dynamodb")]
pub mod dynamodb;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "storage-dynamodb")]
pub use dynamodb::DynamoTableSink;
pub use engine::{StorageEngine, StoreOutcome};
#[cfg(feature = "storage-local")]
pub use local::LocalObjectSink;
pub use memory::{InMemoryObjectSink, InMemoryTableSink};
#[cfg(feature = "storage-s3")]
pub use s3::S3ObjectSink;
pub use traits::{
    item_size, ObjectSink, StorageError, StorageResult, TableItem, TableSchema, TableSink,
    TableState, TableValue, MAX_ITEM_BYTES,
};
