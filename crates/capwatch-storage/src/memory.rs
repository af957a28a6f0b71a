//! In-memory sinks for dry runs and tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::traits::{
    ObjectSink, StorageError, StorageResult, TableItem, TableSchema, TableSink, TableState,
};

/// Stored object with its content type and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::BackendError("in-memory store lock poisoned".to_string()))
}

/// Objects kept in a map keyed by object key
#[derive(Clone, Default)]
pub struct InMemoryObjectSink {
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    fail_writes: bool,
}

impl InMemoryObjectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every write fails.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        lock(&self.objects).ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectSink for InMemoryObjectSink {
    fn name(&self) -> &str {
        "memory-objects"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &BTreeMap<String, String>,
    ) -> StorageResult<()> {
        if self.fail_writes {
            return Err(StorageError::WriteFailed(format!("refused write to {}", key)));
        }
        lock(&self.objects)?.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }
}

/// Items kept in a map keyed by (`id`, `timestamp`)
#[derive(Clone, Default)]
pub struct InMemoryTableSink {
    items: Arc<Mutex<BTreeMap<(String, String), TableItem>>>,
    state: Arc<Mutex<Option<TableState>>>,
}

impl InMemoryTableSink {
    /// Table that already exists.
    pub fn new() -> Self {
        Self {
            items: Arc::default(),
            state: Arc::new(Mutex::new(Some(TableState::Active))),
        }
    }

    /// Table that has to be created before use.
    pub fn missing() -> Self {
        Self {
            items: Arc::default(),
            state: Arc::new(Mutex::new(Some(TableState::Missing))),
        }
    }

    pub fn get(&self, id: &str, timestamp: &str) -> Option<TableItem> {
        lock(&self.items)
            .ok()?
            .get(&(id.to_string(), timestamp.to_string()))
            .cloned()
    }

    pub fn items(&self) -> Vec<TableItem> {
        lock(&self.items)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TableSink for InMemoryTableSink {
    fn name(&self) -> &str {
        "memory-table"
    }

    async fn put_item(&self, item: TableItem) -> StorageResult<()> {
        if lock(&self.state)?.as_ref() != Some(&TableState::Active) {
            return Err(StorageError::TableNotReady {
                table: self.name().to_string(),
                reason: "table is not active".to_string(),
            });
        }
        let key_part = |name: &str| {
            item.get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| StorageError::InvalidKey(format!("item is missing '{}'", name)))
        };
        let key = (key_part("id")?, key_part("timestamp")?);
        lock(&self.items)?.insert(key, item);
        Ok(())
    }

    async fn describe_table(&self) -> StorageResult<TableState> {
        Ok(lock(&self.state)?.unwrap_or(TableState::Missing))
    }

    async fn create_table(&self, _schema: &TableSchema) -> StorageResult<()> {
        // Creation completes immediately.
        *lock(&self.state)? = Some(TableState::Active);
        Ok(())
    }
}
