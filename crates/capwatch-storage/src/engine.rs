//! Storage engine
//!
//! Fans every write out to all configured backends. Each backend succeeds or
//! fails on its own and the outcome reports both.

use bytes::Bytes;
use capwatch_core::{MonitoringReport, UtilizationResult};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::keys;
use crate::traits::{
    item_size, ObjectSink, StorageError, StorageResult, TableItem, TableSchema, TableSink,
    TableState, TableValue, MAX_ITEM_BYTES,
};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Room kept for the attributes added to the latest pointer item.
const LATEST_ITEM_HEADROOM: usize = 1024;

/// Per-backend result of one logical write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOutcome {
    /// Backend name to success flag.
    pub per_backend: BTreeMap<String, bool>,
    pub errors: Vec<String>,
}

impl StoreOutcome {
    fn record(&mut self, backend: &str, result: Result<(), Vec<String>>) {
        match result {
            Ok(()) => {
                self.per_backend.insert(backend.to_string(), true);
            }
            Err(mut errors) => {
                self.per_backend.insert(backend.to_string(), false);
                self.errors.append(&mut errors);
            }
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.per_backend.values().all(|ok| *ok)
    }

    pub fn succeeded(&self) -> usize {
        self.per_backend.values().filter(|ok| **ok).count()
    }
}

/// Writes results and reports to every configured backend
#[derive(Clone, Default)]
pub struct StorageEngine {
    objects: Vec<Arc<dyn ObjectSink>>,
    tables: Vec<Arc<dyn TableSink>>,
    prefix: String,
}

impl StorageEngine {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            objects: Vec::new(),
            tables: Vec::new(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn with_object_sink(mut self, sink: Arc<dyn ObjectSink>) -> Self {
        self.objects.push(sink);
        self
    }

    pub fn with_table_sink(mut self, sink: Arc<dyn TableSink>) -> Self {
        self.tables.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.tables.is_empty()
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.objects
            .iter()
            .map(|s| s.name().to_string())
            .chain(self.tables.iter().map(|s| s.name().to_string()))
            .collect()
    }

    /// Make sure every table backend exists, creating missing tables and
    /// waiting until they are active or `timeout` elapses.
    pub async fn ensure_tables(
        &self,
        schema: &TableSchema,
        timeout: Duration,
        poll_interval: Duration,
    ) -> StoreOutcome {
        let mut outcome = StoreOutcome::default();
        for table in &self.tables {
            let result = ensure_table(table.as_ref(), schema, timeout, poll_interval).await;
            if let Err(e) = &result {
                tracing::error!(backend = %table.name(), error = %e, "Table is not usable");
            }
            outcome.record(
                table.name(),
                result.map_err(|e| vec![format!("{}: {}", table.name(), e)]),
            );
        }
        outcome
    }

    /// Persist the results of one target with a timestamped record and the
    /// target's latest pointer.
    #[tracing::instrument(skip(self, results), fields(target = %target, results = results.len()))]
    pub async fn store_results(
        &self,
        target: &str,
        execution_id: Uuid,
        results: &[UtilizationResult],
    ) -> StoreOutcome {
        let now = Utc::now();
        let write_id = Uuid::new_v4();
        let payload = json!({
            "target_id": target,
            "execution_id": execution_id,
            "timestamp": now,
            "result_count": results.len(),
            "results": results,
        });

        let body = match serde_json::to_vec_pretty(&payload) {
            Ok(body) => Bytes::from(body),
            Err(e) => return self.fail_all(&StorageError::from(e)),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("execution-id".to_string(), execution_id.to_string());
        metadata.insert("target-id".to_string(), target.to_string());

        let timestamped = keys::results_key(&self.prefix, target, now, write_id);
        let latest = keys::latest_results_key(&self.prefix, target);

        let mut item = TableItem::new();
        item.insert(
            "id".into(),
            format!("{}_{}", target, keys::short_id(write_id)).into(),
        );
        item.insert("timestamp".into(), timestamp(now).into());
        item.insert("execution_id".into(), execution_id.to_string().into());
        item.insert("target_id".into(), target.into());
        item.insert("result_count".into(), results.len().into());
        for result in results {
            item.insert(
                format!("quota_{}", result.quota_code()),
                TableValue::N(result.utilization_percentage()),
            );
        }
        attach_payload(&mut item, "data", payload.to_string());

        let outcome = self
            .write_all(&body, &metadata, &timestamped, &latest, item, &keys::latest_item_id(target))
            .await;
        log_outcome("results", &outcome);
        outcome
    }

    /// Persist the consolidated report of a cycle and the latest report pointer.
    #[tracing::instrument(skip(self, report), fields(execution_id = %report.execution_id))]
    pub async fn store_consolidated_report(&self, report: &MonitoringReport) -> StoreOutcome {
        let now = Utc::now();
        let write_id = Uuid::new_v4();

        let body = match serde_json::to_vec_pretty(report) {
            Ok(body) => Bytes::from(body),
            Err(e) => return self.fail_all(&StorageError::from(e)),
        };
        // The full violations are in report_data; the item keeps one line per alert.
        let alert_summaries: Vec<_> = report
            .alerts
            .iter()
            .map(|alert| {
                json!({
                    "target_id": alert.target_id,
                    "target_name": alert.target_name,
                    "scope": alert.scope,
                    "severity": alert.severity,
                    "violation_count": alert.violation_count(),
                })
            })
            .collect();
        let alerts = serde_json::Value::from(alert_summaries).to_string();
        let report_data = match serde_json::to_string(report) {
            Ok(data) => data,
            Err(e) => return self.fail_all(&StorageError::from(e)),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("execution-id".to_string(), report.execution_id.to_string());

        let timestamped = keys::report_key(&self.prefix, now, write_id);
        let latest = keys::latest_report_key(&self.prefix);

        let mut item = TableItem::new();
        item.insert("id".into(), format!("report_{}", report.execution_id).into());
        item.insert("timestamp".into(), timestamp(now).into());
        item.insert("execution_id".into(), report.execution_id.to_string().into());
        item.insert("threshold_percentage".into(), report.threshold_percentage.into());
        item.insert("alert_count".into(), report.alert_count().into());
        item.insert("target_count".into(), report.target_count.into());
        item.insert("alerts".into(), alerts.into());
        attach_payload(&mut item, "report_data", report_data);

        let outcome = self
            .write_all(&body, &metadata, &timestamped, &latest, item, keys::LATEST_REPORT_ITEM_ID)
            .await;
        log_outcome("report", &outcome);
        outcome
    }

    async fn write_all(
        &self,
        body: &Bytes,
        metadata: &BTreeMap<String, String>,
        timestamped_key: &str,
        latest_key: &str,
        item: TableItem,
        latest_item_id: &str,
    ) -> StoreOutcome {
        let object_writes = self.objects.iter().map(|sink| async move {
            let mut errors = Vec::new();
            for key in [timestamped_key, latest_key] {
                if let Err(e) = sink
                    .put(key, body.clone(), JSON_CONTENT_TYPE, metadata)
                    .await
                {
                    errors.push(format!("{}: {}: {}", sink.name(), key, e));
                }
            }
            (sink.name().to_string(), errors)
        });

        let mut latest_item = item.clone();
        latest_item.insert("id".into(), latest_item_id.into());
        latest_item.insert("timestamp".into(), keys::LATEST_TIMESTAMP.into());
        latest_item.insert("written_at".into(), timestamp(Utc::now()).into());

        let table_writes = self.tables.iter().map(|sink| {
            let item = item.clone();
            let latest_item = latest_item.clone();
            async move {
                let mut errors = Vec::new();
                for record in [item, latest_item] {
                    if let Err(e) = sink.put_item(record).await {
                        errors.push(format!("{}: {}", sink.name(), e));
                    }
                }
                (sink.name().to_string(), errors)
            }
        });

        let (objects, tables) = futures::join!(join_all(object_writes), join_all(table_writes));

        let mut outcome = StoreOutcome::default();
        for (backend, errors) in objects.into_iter().chain(tables) {
            let result = if errors.is_empty() { Ok(()) } else { Err(errors) };
            outcome.record(&backend, result);
        }
        outcome
    }

    fn fail_all(&self, error: &StorageError) -> StoreOutcome {
        let mut outcome = StoreOutcome::default();
        for name in self.backend_names() {
            outcome.record(&name, Err(vec![format!("{}: {}", name, error)]));
        }
        outcome
    }
}

/// Store `payload` under `attribute` unless the item would outgrow the table
/// item limit. Oversized payloads stay in the object backends only.
fn attach_payload(item: &mut TableItem, attribute: &str, payload: String) {
    let size = item_size(item) + attribute.len() + payload.len();
    if size + LATEST_ITEM_HEADROOM <= MAX_ITEM_BYTES {
        item.insert(attribute.into(), payload.into());
    } else {
        tracing::warn!(
            attribute,
            bytes = size,
            limit = MAX_ITEM_BYTES,
            "Payload too large for table item, storing summary only"
        );
        item.insert(format!("{}_omitted", attribute), true.into());
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn log_outcome(kind: &str, outcome: &StoreOutcome) {
    if outcome.all_succeeded() {
        tracing::info!(kind, backends = outcome.per_backend.len(), "Stored");
    } else {
        tracing::warn!(
            kind,
            succeeded = outcome.succeeded(),
            failed = outcome.per_backend.len() - outcome.succeeded(),
            errors = ?outcome.errors,
            "Storage partially failed"
        );
    }
}

async fn ensure_table(
    table: &dyn TableSink,
    schema: &TableSchema,
    timeout: Duration,
    poll_interval: Duration,
) -> StorageResult<()> {
    match table.describe_table().await? {
        TableState::Active => {
            tracing::debug!(backend = %table.name(), "Table exists");
            return Ok(());
        }
        TableState::Missing => {
            tracing::info!(backend = %table.name(), table = %schema.table_name, "Creating table");
            table.create_table(schema).await?;
        }
        TableState::Creating => {}
    }

    let wait = async {
        loop {
            if table.describe_table().await? == TableState::Active {
                return Ok::<(), StorageError>(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => {
            result?;
            tracing::info!(backend = %table.name(), "Table is active");
            Ok(())
        }
        Err(_) => Err(StorageError::TableNotReady {
            table: schema.table_name.clone(),
            reason: format!("still creating after {}s", timeout.as_secs()),
        }),
    }
}
