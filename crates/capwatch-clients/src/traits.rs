//! Remote collaborator traits
//!
//! Every remote service the monitor depends on is reached through one of these
//! traits. Implementations report failures as [`RemoteError`] so the retry
//! executor can classify them.

use async_trait::async_trait;
use capwatch_core::{RemoteError, Statistic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One page of a listing operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    /// Response fields keyed by name, e.g. `UserSummaryList`.
    pub fields: Map<String, Value>,
    /// Cursor for the next page, absent on the last page.
    pub next_token: Option<String>,
}

impl ListingPage {
    pub fn new(fields: Map<String, Value>, next_token: Option<String>) -> Self {
        Self { fields, next_token }
    }

    /// Build a page holding a single list under `result_key`.
    pub fn with_items(result_key: &str, items: Vec<Value>, next_token: Option<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(result_key.to_string(), Value::Array(items));
        Self { fields, next_token }
    }

    /// Items under `result_key`. A missing or non-list field yields no items.
    pub fn items(&self, result_key: &str) -> &[Value] {
        match self.fields.get(result_key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Resource listing API of one named service
#[async_trait]
pub trait ListingClient: Send + Sync {
    /// Invoke a listing or describe operation. The continuation cursor, when
    /// present, is passed in `params` under `NextToken`.
    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<ListingPage, RemoteError>;

    /// Cheap call used to verify connectivity.
    async fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Time-windowed statistic request
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<(String, String)>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub period_secs: i32,
    pub statistic: Statistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[async_trait]
pub trait MetricsClient: Send + Sync {
    async fn query(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, RemoteError>;

    async fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Usage and authoritative limit reported by a limit service
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LimitLookup {
    pub current_usage: Option<f64>,
    pub limit_value: Option<f64>,
}

#[async_trait]
pub trait LimitLookupClient: Send + Sync {
    async fn lookup(
        &self,
        service_code: &str,
        quota_code: &str,
        context_id: Option<&str>,
    ) -> Result<LimitLookup, RemoteError>;

    async fn ping(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Message rendered for every delivery protocol of a notification topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub default_text: String,
    pub email_text: String,
    pub sms_text: String,
    pub json_payload: Value,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        message: &NotificationMessage,
        subject: &str,
    ) -> Result<(), RemoteError>;

    /// Check that `topic` exists and is reachable.
    async fn validate_topic(&self, topic: &str) -> Result<(), RemoteError>;
}
