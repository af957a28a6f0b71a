use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use super::quota::{QuotaDefinition, QuotaScope};

/// One measured quota. Immutable once produced.
///
/// The utilization percentage is never stored; it is derived from the usage and
/// limit every time it is read or serialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UtilizationResult {
    quota_code: String,
    quota_name: String,
    category: String,
    scope: QuotaScope,
    current_usage: f64,
    limit: f64,
    #[serde(default)]
    resource_id: Option<String>,
    timestamp: DateTime<Utc>,
    strategy: String,
    source_service: String,
    /// Set when the usage is an approximation rather than a measurement.
    #[serde(default)]
    estimated: bool,
}

impl UtilizationResult {
    /// Build a result for `quota`. Negative or non-finite usage is clamped to zero.
    pub fn new(
        quota: &QuotaDefinition,
        current_usage: f64,
        limit: f64,
        resource_id: Option<String>,
    ) -> Self {
        let current_usage = if current_usage.is_finite() && current_usage > 0.0 {
            current_usage
        } else {
            0.0
        };
        Self {
            quota_code: quota.code.clone(),
            quota_name: quota.name.clone(),
            category: quota.category.clone(),
            scope: quota.scope,
            current_usage,
            limit: if limit.is_finite() { limit } else { 0.0 },
            resource_id,
            timestamp: Utc::now(),
            strategy: quota.strategy.name().to_string(),
            source_service: quota.strategy.source_service().to_string(),
            estimated: false,
        }
    }

    pub fn estimated(mut self) -> Self {
        self.estimated = true;
        self
    }

    pub fn quota_code(&self) -> &str {
        &self.quota_code
    }

    pub fn quota_name(&self) -> &str {
        &self.quota_name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn scope(&self) -> QuotaScope {
        self.scope
    }

    pub fn current_usage(&self) -> f64 {
        self.current_usage
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn source_service(&self) -> &str {
        &self.source_service
    }

    pub fn is_estimated(&self) -> bool {
        self.estimated
    }

    /// `current / limit * 100` when the limit is positive, otherwise 0.
    pub fn utilization_percentage(&self) -> f64 {
        if self.limit > 0.0 {
            self.current_usage / self.limit * 100.0
        } else {
            0.0
        }
    }
}

impl Serialize for UtilizationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UtilizationResult", 12)?;
        state.serialize_field("quota_code", &self.quota_code)?;
        state.serialize_field("quota_name", &self.quota_name)?;
        state.serialize_field("category", &self.category)?;
        state.serialize_field("scope", &self.scope)?;
        state.serialize_field("current_usage", &self.current_usage)?;
        state.serialize_field("limit", &self.limit)?;
        state.serialize_field("utilization_percentage", &self.utilization_percentage())?;
        state.serialize_field("resource_id", &self.resource_id)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("strategy", &self.strategy)?;
        state.serialize_field("source_service", &self.source_service)?;
        state.serialize_field("estimated", &self.estimated)?;
        state.end()
    }
}
