use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alert::ConsolidatedAlert;
use crate::error::{ErrorKind, RemoteError};

/// Category of a failure recorded during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleErrorKind {
    Throttling,
    Transient,
    Permission,
    Validation,
    NotFound,
    UnknownStrategy,
    Unknown,
    Storage,
    Notification,
    Deadline,
    Discovery,
    ServiceUnavailable,
}

impl From<ErrorKind> for CycleErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Throttling => CycleErrorKind::Throttling,
            ErrorKind::Transient => CycleErrorKind::Transient,
            ErrorKind::Permission => CycleErrorKind::Permission,
            ErrorKind::Validation => CycleErrorKind::Validation,
            ErrorKind::NotFound => CycleErrorKind::NotFound,
            ErrorKind::UnknownStrategy => CycleErrorKind::UnknownStrategy,
            ErrorKind::Unknown => CycleErrorKind::Unknown,
        }
    }
}

/// A failure local to one quota, resource or backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleError {
    pub kind: CycleErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub message: String,
}

impl CycleError {
    pub fn new(kind: CycleErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            quota_code: None,
            resource_id: None,
            service: None,
            message: message.into(),
        }
    }

    /// Record a remote failure that prevented a quota from being measured.
    pub fn from_remote(error: &RemoteError, quota_code: &str, resource_id: Option<&str>) -> Self {
        Self {
            kind: error.kind.into(),
            quota_code: Some(quota_code.to_string()),
            resource_id: resource_id.map(str::to_string),
            service: Some(error.service.clone()),
            message: error.to_string(),
        }
    }

    pub fn with_quota(mut self, quota_code: impl Into<String>) -> Self {
        self.quota_code = Some(quota_code.into());
        self
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// Structured outcome of one monitoring cycle. Always produced, even on abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub execution_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub resources_checked: usize,
    pub quotas_checked: usize,
    pub quotas_skipped: usize,
    pub violations_found: usize,
    pub alerts_generated: usize,
    pub alerts_sent: usize,
    /// Reason the cycle stopped early, when it did.
    pub aborted: Option<String>,
    pub errors: Vec<CycleError>,
}

impl CycleSummary {
    pub fn new(execution_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            execution_id,
            started_at,
            finished_at: started_at,
            resources_checked: 0,
            quotas_checked: 0,
            quotas_skipped: 0,
            violations_found: 0,
            alerts_generated: 0,
            alerts_sent: 0,
            aborted: None,
            errors: Vec::new(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Consolidated report persisted once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub execution_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub threshold_percentage: f64,
    pub target_count: usize,
    pub alerts: Vec<ConsolidatedAlert>,
}

impl MonitoringReport {
    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }
}
