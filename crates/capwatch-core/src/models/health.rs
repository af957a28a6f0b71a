use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health record of one remote service, updated on every call attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub healthy: bool,
    /// Required services abort the cycle when unhealthy.
    pub required: bool,
    /// False when the client could not be created at all.
    pub available: bool,
    pub last_error: Option<String>,
    pub last_checked: DateTime<Utc>,
    pub consecutive_failures: u32,
}

impl ServiceHealth {
    pub fn new(service: impl Into<String>, required: bool) -> Self {
        Self {
            service: service.into(),
            healthy: true,
            required,
            available: true,
            last_error: None,
            last_checked: Utc::now(),
            consecutive_failures: 0,
        }
    }

    /// Record for a service whose client could not be created.
    pub fn unavailable(service: impl Into<String>, required: bool, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            available: false,
            last_error: Some(error.into()),
            consecutive_failures: 1,
            ..Self::new(service, required)
        }
    }

    pub fn record_success(&mut self) {
        self.healthy = true;
        self.available = true;
        self.consecutive_failures = 0;
        self.last_checked = Utc::now();
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.healthy = false;
        self.last_error = Some(error.into());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_checked = Utc::now();
    }
}
