use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};

use super::quota::QuotaScope;
use super::utilization::UtilizationResult;

/// Severity tier of a violation, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// `>=95` Critical, `>=90` High, `>=85` Medium, otherwise Low.
    pub fn from_utilization(percentage: f64) -> Self {
        if percentage >= 95.0 {
            Severity::Critical
        } else if percentage >= 90.0 {
            Severity::High
        } else if percentage >= 85.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A utilization result that crossed the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    #[serde(flatten)]
    pub result: UtilizationResult,
    pub severity: Severity,
}

impl ViolationRecord {
    pub fn new(result: UtilizationResult) -> Self {
        let severity = Severity::from_utilization(result.utilization_percentage());
        Self { result, severity }
    }
}

/// One alert per target, carrying every violation found for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedAlert {
    pub scope: QuotaScope,
    /// Account alias or resource id.
    pub target_id: String,
    /// Display name of the target (resource alias when known).
    pub target_name: String,
    /// Sorted by utilization, highest first.
    pub violations: Vec<ViolationRecord>,
    pub severity: Severity,
    pub message: String,
    pub payload: Value,
}

impl ConsolidatedAlert {
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }
}

/// Channel-specific renderings of one alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub subject: String,
    pub default_text: String,
    pub email_text: String,
    pub sms_text: String,
    pub json_payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_tiers() {
        assert_eq!(Severity::from_utilization(99.0), Severity::Critical);
        assert_eq!(Severity::from_utilization(95.0), Severity::Critical);
        assert_eq!(Severity::from_utilization(94.9), Severity::High);
        assert_eq!(Severity::from_utilization(90.0), Severity::High);
        assert_eq!(Severity::from_utilization(85.0), Severity::Medium);
        assert_eq!(Severity::from_utilization(82.0), Severity::Low);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(
            [Severity::Low, Severity::Critical, Severity::Medium].iter().max(),
            Some(&Severity::Critical)
        );
    }
}
