//! Violation consolidation
//!
//! Groups threshold breaches by target so that every target produces at most
//! one alert per cycle, however many of its quotas are over the threshold.

use capwatch_core::{
    ConsolidatedAlert, QuotaScope, Severity, UtilizationResult, ViolationRecord,
};
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// Builds one [`ConsolidatedAlert`] per target with violations
#[derive(Debug, Clone)]
pub struct ViolationConsolidator {
    account_target: String,
    target_names: HashMap<String, String>,
}

impl ViolationConsolidator {
    /// `account_target` identifies the account in account-scoped alerts.
    pub fn new(account_target: impl Into<String>) -> Self {
        Self {
            account_target: account_target.into(),
            target_names: HashMap::new(),
        }
    }

    /// Display names of resources, keyed by resource id.
    pub fn with_target_names(mut self, names: HashMap<String, String>) -> Self {
        self.target_names = names;
        self
    }

    fn target_of(&self, result: &UtilizationResult) -> (QuotaScope, String) {
        match result.scope() {
            QuotaScope::Account => (QuotaScope::Account, self.account_target.clone()),
            QuotaScope::Resource => (
                QuotaScope::Resource,
                result.resource_id().unwrap_or("unknown").to_string(),
            ),
        }
    }

    /// Alerts for every target with at least one result at or above `threshold`.
    ///
    /// Account alerts come first, then resources ordered by id.
    pub fn consolidate(
        &self,
        results: &[UtilizationResult],
        threshold: f64,
    ) -> Vec<ConsolidatedAlert> {
        let mut partitions: BTreeMap<(u8, String), (QuotaScope, Vec<ViolationRecord>)> =
            BTreeMap::new();

        for result in results {
            if result.utilization_percentage() < threshold {
                continue;
            }
            let (scope, target) = self.target_of(result);
            let rank = match scope {
                QuotaScope::Account => 0,
                QuotaScope::Resource => 1,
            };
            partitions
                .entry((rank, target))
                .or_insert_with(|| (scope, Vec::new()))
                .1
                .push(ViolationRecord::new(result.clone()));
        }

        let alerts: Vec<ConsolidatedAlert> = partitions
            .into_iter()
            .map(|((_, target_id), (scope, violations))| {
                self.build_alert(scope, target_id, violations, threshold)
            })
            .collect();

        if !alerts.is_empty() {
            tracing::info!(
                alerts = alerts.len(),
                violations = alerts.iter().map(|a| a.violation_count()).sum::<usize>(),
                threshold,
                "Violations consolidated"
            );
        }
        alerts
    }

    fn build_alert(
        &self,
        scope: QuotaScope,
        target_id: String,
        mut violations: Vec<ViolationRecord>,
        threshold: f64,
    ) -> ConsolidatedAlert {
        violations.sort_by(|a, b| {
            b.result
                .utilization_percentage()
                .total_cmp(&a.result.utilization_percentage())
                .then_with(|| a.result.quota_code().cmp(b.result.quota_code()))
        });

        let severity = violations
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or(Severity::Low);
        let target_name = self
            .target_names
            .get(&target_id)
            .cloned()
            .unwrap_or_else(|| target_id.clone());

        let message = render_message(&target_name, &target_id, &violations, severity, threshold);
        let payload = json!({
            "alert_type": "QUOTA_UTILIZATION",
            "scope": scope,
            "target_id": target_id,
            "target_name": target_name,
            "severity": severity,
            "threshold_percentage": threshold,
            "violation_count": violations.len(),
            "violations": violations,
            "timestamp": Utc::now(),
        });

        ConsolidatedAlert {
            scope,
            target_id,
            target_name,
            violations,
            severity,
            message,
            payload,
        }
    }
}

/// Alert body with violations grouped by category.
fn render_message(
    target_name: &str,
    target_id: &str,
    violations: &[ViolationRecord],
    severity: Severity,
    threshold: f64,
) -> String {
    let mut by_category: BTreeMap<&str, Vec<&ViolationRecord>> = BTreeMap::new();
    for violation in violations {
        by_category
            .entry(violation.result.category())
            .or_default()
            .push(violation);
    }

    let mut message = String::new();
    if target_name == target_id {
        let _ = writeln!(message, "Quota utilization alert for {}", target_name);
    } else {
        let _ = writeln!(
            message,
            "Quota utilization alert for {} ({})",
            target_name, target_id
        );
    }
    let _ = writeln!(
        message,
        "{} quota(s) at or above {:.0}% of their limit. Highest severity: {}",
        violations.len(),
        threshold,
        severity
    );

    for (category, members) in by_category {
        let _ = writeln!(message);
        let _ = writeln!(message, "[{}]", category);
        for violation in members {
            let result = &violation.result;
            let _ = writeln!(
                message,
                "  - {}: {:.1}% ({} / {}) {}{}",
                result.quota_name(),
                result.utilization_percentage(),
                format_amount(result.current_usage()),
                format_amount(result.limit()),
                violation.severity,
                if result.is_estimated() { " (estimated)" } else { "" }
            );
        }
    }
    message
}

pub(crate) fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
