//! Console rendering of cycle results.

use anyhow::Result;
use capwatch_core::{truncate_string, CycleSummary, ServiceHealth, UtilizationResult};

const NAME_WIDTH: usize = 36;

/// Utilization table, highest utilization first.
pub fn render_results_table(results: &[UtilizationResult], account_alias: &str) -> String {
    if results.is_empty() {
        return "No quotas measured.\n".to_string();
    }

    let mut rows: Vec<&UtilizationResult> = results.iter().collect();
    rows.sort_by(|a, b| {
        b.utilization_percentage()
            .total_cmp(&a.utilization_percentage())
            .then_with(|| a.quota_code().cmp(b.quota_code()))
    });

    let mut out = format!(
        "{:<24} {:<width$} {:>10} {:>10} {:>8}\n",
        "Target",
        "Quota",
        "Usage",
        "Limit",
        "Util%",
        width = NAME_WIDTH
    );
    out.push_str(&"-".repeat(24 + NAME_WIDTH + 10 + 10 + 8 + 4));
    out.push('\n');

    for result in rows {
        let target = result.resource_id().unwrap_or(account_alias);
        // estimated usage is flagged instead of shown as a percentage
        let marker = if result.is_estimated() { "~" } else { "%" };
        out.push_str(&format!(
            "{:<24} {:<width$} {:>10.1} {:>10.1} {:>7.1}{}\n",
            truncate_string(target, 24),
            truncate_string(result.quota_name(), NAME_WIDTH),
            result.current_usage(),
            result.limit(),
            result.utilization_percentage(),
            marker,
            width = NAME_WIDTH
        ));
    }
    out
}

pub fn summary_json(summary: &CycleSummary) -> Result<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

pub fn health_json(health: &[ServiceHealth]) -> Result<String> {
    Ok(serde_json::to_string_pretty(health)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capwatch_core::{MeasurementStrategy, QuotaDefinition, QuotaScope};

    fn result(code: &str, scope: QuotaScope, usage: f64, resource: Option<&str>) -> UtilizationResult {
        let quota = QuotaDefinition {
            code: code.into(),
            name: format!("{} quota", code),
            category: "General".into(),
            scope,
            strategy: MeasurementStrategy::Unmeasurable,
            default_limit: 100.0,
            context_required: false,
            service_code: None,
        };
        UtilizationResult::new(&quota, usage, 100.0, resource.map(String::from))
    }

    fn summary() -> CycleSummary {
        let mut summary = CycleSummary::new(Default::default(), Default::default());
        summary.quotas_checked = 4;
        summary
    }

    #[test]
    fn table_orders_by_utilization() {
        let results = vec![
            result("L-LOW", QuotaScope::Resource, 10.0, Some("i-1")),
            result("L-HIGH", QuotaScope::Resource, 95.0, Some("i-1")),
            result("L-RATE", QuotaScope::Account, 50.0, None),
        ];
        let table = render_results_table(&results, "prod");
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("Target"));
        assert!(lines[2].contains("L-HIGH quota"));
        assert!(lines[2].contains("95.0%"));
        assert!(lines[3].starts_with("prod"));
        assert!(lines[4].contains("L-LOW quota"));
    }

    #[test]
    fn estimated_results_are_marked() {
        let results = vec![result("L-RATE", QuotaScope::Account, 90.0, None).estimated()];
        let table = render_results_table(&results, "prod");
        assert!(table.lines().nth(2).unwrap().ends_with("90.0~"));
    }

    #[test]
    fn empty_results_render_placeholder() {
        assert_eq!(render_results_table(&[], "prod"), "No quotas measured.\n");
    }

    #[test]
    fn summary_serializes_counts() {
        let json = summary_json(&summary()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["quotas_checked"], 4);
    }
}
