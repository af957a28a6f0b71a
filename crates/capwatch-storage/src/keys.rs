//! Shared key generation for storage backends.
//!
//! All object backends use the same layout; see the crate root documentation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// First eight characters of an id, used to keep same-second writes apart.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Make a target id safe to use as a single key segment.
pub fn sanitize_segment(target: &str) -> String {
    let cleaned: String = target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn join(prefix: &str, rest: String) -> String {
    if prefix.is_empty() {
        rest
    } else {
        format!("{}/{}", prefix, rest)
    }
}

/// `{prefix}/metrics/{YYYY-MM-DD}/{target}/{HHMMSS}-{id8}.json`
pub fn results_key(prefix: &str, target: &str, at: DateTime<Utc>, write_id: Uuid) -> String {
    join(
        prefix,
        format!(
            "metrics/{}/{}/{}-{}.json",
            at.format("%Y-%m-%d"),
            sanitize_segment(target),
            at.format("%H%M%S"),
            short_id(write_id)
        ),
    )
}

/// `{prefix}/metrics/latest/{target}.json`
pub fn latest_results_key(prefix: &str, target: &str) -> String {
    join(prefix, format!("metrics/latest/{}.json", sanitize_segment(target)))
}

/// `{prefix}/reports/{YYYY/MM/DD}/quota_report_{YYYYMMDD_HHMMSS}-{id8}.json`
pub fn report_key(prefix: &str, at: DateTime<Utc>, write_id: Uuid) -> String {
    join(
        prefix,
        format!(
            "reports/{}/quota_report_{}-{}.json",
            at.format("%Y/%m/%d"),
            at.format("%Y%m%d_%H%M%S"),
            short_id(write_id)
        ),
    )
}

/// `{prefix}/reports/latest/quota_report.json`
pub fn latest_report_key(prefix: &str) -> String {
    join(prefix, "reports/latest/quota_report.json".to_string())
}

/// Table id of the latest results pointer of `target`.
pub fn latest_item_id(target: &str) -> String {
    format!("{}#latest", target)
}

pub const LATEST_REPORT_ITEM_ID: &str = "report#latest";
pub const LATEST_TIMESTAMP: &str = "LATEST";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap()
    }

    #[test]
    fn results_key_layout() {
        let id = Uuid::parse_str("1234abcd-0000-0000-0000-000000000000").unwrap();
        assert_eq!(
            results_key("quota-monitor", "instance-1", at(), id),
            "quota-monitor/metrics/2024-03-07/instance-1/090501-1234abcd.json"
        );
        assert_eq!(
            latest_results_key("quota-monitor", "instance-1"),
            "quota-monitor/metrics/latest/instance-1.json"
        );
    }

    #[test]
    fn report_key_layout() {
        let id = Uuid::parse_str("feedbeef-0000-0000-0000-000000000000").unwrap();
        assert_eq!(
            report_key("quota-monitor", at(), id),
            "quota-monitor/reports/2024/03/07/quota_report_20240307_090501-feedbeef.json"
        );
        assert_eq!(latest_report_key(""), "reports/latest/quota_report.json");
    }

    #[test]
    fn targets_cannot_escape_their_segment() {
        assert_eq!(sanitize_segment("../../etc"), "______etc");
        assert_eq!(sanitize_segment("a/b"), "a_b");
        assert_eq!(sanitize_segment(""), "_");
        assert_eq!(sanitize_segment("my-instance_1"), "my-instance_1");
    }
}
