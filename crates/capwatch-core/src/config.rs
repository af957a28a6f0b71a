//! Configuration module
//!
//! Monitor settings read from the environment. Every option has a default so a
//! bare environment yields a working (local, alert-less) configuration.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Quota monitor configuration
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub threshold_percentage: f64,
    pub aws_region: Option<String>,
    /// Target identifier used for account-scoped alerts and storage.
    pub account_alias: String,
    pub alert_topic_arn: Option<String>,
    // Storage configuration
    pub s3_bucket: Option<String>,
    pub s3_enabled: bool,
    pub use_dynamodb: bool,
    pub dynamodb_table: String,
    pub local_report_dir: Option<PathBuf>,
    pub storage_prefix: String,
    // Execution
    pub max_workers: usize,
    pub batch_size: usize,
    pub cycle_deadline: Duration,
    pub deadline_margin: Duration,
    pub cache_ttl: Duration,
    pub max_pages: usize,
    pub retry_max_attempts: u32,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
    pub metric_window_minutes: u32,
    pub rate_window_minutes: u32,
    pub table_create_timeout: Duration,
    // Catalog
    pub quota_catalog_path: Option<PathBuf>,
    pub quota_service_code: String,
    pub log_format: LogFormat,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |key: &str, default: u64| -> u64 {
            match var(key) {
                Some(raw) => raw.parse().unwrap_or_else(|_| {
                    tracing::warn!(variable = key, value = %raw, default, "Invalid number, using default");
                    default
                }),
                None => default,
            }
        };
        let flag = |key: &str, default: bool| -> bool {
            var(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(default)
        };

        let s3_bucket = var("S3_BUCKET");
        let s3_enabled = flag("S3_ENABLED", s3_bucket.is_some());

        let log_format = match var("LOG_FORMAT") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Unknown LOG_FORMAT, using pretty");
                LogFormat::Pretty
            }),
            None => LogFormat::Pretty,
        };

        Self {
            threshold_percentage: parse_threshold(var("THRESHOLD_PERCENTAGE").as_deref()),
            aws_region: var("AWS_REGION").or_else(|| var("AWS_DEFAULT_REGION")),
            account_alias: var("ACCOUNT_ALIAS").unwrap_or_else(|| DEFAULT_ACCOUNT_ALIAS.to_string()),
            alert_topic_arn: var("ALERT_SNS_TOPIC_ARN"),
            s3_bucket,
            s3_enabled,
            use_dynamodb: flag("USE_DYNAMODB", false),
            dynamodb_table: var("DYNAMODB_TABLE").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            local_report_dir: var("LOCAL_REPORT_DIR").map(PathBuf::from),
            storage_prefix: var("STORAGE_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_STORAGE_PREFIX.to_string()),
            max_workers: parsed("MAX_WORKERS", DEFAULT_MAX_WORKERS as u64) as usize,
            batch_size: parsed("BATCH_SIZE", DEFAULT_BATCH_SIZE as u64) as usize,
            cycle_deadline: Duration::from_secs(parsed(
                "CYCLE_DEADLINE_SECS",
                DEFAULT_CYCLE_DEADLINE_SECS,
            )),
            deadline_margin: Duration::from_secs(parsed(
                "DEADLINE_MARGIN_SECS",
                DEFAULT_DEADLINE_MARGIN_SECS,
            )),
            cache_ttl: Duration::from_secs(parsed("CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)),
            max_pages: parsed("MAX_PAGES", DEFAULT_MAX_PAGES as u64) as usize,
            retry_max_attempts: parsed("RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS as u64)
                as u32,
            connect_timeout: Duration::from_secs(parsed(
                "CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            call_timeout: Duration::from_secs(parsed("CALL_TIMEOUT_SECS", DEFAULT_CALL_TIMEOUT_SECS)),
            metric_window_minutes: parsed(
                "METRIC_WINDOW_MINUTES",
                DEFAULT_METRIC_WINDOW_MINUTES as u64,
            ) as u32,
            rate_window_minutes: parsed("RATE_WINDOW_MINUTES", DEFAULT_RATE_WINDOW_MINUTES as u64)
                as u32,
            table_create_timeout: Duration::from_secs(parsed(
                "TABLE_CREATE_TIMEOUT_SECS",
                DEFAULT_TABLE_CREATE_TIMEOUT_SECS,
            )),
            quota_catalog_path: var("QUOTA_CATALOG_PATH").map(PathBuf::from),
            quota_service_code: var("QUOTA_SERVICE_CODE")
                .unwrap_or_else(|| DEFAULT_QUOTA_SERVICE_CODE.to_string()),
            log_format,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(1.0..=99.0).contains(&self.threshold_percentage) {
            return Err(anyhow::anyhow!(
                "THRESHOLD_PERCENTAGE must be between 1 and 99"
            ));
        }

        if self.max_workers == 0 {
            return Err(anyhow::anyhow!("MAX_WORKERS must be at least 1"));
        }

        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("BATCH_SIZE must be at least 1"));
        }

        if self.max_pages == 0 {
            return Err(anyhow::anyhow!("MAX_PAGES must be at least 1"));
        }

        if self.retry_max_attempts == 0 {
            return Err(anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be at least 1"));
        }

        if self.deadline_margin >= self.cycle_deadline {
            return Err(anyhow::anyhow!(
                "DEADLINE_MARGIN_SECS must be smaller than CYCLE_DEADLINE_SECS"
            ));
        }

        if self.s3_enabled && self.s3_bucket.is_none() {
            return Err(anyhow::anyhow!("S3_ENABLED=true requires S3_BUCKET to be set"));
        }

        if self.use_dynamodb && self.dynamodb_table.is_empty() {
            return Err(anyhow::anyhow!("USE_DYNAMODB=true requires DYNAMODB_TABLE"));
        }

        if let Some(arn) = &self.alert_topic_arn {
            if !arn.starts_with("arn:") {
                return Err(anyhow::anyhow!(
                    "ALERT_SNS_TOPIC_ARN must be an ARN"
                ));
            }
        }

        Ok(())
    }

    /// Whether any remote storage backend is configured.
    pub fn has_remote_storage(&self) -> bool {
        self.s3_enabled || self.use_dynamodb
    }

    /// Whether work should be spread over a worker pool.
    pub fn is_parallel(&self) -> bool {
        self.max_workers > 1
    }
}

/// Parse the alert threshold, falling back to the default for missing,
/// unparsable or out-of-range values.
pub fn parse_threshold(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return DEFAULT_THRESHOLD_PERCENT;
    };
    match raw.parse::<f64>() {
        Ok(value) if (1.0..=99.0).contains(&value) => value,
        Ok(value) => {
            tracing::warn!(
                value,
                default = DEFAULT_THRESHOLD_PERCENT,
                "THRESHOLD_PERCENTAGE out of range 1-99, using default"
            );
            DEFAULT_THRESHOLD_PERCENT
        }
        Err(_) => {
            tracing::warn!(
                value = %raw,
                default = DEFAULT_THRESHOLD_PERCENT,
                "THRESHOLD_PERCENTAGE is not a number, using default"
            );
            DEFAULT_THRESHOLD_PERCENT
        }
    }
}
