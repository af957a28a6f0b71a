//! Shared defaults and well-known names.

/// Alert threshold used when none (or an invalid one) is configured.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 80.0;

/// Upper bound on pages fetched by a single paginated listing.
pub const DEFAULT_MAX_PAGES: usize = 100;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Leaves headroom below the 15 minute hard limit of a Lambda invocation.
pub const DEFAULT_CYCLE_DEADLINE_SECS: u64 = 840;
pub const DEFAULT_DEADLINE_MARGIN_SECS: u64 = 30;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_TABLE_CREATE_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_METRIC_WINDOW_MINUTES: u32 = 60;
pub const DEFAULT_RATE_WINDOW_MINUTES: u32 = 5;

/// Granularity of metric statistics requests.
pub const METRIC_PERIOD_SECS: i32 = 300;

pub const DEFAULT_TABLE_NAME: &str = "QuotaMonitor";
pub const DEFAULT_STORAGE_PREFIX: &str = "quota-monitor";
pub const DEFAULT_ACCOUNT_ALIAS: &str = "account";
pub const DEFAULT_QUOTA_SERVICE_CODE: &str = "connect";

/// Request parameter carrying the continuation cursor of a listing call.
pub const NEXT_TOKEN_PARAM: &str = "NextToken";

pub const METRICS_SERVICE: &str = "cloudwatch";
pub const LIMITS_SERVICE: &str = "service-quotas";
pub const NOTIFICATION_SERVICE: &str = "sns";

pub const DEFAULT_METRIC_DIMENSION: &str = "InstanceId";
pub const DEFAULT_RATE_DIMENSION: &str = "ApiName";
pub const DEFAULT_RATE_SIGNAL_METRIC: &str = "ThrottlingException";

/// Levels inspected when counting the depth of a hierarchy structure.
pub const HIERARCHY_LEVELS: [&str; 5] = ["LevelOne", "LevelTwo", "LevelThree", "LevelFour", "LevelFive"];
