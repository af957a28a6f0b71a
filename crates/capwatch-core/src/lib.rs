//! Capwatch Core Library
//!
//! Domain model, error taxonomy, configuration and quota catalog shared by every
//! capwatch crate. Nothing in here performs I/O against remote services.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod redact;
pub mod text;

// Re-export commonly used types
pub use catalog::QuotaCatalog;
pub use config::MonitorConfig;
pub use error::{CatalogError, ErrorKind, RemoteError};
pub use models::{
    AlertMessage, ConsolidatedAlert, CountMode, CycleError, CycleErrorKind, CycleSummary,
    LimitLookupSpec, ListingSpec, MeasurementStrategy, MetricSpec, MonitoringReport,
    NestedListingSpec, QuotaDefinition, QuotaScope, RateSpec, ResourceContext, ServiceHealth,
    Severity, Statistic, UtilizationResult, ViolationRecord,
};
pub use redact::redact;
pub use text::truncate_string;
