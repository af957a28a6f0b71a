//! Capwatch Engine
//!
//! The quota utilization engine: paginated collection, strategy dispatch,
//! violation consolidation, resource discovery, alert publishing and the
//! monitoring cycle that ties them together.

pub mod consolidate;
pub mod cycle;
pub mod discovery;
pub mod notify;
pub mod paginate;
pub mod resolve;

// Re-export commonly used types
pub use consolidate::ViolationConsolidator;
pub use cycle::{CycleContext, CycleOutcome, QuotaMonitor};
pub use discovery::{DiscoveryError, DiscoverySource, ResourceDiscovery, TtlCache};
pub use notify::{render_alert, AlertPublisher};
pub use paginate::{NestedCount, PaginatedCollector};
pub use resolve::{
    RateEstimatePolicy, Resolution, ResolutionDispatcher, ResolverOptions, SkipReason,
};
