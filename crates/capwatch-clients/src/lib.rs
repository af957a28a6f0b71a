//! Capwatch Clients Library
//!
//! Remote collaborators the monitor talks to, the registry that tracks their
//! health, and the retry executor every remote call goes through.
//!
//! Collaborators are defined as traits so the engine never depends on a
//! concrete SDK. The AWS implementations live behind the `aws` feature.

#[cfg(feature = "aws")]
pub mod aws;
pub mod registry;
pub mod retry;
pub mod traits;

// Re-export commonly used types
pub use registry::{ClientFactory, ClientHandle, ClientRegistry, RegistryError, ServiceDeclaration};
pub use retry::{RetryExecutor, RetryPolicy};
pub use traits::{
    Datapoint, LimitLookup, LimitLookupClient, ListingClient, ListingPage, MetricQuery,
    MetricsClient, NotificationMessage, NotificationSink,
};
