//! AWS SDK collaborators
//!
//! One adapter per remote role. SDK-level retries are disabled because the
//! [`RetryExecutor`](crate::RetryExecutor) owns retry decisions.

mod cloudwatch;
mod connect;
mod service_quotas;
mod sns;

pub use cloudwatch::CloudWatchMetricsClient;
pub use connect::ConnectListingClient;
pub use service_quotas::ServiceQuotasClient;
pub use sns::SnsNotificationSink;

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_connect::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use capwatch_core::{ErrorKind, RemoteError};
use std::time::Duration;

/// Connection settings shared by every AWS client
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

/// Load the shared SDK configuration.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(settings.connect_timeout)
        .operation_attempt_timeout(settings.call_timeout)
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .timeout_config(timeouts)
        .retry_config(RetryConfig::standard().with_max_attempts(1));
    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    loader.load().await
}

/// Convert an SDK failure into a classified [`RemoteError`].
pub(crate) fn sdk_error<E, R>(service: &str, operation: &str, err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            RemoteError::new(ErrorKind::Transient, service, operation, message)
        }
        _ => RemoteError::from_code(err.code(), service, operation, message),
    }
}
