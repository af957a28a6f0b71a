//! AWS collaborators and storage backends built from the monitor configuration.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use capwatch_clients::aws::{
    load_sdk_config, AwsSettings, CloudWatchMetricsClient, ConnectListingClient,
    ServiceQuotasClient, SnsNotificationSink,
};
use capwatch_clients::{
    ClientFactory, ClientHandle, ClientRegistry, MetricsClient, RetryExecutor, RetryPolicy,
    ServiceDeclaration,
};
use capwatch_core::constants::{LIMITS_SERVICE, METRICS_SERVICE, NOTIFICATION_SERVICE};
use capwatch_core::{MonitorConfig, QuotaCatalog, RemoteError};
use capwatch_engine::QuotaMonitor;
use capwatch_storage::{
    DynamoTableSink, InMemoryObjectSink, InMemoryTableSink, LocalObjectSink, S3ObjectSink,
    StorageEngine,
};
use std::sync::Arc;

const CONNECT_SERVICE: &str = "connect";

/// Builds a fresh SDK client on every (re)connect.
struct SdkClientFactory {
    sdk: SdkConfig,
    build: fn(&SdkConfig) -> ClientHandle,
}

#[async_trait]
impl ClientFactory for SdkClientFactory {
    async fn create(&self) -> Result<ClientHandle, RemoteError> {
        Ok((self.build)(&self.sdk))
    }
}

fn factory(sdk: &SdkConfig, build: fn(&SdkConfig) -> ClientHandle) -> Arc<dyn ClientFactory> {
    Arc::new(SdkClientFactory {
        sdk: sdk.clone(),
        build,
    })
}

pub async fn sdk_config(config: &MonitorConfig) -> SdkConfig {
    load_sdk_config(&AwsSettings {
        region: config.aws_region.clone(),
        connect_timeout: config.connect_timeout,
        call_timeout: config.call_timeout,
    })
    .await
}

/// Connect is required; metrics, limits and notifications degrade when missing.
pub fn declarations(sdk: &SdkConfig) -> Vec<ServiceDeclaration> {
    vec![
        ServiceDeclaration::required(
            CONNECT_SERVICE,
            factory(sdk, |sdk| {
                ClientHandle::Listing(Arc::new(ConnectListingClient::new(sdk)))
            }),
        ),
        ServiceDeclaration::optional(
            METRICS_SERVICE,
            factory(sdk, |sdk| {
                ClientHandle::Metrics(Arc::new(CloudWatchMetricsClient::new(sdk)))
            }),
        ),
        ServiceDeclaration::optional(
            LIMITS_SERVICE,
            factory(sdk, |sdk| {
                let usage: Arc<dyn MetricsClient> = Arc::new(CloudWatchMetricsClient::new(sdk));
                ClientHandle::Limits(Arc::new(ServiceQuotasClient::new(sdk, Some(usage))))
            }),
        ),
        ServiceDeclaration::optional(
            NOTIFICATION_SERVICE,
            factory(sdk, |sdk| {
                ClientHandle::Notifications(Arc::new(SnsNotificationSink::new(sdk)))
            }),
        ),
    ]
}

pub async fn connect_registry(sdk: &SdkConfig) -> Result<Arc<ClientRegistry>> {
    let registry = ClientRegistry::connect(declarations(sdk))
        .await
        .context("Failed to connect to required services")?;
    Ok(Arc::new(registry))
}

/// Storage backends enabled by the configuration.
///
/// A dry run writes to memory only. The local directory is used only when no
/// remote backend is enabled.
pub async fn storage_engine(
    config: &MonitorConfig,
    sdk: &SdkConfig,
    dry_run: bool,
) -> Result<StorageEngine> {
    let mut engine = StorageEngine::new(config.storage_prefix.clone());
    if dry_run {
        return Ok(engine
            .with_object_sink(Arc::new(InMemoryObjectSink::new()))
            .with_table_sink(Arc::new(InMemoryTableSink::new())));
    }

    if config.s3_enabled {
        if let Some(bucket) = &config.s3_bucket {
            let sink = S3ObjectSink::new(bucket.clone(), config.aws_region.clone())
                .context("Failed to configure S3 storage")?;
            engine = engine.with_object_sink(Arc::new(sink));
        }
    }
    if config.use_dynamodb {
        engine = engine.with_table_sink(Arc::new(DynamoTableSink::new(
            sdk,
            config.dynamodb_table.clone(),
        )));
    }

    match &config.local_report_dir {
        Some(dir) if !config.has_remote_storage() => {
            let sink = LocalObjectSink::new(dir.clone())
                .await
                .with_context(|| format!("Failed to prepare report directory {}", dir.display()))?;
            engine = engine.with_object_sink(Arc::new(sink));
        }
        Some(dir) => {
            tracing::debug!(dir = %dir.display(), "Remote storage enabled, ignoring local report directory");
        }
        None => {}
    }

    if engine.is_empty() {
        tracing::warn!("No storage backend configured, results will not be persisted");
    } else {
        tracing::info!(backends = ?engine.backend_names(), "Storage configured");
    }
    Ok(engine)
}

/// Fully wired monitor for `config`.
pub async fn build_monitor(
    config: MonitorConfig,
    catalog: QuotaCatalog,
    dry_run: bool,
) -> Result<QuotaMonitor> {
    let sdk = sdk_config(&config).await;
    let registry = connect_registry(&sdk).await?;
    let executor = RetryExecutor::new(
        registry,
        RetryPolicy::new(config.retry_max_attempts, config.call_timeout),
    );
    let storage = storage_engine(&config, &sdk, dry_run).await?;

    tracing::info!(
        quotas = catalog.len(),
        threshold = config.threshold_percentage,
        workers = config.max_workers,
        dry_run,
        "Monitor configured"
    );
    Ok(QuotaMonitor::new(config, catalog, executor, storage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_config::{BehaviorVersion, Region};
    use capwatch_core::MeasurementStrategy;
    use std::collections::BTreeSet;

    fn test_sdk() -> SdkConfig {
        SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build()
    }

    #[test]
    fn only_connect_is_required() {
        let declarations = declarations(&test_sdk());
        let required: Vec<_> = declarations
            .iter()
            .filter(|d| d.required)
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(required, vec![CONNECT_SERVICE]);
        assert_eq!(declarations.len(), 4);
    }

    #[test]
    fn builtin_quotas_use_declared_services() {
        let declared: BTreeSet<String> = declarations(&test_sdk())
            .into_iter()
            .map(|d| d.name)
            .collect();
        let catalog = QuotaCatalog::from_json_str(crate::BUILTIN_CATALOG).unwrap();

        for quota in catalog.iter() {
            for service in quota.strategy.services() {
                assert!(
                    declared.contains(service),
                    "{} depends on undeclared service {}",
                    quota.code,
                    service
                );
            }
        }
        assert_eq!(
            catalog.get("L-9B8870E3").map(|q| &q.strategy),
            Some(&MeasurementStrategy::Unmeasurable)
        );
    }
}
