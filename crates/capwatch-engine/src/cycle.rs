//! Monitoring cycle
//!
//! One cycle discovers resources, refreshes applied limits, resolves every
//! applicable quota (sequentially or on a bounded worker pool), persists the
//! results, consolidates violations and publishes alerts. A cycle always ends
//! with a [`CycleSummary`]; failures are collected into it, never raised.

use capwatch_clients::{ClientRegistry, RetryExecutor};
use capwatch_core::{
    ConsolidatedAlert, CycleError, CycleErrorKind, CycleSummary, MonitorConfig, MonitoringReport,
    QuotaCatalog, QuotaDefinition, QuotaScope, ResourceContext, UtilizationResult,
};
use capwatch_storage::{StorageEngine, StoreOutcome, TableSchema};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::consolidate::ViolationConsolidator;
use crate::discovery::{DiscoverySource, ResourceDiscovery};
use crate::notify::AlertPublisher;
use crate::paginate::PaginatedCollector;
use crate::resolve::{Resolution, ResolutionDispatcher, ResolverOptions, SkipReason};

const TABLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Per-cycle state threaded through every step
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub execution_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub force_refresh: bool,
    pub config: Arc<MonitorConfig>,
    deadline: Instant,
}

impl CycleContext {
    pub fn new(config: Arc<MonitorConfig>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            started_at: Utc::now(),
            force_refresh: false,
            deadline: Instant::now() + config.cycle_deadline,
            config,
        }
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn gate(&self) -> DeadlineGate {
        DeadlineGate {
            deadline: self.deadline,
            margin: self.config.deadline_margin,
        }
    }
}

/// Decides whether new resolutions may still start
#[derive(Debug, Clone, Copy)]
struct DeadlineGate {
    deadline: Instant,
    margin: Duration,
}

impl DeadlineGate {
    fn is_open(&self) -> bool {
        self.deadline.saturating_duration_since(Instant::now()) > self.margin
    }
}

/// One quota to resolve, for the account or for one resource
#[derive(Debug, Clone)]
struct WorkItem {
    quota: Arc<QuotaDefinition>,
    context: Option<Arc<ResourceContext>>,
}

#[derive(Debug, Default)]
struct Collected {
    results: Vec<UtilizationResult>,
    errors: Vec<CycleError>,
    checked: usize,
    skipped: usize,
    not_started: usize,
    /// Skips per service that had no usable client
    unavailable: BTreeMap<String, usize>,
}

/// Append-only accumulation shared by the workers of one cycle
#[derive(Clone, Default)]
struct ResultCollector {
    inner: Arc<Mutex<Collected>>,
}

impl ResultCollector {
    async fn record(&self, item: &WorkItem, resolution: Resolution) {
        let mut collected = self.inner.lock().await;
        match resolution {
            Resolution::Measured(result) => {
                collected.checked += 1;
                collected.results.push(result);
            }
            Resolution::Skipped(reason) => {
                tracing::debug!(quota_code = %item.quota.code, reason = %reason, "Quota skipped");
                collected.skipped += 1;
                if let SkipReason::ServiceUnavailable(service) = reason {
                    *collected.unavailable.entry(service).or_default() += 1;
                }
            }
            Resolution::Unmeasurable => collected.skipped += 1,
            Resolution::Failed(error) => {
                collected.skipped += 1;
                collected.errors.push(CycleError::from_remote(
                    &error,
                    &item.quota.code,
                    item.context.as_deref().map(|c| c.resource_id.as_str()),
                ));
            }
        }
    }

    async fn not_started(&self, count: usize) {
        self.inner.lock().await.not_started += count;
    }

    async fn error(&self, error: CycleError) {
        self.inner.lock().await.errors.push(error);
    }

    async fn take(&self) -> Collected {
        std::mem::take(&mut *self.inner.lock().await)
    }
}

/// Everything a cycle produced
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub summary: CycleSummary,
    pub results: Vec<UtilizationResult>,
    pub alerts: Vec<ConsolidatedAlert>,
}

/// Runs monitoring cycles over a quota catalog
pub struct QuotaMonitor {
    config: Arc<MonitorConfig>,
    catalog: Arc<QuotaCatalog>,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<ResolutionDispatcher>,
    discovery: ResourceDiscovery,
    publisher: AlertPublisher,
    storage: StorageEngine,
}

impl QuotaMonitor {
    pub fn new(
        config: MonitorConfig,
        catalog: QuotaCatalog,
        executor: RetryExecutor,
        storage: StorageEngine,
    ) -> Self {
        let collector = PaginatedCollector::new(executor.clone(), config.max_pages);
        let dispatcher = ResolutionDispatcher::new(
            collector.clone(),
            ResolverOptions::from_config(&config),
        );
        let discovery =
            ResourceDiscovery::new(collector, DiscoverySource::default(), config.cache_ttl);
        let publisher = AlertPublisher::new(executor.clone(), config.alert_topic_arn.clone());

        Self {
            registry: executor.registry().clone(),
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            dispatcher: Arc::new(dispatcher),
            discovery,
            publisher,
            storage,
        }
    }

    pub fn with_discovery_source(mut self, source: DiscoverySource) -> Self {
        self.discovery = ResourceDiscovery::new(
            self.dispatcher.collector().clone(),
            source,
            self.config.cache_ttl,
        );
        self
    }

    pub fn with_resolver_options(mut self, options: ResolverOptions) -> Self {
        self.dispatcher = Arc::new(ResolutionDispatcher::new(
            self.dispatcher.collector().clone(),
            options,
        ));
        self
    }

    pub fn config(&self) -> &Arc<MonitorConfig> {
        &self.config
    }

    pub fn catalog(&self) -> &QuotaCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &ResolutionDispatcher {
        &self.dispatcher
    }

    /// A fresh context for the next cycle.
    pub fn new_context(&self) -> CycleContext {
        CycleContext::new(self.config.clone())
    }

    /// One-time checks before the first cycle: the notification topic and the
    /// table backends.
    pub async fn startup(&self) -> StoreOutcome {
        if self.config.alert_topic_arn.is_some() {
            self.publisher.validate_topic().await;
        }
        self.storage
            .ensure_tables(
                &TableSchema::monitoring(self.config.dynamodb_table.clone()),
                self.config.table_create_timeout,
                TABLE_POLL_INTERVAL,
            )
            .await
    }

    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        self.registry.health_check_all().await
    }

    /// Run one monitoring cycle.
    #[tracing::instrument(skip(self, ctx), fields(execution_id = %ctx.execution_id))]
    pub async fn run_cycle(&self, ctx: &CycleContext) -> CycleOutcome {
        let mut summary = CycleSummary::new(ctx.execution_id, ctx.started_at);
        tracing::info!(
            quotas = self.catalog.len(),
            workers = self.config.max_workers,
            deadline_secs = ctx.remaining().as_secs(),
            "Monitoring cycle started"
        );

        let unavailable = self.unavailable_required().await;
        if !unavailable.is_empty() {
            for service in &unavailable {
                summary.errors.push(
                    CycleError::new(
                        CycleErrorKind::ServiceUnavailable,
                        "required service is unhealthy",
                    )
                    .with_service(service.clone()),
                );
            }
            return self.abort(
                summary,
                format!("required services unavailable: {}", unavailable.join(", ")),
            );
        }

        self.recover_optional().await;

        let resources = match self.discovery.resources(ctx.force_refresh).await {
            Ok(resources) => resources,
            Err(e) => {
                summary
                    .errors
                    .push(CycleError::new(CycleErrorKind::Discovery, e.to_string()));
                return self.abort(summary, "resource discovery failed".to_string());
            }
        };
        summary.resources_checked = resources.len();

        let catalog = self.dispatcher.with_applied_limits(&self.catalog).await;
        let items = work_items(&catalog, &resources);
        let has_account_work = items.iter().any(|i| i.context.is_none());

        let collected = self.execute(items, ctx.gate()).await;
        summary.quotas_checked = collected.checked;
        summary.quotas_skipped = collected.skipped + collected.not_started;
        summary.errors.extend(collected.errors);
        summary
            .errors
            .extend(self.degraded_services(&collected.unavailable));
        if collected.not_started > 0 {
            tracing::warn!(
                not_started = collected.not_started,
                "Cycle deadline reached, remaining quotas not evaluated"
            );
            summary.errors.push(CycleError::new(
                CycleErrorKind::Deadline,
                format!(
                    "{} quota evaluations not started before the cycle deadline",
                    collected.not_started
                ),
            ));
        }
        let results = collected.results;

        self.store_results(ctx, &results, &mut summary.errors).await;

        let names: HashMap<String, String> = resources
            .iter()
            .map(|r| (r.resource_id.clone(), r.display_name().to_string()))
            .collect();
        let alerts = ViolationConsolidator::new(self.config.account_alias.clone())
            .with_target_names(names)
            .consolidate(&results, self.config.threshold_percentage);
        summary.violations_found = alerts.iter().map(|a| a.violation_count()).sum();
        summary.alerts_generated = alerts.len();

        let (sent, notify_errors) = self.publisher.publish_all(&alerts).await;
        summary.alerts_sent = sent;
        summary.errors.extend(notify_errors);

        if !self.storage.is_empty() {
            let report = MonitoringReport {
                execution_id: ctx.execution_id,
                generated_at: Utc::now(),
                threshold_percentage: self.config.threshold_percentage,
                target_count: resources.len() + usize::from(has_account_work),
                alerts: alerts.clone(),
            };
            let outcome = self.storage.store_consolidated_report(&report).await;
            summary.errors.extend(storage_errors(outcome, None));
        }

        summary.finished_at = Utc::now();
        tracing::info!(
            resources = summary.resources_checked,
            quotas_checked = summary.quotas_checked,
            quotas_skipped = summary.quotas_skipped,
            violations = summary.violations_found,
            alerts_sent = summary.alerts_sent,
            errors = summary.errors.len(),
            duration_secs = summary.duration_secs(),
            "Monitoring cycle finished"
        );

        CycleOutcome {
            summary,
            results,
            alerts,
        }
    }

    fn abort(&self, mut summary: CycleSummary, reason: String) -> CycleOutcome {
        tracing::error!(reason = %reason, "Monitoring cycle aborted");
        summary.aborted = Some(reason);
        summary.finished_at = Utc::now();
        CycleOutcome {
            summary,
            results: Vec::new(),
            alerts: Vec::new(),
        }
    }

    /// Required services still unhealthy after one reconnect attempt.
    async fn unavailable_required(&self) -> Vec<String> {
        let mut unavailable = Vec::new();
        for service in self.registry.unhealthy_required().await {
            tracing::warn!(service = %service, "Required service unhealthy, reconnecting");
            if !self.registry.reconnect(&service).await {
                unavailable.push(service);
            }
        }
        unavailable
    }

    /// Give every unhealthy optional service one reconnect attempt, so a
    /// failure in an earlier cycle does not disable it for good.
    async fn recover_optional(&self) {
        for service in self.registry.unhealthy_optional().await {
            if self.registry.reconnect(&service).await {
                tracing::info!(service = %service, "Optional service recovered");
            } else {
                tracing::warn!(service = %service, "Optional service still unavailable");
            }
        }
    }

    /// One error per declared service whose quotas were skipped this cycle.
    fn degraded_services(&self, unavailable: &BTreeMap<String, usize>) -> Vec<CycleError> {
        unavailable
            .iter()
            .filter(|(service, _)| self.registry.is_declared(service))
            .map(|(service, skipped)| {
                tracing::warn!(service = %service, skipped, "Quotas skipped, service unavailable");
                CycleError::new(
                    CycleErrorKind::ServiceUnavailable,
                    format!("{} quota evaluations skipped", skipped),
                )
                .with_service(service.clone())
            })
            .collect()
    }

    async fn execute(&self, items: Vec<WorkItem>, gate: DeadlineGate) -> Collected {
        let collector = ResultCollector::default();

        if !self.config.is_parallel() {
            for (index, item) in items.iter().enumerate() {
                if !gate.is_open() {
                    collector.not_started(items.len() - index).await;
                    break;
                }
                let resolution = self
                    .dispatcher
                    .resolve(&item.quota, item.context.as_deref())
                    .await;
                collector.record(item, resolution).await;
            }
            return collector.take().await;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        for batch in items.chunks(self.config.batch_size.max(1)) {
            let mut tasks = JoinSet::new();
            for item in batch {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                if !gate.is_open() {
                    collector.not_started(1).await;
                    continue;
                }

                let dispatcher = self.dispatcher.clone();
                let collector = collector.clone();
                let item = item.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let resolution = dispatcher
                        .resolve(&item.quota, item.context.as_deref())
                        .await;
                    collector.record(&item, resolution).await;
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Quota worker task failed");
                    collector
                        .error(CycleError::new(
                            CycleErrorKind::Unknown,
                            format!("worker task failed: {}", e),
                        ))
                        .await;
                }
            }
        }

        collector.take().await
    }

    async fn store_results(
        &self,
        ctx: &CycleContext,
        results: &[UtilizationResult],
        errors: &mut Vec<CycleError>,
    ) {
        if self.storage.is_empty() || results.is_empty() {
            return;
        }

        let mut by_target: BTreeMap<String, Vec<UtilizationResult>> = BTreeMap::new();
        for result in results {
            let target = match (result.scope(), result.resource_id()) {
                (QuotaScope::Resource, Some(id)) => id.to_string(),
                _ => self.config.account_alias.clone(),
            };
            by_target.entry(target).or_default().push(result.clone());
        }

        for (target, batch) in by_target {
            let outcome = self
                .storage
                .store_results(&target, ctx.execution_id, &batch)
                .await;
            errors.extend(storage_errors(outcome, Some(&target)));
        }
    }
}

/// Account quotas once, then every resource quota for every resource.
fn work_items(catalog: &QuotaCatalog, resources: &[ResourceContext]) -> Vec<WorkItem> {
    let mut items: Vec<WorkItem> = catalog
        .account_quotas()
        .map(|quota| WorkItem {
            quota: Arc::new(quota.clone()),
            context: None,
        })
        .collect();

    let resource_quotas: Vec<Arc<QuotaDefinition>> = catalog
        .resource_quotas()
        .map(|quota| Arc::new(quota.clone()))
        .collect();
    for resource in resources {
        let context = Arc::new(resource.clone());
        items.extend(resource_quotas.iter().map(|quota| WorkItem {
            quota: quota.clone(),
            context: Some(context.clone()),
        }));
    }
    items
}

fn storage_errors(outcome: StoreOutcome, target: Option<&str>) -> Vec<CycleError> {
    outcome
        .errors
        .into_iter()
        .map(|message| {
            let error = CycleError::new(CycleErrorKind::Storage, message);
            match target {
                Some(target) => error.with_resource(target),
                None => error,
            }
        })
        .collect()
}
