//! Quota resolution
//!
//! Turns one quota definition and an optional resource context into a
//! [`Resolution`]. Every strategy reaches its collaborators through the
//! [`RetryExecutor`], so failures are classified and recorded against the
//! owning service before they surface here.

use capwatch_clients::{ClientRegistry, MetricQuery, RetryExecutor};
use capwatch_core::constants::{
    DEFAULT_METRIC_WINDOW_MINUTES, DEFAULT_RATE_WINDOW_MINUTES, HIERARCHY_LEVELS, LIMITS_SERVICE,
    METRIC_PERIOD_SECS,
};
use capwatch_core::{
    CountMode, ErrorKind, LimitLookupSpec, ListingSpec, MeasurementStrategy, MetricSpec,
    MonitorConfig, NestedListingSpec, QuotaCatalog, QuotaDefinition, RateSpec, RemoteError,
    ResourceContext, Statistic, UtilizationResult,
};
use chrono::Utc;
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::paginate::PaginatedCollector;

/// Why a quota was not evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Account quota with a resource context, or resource quota without one.
    ScopeMismatch,
    /// A service the strategy needs has no client or is unhealthy.
    ServiceUnavailable(String),
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SkipReason::ScopeMismatch => write!(f, "scope does not match context"),
            SkipReason::ServiceUnavailable(service) => write!(f, "service {} unavailable", service),
        }
    }
}

/// Outcome of resolving one quota
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Measured(UtilizationResult),
    Skipped(SkipReason),
    /// The quota has no way of being measured. Not a failure.
    Unmeasurable,
    Failed(RemoteError),
}

impl Resolution {
    pub fn is_measured(&self) -> bool {
        matches!(self, Resolution::Measured(_))
    }

    pub fn into_result(self) -> Option<UtilizationResult> {
        match self {
            Resolution::Measured(result) => Some(result),
            _ => None,
        }
    }
}

/// Fractions of the limit reported by rate quotas.
///
/// Request rates are not observable, so usage is approximated from the
/// throttling signal alone. Results produced this way are flagged as estimated
/// and are far less precise than counted or sampled quotas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEstimatePolicy {
    /// Throttling events were observed.
    pub throttled: f64,
    /// The signal reported datapoints but no throttling.
    pub active: f64,
    /// No datapoints at all.
    pub idle: f64,
}

impl Default for RateEstimatePolicy {
    fn default() -> Self {
        Self {
            throttled: 0.9,
            active: 0.5,
            idle: 0.1,
        }
    }
}

impl RateEstimatePolicy {
    /// Estimated usage for `limit` given the throttling signal values.
    pub fn estimate(&self, limit: f64, signal: &[f64]) -> f64 {
        let fraction = if signal.is_empty() {
            self.idle
        } else if signal.iter().sum::<f64>() > 0.0 {
            self.throttled
        } else {
            self.active
        };
        limit * fraction
    }
}

/// Tunables for the metric based strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverOptions {
    pub metric_window_minutes: u32,
    pub rate_window_minutes: u32,
    pub period_secs: i32,
    pub rate_policy: RateEstimatePolicy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            metric_window_minutes: DEFAULT_METRIC_WINDOW_MINUTES,
            rate_window_minutes: DEFAULT_RATE_WINDOW_MINUTES,
            period_secs: METRIC_PERIOD_SECS,
            rate_policy: RateEstimatePolicy::default(),
        }
    }
}

impl ResolverOptions {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            metric_window_minutes: config.metric_window_minutes,
            rate_window_minutes: config.rate_window_minutes,
            ..Self::default()
        }
    }
}

enum Measurement {
    Value { usage: f64, limit: f64, estimated: bool },
    Unmeasurable,
}

impl Measurement {
    fn exact(usage: f64, limit: f64) -> Self {
        Measurement::Value {
            usage,
            limit,
            estimated: false,
        }
    }
}

/// Selects and runs the measurement strategy of a quota
#[derive(Clone)]
pub struct ResolutionDispatcher {
    collector: PaginatedCollector,
    options: ResolverOptions,
}

impl ResolutionDispatcher {
    pub fn new(collector: PaginatedCollector, options: ResolverOptions) -> Self {
        Self { collector, options }
    }

    pub fn collector(&self) -> &PaginatedCollector {
        &self.collector
    }

    fn executor(&self) -> &RetryExecutor {
        self.collector.executor()
    }

    fn registry(&self) -> &Arc<ClientRegistry> {
        self.executor().registry()
    }

    /// Resolve `quota` for `context`.
    ///
    /// Scope mismatches and unavailable optional services are skipped. Remote
    /// failures come back as [`Resolution::Failed`] and never abort the caller.
    #[tracing::instrument(
        skip(self, quota, context),
        fields(quota_code = %quota.code, resource_id = context.map(|c| c.resource_id.as_str()))
    )]
    pub async fn resolve(
        &self,
        quota: &QuotaDefinition,
        context: Option<&ResourceContext>,
    ) -> Resolution {
        if !quota.applies_to(context) {
            tracing::debug!(scope = %quota.scope, "Skipping quota, scope does not match context");
            return Resolution::Skipped(SkipReason::ScopeMismatch);
        }

        if let MeasurementStrategy::Unmeasurable = quota.strategy {
            tracing::info!(quota_name = %quota.name, "Quota cannot be measured directly");
            return Resolution::Unmeasurable;
        }

        if let Some(service) = self.unavailable_service(&quota.strategy).await {
            tracing::debug!(service = %service, "Skipping quota, service unavailable");
            return Resolution::Skipped(SkipReason::ServiceUnavailable(service));
        }

        let resource_id = context.map(|c| c.resource_id.clone());
        match self.measure(quota, context).await {
            Ok(Measurement::Value {
                usage,
                limit,
                estimated,
            }) => {
                let result = UtilizationResult::new(quota, usage, limit, resource_id);
                let result = if estimated { result.estimated() } else { result };
                tracing::debug!(
                    usage = result.current_usage(),
                    limit = result.limit(),
                    utilization = result.utilization_percentage(),
                    estimated,
                    "Quota resolved"
                );
                Resolution::Measured(result)
            }
            Ok(Measurement::Unmeasurable) => Resolution::Unmeasurable,
            Err(e) => {
                if e.kind == ErrorKind::UnknownStrategy {
                    tracing::warn!(error = %e, "Quota uses an unsupported operation, skipping");
                } else {
                    tracing::error!(error = %e, "Failed to measure quota");
                }
                Resolution::Failed(e)
            }
        }
    }

    /// First service of `strategy` that cannot be used right now.
    ///
    /// Required services are still attempted when unhealthy so that the retry
    /// executor can recover them.
    async fn unavailable_service(&self, strategy: &MeasurementStrategy) -> Option<String> {
        let registry = self.registry();
        for service in strategy.services() {
            if registry.get_client(service).await.is_none() {
                return Some(service.to_string());
            }
            if !registry.is_required(service) && !registry.is_healthy(service).await {
                return Some(service.to_string());
            }
        }
        None
    }

    async fn measure(
        &self,
        quota: &QuotaDefinition,
        context: Option<&ResourceContext>,
    ) -> Result<Measurement, RemoteError> {
        let limit = quota.default_limit;
        match &quota.strategy {
            MeasurementStrategy::CountResources { listing, mode } => {
                let usage = self.count_resources(listing, *mode, context).await?;
                Ok(Measurement::exact(usage as f64, limit))
            }
            MeasurementStrategy::CountNestedResources(spec) => {
                let usage = self.count_nested(spec, context).await?;
                Ok(Measurement::exact(usage as f64, limit))
            }
            MeasurementStrategy::SampledMetric(spec) => {
                let usage = self.sample_metric(spec, context).await?;
                Ok(Measurement::exact(usage, limit))
            }
            MeasurementStrategy::RateEstimate(spec) => {
                let signal = self.rate_signal(spec).await?;
                Ok(Measurement::Value {
                    usage: self.options.rate_policy.estimate(limit, &signal),
                    limit,
                    estimated: true,
                })
            }
            MeasurementStrategy::ExternalLimitLookup(spec) => {
                self.lookup_limit(quota, spec, context).await
            }
            MeasurementStrategy::Unmeasurable => Ok(Measurement::Unmeasurable),
        }
    }

    async fn count_resources(
        &self,
        listing: &ListingSpec,
        mode: CountMode,
        context: Option<&ResourceContext>,
    ) -> Result<usize, RemoteError> {
        let params = listing.params_for(context);
        match mode {
            CountMode::Paginated => {
                self.collector
                    .count(&listing.service, &listing.operation, &listing.result_key, &params)
                    .await
            }
            CountMode::SinglePage => {
                let page = self
                    .collector
                    .fetch_page(&listing.service, &listing.operation, &params)
                    .await?;
                Ok(page.items(&listing.result_key).len())
            }
            CountMode::HierarchyDepth => {
                match self
                    .collector
                    .fetch_page(&listing.service, &listing.operation, &params)
                    .await
                {
                    Ok(page) => Ok(hierarchy_depth(page.field(&listing.result_key))),
                    // No hierarchy defined yet
                    Err(e) if e.is_not_found() => Ok(0),
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn count_nested(
        &self,
        spec: &NestedListingSpec,
        context: Option<&ResourceContext>,
    ) -> Result<usize, RemoteError> {
        let counted = self.collector.count_nested(spec, context).await?;
        if counted.skipped > 0 {
            tracing::warn!(
                skipped = counted.skipped,
                parents = counted.parents,
                "Some parents were skipped while counting"
            );
        }
        Ok(counted.total)
    }

    async fn query_metric(
        &self,
        service: &str,
        query: MetricQuery,
    ) -> Result<Vec<f64>, RemoteError> {
        let client = self.registry().metrics(service).await.ok_or_else(|| {
            RemoteError::new(
                ErrorKind::Validation,
                service,
                "get_metric_statistics",
                "no metrics client registered for service",
            )
        })?;
        let client = &client;
        let query = &query;
        let points = self
            .executor()
            .call(service, "get_metric_statistics", move || client.query(query))
            .await?;
        Ok(points.into_iter().map(|p| p.value).collect())
    }

    /// No datapoints is a valid zero, not a failure.
    async fn sample_metric(
        &self,
        spec: &MetricSpec,
        context: Option<&ResourceContext>,
    ) -> Result<f64, RemoteError> {
        let window = spec
            .window_minutes
            .unwrap_or(self.options.metric_window_minutes);
        let dimensions = context
            .map(|c| vec![(spec.dimension_name.clone(), c.resource_id.clone())])
            .unwrap_or_default();
        let end_time = Utc::now();
        let query = MetricQuery {
            namespace: spec.namespace.clone(),
            metric_name: spec.metric_name.clone(),
            dimensions,
            start_time: end_time - chrono::Duration::minutes(i64::from(window)),
            end_time,
            period_secs: self.options.period_secs,
            statistic: spec.statistic,
        };

        let values = self.query_metric(&spec.service, query).await?;
        match spec.statistic.reduce(&values) {
            Some(value) => Ok(value),
            None => {
                tracing::info!(metric = %spec.metric_name, "No datapoints in window, usage is zero");
                Ok(0.0)
            }
        }
    }

    async fn rate_signal(&self, spec: &RateSpec) -> Result<Vec<f64>, RemoteError> {
        let window = spec.window_minutes.unwrap_or(self.options.rate_window_minutes);
        let end_time = Utc::now();
        let query = MetricQuery {
            namespace: spec.namespace.clone(),
            metric_name: spec.signal_metric.clone(),
            dimensions: vec![(spec.dimension_name.clone(), spec.operation.clone())],
            start_time: end_time - chrono::Duration::minutes(i64::from(window)),
            end_time,
            period_secs: self.options.period_secs,
            statistic: Statistic::SampleCount,
        };
        self.query_metric(&spec.service, query).await
    }

    /// Usage and limit from the limit service. A missing limit falls back to the
    /// declared default; a missing usage leaves the quota unmeasurable.
    async fn lookup_limit(
        &self,
        quota: &QuotaDefinition,
        spec: &LimitLookupSpec,
        context: Option<&ResourceContext>,
    ) -> Result<Measurement, RemoteError> {
        let client = self.registry().limits(&spec.service).await.ok_or_else(|| {
            RemoteError::new(
                ErrorKind::Validation,
                spec.service.as_str(),
                "get_service_quota",
                "no limit lookup client registered for service",
            )
        })?;
        let context_id = if quota.context_required {
            context.map(|c| c.lookup_context_id())
        } else {
            None
        };

        let client = &client;
        let lookup = self
            .executor()
            .call(&spec.service, "get_service_quota", move || {
                client.lookup(&spec.service_code, &spec.quota_code, context_id)
            })
            .await?;

        let limit = match lookup.limit_value {
            Some(limit) if limit.is_finite() && limit >= 0.0 => limit,
            _ => {
                tracing::warn!(
                    default_limit = quota.default_limit,
                    "Limit service returned no limit, using default"
                );
                quota.default_limit
            }
        };
        match lookup.current_usage {
            Some(usage) => Ok(Measurement::exact(usage, limit)),
            None => {
                tracing::info!("Limit service reports no usage for quota");
                Ok(Measurement::Unmeasurable)
            }
        }
    }

    /// Copy of `catalog` with each quota's applied limit fetched from the limit
    /// service. Quotas without a service code, and failed lookups, keep their
    /// declared default.
    pub async fn with_applied_limits(&self, catalog: &QuotaCatalog) -> QuotaCatalog {
        let registry = self.registry();
        let Some(client) = registry.limits(LIMITS_SERVICE).await else {
            return catalog.clone();
        };
        if !registry.is_healthy(LIMITS_SERVICE).await {
            tracing::warn!("Limit service unhealthy, using declared limits");
            return catalog.clone();
        }

        let client = &client;
        let mut refreshed = 0usize;
        let mut quotas = Vec::with_capacity(catalog.len());
        for quota in catalog.iter() {
            let mut quota = quota.clone();
            if let Some(service_code) = quota.service_code.clone() {
                let code = quota.code.clone();
                let (service_code, code) = (&service_code, &code);
                match self
                    .executor()
                    .call(LIMITS_SERVICE, "get_service_quota", move || {
                        client.lookup(service_code, code, None)
                    })
                    .await
                {
                    Ok(lookup) => {
                        if let Some(limit) = lookup.limit_value.filter(|l| l.is_finite() && *l >= 0.0)
                        {
                            if limit != quota.default_limit {
                                tracing::debug!(
                                    quota_code = %quota.code,
                                    declared = quota.default_limit,
                                    applied = limit,
                                    "Using applied limit"
                                );
                            }
                            quota.default_limit = limit;
                            refreshed += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            quota_code = %quota.code,
                            error = %e,
                            "Failed to refresh applied limit, using default"
                        );
                    }
                }
            }
            quotas.push(quota);
        }

        tracing::info!(refreshed, total = quotas.len(), "Applied limits refreshed");
        QuotaCatalog::from_definitions(quotas)
    }
}

/// Number of named levels in a hierarchy structure.
fn hierarchy_depth(structure: Option<&Value>) -> usize {
    let Some(structure) = structure else {
        return 0;
    };
    HIERARCHY_LEVELS
        .iter()
        .filter(|level| {
            structure
                .get(**level)
                .and_then(|l| l.get("Name"))
                .and_then(Value::as_str)
                .is_some_and(|name| !name.is_empty())
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rate_policy_buckets() {
        let policy = RateEstimatePolicy::default();
        assert_eq!(policy.estimate(10.0, &[]), 1.0);
        assert_eq!(policy.estimate(10.0, &[0.0, 0.0]), 5.0);
        assert_eq!(policy.estimate(10.0, &[0.0, 3.0]), 9.0);
    }

    #[test]
    fn hierarchy_counts_named_levels() {
        let structure = json!({
            "LevelOne": {"Id": "1", "Name": "Org"},
            "LevelTwo": {"Id": "2", "Name": "Region"},
            "LevelThree": {"Id": "3", "Name": ""},
            "LevelFour": null
        });
        assert_eq!(hierarchy_depth(Some(&structure)), 2);
        assert_eq!(hierarchy_depth(Some(&json!({}))), 0);
        assert_eq!(hierarchy_depth(None), 0);
    }

    #[test]
    fn skip_reason_display() {
        assert_eq!(
            SkipReason::ServiceUnavailable("wisdom".into()).to_string(),
            "service wisdom unavailable"
        );
    }
}
