//! Quota catalog loading and validation
//!
//! The catalog is a JSON object mapping quota code to its definition. Loading
//! validates every entry and reports all problems at once instead of stopping
//! at the first one.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::constants::{
    DEFAULT_METRIC_DIMENSION, DEFAULT_RATE_DIMENSION, DEFAULT_RATE_SIGNAL_METRIC, LIMITS_SERVICE,
    METRICS_SERVICE,
};
use crate::error::CatalogError;
use crate::models::{
    CountMode, LimitLookupSpec, ListingSpec, MeasurementStrategy, MetricSpec, NestedListingSpec,
    QuotaDefinition, QuotaScope, RateSpec, Statistic,
};

const DEFAULT_LISTING_SERVICE: &str = "connect";
const DEFAULT_METRIC_NAMESPACE: &str = "AWS/Connect";

/// Listing operation as written in the catalog
#[derive(Debug, Default, Deserialize)]
struct RawListing {
    service: Option<String>,
    operation: Option<String>,
    result_key: Option<String>,
    #[serde(default)]
    params: Map<String, Value>,
    resource_param: Option<String>,
}

/// One catalog entry before validation
#[derive(Debug, Deserialize)]
struct RawQuotaEntry {
    name: Option<String>,
    category: Option<String>,
    scope: Option<String>,
    method: Option<String>,
    default_limit: Option<f64>,
    #[serde(default)]
    context_required: bool,
    service_code: Option<String>,

    // count_resources / count_nested_resources (child side)
    #[serde(flatten)]
    listing: RawListing,
    count_mode: Option<String>,
    parent: Option<RawListing>,
    join_key: Option<String>,
    child_param: Option<String>,

    // sampled_metric / rate_estimate
    namespace: Option<String>,
    metric_name: Option<String>,
    statistic: Option<String>,
    dimension: Option<String>,
    signal_metric: Option<String>,
    window_minutes: Option<u32>,

    // external_limit_lookup
    lookup_service_code: Option<String>,
    quota_code: Option<String>,
}

/// Validated, read-only set of quota definitions ordered by quota code
#[derive(Debug, Clone, Default)]
pub struct QuotaCatalog {
    quotas: Vec<QuotaDefinition>,
}

impl QuotaCatalog {
    /// Parse and validate a JSON catalog.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let entries: BTreeMap<String, Value> = serde_json::from_str(json)?;
        let mut errors = Vec::new();
        let mut quotas = Vec::with_capacity(entries.len());

        for (code, value) in entries {
            let raw: RawQuotaEntry = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(e) => {
                    errors.push(format!("{}: {}", code, e));
                    continue;
                }
            };
            match build_definition(&code, raw) {
                Ok(quota) => quotas.push(quota),
                Err(mut entry_errors) => errors.append(&mut entry_errors),
            }
        }

        if !errors.is_empty() {
            return Err(CatalogError::Invalid(errors));
        }

        tracing::debug!(quota_count = quotas.len(), "Quota catalog loaded");
        Ok(Self { quotas })
    }

    /// Read and validate a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Build a catalog from already constructed definitions.
    pub fn from_definitions(mut quotas: Vec<QuotaDefinition>) -> Self {
        quotas.sort_by(|a, b| a.code.cmp(&b.code));
        quotas.dedup_by(|a, b| a.code == b.code);
        Self { quotas }
    }

    /// Give every `L-` coded quota without a service code the given one, so its
    /// applied limit can be refreshed.
    pub fn with_default_service_code(mut self, service_code: &str) -> Self {
        for quota in &mut self.quotas {
            if quota.service_code.is_none() && quota.code.starts_with("L-") {
                quota.service_code = Some(service_code.to_string());
            }
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuotaDefinition> {
        self.quotas.iter()
    }

    pub fn len(&self) -> usize {
        self.quotas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&QuotaDefinition> {
        self.quotas
            .binary_search_by(|q| q.code.as_str().cmp(code))
            .ok()
            .map(|idx| &self.quotas[idx])
    }

    pub fn account_quotas(&self) -> impl Iterator<Item = &QuotaDefinition> {
        self.iter().filter(|q| q.scope == QuotaScope::Account)
    }

    pub fn resource_quotas(&self) -> impl Iterator<Item = &QuotaDefinition> {
        self.iter().filter(|q| q.scope == QuotaScope::Resource)
    }
}

fn build_definition(code: &str, raw: RawQuotaEntry) -> Result<QuotaDefinition, Vec<String>> {
    let mut errors = Vec::new();

    let name = raw.name.clone().unwrap_or_else(|| {
        errors.push(format!("{}: missing required field 'name'", code));
        String::new()
    });
    let category = raw.category.clone().unwrap_or_else(|| "General".to_string());

    let scope = match raw.scope.as_deref() {
        Some(s) => s.parse::<QuotaScope>().map_err(|_| {
            errors.push(format!("{}: invalid scope '{}' (expected account or resource)", code, s));
        }),
        None => {
            errors.push(format!("{}: missing required field 'scope'", code));
            Err(())
        }
    };

    let default_limit = match raw.default_limit {
        Some(limit) if limit < 0.0 => {
            errors.push(format!("{}: default_limit must not be negative", code));
            0.0
        }
        Some(limit) => limit,
        None => {
            errors.push(format!("{}: missing required field 'default_limit'", code));
            0.0
        }
    };

    let strategy = match raw.method.as_deref() {
        Some(method) => build_strategy(code, method, &raw, &mut errors),
        None => {
            errors.push(format!("{}: missing required field 'method'", code));
            None
        }
    };

    if raw.context_required && matches!(scope, Ok(QuotaScope::Account)) {
        errors.push(format!(
            "{}: context_required is only valid for resource scoped quotas",
            code
        ));
    }

    match (scope, strategy) {
        (Ok(scope), Some(strategy)) if errors.is_empty() => Ok(QuotaDefinition {
            code: code.to_string(),
            name,
            category,
            scope,
            strategy,
            default_limit,
            context_required: raw.context_required,
            service_code: raw.service_code,
        }),
        _ => Err(errors),
    }
}

fn build_strategy(
    code: &str,
    method: &str,
    raw: &RawQuotaEntry,
    errors: &mut Vec<String>,
) -> Option<MeasurementStrategy> {
    let mut require = |field: &str, value: &Option<String>| -> Option<String> {
        if value.is_none() {
            errors.push(format!("{}: method '{}' requires '{}'", code, method, field));
        }
        value.clone()
    };

    match method {
        "count_resources" => {
            let listing = build_listing(&raw.listing, &mut require);
            let mode = match raw.count_mode.as_deref() {
                Some(m) => match m.parse::<CountMode>() {
                    Ok(mode) => Some(mode),
                    Err(_) => {
                        require("count_mode (paginated, hierarchy_depth or single_page)", &None);
                        None
                    }
                },
                None => Some(CountMode::Paginated),
            };
            Some(MeasurementStrategy::CountResources {
                listing: listing?,
                mode: mode?,
            })
        }
        "count_nested_resources" => {
            let child = build_listing(&raw.listing, &mut require);
            let parent = match &raw.parent {
                Some(parent) => build_listing(parent, &mut require),
                None => {
                    require("parent", &None);
                    None
                }
            };
            let join_key = require("join_key", &raw.join_key);
            let child_param = raw.child_param.clone().or_else(|| join_key.clone());
            Some(MeasurementStrategy::CountNestedResources(NestedListingSpec {
                parent: parent?,
                child: child?,
                join_key: join_key?,
                child_param: child_param?,
            }))
        }
        "sampled_metric" => {
            let metric_name = require("metric_name", &raw.metric_name);
            let statistic = match raw.statistic.as_deref() {
                Some(s) => match s.parse::<Statistic>() {
                    Ok(stat) => Some(stat),
                    Err(_) => {
                        require("statistic (Maximum, Average, Sum, Minimum or SampleCount)", &None);
                        None
                    }
                },
                None => Some(Statistic::Maximum),
            };
            Some(MeasurementStrategy::SampledMetric(MetricSpec {
                service: raw.listing.service.clone().unwrap_or_else(|| METRICS_SERVICE.to_string()),
                namespace: namespace(raw),
                metric_name: metric_name?,
                statistic: statistic?,
                dimension_name: raw
                    .dimension
                    .clone()
                    .unwrap_or_else(|| DEFAULT_METRIC_DIMENSION.to_string()),
                window_minutes: raw.window_minutes,
            }))
        }
        "rate_estimate" => {
            let operation = require("operation", &raw.listing.operation);
            Some(MeasurementStrategy::RateEstimate(RateSpec {
                service: raw.listing.service.clone().unwrap_or_else(|| METRICS_SERVICE.to_string()),
                namespace: namespace(raw),
                operation: operation?,
                signal_metric: raw
                    .signal_metric
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RATE_SIGNAL_METRIC.to_string()),
                dimension_name: raw
                    .dimension
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RATE_DIMENSION.to_string()),
                window_minutes: raw.window_minutes,
            }))
        }
        "external_limit_lookup" => {
            let service_code = raw
                .lookup_service_code
                .clone()
                .or_else(|| raw.service_code.clone());
            let service_code = require("lookup_service_code", &service_code);
            Some(MeasurementStrategy::ExternalLimitLookup(LimitLookupSpec {
                service: raw.listing.service.clone().unwrap_or_else(|| LIMITS_SERVICE.to_string()),
                service_code: service_code?,
                quota_code: raw.quota_code.clone().unwrap_or_else(|| code.to_string()),
            }))
        }
        "unmeasurable" => Some(MeasurementStrategy::Unmeasurable),
        other => {
            errors.push(format!("{}: unknown method '{}'", code, other));
            None
        }
    }
}

fn build_listing(
    raw: &RawListing,
    require: &mut impl FnMut(&str, &Option<String>) -> Option<String>,
) -> Option<ListingSpec> {
    let operation = require("operation", &raw.operation);
    let result_key = require("result_key", &raw.result_key);
    Some(ListingSpec {
        service: raw
            .service
            .clone()
            .unwrap_or_else(|| DEFAULT_LISTING_SERVICE.to_string()),
        operation: operation?,
        result_key: result_key?,
        params: raw.params.clone(),
        resource_param: raw.resource_param.clone(),
    })
}

fn namespace(raw: &RawQuotaEntry) -> String {
    raw.namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_METRIC_NAMESPACE.to_string())
}
