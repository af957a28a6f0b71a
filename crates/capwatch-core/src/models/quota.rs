//! Quota definitions and the closed set of measurement strategies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::resource::ResourceContext;

/// Whether a quota applies once per account or once per monitored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaScope {
    Account,
    Resource,
}

impl FromStr for QuotaScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "account" => Ok(QuotaScope::Account),
            "resource" => Ok(QuotaScope::Resource),
            _ => Err(anyhow::anyhow!("Invalid quota scope: {}", s)),
        }
    }
}

impl Display for QuotaScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            QuotaScope::Account => write!(f, "account"),
            QuotaScope::Resource => write!(f, "resource"),
        }
    }
}

/// Reduction applied to a sampled metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Maximum,
    Average,
    Sum,
    Minimum,
    SampleCount,
}

impl Statistic {
    /// Reduce a series of data points to one value. `None` when the series is empty.
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let reduced = match self {
            Statistic::Maximum => values.iter().copied().fold(f64::MIN, f64::max),
            Statistic::Minimum => values.iter().copied().fold(f64::MAX, f64::min),
            Statistic::Average => values.iter().sum::<f64>() / values.len() as f64,
            Statistic::Sum | Statistic::SampleCount => values.iter().sum(),
        };
        Some(reduced)
    }
}

impl FromStr for Statistic {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "maximum" | "max" => Ok(Statistic::Maximum),
            "average" | "avg" | "mean" => Ok(Statistic::Average),
            "sum" | "total" => Ok(Statistic::Sum),
            "minimum" | "min" => Ok(Statistic::Minimum),
            "samplecount" | "sample_count" => Ok(Statistic::SampleCount),
            _ => Err(anyhow::anyhow!("Invalid statistic: {}", s)),
        }
    }
}

impl Display for Statistic {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Statistic::Maximum => write!(f, "Maximum"),
            Statistic::Average => write!(f, "Average"),
            Statistic::Sum => write!(f, "Sum"),
            Statistic::Minimum => write!(f, "Minimum"),
            Statistic::SampleCount => write!(f, "SampleCount"),
        }
    }
}

/// How a listing response is turned into a count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    /// Follow continuation cursors and count every item.
    Paginated,
    /// Count populated levels of a nested hierarchy returned by one call.
    HierarchyDepth,
    /// Count the items of a single, non-paginated response.
    SinglePage,
}

impl FromStr for CountMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paginated" => Ok(CountMode::Paginated),
            "hierarchy_depth" => Ok(CountMode::HierarchyDepth),
            "single_page" => Ok(CountMode::SinglePage),
            _ => Err(anyhow::anyhow!("Invalid count mode: {}", s)),
        }
    }
}

/// A listing operation on a named service
#[derive(Debug, Clone, PartialEq)]
pub struct ListingSpec {
    pub service: String,
    pub operation: String,
    /// Response field holding the listed items.
    pub result_key: String,
    /// Static request parameters.
    pub params: Map<String, Value>,
    /// Parameter that receives the resource id when evaluated for a resource.
    pub resource_param: Option<String>,
}

impl ListingSpec {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        result_key: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            result_key: result_key.into(),
            params: Map::new(),
            resource_param: None,
        }
    }

    pub fn with_resource_param(mut self, name: impl Into<String>) -> Self {
        self.resource_param = Some(name.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Request parameters for one evaluation, with the resource id filled in when
    /// both a resource parameter and a context exist.
    pub fn params_for(&self, context: Option<&ResourceContext>) -> Map<String, Value> {
        let mut params = self.params.clone();
        if let (Some(name), Some(ctx)) = (&self.resource_param, context) {
            params.insert(name.clone(), Value::String(ctx.resource_id.clone()));
        }
        params
    }
}

/// Parent listing whose items fan out into one child listing each
#[derive(Debug, Clone, PartialEq)]
pub struct NestedListingSpec {
    pub parent: ListingSpec,
    pub child: ListingSpec,
    /// Field read from every parent item.
    pub join_key: String,
    /// Child request parameter that receives the parent's join value.
    pub child_param: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub service: String,
    pub namespace: String,
    pub metric_name: String,
    pub statistic: Statistic,
    /// Dimension that receives the resource id.
    pub dimension_name: String,
    pub window_minutes: Option<u32>,
}

/// Throttling-signal observation for rate quotas that cannot be measured exactly
#[derive(Debug, Clone, PartialEq)]
pub struct RateSpec {
    pub service: String,
    pub namespace: String,
    /// API operation whose rate is limited.
    pub operation: String,
    pub signal_metric: String,
    pub dimension_name: String,
    pub window_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitLookupSpec {
    pub service: String,
    pub service_code: String,
    pub quota_code: String,
}

/// Measurement technique, each variant carrying the parameters it needs
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementStrategy {
    CountResources { listing: ListingSpec, mode: CountMode },
    CountNestedResources(NestedListingSpec),
    SampledMetric(MetricSpec),
    RateEstimate(RateSpec),
    ExternalLimitLookup(LimitLookupSpec),
    Unmeasurable,
}

impl MeasurementStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            MeasurementStrategy::CountResources { .. } => "count_resources",
            MeasurementStrategy::CountNestedResources(_) => "count_nested_resources",
            MeasurementStrategy::SampledMetric(_) => "sampled_metric",
            MeasurementStrategy::RateEstimate(_) => "rate_estimate",
            MeasurementStrategy::ExternalLimitLookup(_) => "external_limit_lookup",
            MeasurementStrategy::Unmeasurable => "unmeasurable",
        }
    }

    /// Services whose clients this strategy calls.
    pub fn services(&self) -> Vec<&str> {
        match self {
            MeasurementStrategy::CountResources { listing, .. } => vec![listing.service.as_str()],
            MeasurementStrategy::CountNestedResources(nested) => {
                let mut services = vec![nested.parent.service.as_str()];
                if nested.child.service != nested.parent.service {
                    services.push(nested.child.service.as_str());
                }
                services
            }
            MeasurementStrategy::SampledMetric(spec) => vec![spec.service.as_str()],
            MeasurementStrategy::RateEstimate(spec) => vec![spec.service.as_str()],
            MeasurementStrategy::ExternalLimitLookup(spec) => vec![spec.service.as_str()],
            MeasurementStrategy::Unmeasurable => Vec::new(),
        }
    }

    /// Service credited as the source of a measurement.
    pub fn source_service(&self) -> &str {
        match self {
            MeasurementStrategy::CountNestedResources(nested) => &nested.child.service,
            other => other.services().first().copied().unwrap_or("none"),
        }
    }
}

/// Immutable description of one capacity limit
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaDefinition {
    pub code: String,
    pub name: String,
    pub category: String,
    pub scope: QuotaScope,
    pub strategy: MeasurementStrategy,
    pub default_limit: f64,
    /// Lookups must be keyed by the resource even when the call itself is account level.
    pub context_required: bool,
    /// Service code used to refresh the applied limit, when one exists.
    pub service_code: Option<String>,
}

impl QuotaDefinition {
    /// Whether this quota is evaluated for the given context.
    ///
    /// Account quotas are evaluated only without a context, resource quotas only with one.
    pub fn applies_to(&self, context: Option<&ResourceContext>) -> bool {
        match self.scope {
            QuotaScope::Account => context.is_none(),
            QuotaScope::Resource => context.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing_quota(scope: QuotaScope) -> QuotaDefinition {
        QuotaDefinition {
            code: "L-USERS".into(),
            name: "Users".into(),
            category: "Users".into(),
            scope,
            strategy: MeasurementStrategy::CountResources {
                listing: ListingSpec::new("connect", "list_users", "UserSummaryList")
                    .with_resource_param("InstanceId"),
                mode: CountMode::Paginated,
            },
            default_limit: 500.0,
            context_required: false,
            service_code: None,
        }
    }

    #[test]
    fn statistic_reduction() {
        let values = [2.0, 8.0, 5.0];
        assert_eq!(Statistic::Maximum.reduce(&values), Some(8.0));
        assert_eq!(Statistic::Average.reduce(&values), Some(5.0));
        assert_eq!(Statistic::Sum.reduce(&values), Some(15.0));
        assert_eq!(Statistic::Minimum.reduce(&values), Some(2.0));
        assert_eq!(Statistic::Maximum.reduce(&[]), None);
    }

    #[test]
    fn statistic_parsing_accepts_aliases() {
        assert_eq!("max".parse::<Statistic>().unwrap(), Statistic::Maximum);
        assert_eq!("Average".parse::<Statistic>().unwrap(), Statistic::Average);
        assert_eq!("total".parse::<Statistic>().unwrap(), Statistic::Sum);
        assert!("median".parse::<Statistic>().is_err());
    }

    #[test]
    fn scope_filtering() {
        let ctx = ResourceContext::new("instance-1");
        let account = listing_quota(QuotaScope::Account);
        let resource = listing_quota(QuotaScope::Resource);

        assert!(account.applies_to(None));
        assert!(!account.applies_to(Some(&ctx)));
        assert!(resource.applies_to(Some(&ctx)));
        assert!(!resource.applies_to(None));
    }

    #[test]
    fn params_include_resource_id() {
        let spec = ListingSpec::new("connect", "list_queues", "QueueSummaryList")
            .with_resource_param("InstanceId")
            .with_param("QueueTypes", json!(["STANDARD"]));
        let ctx = ResourceContext::new("instance-1");

        let params = spec.params_for(Some(&ctx));
        assert_eq!(params["InstanceId"], json!("instance-1"));
        assert_eq!(params["QueueTypes"], json!(["STANDARD"]));

        let params = spec.params_for(None);
        assert!(!params.contains_key("InstanceId"));
    }

    #[test]
    fn nested_strategy_services() {
        let strategy = MeasurementStrategy::CountNestedResources(NestedListingSpec {
            parent: ListingSpec::new("wisdom", "list_knowledge_bases", "knowledgeBaseSummaries"),
            child: ListingSpec::new("wisdom", "list_content", "contentSummaries"),
            join_key: "knowledgeBaseId".into(),
            child_param: "knowledgeBaseId".into(),
        });
        assert_eq!(strategy.services(), vec!["wisdom"]);
        assert_eq!(strategy.source_service(), "wisdom");
        assert!(MeasurementStrategy::Unmeasurable.services().is_empty());
    }
}
