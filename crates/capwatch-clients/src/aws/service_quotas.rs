use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_servicequotas::operation::get_service_quota::builders::GetServiceQuotaFluentBuilder;
use aws_sdk_servicequotas::Client;
use capwatch_core::constants::{LIMITS_SERVICE, METRIC_PERIOD_SECS};
use capwatch_core::{RemoteError, Statistic};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

use super::sdk_error;
use crate::traits::{LimitLookup, LimitLookupClient, MetricQuery, MetricsClient};

/// Look-back used when reading a quota's usage metric.
const USAGE_WINDOW_MINUTES: i64 = 60;

/// Service Quotas `GetServiceQuota`, with usage read from the quota's
/// CloudWatch usage metric when one is published
#[derive(Clone)]
pub struct ServiceQuotasClient {
    client: Client,
    metrics: Option<Arc<dyn MetricsClient>>,
}

impl ServiceQuotasClient {
    pub fn new(config: &SdkConfig, metrics: Option<Arc<dyn MetricsClient>>) -> Self {
        Self {
            client: Client::new(config),
            metrics,
        }
    }

    /// `GetServiceQuota` request, scoped to a resource when `context_id` is set.
    fn quota_request(
        &self,
        service_code: &str,
        quota_code: &str,
        context_id: Option<&str>,
    ) -> GetServiceQuotaFluentBuilder {
        self.client
            .get_service_quota()
            .service_code(service_code)
            .quota_code(quota_code)
            .set_context_id(context_id.map(str::to_string))
    }
}

#[async_trait]
impl LimitLookupClient for ServiceQuotasClient {
    #[tracing::instrument(skip(self), fields(aws.service.name = "service-quotas"))]
    async fn lookup(
        &self,
        service_code: &str,
        quota_code: &str,
        context_id: Option<&str>,
    ) -> Result<LimitLookup, RemoteError> {
        let operation = "get_service_quota";
        let out = self
            .quota_request(service_code, quota_code, context_id)
            .send()
            .await
            .map_err(|e| sdk_error(LIMITS_SERVICE, operation, e))?;

        let Some(quota) = out.quota() else {
            return Ok(LimitLookup::default());
        };
        let limit_value = quota.value();

        let usage_metric = quota.usage_metric().and_then(|m| {
            Some((
                m.metric_namespace()?.to_string(),
                m.metric_name()?.to_string(),
                m.metric_dimensions().cloned().unwrap_or_default(),
                m.metric_statistic_recommendation()
                    .and_then(|s| s.parse::<Statistic>().ok())
                    .unwrap_or(Statistic::Maximum),
            ))
        });

        let current_usage = match (usage_metric, &self.metrics) {
            (Some((namespace, metric_name, dimensions, statistic)), Some(metrics)) => {
                let end_time = Utc::now();
                let query = MetricQuery {
                    namespace,
                    metric_name,
                    dimensions: dimensions.into_iter().collect(),
                    start_time: end_time - ChronoDuration::minutes(USAGE_WINDOW_MINUTES),
                    end_time,
                    period_secs: METRIC_PERIOD_SECS,
                    statistic,
                };
                let values: Vec<f64> = metrics.query(&query).await?.iter().map(|d| d.value).collect();
                statistic.reduce(&values)
            }
            _ => None,
        };

        tracing::debug!(
            quota_code = %quota_code,
            context_id = context_id.unwrap_or("-"),
            limit = ?limit_value,
            usage = ?current_usage,
            "Service quota looked up"
        );

        Ok(LimitLookup {
            current_usage,
            limit_value,
        })
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.client
            .list_services()
            .max_results(1)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error(LIMITS_SERVICE, "list_services", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_servicequotas::config::{BehaviorVersion, Region};

    fn client() -> ServiceQuotasClient {
        let config = SdkConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        ServiceQuotasClient::new(&config, None)
    }

    #[test]
    fn request_carries_lookup_context() {
        let arn = "arn:aws:connect:us-east-1:111122223333:instance/i-1";
        let request = client().quota_request("connect", "L-12AB7C57", Some(arn));
        let input = request.as_input();
        assert_eq!(input.get_service_code().as_deref(), Some("connect"));
        assert_eq!(input.get_quota_code().as_deref(), Some("L-12AB7C57"));
        assert_eq!(input.get_context_id().as_deref(), Some(arn));
    }

    #[test]
    fn account_request_has_no_context() {
        let request = client().quota_request("connect", "L-12AB7C57", None);
        assert_eq!(request.as_input().get_context_id(), &None);
    }
}
