use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{Dimension, Statistic as AwsStatistic};
use aws_sdk_cloudwatch::Client;
use capwatch_core::constants::METRICS_SERVICE;
use capwatch_core::{RemoteError, Statistic};
use chrono::{DateTime, Utc};

use super::sdk_error;
use crate::traits::{Datapoint, MetricQuery, MetricsClient};

/// CloudWatch `GetMetricStatistics` behind the metric query trait
#[derive(Clone)]
pub struct CloudWatchMetricsClient {
    client: Client,
}

impl CloudWatchMetricsClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

fn aws_statistic(statistic: Statistic) -> AwsStatistic {
    match statistic {
        Statistic::Maximum => AwsStatistic::Maximum,
        Statistic::Average => AwsStatistic::Average,
        Statistic::Sum => AwsStatistic::Sum,
        Statistic::Minimum => AwsStatistic::Minimum,
        Statistic::SampleCount => AwsStatistic::SampleCount,
    }
}

fn to_aws_time(time: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_secs(time.timestamp())
}

#[async_trait]
impl MetricsClient for CloudWatchMetricsClient {
    #[tracing::instrument(skip(self, query), fields(
        aws.service.name = "cloudwatch",
        metric.namespace = %query.namespace,
        metric.name = %query.metric_name
    ))]
    async fn query(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, RemoteError> {
        let operation = "get_metric_statistics";
        let dimensions = query
            .dimensions
            .iter()
            .map(|(name, value)| Dimension::builder().name(name).value(value).build())
            .collect::<Vec<_>>();

        let out = self
            .client
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .set_dimensions(Some(dimensions))
            .start_time(to_aws_time(query.start_time))
            .end_time(to_aws_time(query.end_time))
            .period(query.period_secs)
            .statistics(aws_statistic(query.statistic))
            .send()
            .await
            .map_err(|e| sdk_error(METRICS_SERVICE, operation, e))?;

        let points = out
            .datapoints()
            .iter()
            .filter_map(|dp| {
                let value = match query.statistic {
                    Statistic::Maximum => dp.maximum(),
                    Statistic::Average => dp.average(),
                    Statistic::Sum => dp.sum(),
                    Statistic::Minimum => dp.minimum(),
                    Statistic::SampleCount => dp.sample_count(),
                }?;
                let timestamp = dp
                    .timestamp()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), 0))
                    .unwrap_or(query.end_time);
                Some(Datapoint { timestamp, value })
            })
            .collect();

        Ok(points)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.client
            .list_metrics()
            .namespace("AWS/Connect")
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_error(METRICS_SERVICE, "list_metrics", e))
    }
}
