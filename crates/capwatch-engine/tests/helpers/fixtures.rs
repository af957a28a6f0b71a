use capwatch_core::{
    CountMode, LimitLookupSpec, ListingSpec, MeasurementStrategy, MetricSpec, NestedListingSpec,
    QuotaDefinition, QuotaScope, RateSpec, Statistic,
};

pub fn quota(code: &str, scope: QuotaScope, strategy: MeasurementStrategy, limit: f64) -> QuotaDefinition {
    QuotaDefinition {
        code: code.to_string(),
        name: format!("{} quota", code),
        category: "General".to_string(),
        scope,
        strategy,
        default_limit: limit,
        context_required: false,
        service_code: None,
    }
}

/// Resource quota counting `operation` items, keyed by `InstanceId`.
pub fn count_quota(code: &str, operation: &str, result_key: &str, limit: f64) -> QuotaDefinition {
    quota(
        code,
        QuotaScope::Resource,
        MeasurementStrategy::CountResources {
            listing: ListingSpec::new("connect", operation, result_key)
                .with_resource_param("InstanceId"),
            mode: CountMode::Paginated,
        },
        limit,
    )
}

pub fn hierarchy_quota(code: &str) -> QuotaDefinition {
    quota(
        code,
        QuotaScope::Resource,
        MeasurementStrategy::CountResources {
            listing: ListingSpec::new(
                "connect",
                "describe_user_hierarchy_structure",
                "HierarchyStructure",
            )
            .with_resource_param("InstanceId"),
            mode: CountMode::HierarchyDepth,
        },
        5.0,
    )
}

pub fn nested_quota(code: &str, limit: f64) -> QuotaDefinition {
    quota(
        code,
        QuotaScope::Account,
        MeasurementStrategy::CountNestedResources(NestedListingSpec {
            parent: ListingSpec::new("voice-id", "list_domains", "DomainSummaries"),
            child: ListingSpec::new("voice-id", "list_speakers", "SpeakerSummaries"),
            join_key: "DomainId".to_string(),
            child_param: "DomainId".to_string(),
        }),
        limit,
    )
}

pub fn metric_quota(code: &str, statistic: Statistic, limit: f64) -> QuotaDefinition {
    quota(
        code,
        QuotaScope::Resource,
        MeasurementStrategy::SampledMetric(MetricSpec {
            service: "cloudwatch".to_string(),
            namespace: "AWS/Connect".to_string(),
            metric_name: "ConcurrentCalls".to_string(),
            statistic,
            dimension_name: "InstanceId".to_string(),
            window_minutes: None,
        }),
        limit,
    )
}

pub fn rate_quota(code: &str, limit: f64) -> QuotaDefinition {
    quota(
        code,
        QuotaScope::Account,
        MeasurementStrategy::RateEstimate(RateSpec {
            service: "cloudwatch".to_string(),
            namespace: "AWS/Connect".to_string(),
            operation: "StartChatContact".to_string(),
            signal_metric: "ThrottlingException".to_string(),
            dimension_name: "ApiName".to_string(),
            window_minutes: None,
        }),
        limit,
    )
}

pub fn lookup_quota(code: &str, limit: f64) -> QuotaDefinition {
    let mut quota = quota(
        code,
        QuotaScope::Resource,
        MeasurementStrategy::ExternalLimitLookup(LimitLookupSpec {
            service: "service-quotas".to_string(),
            service_code: "connect".to_string(),
            quota_code: code.to_string(),
        }),
        limit,
    );
    quota.context_required = true;
    quota
}

pub fn unmeasurable_quota(code: &str) -> QuotaDefinition {
    quota(code, QuotaScope::Resource, MeasurementStrategy::Unmeasurable, 5.0)
}
