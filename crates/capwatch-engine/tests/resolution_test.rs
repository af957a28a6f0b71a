#[path = "helpers/mod.rs"]
mod helpers;

use capwatch_clients::ListingPage;
use capwatch_core::{
    ErrorKind, QuotaCatalog, QuotaScope, ResourceContext, Statistic,
};
use capwatch_engine::{
    PaginatedCollector, Resolution, ResolutionDispatcher, ResolverOptions, SkipReason,
};
use helpers::fixtures::{
    count_quota, hierarchy_quota, lookup_quota, metric_quota, nested_quota, rate_quota,
    unmeasurable_quota,
};
use helpers::{items_page, remote_error, FakeLimits, FakeListing, FakeMetrics, TestRegistry};
use serde_json::json;
use std::sync::Arc;

fn dispatcher(executor: capwatch_clients::RetryExecutor) -> ResolutionDispatcher {
    ResolutionDispatcher::new(PaginatedCollector::new(executor, 100), ResolverOptions::default())
}

fn connect_listing() -> Arc<FakeListing> {
    Arc::new(FakeListing::new(|operation, params| match operation {
        "list_users" => {
            assert_eq!(params.get("InstanceId"), Some(&json!("i-1")));
            Ok(items_page("UserSummaryList", 40))
        }
        "describe_user_hierarchy_structure" => {
            let mut fields = serde_json::Map::new();
            fields.insert(
                "HierarchyStructure".into(),
                json!({
                    "LevelOne": {"Id": "1", "Name": "Company"},
                    "LevelTwo": {"Id": "2", "Name": "Site"},
                    "LevelThree": {"Id": "3", "Name": "Team"}
                }),
            );
            Ok(ListingPage::new(fields, None))
        }
        other => Err(remote_error(ErrorKind::UnknownStrategy, other)),
    }))
}

fn instance() -> ResourceContext {
    ResourceContext::new("i-1").with_arn("arn:aws:connect:us-east-1:111122223333:instance/i-1")
}

#[tokio::test]
async fn test_count_resources_measures_usage() {
    let executor = TestRegistry::new()
        .listing("connect", connect_listing())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let quota = count_quota("L-USERS", "list_users", "UserSummaryList", 50.0);
    let result = dispatcher
        .resolve(&quota, Some(&instance()))
        .await
        .into_result()
        .unwrap();

    assert_eq!(result.current_usage(), 40.0);
    assert_eq!(result.limit(), 50.0);
    assert_eq!(result.utilization_percentage(), 80.0);
    assert_eq!(result.resource_id(), Some("i-1"));
    assert_eq!(result.strategy(), "count_resources");
    assert_eq!(result.source_service(), "connect");
    assert!(!result.is_estimated());
}

#[tokio::test]
async fn test_zero_limit_yields_zero_percent() {
    let executor = TestRegistry::new()
        .listing("connect", connect_listing())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let quota = count_quota("L-USERS", "list_users", "UserSummaryList", 0.0);
    let result = dispatcher
        .resolve(&quota, Some(&instance()))
        .await
        .into_result()
        .unwrap();

    assert_eq!(result.current_usage(), 40.0);
    assert_eq!(result.utilization_percentage(), 0.0);
}

#[tokio::test]
async fn test_scope_mismatch_is_skipped() {
    let listing = connect_listing();
    let executor = TestRegistry::new()
        .listing("connect", listing.clone())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let resource_quota = count_quota("L-USERS", "list_users", "UserSummaryList", 50.0);
    assert_eq!(
        dispatcher.resolve(&resource_quota, None).await,
        Resolution::Skipped(SkipReason::ScopeMismatch)
    );

    let mut account_quota = resource_quota.clone();
    account_quota.scope = QuotaScope::Account;
    assert_eq!(
        dispatcher.resolve(&account_quota, Some(&instance())).await,
        Resolution::Skipped(SkipReason::ScopeMismatch)
    );

    assert_eq!(listing.calls(), 0);
}

#[tokio::test]
async fn test_hierarchy_depth_counts_named_levels() {
    let executor = TestRegistry::new()
        .listing("connect", connect_listing())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let result = dispatcher
        .resolve(&hierarchy_quota("L-HIER"), Some(&instance()))
        .await
        .into_result()
        .unwrap();
    assert_eq!(result.current_usage(), 3.0);
    assert_eq!(result.utilization_percentage(), 60.0);
}

#[tokio::test]
async fn test_missing_hierarchy_is_zero() {
    let listing = Arc::new(FakeListing::new(|operation, _| {
        Err(remote_error(ErrorKind::NotFound, operation))
    }));
    let executor = TestRegistry::new()
        .listing("connect", listing)
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let result = dispatcher
        .resolve(&hierarchy_quota("L-HIER"), Some(&instance()))
        .await
        .into_result()
        .unwrap();
    assert_eq!(result.current_usage(), 0.0);
}

#[tokio::test]
async fn test_unsupported_operation_fails_quota_only() {
    let executor = TestRegistry::new()
        .listing("connect", connect_listing())
        .executor()
        .await;
    let registry = executor.registry().clone();
    let dispatcher = dispatcher(executor);

    let quota = count_quota("L-EVAL", "list_evaluation_forms", "EvaluationFormSummaryList", 10.0);
    match dispatcher.resolve(&quota, Some(&instance())).await {
        Resolution::Failed(e) => assert_eq!(e.kind, ErrorKind::UnknownStrategy),
        other => panic!("unexpected resolution {:?}", other),
    }
    assert!(registry.is_healthy("connect").await);
}

#[tokio::test]
async fn test_nested_count_resolves_account_quota() {
    let listing = Arc::new(FakeListing::new(|operation, params| match operation {
        "list_domains" => Ok(ListingPage::with_items(
            "DomainSummaries",
            vec![json!({"DomainId": "d-1"}), json!({"DomainId": "d-2"})],
            None,
        )),
        _ => {
            let size = if params.get("DomainId") == Some(&json!("d-1")) { 3 } else { 5 };
            Ok(items_page("SpeakerSummaries", size))
        }
    }));
    let executor = TestRegistry::new()
        .listing("voice-id", listing)
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let result = dispatcher
        .resolve(&nested_quota("L-SPEAKERS", 100.0), None)
        .await
        .into_result()
        .unwrap();
    assert_eq!(result.current_usage(), 8.0);
    assert_eq!(result.source_service(), "voice-id");
    assert_eq!(result.resource_id(), None);
}

#[tokio::test]
async fn test_sampled_metric_reduces_per_statistic() {
    let metrics = Arc::new(FakeMetrics::values(vec![2.0, 8.0, 5.0]));
    let executor = TestRegistry::new()
        .metrics(metrics.clone())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let cases = [
        (Statistic::Maximum, 8.0),
        (Statistic::Average, 5.0),
        (Statistic::Sum, 15.0),
    ];
    for (statistic, expected) in cases {
        let result = dispatcher
            .resolve(&metric_quota("L-CALLS", statistic, 10.0), Some(&instance()))
            .await
            .into_result()
            .unwrap();
        assert_eq!(result.current_usage(), expected, "{:?}", statistic);
    }

    let query = &metrics.queries()[0];
    assert_eq!(query.dimensions, vec![("InstanceId".to_string(), "i-1".to_string())]);
    assert_eq!(query.period_secs, 300);
    assert_eq!((query.end_time - query.start_time).num_minutes(), 60);
}

#[tokio::test]
async fn test_sampled_metric_without_datapoints_is_zero() {
    let executor = TestRegistry::new()
        .metrics(Arc::new(FakeMetrics::values(Vec::new())))
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let resolution = dispatcher
        .resolve(&metric_quota("L-CALLS", Statistic::Maximum, 10.0), Some(&instance()))
        .await;
    let result = resolution.into_result().unwrap();
    assert_eq!(result.current_usage(), 0.0);
}

#[tokio::test]
async fn test_metric_failure_fails_quota_and_marks_service() {
    let executor = TestRegistry::new()
        .metrics(Arc::new(FakeMetrics::failing(ErrorKind::Transient)))
        .executor()
        .await;
    let registry = executor.registry().clone();
    let dispatcher = dispatcher(executor);

    let quota = metric_quota("L-CALLS", Statistic::Maximum, 10.0);
    match dispatcher.resolve(&quota, Some(&instance())).await {
        Resolution::Failed(e) => {
            assert_eq!(e.kind, ErrorKind::Transient);
            assert_eq!(e.attempts, 3);
        }
        other => panic!("unexpected resolution {:?}", other),
    }
    assert!(!registry.is_healthy("cloudwatch").await);

    // the optional service is now skipped instead of retried
    assert_eq!(
        dispatcher.resolve(&quota, Some(&instance())).await,
        Resolution::Skipped(SkipReason::ServiceUnavailable("cloudwatch".into()))
    );
}

#[tokio::test]
async fn test_rate_estimate_buckets() {
    let cases = [
        (vec![0.0, 4.0], 9.0),
        (vec![0.0, 0.0], 5.0),
        (Vec::new(), 1.0),
    ];
    for (signal, expected) in cases {
        let metrics = Arc::new(FakeMetrics::values(signal));
        let executor = TestRegistry::new()
            .metrics(metrics.clone())
            .executor()
            .await;
        let dispatcher = dispatcher(executor);

        let result = dispatcher
            .resolve(&rate_quota("L-RATE", 10.0), None)
            .await
            .into_result()
            .unwrap();
        assert_eq!(result.current_usage(), expected);
        assert!(result.is_estimated());

        let query = &metrics.queries()[0];
        assert_eq!(query.metric_name, "ThrottlingException");
        assert_eq!(query.statistic, Statistic::SampleCount);
        assert_eq!(
            query.dimensions,
            vec![("ApiName".to_string(), "StartChatContact".to_string())]
        );
        assert_eq!((query.end_time - query.start_time).num_minutes(), 5);
    }
}

#[tokio::test]
async fn test_limit_lookup_uses_authoritative_limit_and_context() {
    let limits = Arc::new(FakeLimits::new(Some(45.0), Some(50.0)));
    let executor = TestRegistry::new()
        .limits(limits.clone())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let result = dispatcher
        .resolve(&lookup_quota("L-LENS", 10.0), Some(&instance()))
        .await
        .into_result()
        .unwrap();
    assert_eq!(result.current_usage(), 45.0);
    assert_eq!(result.limit(), 50.0);
    assert_eq!(
        limits.contexts(),
        vec![Some("arn:aws:connect:us-east-1:111122223333:instance/i-1".to_string())]
    );
}

#[tokio::test]
async fn test_limit_lookup_falls_back_to_default_limit() {
    let executor = TestRegistry::new()
        .limits(Arc::new(FakeLimits::new(Some(4.0), None)))
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let result = dispatcher
        .resolve(&lookup_quota("L-LENS", 10.0), Some(&instance()))
        .await
        .into_result()
        .unwrap();
    assert_eq!(result.limit(), 10.0);
    assert_eq!(result.utilization_percentage(), 40.0);
}

#[tokio::test]
async fn test_unmeasurable_is_distinct_from_failure() {
    let executor = TestRegistry::new()
        .listing("connect", connect_listing())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    assert_eq!(
        dispatcher
            .resolve(&unmeasurable_quota("L-ATTACH"), Some(&instance()))
            .await,
        Resolution::Unmeasurable
    );
}

#[tokio::test]
async fn test_unregistered_service_is_skipped() {
    let executor = TestRegistry::new()
        .listing("connect", connect_listing())
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    assert_eq!(
        dispatcher.resolve(&nested_quota("L-SPEAKERS", 10.0), None).await,
        Resolution::Skipped(SkipReason::ServiceUnavailable("voice-id".into()))
    );
}

#[tokio::test]
async fn test_applied_limits_replace_defaults_for_the_cycle() {
    let executor = TestRegistry::new()
        .limits(Arc::new(FakeLimits::new(None, Some(250.0))))
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let mut refreshed = count_quota("L-USERS", "list_users", "UserSummaryList", 50.0);
    refreshed.service_code = Some("connect".to_string());
    let untouched = count_quota("L-QUEUES", "list_queues", "QueueSummaryList", 50.0);
    let catalog = QuotaCatalog::from_definitions(vec![refreshed, untouched]);

    let applied = dispatcher.with_applied_limits(&catalog).await;
    assert_eq!(applied.get("L-USERS").unwrap().default_limit, 250.0);
    assert_eq!(applied.get("L-QUEUES").unwrap().default_limit, 50.0);
    assert_eq!(catalog.get("L-USERS").unwrap().default_limit, 50.0);
}

#[tokio::test]
async fn test_applied_limit_failure_keeps_default() {
    let executor = TestRegistry::new()
        .limits(Arc::new(FakeLimits::failing(ErrorKind::Permission)))
        .executor()
        .await;
    let dispatcher = dispatcher(executor);

    let mut quota = count_quota("L-USERS", "list_users", "UserSummaryList", 50.0);
    quota.service_code = Some("connect".to_string());
    let catalog = QuotaCatalog::from_definitions(vec![quota]);

    let applied = dispatcher.with_applied_limits(&catalog).await;
    assert_eq!(applied.get("L-USERS").unwrap().default_limit, 50.0);
}
