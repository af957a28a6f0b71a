#[path = "helpers/mod.rs"]
mod helpers;

use capwatch_clients::ListingPage;
use capwatch_core::{ErrorKind, ListingSpec, NestedListingSpec};
use capwatch_engine::PaginatedCollector;
use helpers::{cursor, items_page, paged_items, remote_error, FakeListing, TestRegistry};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

async fn collector(listing: Arc<FakeListing>, max_pages: usize) -> PaginatedCollector {
    let executor = TestRegistry::new()
        .listing("connect", listing)
        .executor()
        .await;
    PaginatedCollector::new(executor, max_pages)
}

#[tokio::test]
async fn test_collect_all_follows_cursors() {
    let listing = Arc::new(FakeListing::new(|_, params| {
        Ok(paged_items("UserSummaryList", 3, 10, params))
    }));
    let collector = collector(listing.clone(), 100).await;

    let items = collector
        .collect_all("connect", "list_users", "UserSummaryList", &Map::new())
        .await
        .unwrap();

    assert_eq!(items.len(), 30);
    let unique: HashSet<&str> = items.iter().filter_map(|i| i["Id"].as_str()).collect();
    assert_eq!(unique.len(), 30);
    assert_eq!(listing.calls(), 3);
}

#[tokio::test]
async fn test_count_matches_collect() {
    let listing = Arc::new(FakeListing::new(|_, params| {
        Ok(paged_items("QueueSummaryList", 4, 7, params))
    }));
    let collector = collector(listing, 100).await;

    let count = collector
        .count("connect", "list_queues", "QueueSummaryList", &Map::new())
        .await
        .unwrap();
    assert_eq!(count, 28);
}

#[tokio::test]
async fn test_page_ceiling_returns_partial_results() {
    let listing = Arc::new(FakeListing::new(|_, params| {
        Ok(paged_items("UserSummaryList", 50, 2, params))
    }));
    let collector = collector(listing.clone(), 5).await;

    let items = collector
        .collect_all("connect", "list_users", "UserSummaryList", &Map::new())
        .await
        .unwrap();

    assert_eq!(items.len(), 10);
    assert_eq!(listing.calls(), 5);
}

#[tokio::test]
async fn test_repeated_cursor_stops_enumeration() {
    let listing = Arc::new(FakeListing::new(|_, _| {
        Ok(ListingPage::with_items(
            "UserSummaryList",
            vec![json!({"Id": "same"})],
            Some("stuck".to_string()),
        ))
    }));
    let collector = collector(listing.clone(), 100).await;

    let items = collector
        .collect_all("connect", "list_users", "UserSummaryList", &Map::new())
        .await
        .unwrap();

    // first page, then the page that repeats the cursor
    assert_eq!(items.len(), 2);
    assert_eq!(listing.calls(), 2);
}

#[tokio::test]
async fn test_static_params_are_sent_on_every_page() {
    let listing = Arc::new(FakeListing::new(|_, params| {
        assert_eq!(params.get("InstanceId"), Some(&json!("i-1")));
        Ok(paged_items("UserSummaryList", 2, 1, params))
    }));
    let collector = collector(listing, 100).await;

    let mut params = Map::new();
    params.insert("InstanceId".into(), json!("i-1"));
    let count = collector
        .count("connect", "list_users", "UserSummaryList", &params)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_listing_failure_is_returned() {
    let listing = Arc::new(FakeListing::new(|operation, params| {
        if cursor(params).is_some() {
            Err(remote_error(ErrorKind::Permission, operation))
        } else {
            Ok(paged_items("UserSummaryList", 2, 5, params))
        }
    }));
    let collector = collector(listing, 100).await;

    let err = collector
        .count("connect", "list_users", "UserSummaryList", &Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Permission);
}

fn nested_spec() -> NestedListingSpec {
    NestedListingSpec {
        parent: ListingSpec::new("voice-id", "list_domains", "DomainSummaries"),
        child: ListingSpec::new("voice-id", "list_speakers", "SpeakerSummaries"),
        join_key: "DomainId".to_string(),
        child_param: "DomainId".to_string(),
    }
}

#[tokio::test]
async fn test_count_nested_sums_children_and_skips_parents_without_key() {
    let listing = Arc::new(FakeListing::new(|operation, params| match operation {
        "list_domains" => Ok(ListingPage::with_items(
            "DomainSummaries",
            vec![
                json!({"DomainId": "d-1"}),
                json!({"Name": "orphan"}),
                json!({"DomainId": "d-2"}),
            ],
            None,
        )),
        "list_speakers" => match params.get("DomainId").and_then(Value::as_str) {
            Some("d-1") => Ok(items_page("SpeakerSummaries", 3)),
            Some("d-2") => Ok(items_page("SpeakerSummaries", 5)),
            other => panic!("unexpected domain {:?}", other),
        },
        other => panic!("unexpected operation {}", other),
    }));
    let executor = TestRegistry::new()
        .listing("voice-id", listing)
        .executor()
        .await;
    let collector = PaginatedCollector::new(executor, 100);

    let counted = collector.count_nested(&nested_spec(), None).await.unwrap();

    assert_eq!(counted.total, 8);
    assert_eq!(counted.parents, 2);
    assert_eq!(counted.skipped, 1);
}

#[tokio::test]
async fn test_count_nested_child_failure_fails_count() {
    let listing = Arc::new(FakeListing::new(|operation, _| match operation {
        "list_domains" => Ok(ListingPage::with_items(
            "DomainSummaries",
            vec![json!({"DomainId": "d-1"})],
            None,
        )),
        _ => Err(remote_error(ErrorKind::Validation, operation)),
    }));
    let executor = TestRegistry::new()
        .listing("voice-id", listing)
        .executor()
        .await;
    let collector = PaginatedCollector::new(executor, 100);

    let err = collector.count_nested(&nested_spec(), None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_unregistered_service_is_an_error() {
    let listing = Arc::new(FakeListing::new(|_, _| Ok(ListingPage::default())));
    let collector = collector(listing, 100).await;

    let err = collector
        .count("wisdom", "list_knowledge_bases", "knowledgeBaseSummaries", &Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.service, "wisdom");
}
