//! Test helpers: fake collaborators, registry wiring and quota fixtures.
//!
//! Run from workspace root: `cargo test -p capwatch-engine`.

#![allow(dead_code)]

pub mod fixtures;

use async_trait::async_trait;
use capwatch_clients::{
    ClientHandle, ClientRegistry, Datapoint, LimitLookup, LimitLookupClient, ListingClient,
    ListingPage, MetricQuery, MetricsClient, NotificationMessage, NotificationSink, RetryExecutor,
    RetryPolicy, ServiceDeclaration,
};
use capwatch_core::constants::NEXT_TOKEN_PARAM;
use capwatch_core::{ErrorKind, MonitorConfig, RemoteError};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ListingHandler =
    Box<dyn Fn(&str, &Map<String, Value>) -> Result<ListingPage, RemoteError> + Send + Sync>;

/// Listing client answering from a closure
pub struct FakeListing {
    handler: ListingHandler,
    calls: AtomicUsize,
    unreachable: AtomicBool,
}

impl FakeListing {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Map<String, Value>) -> Result<ListingPage, RemoteError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make connectivity checks fail from now on.
    pub fn go_offline(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingClient for FakeListing {
    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<ListingPage, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(operation, params)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(remote_error(ErrorKind::Transient, "ping"))
        } else {
            Ok(())
        }
    }
}

/// Cursor of the request, if any.
pub fn cursor(params: &Map<String, Value>) -> Option<&str> {
    params.get(NEXT_TOKEN_PARAM).and_then(Value::as_str)
}

/// `pages` pages of `per_page` distinct items under `result_key`, chained by
/// cursors `p1`, `p2`, ...
pub fn paged_items(
    result_key: &str,
    pages: usize,
    per_page: usize,
    params: &Map<String, Value>,
) -> ListingPage {
    let page = cursor(params)
        .and_then(|c| c.trim_start_matches('p').parse::<usize>().ok())
        .unwrap_or(0);
    let items = (0..per_page)
        .map(|i| json!({ "Id": format!("item-{}-{}", page, i) }))
        .collect();
    let next = if page + 1 < pages {
        Some(format!("p{}", page + 1))
    } else {
        None
    };
    ListingPage::with_items(result_key, items, next)
}

/// Single page of `count` items.
pub fn items_page(result_key: &str, count: usize) -> ListingPage {
    let items = (0..count).map(|i| json!({ "Id": format!("item-{}", i) })).collect();
    ListingPage::with_items(result_key, items, None)
}

/// Connect instance listing page.
pub fn instances_page(ids: &[&str]) -> ListingPage {
    let items = ids
        .iter()
        .map(|id| {
            json!({
                "Id": id,
                "Arn": format!("arn:aws:connect:us-east-1:111122223333:instance/{}", id),
                "InstanceAlias": format!("alias-{}", id),
            })
        })
        .collect();
    ListingPage::with_items("InstanceSummaryList", items, None)
}

pub fn remote_error(kind: ErrorKind, operation: &str) -> RemoteError {
    RemoteError::new(kind, "connect", operation, "scripted failure")
}

type MetricsHandler = Box<dyn Fn(&MetricQuery) -> Result<Vec<f64>, RemoteError> + Send + Sync>;

/// Metrics client answering from a closure
pub struct FakeMetrics {
    handler: MetricsHandler,
    queries: Mutex<Vec<MetricQuery>>,
    unreachable: AtomicBool,
}

impl FakeMetrics {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&MetricQuery) -> Result<Vec<f64>, RemoteError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            queries: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn values(values: Vec<f64>) -> Self {
        Self::new(move |_| Ok(values.clone()))
    }

    pub fn failing(kind: ErrorKind) -> Self {
        Self::new(move |_| {
            Err(RemoteError::new(
                kind,
                "cloudwatch",
                "get_metric_statistics",
                "scripted failure",
            ))
        })
    }

    pub fn queries(&self) -> Vec<MetricQuery> {
        self.queries.lock().unwrap().clone()
    }

    /// Make connectivity checks fail from now on.
    pub fn go_offline(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricsClient for FakeMetrics {
    async fn query(&self, query: &MetricQuery) -> Result<Vec<Datapoint>, RemoteError> {
        self.queries.lock().unwrap().push(query.clone());
        let values = (self.handler)(query)?;
        Ok(values
            .into_iter()
            .map(|value| Datapoint {
                timestamp: Utc::now(),
                value,
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(RemoteError::new(
                ErrorKind::Transient,
                "cloudwatch",
                "list_metrics",
                "scripted failure",
            ))
        } else {
            Ok(())
        }
    }
}

/// Limit lookup client with a fixed answer
pub struct FakeLimits {
    answer: Result<LimitLookup, ErrorKind>,
    contexts: Mutex<Vec<Option<String>>>,
}

impl FakeLimits {
    pub fn new(current_usage: Option<f64>, limit_value: Option<f64>) -> Self {
        Self {
            answer: Ok(LimitLookup {
                current_usage,
                limit_value,
            }),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            answer: Err(kind),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn contexts(&self) -> Vec<Option<String>> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LimitLookupClient for FakeLimits {
    async fn lookup(
        &self,
        _service_code: &str,
        quota_code: &str,
        context_id: Option<&str>,
    ) -> Result<LimitLookup, RemoteError> {
        self.contexts
            .lock()
            .unwrap()
            .push(context_id.map(String::from));
        self.answer.map_err(|kind| {
            RemoteError::new(kind, "service-quotas", "get_service_quota", quota_code)
        })
    }
}

/// A message captured by [`RecordingSink`]
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub subject: String,
    pub message: NotificationMessage,
}

/// Notification sink that records every publish
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<Published>>,
    reject_topic: bool,
}

impl RecordingSink {
    pub fn rejecting_topic() -> Self {
        Self {
            reject_topic: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(
        &self,
        topic: &str,
        message: &NotificationMessage,
        subject: &str,
    ) -> Result<(), RemoteError> {
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            subject: subject.to_string(),
            message: message.clone(),
        });
        Ok(())
    }

    async fn validate_topic(&self, topic: &str) -> Result<(), RemoteError> {
        if self.reject_topic {
            Err(RemoteError::new(
                ErrorKind::NotFound,
                "sns",
                "get_topic_attributes",
                format!("topic {} does not exist", topic),
            ))
        } else {
            Ok(())
        }
    }
}

/// Registry builder for tests
#[derive(Default)]
pub struct TestRegistry {
    declarations: Vec<ServiceDeclaration>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, handle: ClientHandle) -> Self {
        self.declarations
            .push(ServiceDeclaration::required(name, Arc::new(handle)));
        self
    }

    pub fn optional(mut self, name: &str, handle: ClientHandle) -> Self {
        self.declarations
            .push(ServiceDeclaration::optional(name, Arc::new(handle)));
        self
    }

    pub fn listing(self, name: &str, client: Arc<FakeListing>) -> Self {
        self.required(name, ClientHandle::Listing(client))
    }

    pub fn metrics(self, client: Arc<FakeMetrics>) -> Self {
        self.optional("cloudwatch", ClientHandle::Metrics(client))
    }

    pub fn limits(self, client: Arc<FakeLimits>) -> Self {
        self.optional("service-quotas", ClientHandle::Limits(client))
    }

    pub fn notifications(self, sink: Arc<RecordingSink>) -> Self {
        self.optional("sns", ClientHandle::Notifications(sink))
    }

    pub async fn connect(self) -> Arc<ClientRegistry> {
        Arc::new(
            ClientRegistry::connect(self.declarations)
                .await
                .expect("registry should connect"),
        )
    }

    /// Executor with a zero-delay retry policy over the connected registry.
    pub async fn executor(self) -> RetryExecutor {
        RetryExecutor::new(self.connect().await, RetryPolicy::zero_delay(3))
    }
}

/// Configuration for tests: sequential, no remote storage, generous deadline.
pub fn test_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.threshold_percentage = 80.0;
    config.account_alias = "test-account".to_string();
    config.max_workers = 1;
    config.batch_size = 4;
    config.cycle_deadline = Duration::from_secs(60);
    config.deadline_margin = Duration::from_secs(1);
    config.max_pages = 100;
    config
}
