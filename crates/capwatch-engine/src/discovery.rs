//! Resource discovery
//!
//! Enumerates the monitored resources and caches them for a TTL. A failed
//! refresh falls back to the stale cache; only an empty cache is fatal.

use capwatch_core::{RemoteError, ResourceContext};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::paginate::PaginatedCollector;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Resource discovery failed and nothing is cached: {0}")]
    NothingCached(#[source] RemoteError),
}

/// A value with the time it was stored
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    entry: Option<(Instant, T)>,
    ttl: Duration,
}

impl<T> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    pub fn store(&mut self, value: T) {
        self.entry = Some((Instant::now(), value));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// True when empty or older than the TTL.
    pub fn is_stale(&self) -> bool {
        match &self.entry {
            Some((stored_at, _)) => stored_at.elapsed() >= self.ttl,
            None => true,
        }
    }

    /// The cached value while it is within the TTL.
    pub fn fresh(&self) -> Option<&T> {
        if self.is_stale() {
            None
        } else {
            self.entry.as_ref().map(|(_, value)| value)
        }
    }

    /// The cached value regardless of age.
    pub fn any(&self) -> Option<&T> {
        self.entry.as_ref().map(|(_, value)| value)
    }

    pub fn age(&self) -> Option<Duration> {
        self.entry.as_ref().map(|(stored_at, _)| stored_at.elapsed())
    }
}

/// Listing operation that enumerates monitored resources
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySource {
    pub service: String,
    pub operation: String,
    pub result_key: String,
    pub id_field: String,
    pub arn_field: String,
    pub alias_field: String,
}

impl Default for DiscoverySource {
    fn default() -> Self {
        Self {
            service: "connect".to_string(),
            operation: "list_instances".to_string(),
            result_key: "InstanceSummaryList".to_string(),
            id_field: "Id".to_string(),
            arn_field: "Arn".to_string(),
            alias_field: "InstanceAlias".to_string(),
        }
    }
}

impl DiscoverySource {
    fn to_context(&self, item: &Value) -> Option<ResourceContext> {
        let text = |field: &str| {
            item.get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        let mut context = ResourceContext::new(text(&self.id_field)?);
        if let Some(arn) = text(&self.arn_field) {
            context = context.with_arn(arn);
        }
        if let Some(alias) = text(&self.alias_field) {
            context = context.with_alias(alias);
        }
        Some(context)
    }
}

/// Discovers resources with a TTL cache and a single-writer refresh
pub struct ResourceDiscovery {
    collector: PaginatedCollector,
    source: DiscoverySource,
    cache: RwLock<TtlCache<Vec<ResourceContext>>>,
    refresh: Mutex<()>,
}

impl ResourceDiscovery {
    pub fn new(collector: PaginatedCollector, source: DiscoverySource, ttl: Duration) -> Self {
        Self {
            collector,
            source,
            cache: RwLock::new(TtlCache::new(ttl)),
            refresh: Mutex::new(()),
        }
    }

    /// Monitored resources, refreshed when the cache is stale or `force_refresh` is set.
    pub async fn resources(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<ResourceContext>, DiscoveryError> {
        if !force_refresh {
            if let Some(resources) = self.cache.read().await.fresh() {
                tracing::debug!(count = resources.len(), "Using cached resources");
                return Ok(resources.clone());
            }
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if !force_refresh {
            if let Some(resources) = self.cache.read().await.fresh() {
                return Ok(resources.clone());
            }
        }

        match self.discover().await {
            Ok(resources) => {
                tracing::info!(count = resources.len(), "Resources discovered");
                self.cache.write().await.store(resources.clone());
                Ok(resources)
            }
            Err(e) => {
                let cache = self.cache.read().await;
                match cache.any() {
                    Some(stale) => {
                        tracing::warn!(
                            error = %e,
                            age_secs = cache.age().map(|a| a.as_secs()).unwrap_or_default(),
                            count = stale.len(),
                            "Resource discovery failed, serving stale cache"
                        );
                        Ok(stale.clone())
                    }
                    None => {
                        tracing::error!(error = %e, "Resource discovery failed with empty cache");
                        Err(DiscoveryError::NothingCached(e))
                    }
                }
            }
        }
    }

    pub async fn invalidate(&self) {
        self.cache.write().await.invalidate();
    }

    async fn discover(&self) -> Result<Vec<ResourceContext>, RemoteError> {
        let items = self
            .collector
            .collect_all(
                &self.source.service,
                &self.source.operation,
                &self.source.result_key,
                &Map::new(),
            )
            .await?;

        let mut resources = Vec::with_capacity(items.len());
        for item in &items {
            match self.source.to_context(item) {
                Some(context) => resources.push(context),
                None => tracing::warn!(
                    id_field = %self.source.id_field,
                    "Discovered item has no id, skipping"
                ),
            }
        }
        resources.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(resources)
    }
}
