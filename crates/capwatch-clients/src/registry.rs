//! Client registry
//!
//! Owns one client handle per named service and the health record of each.
//! Required services that cannot be created or reached abort construction.
//! Optional services that fail are recorded as unavailable and excluded from
//! dispatch until they are reconnected.

use async_trait::async_trait;
use capwatch_core::{ErrorKind, RemoteError, ServiceHealth};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::traits::{LimitLookupClient, ListingClient, MetricsClient, NotificationSink};

/// Registry construction errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Required service {service} could not be initialised: {source}")]
    InitializationFailed {
        service: String,
        #[source]
        source: RemoteError,
    },

    #[error("Required service {service} is unreachable: {source}")]
    Unreachable {
        service: String,
        #[source]
        source: RemoteError,
    },
}

/// A client for one service, tagged with the collaborator role it plays
#[derive(Clone)]
pub enum ClientHandle {
    Listing(Arc<dyn ListingClient>),
    Metrics(Arc<dyn MetricsClient>),
    Limits(Arc<dyn LimitLookupClient>),
    Notifications(Arc<dyn NotificationSink>),
}

impl ClientHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientHandle::Listing(_) => "listing",
            ClientHandle::Metrics(_) => "metrics",
            ClientHandle::Limits(_) => "limits",
            ClientHandle::Notifications(_) => "notifications",
        }
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        match self {
            ClientHandle::Listing(client) => client.ping().await,
            ClientHandle::Metrics(client) => client.ping().await,
            ClientHandle::Limits(client) => client.ping().await,
            // Topics are validated separately by the publisher.
            ClientHandle::Notifications(_) => Ok(()),
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientHandle").field(&self.kind()).finish()
    }
}

/// Creates (and re-creates on reconnect) the client of one service
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self) -> Result<ClientHandle, RemoteError>;
}

/// A ready-made handle acts as a factory that always hands out itself.
#[async_trait]
impl ClientFactory for ClientHandle {
    async fn create(&self) -> Result<ClientHandle, RemoteError> {
        Ok(self.clone())
    }
}

/// A service the registry should manage
#[derive(Clone)]
pub struct ServiceDeclaration {
    pub name: String,
    pub required: bool,
    pub factory: Arc<dyn ClientFactory>,
}

impl ServiceDeclaration {
    pub fn required(name: impl Into<String>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            name: name.into(),
            required: true,
            factory,
        }
    }

    pub fn optional(name: impl Into<String>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            name: name.into(),
            required: false,
            factory,
        }
    }
}

/// Permission failures prove the endpoint answered, so they count as reachable.
fn is_reachable(result: &Result<(), RemoteError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => e.kind == ErrorKind::Permission,
    }
}

pub struct ClientRegistry {
    declarations: HashMap<String, ServiceDeclaration>,
    clients: RwLock<HashMap<String, ClientHandle>>,
    health: RwLock<HashMap<String, ServiceHealth>>,
}

impl ClientRegistry {
    /// Create a client for every declared service and verify required ones.
    #[tracing::instrument(skip_all, fields(services = declarations.len()))]
    pub async fn connect(declarations: Vec<ServiceDeclaration>) -> Result<Self, RegistryError> {
        let mut clients = HashMap::new();
        let mut health = HashMap::new();

        for decl in &declarations {
            match decl.factory.create().await {
                Ok(handle) => {
                    if decl.required {
                        let ping = handle.ping().await;
                        if !is_reachable(&ping) {
                            if let Err(source) = ping {
                                return Err(RegistryError::Unreachable {
                                    service: decl.name.clone(),
                                    source,
                                });
                            }
                        }
                        if let Err(e) = &ping {
                            tracing::info!(
                                service = %decl.name,
                                error = %e,
                                "Service reachable but access is restricted"
                            );
                        }
                    }
                    tracing::debug!(service = %decl.name, kind = handle.kind(), "Client initialised");
                    clients.insert(decl.name.clone(), handle);
                    health.insert(decl.name.clone(), ServiceHealth::new(&decl.name, decl.required));
                }
                Err(source) if decl.required => {
                    return Err(RegistryError::InitializationFailed {
                        service: decl.name.clone(),
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        service = %decl.name,
                        error = %e,
                        "Optional service unavailable, continuing in degraded mode"
                    );
                    health.insert(
                        decl.name.clone(),
                        ServiceHealth::unavailable(&decl.name, false, e.summary()),
                    );
                }
            }
        }

        Ok(Self {
            declarations: declarations
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            clients: RwLock::new(clients),
            health: RwLock::new(health),
        })
    }

    /// Handle of `service`, or `None` when it was never created.
    pub async fn get_client(&self, service: &str) -> Option<ClientHandle> {
        self.clients.read().await.get(service).cloned()
    }

    pub async fn listing(&self, service: &str) -> Option<Arc<dyn ListingClient>> {
        match self.get_client(service).await {
            Some(ClientHandle::Listing(client)) => Some(client),
            _ => None,
        }
    }

    pub async fn metrics(&self, service: &str) -> Option<Arc<dyn MetricsClient>> {
        match self.get_client(service).await {
            Some(ClientHandle::Metrics(client)) => Some(client),
            _ => None,
        }
    }

    pub async fn limits(&self, service: &str) -> Option<Arc<dyn LimitLookupClient>> {
        match self.get_client(service).await {
            Some(ClientHandle::Limits(client)) => Some(client),
            _ => None,
        }
    }

    pub async fn notifications(&self, service: &str) -> Option<Arc<dyn NotificationSink>> {
        match self.get_client(service).await {
            Some(ClientHandle::Notifications(client)) => Some(client),
            _ => None,
        }
    }

    pub fn is_declared(&self, service: &str) -> bool {
        self.declarations.contains_key(service)
    }

    pub fn is_required(&self, service: &str) -> bool {
        self.declarations
            .get(service)
            .map(|d| d.required)
            .unwrap_or(false)
    }

    /// Unknown services are reported unhealthy.
    pub async fn is_healthy(&self, service: &str) -> bool {
        self.health
            .read()
            .await
            .get(service)
            .map(|h| h.healthy)
            .unwrap_or(false)
    }

    pub async fn mark_healthy(&self, service: &str) {
        // Most calls succeed against an already healthy service; skip the write lock then.
        if self.is_healthy(service).await {
            return;
        }
        if let Some(health) = self.health.write().await.get_mut(service) {
            health.record_success();
            tracing::info!(service = %service, "Service recovered");
        }
    }

    pub async fn mark_unhealthy(&self, service: &str, error: impl Into<String>) {
        if let Some(health) = self.health.write().await.get_mut(service) {
            health.record_failure(error);
            tracing::warn!(
                service = %service,
                consecutive_failures = health.consecutive_failures,
                "Service marked unhealthy"
            );
        }
    }

    /// Re-create the client of `service` and verify it. Returns the new health.
    pub async fn reconnect(&self, service: &str) -> bool {
        let Some(decl) = self.declarations.get(service) else {
            tracing::warn!(service = %service, "Cannot reconnect undeclared service");
            return false;
        };

        let outcome = match decl.factory.create().await {
            Ok(handle) => {
                let ping = handle.ping().await;
                self.clients
                    .write()
                    .await
                    .insert(service.to_string(), handle);
                if is_reachable(&ping) {
                    Ok(())
                } else {
                    ping
                }
            }
            Err(e) => Err(e),
        };

        let mut health = self.health.write().await;
        let entry = health
            .entry(service.to_string())
            .or_insert_with(|| ServiceHealth::new(service, decl.required));
        match outcome {
            Ok(()) => {
                entry.record_success();
                tracing::info!(service = %service, "Service reconnected");
                true
            }
            Err(e) => {
                entry.record_failure(e.summary());
                tracing::warn!(service = %service, error = %e, "Reconnect failed");
                false
            }
        }
    }

    /// Ping every service with a client and reconnect those without one.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        let mut names: Vec<&String> = self.declarations.keys().collect();
        names.sort();

        for name in names {
            let healthy = match self.get_client(name).await {
                Some(handle) => {
                    let ping = handle.ping().await;
                    match ping {
                        Ok(()) => {
                            self.mark_healthy(name).await;
                            true
                        }
                        Err(e) if e.kind == ErrorKind::Permission => {
                            self.mark_healthy(name).await;
                            true
                        }
                        Err(e) => {
                            self.mark_unhealthy(name, e.summary()).await;
                            false
                        }
                    }
                }
                None => self.reconnect(name).await,
            };
            results.insert(name.clone(), healthy);
        }

        results
    }

    /// Health records ordered by service name.
    pub async fn health_snapshot(&self) -> Vec<ServiceHealth> {
        let mut snapshot: Vec<ServiceHealth> = self.health.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| a.service.cmp(&b.service));
        snapshot
    }

    /// Required services that are currently unhealthy.
    pub async fn unhealthy_required(&self) -> Vec<String> {
        self.unhealthy(true).await
    }

    /// Optional services that are currently unhealthy or were never created.
    pub async fn unhealthy_optional(&self) -> Vec<String> {
        self.unhealthy(false).await
    }

    async fn unhealthy(&self, required: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .health
            .read()
            .await
            .values()
            .filter(|h| h.required == required && !h.healthy)
            .map(|h| h.service.clone())
            .collect();
        names.sort();
        names
    }
}
