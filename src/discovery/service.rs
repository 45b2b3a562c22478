use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::Discovery;

/// What a job advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceDefinition {
    /// Unique instance id, usually `name-hostname`.
    pub id: String,
    /// Service name other containers look up.
    pub name: String,
    /// Advertised port.
    pub port: u16,
    /// Heartbeat TTL; a missed heartbeat for this long marks the instance critical.
    pub ttl: Duration,
    /// Tags attached to the registration.
    pub tags: Vec<String>,
    /// Advertised address.
    pub ip_address: String,
    /// Let the backend override tags.
    pub enable_tag_override: bool,
    /// Backend removes the instance after it was critical this long.
    pub deregister_critical_after: Option<Duration>,
}

impl ServiceDefinition {
    /// A definition with the given name and id, everything else defaulted.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the advertised address and port.
    pub fn with_address(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.ip_address = ip.into();
        self.port = port;
        self
    }

    /// Sets the heartbeat TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the registration tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// A service definition bound to the backend it is advertised on.
///
/// Shared read-only between a job and status reporting.
#[derive(Clone)]
pub struct Advertisement {
    definition: Arc<ServiceDefinition>,
    backend: Arc<dyn Discovery>,
}

impl std::fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advertisement")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl Advertisement {
    /// Binds `definition` to `backend`.
    pub fn new(definition: ServiceDefinition, backend: Arc<dyn Discovery>) -> Self {
        Self {
            definition: Arc::new(definition),
            backend,
        }
    }

    /// The advertised definition.
    pub fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    /// Sends a heartbeat; failures are logged.
    pub async fn heartbeat(&self) {
        if let Err(err) = self.backend.send_heartbeat(&self.definition).await {
            warn!(service = %self.definition.id, error = %err, label = err.as_label(), "service update TTL failed");
        }
    }

    /// Marks the service for maintenance; failures are logged.
    pub async fn mark_for_maintenance(&self) {
        debug!(service = %self.definition.id, "marking for maintenance");
        if let Err(err) = self.backend.mark_for_maintenance(&self.definition).await {
            warn!(service = %self.definition.id, error = %err, label = err.as_label(), "marking for maintenance failed");
        }
    }

    /// Deregisters the service; failures are logged.
    pub async fn deregister(&self) {
        debug!(service = %self.definition.id, "deregistering");
        if let Err(err) = self.backend.deregister(&self.definition).await {
            warn!(service = %self.definition.id, error = %err, label = err.as_label(), "deregistering failed");
        }
    }
}
