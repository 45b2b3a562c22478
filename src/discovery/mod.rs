//! # Service discovery capability.
//!
//! Backends (Consul, etcd, ZooKeeper, ...) live outside this crate; jobs and
//! watches only see the small [`Discovery`] trait.
//!
//! ```text
//! Job ──► Advertisement ──► Discovery::send_heartbeat / mark_for_maintenance / deregister
//! Watch ─────────────────► Discovery::check_for_upstream_changes
//! ```
//!
//! Backend failures never stop an entity: the [`Advertisement`] helpers log
//! them at `warn`, and a watch treats them as "no change".

mod service;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::error::DiscoveryError;

pub use service::{Advertisement, ServiceDefinition};

/// Operations a discovery backend must provide.
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    /// Marks the service as passing (registering it first if needed).
    async fn send_heartbeat(&self, service: &ServiceDefinition) -> Result<(), DiscoveryError>;

    /// Takes the service out of rotation while maintenance is on.
    async fn mark_for_maintenance(&self, service: &ServiceDefinition) -> Result<(), DiscoveryError>;

    /// Removes the service registration.
    async fn deregister(&self, service: &ServiceDefinition) -> Result<(), DiscoveryError>;

    /// Returns true if the set of healthy instances of `service` changed since the last call.
    async fn check_for_upstream_changes(
        &self,
        service: &str,
        tag: Option<&str>,
    ) -> Result<bool, DiscoveryError>;
}
