//! In-memory backend for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Discovery, ServiceDefinition};
use crate::error::DiscoveryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Heartbeat(String),
    Maintenance(String),
    Deregister(String),
    Upstream(String),
}

/// Records every call; upstream checks pop scripted answers (default: no change).
#[derive(Default)]
pub(crate) struct FakeDiscovery {
    calls: Mutex<Vec<Call>>,
    upstream: Mutex<VecDeque<Result<bool, DiscoveryError>>>,
}

impl FakeDiscovery {
    pub(crate) fn script_upstream(&self, answers: impl IntoIterator<Item = Result<bool, DiscoveryError>>) {
        self.upstream.lock().unwrap().extend(answers);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Discovery for FakeDiscovery {
    async fn send_heartbeat(&self, service: &ServiceDefinition) -> Result<(), DiscoveryError> {
        self.push(Call::Heartbeat(service.id.clone()));
        Ok(())
    }

    async fn mark_for_maintenance(&self, service: &ServiceDefinition) -> Result<(), DiscoveryError> {
        self.push(Call::Maintenance(service.id.clone()));
        Ok(())
    }

    async fn deregister(&self, service: &ServiceDefinition) -> Result<(), DiscoveryError> {
        self.push(Call::Deregister(service.id.clone()));
        Ok(())
    }

    async fn check_for_upstream_changes(
        &self,
        service: &str,
        _tag: Option<&str>,
    ) -> Result<bool, DiscoveryError> {
        self.push(Call::Upstream(service.to_string()));
        self.upstream.lock().unwrap().pop_front().unwrap_or(Ok(false))
    }
}
