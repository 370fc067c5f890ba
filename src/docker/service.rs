// ABOUTME: Container service holding the shared daemon session and per-call settings

use super::recreate::{InFlightRecreates, RecreateStrategy};
use super::DockerApi;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub stop_grace: Duration,
    pub stats_interface: String,
    pub list_sizes: bool,
    pub recreate_strategy: RecreateStrategy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(10),
            stats_interface: "eth0".to_string(),
            list_sizes: true,
            recreate_strategy: RecreateStrategy::default(),
        }
    }
}

/// Entry point for inspection and lifecycle operations against one daemon.
///
/// Clones share the session and the set of in-flight recreates, so a clone can be
/// handed to every request handler.
pub struct ContainerService<R> {
    pub(super) runtime: Arc<R>,
    pub(super) settings: ServiceSettings,
    pub(super) in_flight: InFlightRecreates,
}

impl<R> Clone for ContainerService<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            settings: self.settings.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

impl<R: DockerApi> ContainerService<R> {
    pub fn new(runtime: R, settings: ServiceSettings) -> Self {
        Self::from_shared(Arc::new(runtime), settings)
    }

    pub fn from_shared(runtime: Arc<R>, settings: ServiceSettings) -> Self {
        Self {
            runtime,
            settings,
            in_flight: InFlightRecreates::default(),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub(super) fn stop_grace_secs(&self) -> i64 {
        i64::try_from(self.settings.stop_grace.as_secs()).unwrap_or(i64::MAX)
    }
}
