// ABOUTME: Update-to-latest-image workflow: inspect, pull, create replacement, start it, remove original
// Runs one workflow per container at a time and reports the phase and leftovers on failure

use super::{ContainerService, DockerApi, Leftover, Operation, RecreatePhase, RuntimeError};
use crate::models::ImageReference;
use bollard::container::{Config, NetworkingConfig};
use bollard::models::{ContainerConfig, ContainerInspectResponse, EndpointSettings, HostConfig};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Docker's short container id length; also the length of its default hostname.
const SHORT_ID_LEN: usize = 12;

/// How the original container releases its name before the replacement is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecreateStrategy {
    /// Create while the original still holds the name; the daemon rejects the
    /// duplicate name and the update fails without side effects.
    CreateFirst,
    /// Rename the original out of the way, keeping it running.
    RenameOld,
    /// Rename and stop the original so its published host ports are free.
    #[default]
    StopAndRenameOld,
}

/// Ids and names with an update in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlightRecreates {
    keys: Arc<DashSet<String>>,
}

impl InFlightRecreates {
    /// Claims every key or none of them.
    pub fn try_acquire(&self, keys: &[&str]) -> Option<RecreateGuard> {
        let mut guard = RecreateGuard {
            keys: Arc::clone(&self.keys),
            held: Vec::new(),
        };
        guard.extend(keys).then_some(guard)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// Releases its keys when dropped.
#[derive(Debug)]
pub struct RecreateGuard {
    keys: Arc<DashSet<String>>,
    held: Vec<String>,
}

impl RecreateGuard {
    /// Claims further keys for the same update, every one or none. Keys this guard
    /// already holds are skipped.
    pub fn extend(&mut self, keys: &[&str]) -> bool {
        let mut added: Vec<String> = Vec::new();

        for key in keys.iter().filter(|k| !k.is_empty()) {
            if self.held.iter().chain(&added).any(|h| h == key) {
                continue;
            }
            if self.keys.insert((*key).to_string()) {
                added.push((*key).to_string());
            } else {
                for key in &added {
                    self.keys.remove(key);
                }
                return false;
            }
        }

        self.held.extend(added);
        true
    }
}

impl Drop for RecreateGuard {
    fn drop(&mut self) {
        for key in &self.held {
            self.keys.remove(key);
        }
    }
}

/// Everything needed to bring up an identical container.
#[derive(Debug, Clone)]
pub struct ContainerSnapshot {
    pub id: String,
    pub name: String,
    pub image: ImageReference,
    pub was_running: bool,
    pub config: Config<String>,
}

impl ContainerSnapshot {
    pub fn capture(inspect: ContainerInspectResponse) -> Result<Self, RuntimeError> {
        let id = inspect.id.unwrap_or_default();
        let missing = |what: &str| RuntimeError::Decode {
            operation: Operation::Inspect,
            id: id.clone(),
            message: format!("inspect response has no {}", what),
        };

        let name = inspect
            .name
            .as_deref()
            .map(|name| name.trim_start_matches('/').to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| missing("name"))?;

        let container_config = inspect.config.ok_or_else(|| missing("config"))?;
        let image_ref = container_config
            .image
            .clone()
            .filter(|image| !image.is_empty())
            .ok_or_else(|| missing("image"))?;

        let networks: HashMap<String, EndpointSettings> = inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_iter()
            .map(|(network, endpoint)| (network, endpoint_for_create(endpoint, &id)))
            .collect();

        let was_running = inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false);

        let config = create_config(container_config, inspect.host_config, networks, &id);

        Ok(Self {
            image: ImageReference::parse(&image_ref),
            id,
            name,
            was_running,
            config,
        })
    }

    /// Name the original is moved to while its replacement takes over.
    pub fn sidelined_name(&self) -> String {
        format!("{}-replaced-{}", self.name, short_id(&self.id))
    }
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// True for values the daemon derived from the old container id (default hostname,
/// automatic network alias), which must not leak into the replacement.
fn derived_from_id(value: &str, id: &str) -> bool {
    value.len() >= SHORT_ID_LEN && id.starts_with(value)
}

/// Keeps the declared parts of an endpoint and drops what the daemon assigned at runtime.
fn endpoint_for_create(endpoint: EndpointSettings, old_id: &str) -> EndpointSettings {
    let aliases = endpoint.aliases.map(|aliases| {
        aliases
            .into_iter()
            .filter(|alias| !derived_from_id(alias, old_id))
            .collect::<Vec<_>>()
    });

    EndpointSettings {
        ipam_config: endpoint.ipam_config,
        links: endpoint.links,
        aliases,
        network_id: endpoint.network_id,
        driver_opts: endpoint.driver_opts,
        ..Default::default()
    }
}

fn create_config(
    config: ContainerConfig,
    host_config: Option<HostConfig>,
    networks: HashMap<String, EndpointSettings>,
    old_id: &str,
) -> Config<String> {
    let mut create = Config::from(config);

    create.hostname = create
        .hostname
        .filter(|hostname| !hostname.is_empty() && !derived_from_id(hostname, old_id));
    create.host_config = host_config;
    create.networking_config = if networks.is_empty() {
        None
    } else {
        Some(NetworkingConfig {
            endpoints_config: networks,
        })
    };

    create
}

/// What was done to the original to make room for the replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Sideline {
    renamed: bool,
    stopped: bool,
}

impl Sideline {
    fn touched(self) -> bool {
        self.renamed || self.stopped
    }
}

fn cancel_requested(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|rx| *rx.borrow())
}

impl<R: DockerApi + 'static> ContainerService<R> {
    /// Recreates `id` from a freshly pulled copy of its image under the same name.
    ///
    /// `Ok` means the replacement is running and the original is gone. On error the
    /// phase and the surviving instances are reported; the original is never removed
    /// before its replacement has started.
    pub async fn update_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.update_container_with_cancel(id, None).await
    }

    /// As [`update_container`](Self::update_container), checking `cancel` before the
    /// pull and before the create. The workflow runs on its own task, so dropping the
    /// returned future does not interrupt a daemon call in flight.
    pub async fn update_container_with_cancel(
        &self,
        id: &str,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<(), RuntimeError> {
        let service = self.clone();
        let task_id = id.to_string();

        let task = tokio::spawn(async move { service.recreate(&task_id, cancel.as_ref()).await });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Update task for container {} failed: {}", id, e);
                Err(RuntimeError::Aborted {
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn recreate(
        &self,
        id: &str,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<(), RuntimeError> {
        let fail = |phase, leftover, source| RuntimeError::Recreate {
            id: id.to_string(),
            phase,
            leftover,
            source: Box::new(source),
        };

        let busy = |key: &str| {
            fail(
                RecreatePhase::Inspect,
                Leftover::Untouched,
                RuntimeError::Conflict {
                    operation: Operation::Update,
                    id: key.to_string(),
                    message: "an update of this container is already in progress".to_string(),
                },
            )
        };

        // Inspect
        let mut guard = self.in_flight.try_acquire(&[id]).ok_or_else(|| busy(id))?;
        let mut snapshot = self
            .inspect_snapshot(id)
            .await
            .map_err(|e| fail(RecreatePhase::Inspect, Leftover::Untouched, e))?;

        if !guard.extend(&[&snapshot.id, &snapshot.name]) {
            return Err(busy(&snapshot.name));
        }

        // A short id or alias was not covered by the first claim; another update may
        // have replaced the container between the inspect and the claim
        if id != snapshot.id && id != snapshot.name {
            snapshot = self
                .inspect_snapshot(&snapshot.id)
                .await
                .map_err(|e| fail(RecreatePhase::Inspect, Leftover::Untouched, e))?;
        }

        info!(
            "Updating container {} ({}) from image {}",
            snapshot.name,
            short_id(&snapshot.id),
            snapshot.image
        );

        // Pull
        if cancel_requested(cancel) {
            return Err(RuntimeError::Cancelled {
                id: id.to_string(),
                phase: RecreatePhase::Pull,
            });
        }
        if snapshot.image.is_pinned() {
            warn!(
                "Image {} is pinned by digest; the update will reuse the same content",
                snapshot.image
            );
        }
        let image = snapshot.image.to_string();
        self.runtime
            .pull_image(&snapshot.image.repository, snapshot.image.pull_tag())
            .await
            .map_err(|e| {
                fail(
                    RecreatePhase::Pull,
                    Leftover::Untouched,
                    RuntimeError::from_daemon(Operation::Pull, &image, e),
                )
            })?;
        info!("Pulled image {}", image);

        // Create
        if cancel_requested(cancel) {
            return Err(RuntimeError::Cancelled {
                id: id.to_string(),
                phase: RecreatePhase::Create,
            });
        }
        let sideline = self
            .sideline(&snapshot)
            .await
            .map_err(|(leftover, e)| fail(RecreatePhase::Create, leftover, e))?;

        let new_id = match self
            .runtime
            .create_container(&snapshot.name, snapshot.config.clone())
            .await
        {
            Ok(new_id) => new_id,
            Err(e) => {
                let source = RuntimeError::from_daemon(Operation::Create, &snapshot.name, e);
                error!("Failed to create replacement for {}: {}", snapshot.name, source);
                let leftover = self.restore(&snapshot, sideline).await;
                return Err(fail(RecreatePhase::Create, leftover, source));
            }
        };
        info!(
            "Created replacement container {} for {}",
            short_id(&new_id),
            snapshot.name
        );

        // Start new
        if let Err(e) = self.start_container(&new_id).await {
            error!(
                "Replacement {} for {} did not start: {}",
                short_id(&new_id),
                snapshot.name,
                e
            );
            let leftover = self.revive_original(&snapshot, sideline).await;
            return Err(fail(RecreatePhase::StartNew, leftover, e));
        }

        // Remove old
        self.delete_container(&snapshot.id)
            .await
            .map_err(|e| fail(RecreatePhase::RemoveOld, Leftover::NewOnlyOldLingering, e))?;

        info!(
            "Updated container {}: {} replaced by {}",
            snapshot.name,
            short_id(&snapshot.id),
            short_id(&new_id)
        );
        Ok(())
    }

    async fn inspect_snapshot(&self, id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        let inspect = self
            .runtime
            .inspect_container(id)
            .await
            .map_err(|e| RuntimeError::from_daemon(Operation::Inspect, id, e))?;
        ContainerSnapshot::capture(inspect)
    }

    /// Restarts an original the workflow stopped, once its replacement failed to start.
    async fn revive_original(&self, snapshot: &ContainerSnapshot, sideline: Sideline) -> Leftover {
        let kept_as = if sideline.renamed {
            snapshot.sidelined_name()
        } else {
            snapshot.name.clone()
        };

        if !sideline.stopped {
            warn!("Original {} kept as {}", short_id(&snapshot.id), kept_as);
            return if snapshot.was_running {
                Leftover::BothPresentOldRunning
            } else {
                Leftover::BothPresent
            };
        }

        match self.start_container(&snapshot.id).await {
            Ok(()) => {
                warn!(
                    "Original {} restarted as {}",
                    short_id(&snapshot.id),
                    kept_as
                );
                Leftover::BothPresentOldRunning
            }
            Err(e) => {
                error!("Failed to restart original {}: {}", kept_as, e);
                Leftover::BothPresent
            }
        }
    }

    /// Frees the name (and, when configured, the ports) held by the original.
    async fn sideline(
        &self,
        snapshot: &ContainerSnapshot,
    ) -> Result<Sideline, (Leftover, RuntimeError)> {
        let mut sideline = Sideline::default();
        let strategy = self.settings.recreate_strategy;

        if strategy == RecreateStrategy::CreateFirst {
            return Ok(sideline);
        }

        let sidelined_name = snapshot.sidelined_name();
        self.runtime
            .rename_container(&snapshot.id, &sidelined_name)
            .await
            .map_err(|e| {
                (
                    Leftover::Untouched,
                    RuntimeError::from_daemon(Operation::Rename, &snapshot.id, e),
                )
            })?;
        sideline.renamed = true;
        info!("Renamed {} to {}", snapshot.name, sidelined_name);

        if strategy == RecreateStrategy::StopAndRenameOld && snapshot.was_running {
            if let Err(e) = self.stop_container(&snapshot.id).await {
                let leftover = self.restore(snapshot, sideline).await;
                return Err((leftover, e));
            }
            sideline.stopped = true;
        }

        Ok(sideline)
    }

    /// Undoes [`sideline`](Self::sideline) after a failed create.
    async fn restore(&self, snapshot: &ContainerSnapshot, sideline: Sideline) -> Leftover {
        if !sideline.touched() {
            return Leftover::Untouched;
        }

        if sideline.renamed {
            if let Err(e) = self
                .runtime
                .rename_container(&snapshot.id, &snapshot.name)
                .await
            {
                error!(
                    "Failed to give {} its name {} back: {}",
                    snapshot.sidelined_name(),
                    snapshot.name,
                    e
                );
                return Leftover::OldSidelined;
            }
        }

        if sideline.stopped {
            if let Err(e) = self.start_container(&snapshot.id).await {
                error!("Failed to restart original {}: {}", snapshot.name, e);
                return Leftover::OldSidelined;
            }
        }

        info!("Restored original container {}", snapshot.name);
        Leftover::OldRestored
    }
}
