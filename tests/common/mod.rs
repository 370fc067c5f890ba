// ABOUTME: In-memory Docker daemon used by the integration tests
// Models name uniqueness, host port conflicts and image re-pulls resolving to new content

#![allow(dead_code)]

use async_trait::async_trait;
use bollard::container::Config;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerState as InspectState,
    ContainerSummary, EndpointSettings, HostConfig, MountPoint, NetworkSettings, PortBinding,
};
use dock_warden::docker::DockerApi;
use dock_warden::models::{CpuCounters, InterfaceCounters, StatsSnapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub config: Config<String>,
    pub image_id: String,
    pub running: bool,
}

impl FakeContainer {
    pub fn env(&self) -> Vec<String> {
        self.config.env.clone().unwrap_or_default()
    }

    pub fn binds(&self) -> Vec<String> {
        self.config
            .host_config
            .as_ref()
            .and_then(|h| h.binds.clone())
            .unwrap_or_default()
    }

    pub fn host_ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self
            .config
            .host_config
            .as_ref()
            .and_then(|h| h.port_bindings.clone())
            .unwrap_or_default()
            .into_values()
            .flatten()
            .flatten()
            .filter_map(|binding| binding.host_port)
            .collect();
        ports.sort();
        ports
    }

    pub fn networks(&self) -> Vec<String> {
        let mut networks: Vec<String> = self
            .config
            .networking_config
            .as_ref()
            .map(|n| n.endpoints_config.keys().cloned().collect())
            .unwrap_or_default();
        networks.sort();
        networks
    }
}

#[derive(Debug, Default)]
struct DaemonState {
    containers: Vec<FakeContainer>,
    /// `repository:tag` -> image id currently in the registry
    registry: HashMap<String, String>,
    /// `repository:tag` -> image id held locally
    local_images: HashMap<String, String>,
    /// Image ids whose containers fail to start
    broken_images: HashSet<String>,
    pulls: Vec<String>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct FakeDaemon {
    state: Mutex<DaemonState>,
    pull_delay: Option<Duration>,
}

fn server_error(status_code: u16, message: impl Into<String>) -> BollardError {
    BollardError::DockerResponseServerError {
        status_code,
        message: message.into(),
    }
}

fn image_key(image: &str) -> String {
    if image.rsplit('/').next().is_some_and(|last| last.contains(':')) {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

/// Config of a web container publishing 80/tcp on host port 8080.
pub fn web_config(image: &str) -> Config<String> {
    Config {
        image: Some(image.to_string()),
        env: Some(vec!["MODE=prod".to_string(), "PORT=80".to_string()]),
        cmd: Some(vec!["/bin/server".to_string()]),
        exposed_ports: Some(HashMap::from([("80/tcp".to_string(), HashMap::new())])),
        host_config: Some(HostConfig {
            binds: Some(vec!["/srv/web:/data".to_string()]),
            port_bindings: Some(HashMap::from([(
                "80/tcp".to_string(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some("8080".to_string()),
                }]),
            )])),
            ..Default::default()
        }),
        networking_config: Some(bollard::container::NetworkingConfig {
            endpoints_config: HashMap::from([(
                "backend".to_string(),
                EndpointSettings {
                    network_id: Some("net-backend".to_string()),
                    ..Default::default()
                },
            )]),
        }),
        ..Default::default()
    }
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every pull, keeping an update in flight long enough to race it.
    pub fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = Some(delay);
        self
    }

    /// Publishes `image` to the registry with image id `image_id`.
    pub fn publish(&self, image: &str, image_id: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .registry
            .insert(image_key(image), image_id.to_string());
    }

    /// Makes every container created from `image_id` fail to start.
    pub fn break_image(&self, image_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.broken_images.insert(image_id.to_string());
    }

    pub fn add_container(&self, id: &str, name: &str, config: Config<String>, running: bool) {
        let mut state = self.state.lock().unwrap();
        let image = config.image.clone().unwrap_or_default();
        let image_id = state
            .local_images
            .get(&image_key(&image))
            .cloned()
            .unwrap_or_else(|| "sha256:original".to_string());

        state.containers.push(FakeContainer {
            id: id.to_string(),
            name: name.to_string(),
            config,
            image_id,
            running,
        });
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().unwrap().containers.clone()
    }

    pub fn container_named(&self, name: &str) -> Option<FakeContainer> {
        self.containers().into_iter().find(|c| c.name == name)
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }
}

impl DaemonState {
    fn find(&self, key: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.id == key || c.name == key.trim_start_matches('/'))
            .or_else(|| {
                let matches: Vec<usize> = self
                    .containers
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.id.starts_with(key))
                    .map(|(i, _)| i)
                    .collect();
                (matches.len() == 1).then(|| matches[0])
            })
    }

    fn lookup(&self, key: &str) -> Result<usize, BollardError> {
        self.find(key)
            .ok_or_else(|| server_error(404, format!("No such container: {}", key)))
    }
}

#[async_trait]
impl DockerApi for FakeDaemon {
    async fn ping(&self) -> Result<(), BollardError> {
        Ok(())
    }

    async fn list_containers(
        &self,
        _include_sizes: bool,
    ) -> Result<Vec<ContainerSummary>, BollardError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .map(|c| ContainerSummary {
                id: Some(c.id.clone()),
                names: Some(vec![format!("/{}", c.name)]),
                image: c.config.image.clone(),
                image_id: Some(c.image_id.clone()),
                state: Some(if c.running { "running" } else { "exited" }.to_string()),
                mounts: Some(
                    c.binds()
                        .iter()
                        .filter_map(|bind| bind.split_once(':'))
                        .map(|(source, destination)| MountPoint {
                            source: Some(source.to_string()),
                            destination: Some(destination.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, BollardError> {
        let state = self.state.lock().unwrap();
        let container = &state.containers[state.lookup(id)?];
        let config = &container.config;

        Ok(ContainerInspectResponse {
            id: Some(container.id.clone()),
            name: Some(format!("/{}", container.name)),
            image: Some(container.image_id.clone()),
            config: Some(ContainerConfig {
                hostname: Some(container.id.chars().take(12).collect()),
                image: config.image.clone(),
                env: config.env.clone(),
                cmd: config.cmd.clone(),
                exposed_ports: config.exposed_ports.clone(),
                labels: config.labels.clone(),
                ..Default::default()
            }),
            host_config: config.host_config.clone(),
            network_settings: Some(NetworkSettings {
                networks: config.networking_config.as_ref().map(|n| {
                    n.endpoints_config
                        .iter()
                        .map(|(network, endpoint)| {
                            let mut endpoint = endpoint.clone();
                            endpoint.endpoint_id = Some(format!("ep-{}", container.id));
                            endpoint.ip_address = Some("172.18.0.9".to_string());
                            (network.clone(), endpoint)
                        })
                        .collect()
                }),
                ..Default::default()
            }),
            state: Some(InspectState {
                running: Some(container.running),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn stats_snapshot(&self, id: &str) -> Result<Option<StatsSnapshot>, BollardError> {
        let state = self.state.lock().unwrap();
        let container = &state.containers[state.lookup(id)?];

        if !container.running {
            return Ok(Some(StatsSnapshot::default()));
        }

        Ok(Some(StatsSnapshot {
            cpu: CpuCounters {
                total_usage: 3_000,
                system_usage: Some(20_000),
                online_cpus: Some(2),
                per_cpu_count: 2,
            },
            precpu: CpuCounters {
                total_usage: 2_000,
                system_usage: Some(10_000),
                online_cpus: Some(2),
                per_cpu_count: 2,
            },
            memory_usage: Some(64 * 1_048_576),
            memory_limit: Some(1024 * 1_048_576),
            networks: HashMap::from([(
                "eth0".to_string(),
                InterfaceCounters {
                    rx_bytes: 3 * 1_048_576,
                    tx_bytes: 1_048_576,
                },
            )]),
        }))
    }

    async fn start_container(&self, id: &str) -> Result<(), BollardError> {
        let mut state = self.state.lock().unwrap();
        let index = state.lookup(id)?;

        // Bollard turns the daemon's 304 into success
        if state.containers[index].running {
            return Ok(());
        }

        let image_id = state.containers[index].image_id.clone();
        if state.broken_images.contains(&image_id) {
            return Err(server_error(
                500,
                "OCI runtime create failed: exec format error",
            ));
        }

        let wanted = state.containers[index].host_ports();
        let clash = state
            .containers
            .iter()
            .filter(|c| c.running)
            .flat_map(FakeContainer::host_ports)
            .find(|port| wanted.contains(port));
        if let Some(port) = clash {
            return Err(server_error(
                500,
                format!("Bind for 0.0.0.0:{} failed: port is already allocated", port),
            ));
        }

        state.containers[index].running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace_secs: i64) -> Result<(), BollardError> {
        let mut state = self.state.lock().unwrap();
        let index = state.lookup(id)?;

        if !state.containers[index].running {
            return Ok(());
        }
        state.containers[index].running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), BollardError> {
        let mut state = self.state.lock().unwrap();
        let index = state.lookup(id)?;

        if state.containers[index].running && !force {
            return Err(server_error(409, "You cannot remove a running container"));
        }
        state.containers.remove(index);
        Ok(())
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), BollardError> {
        let mut state = self.state.lock().unwrap();
        let index = state.lookup(id)?;

        if state
            .containers
            .iter()
            .enumerate()
            .any(|(i, c)| i != index && c.name == new_name)
        {
            return Err(server_error(409, format!("name {} is already in use", new_name)));
        }
        state.containers[index].name = new_name.to_string();
        Ok(())
    }

    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), BollardError> {
        if let Some(delay) = self.pull_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        let key = format!("{}:{}", repository, tag);
        state.pulls.push(key.clone());

        let image_id = state
            .registry
            .get(&key)
            .cloned()
            .ok_or_else(|| server_error(404, format!("manifest for {} not found", key)))?;
        state.local_images.insert(key, image_id);
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<String, BollardError> {
        let mut state = self.state.lock().unwrap();

        if state.containers.iter().any(|c| c.name == name) {
            return Err(server_error(
                409,
                format!("Conflict. The container name \"/{}\" is already in use", name),
            ));
        }

        let image = config.image.clone().unwrap_or_default();
        let image_id = state
            .local_images
            .get(&image_key(&image))
            .cloned()
            .ok_or_else(|| server_error(404, format!("No such image: {}", image)))?;

        state.next_id += 1;
        let id = format!("f00d{:012x}{:048x}", state.next_id, 0);
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            config,
            image_id,
            running: false,
        });
        Ok(id)
    }
}
