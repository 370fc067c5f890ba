// ABOUTME: Narrow async seam over the Docker Engine API used by the container services
// Implemented for the Bollard client; tests substitute in-memory daemons

use crate::models::{CpuCounters, InterfaceCounters, StatsSnapshot};
use async_trait::async_trait;
use bollard::container::{
    Config, CPUStats, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RenameContainerOptions, StartContainerOptions, Stats, StatsOptions,
    StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, ContainerSummary};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Daemon calls the services depend on. Errors are raw Bollard errors; the services
/// classify them with the operation and container id attached.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DockerApi: Send + Sync {
    async fn ping(&self) -> Result<(), BollardError>;

    /// Every container, running or not.
    async fn list_containers(&self, include_sizes: bool)
        -> Result<Vec<ContainerSummary>, BollardError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, BollardError>;

    /// One non-streaming stats sample; `None` when the daemon sent no body.
    async fn stats_snapshot(&self, id: &str) -> Result<Option<StatsSnapshot>, BollardError>;

    async fn start_container(&self, id: &str) -> Result<(), BollardError>;

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), BollardError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), BollardError>;

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), BollardError>;

    /// Pulls `repository:tag`, draining the progress stream.
    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), BollardError>;

    /// Creates a container named `name` and returns its id.
    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<String, BollardError>;
}

#[async_trait]
impl DockerApi for Docker {
    async fn ping(&self) -> Result<(), BollardError> {
        Docker::ping(self).await.map(|_| ())
    }

    async fn list_containers(
        &self,
        include_sizes: bool,
    ) -> Result<Vec<ContainerSummary>, BollardError> {
        Docker::list_containers(
            self,
            Some(ListContainersOptions::<String> {
                all: true,
                size: include_sizes,
                ..Default::default()
            }),
        )
        .await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, BollardError> {
        Docker::inspect_container(self, id, None::<InspectContainerOptions>).await
    }

    async fn stats_snapshot(&self, id: &str) -> Result<Option<StatsSnapshot>, BollardError> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };

        let mut stream = self.stats(id, Some(options));
        match stream.next().await {
            Some(Ok(stats)) => Ok(Some(snapshot_from_stats(stats))),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn start_container(&self, id: &str) -> Result<(), BollardError> {
        Docker::start_container(self, id, None::<StartContainerOptions<String>>).await
    }

    async fn stop_container(&self, id: &str, grace_secs: i64) -> Result<(), BollardError> {
        Docker::stop_container(self, id, Some(StopContainerOptions { t: grace_secs })).await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), BollardError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        Docker::remove_container(self, id, Some(options)).await
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), BollardError> {
        Docker::rename_container(self, id, RenameContainerOptions { name: new_name }).await
    }

    async fn pull_image(&self, repository: &str, tag: &str) -> Result<(), BollardError> {
        let options = CreateImageOptions {
            from_image: repository,
            tag,
            ..Default::default()
        };

        let mut stream = self.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(error) = progress.error {
                return Err(BollardError::DockerStreamError { error });
            }
            if let Some(status) = progress.status {
                debug!("Pull {}:{}: {}", repository, tag, status);
            }
        }

        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<String, BollardError> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        Docker::create_container(self, Some(options), config)
            .await
            .map(|response| response.id)
    }
}

fn cpu_counters(stats: &CPUStats) -> CpuCounters {
    CpuCounters {
        total_usage: stats.cpu_usage.total_usage,
        system_usage: stats.system_cpu_usage,
        online_cpus: stats.online_cpus,
        per_cpu_count: stats.cpu_usage.percpu_usage.as_ref().map_or(0, Vec::len),
    }
}

fn snapshot_from_stats(stats: Stats) -> StatsSnapshot {
    StatsSnapshot {
        cpu: cpu_counters(&stats.cpu_stats),
        precpu: cpu_counters(&stats.precpu_stats),
        memory_usage: stats.memory_stats.usage,
        memory_limit: stats.memory_stats.limit,
        networks: stats
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(interface, counters)| {
                (
                    interface,
                    InterfaceCounters {
                        rx_bytes: counters.rx_bytes,
                        tx_bytes: counters.tx_bytes,
                    },
                )
            })
            .collect(),
    }
}
