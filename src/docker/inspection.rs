// ABOUTME: Read-only container queries: listings, stats snapshots and periodic stats watches

use super::{ContainerService, DockerApi, Operation, RuntimeError};
use crate::models::{ContainerStats, ContainerSummary};
use futures_util::stream::{self, Stream};
use std::time::Duration;
use tokio::time::Interval;
use tracing::debug;

const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(100);

impl<R: DockerApi> ContainerService<R> {
    /// Lists every container the daemon knows, including stopped ones, in daemon order.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let containers = self
            .runtime
            .list_containers(self.settings.list_sizes)
            .await
            .map_err(|e| RuntimeError::from_daemon(Operation::List, "*", e))?;

        debug!("Daemon reported {} containers", containers.len());
        Ok(containers.into_iter().map(ContainerSummary::from).collect())
    }

    /// Takes one stats sample of `id` and derives CPU, memory and network figures.
    pub async fn get_stats(&self, id: &str) -> Result<ContainerStats, RuntimeError> {
        let snapshot = self
            .runtime
            .stats_snapshot(id)
            .await
            .map_err(|e| RuntimeError::from_daemon(Operation::Stats, id, e))?
            .ok_or_else(|| RuntimeError::Decode {
                operation: Operation::Stats,
                id: id.to_string(),
                message: "daemon returned no stats sample".to_string(),
            })?;

        ContainerStats::from_snapshot(id, &snapshot, &self.settings.stats_interface)
    }

    /// Samples `id` every `every` until the stream is dropped or the container is gone.
    ///
    /// Errors other than not-found are yielded and the watch continues.
    pub fn watch_stats(
        &self,
        id: &str,
        every: Duration,
    ) -> impl Stream<Item = Result<ContainerStats, RuntimeError>> + Send
    where
        R: 'static,
    {
        let period = every.max(MIN_WATCH_INTERVAL);
        let state = (self.clone(), id.to_string(), None::<Interval>, false);

        // The ticker is created on first poll so building the stream needs no runtime
        stream::unfold(state, move |(service, id, ticker, finished)| async move {
            if finished {
                return None;
            }

            let mut ticker = ticker.unwrap_or_else(|| tokio::time::interval(period));
            ticker.tick().await;
            let sample = service.get_stats(&id).await;
            let finished = matches!(&sample, Err(e) if e.is_not_found());
            Some((sample, (service, id, Some(ticker), finished)))
        })
    }
}
