// ABOUTME: State-changing container operations: start, graceful stop and forced removal

use super::{ContainerService, DockerApi, Operation, RuntimeError};
use tracing::info;

impl<R: DockerApi> ContainerService<R> {
    /// Starts `id`. Bollard reports "already started" (HTTP 304) as success.
    pub async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        info!("Starting container {}", id);

        self.runtime
            .start_container(id)
            .await
            .map_err(|e| RuntimeError::from_daemon(Operation::Start, id, e))?;

        info!("Successfully started container {}", id);
        Ok(())
    }

    /// Asks the container to exit, letting the daemon kill it once the grace period ends.
    /// An already stopped container is a success.
    pub async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let grace = self.stop_grace_secs();
        info!("Stopping container {} ({}s grace period)", id, grace);

        self.runtime
            .stop_container(id, grace)
            .await
            .map_err(|e| RuntimeError::from_daemon(Operation::Stop, id, e))?;

        info!("Successfully stopped container {}", id);
        Ok(())
    }

    /// Removes the container even if it is running. Anonymous volumes are kept.
    pub async fn delete_container(&self, id: &str) -> Result<(), RuntimeError> {
        info!("Removing container {}", id);

        self.runtime
            .remove_container(id, true)
            .await
            .map_err(|e| RuntimeError::from_daemon(Operation::Remove, id, e))?;

        info!("Successfully removed container {}", id);
        Ok(())
    }
}
