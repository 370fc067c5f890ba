// ABOUTME: Daemon connection and runtime settings layered from defaults, TOML file and environment

use crate::docker::{RecreateStrategy, RuntimeError, ServiceSettings};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const CLIENT_CERT_FILE: &str = "client.crt";
pub const CLIENT_KEY_FILE: &str = "client.key";
pub const CA_CERT_FILE: &str = "ca.crt";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATS_INTERFACE: &str = "eth0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory holding `client.crt`, `client.key` and `ca.crt`
    pub cert_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<String>,
    /// Timeout applied to every HTTP exchange with the daemon
    pub request_timeout_secs: u64,
    /// Grace period before the daemon kills a stopping container
    pub stop_grace_secs: u64,
    /// Interface whose counters are reported by stats
    pub stats_interface: String,
    /// Ask the daemon for disk usage when listing (slower)
    pub list_sizes: bool,
    pub recreate_strategy: RecreateStrategy,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            cert_dir: None,
            host: None,
            port: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            stop_grace_secs: DEFAULT_TIMEOUT_SECS,
            stats_interface: DEFAULT_STATS_INTERFACE.to_string(),
            list_sizes: true,
            recreate_strategy: RecreateStrategy::default(),
        }
    }
}

impl DaemonConfig {
    /// Loads defaults, then the TOML file (explicit path or the user config dir), then
    /// the `CERT_PATH`, `DOCKER_HOST` and `DOCKER_PORT` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, RuntimeError> {
        let file = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match file {
            Some(file) if file.exists() => {
                info!("Loading configuration from {}", file.display());
                Self::from_file(&file)?
            }
            Some(file) if path.is_some() => {
                return Err(RuntimeError::Config(format!(
                    "config file {} does not exist",
                    file.display()
                )));
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, RuntimeError> {
        toml::from_str(content).map_err(|e| RuntimeError::Config(format!("invalid TOML: {}", e)))
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dock-warden").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overrides fields from environment variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cert_dir) = lookup("CERT_PATH").filter(|v| !v.is_empty()) {
            debug!("CERT_PATH overrides certificate directory");
            self.cert_dir = Some(PathBuf::from(cert_dir));
        }

        if let Some(docker_host) = lookup("DOCKER_HOST").filter(|v| !v.is_empty()) {
            let stripped = docker_host
                .strip_prefix("tcp://")
                .or_else(|| docker_host.strip_prefix("https://"))
                .unwrap_or(&docker_host)
                .trim_end_matches('/');

            // tcp://host:port carries its own port
            match stripped.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    self.host = Some(host.to_string());
                    self.port = Some(port.to_string());
                }
                _ => self.host = Some(stripped.to_string()),
            }
        }

        if let Some(port) = lookup("DOCKER_PORT").filter(|v| !v.is_empty()) {
            self.port = Some(port);
        }
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.cert_dir.is_none() {
            return Err(RuntimeError::Config(
                "certificate directory is not set (CERT_PATH)".to_string(),
            ));
        }

        match self.host.as_deref() {
            None | Some("") => {
                return Err(RuntimeError::Config(
                    "daemon host is not set (DOCKER_HOST)".to_string(),
                ));
            }
            Some(_) => {}
        }

        match self.port.as_deref().map(str::parse::<u16>) {
            Some(Ok(_)) => {}
            Some(Err(_)) => {
                return Err(RuntimeError::Config(format!(
                    "daemon port {:?} is not a valid port number",
                    self.port.as_deref().unwrap_or_default()
                )));
            }
            None => {
                return Err(RuntimeError::Config(
                    "daemon port is not set (DOCKER_PORT)".to_string(),
                ));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(RuntimeError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.stop_grace_secs == 0 {
            return Err(RuntimeError::Config(
                "stop_grace_secs must be greater than zero".to_string(),
            ));
        }

        if self.stats_interface.is_empty() {
            return Err(RuntimeError::Config(
                "stats_interface must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// `tcp://host:port` endpoint of the daemon.
    pub fn endpoint(&self) -> String {
        format!(
            "tcp://{}:{}",
            self.host.as_deref().unwrap_or_default(),
            self.port.as_deref().unwrap_or_default()
        )
    }

    pub fn cert_path(&self, file_name: &str) -> PathBuf {
        self.cert_dir.clone().unwrap_or_default().join(file_name)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            stop_grace: Duration::from_secs(self.stop_grace_secs),
            stats_interface: self.stats_interface.clone(),
            list_sizes: self.list_sizes,
            recreate_strategy: self.recreate_strategy,
        }
    }
}
