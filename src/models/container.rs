// ABOUTME: Container summary projection exposed to presentation layers

use bollard::models::ContainerSummary as RawContainerSummary;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    pub fn parse(state: &str) -> Self {
        match state {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub ip: String,
    pub private_port: u16,
    pub public_port: u16,
    #[serde(rename = "type")]
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPair {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    #[serde(rename = "imageID")]
    pub image_id: String,
    pub command: String,
    pub created: Option<DateTime<Utc>>,
    pub state: ContainerState,
    pub status: String,
    #[serde(rename = "port")]
    pub ports: Vec<PortMapping>,
    pub size_rw: i64,
    pub size_root_fs: i64,
    pub network_mode: String,
    /// Ids of the attached networks
    #[serde(rename = "networkSettings")]
    pub networks: Vec<String>,
    pub mounts: Vec<MountPair>,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

impl From<RawContainerSummary> for ContainerSummary {
    fn from(raw: RawContainerSummary) -> Self {
        let name = raw
            .names
            .as_ref()
            .and_then(|names| names.first())
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default();

        let ports = raw
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|port| PortMapping {
                ip: port.ip.unwrap_or_default(),
                private_port: port.private_port,
                public_port: port.public_port.unwrap_or_default(),
                protocol: port.typ.map(|t| t.to_string()).unwrap_or_default(),
            })
            .collect();

        let mut networks: Vec<String> = raw
            .network_settings
            .and_then(|settings| settings.networks)
            .unwrap_or_default()
            .into_values()
            .filter_map(|endpoint| endpoint.network_id)
            .collect();
        networks.sort();

        let mounts = raw
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|mount| MountPair {
                source: mount.source.unwrap_or_default(),
                destination: mount.destination.unwrap_or_default(),
            })
            .collect();

        Self {
            id: raw.id.unwrap_or_default(),
            name,
            image: raw.image.unwrap_or_default(),
            image_id: raw.image_id.unwrap_or_default(),
            command: raw.command.unwrap_or_default(),
            created: raw
                .created
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            state: ContainerState::parse(raw.state.as_deref().unwrap_or_default()),
            status: raw.status.unwrap_or_default(),
            ports,
            size_rw: raw.size_rw.unwrap_or_default(),
            size_root_fs: raw.size_root_fs.unwrap_or_default(),
            network_mode: raw
                .host_config
                .and_then(|host_config| host_config.network_mode)
                .unwrap_or_default(),
            networks,
            mounts,
            labels: raw.labels.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{
        ContainerSummaryHostConfig, ContainerSummaryNetworkSettings, EndpointSettings, MountPoint,
        Port, PortTypeEnum,
    };
    use pretty_assertions::assert_eq;

    fn raw_summary() -> RawContainerSummary {
        RawContainerSummary {
            id: Some("abc123".to_string()),
            names: Some(vec!["/web".to_string()]),
            image: Some("app:latest".to_string()),
            image_id: Some("sha256:feed".to_string()),
            command: Some("/bin/server".to_string()),
            created: Some(1_700_000_000),
            state: Some("running".to_string()),
            status: Some("Up 2 hours".to_string()),
            ports: Some(vec![Port {
                ip: Some("0.0.0.0".to_string()),
                private_port: 80,
                public_port: Some(8080),
                typ: Some(PortTypeEnum::TCP),
            }]),
            size_rw: Some(12),
            size_root_fs: Some(4096),
            host_config: Some(ContainerSummaryHostConfig {
                network_mode: Some("bridge".to_string()),
                ..Default::default()
            }),
            network_settings: Some(ContainerSummaryNetworkSettings {
                networks: Some(HashMap::from([(
                    "bridge".to_string(),
                    EndpointSettings {
                        network_id: Some("net-1".to_string()),
                        ..Default::default()
                    },
                )])),
                ..Default::default()
            }),
            mounts: Some(vec![MountPoint {
                source: Some("/srv/data".to_string()),
                destination: Some("/data".to_string()),
                ..Default::default()
            }]),
            labels: Some(HashMap::from([("tier".to_string(), "web".to_string())])),
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_projection() {
        let summary = ContainerSummary::from(raw_summary());

        assert_eq!(summary.name, "web");
        assert_eq!(summary.state, ContainerState::Running);
        assert_eq!(
            summary.ports,
            vec![PortMapping {
                ip: "0.0.0.0".to_string(),
                private_port: 80,
                public_port: 8080,
                protocol: "tcp".to_string(),
            }]
        );
        assert_eq!(summary.networks, vec!["net-1".to_string()]);
        assert_eq!(
            summary.mounts,
            vec![MountPair {
                source: "/srv/data".to_string(),
                destination: "/data".to_string(),
            }]
        );
        assert_eq!(summary.network_mode, "bridge");
        assert_eq!(summary.created.map(|c| c.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_summary_serializes_with_presentation_field_names() {
        let value = serde_json::to_value(ContainerSummary::from(raw_summary())).unwrap();

        assert_eq!(value["imageID"], "sha256:feed");
        assert_eq!(value["sizeRootFs"], 4096);
        assert_eq!(value["networkMode"], "bridge");
        assert_eq!(value["networkSettings"][0], "net-1");
        assert_eq!(value["port"][0]["privatePort"], 80);
        assert_eq!(value["port"][0]["type"], "tcp");
        assert_eq!(value["state"], "running");
    }

    #[test]
    fn test_sparse_record_does_not_panic() {
        let summary = ContainerSummary::from(RawContainerSummary::default());
        assert_eq!(summary.name, "");
        assert_eq!(summary.state, ContainerState::Unknown);
        assert!(summary.ports.is_empty());
        assert!(summary.created.is_none());
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(ContainerState::parse("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::parse("removing"), ContainerState::Removing);
        assert_eq!(ContainerState::parse("hibernating"), ContainerState::Unknown);
    }
}
