// ABOUTME: Mutually authenticated TLS session to a remote Docker daemon
// A session is only handed out after version negotiation and a successful ping

use super::RuntimeError;
use crate::config::{DaemonConfig, CA_CERT_FILE, CLIENT_CERT_FILE, CLIENT_KEY_FILE};
use bollard::errors::Error as BollardError;
use bollard::{Docker, API_DEFAULT_VERSION};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Certificate material checked before any TLS client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub ca_cert: PathBuf,
}

impl TlsMaterial {
    /// Locates `client.crt`, `client.key` and `ca.crt` in `cert_dir` and checks each
    /// is readable PEM of the expected kind.
    pub fn load(cert_dir: &Path) -> Result<Self, RuntimeError> {
        let material = Self {
            client_cert: cert_dir.join(CLIENT_CERT_FILE),
            client_key: cert_dir.join(CLIENT_KEY_FILE),
            ca_cert: cert_dir.join(CA_CERT_FILE),
        };

        check_pem(&material.client_cert, "CERTIFICATE")?;
        check_pem(&material.client_key, "PRIVATE KEY")?;
        check_pem(&material.ca_cert, "CERTIFICATE")?;

        Ok(material)
    }
}

fn check_pem(path: &Path, label: &str) -> Result<(), RuntimeError> {
    let content = std::fs::read_to_string(path).map_err(|e| RuntimeError::Credential {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    // Accepts "BEGIN CERTIFICATE", "BEGIN RSA PRIVATE KEY", "BEGIN EC PRIVATE KEY", ...
    let has_block = content
        .lines()
        .any(|line| line.starts_with("-----BEGIN ") && line.contains(label));

    if has_block {
        Ok(())
    } else {
        Err(RuntimeError::Credential {
            path: path.to_path_buf(),
            reason: format!("no PEM {} block found", label),
        })
    }
}

/// Opens a session to the daemon described by `config`.
///
/// The returned handle is cheap to clone and safe to share across tasks; it is never
/// returned unless the daemon answered a ping over the authenticated channel.
pub async fn connect(config: &DaemonConfig) -> Result<Docker, RuntimeError> {
    config.validate()?;

    let endpoint = config.endpoint();
    let cert_dir = config.cert_dir.clone().unwrap_or_default();
    let material = TlsMaterial::load(&cert_dir)?;

    debug!("Building TLS client for {} from {}", endpoint, cert_dir.display());

    let docker = Docker::connect_with_ssl(
        &endpoint,
        &material.client_key,
        &material.client_cert,
        &material.ca_cert,
        config.request_timeout_secs,
        API_DEFAULT_VERSION,
    )
    .map_err(|e| classify_build_error(&endpoint, e))?;

    // Negotiation is the first round trip, so a daemon that is down surfaces here
    let docker = docker.negotiate_version().await.map_err(|e| {
        error!("Version negotiation with {} failed: {}", endpoint, e);
        if is_transport_failure(&e) {
            RuntimeError::Unreachable {
                endpoint: endpoint.clone(),
                source: e,
            }
        } else {
            RuntimeError::Connection {
                endpoint: endpoint.clone(),
                source: e,
            }
        }
    })?;

    docker.ping().await.map_err(|e| {
        error!("Docker daemon at {} did not answer ping: {}", endpoint, e);
        RuntimeError::Unreachable {
            endpoint: endpoint.clone(),
            source: e,
        }
    })?;

    info!(
        "Successfully connected to Docker daemon at {} (API {})",
        endpoint,
        docker.client_version()
    );
    Ok(docker)
}

/// True when no exchange with the daemon happened at all: refused or dropped TCP
/// connections and request timeouts. TLS rejections are not transport failures.
fn is_transport_failure(err: &BollardError) -> bool {
    use std::error::Error as _;

    let io_unreachable = |e: &io::Error| {
        matches!(
            e.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::TimedOut
                | io::ErrorKind::AddrNotAvailable
        )
    };

    match err {
        BollardError::RequestTimeoutError => true,
        BollardError::IOError { err } => io_unreachable(err),
        other => {
            let mut source = other.source();
            while let Some(cause) = source {
                if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                    return io_unreachable(io_err);
                }
                source = cause.source();
            }
            false
        }
    }
}

fn classify_build_error(endpoint: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::CertPathError { path } => RuntimeError::Credential {
            path,
            reason: "cannot open or read certificate".to_string(),
        },
        BollardError::CertMultipleKeys { count, path } => RuntimeError::Credential {
            path,
            reason: format!("found {} keys, expected one", count),
        },
        BollardError::CertParseError { path } => RuntimeError::Credential {
            path,
            reason: "could not parse key".to_string(),
        },
        other => RuntimeError::Connection {
            endpoint: endpoint.to_string(),
            source: other,
        },
    }
}
