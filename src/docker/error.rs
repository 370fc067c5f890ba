// ABOUTME: Error taxonomy for daemon sessions and container operations
// Classifies raw Bollard failures into the kinds callers branch on

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Daemon call a failure originated from, used for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ping,
    List,
    Inspect,
    Stats,
    Start,
    Stop,
    Remove,
    Rename,
    Pull,
    Create,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Ping => "ping",
            Operation::List => "list containers",
            Operation::Inspect => "inspect container",
            Operation::Stats => "get stats",
            Operation::Start => "start container",
            Operation::Stop => "stop container",
            Operation::Remove => "remove container",
            Operation::Rename => "rename container",
            Operation::Pull => "pull image",
            Operation::Create => "create container",
            Operation::Update => "update container",
        };
        f.write_str(name)
    }
}

/// Ordered phases of the recreate workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreatePhase {
    Inspect,
    Pull,
    Create,
    StartNew,
    RemoveOld,
}

impl fmt::Display for RecreatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecreatePhase::Inspect => "inspect",
            RecreatePhase::Pull => "pull",
            RecreatePhase::Create => "create",
            RecreatePhase::StartNew => "start new",
            RecreatePhase::RemoveOld => "remove old",
        };
        f.write_str(name)
    }
}

/// Which container instances exist after a failed recreate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leftover {
    /// Nothing was changed; the original container is as it was.
    Untouched,
    /// The original was sidelined for the create, then put back under its name.
    OldRestored,
    /// The original is still present but renamed and possibly stopped.
    OldSidelined,
    /// Both the original and the replacement exist; neither is running.
    BothPresent,
    /// Both exist and the original is running again, under its sidelined name if
    /// it was renamed.
    BothPresentOldRunning,
    /// The replacement is running; removing the original failed.
    NewOnlyOldLingering,
}

impl fmt::Display for Leftover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Leftover::Untouched => "original container untouched",
            Leftover::OldRestored => "original container restored",
            Leftover::OldSidelined => "original container renamed and left in place",
            Leftover::BothPresent => "original and replacement containers both present",
            Leftover::BothPresentOldRunning => {
                "original and replacement containers both present, original running"
            }
            Leftover::NewOnlyOldLingering => "replacement running, original not removed",
        };
        f.write_str(text)
    }
}

/// Coarse classification callers map onto their own responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Credential,
    Connection,
    Unreachable,
    NotFound,
    Conflict,
    Decode,
    Runtime,
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid TLS material at {path}: {reason}")]
    Credential { path: PathBuf, reason: String },

    #[error("Failed to connect to Docker daemon at {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Docker daemon at {endpoint} did not answer ping: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("Failed to {operation} {id}: not found ({message})")]
    NotFound {
        operation: Operation,
        id: String,
        message: String,
    },

    #[error("Failed to {operation} {id}: conflict ({message})")]
    Conflict {
        operation: Operation,
        id: String,
        message: String,
    },

    #[error("Failed to {operation} {id}: malformed response ({message})")]
    Decode {
        operation: Operation,
        id: String,
        message: String,
    },

    #[error("Container {id} has no stats for network interface {interface}")]
    MissingInterface { id: String, interface: String },

    #[error("Update of container {id} failed during {phase} phase ({leftover}): {source}")]
    Recreate {
        id: String,
        phase: RecreatePhase,
        leftover: Leftover,
        #[source]
        source: Box<RuntimeError>,
    },

    #[error("Update of container {id} cancelled before {phase} phase")]
    Cancelled { id: String, phase: RecreatePhase },

    #[error("Update of container {id} aborted: {reason}")]
    Aborted { id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to {operation} {id}: {source}")]
    Daemon {
        operation: Operation,
        id: String,
        #[source]
        source: bollard::errors::Error,
    },
}

impl RuntimeError {
    /// Classifies a raw Bollard failure for `operation` on `id`.
    pub fn from_daemon(operation: Operation, id: &str, err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as BollardError;

        let id = id.to_string();
        match err {
            BollardError::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound {
                operation,
                id,
                message,
            },
            BollardError::DockerResponseServerError {
                status_code: 409,
                message,
            } => RuntimeError::Conflict {
                operation,
                id,
                message,
            },
            BollardError::JsonDataError { message, .. } => RuntimeError::Decode {
                operation,
                id,
                message,
            },
            BollardError::JsonSerdeError { err } => RuntimeError::Decode {
                operation,
                id,
                message: err.to_string(),
            },
            other => RuntimeError::Daemon {
                operation,
                id,
                source: other,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Credential { .. } => ErrorKind::Credential,
            RuntimeError::Connection { .. } => ErrorKind::Connection,
            RuntimeError::Unreachable { .. } => ErrorKind::Unreachable,
            RuntimeError::NotFound { .. } => ErrorKind::NotFound,
            RuntimeError::Conflict { .. } => ErrorKind::Conflict,
            RuntimeError::Decode { .. } => ErrorKind::Decode,
            RuntimeError::Recreate { source, .. } => source.kind(),
            RuntimeError::MissingInterface { .. }
            | RuntimeError::Cancelled { .. }
            | RuntimeError::Aborted { .. }
            | RuntimeError::Config(_)
            | RuntimeError::Daemon { .. } => ErrorKind::Runtime,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Phase a recreate failure stopped in, if this is one.
    pub fn phase(&self) -> Option<RecreatePhase> {
        match self {
            RuntimeError::Recreate { phase, .. } | RuntimeError::Cancelled { phase, .. } => {
                Some(*phase)
            }
            _ => None,
        }
    }

    pub fn leftover(&self) -> Option<Leftover> {
        match self {
            RuntimeError::Recreate { leftover, .. } => Some(*leftover),
            RuntimeError::Cancelled { .. } => Some(Leftover::Untouched),
            _ => None,
        }
    }
}
