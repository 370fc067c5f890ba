// ABOUTME: Docker daemon integration: TLS session, inspection, lifecycle and recreate workflow

pub mod api;
pub mod error;
pub mod inspection;
pub mod lifecycle;
pub mod recreate;
pub mod service;
pub mod session;

pub use api::DockerApi;
pub use error::{ErrorKind, Leftover, Operation, RecreatePhase, RuntimeError};
pub use recreate::{ContainerSnapshot, InFlightRecreates, RecreateGuard, RecreateStrategy};
pub use service::{ContainerService, ServiceSettings};
pub use session::{connect, TlsMaterial};
