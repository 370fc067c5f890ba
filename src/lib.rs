// ABOUTME: Library crate for Dock Warden exposing the daemon session and container services

pub mod config;
pub mod docker;
pub mod models;

pub use config::DaemonConfig;
pub use docker::{connect, ContainerService, RuntimeError};
