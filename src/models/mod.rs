// ABOUTME: Data models for container listings, resource statistics and image references

pub mod container;
pub mod image;
pub mod stats;

pub use container::{ContainerState, ContainerSummary, MountPair, PortMapping};
pub use image::ImageReference;
pub use stats::{ContainerStats, CpuCounters, InterfaceCounters, StatsSnapshot, StatsView};
