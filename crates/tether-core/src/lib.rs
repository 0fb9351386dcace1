//! tether-core: Core abstractions and configuration for tether
//!
//! This crate provides the shared types, configuration structures, TLS
//! material loading, and snapshot persistence used by the controller,
//! agent, and CLI components.

pub mod config;
pub mod error;
pub mod persist;
pub mod sysinfo;
pub mod tls;
pub mod types;

pub use error::CoreError;
pub use persist::SnapshotStore;
pub use sysinfo::SystemInfo;
pub use types::{EndpointId, EndpointKind};
