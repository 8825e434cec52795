//! pt-core: Core abstractions and configuration for podtunnel
//!
//! This crate provides the shared types, error taxonomy and collaborator
//! traits used by the forwarding core, the Kubernetes adapters and the CLI.

pub mod config;
pub mod credentials;
pub mod debug;
pub mod endpoint;
pub mod error;
pub mod traits;
pub mod types;

pub use credentials::ClusterCredentials;
pub use error::{ConfigError, FaultKind, PtError, ResolveError, SessionFault, TransportError};
pub use types::{LogLevel, PortMapping, SessionKey, TargetIdentity, TargetKind};
