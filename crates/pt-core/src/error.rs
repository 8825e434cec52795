//! Core error types for podtunnel

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SessionKey;

/// Top-level error type returned by `Forwarder::forward`
#[derive(Error, Debug)]
pub enum PtError {
    /// Credentials or config could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Target could not be resolved
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Dialer or tunnel could not be constructed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Kubeconfig could not be read or is malformed
    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Target resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Neither a service nor a pod exists under the name
    #[error("no service or pod with name {name} found")]
    NotFound { namespace: String, name: String },

    /// The API answered with a failure other than "not found"
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer (network, TLS, ...)
    #[error("Request failed: {0}")]
    Request(String),
}

/// Dialer and tunnel errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// The port pair is not usable
    #[error("Invalid ports: {0}")]
    InvalidPorts(String),

    /// The cluster server URL cannot host a tunnel
    #[error("Invalid server URL: {0}")]
    InvalidServer(String),

    /// TLS material could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection upgrade failed
    #[error("Dial failed: {0}")]
    Dial(String),

    /// I/O error on the local listener or a stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side violated the stream protocol
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// A failure observed after `forward` already returned success
#[derive(Error, Debug)]
#[error("session {key} failed: {kind}")]
pub struct SessionFault {
    pub key: SessionKey,
    pub kind: FaultKind,
}

/// What went wrong inside a running session
#[derive(Error, Debug)]
pub enum FaultKind {
    /// The tunnel wrote to its error output before becoming ready
    #[error("tunnel reported: {0}")]
    ErrorOutput(String),

    /// The forward loop ended with an error
    #[error("forwarding stopped: {0}")]
    ForwardFailed(#[from] TransportError),
}
