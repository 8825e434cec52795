//! podtunnel CLI
//!
//! Provides the `podtunnel` binary: open tunnels from the command line or
//! from the `[[forward]]` entries of the config file.

pub mod commands;
pub mod output;
