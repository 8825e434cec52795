//! Core trait definitions

mod collaborator;
mod tunnel;

pub use collaborator::{CredentialLoader, DialOptions, DialerFactory, Lookup, TargetLookup};
pub use tunnel::{
    OutputLine, ReadyNotifier, Tunnel, TunnelContext, TunnelDialer, TunnelEvents, TunnelOutput,
};
