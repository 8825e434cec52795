//! Tunnel traits
//!
//! A [`TunnelDialer`] is bound to one target. Preparing a tunnel is
//! synchronous and must not start any I/O; running it blocks until the
//! stop token fires.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::types::PortMapping;

/// Opens tunnels to the target the dialer was built for
pub trait TunnelDialer: Send + Sync {
    /// Validate the port pair and build a tunnel ready to run
    fn prepare(&self, ports: PortMapping) -> Result<Box<dyn Tunnel>, TransportError>;
}

/// A prepared tunnel
#[async_trait]
pub trait Tunnel: Send {
    /// Copy bytes between the local listener and the remote target until
    /// `ctx.stop` is cancelled. Returning `Ok(())` means a normal stop.
    async fn run(self: Box<Self>, ctx: TunnelContext) -> Result<(), TransportError>;
}

/// One line written by a tunnel to its output streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Info(String),
    Error(String),
}

/// One-shot notification that the tunnel accepts local connections
#[derive(Debug)]
pub struct ReadyNotifier(oneshot::Sender<SocketAddr>);

impl ReadyNotifier {
    /// Report the bound local address. Consumes the notifier.
    pub fn notify(self, addr: SocketAddr) {
        // The session may have been torn down already
        let _ = self.0.send(addr);
    }
}

/// Informational and error output of a tunnel
#[derive(Debug, Clone)]
pub struct TunnelOutput(mpsc::UnboundedSender<OutputLine>);

impl TunnelOutput {
    pub fn info(&self, msg: impl Into<String>) {
        let _ = self.0.send(OutputLine::Info(msg.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        let _ = self.0.send(OutputLine::Error(msg.into()));
    }
}

/// Everything a running tunnel gets from its session
#[derive(Debug)]
pub struct TunnelContext {
    /// Cancelled when the session must stop
    pub stop: CancellationToken,
    /// Fired once the listener is bound
    pub ready: ReadyNotifier,
    /// Output streams
    pub output: TunnelOutput,
}

/// Receiving side of a [`TunnelContext`], held by the session monitor
#[derive(Debug)]
pub struct TunnelEvents {
    pub ready: oneshot::Receiver<SocketAddr>,
    pub output: mpsc::UnboundedReceiver<OutputLine>,
}

impl TunnelContext {
    /// Create a context for a tunnel stopped by `stop`
    pub fn new(stop: CancellationToken) -> (Self, TunnelEvents) {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        (
            Self {
                stop,
                ready: ReadyNotifier(ready_tx),
                output: TunnelOutput(output_tx),
            },
            TunnelEvents {
                ready: ready_rx,
                output: output_rx,
            },
        )
    }
}
