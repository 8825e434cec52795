//! Port-forward tunnels over WebSocket
//!
//! [`WsDialerFactory`] binds a dialer to one target. The tunnel it prepares
//! listens on `127.0.0.1` and opens one WebSocket to the API server's
//! `portforward` subresource per accepted connection.

pub mod channel;
mod connection;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;

use pt_core::endpoint::TunnelEndpoint;
use pt_core::traits::{DialOptions, DialerFactory, Tunnel, TunnelContext, TunnelDialer};
use pt_core::{ClusterCredentials, PortMapping, TargetIdentity, TransportError};

use crate::tls::client_config;

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// [`DialerFactory`] producing WebSocket port-forward dialers
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialerFactory;

impl DialerFactory for WsDialerFactory {
    fn dialer(
        &self,
        credentials: &ClusterCredentials,
        target: &TargetIdentity,
        options: DialOptions,
    ) -> Result<Box<dyn TunnelDialer>, TransportError> {
        let endpoint = TunnelEndpoint::for_target(&credentials.server, target)?;
        let tls = Arc::new(client_config(credentials)?);
        tracing::debug!("Dialer for {} at {}", target, endpoint.url("wss"));

        Ok(Box::new(WsDialer {
            remote: Arc::new(Remote {
                endpoint,
                token: credentials.token.clone(),
                tls,
                report_errors: options.report_errors,
            }),
        }))
    }
}

/// Everything a connection needs to reach the port-forward endpoint
pub(crate) struct Remote {
    endpoint: TunnelEndpoint,
    token: Option<String>,
    tls: Arc<rustls::ClientConfig>,
    report_errors: bool,
}

impl Remote {
    /// Upgrade request forwarding `port`
    pub(crate) fn request(&self, port: u16) -> Result<Request, TransportError> {
        let url = format!("{}?ports={}", self.endpoint.url("wss"), port);
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Dial(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(channel::PROTOCOL),
        );
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| TransportError::Dial(format!("invalid bearer token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(request)
    }

    pub(crate) fn tls(&self) -> Arc<rustls::ClientConfig> {
        Arc::clone(&self.tls)
    }

    /// Error hook for failures on individual connections
    fn report(&self, msg: &str) {
        if self.report_errors {
            tracing::error!("{}", msg);
        } else {
            tracing::debug!("{}", msg);
        }
    }
}

struct WsDialer {
    remote: Arc<Remote>,
}

impl TunnelDialer for WsDialer {
    fn prepare(&self, ports: PortMapping) -> Result<Box<dyn Tunnel>, TransportError> {
        Ok(Box::new(WsTunnel {
            remote: Arc::clone(&self.remote),
            ports,
        }))
    }
}

struct WsTunnel {
    remote: Arc<Remote>,
    ports: PortMapping,
}

#[async_trait]
impl Tunnel for WsTunnel {
    async fn run(self: Box<Self>, ctx: TunnelContext) -> Result<(), TransportError> {
        let Self { remote, ports } = *self;

        let listener = match TcpListener::bind(("127.0.0.1", ports.local)).await {
            Ok(listener) => listener,
            Err(e) => {
                ctx.output
                    .error(format!("Unable to listen on port {}: {}", ports.local, e));
                return Err(e.into());
            }
        };
        let addr = listener.local_addr()?;
        ctx.output
            .info(format!("Forwarding from {} -> {}", addr, ports.remote));
        ctx.ready.notify(addr);

        loop {
            tokio::select! {
                _ = ctx.stop.cancelled() => {
                    tracing::debug!("Listener on {} stopped", addr);
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::warn!("Failed to set TCP_NODELAY: {}", e);
                        }
                        tracing::debug!("Handling connection from {} for port {}", peer, ports.remote);

                        let remote = Arc::clone(&remote);
                        let stop = ctx.stop.clone();
                        let remote_port = ports.remote;
                        tokio::spawn(async move {
                            if let Err(e) = connection::bridge(&remote, stream, remote_port, stop).await {
                                remote.report(&format!(
                                    "Error forwarding {} to port {}: {}",
                                    peer, remote_port, e
                                ));
                            }
                        });
                    }
                    Err(e) => {
                        remote.report(&format!("Accept error on {}: {}", addr, e));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }
}
