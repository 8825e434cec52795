//! One forwarded connection: local TCP stream <-> port-forward WebSocket

use std::pin::pin;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, WebSocketStream};
use tokio_util::sync::CancellationToken;

use pt_core::TransportError;

use super::channel::{encode_data, Chunk, Demux};
use super::Remote;

const BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound on the WebSocket close handshake
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

fn ws_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Dial(e.to_string())
}

/// Open the WebSocket for `port` and copy bytes until the connection ends
pub(crate) async fn bridge(
    remote: &Remote,
    local: TcpStream,
    port: u16,
    stop: CancellationToken,
) -> Result<(), TransportError> {
    let request = remote.request(port)?;
    let connector = Connector::Rustls(remote.tls());
    let (ws, _response) = connect_async_tls_with_config(request, None, true, Some(connector))
        .await
        .map_err(ws_error)?;
    tracing::debug!("Opened stream for port {}", port);

    let result = pump(ws, local, stop).await;
    tracing::debug!("Stream for port {} closed", port);
    result
}

/// Copy bytes both ways.
///
/// Local EOF only ends the sending half; replies keep flowing until the
/// remote closes or `stop` fires. A local read error ends both halves.
pub(crate) async fn pump<S>(
    ws: WebSocketStream<S>,
    mut local: TcpStream,
    stop: CancellationToken,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (mut local_read, mut local_write) = local.split();

    let result = {
        // Local -> remote
        let local_to_remote = pin!(async {
            let mut buf = vec![0u8; BUFFER_SIZE];
            loop {
                let n = local_read.read(&mut buf).await?;
                if n == 0 {
                    return Ok::<(), TransportError>(());
                }
                ws_tx
                    .send(Message::Binary(encode_data(&buf[..n])))
                    .await
                    .map_err(ws_error)?;
            }
        });

        // Remote -> local
        let mut remote_to_local = pin!(async {
            let mut demux = Demux::default();
            while let Some(message) = ws_rx.next().await {
                match message.map_err(ws_error)? {
                    Message::Binary(frame) => match demux.push(&frame)? {
                        Some(Chunk::Data(data)) => local_write.write_all(data).await?,
                        Some(Chunk::Error(msg)) => return Err(TransportError::Protocol(msg)),
                        None => {}
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Ok::<(), TransportError>(())
        });

        tokio::select! {
            sent = local_to_remote => match sent {
                Ok(()) => {
                    tracing::trace!("Local side finished sending");
                    tokio::select! {
                        result = &mut remote_to_local => result,
                        _ = stop.cancelled() => Ok(()),
                    }
                }
                Err(e) => Err(e),
            },
            result = &mut remote_to_local => result,
            _ = stop.cancelled() => Ok(()),
        }
    };

    let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws_tx.close()).await;
    result
}
