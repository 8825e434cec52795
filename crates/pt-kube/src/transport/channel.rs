//! `v4.channel.k8s.io` framing
//!
//! Every binary message starts with a channel byte. For port-forwarding
//! channel 0 carries data and channel 1 carries error text. The server's
//! first message on each channel is a two-byte little-endian port number.

use pt_core::TransportError;

/// WebSocket subprotocol negotiated with the API server
pub const PROTOCOL: &str = "v4.channel.k8s.io";

pub const DATA_CHANNEL: u8 = 0;
pub const ERROR_CHANNEL: u8 = 1;

/// Frame `payload` for the data channel
pub fn encode_data(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(DATA_CHANNEL);
    frame.extend_from_slice(payload);
    frame
}

/// Payload of one decoded frame
#[derive(Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    Data(&'a [u8]),
    Error(String),
}

/// Decodes server frames for one connection
#[derive(Debug, Default)]
pub struct Demux {
    /// Whether the port header was seen on (data, error)
    port_seen: [bool; 2],
}

impl Demux {
    /// Decode one binary message.
    ///
    /// Returns `None` for frames with nothing to deliver (port headers,
    /// empty payloads).
    pub fn push<'a>(&mut self, frame: &'a [u8]) -> Result<Option<Chunk<'a>>, TransportError> {
        let (&channel, mut payload) = frame
            .split_first()
            .ok_or_else(|| TransportError::Protocol("empty frame".into()))?;

        let seen = self
            .port_seen
            .get_mut(channel as usize)
            .ok_or_else(|| TransportError::Protocol(format!("unexpected channel {}", channel)))?;

        if !*seen {
            if payload.len() < 2 {
                return Err(TransportError::Protocol(format!(
                    "short port header on channel {}",
                    channel
                )));
            }
            *seen = true;
            payload = &payload[2..];
        }

        if payload.is_empty() {
            return Ok(None);
        }
        Ok(Some(match channel {
            DATA_CHANNEL => Chunk::Data(payload),
            _ => Chunk::Error(String::from_utf8_lossy(payload).trim().to_string()),
        }))
    }
}
