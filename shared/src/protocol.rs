//! Wire protocol between the sequencer and its clients.
//!
//! Each packet is a bincode body preceded by its length as a little-endian
//! `u32`. The transport underneath is expected to be ordered and reliable.

use crate::error::SyncError;
use crate::event::{ConnectionId, Event};
use crate::frame::Frame;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound for a single encoded packet, snapshots included.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet<I> {
    // Client -> server
    Hello {
        protocol_version: u32,
    },
    ClientFrame {
        frame: Frame,
        events: Vec<Event<I>>,
    },

    // Server -> client
    ClientInitialize {
        connection: ConnectionId,
        frame: Frame,
        state: Vec<u8>,
    },
    ServerFrame {
        frame: Frame,
        events: Vec<Event<I>>,
    },
    StateSnapshot {
        frame: Frame,
        state: Vec<u8>,
    },
    Disconnected {
        reason: String,
    },
}

impl<I> Packet<I> {
    pub fn hello() -> Self {
        Packet::Hello {
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Hello { .. } => "Hello",
            Packet::ClientFrame { .. } => "ClientFrame",
            Packet::ClientInitialize { .. } => "ClientInitialize",
            Packet::ServerFrame { .. } => "ServerFrame",
            Packet::StateSnapshot { .. } => "StateSnapshot",
            Packet::Disconnected { .. } => "Disconnected",
        }
    }
}

pub fn encode_packet<I: Serialize>(packet: &Packet<I>) -> Result<Vec<u8>, SyncError> {
    let body = bincode::serialize(packet).map_err(SyncError::Codec)?;
    if body.len() > MAX_PACKET_SIZE {
        return Err(SyncError::PacketTooLarge {
            size: body.len(),
            limit: MAX_PACKET_SIZE,
        });
    }
    Ok(body)
}

pub fn decode_packet<I: DeserializeOwned>(body: &[u8]) -> Result<Packet<I>, SyncError> {
    bincode::deserialize(body).map_err(SyncError::Codec)
}

/// Writes one length-prefixed packet and flushes the writer.
pub async fn write_packet<W, I>(writer: &mut W, packet: &Packet<I>) -> Result<(), SyncError>
where
    W: AsyncWrite + Unpin,
    I: Serialize,
{
    let body = encode_packet(packet)?;
    writer.write_all(&(body.len() as u32).to_le_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed packet.
///
/// Returns `Ok(None)` when the peer closed the stream between packets.
pub async fn read_packet<R, I>(reader: &mut R) -> Result<Option<Packet<I>>, SyncError>
where
    R: AsyncRead + Unpin,
    I: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    // Past the first byte an EOF is a truncated packet
    reader.read_exact(&mut len_buf[1..]).await?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_PACKET_SIZE {
        return Err(SyncError::PacketTooLarge {
            size: len,
            limit: MAX_PACKET_SIZE,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_packet(&body).map(Some)
}
