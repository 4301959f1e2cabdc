//! Wire codec for the transfer channel.
//!
//! A transfer connection carries two control frames followed by the raw
//! payload:
//!
//! 1. `Pin { pin }`: the PIN the initiator presents.
//! 2. `FileHeader { name, size }`: file name and exact payload length.
//! 3. Exactly `size` raw bytes.
//!
//! A control frame is a `u32` big-endian length prefix followed by that many
//! bytes of JSON, capped at [`MAX_FRAME_LEN`]. The receiver never replies on
//! a rejected PIN; it just closes the connection, and the sender writes both
//! frames eagerly without waiting in between. After the last payload byte
//! the sender shuts down its write half; stream close is the only
//! end-of-payload signal beyond the declared size.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::MAX_FRAME_LEN;
use crate::error::{Result, TransferError};

/// Control frames exchanged before the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferMsg {
    Pin { pin: String },
    FileHeader { name: String, size: u64 },
}

/// Write one length-prefixed control frame.
pub async fn send_msg<W>(send: &mut W, msg: &TransferMsg) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(msg).map_err(|e| TransferError::Protocol(e.to_string()))?;
    let len = (json.len() as u32).to_be_bytes();
    send.write_all(&len).await?;
    send.write_all(&json).await?;
    Ok(())
}

/// Read one length-prefixed control frame.
pub async fn recv_msg<R>(recv: &mut R) -> Result<TransferMsg>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    recv.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransferError::Protocol(format!(
            "control frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }

    let mut buf = vec![0u8; len];
    recv.read_exact(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|e| TransferError::Protocol(e.to_string()))
}
