// gol-net::codec — framing shared by the broker and worker RPC channels.
//
// Wire format: [u32 big-endian length][bincode payload]
// Bincode is used because bands and grids are raw `Vec<u8>` cell buffers;
// bincode writes these as length + raw bytes, where JSON would spell every
// cell out as a decimal number.

use std::io;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{NetError, Result};

/// Safety limit: reject any single frame larger than 256 MiB. A 8192×8192
/// grid is 64 MiB of cells, so this leaves room for the largest worlds the
/// I/O layer produces.
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

// ── Payload ───────────────────────────────────────────────────────────────────

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| NetError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let (msg, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map_err(|e| NetError::Serialization(e.to_string()))?;
    Ok(msg)
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Read a `[u32 BE length][payload]` frame.
pub async fn read_frame<T>(io: &mut T, max_bytes: usize) -> io::Result<Vec<u8>>
where
    T: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {max_bytes})"),
        ));
    }
    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a `[u32 BE length][payload]` frame.
pub async fn write_frame<T>(io: &mut T, data: &[u8]) -> io::Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    let len = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("payload exceeds u32::MAX: {} bytes", data.len()),
        )
    })?;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(data).await?;
    io.flush().await?;
    Ok(())
}

/// Encode `msg` and write it as one frame.
pub async fn write_message<T, M>(io: &mut T, msg: &M) -> Result<()>
where
    T: AsyncWrite + Unpin + Send,
    M: Serialize,
{
    let buf = encode(msg)?;
    write_frame(io, &buf).await?;
    Ok(())
}

/// Read one frame and decode it as `M`.
pub async fn read_message<T, M>(io: &mut T) -> Result<M>
where
    T: AsyncRead + Unpin + Send,
    M: DeserializeOwned,
{
    let buf = read_frame(io, MAX_FRAME_BYTES).await?;
    decode(&buf)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
