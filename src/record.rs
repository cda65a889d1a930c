//! Record framing
//!
//! CRC32-framed bincode records, used by upload manifests and the metadata
//! journal.
//!
//! ## Frame Format
//! ```text
//! ┌─────────┬─────────┬──────────────────────┐
//! │ CRC (4) │ Len (4) │ Data (bincode)       │
//! └─────────┴─────────┴──────────────────────┘
//! ```
//! CRC and Len are little-endian; the CRC covers the data bytes only.

use std::io::{ErrorKind, Read};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, VaultError};

/// Header size: CRC (4) + Len (4) = 8 bytes
pub(crate) const FRAME_HEADER_SIZE: u64 = 8;

/// Upper bound on a single record (1 MB)
pub(crate) const MAX_RECORD_SIZE: u32 = 1024 * 1024;

/// Result of reading one frame from a stream
pub(crate) enum Frame<T> {
    /// A complete, CRC-valid record and its total framed length
    Record(T, u64),
    /// Clean end of stream at a frame boundary
    End,
    /// Truncated or corrupt frame (partial write at the tail)
    Torn(String),
}

/// Serialize and frame a record
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let data = bincode::serialize(value)
        .map_err(|e| VaultError::Serialization(e.to_string()))?;

    if data.len() as u64 > MAX_RECORD_SIZE as u64 {
        return Err(VaultError::Serialization(format!(
            "record of {} bytes exceeds limit of {} bytes",
            data.len(),
            MAX_RECORD_SIZE
        )));
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE as usize + data.len());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
    frame.extend_from_slice(&data);
    Ok(frame)
}

/// Decode a buffer that must hold exactly one frame
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut reader = bytes;
    match read_frame(&mut reader)? {
        Frame::Record(value, _) if reader.is_empty() => Ok(value),
        Frame::Record(_, _) => Err(VaultError::Corruption(
            "trailing bytes after record".to_string(),
        )),
        Frame::End => Err(VaultError::Corruption("empty record".to_string())),
        Frame::Torn(reason) => Err(VaultError::Corruption(reason)),
    }
}

/// Read the next frame from a stream
///
/// I/O failures other than a short read are returned as errors; a short read
/// or CRC failure is reported as `Frame::Torn` so callers can truncate.
pub(crate) fn read_frame<T: DeserializeOwned, R: Read + ?Sized>(reader: &mut R) -> Result<Frame<T>> {
    let mut header = [0u8; FRAME_HEADER_SIZE as usize];
    let filled = read_full(reader, &mut header)?;
    if filled == 0 {
        return Ok(Frame::End);
    }
    if filled < header.len() {
        return Ok(Frame::Torn(format!("partial frame header ({} bytes)", filled)));
    }

    let crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if len > MAX_RECORD_SIZE {
        return Ok(Frame::Torn(format!("frame length {} exceeds limit", len)));
    }

    let mut data = vec![0u8; len as usize];
    let filled = read_full(reader, &mut data)?;
    if filled < data.len() {
        return Ok(Frame::Torn(format!(
            "partial frame body ({} of {} bytes)",
            filled, len
        )));
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data);
    if hasher.finalize() != crc {
        return Ok(Frame::Torn("frame CRC mismatch".to_string()));
    }

    let value = bincode::deserialize(&data)
        .map_err(|e| VaultError::Serialization(e.to_string()))?;

    Ok(Frame::Record(value, FRAME_HEADER_SIZE + len as u64))
}

/// Fill `buf` as far as the stream allows; returns bytes read
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
