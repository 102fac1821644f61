//! Binary framing for record files.
//!
//! A record file is a header followed by one frame:
//! ```text
//! [magic: 4 bytes "IDMT"][version: 1 byte]
//! [length: 4 bytes LE][payload: N bytes][crc32: 4 bytes LE]
//! ```
//! The payload is opaque here; the service layer stores JSON in it.

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;

/// Current record format version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes opening every record file.
pub const MAGIC: [u8; 4] = *b"IDMT";

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Frames `payload` with its length and checksum.
///
/// # Errors
/// Returns `InvalidInput` if the payload does not fit a 32-bit length.
pub fn encode(payload: &[u8]) -> IoResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        IoError::new(
            ErrorKind::InvalidInput,
            format!("payload of {} bytes is too large to frame", payload.len()),
        )
    })?;

    let mut out = Vec::with_capacity(4 + payload.len() + 4);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&checksum(payload).to_le_bytes());
    Ok(out)
}

/// Reads one frame, verifying its checksum.
///
/// # Errors
/// - `InvalidData` if the declared length exceeds `max_len`
/// - `InvalidData` on checksum mismatch
/// - `UnexpectedEof` on a truncated frame
pub fn decode(reader: &mut impl Read, max_len: u64) -> IoResult<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes);

    if u64::from(len) > max_len {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("record size {len} exceeds maximum {max_len}"),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&payload);
    if stored != computed {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CRC mismatch: stored={stored:08x}, computed={computed:08x}"),
        ));
    }

    Ok(payload)
}

/// Writes the file header (magic + version).
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])?;
    Ok(())
}

/// Reads and validates the file header.
///
/// # Errors
/// Returns `InvalidData` on wrong magic bytes or an unsupported version.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported record version: {} (expected {CODEC_VERSION})", version[0]),
        ));
    }
    Ok(version[0])
}
