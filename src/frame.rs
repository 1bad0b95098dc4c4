// File: frame.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! HTTP/3 stream frames (RFC 9114 §7).
//!
//! ```text
//! Frame {
//!   Type (varint),
//!   Length (varint),
//!   Payload (..)
//! }
//! ```

use log::trace;

use crate::error::{RaceError, RaceResult};
use crate::transport::{read_full, Stream};
use crate::varint::{encode_into, read_varint, varint_len};

pub const FRAME_DATA: u64 = 0x00;
pub const FRAME_HEADERS: u64 = 0x01;
pub const FRAME_SETTINGS: u64 = 0x04;

pub const SETTINGS_QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
pub const SETTINGS_QPACK_BLOCKED_STREAMS: u64 = 0x07;

const PAYLOAD_CHUNK: usize = 4096;

/// A parsed frame header. The payload stays on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Headers { length: u64 },
    Data { length: u64 },
    Unknown { frame_type: u64, length: u64 },
}

impl Frame {
    fn from_parts(frame_type: u64, length: u64) -> Self {
        match frame_type {
            FRAME_DATA => Frame::Data { length },
            FRAME_HEADERS => Frame::Headers { length },
            _ => Frame::Unknown { frame_type, length },
        }
    }

    pub fn frame_type(&self) -> u64 {
        match self {
            Frame::Data { .. } => FRAME_DATA,
            Frame::Headers { .. } => FRAME_HEADERS,
            Frame::Unknown { frame_type, .. } => *frame_type,
        }
    }

    pub fn length(&self) -> u64 {
        match self {
            Frame::Data { length } | Frame::Headers { length } => *length,
            Frame::Unknown { length, .. } => *length,
        }
    }
}

fn frame_with_declared_length(
    frame_type: u64,
    declared: u64,
    payload: &[u8],
) -> RaceResult<Vec<u8>> {
    let mut out =
        Vec::with_capacity(varint_len(frame_type) + varint_len(declared) + payload.len());
    encode_into(frame_type, &mut out)?;
    encode_into(declared, &mut out)?;
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn write_headers_frame(header_block: &[u8]) -> RaceResult<Vec<u8>> {
    frame_with_declared_length(FRAME_HEADERS, header_block.len() as u64, header_block)
}

pub fn write_data_frame(body: &[u8]) -> RaceResult<Vec<u8>> {
    frame_with_declared_length(FRAME_DATA, body.len() as u64, body)
}

/// DATA frame header declaring `declared` payload bytes, followed by
/// `payload`. The frame is only complete once the remaining
/// `declared - payload.len()` bytes arrive in a later frame write.
pub fn write_data_frame_with_length(declared: u64, payload: &[u8]) -> RaceResult<Vec<u8>> {
    frame_with_declared_length(FRAME_DATA, declared, payload)
}

pub fn write_settings_frame(settings: &[(u64, u64)]) -> RaceResult<Vec<u8>> {
    let mut payload = Vec::new();
    for &(id, value) in settings {
        encode_into(id, &mut payload)?;
        encode_into(value, &mut payload)?;
    }
    frame_with_declared_length(FRAME_SETTINGS, payload.len() as u64, &payload)
}

async fn read_header_parts(stream: &mut dyn Stream) -> RaceResult<Option<(u64, u64)>> {
    let frame_type = match read_varint(stream).await {
        Ok(t) => t,
        Err(RaceError::TruncatedInput { available: 0, .. }) => return Ok(None),
        Err(e) => return Err(RaceError::TruncatedFrame(format!("frame type: {}", e))),
    };
    let length = read_varint(stream)
        .await
        .map_err(|e| RaceError::TruncatedFrame(format!("frame length: {}", e)))?;
    Ok(Some((frame_type, length)))
}

/// Reads the next frame header, failing with `TruncatedFrame` when the
/// stream ends or errors before a complete header was read.
pub async fn read_frame_header(stream: &mut dyn Stream) -> RaceResult<Frame> {
    match read_header_parts(stream).await? {
        Some((frame_type, length)) => {
            trace!(
                "stream {}: frame type=0x{:x} length={}",
                stream.id(),
                frame_type,
                length
            );
            Ok(Frame::from_parts(frame_type, length))
        }
        None => Err(RaceError::TruncatedFrame(
            "stream ended before a frame header".to_string(),
        )),
    }
}

/// Like [`read_frame_header`], but a clean end of stream on a frame
/// boundary yields `None`.
pub async fn next_frame_header(stream: &mut dyn Stream) -> RaceResult<Option<Frame>> {
    Ok(read_header_parts(stream)
        .await?
        .map(|(frame_type, length)| Frame::from_parts(frame_type, length)))
}

/// Reads exactly `length` payload bytes. The buffer grows with the bytes
/// that actually arrive, never with the declared length alone.
pub async fn read_payload(stream: &mut dyn Stream, length: u64) -> RaceResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(length.min(PAYLOAD_CHUNK as u64) as usize);
    let mut scratch = [0u8; PAYLOAD_CHUNK];
    let mut remaining = length;
    while remaining > 0 {
        let want = remaining.min(PAYLOAD_CHUNK as u64) as usize;
        let got = read_full(stream, &mut scratch[..want]).await?;
        payload.extend_from_slice(&scratch[..got]);
        remaining -= got as u64;
        if got < want {
            return Err(RaceError::ShortRead {
                expected: length,
                actual: payload.len() as u64,
            });
        }
    }
    Ok(payload)
}

pub async fn skip_payload(stream: &mut dyn Stream, length: u64) -> RaceResult<()> {
    let mut scratch = [0u8; PAYLOAD_CHUNK];
    let mut remaining = length;
    while remaining > 0 {
        let want = remaining.min(PAYLOAD_CHUNK as u64) as usize;
        let got = read_full(stream, &mut scratch[..want]).await?;
        remaining -= got as u64;
        if got < want {
            return Err(RaceError::ShortRead {
                expected: length,
                actual: length - remaining,
            });
        }
    }
    Ok(())
}

/// Lowercase hex rendering, capped at `max` bytes, for trace output.
pub fn hex_preview(bytes: &[u8], max: usize) -> String {
    let shown = &bytes[..bytes.len().min(max)];
    let mut out: String = shown.iter().map(|b| format!("{:02x}", b)).collect();
    if bytes.len() > max {
        out.push_str(&format!("..(+{} bytes)", bytes.len() - max));
    }
    out
}
