// File: error.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum RaceError {
    InvalidInteger(i64),
    TruncatedInput { needed: usize, available: usize },
    TruncatedFrame(String),
    ShortRead { expected: u64, actual: u64 },
    InvalidSplit { tail_bytes: usize, content_length: u64 },
    InvalidPlan(String),
    InvalidRequest(String),
    Decompression(String),
    InvalidResponse(String),
    NoResponse { stream_id: u64, frame_type: u64 },
    ContentLengthMismatch { declared: u64, received: u64 },
    Open(String),
    Write(std::io::Error),
    Read(std::io::Error),
    Timeout(Duration),
    Transport(String),
}

impl fmt::Display for RaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInteger(v) => write!(f, "Invalid varint value: {}", v),
            Self::TruncatedInput { needed, available } => write!(
                f,
                "Truncated input: needed {} bytes, {} available",
                needed, available
            ),
            Self::TruncatedFrame(msg) => write!(f, "Truncated frame: {}", msg),
            Self::ShortRead { expected, actual } => write!(
                f,
                "Short read: expected {} bytes, got {}",
                expected, actual
            ),
            Self::InvalidSplit {
                tail_bytes,
                content_length,
            } => write!(
                f,
                "Invalid split: cannot withhold {} bytes of a {} byte body",
                tail_bytes, content_length
            ),
            Self::InvalidPlan(msg) => write!(f, "Invalid attack plan: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Decompression(msg) => write!(f, "Decompression failed: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            Self::NoResponse {
                stream_id,
                frame_type,
            } => write!(
                f,
                "No response on stream {}: first frame has type 0x{:x}, expected HEADERS",
                stream_id, frame_type
            ),
            Self::ContentLengthMismatch { declared, received } => write!(
                f,
                "Content-Length mismatch: declared {}, received {}",
                declared, received
            ),
            Self::Open(msg) => write!(f, "Failed to open stream: {}", msg),
            Self::Write(e) => write!(f, "Write error: {}", e),
            Self::Read(e) => write!(f, "Read error: {}", e),
            Self::Timeout(after) => write!(f, "Timed out after {}ms", after.as_millis()),
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for RaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Write(e) => Some(e),
            Self::Read(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RaceError {
    fn from(error: std::io::Error) -> Self {
        Self::Read(error)
    }
}

pub type RaceResult<T> = Result<T, RaceError>;
