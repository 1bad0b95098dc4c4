// File: splitter.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::debug;

use crate::error::{RaceError, RaceResult};
use crate::frame::{write_data_frame, write_data_frame_with_length};
use crate::request::{Request, RequestFramer};

/// Wire bytes of one request, cut so that the last `n` body bytes travel in
/// a separate DATA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPayload {
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
}

impl SplitPayload {
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.tail.is_empty()
    }
}

/// Splits `req` into head and tail. The head carries the HEADERS frame and a
/// DATA frame with all but the last `tail_bytes` body bytes; the tail is a
/// DATA frame holding exactly those bytes.
pub fn split(framer: &RequestFramer, req: &Request, tail_bytes: usize) -> RaceResult<SplitPayload> {
    let body = req.body();
    if tail_bytes as u64 > req.content_length() {
        return Err(RaceError::InvalidSplit {
            tail_bytes,
            content_length: req.content_length(),
        });
    }
    let cut = body.len() - tail_bytes;

    let mut head = framer.header_bytes(req)?;
    if !body.is_empty() {
        head.extend(write_data_frame_with_length(cut as u64, &body[..cut])?);
    }
    let tail = write_data_frame(&body[cut..])?;

    debug!(
        "{} {}: head {} bytes, tail {} bytes ({} withheld)",
        req.method(),
        req.url(),
        head.len(),
        tail.len(),
        tail_bytes
    );
    Ok(SplitPayload { head, tail })
}
