// File: response.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Reads one HTTP/3 response off a request stream.
//!
//! The reader consumes frames up to and including the response HEADERS
//! frame. The body stays on the stream and is pulled on demand through
//! [`Body`].

use flate2::write::GzDecoder;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use log::{debug, trace, warn};
use std::io::{self, Write};
use std::sync::Arc;

use crate::error::{RaceError, RaceResult};
use crate::frame::{next_frame_header, read_frame_header, read_payload, skip_payload, Frame};
use crate::qpack::{HeaderCodec, HeaderField};
use crate::transport::Stream;

const READ_CHUNK: usize = 16 * 1024;
/// Largest encoded response field section accepted.
pub const MAX_HEADER_BLOCK: u64 = 64 * 1024;

pub struct ResponseReader {
    codec: Arc<dyn HeaderCodec>,
    request_gzip: bool,
}

impl ResponseReader {
    /// `request_gzip` must match the framer: only then is a gzip body
    /// transparently unwrapped.
    pub fn new(codec: Arc<dyn HeaderCodec>, request_gzip: bool) -> Self {
        Self {
            codec,
            request_gzip,
        }
    }

    pub async fn read(&self, mut stream: Box<dyn Stream>) -> RaceResult<Response> {
        let stream_id = stream.id();
        let block_len = loop {
            match read_frame_header(stream.as_mut()).await? {
                Frame::Headers { length } => break length,
                Frame::Unknown { frame_type, length } => {
                    trace!(
                        "stream {}: skipping frame type 0x{:x} before headers",
                        stream_id,
                        frame_type
                    );
                    skip_payload(stream.as_mut(), length).await?;
                }
                other => {
                    return Err(RaceError::NoResponse {
                        stream_id,
                        frame_type: other.frame_type(),
                    })
                }
            }
        };

        if block_len > MAX_HEADER_BLOCK {
            return Err(RaceError::InvalidResponse(format!(
                "header block of {} bytes exceeds {}",
                block_len, MAX_HEADER_BLOCK
            )));
        }
        let block = read_payload(stream.as_mut(), block_len).await?;
        let fields = self.codec.decompress_full(&block)?;
        let (status, mut headers) = response_head(fields)?;

        if !body_allowed(status) {
            debug!("stream {}: {} without body", stream_id, status);
            return Ok(Response {
                status,
                headers,
                content_length: Some(0),
                uncompressed: false,
                stream_id,
                body: Body::empty(stream_id),
                body_error: None,
            });
        }

        let mut content_length = declared_length(&headers);
        let mut uncompressed = false;
        if self.request_gzip && is_gzip(&headers) {
            headers.remove(CONTENT_ENCODING);
            headers.remove(CONTENT_LENGTH);
            content_length = None;
            uncompressed = true;
        }
        debug!(
            "stream {}: {} content-length={:?} gzip={}",
            stream_id, status, content_length, uncompressed
        );

        Ok(Response {
            status,
            headers,
            content_length,
            uncompressed,
            stream_id,
            body: Body::streaming(stream, content_length, uncompressed),
            body_error: None,
        })
    }
}

fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn response_head(fields: Vec<HeaderField>) -> RaceResult<(StatusCode, HeaderMap)> {
    let mut status = None;
    let mut headers = HeaderMap::with_capacity(fields.len());
    for field in fields {
        if field.name == ":status" {
            if status.is_some() {
                return Err(RaceError::InvalidResponse(
                    "duplicate :status".to_string(),
                ));
            }
            let code = StatusCode::from_bytes(&field.value).map_err(|_| {
                RaceError::InvalidResponse(format!(
                    "bad :status {:?}",
                    String::from_utf8_lossy(&field.value)
                ))
            })?;
            status = Some(code);
        } else if field.name.starts_with(':') {
            return Err(RaceError::InvalidResponse(format!(
                "unexpected pseudo-header {}",
                field.name
            )));
        } else {
            let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(|_| {
                RaceError::InvalidResponse(format!("bad header name {:?}", field.name))
            })?;
            let value = HeaderValue::from_bytes(&field.value).map_err(|_| {
                RaceError::InvalidResponse(format!("bad value for header {}", field.name))
            })?;
            headers.append(name, value);
        }
    }
    let status =
        status.ok_or_else(|| RaceError::InvalidResponse("missing :status".to_string()))?;
    Ok((status, headers))
}

/// `Transfer-Encoding` wins over `Content-Length`; several or unparsable
/// `Content-Length` values leave the length unknown.
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    if headers.contains_key(TRANSFER_ENCODING) {
        return None;
    }
    let mut values = headers.get_all(CONTENT_LENGTH).iter();
    match (values.next(), values.next()) {
        (Some(value), None) => value.to_str().ok()?.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("gzip"))
        .unwrap_or(false)
}

pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    content_length: Option<u64>,
    uncompressed: bool,
    stream_id: u64,
    body: Body,
    body_error: Option<RaceError>,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `None` when the length is unknown.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// True when a gzip content coding was removed by the reader.
    pub fn is_uncompressed(&self) -> bool {
        self.uncompressed
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Why reading the body stopped early, when it did. The status and
    /// headers stay valid either way.
    pub fn body_error(&self) -> Option<&RaceError> {
        self.body_error.as_ref()
    }

    pub fn set_body_error(&mut self, error: RaceError) {
        self.body_error = Some(error);
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .field("uncompressed", &self.uncompressed)
            .field("stream_id", &self.stream_id)
            .field("body_error", &self.body_error)
            .finish()
    }
}

/// Lazily read response body.
pub struct Body {
    stream: Option<Box<dyn Stream>>,
    stream_id: u64,
    declared: Option<u64>,
    received: u64,
    frame_remaining: u64,
    gzip: Option<GzDecoder<Vec<u8>>>,
    gzip_fed: bool,
    buffered: Vec<u8>,
}

impl Body {
    fn empty(stream_id: u64) -> Self {
        Self {
            stream: None,
            stream_id,
            declared: Some(0),
            received: 0,
            frame_remaining: 0,
            gzip: None,
            gzip_fed: false,
            buffered: Vec::new(),
        }
    }

    fn streaming(stream: Box<dyn Stream>, declared: Option<u64>, gzip: bool) -> Self {
        Self {
            stream_id: stream.id(),
            stream: Some(stream),
            declared,
            received: 0,
            frame_remaining: 0,
            gzip: gzip.then(|| GzDecoder::new(Vec::new())),
            gzip_fed: false,
            buffered: Vec::new(),
        }
    }

    /// DATA payload bytes taken off the wire so far, before any gzip decoding.
    pub fn wire_bytes(&self) -> u64 {
        self.received
    }

    /// Next piece of the body, or `None` once it is complete.
    pub async fn chunk(&mut self) -> RaceResult<Option<Vec<u8>>> {
        if !self.buffered.is_empty() {
            return Ok(Some(std::mem::take(&mut self.buffered)));
        }
        loop {
            let raw = match self.next_raw().await? {
                Some(raw) => raw,
                None => return self.finish_gzip(),
            };
            match self.gzip.as_mut() {
                None => return Ok(Some(raw)),
                Some(decoder) => {
                    self.gzip_fed = true;
                    decoder
                        .write_all(&raw)
                        .map_err(|e| RaceError::Decompression(format!("gzip body: {}", e)))?;
                    let out = std::mem::take(decoder.get_mut());
                    if !out.is_empty() {
                        return Ok(Some(out));
                    }
                }
            }
        }
    }

    /// Reads the remaining body into memory.
    pub async fn bytes(&mut self) -> RaceResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    pub async fn text(&mut self) -> RaceResult<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Pulls the whole body off the stream now. Later calls to
    /// [`chunk`](Self::chunk) are served from memory. On error the bytes
    /// read so far stay buffered.
    pub async fn fill(&mut self) -> RaceResult<usize> {
        let mut data = std::mem::take(&mut self.buffered);
        let result = loop {
            match self.chunk().await {
                Ok(Some(chunk)) => data.extend_from_slice(&chunk),
                Ok(None) => break Ok(data.len()),
                Err(e) => break Err(e),
            }
        };
        self.buffered = data;
        result
    }

    /// Bytes pulled in by [`fill`](Self::fill) and not yet handed out.
    pub fn buffered(&self) -> &[u8] {
        &self.buffered
    }

    fn finish_gzip(&mut self) -> RaceResult<Option<Vec<u8>>> {
        let Some(mut decoder) = self.gzip.take() else {
            return Ok(None);
        };
        if !self.gzip_fed {
            return Ok(None);
        }
        decoder
            .try_finish()
            .map_err(|e| RaceError::Decompression(format!("gzip body: {}", e)))?;
        let out = std::mem::take(decoder.get_mut());
        Ok((!out.is_empty()).then_some(out))
    }

    fn mismatch(&self) -> RaceError {
        RaceError::ContentLengthMismatch {
            declared: self.declared.unwrap_or(0),
            received: self.received,
        }
    }

    /// Next DATA payload slice straight off the wire.
    async fn next_raw(&mut self) -> RaceResult<Option<Vec<u8>>> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };

            if self.frame_remaining > 0 {
                let want = self.frame_remaining.min(READ_CHUNK as u64) as usize;
                let mut buf = vec![0u8; want];
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    self.stream = None;
                    if self.declared.is_some() {
                        return Err(self.mismatch());
                    }
                    return Err(RaceError::Read(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside a DATA frame",
                    )));
                }
                buf.truncate(n);
                self.frame_remaining -= n as u64;
                self.received += n as u64;
                return Ok(Some(buf));
            }

            if self.declared == Some(self.received) {
                self.stream = None;
                return Ok(None);
            }

            match next_frame_header(stream.as_mut()).await? {
                None => {
                    self.stream = None;
                    if self.declared.is_some() {
                        return Err(self.mismatch());
                    }
                    return Ok(None);
                }
                Some(Frame::Data { length }) => {
                    if let Some(declared) = self.declared {
                        if self.received + length > declared {
                            let err = RaceError::ContentLengthMismatch {
                                declared,
                                received: self.received + length,
                            };
                            self.stream = None;
                            return Err(err);
                        }
                    }
                    self.frame_remaining = length;
                }
                Some(Frame::Headers { length }) => {
                    trace!("stream {}: discarding {} byte trailer block", self.stream_id, length);
                    skip_payload(stream.as_mut(), length).await?;
                    self.stream = None;
                    if let Some(declared) = self.declared {
                        if self.received < declared {
                            return Err(self.mismatch());
                        }
                    }
                    return Ok(None);
                }
                Some(Frame::Unknown { frame_type, length }) => {
                    warn!(
                        "stream {}: skipping frame type 0x{:x} in body",
                        self.stream_id, frame_type
                    );
                    skip_payload(stream.as_mut(), length).await?;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
