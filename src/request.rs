// File: request.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use http::header::{
    HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_LENGTH, RANGE, TE, USER_AGENT,
};
use http::{HeaderMap, Method};
use log::trace;
use std::sync::Arc;
use url::Url;

use crate::error::{RaceError, RaceResult};
use crate::frame::{hex_preview, write_data_frame, write_headers_frame};
use crate::qpack::{HeaderCodec, HeaderField};

pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// One logical HTTP request. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Request {
    pub fn new(method: &str, url: &str) -> RaceResult<Self> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| RaceError::InvalidRequest(format!("method {:?}: {}", method, e)))?;
        let url = Url::parse(url)
            .map_err(|e| RaceError::InvalidRequest(format!("url {:?}: {}", url, e)))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(RaceError::InvalidRequest(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(RaceError::InvalidRequest("url has no host".to_string()));
        }
        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Vec::new(),
        })
    }

    /// Sets a header, replacing earlier values of the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> RaceResult<Self> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a header value, keeping earlier values of the same name.
    pub fn append_header(mut self, name: &str, value: &str) -> RaceResult<Self> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Bodies on GET and HEAD are dropped.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        if self.method == Method::GET || self.method == Method::HEAD {
            return self;
        }
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    pub fn path(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

/// Connection-specific fields (RFC 9114 §4.2). `host` is carried by
/// `:authority` instead.
const CONNECTION_SPECIFIC: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

fn parse_header(name: &str, value: &str) -> RaceResult<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| RaceError::InvalidRequest(format!("header name {:?}: {}", name, e)))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| RaceError::InvalidRequest(format!("header value {:?}: {}", value, e)))?;
    if CONNECTION_SPECIFIC.contains(&name.as_str())
        || (name == TE && !value.as_bytes().eq_ignore_ascii_case(b"trailers"))
    {
        return Err(RaceError::InvalidRequest(format!(
            "header {} is not allowed in HTTP/3",
            name
        )));
    }
    Ok((name, value))
}

/// Turns requests into HEADERS and DATA frame bytes.
#[derive(Clone)]
pub struct RequestFramer {
    codec: Arc<dyn HeaderCodec>,
    request_gzip: bool,
    user_agent: String,
}

impl RequestFramer {
    pub fn new(codec: Arc<dyn HeaderCodec>, request_gzip: bool) -> Self {
        Self {
            codec,
            request_gzip,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn set_request_gzip(&mut self, request_gzip: bool) {
        self.request_gzip = request_gzip;
    }

    pub fn request_gzip(&self) -> bool {
        self.request_gzip
    }

    pub fn set_user_agent(&mut self, user_agent: String) {
        self.user_agent = user_agent;
    }

    /// Field section for `req`: pseudo-headers first, then regular headers
    /// with lower-case names.
    pub fn header_fields(&self, req: &Request) -> Vec<HeaderField> {
        let mut fields = vec![
            HeaderField::new(":method", req.method().as_str()),
            HeaderField::new(":scheme", req.url().scheme()),
            HeaderField::new(":authority", req.authority()),
            HeaderField::new(":path", req.path()),
        ];

        let headers = req.headers();
        for (name, value) in headers.iter() {
            fields.push(HeaderField::new(name.as_str(), value.as_bytes()));
        }
        if !req.body().is_empty() && !headers.contains_key(CONTENT_LENGTH) {
            fields.push(HeaderField::new(
                CONTENT_LENGTH.as_str(),
                req.content_length().to_string(),
            ));
        }
        if self.request_gzip
            && req.method() != Method::HEAD
            && !headers.contains_key(ACCEPT_ENCODING)
            && !headers.contains_key(RANGE)
        {
            fields.push(HeaderField::new(ACCEPT_ENCODING.as_str(), "gzip"));
        }
        if !headers.contains_key(USER_AGENT) {
            fields.push(HeaderField::new(USER_AGENT.as_str(), self.user_agent.as_str()));
        }
        fields
    }

    pub fn header_bytes(&self, req: &Request) -> RaceResult<Vec<u8>> {
        let block = self.codec.compress(&self.header_fields(req))?;
        let frame = write_headers_frame(&block)?;
        trace!(
            "{} {}: headers frame {}",
            req.method(),
            req.url(),
            hex_preview(&frame, 64)
        );
        Ok(frame)
    }

    /// The complete request: HEADERS, then one DATA frame when there is a body.
    pub fn full_payload(&self, req: &Request) -> RaceResult<Vec<u8>> {
        let mut payload = self.header_bytes(req)?;
        if !req.body().is_empty() {
            payload.extend(write_data_frame(req.body())?);
        }
        Ok(payload)
    }
}
