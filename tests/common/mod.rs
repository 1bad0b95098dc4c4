// File: common/mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(dead_code)]

use async_trait::async_trait;
use h3race::error::{RaceError, RaceResult};
use h3race::frame::{write_data_frame, write_headers_frame};
use h3race::qpack::{HeaderCodec, HeaderField, StaticQpack};
use h3race::request::Request;
use h3race::transport::{Connection, Stream};
use h3race::varint;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// How the in-memory peer treats one stream, by open order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// 200 with the received request body as response body.
    Echo,
    /// The given status and an empty body.
    Status(u16),
    /// Reset when the response is read.
    Reset,
    /// Never answers.
    Silent,
    /// Opening the stream fails.
    RefuseOpen,
    /// The second write (the tail) fails.
    FailTail,
    /// 200 declaring a 10 byte body, then the stream ends.
    ShortBody,
}

#[derive(Debug, Clone)]
pub enum Event {
    Write {
        stream_id: u64,
        at: Instant,
        len: usize,
    },
    Close {
        stream_id: u64,
    },
    Read {
        stream_id: u64,
    },
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

pub struct MockConnection {
    behaviors: Vec<Behavior>,
    opened: AtomicUsize,
    journal: Journal,
}

impl MockConnection {
    pub fn new(behaviors: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self {
            behaviors,
            opened: AtomicUsize::new(0),
            journal: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn uniform(count: usize, behavior: Behavior) -> Arc<Self> {
        Self::new(vec![behavior; count])
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().unwrap().clone()
    }

    /// Writes per stream id, in the order they happened.
    pub fn writes_of(&self, stream_id: u64) -> Vec<(Instant, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write {
                    stream_id: id,
                    at,
                    len,
                } if id == stream_id => Some((at, len)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn open_bidirectional_stream(&self) -> RaceResult<Box<dyn Stream>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behaviors.get(n).copied().unwrap_or(Behavior::Echo);
        if behavior == Behavior::RefuseOpen {
            return Err(RaceError::Open("stream limit reached".to_string()));
        }
        Ok(Box::new(MockStream {
            id: n as u64 * 4,
            behavior,
            journal: Arc::clone(&self.journal),
            received: Vec::new(),
            writes: 0,
            response: None,
            pos: 0,
        }))
    }
}

pub struct MockStream {
    id: u64,
    behavior: Behavior,
    journal: Journal,
    received: Vec<u8>,
    writes: usize,
    response: Option<Vec<u8>>,
    pos: usize,
}

impl MockStream {
    fn build_response(&self) -> Vec<u8> {
        let (status, body, declared) = match self.behavior {
            Behavior::Status(code) => (code, Vec::new(), 0),
            Behavior::ShortBody => (200, Vec::new(), 10),
            _ => {
                let body = data_payloads(&self.received);
                let len = body.len();
                (200, body, len)
            }
        };
        let fields = vec![
            HeaderField::new(":status", status.to_string()),
            HeaderField::new("content-length", declared.to_string()),
            HeaderField::new("server", "mock-h3"),
        ];
        let block = StaticQpack::new().compress(&fields).unwrap();
        let mut out = write_headers_frame(&block).unwrap();
        if !body.is_empty() {
            out.extend(write_data_frame(&body).unwrap());
        }
        out
    }
}

#[async_trait]
impl Stream for MockStream {
    fn id(&self) -> u64 {
        self.id
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writes += 1;
        if self.behavior == Behavior::FailTail && self.writes == 2 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream reset by peer"));
        }
        self.received.extend_from_slice(buf);
        self.journal.lock().unwrap().push(Event::Write {
            stream_id: self.id,
            at: Instant::now(),
            len: buf.len(),
        });
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Read { stream_id: self.id });
        match self.behavior {
            Behavior::Silent => return std::future::pending::<io::Result<usize>>().await,
            Behavior::Reset => {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
            _ => {}
        }
        if self.response.is_none() {
            self.response = Some(self.build_response());
        }
        let response = self.response.as_deref().unwrap_or_default();
        let n = buf.len().min(response.len() - self.pos);
        buf[..n].copy_from_slice(&response[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Close { stream_id: self.id });
        Ok(())
    }
}

/// Concatenated DATA payloads of a request byte stream.
pub fn data_payloads(mut bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    while !bytes.is_empty() {
        let (frame_type, a) = varint::decode(bytes).unwrap();
        let (length, b) = varint::decode(&bytes[a..]).unwrap();
        let start = a + b;
        let end = start + length as usize;
        if frame_type == 0x00 {
            body.extend_from_slice(&bytes[start..end]);
        }
        bytes = &bytes[end..];
    }
    body
}

pub fn coupon_request(code: &str) -> Request {
    let body = format!("coupon={:0>3}", code);
    Request::new("POST", "https://shop.example/api/redeem")
        .unwrap()
        .with_header("content-type", "application/x-www-form-urlencoded")
        .unwrap()
        .with_body(body.into_bytes())
}
