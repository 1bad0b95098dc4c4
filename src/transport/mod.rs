// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Capabilities the race engine needs from the QUIC layer.
//!
//! The engine never touches QUIC itself. It opens bidirectional streams on an
//! established [`Connection`] and drives each [`Stream`] with ordered writes,
//! a half-close and ordered reads.

pub mod quic;

use async_trait::async_trait;
use std::io;

use crate::error::RaceResult;

#[async_trait]
pub trait Connection: Send + Sync {
    /// Opens a fresh client-initiated bidirectional stream.
    async fn open_bidirectional_stream(&self) -> RaceResult<Box<dyn Stream>>;
}

#[async_trait]
pub trait Stream: Send {
    fn id(&self) -> u64;

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Reads into `buf`, returning 0 once the peer finished the stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Half-closes the write side; reads stay possible.
    async fn close(&mut self) -> io::Result<()>;
}

/// Fills `buf` completely. Returns how many bytes were read before the
/// stream ended, which is `buf.len()` on success.
pub(crate) async fn read_full(stream: &mut dyn Stream, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;

    /// Replays a fixed byte sequence in reads of at most `chunk` bytes and
    /// keeps everything written to it. `fail_after_input` turns the end of
    /// the script into a reset instead of a clean finish.
    pub struct ScriptedStream {
        pub id: u64,
        pub input: Vec<u8>,
        pub pos: usize,
        pub chunk: usize,
        pub fail_after_input: bool,
        pub written: Vec<u8>,
        pub closed: bool,
    }

    impl ScriptedStream {
        pub fn new(input: Vec<u8>) -> Self {
            Self {
                id: 0,
                input,
                pos: 0,
                chunk: 3,
                fail_after_input: false,
                written: Vec::new(),
                closed: false,
            }
        }
    }

    #[async_trait]
    impl Stream for ScriptedStream {
        fn id(&self) -> u64 {
            self.id
        }

        async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(buf);
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.input.len() {
                if self.fail_after_input {
                    return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
                }
                return Ok(0);
            }
            let n = buf.len().min(self.chunk).min(self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        async fn close(&mut self) -> io::Result<()> {
            self.closed = true;
            Ok(())
        }
    }
}
