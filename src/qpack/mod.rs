// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! QPACK field section compression (RFC 9204), static table only.
//!
//! The client announces a zero-capacity dynamic table, so a compliant server
//! only ever emits static references and literals. Dynamic references are
//! rejected as a decompression failure.

pub mod huffman;
pub mod integer;
pub mod static_table;

use log::trace;

use crate::error::{RaceError, RaceResult};
use static_table::Lookup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: Vec<u8>,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Header block compression as consumed by the request framer and the
/// response reader.
pub trait HeaderCodec: Send + Sync {
    fn compress(&self, fields: &[HeaderField]) -> RaceResult<Vec<u8>>;

    fn decompress_full(&self, block: &[u8]) -> RaceResult<Vec<HeaderField>>;
}

#[derive(Debug, Clone, Copy)]
pub struct StaticQpack {
    huffman: bool,
}

impl StaticQpack {
    pub fn new() -> Self {
        Self { huffman: true }
    }

    /// Literal strings are sent Huffman-coded only when that is shorter.
    pub fn with_huffman(mut self, huffman: bool) -> Self {
        self.huffman = huffman;
        self
    }

    /// String literal with its H flag at `h_flag` and length prefix of
    /// `prefix_bits`, the first byte's high bits carried in `flags`.
    fn encode_string(&self, raw: &[u8], prefix_bits: u8, flags: u8, h_flag: u8, out: &mut Vec<u8>) {
        if self.huffman && huffman::encoded_len(raw) < raw.len() {
            let coded = huffman::encode(raw);
            integer::encode(coded.len() as u64, prefix_bits, flags | h_flag, out);
            out.extend_from_slice(&coded);
        } else {
            integer::encode(raw.len() as u64, prefix_bits, flags, out);
            out.extend_from_slice(raw);
        }
    }
}

impl Default for StaticQpack {
    fn default() -> Self {
        Self::new()
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> RaceResult<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| RaceError::Decompression("truncated field line".to_string()))
    }

    fn integer(&mut self, prefix_bits: u8) -> RaceResult<u64> {
        let (value, used) = integer::decode(&self.buf[self.pos..], prefix_bits)?;
        self.pos += used;
        Ok(value)
    }

    /// Reads a string literal whose H bit sits at `h_flag` in the first byte.
    fn string(&mut self, prefix_bits: u8, h_flag: u8) -> RaceResult<Vec<u8>> {
        let huffman_coded = self.peek()? & h_flag != 0;
        let len = self.integer(prefix_bits)? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| RaceError::Decompression("string literal overruns block".to_string()))?;
        let raw = &self.buf[self.pos..end];
        self.pos = end;
        if huffman_coded {
            huffman::decode(raw)
        } else {
            Ok(raw.to_vec())
        }
    }

    fn done(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

fn static_entry(index: u64) -> RaceResult<(&'static str, &'static str)> {
    static_table::entry(index)
        .ok_or_else(|| RaceError::Decompression(format!("static index {} out of range", index)))
}

fn field_name(raw: Vec<u8>) -> RaceResult<String> {
    String::from_utf8(raw)
        .map_err(|_| RaceError::Decompression("field name is not valid UTF-8".to_string()))
}

impl HeaderCodec for StaticQpack {
    fn compress(&self, fields: &[HeaderField]) -> RaceResult<Vec<u8>> {
        // Required Insert Count = 0, Delta Base = 0
        let mut out = vec![0x00, 0x00];
        for field in fields {
            let value = std::str::from_utf8(&field.value).ok();
            let lookup = match value {
                Some(v) => static_table::lookup(&field.name, v),
                None => match static_table::lookup(&field.name, "") {
                    Lookup::Exact(i) | Lookup::Name(i) => Lookup::Name(i),
                    Lookup::Miss => Lookup::Miss,
                },
            };
            match lookup {
                // 1 T=1 index(6)
                Lookup::Exact(index) => integer::encode(index as u64, 6, 0b1100_0000, &mut out),
                // 01 N=0 T=1 index(4), then H + length(7)
                Lookup::Name(index) => {
                    integer::encode(index as u64, 4, 0b0101_0000, &mut out);
                    self.encode_string(&field.value, 7, 0, 0b1000_0000, &mut out);
                }
                // 001 N=0 H length(3), then H + length(7)
                Lookup::Miss => {
                    self.encode_string(field.name.as_bytes(), 3, 0b0010_0000, 0b0000_1000, &mut out);
                    self.encode_string(&field.value, 7, 0, 0b1000_0000, &mut out);
                }
            }
        }
        trace!("qpack: {} fields -> {} bytes", fields.len(), out.len());
        Ok(out)
    }

    fn decompress_full(&self, block: &[u8]) -> RaceResult<Vec<HeaderField>> {
        let mut cur = Cursor { buf: block, pos: 0 };

        let required_insert_count = cur.integer(8)?;
        if required_insert_count != 0 {
            return Err(RaceError::Decompression(format!(
                "dynamic table required (insert count {})",
                required_insert_count
            )));
        }
        cur.integer(7)?;

        let mut fields = Vec::new();
        while !cur.done() {
            let first = cur.peek()?;
            if first & 0b1000_0000 != 0 {
                if first & 0b0100_0000 == 0 {
                    return Err(RaceError::Decompression(
                        "dynamic table reference".to_string(),
                    ));
                }
                let (name, value) = static_entry(cur.integer(6)?)?;
                fields.push(HeaderField::new(name, value));
            } else if first & 0b1100_0000 == 0b0100_0000 {
                if first & 0b0001_0000 == 0 {
                    return Err(RaceError::Decompression(
                        "dynamic table name reference".to_string(),
                    ));
                }
                let (name, _) = static_entry(cur.integer(4)?)?;
                let value = cur.string(7, 0b1000_0000)?;
                fields.push(HeaderField::new(name, value));
            } else if first & 0b1110_0000 == 0b0010_0000 {
                let name = field_name(cur.string(3, 0b0000_1000)?)?;
                let value = cur.string(7, 0b1000_0000)?;
                fields.push(HeaderField { name, value });
            } else {
                return Err(RaceError::Decompression(format!(
                    "post-base field line 0x{:02x}",
                    first
                )));
            }
        }
        Ok(fields)
    }
}
