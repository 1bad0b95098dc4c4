// File: integer.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Prefix integers (RFC 7541 §5.1), shared by HPACK and QPACK.

use crate::error::{RaceError, RaceResult};

/// Appends `value` using the low `prefix_bits` of a first byte whose high bits
/// are `flags`.
pub fn encode(value: u64, prefix_bits: u8, flags: u8, out: &mut Vec<u8>) {
    debug_assert!((1..=8).contains(&prefix_bits));
    let max_prefix = (1u64 << prefix_bits) - 1;
    if value < max_prefix {
        out.push(flags | value as u8);
        return;
    }
    out.push(flags | max_prefix as u8);
    let mut remaining = value - max_prefix;
    while remaining >= 128 {
        out.push(0x80 | (remaining & 0x7f) as u8);
        remaining >>= 7;
    }
    out.push(remaining as u8);
}

/// Decodes a prefix integer starting at `buf[0]`, returning `(value, consumed)`.
pub fn decode(buf: &[u8], prefix_bits: u8) -> RaceResult<(u64, usize)> {
    debug_assert!((1..=8).contains(&prefix_bits));
    let first = *buf
        .first()
        .ok_or_else(|| RaceError::Decompression("empty prefix integer".to_string()))?;
    let max_prefix = (1u64 << prefix_bits) - 1;
    let mut value = u64::from(first) & max_prefix;
    if value < max_prefix {
        return Ok((value, 1));
    }

    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate().skip(1) {
        if shift > 56 {
            return Err(RaceError::Decompression(
                "prefix integer overflow".to_string(),
            ));
        }
        value += u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(RaceError::Decompression(
        "truncated prefix integer".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7541_c1_vectors() {
        // C.1.1: 10 with a 5-bit prefix
        let mut out = Vec::new();
        encode(10, 5, 0, &mut out);
        assert_eq!(out, vec![0x0a]);

        // C.1.2: 1337 with a 5-bit prefix
        let mut out = Vec::new();
        encode(1337, 5, 0, &mut out);
        assert_eq!(out, vec![0x1f, 0x9a, 0x0a]);
        assert_eq!(decode(&out, 5).unwrap(), (1337, 3));

        // C.1.3: 42 starting at an octet boundary
        let mut out = Vec::new();
        encode(42, 8, 0, &mut out);
        assert_eq!(out, vec![0x2a]);
    }

    #[test]
    fn test_flags_preserved() {
        let mut out = Vec::new();
        encode(17, 6, 0b1100_0000, &mut out);
        assert_eq!(out, vec![0xd1]);
        assert_eq!(decode(&out, 6).unwrap(), (17, 1));
    }

    #[test]
    fn test_boundary_value_needs_continuation() {
        let mut out = Vec::new();
        encode(15, 4, 0, &mut out);
        assert_eq!(out, vec![0x0f, 0x00]);
        assert_eq!(decode(&out, 4).unwrap(), (15, 2));
    }

    #[test]
    fn test_truncated_and_empty() {
        assert!(decode(&[], 7).is_err());
        assert!(decode(&[0x7f, 0x80], 7).is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        let mut buf = vec![0xff];
        buf.extend(std::iter::repeat(0xff).take(12));
        buf.push(0x01);
        assert!(decode(&buf, 8).is_err());
    }
}
