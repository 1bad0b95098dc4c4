// File: varint.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! QUIC / HTTP/3 variable-length integers.
//!
//! | 2MSB | Length | Usable bits | Range               |
//! |------|--------|-------------|---------------------|
//! | 00   | 1      | 6           | 0..=63              |
//! | 01   | 2      | 14          | 0..=16383           |
//! | 10   | 4      | 30          | 0..=1073741823      |
//! | 11   | 8      | 62          | 0..=2^62-1          |

use crate::error::{RaceError, RaceResult};
use crate::transport::{read_full, Stream};

pub const MAX_VARINT: u64 = (1 << 62) - 1;

pub const fn varint_len(value: u64) -> usize {
    if value <= 63 {
        1
    } else if value <= 16_383 {
        2
    } else if value <= 1_073_741_823 {
        4
    } else {
        8
    }
}

/// Canonical encoding of `value`. Negative values and values that do not fit
/// in 62 bits are rejected.
pub fn encode(value: i64) -> RaceResult<Vec<u8>> {
    if value < 0 || value as u64 > MAX_VARINT {
        return Err(RaceError::InvalidInteger(value));
    }
    let mut out = Vec::with_capacity(8);
    encode_into(value as u64, &mut out)?;
    Ok(out)
}

pub fn encode_into(value: u64, out: &mut Vec<u8>) -> RaceResult<()> {
    if value > MAX_VARINT {
        return Err(RaceError::InvalidInteger(value as i64));
    }
    match varint_len(value) {
        1 => out.push(value as u8),
        2 => {
            let bytes = (value as u16).to_be_bytes();
            out.push(bytes[0] | 0x40);
            out.push(bytes[1]);
        }
        4 => {
            let bytes = (value as u32).to_be_bytes();
            out.push(bytes[0] | 0x80);
            out.extend_from_slice(&bytes[1..]);
        }
        _ => {
            let bytes = value.to_be_bytes();
            out.push(bytes[0] | 0xc0);
            out.extend_from_slice(&bytes[1..]);
        }
    }
    Ok(())
}

/// Width in bytes announced by the first byte of an encoding.
fn width_from_first(first: u8) -> usize {
    1 << (first >> 6)
}

fn assemble(first: u8, rest: &[u8]) -> u64 {
    rest.iter()
        .fold(u64::from(first & 0x3f), |acc, &b| (acc << 8) | u64::from(b))
}

/// Decodes one varint from the start of `buf`, returning `(value, consumed)`.
pub fn decode(buf: &[u8]) -> RaceResult<(u64, usize)> {
    let first = *buf.first().ok_or(RaceError::TruncatedInput {
        needed: 1,
        available: 0,
    })?;
    let len = width_from_first(first);
    if buf.len() < len {
        return Err(RaceError::TruncatedInput {
            needed: len,
            available: buf.len(),
        });
    }
    Ok((assemble(first, &buf[1..len]), len))
}

/// Reads one varint from a stream.
pub async fn read_varint(stream: &mut dyn Stream) -> RaceResult<u64> {
    let mut first = [0u8; 1];
    if read_full(stream, &mut first).await? == 0 {
        return Err(RaceError::TruncatedInput {
            needed: 1,
            available: 0,
        });
    }
    let len = width_from_first(first[0]);
    let mut rest = [0u8; 7];
    let got = read_full(stream, &mut rest[..len - 1]).await?;
    if got < len - 1 {
        return Err(RaceError::TruncatedInput {
            needed: len,
            available: got + 1,
        });
    }
    Ok(assemble(first[0], &rest[..len - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(63, 1)]
    #[case(64, 2)]
    #[case(16_383, 2)]
    #[case(16_384, 4)]
    #[case(1_073_741_823, 4)]
    #[case(1_073_741_824, 8)]
    #[case(MAX_VARINT as i64, 8)]
    fn test_canonical_width(#[case] value: i64, #[case] width: usize) {
        let encoded = encode(value).unwrap();
        assert_eq!(encoded.len(), width);
        assert_eq!(varint_len(value as u64), width);
        let (decoded, consumed) = decode(&encoded).unwrap();
        assert_eq!(decoded, value as u64);
        assert_eq!(consumed, width);
    }

    #[test]
    fn test_rfc9000_vectors() {
        let (v, len) = decode(&[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c]).unwrap();
        assert_eq!((v, len), (151_288_809_941_952_652, 8));
        let (v, len) = decode(&[0x9d, 0x7f, 0x3e, 0x7d]).unwrap();
        assert_eq!((v, len), (494_878_333, 4));
        let (v, len) = decode(&[0x7b, 0xbd]).unwrap();
        assert_eq!((v, len), (15_293, 2));
        let (v, len) = decode(&[0x25]).unwrap();
        assert_eq!((v, len), (37, 1));

        assert_eq!(encode(15_293).unwrap(), vec![0x7b, 0xbd]);
        assert_eq!(encode(494_878_333).unwrap(), vec![0x9d, 0x7f, 0x3e, 0x7d]);
    }

    #[test]
    fn test_non_canonical_decodes() {
        // 37 in the two byte class
        let (v, len) = decode(&[0x40, 0x25]).unwrap();
        assert_eq!((v, len), (37, 2));
    }

    #[test]
    fn test_negative_rejected() {
        assert!(matches!(encode(-1), Err(RaceError::InvalidInteger(-1))));
        assert!(matches!(
            encode(i64::MIN),
            Err(RaceError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_too_large_rejected() {
        assert!(matches!(
            encode(MAX_VARINT as i64 + 1),
            Err(RaceError::InvalidInteger(_))
        ));
        let mut out = Vec::new();
        assert!(encode_into(u64::MAX, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(
            decode(&[]),
            Err(RaceError::TruncatedInput { needed: 1, .. })
        ));
        assert!(matches!(
            decode(&[0x80, 0x01]),
            Err(RaceError::TruncatedInput {
                needed: 4,
                available: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_read_varint_from_stream() {
        use crate::transport::scripted::ScriptedStream;

        let mut input = encode(1_000_000).unwrap();
        input.extend(encode(5).unwrap());
        let mut stream = ScriptedStream::new(input);
        stream.chunk = 1;
        assert_eq!(read_varint(&mut stream).await.unwrap(), 1_000_000);
        assert_eq!(read_varint(&mut stream).await.unwrap(), 5);
        assert!(matches!(
            read_varint(&mut stream).await,
            Err(RaceError::TruncatedInput { needed: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_varint_truncated_class() {
        use crate::transport::scripted::ScriptedStream;

        let mut stream = ScriptedStream::new(vec![0xc0, 0x00, 0x01]);
        assert!(matches!(
            read_varint(&mut stream).await,
            Err(RaceError::TruncatedInput {
                needed: 8,
                available: 3
            })
        ));
    }
}
