// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Address options and byte-order codecs.
//!
//! A tag address is an opaque protocol string except for its trailing
//! *address option*, selected by the tag's declared type:
//!
//! | type class            | suffix            | default |
//! |-----------------------|-------------------|---------|
//! | `STRING`              | `.<len><H\|L\|D\|E>` | `H`  |
//! | `BYTES`               | `.<len>`          | n/a     |
//! | 16-bit integer        | `#<B\|L>`         | `L`     |
//! | 32-bit integer, FLOAT | `#<BB\|BL\|LL\|LB>` | `LL`  |
//! | 64-bit integer, DOUBLE| `#<B\|L>`         | `L`     |
//! | `BIT`                 | `.<bit>` (optional) | n/a   |
//!
//! String mode `E` folds to `D`. The codecs below turn parsed options into
//! typed conversions so drivers never hand-roll byte swaps.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TagType;

// =============================================================================
// Errors
// =============================================================================

/// Address-option parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The type requires a suffix that is not present.
    #[error("address '{address}' is missing the option suffix for {tag_type}")]
    MissingOption {
        /// The offending address.
        address: String,
        /// The declared tag type.
        tag_type: TagType,
    },

    /// The length field is absent, zero or malformed.
    #[error("address '{address}' has an invalid length option")]
    InvalidLength {
        /// The offending address.
        address: String,
    },

    /// The destination buffer cannot hold the expanded string.
    #[error("expanded string needs {needed} bytes, buffer holds {available}")]
    BufferTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
}

/// Result alias for address operations.
pub type AddressResult<T> = Result<T, AddressError>;

// =============================================================================
// Option Types
// =============================================================================

/// Byte-order placement of string characters in 16-bit cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StringMode {
    /// Two characters per cell, high byte first.
    #[default]
    High,
    /// Two characters per cell, low byte first.
    Low,
    /// One character per cell, in the low byte.
    LowOnly,
}

/// Byte order of a 16-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Endian16 {
    /// Big-endian.
    Big,
    /// Little-endian.
    #[default]
    Little,
}

/// Combined byte/word order of a 32-bit value.
///
/// The first letter orders bytes within each 16-bit word, the second orders
/// the words themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Endian32 {
    /// Big bytes, big words (network order).
    BB,
    /// Big bytes, little words (word-swapped).
    BL,
    /// Little bytes, little words (fully reversed).
    #[default]
    LL,
    /// Little bytes, big words (byte-swapped within words).
    LB,
}

/// Byte order of a 64-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Endian64 {
    /// Big-endian.
    Big,
    /// Little-endian.
    #[default]
    Little,
}

/// The parsed view of a tag address suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AddressOption {
    /// The type carries no option.
    #[default]
    None,
    /// String length and cell layout.
    String {
        /// Number of characters.
        length: u16,
        /// Cell layout mode.
        mode: StringMode,
    },
    /// Byte-string length.
    Bytes {
        /// Number of bytes.
        length: u8,
    },
    /// 16-bit byte order.
    Endian16(Endian16),
    /// 32-bit byte/word order.
    Endian32(Endian32),
    /// 64-bit byte order.
    Endian64(Endian64),
    /// Optional bit index into a wider cell.
    Bit {
        /// Bit index, if given.
        bit: Option<u8>,
    },
}

impl fmt::Display for AddressOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressOption::None => write!(f, "-"),
            AddressOption::String { length, mode } => write!(f, ".{}{:?}", length, mode),
            AddressOption::Bytes { length } => write!(f, ".{}", length),
            AddressOption::Endian16(e) => write!(f, "#{:?}", e),
            AddressOption::Endian32(e) => write!(f, "#{:?}", e),
            AddressOption::Endian64(e) => write!(f, "#{:?}", e),
            AddressOption::Bit { bit } => match bit {
                Some(b) => write!(f, ".{}", b),
                None => write!(f, "-"),
            },
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses the address option of `address` as declared by `tag_type`.
///
/// Types outside the table return [`AddressOption::None`]. Missing endianness
/// suffixes fall back to the documented defaults; missing length suffixes on
/// `STRING`/`BYTES` are errors.
pub fn parse_address_option(address: &str, tag_type: TagType) -> AddressResult<AddressOption> {
    match tag_type {
        TagType::Bytes => {
            let suffix = last_suffix(address, '.').ok_or_else(|| AddressError::MissingOption {
                address: address.to_string(),
                tag_type,
            })?;
            let length: u8 = suffix.parse().map_err(|_| AddressError::InvalidLength {
                address: address.to_string(),
            })?;
            if length == 0 {
                return Err(AddressError::InvalidLength {
                    address: address.to_string(),
                });
            }
            Ok(AddressOption::Bytes { length })
        }
        TagType::String => {
            let suffix = last_suffix(address, '.').ok_or_else(|| AddressError::MissingOption {
                address: address.to_string(),
                tag_type,
            })?;
            let digits: String = suffix.chars().take_while(|c| c.is_ascii_digit()).collect();
            let length: u16 = digits.parse().map_err(|_| AddressError::InvalidLength {
                address: address.to_string(),
            })?;
            if length == 0 {
                return Err(AddressError::InvalidLength {
                    address: address.to_string(),
                });
            }
            // E maps onto D: one character per cell either way once decoded.
            let mode = match suffix[digits.len()..].chars().next() {
                Some('L') => StringMode::Low,
                Some('D') | Some('E') => StringMode::LowOnly,
                _ => StringMode::High,
            };
            Ok(AddressOption::String { length, mode })
        }
        t if t.is_16bit() => {
            let endian = match last_suffix(address, '#').and_then(|s| s.chars().next()) {
                Some('B') => Endian16::Big,
                _ => Endian16::Little,
            };
            Ok(AddressOption::Endian16(endian))
        }
        t if t.is_32bit() => {
            let mut chars = last_suffix(address, '#')
                .map(|s| s.chars().collect::<Vec<_>>())
                .unwrap_or_default();
            chars.truncate(2);
            let endian = match chars.as_slice() {
                ['B', 'B'] => Endian32::BB,
                ['B', 'L'] => Endian32::BL,
                ['L', 'B'] => Endian32::LB,
                _ => Endian32::LL,
            };
            Ok(AddressOption::Endian32(endian))
        }
        t if t.is_64bit() => {
            let endian = match last_suffix(address, '#').and_then(|s| s.chars().next()) {
                Some('B') => Endian64::Big,
                _ => Endian64::Little,
            };
            Ok(AddressOption::Endian64(endian))
        }
        TagType::Bit => {
            let bit = last_suffix(address, '.').and_then(|s| s.parse::<u8>().ok());
            Ok(AddressOption::Bit { bit })
        }
        _ => Ok(AddressOption::None),
    }
}

/// Returns the text after the last occurrence of `marker`, if any.
fn last_suffix(address: &str, marker: char) -> Option<&str> {
    address.rfind(marker).map(|idx| &address[idx + 1..])
}

// =============================================================================
// Numeric Codecs
// =============================================================================

/// Decodes a 16-bit value from its raw device bytes.
#[inline]
pub fn decode_u16(bytes: [u8; 2], endian: Endian16) -> u16 {
    match endian {
        Endian16::Big => u16::from_be_bytes(bytes),
        Endian16::Little => u16::from_le_bytes(bytes),
    }
}

/// Encodes a 16-bit value to its raw device bytes.
#[inline]
pub fn encode_u16(value: u16, endian: Endian16) -> [u8; 2] {
    match endian {
        Endian16::Big => value.to_be_bytes(),
        Endian16::Little => value.to_le_bytes(),
    }
}

/// Reorders four device bytes into network order.
///
/// All four layouts are involutions, so the same permutation serves both
/// decode and encode.
#[inline]
fn reorder32(b: [u8; 4], endian: Endian32) -> [u8; 4] {
    match endian {
        Endian32::BB => b,
        Endian32::BL => [b[2], b[3], b[0], b[1]],
        Endian32::LL => [b[3], b[2], b[1], b[0]],
        Endian32::LB => [b[1], b[0], b[3], b[2]],
    }
}

/// Decodes a 32-bit value from its raw device bytes.
#[inline]
pub fn decode_u32(bytes: [u8; 4], endian: Endian32) -> u32 {
    u32::from_be_bytes(reorder32(bytes, endian))
}

/// Encodes a 32-bit value to its raw device bytes.
#[inline]
pub fn encode_u32(value: u32, endian: Endian32) -> [u8; 4] {
    reorder32(value.to_be_bytes(), endian)
}

/// Decodes a 32-bit float from its raw device bytes.
#[inline]
pub fn decode_f32(bytes: [u8; 4], endian: Endian32) -> f32 {
    f32::from_bits(decode_u32(bytes, endian))
}

/// Encodes a 32-bit float to its raw device bytes.
#[inline]
pub fn encode_f32(value: f32, endian: Endian32) -> [u8; 4] {
    encode_u32(value.to_bits(), endian)
}

/// Decodes a 64-bit value from its raw device bytes.
#[inline]
pub fn decode_u64(bytes: [u8; 8], endian: Endian64) -> u64 {
    match endian {
        Endian64::Big => u64::from_be_bytes(bytes),
        Endian64::Little => u64::from_le_bytes(bytes),
    }
}

/// Encodes a 64-bit value to its raw device bytes.
#[inline]
pub fn encode_u64(value: u64, endian: Endian64) -> [u8; 8] {
    match endian {
        Endian64::Big => value.to_be_bytes(),
        Endian64::Little => value.to_le_bytes(),
    }
}

/// Decodes a 64-bit float from its raw device bytes.
#[inline]
pub fn decode_f64(bytes: [u8; 8], endian: Endian64) -> f64 {
    f64::from_bits(decode_u64(bytes, endian))
}

/// Encodes a 64-bit float to its raw device bytes.
#[inline]
pub fn encode_f64(value: f64, endian: Endian64) -> [u8; 8] {
    encode_u64(value.to_bits(), endian)
}

// =============================================================================
// String Cell Transforms
// =============================================================================

/// Byte-order transforms between string cell layouts.
///
/// Layout `H` packs two characters per 16-bit cell high byte first, `L` low
/// byte first; `D` places one character per cell in the low byte, `E` in the
/// high byte. Decoded text is validated with `std::str::from_utf8`,
/// the strict standard check.
pub mod string_order {
    use super::{AddressError, AddressResult};

    /// Swaps adjacent bytes in place (`H ↔ L`). A trailing odd byte stays.
    pub fn swap_pairs(data: &mut [u8]) {
        for pair in data.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }

    /// Moves each pair's high byte into the low position (`E → D`).
    pub fn shift_to_low(data: &mut [u8]) {
        for pair in data.chunks_exact_mut(2) {
            pair[1] = pair[0];
            pair[0] = 0;
        }
    }

    /// Moves each pair's low byte into the high position (`D → E`).
    pub fn shift_to_high(data: &mut [u8]) {
        for pair in data.chunks_exact_mut(2) {
            pair[0] = pair[1];
            pair[1] = 0;
        }
    }

    /// Compresses one-char-per-cell data stored in high bytes (`E → H`).
    pub fn compress_high(data: &[u8]) -> Vec<u8> {
        data.iter().step_by(2).copied().take_while(|b| *b != 0).collect()
    }

    /// Compresses one-char-per-cell data stored in low bytes (`D → H`).
    pub fn compress_low(data: &[u8]) -> Vec<u8> {
        data.iter().skip(1).step_by(2).copied().take_while(|b| *b != 0).collect()
    }

    /// Expands packed text into low bytes (`→ D`), one char per cell.
    ///
    /// The buffer must hold `2 * src.len()` bytes.
    pub fn expand_low(src: &[u8], buf: &mut [u8]) -> AddressResult<usize> {
        let needed = src.len() * 2;
        if needed > buf.len() {
            return Err(AddressError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        buf[..needed].fill(0);
        for (i, b) in src.iter().enumerate() {
            buf[i * 2 + 1] = *b;
        }
        Ok(needed)
    }

    /// Expands packed text into high bytes (`→ E`), one char per cell.
    ///
    /// The buffer must hold `2 * src.len()` bytes.
    pub fn expand_high(src: &[u8], buf: &mut [u8]) -> AddressResult<usize> {
        let needed = src.len() * 2;
        if needed > buf.len() {
            return Err(AddressError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        buf[..needed].fill(0);
        for (i, b) in src.iter().enumerate() {
            buf[i * 2] = *b;
        }
        Ok(needed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_option() {
        let opt = parse_address_option("4!400010.20H", TagType::String).unwrap();
        assert_eq!(
            opt,
            AddressOption::String {
                length: 20,
                mode: StringMode::High
            }
        );
    }

    #[test]
    fn test_parse_string_mode_e_folds_to_d() {
        let opt = parse_address_option("4!400010.20E", TagType::String).unwrap();
        assert_eq!(
            opt,
            AddressOption::String {
                length: 20,
                mode: StringMode::LowOnly
            }
        );
        let d = parse_address_option("4!400010.20D", TagType::String).unwrap();
        assert_eq!(opt, d);
    }

    #[test]
    fn test_parse_string_default_mode() {
        let opt = parse_address_option("1!40001.8", TagType::String).unwrap();
        assert_eq!(
            opt,
            AddressOption::String {
                length: 8,
                mode: StringMode::High
            }
        );
    }

    #[test]
    fn test_parse_string_missing_length() {
        assert!(parse_address_option("1!40001", TagType::String).is_err());
        assert!(parse_address_option("1!40001.0H", TagType::String).is_err());
    }

    #[test]
    fn test_parse_bytes_option() {
        let opt = parse_address_option("1!40001.16", TagType::Bytes).unwrap();
        assert_eq!(opt, AddressOption::Bytes { length: 16 });
        assert!(parse_address_option("1!40001", TagType::Bytes).is_err());
    }

    #[test]
    fn test_parse_endian16() {
        assert_eq!(
            parse_address_option("1!40001#B", TagType::Int16).unwrap(),
            AddressOption::Endian16(Endian16::Big)
        );
        assert_eq!(
            parse_address_option("1!40001", TagType::Word).unwrap(),
            AddressOption::Endian16(Endian16::Little)
        );
    }

    #[test]
    fn test_parse_endian32_combos() {
        for (suffix, want) in [
            ("#BB", Endian32::BB),
            ("#BL", Endian32::BL),
            ("#LL", Endian32::LL),
            ("#LB", Endian32::LB),
        ] {
            let addr = format!("1!40001{}", suffix);
            assert_eq!(
                parse_address_option(&addr, TagType::Float).unwrap(),
                AddressOption::Endian32(want)
            );
        }
        assert_eq!(
            parse_address_option("1!40001", TagType::Uint32).unwrap(),
            AddressOption::Endian32(Endian32::LL)
        );
    }

    #[test]
    fn test_parse_endian64() {
        assert_eq!(
            parse_address_option("1!40001#B", TagType::Double).unwrap(),
            AddressOption::Endian64(Endian64::Big)
        );
        assert_eq!(
            parse_address_option("1!40001", TagType::Lword).unwrap(),
            AddressOption::Endian64(Endian64::Little)
        );
    }

    #[test]
    fn test_parse_bit_option() {
        assert_eq!(
            parse_address_option("1!40001.3", TagType::Bit).unwrap(),
            AddressOption::Bit { bit: Some(3) }
        );
        assert_eq!(
            parse_address_option("1!40001", TagType::Bit).unwrap(),
            AddressOption::Bit { bit: None }
        );
    }

    #[test]
    fn test_parse_no_option_types() {
        assert_eq!(
            parse_address_option("1!00001", TagType::Bool).unwrap(),
            AddressOption::None
        );
    }

    #[test]
    fn test_u16_round_trip() {
        for endian in [Endian16::Big, Endian16::Little] {
            for v in [0u16, 1, 0x1234, u16::MAX] {
                assert_eq!(decode_u16(encode_u16(v, endian), endian), v);
            }
        }
    }

    #[test]
    fn test_u32_round_trip_all_orders() {
        for endian in [Endian32::BB, Endian32::BL, Endian32::LL, Endian32::LB] {
            for v in [0u32, 1, 0xdead_beef, u32::MAX] {
                assert_eq!(decode_u32(encode_u32(v, endian), endian), v);
            }
            let f = -123.456_f32;
            assert_eq!(decode_f32(encode_f32(f, endian), endian), f);
        }
    }

    #[test]
    fn test_u64_round_trip() {
        for endian in [Endian64::Big, Endian64::Little] {
            for v in [0u64, 1, 0x0123_4567_89ab_cdef, u64::MAX] {
                assert_eq!(decode_u64(encode_u64(v, endian), endian), v);
            }
            let f = 2.718281828_f64;
            assert_eq!(decode_f64(encode_f64(f, endian), endian), f);
        }
    }

    #[test]
    fn test_endian32_byte_layouts() {
        // 0x01020304 across the four layouts.
        assert_eq!(encode_u32(0x0102_0304, Endian32::BB), [1, 2, 3, 4]);
        assert_eq!(encode_u32(0x0102_0304, Endian32::BL), [3, 4, 1, 2]);
        assert_eq!(encode_u32(0x0102_0304, Endian32::LL), [4, 3, 2, 1]);
        assert_eq!(encode_u32(0x0102_0304, Endian32::LB), [2, 1, 4, 3]);
    }

    #[test]
    fn test_string_swap_pairs() {
        let mut data = *b"badc";
        string_order::swap_pairs(&mut data);
        assert_eq!(&data, b"abcd");
        // Involution.
        string_order::swap_pairs(&mut data);
        assert_eq!(&data, b"badc");
    }

    #[test]
    fn test_string_compress_expand() {
        let mut buf = [0u8; 8];
        let n = string_order::expand_low(b"abcd", &mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf, &[0, b'a', 0, b'b', 0, b'c', 0, b'd']);
        assert_eq!(string_order::compress_low(&buf), b"abcd");

        let n = string_order::expand_high(b"ab", &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], &[b'a', 0, b'b', 0]);
        assert_eq!(string_order::compress_high(&buf[..4]), b"ab");
    }

    #[test]
    fn test_string_expand_guard() {
        let mut buf = [0u8; 4];
        let err = string_order::expand_low(b"abc", &mut buf).unwrap_err();
        assert_eq!(
            err,
            AddressError::BufferTooSmall {
                needed: 6,
                available: 4
            }
        );
    }

    #[test]
    fn test_string_shift_within_pairs() {
        let mut data = [b'a', 0, b'b', 0];
        string_order::shift_to_low(&mut data);
        assert_eq!(&data, &[0, b'a', 0, b'b']);
        string_order::shift_to_high(&mut data);
        assert_eq!(&data, &[b'a', 0, b'b', 0]);
    }
}
