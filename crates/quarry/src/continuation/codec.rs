//! Continuation symbol codec.
//!
//! This module owns the printable wire alphabet and the integer packing used
//! by all continuation tokens. It intentionally contains only symbol-level
//! encoding/decoding logic and no pagination semantics.

use crate::MAX_CONTINUATION_TOKEN_LEN;
use thiserror::Error as ThisError;

/// Sixteen printable symbols, one per nibble.
const ALPHABET_BASE: u8 = b'A';
const ALPHABET_LAST: u8 = b'P';

/// Widest possible zigzag value is eight nibbles.
const MAX_VALUE_NIBBLES: u32 = 8;

///
/// ContinuationDecodeError
///

#[derive(Debug, Eq, ThisError, PartialEq)]
pub enum ContinuationDecodeError {
    #[error("continuation token is empty")]
    Empty,

    #[error("continuation token exceeds max length: {len} symbols (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("invalid continuation symbol at position {position}")]
    InvalidSymbol { position: usize },

    #[error("continuation token is truncated")]
    Truncated,

    #[error("integer length nibble out of range: {length}")]
    InvalidLength { length: u8 },

    #[error("result id index must be non-negative, found {value}")]
    NegativeIndex { value: i32 },

    #[error("unknown continuation flags: {flags}")]
    UnknownFlags { flags: i32 },
}

const fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

const fn zigzag_decode(zigzag: u32) -> i32 {
    ((zigzag >> 1) as i32) ^ -((zigzag & 1) as i32)
}

/// Append one integer: zigzag to unsigned, then a length nibble followed by
/// the value's big-endian nibbles with leading zeroes trimmed. The value 0
/// encodes as the bare length nibble.
pub(crate) fn encode_int(out: &mut String, value: i32) {
    let zigzag = zigzag_encode(value);
    let nibbles = if zigzag == 0 {
        0
    } else {
        (u32::BITS - zigzag.leading_zeros()).div_ceil(4)
    };

    out.push(symbol_for(nibbles as u8));
    for shift in (0..nibbles).rev() {
        out.push(symbol_for(((zigzag >> (shift * 4)) & 0xF) as u8));
    }
}

const fn symbol_for(nibble: u8) -> char {
    (ALPHABET_BASE + nibble) as char
}

const fn nibble_for(symbol: u8) -> Option<u8> {
    match symbol {
        ALPHABET_BASE..=ALPHABET_LAST => Some(symbol - ALPHABET_BASE),
        _ => None,
    }
}

///
/// SymbolReader
///
/// SymbolReader walks a validated continuation token, consuming one packed
/// integer at a time. Position reporting is 1-based, matching the token as
/// the caller typed it.
///

#[derive(Debug)]
pub(crate) struct SymbolReader<'a> {
    symbols: &'a [u8],
    pos: usize,
}

impl<'a> SymbolReader<'a> {
    /// Validate token shape (length bound only; symbols are validated as
    /// they are consumed) and position a reader at the start.
    pub(crate) fn new(token: &'a str) -> Result<Self, ContinuationDecodeError> {
        if token.len() > MAX_CONTINUATION_TOKEN_LEN {
            return Err(ContinuationDecodeError::TooLong {
                len: token.len(),
                max: MAX_CONTINUATION_TOKEN_LEN,
            });
        }

        Ok(Self {
            symbols: token.as_bytes(),
            pos: 0,
        })
    }

    #[must_use]
    pub(crate) const fn is_empty(&self) -> bool {
        self.pos >= self.symbols.len()
    }

    fn next_nibble(&mut self) -> Result<u8, ContinuationDecodeError> {
        let Some(&symbol) = self.symbols.get(self.pos) else {
            return Err(ContinuationDecodeError::Truncated);
        };
        let nibble = nibble_for(symbol).ok_or(ContinuationDecodeError::InvalidSymbol {
            position: self.pos + 1,
        })?;
        self.pos += 1;

        Ok(nibble)
    }

    /// Consume one packed integer.
    pub(crate) fn read_int(&mut self) -> Result<i32, ContinuationDecodeError> {
        let length = self.next_nibble()?;
        if u32::from(length) > MAX_VALUE_NIBBLES {
            return Err(ContinuationDecodeError::InvalidLength { length });
        }

        let mut zigzag = 0u32;
        for _ in 0..length {
            zigzag = (zigzag << 4) | u32::from(self.next_nibble()?);
        }

        Ok(zigzag_decode(zigzag))
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{ContinuationDecodeError, SymbolReader, encode_int};
    use proptest::prelude::*;

    fn decode_one(token: &str) -> Result<i32, ContinuationDecodeError> {
        let mut reader = SymbolReader::new(token)?;
        let value = reader.read_int()?;
        assert!(reader.is_empty(), "token should be fully consumed");
        Ok(value)
    }

    #[test]
    fn zero_encodes_as_bare_length_nibble() {
        let mut out = String::new();
        encode_int(&mut out, 0);
        assert_eq!(out, "A");
        assert_eq!(decode_one(&out).expect("zero should decode"), 0);
    }

    #[test]
    fn extreme_values_round_trip() {
        for value in [i32::MIN, i32::MAX, -1, 1, 42, -4711] {
            let mut out = String::new();
            encode_int(&mut out, value);
            assert_eq!(decode_one(&out).expect("value should decode"), value);
        }
    }

    #[test]
    fn invalid_symbol_is_reported_with_position() {
        let err = decode_one("Bz").expect_err("lowercase symbol should fail");
        assert_eq!(err, ContinuationDecodeError::InvalidSymbol { position: 2 });
    }

    #[test]
    fn truncated_value_is_rejected() {
        // Length nibble promises two value nibbles but only one follows.
        let err = decode_one("CB").expect_err("short token should fail");
        assert_eq!(err, ContinuationDecodeError::Truncated);
    }

    #[test]
    fn overlong_tokens_are_rejected_before_decoding() {
        let max = crate::MAX_CONTINUATION_TOKEN_LEN;
        let err = SymbolReader::new(&"A".repeat(max + 1)).expect_err("over the length bound");
        assert_eq!(err, ContinuationDecodeError::TooLong { len: max + 1, max });

        assert!(SymbolReader::new(&"A".repeat(max)).is_ok());
    }

    #[test]
    fn length_nibble_out_of_range_is_rejected() {
        // 'P' is length 15, wider than any 32-bit zigzag value.
        let err = decode_one("P").expect_err("length 15 should fail");
        assert_eq!(err, ContinuationDecodeError::InvalidLength { length: 15 });
    }

    proptest! {
        #[test]
        fn encode_decode_int_round_trips(value in any::<i32>()) {
            let mut out = String::new();
            encode_int(&mut out, value);
            prop_assert!(out.bytes().all(|b| (b'A'..=b'P').contains(&b)));
            prop_assert_eq!(decode_one(&out).expect("valid encoding"), value);
        }

        #[test]
        fn concatenated_ints_decode_in_order(values in prop::collection::vec(any::<i32>(), 0..16)) {
            let mut out = String::new();
            for value in &values {
                encode_int(&mut out, *value);
            }

            let mut reader = SymbolReader::new(&out).expect("token within bounds");
            for value in &values {
                prop_assert_eq!(reader.read_int().expect("valid encoding"), *value);
            }
            prop_assert!(reader.is_empty());
        }
    }
}
