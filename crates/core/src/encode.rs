//! Secret encoding
//!
//! The hashed bytes are the Michelson `PACK` of an `int` literal:
//!
//! ```text
//! 0x05 || 0x00 || zarith(secret)
//! ^^^^    ^^^^    ^^^^^^^^^^^^^^
//! pack    Int     signed variable-length integer
//! ```
//!
//! Zarith: the first byte holds the 6 low magnitude bits, the sign (`0x40`)
//! and a continuation bit (`0x80`); every following byte holds 7 magnitude
//! bits plus a continuation bit.

use crate::error::EncodeError;
use crate::params::{INT_TAG, PACK_PREFIX};

/// Deterministic `secret -> bytes` step of the hash pipeline.
///
/// Implementations append to `out`; the caller clears it between nonces.
pub trait Encoder {
    fn encode(&self, secret: i128, out: &mut Vec<u8>) -> Result<(), EncodeError>;
}

impl<F> Encoder for F
where
    F: Fn(i128, &mut Vec<u8>) -> Result<(), EncodeError>,
{
    fn encode(&self, secret: i128, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        self(secret, out)
    }
}

/// Michelson `PACK` of an `int` literal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MichelsonInt;

impl Encoder for MichelsonInt {
    #[inline]
    fn encode(&self, secret: i128, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.push(PACK_PREFIX);
        out.push(INT_TAG);
        write_zarith(secret, out);
        Ok(())
    }
}

/// Pack a single integer, allocating a fresh buffer.
pub fn pack_int(secret: i128) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    out.push(PACK_PREFIX);
    out.push(INT_TAG);
    write_zarith(secret, &mut out);
    out
}

#[inline(always)]
fn write_zarith(value: i128, out: &mut Vec<u8>) {
    let mut magnitude = value.unsigned_abs();

    let mut first = (magnitude & 0x3F) as u8;
    if value < 0 {
        first |= 0x40;
    }
    magnitude >>= 6;
    if magnitude != 0 {
        first |= 0x80;
    }
    out.push(first);

    while magnitude != 0 {
        let mut byte = (magnitude & 0x7F) as u8;
        magnitude >>= 7;
        if magnitude != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}
