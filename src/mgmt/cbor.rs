//! Shared CBOR helpers for command bodies.
//!
//! Every body is a single CBOR map with text keys. Readers walk the map
//! entry by entry and skip keys they do not know, so peers can add fields
//! without breaking older decoders.

use core::convert::Infallible;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder, decode, encode};

use crate::error::{MgmtError, Result, Status};

/// Encoder writing into a growable buffer.
pub type CborEncoder = Encoder<Vec<u8>>;

/// Error type produced by [`CborEncoder`].
pub type EncodeError = encode::Error<Infallible>;

/// Fresh encoder over an empty buffer.
pub fn encoder() -> CborEncoder {
    Encoder::new(Vec::new())
}

/// `{"rc": code}`
pub fn encode_rc(code: i32) -> Vec<u8> {
    fn build(code: i32) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = encoder();
        e.map(1)?.str("rc")?.i32(code)?;
        Ok(e.into_writer())
    }
    // Writes into a Vec cannot fail.
    build(code).unwrap_or_default()
}

/// `{}`
pub fn empty_map() -> Vec<u8> {
    vec![0xA0]
}

/// Walk the top-level map of `body`, calling `entry(key, decoder)` for each
/// key. The callback must consume exactly one value (use
/// [`Decoder::skip`] for keys it ignores).
pub fn decode_map<'b, F>(body: &'b [u8], entry: F) -> Result<()>
where
    F: FnMut(&'b str, &mut Decoder<'b>) -> core::result::Result<(), decode::Error>,
{
    let mut d = Decoder::new(body);
    for_each_entry(&mut d, entry)?;
    Ok(())
}

/// Walk the map at the decoder's position. Usable for nested maps from
/// inside a [`decode_map`] callback.
pub fn for_each_entry<'b, F>(
    d: &mut Decoder<'b>,
    mut entry: F,
) -> core::result::Result<(), decode::Error>
where
    F: FnMut(&'b str, &mut Decoder<'b>) -> core::result::Result<(), decode::Error>,
{
    match d.map()? {
        Some(n) => {
            for _ in 0..n {
                let key = d.str()?;
                entry(key, d)?;
            }
        }
        None => {
            while d.datatype()? != Type::Break {
                let key = d.str()?;
                entry(key, d)?;
            }
            // break marker
            d.set_position(d.position() + 1);
        }
    }
    Ok(())
}

/// The `rc` member of `body`, if present.
pub fn find_rc(body: &[u8]) -> Result<Option<i32>> {
    let mut rc = None;
    decode_map(body, |key, d| {
        if key == "rc" {
            rc = Some(d.i32()?);
        } else {
            d.skip()?;
        }
        Ok(())
    })?;
    Ok(rc)
}

/// Status carried by a bare reply: absent or zero `rc` is success.
pub fn rc_status(body: &[u8]) -> Status {
    match find_rc(body)? {
        Some(code) => MgmtError::check_rc(code),
        None => Ok(()),
    }
}
