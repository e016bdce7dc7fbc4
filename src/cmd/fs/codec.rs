//! CBOR bodies for the file command.
//!
//! | Direction | Body |
//! |-----------|------|
//! | download cmd | `{"off": uint, "name": tstr}` |
//! | download rsp | `{"off": uint, "data": bstr, "len": uint}` (`len` on `off == 0` only) or `{"rc": int}` |
//! | upload cmd   | `{"off": uint, "data": bstr, "name": tstr, "len": uint}` (`len` on `off == 0` only) |
//! | upload rsp   | `{"rc": int, "off": uint}` |

use minicbor::{Decoder, decode};

use crate::error::{MgmtError, Result};
use crate::mgmt::cbor::{self, EncodeError};

fn to_usize(d: &mut Decoder<'_>) -> core::result::Result<usize, decode::Error> {
    let v = d.u64()?;
    usize::try_from(v).map_err(|_| decode::Error::message("offset out of range"))
}

// ── Download ─────────────────────────────────────────────────

/// A download request as seen by the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReq<'a> {
    pub name: &'a str,
    pub off: usize,
}

/// One chunk returned by the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadChunk {
    pub off: usize,
    pub data: Vec<u8>,
    /// Total object length; present on the first chunk only.
    pub len: Option<usize>,
}

/// Decoded download response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadReply {
    Chunk(DownloadChunk),
    Rejected(MgmtError),
}

pub fn encode_download_req(name: &str, off: usize) -> Result<Vec<u8>> {
    fn build(name: &str, off: usize) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = cbor::encoder();
        e.map(2)?.str("off")?.u64(off as u64)?.str("name")?.str(name)?;
        Ok(e.into_writer())
    }
    Ok(build(name, off)?)
}

pub fn decode_download_req(body: &[u8]) -> Result<DownloadReq<'_>> {
    let mut name = None;
    let mut off = None;
    cbor::decode_map(body, |key, d| {
        match key {
            "name" => name = Some(d.str()?),
            "off" => off = Some(to_usize(d)?),
            _ => d.skip()?,
        }
        Ok(())
    })?;
    match (name, off) {
        (Some(name), Some(off)) => Ok(DownloadReq { name, off }),
        _ => Err(MgmtError::InvalidArgument),
    }
}

pub fn encode_download_rsp(off: usize, data: &[u8], len: Option<usize>) -> Result<Vec<u8>> {
    fn build(off: usize, data: &[u8], len: Option<usize>) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = cbor::encoder();
        e.map(if len.is_some() { 3 } else { 2 })?
            .str("off")?
            .u64(off as u64)?
            .str("data")?
            .bytes(data)?;
        if let Some(len) = len {
            e.str("len")?.u64(len as u64)?;
        }
        Ok(e.into_writer())
    }
    Ok(build(off, data, len)?)
}

pub fn decode_download_rsp(body: &[u8]) -> Result<DownloadReply> {
    let mut rc = None;
    let mut off = None;
    let mut data = None;
    let mut len = None;
    cbor::decode_map(body, |key, d| {
        match key {
            "rc" => rc = Some(d.i32()?),
            "off" => off = Some(to_usize(d)?),
            "data" => data = Some(d.bytes()?),
            "len" => len = Some(to_usize(d)?),
            _ => d.skip()?,
        }
        Ok(())
    })?;

    if let Some(err) = rc.and_then(MgmtError::from_code) {
        return Ok(DownloadReply::Rejected(err));
    }
    match (off, data) {
        (Some(off), Some(data)) => Ok(DownloadReply::Chunk(DownloadChunk {
            off,
            data: data.to_vec(),
            len,
        })),
        _ => Err(MgmtError::Decode),
    }
}

// ── Upload ───────────────────────────────────────────────────

/// One upload chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReq<'a> {
    pub name: &'a str,
    pub off: usize,
    pub data: &'a [u8],
    /// Total object length; sent with the first chunk only.
    pub len: Option<usize>,
}

/// Decoded upload response: either the next offset the responder expects
/// or the reason it refused the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAck {
    Accepted { off: usize },
    Rejected(MgmtError),
}

pub fn encode_upload_req(req: &UploadReq<'_>) -> Result<Vec<u8>> {
    fn build(req: &UploadReq<'_>) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = cbor::encoder();
        e.map(if req.len.is_some() { 4 } else { 3 })?
            .str("off")?
            .u64(req.off as u64)?
            .str("data")?
            .bytes(req.data)?
            .str("name")?
            .str(req.name)?;
        if let Some(len) = req.len {
            e.str("len")?.u64(len as u64)?;
        }
        Ok(e.into_writer())
    }
    Ok(build(req)?)
}

pub fn decode_upload_req(body: &[u8]) -> Result<UploadReq<'_>> {
    let mut name = None;
    let mut off = None;
    let mut data = None;
    let mut len = None;
    cbor::decode_map(body, |key, d| {
        match key {
            "name" => name = Some(d.str()?),
            "off" => off = Some(to_usize(d)?),
            "data" => data = Some(d.bytes()?),
            "len" => len = Some(to_usize(d)?),
            _ => d.skip()?,
        }
        Ok(())
    })?;
    match (name, off, data) {
        (Some(name), Some(off), Some(data)) => Ok(UploadReq {
            name,
            off,
            data,
            len,
        }),
        _ => Err(MgmtError::InvalidArgument),
    }
}

pub fn encode_upload_ack(ack: UploadAck) -> Vec<u8> {
    fn build(off: usize) -> core::result::Result<Vec<u8>, EncodeError> {
        let mut e = cbor::encoder();
        e.map(2)?.str("rc")?.i32(0)?.str("off")?.u64(off as u64)?;
        Ok(e.into_writer())
    }
    match ack {
        UploadAck::Accepted { off } => build(off).unwrap_or_default(),
        UploadAck::Rejected(err) => cbor::encode_rc(err.code()),
    }
}

pub fn decode_upload_ack(body: &[u8]) -> Result<UploadAck> {
    let mut rc = None;
    let mut off = None;
    cbor::decode_map(body, |key, d| {
        match key {
            "rc" => rc = Some(d.i32()?),
            "off" => off = Some(to_usize(d)?),
            _ => d.skip()?,
        }
        Ok(())
    })?;

    if let Some(err) = rc.and_then(MgmtError::from_code) {
        return Ok(UploadAck::Rejected(err));
    }
    off.map(|off| UploadAck::Accepted { off })
        .ok_or(MgmtError::Decode)
}
