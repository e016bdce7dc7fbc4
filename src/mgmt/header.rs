//! Fixed-layout management header codec.
//!
//! Wire format (8 bytes, multi-byte fields big-endian):
//! ```text
//! ┌──────┬───────┬────────────┬────────────┬─────┬─────┬──────────────┐
//! │ Op   │ Flags │ Length     │ Group      │ Seq │ Id  │ CBOR payload │
//! │ (1B) │ (1B)  │ (2B BE)    │ (2B BE)    │(1B) │(1B) │ (Length B)   │
//! └──────┴───────┴────────────┴────────────┴─────┴─────┴──────────────┘
//! ```
//!
//! Only the low three bits of the op byte carry the operation; the rest
//! are reserved. Even ops are commands, odd ops are their responses.

use core::fmt;

use crate::error::{MgmtError, Result};

/// Size of the encoded header.
pub const HEADER_SIZE: usize = 8;

const OP_MASK: u8 = 0x07;

/// Management operation carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Read = 0,
    ReadRsp = 1,
    Write = 2,
    WriteRsp = 3,
}

impl Op {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Read),
            1 => Some(Self::ReadRsp),
            2 => Some(Self::Write),
            3 => Some(Self::WriteRsp),
            _ => None,
        }
    }

    /// Commands have even op codes.
    pub const fn is_command(self) -> bool {
        (self as u8) % 2 == 0
    }

    /// The response op paired with this command op (responses map to
    /// themselves).
    pub const fn response(self) -> Self {
        match self {
            Self::Read | Self::ReadRsp => Self::ReadRsp,
            Self::Write | Self::WriteRsp => Self::WriteRsp,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::ReadRsp => "Read Rsp",
            Self::Write => "Write",
            Self::WriteRsp => "Write Rsp",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded (host byte order) management header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub op: Op,
    pub flags: u8,
    /// Payload length in bytes.
    pub len: u16,
    pub group: u16,
    /// Set by the sender, echoed verbatim by the responder.
    pub seq: u8,
    pub id: u8,
}

impl Header {
    /// Command header template; `len` and `seq` are stamped at send time.
    pub const fn command(op: Op, group: u16, id: u8) -> Self {
        Self {
            op,
            flags: 0,
            len: 0,
            group,
            seq: 0,
            id,
        }
    }

    /// Header for the response to this command, carrying `len` payload bytes.
    pub const fn response(&self, len: u16) -> Self {
        Self {
            op: self.op.response(),
            flags: 0,
            len,
            group: self.group,
            seq: self.seq,
            id: self.id,
        }
    }

    pub const fn is_command(&self) -> bool {
        self.op.is_command()
    }

    /// Encode into network byte order. Never fails.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let len = self.len.to_be_bytes();
        let group = self.group.to_be_bytes();
        [
            self.op as u8,
            self.flags,
            len[0],
            len[1],
            group[0],
            group[1],
            self.seq,
            self.id,
        ]
    }

    /// Decode the leading header of `buf`.
    ///
    /// A buffer shorter than [`HEADER_SIZE`] or an unknown op is a
    /// framing error.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let Some(raw) = buf.get(..HEADER_SIZE) else {
            return Err(MgmtError::Corrupt);
        };
        let op = Op::from_u8(raw[0] & OP_MASK).ok_or(MgmtError::Corrupt)?;
        Ok(Self {
            op,
            flags: raw[1],
            len: u16::from_be_bytes([raw[2], raw[3]]),
            group: u16::from_be_bytes([raw[4], raw[5]]),
            seq: raw[6],
            id: raw[7],
        })
    }
}

/// Split a frame into its header and exactly `len` payload bytes.
pub fn split_frame(frame: &[u8]) -> Result<(Header, &[u8])> {
    let header = Header::decode(frame)?;
    let payload = &frame[HEADER_SIZE..];
    if payload.len() != usize::from(header.len) {
        return Err(MgmtError::Corrupt);
    }
    Ok((header, payload))
}

/// Append `header` and `payload` into one contiguous frame.
pub fn encode_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(payload);
    frame
}
