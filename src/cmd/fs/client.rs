//! Originator-side file transfer.
//!
//! ```text
//!  download:  start ─▶ request(off) ─▶ await ─┬─▶ advance ─▶ request(off) …
//!                                             ├─▶ done (off == size)
//!                                             └─▶ fail
//!  upload:    start ─▶ send(off, chunk) ─▶ await ack ─┬─▶ advance …
//!                                                    ├─▶ done
//!                                                    └─▶ fail
//! ```
//!
//! Invariants held on every round: `0 ≤ off ≤ size` and each chunk fits
//! in `size − off`. The first download reply must declare the object
//! length; the first upload chunk declares it. The whole transfer runs
//! inside one call-engine session and stops at the first failure.

use core::fmt;

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{MgmtError, Status, TransportError};
use crate::mgmt::call::{CallEngine, ReplySlot, Session};
use crate::mgmt::group;
use crate::mgmt::header::{HEADER_SIZE, Header, Op};
use crate::mgmt::registry::{Group, Handler, MgmtCtxt, Role};
use crate::mgmt::transport::Transport;
use crate::ports::FileStore;

use super::codec::{self, DownloadChunk, DownloadReply, UploadAck, UploadReq};
use super::{ID_FILE, check_name};

/// Why a transfer stopped, and how far it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferError {
    pub status: MgmtError,
    /// Local offset reached when the transfer stopped.
    pub offset: usize,
}

impl TransferError {
    pub const fn at(status: MgmtError, offset: usize) -> Self {
        Self { status, offset }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.status, self.offset)
    }
}

impl From<TransferError> for MgmtError {
    fn from(e: TransferError) -> Self {
        e.status
    }
}

// ── Sinks and sources ────────────────────────────────────────

trait Sink {
    /// Upper bound on the object size.
    fn capacity(&self) -> usize;
    fn put(&mut self, off: usize, data: &[u8]) -> Status;
}

struct BufSink<'a>(&'a mut [u8]);

impl Sink for BufSink<'_> {
    fn capacity(&self) -> usize {
        self.0.len()
    }

    fn put(&mut self, off: usize, data: &[u8]) -> Status {
        let dst = self
            .0
            .get_mut(off..off + data.len())
            .ok_or(MgmtError::Offset)?;
        dst.copy_from_slice(data);
        Ok(())
    }
}

struct FileSink<'a> {
    store: &'a dyn FileStore,
    name: &'a str,
    max_len: usize,
}

impl Sink for FileSink<'_> {
    fn capacity(&self) -> usize {
        self.max_len
    }

    fn put(&mut self, off: usize, data: &[u8]) -> Status {
        Ok(self.store.write(self.name, off, data)?)
    }
}

trait Source {
    fn len(&self) -> usize;
    /// Fill `buf` entirely from `off`.
    fn fill(&self, off: usize, buf: &mut [u8]) -> Status;
}

struct BufSource<'a>(&'a [u8]);

impl Source for BufSource<'_> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn fill(&self, off: usize, buf: &mut [u8]) -> Status {
        let src = self.0.get(off..off + buf.len()).ok_or(MgmtError::Offset)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

struct FileSource<'a> {
    store: &'a dyn FileStore,
    name: &'a str,
    len: usize,
}

impl Source for FileSource<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn fill(&self, off: usize, buf: &mut [u8]) -> Status {
        let mut done = 0;
        while done < buf.len() {
            let n = self.store.read(self.name, off + done, &mut buf[done..])?;
            if n == 0 {
                // object shrank under us
                return Err(MgmtError::Offset);
            }
            done += n;
        }
        Ok(())
    }
}

// ── Client ───────────────────────────────────────────────────

/// File transfer client bound to one call engine.
///
/// Registers the file-command response handlers on construction and
/// removes them on drop.
pub struct FsClient<T> {
    engine: Arc<CallEngine<T>>,
    group: Arc<Group>,
    chunks: Arc<ReplySlot<DownloadChunk>>,
    acks: Arc<ReplySlot<usize>>,
}

impl<T: Transport> FsClient<T> {
    pub fn new(engine: Arc<CallEngine<T>>) -> Self {
        let chunks = Arc::new(ReplySlot::new());
        let acks = Arc::new(ReplySlot::new());

        let handler = Handler::new()
            .with_read({
                let conv = Arc::clone(engine.conversation());
                let chunks = Arc::clone(&chunks);
                move |ctxt: &mut MgmtCtxt<'_>| -> Status {
                    let seq = ctxt.header.seq;
                    if !conv.is_current(seq) {
                        warn!("FS[client]: download reply for stale seq {}", seq);
                        return Err(MgmtError::BadState);
                    }
                    match codec::decode_download_rsp(ctxt.payload)? {
                        DownloadReply::Chunk(chunk) => {
                            chunks.put(seq, chunk);
                            Ok(())
                        }
                        DownloadReply::Rejected(err) => Err(err),
                    }
                }
            })
            .with_write({
                let conv = Arc::clone(engine.conversation());
                let acks = Arc::clone(&acks);
                move |ctxt: &mut MgmtCtxt<'_>| -> Status {
                    let seq = ctxt.header.seq;
                    if !conv.is_current(seq) {
                        warn!("FS[client]: upload ack for stale seq {}", seq);
                        return Err(MgmtError::BadState);
                    }
                    match codec::decode_upload_ack(ctxt.payload)? {
                        UploadAck::Accepted { off } => {
                            acks.put(seq, off);
                            Ok(())
                        }
                        UploadAck::Rejected(err) => Err(err),
                    }
                }
            });

        let group = Arc::new(Group::new(group::FS, "fs-client").with_handler(ID_FILE, handler));
        engine
            .runtime()
            .registry()
            .register(Role::Client, Arc::clone(&group));

        Self {
            engine,
            group,
            chunks,
            acks,
        }
    }

    fn max_name_len(&self) -> usize {
        self.engine.runtime().config().max_name_len
    }

    // ── Download ─────────────────────────────────────────────

    /// Download `name` into `buf`. Returns the object length.
    pub fn download(&self, name: &str, buf: &mut [u8]) -> Result<usize, TransferError> {
        self.download_from(name, 0, buf)
    }

    /// Download `name` starting at byte `start` into `buf` (written at the
    /// object's own offsets). Returns the object length.
    pub fn download_from(
        &self,
        name: &str,
        start: usize,
        buf: &mut [u8],
    ) -> Result<usize, TransferError> {
        self.download_into(name, start, &mut BufSink(buf))
    }

    /// Download `remote` into `local` on `store`, accepting objects of at
    /// most `max_len` bytes.
    pub fn download_file(
        &self,
        remote: &str,
        store: &dyn FileStore,
        local: &str,
        max_len: usize,
    ) -> Result<usize, TransferError> {
        let mut sink = FileSink {
            store,
            name: local,
            max_len,
        };
        self.download_into(remote, 0, &mut sink)
    }

    fn download_into(
        &self,
        name: &str,
        start: usize,
        sink: &mut dyn Sink,
    ) -> Result<usize, TransferError> {
        let fail = |status, offset| TransferError::at(status, offset);

        check_name(name, self.max_name_len()).map_err(|e| fail(e, start))?;
        let capacity = sink.capacity();
        if start > capacity {
            return Err(fail(MgmtError::InvalidArgument, start));
        }

        let session = self.engine.session().map_err(|e| fail(e, start))?;
        info!("FS[client]: download {} from {} (cap {})", name, start, capacity);

        let stall_limit = self.engine.runtime().config().download_stall_limit;
        let mut off = start;
        let mut size = capacity;
        let mut first = true;
        let mut stalls = 0u8;
        loop {
            let chunk = self.fetch(&session, name, off).map_err(|e| fail(e, off))?;

            if first {
                first = false;
                let Some(len) = chunk.len else {
                    warn!("FS[client]: first chunk of {} has no length", name);
                    return Err(fail(MgmtError::Decode, off));
                };
                if len > capacity {
                    warn!("FS[client]: {} is {} B, room for {}", name, len, capacity);
                    return Err(fail(MgmtError::InsufficientSpace, off));
                }
                if len < start {
                    return Err(fail(MgmtError::Offset, off));
                }
                size = len;
            }

            let end = chunk.off.checked_add(chunk.data.len());
            let end = match end {
                Some(end) if end <= size && (end > chunk.off || end == size) => end,
                _ => {
                    warn!(
                        "FS[client]: chunk off {} len {} outside {}",
                        chunk.off,
                        chunk.data.len(),
                        size
                    );
                    return Err(fail(MgmtError::Offset, off));
                }
            };

            if end <= off && end < size {
                stalls += 1;
                warn!(
                    "FS[client]: {} stuck at {} ({}/{})",
                    name, off, stalls, stall_limit
                );
                if stalls > stall_limit {
                    return Err(fail(MgmtError::Offset, off));
                }
                continue;
            }
            stalls = 0;

            sink.put(chunk.off, &chunk.data).map_err(|e| fail(e, off))?;
            off = off.max(end);
            debug!("FS[client]: {} {}/{}", name, off, size);

            if off >= size {
                break;
            }
        }

        info!("FS[client]: download {} done ({} B)", name, size);
        Ok(size)
    }

    fn fetch(&self, session: &Session<'_, T>, name: &str, off: usize) -> crate::error::Result<DownloadChunk> {
        let body = codec::encode_download_req(name, off)?;
        let sent = session.call(Header::command(Op::Read, group::FS, ID_FILE), &body)?;
        self.chunks.take(sent.seq).ok_or(MgmtError::BadState)
    }

    // ── Upload ───────────────────────────────────────────────

    /// Upload `data` as `name`. Returns the number of bytes sent.
    pub fn upload(&self, name: &str, data: &[u8]) -> Result<usize, TransferError> {
        self.upload_from(name, &BufSource(data))
    }

    /// Upload the local object `local` on `store` as `remote`.
    pub fn upload_file(
        &self,
        remote: &str,
        store: &dyn FileStore,
        local: &str,
    ) -> Result<usize, TransferError> {
        let len = store
            .length(local)
            .map_err(|e| TransferError::at(e.into(), 0))?;
        self.upload_from(remote, &FileSource {
            store,
            name: local,
            len,
        })
    }

    fn upload_from(&self, name: &str, source: &dyn Source) -> Result<usize, TransferError> {
        let fail = |status, offset| TransferError::at(status, offset);
        let config = self.engine.runtime().config();

        check_name(name, self.max_name_len()).map_err(|e| fail(e, 0))?;

        let session = self.engine.session().map_err(|e| fail(e, 0))?;
        let size = source.len();
        let frame = session.mtu().min(config.max_frame_size);
        let overhead = upload_envelope(name, size)
            .map_err(|e| fail(e, 0))?
            .max(config.upload_overhead);
        let allowance = frame
            .checked_sub(overhead)
            .filter(|a| *a > 0)
            .ok_or(fail(MgmtError::Transport(TransportError::MtuTooSmall), 0))?;

        let mut scratch = vec![0u8; size.min(allowance)];
        let mut off = 0;
        let mut resyncs = 0u8;
        info!(
            "FS[client]: upload {} ({} B, chunk {})",
            name,
            size,
            scratch.len()
        );

        loop {
            let n = allowance.min(size - off);
            source
                .fill(off, &mut scratch[..n])
                .map_err(|e| fail(e, off))?;

            let req = UploadReq {
                name,
                off,
                data: &scratch[..n],
                len: (off == 0).then_some(size),
            };
            let next = self.push(&session, &req).map_err(|e| fail(e, off))?;

            if next > size {
                warn!("FS[client]: ack offset {} beyond {}", next, size);
                return Err(fail(MgmtError::Offset, off));
            }
            if next == off + n {
                resyncs = 0;
            } else {
                resyncs += 1;
                warn!(
                    "FS[client]: resync {} -> {} ({}/{})",
                    off + n,
                    next,
                    resyncs,
                    config.upload_resync_limit
                );
                if resyncs > config.upload_resync_limit {
                    return Err(fail(MgmtError::Offset, off));
                }
            }

            off = next;
            debug!("FS[client]: {} {}/{}", name, off, size);

            if off >= size {
                break;
            }
        }

        info!("FS[client]: upload {} done ({} B)", name, size);
        Ok(size)
    }

    fn push(&self, session: &Session<'_, T>, req: &UploadReq<'_>) -> crate::error::Result<usize> {
        let body = codec::encode_upload_req(req)?;
        let sent = session.call(Header::command(Op::Write, group::FS, ID_FILE), &body)?;
        self.acks.take(sent.seq).ok_or(MgmtError::BadState)
    }
}

/// Frame bytes an upload of `name` takes up besides its data: the header
/// plus the largest request map any chunk of a `size`-byte object needs.
fn upload_envelope(name: &str, size: usize) -> crate::error::Result<usize> {
    let widest = codec::encode_upload_req(&UploadReq {
        name,
        off: size,
        data: &[],
        len: Some(size),
    })?;
    // a data length up to u16::MAX takes two more bytes than an empty one
    Ok(HEADER_SIZE + widest.len() + 2)
}

impl<T> Drop for FsClient<T> {
    fn drop(&mut self) {
        self.engine.runtime().registry().unregister(&self.group);
    }
}
