//! Responder-side file command handlers.
//!
//! Download replies are sized to `min(fs_max_chunk, mtu − download_overhead)`.
//! The reply carries the object length when it opens a download: at offset
//! zero, or when the request does not continue the previous one.
//!
//! Uploads are tracked as a session `{name, len, next}`. A chunk at offset
//! zero (with `len`) opens a session and truncates the object. A chunk for
//! the open session at any offset other than `next` is not written; the
//! reply re-synchronises the client to `next`.

use core::cell::RefCell;

use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, info, warn};

use crate::config::MgmtConfig;
use crate::error::{MgmtError, Status};
use crate::mgmt::dispatch::MgmtRuntime;
use crate::mgmt::group;
use crate::mgmt::registry::{Group, Handler, MgmtCtxt, Role};
use crate::ports::FileStore;

use super::codec::{self, UploadAck};
use super::{ID_FILE, check_name};

#[derive(Debug, Clone, PartialEq, Eq)]
struct UploadSession {
    name: String,
    len: usize,
    next: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DownloadCursor {
    name: String,
    next: usize,
}

enum UploadStep {
    /// Write the chunk; `len` is the session's declared length.
    Write { len: usize },
    /// Offset mismatch; tell the client where to resume.
    Resync { next: usize },
}

/// File command responder over a [`FileStore`].
pub struct FsServer<S> {
    store: Arc<S>,
    max_name_len: usize,
    download_overhead: usize,
    max_chunk: usize,
    upload: Mutex<CriticalSectionRawMutex, RefCell<Option<UploadSession>>>,
    download: Mutex<CriticalSectionRawMutex, RefCell<Option<DownloadCursor>>>,
}

impl<S: FileStore + 'static> FsServer<S> {
    pub fn new(store: Arc<S>, config: &MgmtConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            max_name_len: config.max_name_len,
            download_overhead: config.download_overhead,
            max_chunk: config.fs_max_chunk,
            upload: Mutex::new(RefCell::new(None)),
            download: Mutex::new(RefCell::new(None)),
        })
    }

    /// Group serving the file command (read = download, write = upload).
    pub fn group(self: &Arc<Self>) -> Group {
        let rd = Arc::clone(self);
        let wr = Arc::clone(self);
        Group::new(group::FS, "fs").with_handler(
            ID_FILE,
            Handler::new()
                .with_read(move |ctxt| rd.download(ctxt))
                .with_write(move |ctxt| wr.upload(ctxt)),
        )
    }

    /// Build a server over `store` and register it with `runtime`.
    /// Returns the group so it can later be unregistered.
    pub fn register(runtime: &MgmtRuntime, store: Arc<S>) -> Arc<Group> {
        let group = Arc::new(Self::new(store, runtime.config()).group());
        runtime
            .registry()
            .register(Role::Server, Arc::clone(&group));
        group
    }

    /// Name and next offset of the open upload, if any.
    pub fn upload_progress(&self) -> Option<(String, usize)> {
        self.upload
            .lock(|u| u.borrow().as_ref().map(|s| (s.name.clone(), s.next)))
    }

    fn download(&self, ctxt: &mut MgmtCtxt<'_>) -> Status {
        let req = codec::decode_download_req(ctxt.payload)?;
        check_name(req.name, self.max_name_len)?;

        let total = self.store.length(req.name)?;
        if req.off > total {
            return Err(MgmtError::InvalidArgument);
        }

        let room = ctxt.mtu.saturating_sub(self.download_overhead);
        let chunk = self.max_chunk.min(room);
        if chunk == 0 {
            warn!("FS[server]: mtu {} leaves no room for data", ctxt.mtu);
            return Err(MgmtError::MsgSize);
        }

        let mut data = vec![0u8; chunk.min(total - req.off)];
        let mut got = 0;
        while got < data.len() {
            let n = self.store.read(req.name, req.off + got, &mut data[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        data.truncate(got);

        let next = req.off + got;
        let continuing = self.download.lock(|c| {
            let mut c = c.borrow_mut();
            let continuing = c
                .as_ref()
                .is_some_and(|c| c.name == req.name && c.next == req.off);
            *c = (next < total).then(|| DownloadCursor {
                name: req.name.to_owned(),
                next,
            });
            continuing
        });
        let len = (req.off == 0 || !continuing).then_some(total);

        debug!("FS[server]: read {} @{} +{} of {}", req.name, req.off, got, total);
        ctxt.rsp = codec::encode_download_rsp(req.off, &data, len)?;
        Ok(())
    }

    fn upload(&self, ctxt: &mut MgmtCtxt<'_>) -> Status {
        let req = codec::decode_upload_req(ctxt.payload)?;
        check_name(req.name, self.max_name_len)?;

        let step = self.upload.lock(|u| -> crate::error::Result<UploadStep> {
            let mut u = u.borrow_mut();
            if req.off == 0 {
                let len = req.len.ok_or(MgmtError::InvalidArgument)?;
                *u = Some(UploadSession {
                    name: req.name.to_owned(),
                    len,
                    next: 0,
                });
                return Ok(UploadStep::Write { len });
            }
            match u.as_ref() {
                Some(s) if s.name == req.name && s.next == req.off => {
                    Ok(UploadStep::Write { len: s.len })
                }
                Some(s) if s.name == req.name => Ok(UploadStep::Resync { next: s.next }),
                _ => Err(MgmtError::BadState),
            }
        })?;

        let len = match step {
            UploadStep::Write { len } => len,
            UploadStep::Resync { next } => {
                warn!(
                    "FS[server]: {} chunk at {} but expecting {}",
                    req.name, req.off, next
                );
                ctxt.rsp = codec::encode_upload_ack(UploadAck::Accepted { off: next });
                return Ok(());
            }
        };

        let next = req.off + req.data.len();
        if next > len {
            self.upload.lock(|u| *u.borrow_mut() = None);
            return Err(MgmtError::InvalidArgument);
        }

        if req.off == 0 {
            info!("FS[server]: upload {} ({} B)", req.name, len);
        }
        if let Err(e) = self.store.write(req.name, req.off, req.data) {
            warn!("FS[server]: write {} @{} failed: {}", req.name, req.off, e);
            self.upload.lock(|u| *u.borrow_mut() = None);
            return Err(e.into());
        }

        self.upload.lock(|u| {
            let mut u = u.borrow_mut();
            if next == len {
                *u = None;
            } else if let Some(s) = u.as_mut() {
                s.next = next;
            }
        });
        if next == len {
            info!("FS[server]: upload {} complete", req.name);
        }

        ctxt.rsp = codec::encode_upload_ack(UploadAck::Accepted { off: next });
        Ok(())
    }
}
