//! File transfers end to end: an `FsClient` on one runtime talking to an
//! `FsServer` over `MemFileStore` on another, through the loopback link.
//! Chunking rules are checked separately against a scripted peer.

use std::sync::{Arc, Mutex};

use devmgmt::adapters::loopback::{LoopbackPair, LoopbackTransport};
use devmgmt::adapters::mem_fs::MemFileStore;
use devmgmt::cmd::fs::client::{FsClient, TransferError};
use devmgmt::cmd::fs::codec::{self, UploadAck};
use devmgmt::cmd::fs::server::FsServer;
use devmgmt::config::MgmtConfig;
use devmgmt::error::{MgmtError, TransportError};
use devmgmt::mgmt::call::CallEngine;
use devmgmt::mgmt::dispatch::MgmtRuntime;
use devmgmt::mgmt::registry::Role;
use devmgmt::ports::FileStore;

use crate::mock_peer::{MockPeer, respond};

const MTU: usize = 256;

struct Rig {
    client: FsClient<Arc<LoopbackTransport>>,
    server: Arc<FsServer<MemFileStore>>,
    remote: Arc<MemFileStore>,
    engine: Arc<CallEngine<Arc<LoopbackTransport>>>,
    link: LoopbackPair,
}

fn rig_with(remote: MemFileStore) -> Rig {
    rig_at(remote, MTU)
}

fn rig_at(remote: MemFileStore, mtu: usize) -> Rig {
    let client_rt = Arc::new(MgmtRuntime::new(MgmtConfig::default()).unwrap());
    let server_rt = Arc::new(MgmtRuntime::new(MgmtConfig::default()).unwrap());

    let remote = Arc::new(remote);
    let server = FsServer::new(Arc::clone(&remote), server_rt.config());
    server_rt
        .registry()
        .register(Role::Server, Arc::new(server.group()));

    let link = LoopbackPair::connect(Arc::clone(&client_rt), server_rt, mtu).unwrap();
    let engine = Arc::new(CallEngine::new(client_rt, Arc::clone(link.a())).unwrap());
    Rig {
        client: FsClient::new(Arc::clone(&engine)),
        server,
        remote,
        engine,
        link,
    }
}

fn rig() -> Rig {
    rig_with(MemFileStore::new())
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

// ── Download ──────────────────────────────────────────────────

#[test]
fn download_reassembles_multi_chunk_object() {
    let r = rig();
    let object = pattern(1000);
    r.remote.write("fw.bin", 0, &object).unwrap();

    let mut buf = vec![0u8; 2048];
    assert_eq!(r.client.download("fw.bin", &mut buf), Ok(1000));
    assert_eq!(&buf[..1000], &object[..]);
    assert!(buf[1000..].iter().all(|b| *b == 0));
}

#[test]
fn download_from_offset_fills_tail_only() {
    let r = rig();
    let object = pattern(600);
    r.remote.write("log", 0, &object).unwrap();

    let mut buf = vec![0u8; 600];
    assert_eq!(r.client.download_from("log", 400, &mut buf), Ok(600));
    assert!(buf[..400].iter().all(|b| *b == 0));
    assert_eq!(&buf[400..], &object[400..]);
}

#[test]
fn oversized_object_is_refused_without_writing() {
    let r = rig();
    r.remote.write("big", 0, &pattern(300)).unwrap();

    let mut buf = vec![0u8; 100];
    assert_eq!(
        r.client.download("big", &mut buf),
        Err(TransferError::at(MgmtError::InsufficientSpace, 0))
    );
    assert!(buf.iter().all(|b| *b == 0));
}

#[test]
fn missing_remote_object_reports_not_found() {
    let r = rig();
    let mut buf = [0u8; 16];
    assert_eq!(
        r.client.download("nope", &mut buf).unwrap_err().status,
        MgmtError::NotFound
    );
}

#[test]
fn empty_object_downloads_as_zero_length() {
    let r = rig();
    r.remote.write("empty", 0, &[]).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(r.client.download("empty", &mut buf), Ok(0));
}

#[test]
fn held_session_blocks_transfers() {
    let r = rig();
    r.remote.write("fw.bin", 0, b"abc").unwrap();

    let _session = r.engine.session().unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(
        r.client.download("fw.bin", &mut buf),
        Err(TransferError::at(MgmtError::BadState, 0))
    );
}

// ── Upload ────────────────────────────────────────────────────

#[test]
fn upload_then_download_round_trips() {
    let r = rig();
    let object = pattern(777);

    assert_eq!(r.client.upload("cfg", &object), Ok(777));
    assert_eq!(r.remote.contents("cfg").as_deref(), Some(&object[..]));
    assert_eq!(r.server.upload_progress(), None);

    let mut buf = vec![0u8; 1024];
    assert_eq!(r.client.download("cfg", &mut buf), Ok(777));
    assert_eq!(&buf[..777], &object[..]);
}

#[test]
fn upload_replaces_existing_object() {
    let r = rig();
    r.remote.write("cfg", 0, &pattern(900)).unwrap();
    assert_eq!(r.client.upload("cfg", b"short"), Ok(5));
    assert_eq!(r.remote.contents("cfg").as_deref(), Some(&b"short"[..]));
}

#[test]
fn longest_name_uploads_over_small_mtu() {
    let r = rig();
    let name = "n".repeat(MgmtConfig::default().max_name_len);
    let object = pattern(1000);
    assert_eq!(r.client.upload(&name, &object), Ok(1000));
    assert_eq!(r.remote.contents(&name).as_deref(), Some(&object[..]));
}

#[test]
fn link_mtu_above_frame_limit_still_uploads() {
    let r = rig_at(MemFileStore::new(), 2048);
    let object = pattern(1500);
    assert_eq!(r.client.upload("a", &object), Ok(1500));
    assert_eq!(r.remote.contents("a").as_deref(), Some(&object[..]));

    let mut buf = vec![0u8; 2048];
    assert_eq!(r.client.download("a", &mut buf), Ok(1500));
    assert_eq!(&buf[..1500], &object[..]);
}

#[test]
fn full_remote_store_aborts_upload() {
    let r = rig_with(MemFileStore::with_budget(100));
    assert_eq!(
        r.client.upload("big", &pattern(300)),
        Err(TransferError::at(MgmtError::OutOfMemory, 0))
    );
    assert_eq!(r.server.upload_progress(), None);
}

#[test]
fn file_to_file_copies_both_ways() {
    let r = rig();
    let local = MemFileStore::new();
    let object = pattern(450);
    local.write("src", 0, &object).unwrap();

    assert_eq!(r.client.upload_file("remote", &local, "src"), Ok(450));
    assert_eq!(r.client.download_file("remote", &local, "copy", 4096), Ok(450));
    assert_eq!(local.contents("copy").as_deref(), Some(&object[..]));

    assert_eq!(
        r.client.download_file("remote", &local, "small", 10).unwrap_err().status,
        MgmtError::InsufficientSpace
    );
    assert_eq!(
        r.client.upload_file("remote", &local, "absent").unwrap_err().status,
        MgmtError::NotFound
    );
}

#[test]
fn disconnected_link_fails_fast() {
    let r = rig();
    r.link.a().disconnect();
    assert_eq!(
        r.client.upload("cfg", b"data").unwrap_err().status,
        MgmtError::Transport(TransportError::NotConnected)
    );
}

// ── Chunk layout ──────────────────────────────────────────────

#[test]
fn upload_chunks_fit_mtu_and_cover_object_once() {
    let config = MgmtConfig {
        upload_overhead: 16,
        ..MgmtConfig::default()
    };
    let rt = Arc::new(MgmtRuntime::new(config).unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let peer = {
        let seen = Arc::clone(&seen);
        MockPeer::spawn(Arc::clone(&rt), 64, move |h, body| {
            let req = codec::decode_upload_req(body).unwrap();
            seen.lock().unwrap().push((req.off, req.data.len(), req.len));
            let ack = UploadAck::Accepted {
                off: req.off + req.data.len(),
            };
            vec![respond(h, codec::encode_upload_ack(ack))]
        })
    };
    let client = FsClient::new(Arc::new(CallEngine::new(rt, peer).unwrap()));

    let object = pattern(200);
    assert_eq!(client.upload("x", &object), Ok(200));

    let seen = seen.lock().unwrap().clone();
    let mut expect = 0;
    for (i, (off, n, len)) in seen.iter().enumerate() {
        assert!(*n <= 48, "chunk {i} is {n} B");
        assert_eq!(*off, expect, "chunk {i} not contiguous");
        assert_eq!(len.is_some(), i == 0, "len only on first chunk");
        expect += n;
    }
    assert_eq!(expect, 200);
    assert_eq!(seen[0].2, Some(200));
}
