//! Call engine behaviour against a threaded peer: busy rejection,
//! timeouts, and late or stale completions.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use devmgmt::config::MgmtConfig;
use devmgmt::error::{MgmtError, Status};
use devmgmt::mgmt::call::CallEngine;
use devmgmt::mgmt::cbor;
use devmgmt::mgmt::dispatch::MgmtRuntime;
use devmgmt::mgmt::events::EventKind;
use devmgmt::mgmt::group;
use devmgmt::mgmt::header::{Header, Op};
use devmgmt::mgmt::registry::{Group, Handler, MgmtCtxt, Role};

use crate::mock_peer::{MockPeer, Reply, respond};

const GROUP: u16 = group::PERUSER + 6;

fn engine(
    script: impl Fn(&Header, &[u8]) -> Vec<Reply> + Send + 'static,
) -> Arc<CallEngine<MockPeer>> {
    let rt = Arc::new(MgmtRuntime::new(MgmtConfig::default()).unwrap());
    rt.registry().register(
        Role::Client,
        Arc::new(Group::new(GROUP, "ping").with_handler(
            0,
            Handler::new().with_read(|ctxt: &mut MgmtCtxt<'_>| -> Status {
                cbor::rc_status(ctxt.payload)
            }),
        )),
    );
    let peer = MockPeer::spawn(Arc::clone(&rt), 256, script);
    Arc::new(CallEngine::new(rt, peer).unwrap())
}

fn ping() -> Header {
    Header::command(Op::Read, GROUP, 0)
}

// ── Busy ──────────────────────────────────────────────────────

#[test]
fn busy_engine_never_transmits() {
    let e = engine(|h, _| vec![respond(h, cbor::empty_map())]);

    let session = e.session().unwrap();
    assert_eq!(e.call(ping(), &cbor::empty_map()), Err(MgmtError::BadState));
    assert!(e.session().is_err());
    drop(session);

    assert!(e.transport().sent().is_empty());
    assert_eq!(e.call(ping(), &cbor::empty_map()).map(|_| ()), Ok(()));
}

#[test]
fn concurrent_caller_is_rejected_while_call_in_flight() {
    let e = engine(|h, _| vec![respond(h, cbor::empty_map()).after(Duration::from_millis(300))]);

    let slow = {
        let e = Arc::clone(&e);
        std::thread::spawn(move || e.call(ping(), &cbor::empty_map()).map(|_| ()))
    };
    // wait for the first call to hold the slot
    let deadline = Instant::now() + Duration::from_secs(2);
    while e.transport().sent().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(e.call(ping(), &cbor::empty_map()), Err(MgmtError::BadState));
    assert_eq!(slow.join().unwrap(), Ok(()));
    assert_eq!(e.transport().sent().len(), 1);
}

// ── Timeouts ──────────────────────────────────────────────────

#[test]
fn silent_peer_times_out_within_window() {
    let e = engine(|_, _| Vec::new());

    let started = Instant::now();
    let res = e.call_with_timeout(
        ping(),
        &cbor::empty_map(),
        embassy_time::Duration::from_millis(100),
    );
    let elapsed = started.elapsed();

    assert_eq!(res, Err(MgmtError::Timeout));
    assert!(elapsed >= Duration::from_millis(90), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");

    // the slot is free again
    assert!(e.session().is_ok());
}

#[test]
fn late_reply_does_not_complete_next_call() {
    let calls = Arc::new(Mutex::new(0u32));
    let e = engine(move |h, _| {
        let mut n = calls.lock().unwrap();
        *n += 1;
        if *n == 1 {
            // answered long after the caller gave up, and with an error
            vec![
                respond(h, cbor::encode_rc(MgmtError::NotFound.code()))
                    .after(Duration::from_millis(250)),
            ]
        } else {
            vec![respond(h, cbor::empty_map())]
        }
    });

    let first = e.call_with_timeout(
        ping(),
        &cbor::empty_map(),
        embassy_time::Duration::from_millis(50),
    );
    assert_eq!(first, Err(MgmtError::Timeout));

    let second = e.call_with_timeout(
        ping(),
        &cbor::empty_map(),
        embassy_time::Duration::from_secs(2),
    );
    assert!(second.is_ok(), "second call got {second:?}");
}

#[test]
fn stale_completion_is_ignored() {
    let e = engine(|h, _| {
        vec![
            respond(h, cbor::encode_rc(MgmtError::NotFound.code())).with_seq(h.seq.wrapping_sub(1)),
            respond(h, cbor::empty_map()).after(Duration::from_millis(20)),
        ]
    });

    let sent = e.call(ping(), &cbor::empty_map()).unwrap();
    assert_eq!(e.transport().sent()[0].0.seq, sent.seq);
}

// ── Status and events ─────────────────────────────────────────

#[test]
fn remote_rc_becomes_call_status() {
    let e = engine(|h, _| vec![respond(h, cbor::encode_rc(MgmtError::NotSupported.code()))]);
    assert_eq!(e.call(ping(), &cbor::empty_map()), Err(MgmtError::NotSupported));
}

#[test]
fn originator_events_fire_in_order() {
    let e = engine(|h, _| vec![respond(h, cbor::empty_map()).after(Duration::from_millis(20))]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        e.runtime()
            .events()
            .subscribe(move |kind, _h: &Header, _| seen.lock().unwrap().push(kind))
            .unwrap();
    }

    e.call(ping(), &cbor::empty_map()).unwrap();

    // the engine's own subscriber wakes us before later subscribers run
    let deadline = Instant::now() + Duration::from_secs(2);
    while !seen.lock().unwrap().contains(&EventKind::RspDone) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }

    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&EventKind::CmdSent));
    let rsp: Vec<_> = seen
        .into_iter()
        .filter(|k| *k != EventKind::CmdSent)
        .collect();
    assert_eq!(
        rsp,
        vec![EventKind::RspRecv, EventKind::RspStatus, EventKind::RspDone]
    );
}

#[test]
fn sequence_numbers_advance_per_call() {
    let e = engine(|h, _| vec![respond(h, cbor::empty_map())]);
    let a = e.call(ping(), &cbor::empty_map()).unwrap().seq;
    let b = e.call(ping(), &cbor::empty_map()).unwrap().seq;
    assert_eq!(b, a.wrapping_add(1));
}
