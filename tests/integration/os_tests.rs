//! OS group over the loopback link: echo, task statistics and reset
//! against `SimOs`.

use std::sync::Arc;

use devmgmt::adapters::loopback::{LoopbackPair, LoopbackTransport};
use devmgmt::adapters::sim_os::SimOs;
use devmgmt::cmd::os::client::OsClient;
use devmgmt::cmd::os::server::OsServer;
use devmgmt::config::MgmtConfig;
use devmgmt::error::MgmtError;
use devmgmt::mgmt::call::CallEngine;
use devmgmt::mgmt::dispatch::MgmtRuntime;
use devmgmt::mgmt::registry::{Group, Role};
use devmgmt::ports::TaskInfo;

struct Rig {
    client: OsClient<Arc<LoopbackTransport>>,
    os: Arc<SimOs>,
    server_rt: Arc<MgmtRuntime>,
    server_group: Arc<Group>,
    _link: LoopbackPair,
}

fn task(name: &str, prio: u32) -> TaskInfo {
    TaskInfo {
        name: name.to_owned(),
        prio,
        stksiz: 4096,
        stkuse: 1024,
        ..TaskInfo::default()
    }
}

fn rig(config: MgmtConfig) -> Rig {
    let client_rt = Arc::new(MgmtRuntime::new(MgmtConfig::default()).unwrap());
    let server_rt = Arc::new(MgmtRuntime::new(config).unwrap());

    let os = Arc::new(SimOs::new(vec![task("idle", 15), task("mgmt", 3)]));
    let server_group = OsServer::register(&server_rt, Arc::clone(&os));

    let link = LoopbackPair::connect(Arc::clone(&client_rt), Arc::clone(&server_rt), 512).unwrap();
    let engine = Arc::new(CallEngine::new(client_rt, Arc::clone(link.a())).unwrap());
    Rig {
        client: OsClient::new(engine),
        os,
        server_rt,
        server_group,
        _link: link,
    }
}

#[test]
fn echo_returns_text() {
    let r = rig(MgmtConfig::default());
    assert_eq!(r.client.echo("hello"), Ok("hello".to_owned()));
    assert_eq!(r.client.echo(""), Ok(String::new()));
}

#[test]
fn taskstat_lists_remote_tasks() {
    let r = rig(MgmtConfig::default());
    let tasks = r.client.taskstat().unwrap();
    assert_eq!(tasks, vec![task("idle", 15), task("mgmt", 3)]);

    r.os.set_tasks(Vec::new());
    assert_eq!(r.client.taskstat(), Ok(Vec::new()));
}

#[test]
fn reset_uses_responder_delay() {
    let r = rig(MgmtConfig {
        reset_delay_ms: 75,
        ..MgmtConfig::default()
    });
    assert_eq!(r.client.reset(), Ok(()));
    assert_eq!(r.os.pending_reset(), Some(75));
}

#[test]
fn refused_reset_surfaces_remote_status() {
    let r = rig(MgmtConfig::default());
    r.os.block_resets();
    assert_eq!(r.client.reset(), Err(MgmtError::BadState));
    assert_eq!(r.os.pending_reset(), None);
}

#[test]
fn unregistered_group_is_not_supported() {
    let r = rig(MgmtConfig::default());
    let served: Vec<u8> = (0..=255u8)
        .filter(|id| r.server_rt.registry().find(Role::Server, 0, *id).is_some())
        .collect();
    assert_eq!(served, vec![0, 2, 5]);

    assert!(r.server_rt.registry().unregister(&r.server_group));
    assert_eq!(r.client.echo("hello"), Err(MgmtError::NotSupported));
    assert!(!r.server_rt.registry().unregister(&r.server_group));
}
