//! Fuzz target: `MgmtRuntime::process_frame`
//!
//! Feeds arbitrary frames into a runtime serving the fs and os groups
//! and checks that every reply it emits is a well-formed response frame
//! within the configured size.
//!
//! cargo fuzz run fuzz_frame_dispatch

#![no_main]

use std::sync::{Arc, Mutex, OnceLock};

use critical_section as _;
use devmgmt::adapters::mem_fs::MemFileStore;
use devmgmt::adapters::sim_os::SimOs;
use devmgmt::cmd::fs::server::FsServer;
use devmgmt::cmd::os::server::OsServer;
use devmgmt::config::MgmtConfig;
use devmgmt::error::TransportError;
use devmgmt::mgmt::dispatch::MgmtRuntime;
use devmgmt::mgmt::header::{HEADER_SIZE, Header};
use devmgmt::mgmt::transport::Transport;
use devmgmt::ports::FileStore;
use libfuzzer_sys::fuzz_target;

struct Sink(Mutex<Vec<(Header, usize)>>);

impl Transport for Sink {
    fn send(&self, header: &Header, payload: &[u8]) -> Result<(), TransportError> {
        self.0.lock().unwrap().push((*header, payload.len()));
        Ok(())
    }

    fn mtu(&self) -> usize {
        256
    }
}

fn runtime() -> &'static MgmtRuntime {
    static RT: OnceLock<MgmtRuntime> = OnceLock::new();
    RT.get_or_init(|| {
        let rt = MgmtRuntime::new(MgmtConfig::default()).unwrap();
        let store = Arc::new(MemFileStore::with_budget(4096));
        store.write("seed", 0, &[0x5A; 700]).unwrap();
        FsServer::register(&rt, store);
        OsServer::register(&rt, Arc::new(SimOs::new(Vec::new())));
        rt
    })
}

fuzz_target!(|data: &[u8]| {
    let rt = runtime();
    let sink = Sink(Mutex::new(Vec::new()));
    let _ = rt.process_frame(data, &sink);

    for (header, len) in sink.0.lock().unwrap().iter() {
        assert!(!header.is_command(), "dispatcher replied with a command");
        assert_eq!(usize::from(header.len), *len);
        assert!(HEADER_SIZE + len <= rt.config().max_frame_size);
    }
});
