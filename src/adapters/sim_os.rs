//! Simulated [`OsPort`] for hosts and tests.
//!
//! Reports a fixed task table and records reset requests instead of
//! rebooting anything.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::info;

use crate::error::{MgmtError, Status};
use crate::ports::{OsPort, TaskInfo};

struct SimState {
    tasks: Vec<TaskInfo>,
    pending_reset: Option<u32>,
    resets_allowed: bool,
}

pub struct SimOs {
    state: Mutex<CriticalSectionRawMutex, RefCell<SimState>>,
}

impl SimOs {
    pub fn new(tasks: Vec<TaskInfo>) -> Self {
        info!("SimOs: simulation backend, {} tasks", tasks.len());
        Self {
            state: Mutex::new(RefCell::new(SimState {
                tasks,
                pending_reset: None,
                resets_allowed: true,
            })),
        }
    }

    /// Make subsequent reset requests fail with `BadState`.
    pub fn block_resets(&self) {
        self.state.lock(|s| s.borrow_mut().resets_allowed = false);
    }

    /// Delay of the last accepted reset request.
    pub fn pending_reset(&self) -> Option<u32> {
        self.state.lock(|s| s.borrow().pending_reset)
    }

    pub fn set_tasks(&self, tasks: Vec<TaskInfo>) {
        self.state.lock(|s| s.borrow_mut().tasks = tasks);
    }
}

impl OsPort for SimOs {
    fn tasks(&self) -> Vec<TaskInfo> {
        self.state.lock(|s| s.borrow().tasks.clone())
    }

    fn reset(&self, delay_ms: u32) -> Status {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            if !s.resets_allowed {
                return Err(MgmtError::BadState);
            }
            s.pending_reset = Some(delay_ms);
            info!("SimOs: reset scheduled in {} ms", delay_ms);
            Ok(())
        })
    }
}
