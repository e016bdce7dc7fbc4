//! In-memory [`FileStore`].
//!
//! Backs the file command group on hosts and in tests. An optional byte
//! budget makes `Full` reachable.

use core::cell::RefCell;

use std::collections::HashMap;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::debug;

use crate::ports::{FileStore, StoreError};

pub struct MemFileStore {
    files: Mutex<CriticalSectionRawMutex, RefCell<HashMap<String, Vec<u8>>>>,
    budget: Option<usize>,
}

impl MemFileStore {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(RefCell::new(HashMap::new())),
            budget: None,
        }
    }

    /// Store that refuses to hold more than `bytes` in total.
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            ..Self::new()
        }
    }

    /// Copy of an object's bytes.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock(|f| f.borrow().get(name).cloned())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock(|f| f.borrow().keys().cloned().collect());
        names.sort();
        names
    }
}

impl Default for MemFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore for MemFileStore {
    fn read(&self, name: &str, off: usize, buf: &mut [u8]) -> Result<usize, StoreError> {
        self.files.lock(|f| {
            let files = f.borrow();
            let file = files.get(name).ok_or(StoreError::NotFound)?;
            let rest = file.get(off..).ok_or(StoreError::OutOfRange)?;
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            Ok(n)
        })
    }

    fn write(&self, name: &str, off: usize, data: &[u8]) -> Result<(), StoreError> {
        self.files.lock(|f| {
            let mut files = f.borrow_mut();
            let current = if off == 0 {
                0
            } else {
                files.get(name).map_or(0, Vec::len)
            };
            if off > current {
                return Err(StoreError::OutOfRange);
            }

            if let Some(budget) = self.budget {
                let others: usize = files
                    .iter()
                    .filter(|(n, _)| n.as_str() != name)
                    .map(|(_, v)| v.len())
                    .sum();
                let new_len = current.max(off + data.len());
                if others + new_len > budget {
                    return Err(StoreError::Full);
                }
            }

            let file = files.entry(name.to_owned()).or_default();
            if off == 0 {
                file.clear();
            }
            let end = off + data.len();
            if file.len() < end {
                file.resize(end, 0);
            }
            file[off..end].copy_from_slice(data);
            debug!("MEMFS: {} @{} +{} -> {}", name, off, data.len(), file.len());
            Ok(())
        })
    }

    fn length(&self, name: &str) -> Result<usize, StoreError> {
        self.files
            .lock(|f| f.borrow().get(name).map(Vec::len))
            .ok_or(StoreError::NotFound)
    }
}
