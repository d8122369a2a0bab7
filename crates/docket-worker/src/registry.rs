//! Process-wide map of in-flight assemblers.
//!
//! The outer `std::sync::Mutex` guards structure only (lookup, insert, remove) and is
//! never held across an await. Each assembler has its own async mutex for its contents.
//! Code holding an assembler lock must not call back into the registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use docket_core::UploadId;
use tokio::fs::File;
use tokio::time::Instant;

/// Reassembly state for one upload.
#[derive(Debug)]
pub struct Assembler {
    pub name: String,
    pub destination: PathBuf,
    pub chunks_received: u64,
    /// Index the next in-order chunk is expected to carry.
    pub next_index: u64,
    pub bytes_written: u64,
    pub complete: bool,
    /// Set once bytes may be missing from the destination. A failed assembler drops every
    /// further chunk and never completes; the janitor evicts it.
    pub failed: bool,
    pub created_at: Instant,
    pub last_update: Instant,
    pub(crate) file: Option<File>,
}

impl Assembler {
    pub fn new(name: impl Into<String>, destination: PathBuf) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            destination,
            chunks_received: 0,
            next_index: 0,
            bytes_written: 0,
            complete: false,
            failed: false,
            created_at: now,
            last_update: now,
            file: None,
        }
    }
}

pub(crate) type AssemblerMap = HashMap<UploadId, Arc<tokio::sync::Mutex<Assembler>>>;

/// Shared handle to the assembler map. Clones refer to the same map.
#[derive(Debug, Clone, Default)]
pub struct AssemblerRegistry {
    inner: Arc<Mutex<AssemblerMap>>,
}

impl AssemblerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn map(&self) -> MutexGuard<'_, AssemblerMap> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the assembler for `id`, creating it with `init` when absent.
    pub fn get_or_insert_with(
        &self,
        id: UploadId,
        init: impl FnOnce() -> Assembler,
    ) -> Arc<tokio::sync::Mutex<Assembler>> {
        self.map()
            .entry(id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(init())))
            .clone()
    }

    pub fn get(&self, id: &UploadId) -> Option<Arc<tokio::sync::Mutex<Assembler>>> {
        self.map().get(id).cloned()
    }

    pub fn remove(&self, id: &UploadId) -> bool {
        self.map().remove(id).is_some()
    }

    pub fn contains(&self, id: &UploadId) -> bool {
        self.map().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
