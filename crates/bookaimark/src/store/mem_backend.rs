use super::backend::{DocumentLocks, StorageBackend};
use crate::error::{BookmarkError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory storage backend for testing.
///
/// Uses a `Mutex` rather than `RefCell` because the server shares backends
/// across tokio worker threads.
#[derive(Default)]
pub struct MemBackend {
    documents: Mutex<HashMap<String, String>>,
    locks: DocumentLocks,
    simulate_write_error: AtomicBool,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    /// Test helper to plant raw (possibly corrupt) content.
    pub fn put_raw(&self, name: &str, contents: &str) {
        self.documents()
            .insert(name.to_string(), contents.to_string());
    }

    fn documents(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.documents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl StorageBackend for MemBackend {
    fn read_document(&self, name: &str) -> Result<Option<String>> {
        Ok(self.documents().get(name).cloned())
    }

    fn write_document(&self, name: &str, contents: &str) -> Result<()> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(BookmarkError::Store("Simulated write error".to_string()));
        }
        self.documents()
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn document_path(&self, name: &str) -> PathBuf {
        PathBuf::from(format!("memory://{}", name))
    }

    fn document_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks.get(name)
    }
}
