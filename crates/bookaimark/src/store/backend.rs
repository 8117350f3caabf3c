use crate::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Abstract interface for raw document I/O.
/// This trait handles the "how" of storage (filesystem vs memory),
/// while [`super::FileStorage`] handles the "what" (typed arrays of records).
///
/// Documents are addressed by a relative name such as `categories.json` or
/// `settings/<user>/<key>.json`.
pub trait StorageBackend: Send + Sync {
    /// Read a document.
    /// Returns Ok(None) if it does not exist.
    /// Returns Err only on actual I/O errors (permissions, disk failure).
    fn read_document(&self, name: &str) -> Result<Option<String>>;

    /// Write a document, creating parent directories as needed.
    /// MUST be atomic (e.g. write to tmp then rename) to avoid partial writes.
    fn write_document(&self, name: &str, contents: &str) -> Result<()>;

    /// Where the document lives. For MemBackend, a virtual path.
    fn document_path(&self, name: &str) -> PathBuf;

    /// Advisory lock serializing read-modify-write cycles on one document.
    fn document_lock(&self, name: &str) -> Arc<Mutex<()>>;
}

/// One mutex per document name, created on first use.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub fn get(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
