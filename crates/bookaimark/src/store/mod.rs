//! # Storage Layer
//!
//! File-backed persistence for entities that have no relational table
//! (categories, goals, goal folders, hierarchy assignments).
//!
//! ## Two Layers
//!
//! - [`backend::StorageBackend`]: raw document I/O ("how"). Addresses documents
//!   by relative name and guarantees atomic writes.
//! - [`FileStorage`]: typed array store ("what"). One JSON array per record type,
//!   read and rewritten as a whole.
//!
//! ## Implementations
//!
//! - [`fs_backend::FsBackend`]: production backend rooted at the data directory.
//!   Writes go to `.doc-<uuid>.tmp` and are renamed over the target.
//! - [`mem_backend::MemBackend`]: in-memory backend for tests, with write-error
//!   simulation.
//!
//! ## Failure Semantics
//!
//! - [`FileStorage::load`] is strict: unreadable or unparsable files are errors.
//! - [`FileStorage::read`] is lenient: the same failures are logged and read as
//!   an empty array, so a damaged file degrades to "no data" instead of a 500.
//! - Mutations (`append`, `update`, `delete`) load strictly, so a damaged file is
//!   never silently replaced by a fresh array.
//!
//! ## Concurrency
//!
//! Each read-modify-write holds a per-document mutex for its whole duration, so
//! writers inside one process never lose each other's updates. Nothing
//! coordinates separate processes: across processes the last writer wins.
//!
//! ## Storage Layout
//!
//! ```text
//! data/
//! ├── categories.json
//! ├── goal_folders.json
//! ├── goals.json
//! ├── hierarchy_assignments.json
//! └── settings/<user_id>/<key>.json   # local settings replica
//! ```

pub mod backend;
pub mod file_storage;
pub mod fs_backend;
pub mod mem_backend;

pub use backend::StorageBackend;
pub use file_storage::FileStorage;
pub use fs_backend::FsBackend;
pub use mem_backend::MemBackend;
