use crate::api::BookmarkApi;
use crate::config::BookmarkConfig;
use crate::settings::TriStore;
use crate::store::FsBackend;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A data directory in a temp dir, with a config pointing at it.
pub struct TestEnv {
    // Kept so the directory lives as long as the env.
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub config: BookmarkConfig,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let config = BookmarkConfig {
            data_dir: root.clone(),
            ..Default::default()
        };
        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    pub fn backend(&self) -> Arc<FsBackend> {
        Arc::new(FsBackend::new(self.root.clone()))
    }

    /// A facade over the temp dir with only the local-file settings backend.
    pub fn api(&self) -> BookmarkApi<FsBackend> {
        let backend = self.backend();
        let settings = TriStore::from_config(&self.config, Arc::clone(&backend))
            .expect("failed to build settings store");
        BookmarkApi::new(backend, settings)
    }
}
