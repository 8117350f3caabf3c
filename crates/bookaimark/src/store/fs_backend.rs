use super::backend::{DocumentLocks, StorageBackend};
use crate::error::{BookmarkError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct FsBackend {
    root: PathBuf,
    locks: DocumentLocks,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DocumentLocks::default(),
        }
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(BookmarkError::Io)?;
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if name.is_empty() || escapes {
            return Err(BookmarkError::Store(format!(
                "Invalid document name: {name}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl StorageBackend for FsBackend {
    fn read_document(&self, name: &str) -> Result<Option<String>> {
        let path = self.resolve(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(BookmarkError::Io)?;
        Ok(Some(content))
    }

    fn write_document(&self, name: &str, contents: &str) -> Result<()> {
        let target = self.resolve(name)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        self.ensure_dir(&dir)?;

        // Atomic write: tmp file in the same directory, then rename over the target
        let tmp = dir.join(format!(".doc-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, contents).map_err(BookmarkError::Io)?;
        if let Err(err) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(BookmarkError::Io(err));
        }
        Ok(())
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn document_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks.get(name)
    }
}
