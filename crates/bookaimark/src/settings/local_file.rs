use async_trait::async_trait;
use std::sync::Arc;

use super::{SettingsBackend, StoredSetting};
use crate::error::{BookmarkError, Result};
use crate::store::StorageBackend;

const NAME: &str = "local_file";

/// Settings replica on the server's own disk: `settings/<user_id>/<key>.json`.
///
/// The storage calls block, so they run on tokio's blocking pool.
pub struct LocalFileBackend<B: StorageBackend> {
    storage: Arc<B>,
}

impl<B: StorageBackend> LocalFileBackend<B> {
    pub fn new(storage: Arc<B>) -> Self {
        Self { storage }
    }

    fn document_name(user_id: &str, key: &str) -> String {
        format!("settings/{user_id}/{key}.json")
    }
}

#[async_trait]
impl<B: StorageBackend + 'static> SettingsBackend for LocalFileBackend<B> {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn read(&self, user_id: &str, key: &str) -> Result<Option<StoredSetting>> {
        let name = Self::document_name(user_id, key);
        let storage = Arc::clone(&self.storage);
        let content = blocking(move || storage.read_document(&name)).await?;
        content
            .map(|content| StoredSetting::from_json_str(&content))
            .transpose()
    }

    async fn write(&self, user_id: &str, key: &str, setting: &StoredSetting) -> Result<()> {
        let name = Self::document_name(user_id, key);
        let content = serde_json::to_string_pretty(setting)?;
        let storage = Arc::clone(&self.storage);
        blocking(move || {
            let lock = storage.document_lock(&name);
            let _guard = match lock.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            storage.write_document(&name, &content)
        })
        .await
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| BookmarkError::backend(NAME, format!("blocking task failed: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemBackend;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_then_read_from_worker_thread() {
        let storage = Arc::new(MemBackend::new());
        let backend = LocalFileBackend::new(Arc::clone(&storage));
        let setting = StoredSetting {
            value: json!({ "theme": "dark" }),
            updated_at: Utc::now(),
        };

        backend.write("u1", "prefs", &setting).await.unwrap();

        assert!(storage
            .read_document("settings/u1/prefs.json")
            .unwrap()
            .is_some());
        let read = backend.read("u1", "prefs").await.unwrap().unwrap();
        assert_eq!(read.value, setting.value);
        assert!(backend.read("u1", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let storage = Arc::new(MemBackend::new());
        storage.set_simulate_write_error(true);
        let backend = LocalFileBackend::new(storage);
        let setting = StoredSetting {
            value: json!(1),
            updated_at: Utc::now(),
        };

        assert!(backend.write("u1", "prefs", &setting).await.is_err());
    }
}
