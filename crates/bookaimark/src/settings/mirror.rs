use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{SettingsBackend, StoredSetting};
use crate::error::Result;

/// In-process copy of every setting read or written through the store.
///
/// Stands in for the browser-side storage of the web client: it is consulted
/// last, never counts as durable, and is lost on restart.
#[derive(Default)]
pub struct MirrorBackend {
    entries: Mutex<HashMap<(String, String), StoredSetting>>,
}

impl MirrorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, user_id: &str, key: &str, setting: StoredSetting) {
        self.entries()
            .insert((user_id.to_string(), key.to_string()), setting);
    }

    pub fn get(&self, user_id: &str, key: &str) -> Option<StoredSetting> {
        self.entries()
            .get(&(user_id.to_string(), key.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), StoredSetting>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SettingsBackend for MirrorBackend {
    fn name(&self) -> &'static str {
        "mirror"
    }

    async fn read(&self, user_id: &str, key: &str) -> Result<Option<StoredSetting>> {
        Ok(self.get(user_id, key))
    }

    async fn write(&self, user_id: &str, key: &str, setting: &StoredSetting) -> Result<()> {
        self.put(user_id, key, setting.clone());
        Ok(())
    }
}
