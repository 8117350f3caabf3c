use super::backend::StorageBackend;
use super::fs_backend::FsBackend;
use crate::error::Result;
use crate::model::Record;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Typed array store for one record type.
///
/// The whole JSON array is the unit of I/O: every mutation loads the array,
/// changes it in memory and writes it back. Mutations on the same document are
/// serialized through the backend's document lock.
pub struct FileStorage<T: Record, B: StorageBackend = FsBackend> {
    backend: Arc<B>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record, B: StorageBackend> Clone for FileStorage<T, B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _record: PhantomData,
        }
    }
}

impl<T: Record, B: StorageBackend> FileStorage<T, B> {
    pub fn with_backend(backend: Arc<B>) -> Self {
        Self {
            backend,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.backend.document_path(T::FILE_NAME)
    }

    /// Load the array. A missing file is an empty array; an unreadable or
    /// unparsable file is an error.
    pub fn load(&self) -> Result<Vec<T>> {
        match self.backend.read_document(T::FILE_NAME)? {
            None => Ok(Vec::new()),
            Some(content) if content.trim().is_empty() => Ok(Vec::new()),
            Some(content) => Ok(serde_json::from_str(&content)?),
        }
    }

    /// Lenient [`load`](Self::load): failures are logged and read as empty.
    pub fn read(&self) -> Vec<T> {
        match self.load() {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(
                    file = T::FILE_NAME,
                    error = %err,
                    "failed to read records, using empty list"
                );
                Vec::new()
            }
        }
    }

    pub fn write(&self, items: &[T]) -> Result<()> {
        let lock = self.backend.document_lock(T::FILE_NAME);
        let _guard = hold(&lock);
        self.write_unlocked(items)
    }

    pub fn append(&self, item: T) -> Result<()> {
        let lock = self.backend.document_lock(T::FILE_NAME);
        let _guard = hold(&lock);
        let mut items = self.load()?;
        items.push(item);
        self.write_unlocked(&items)
    }

    /// Apply `updater` to every record matching `predicate`.
    /// Returns false (and writes nothing) when no record matched.
    pub fn update<P, U>(&self, predicate: P, mut updater: U) -> Result<bool>
    where
        P: Fn(&T) -> bool,
        U: FnMut(&mut T),
    {
        let lock = self.backend.document_lock(T::FILE_NAME);
        let _guard = hold(&lock);
        let mut items = self.load()?;
        let mut matched = false;
        for item in items.iter_mut().filter(|item| predicate(item)) {
            updater(item);
            matched = true;
        }
        if matched {
            self.write_unlocked(&items)?;
        }
        Ok(matched)
    }

    /// Remove every record matching `predicate`.
    /// Returns false (and writes nothing) when the array did not shrink.
    pub fn delete<P>(&self, predicate: P) -> Result<bool>
    where
        P: Fn(&T) -> bool,
    {
        let lock = self.backend.document_lock(T::FILE_NAME);
        let _guard = hold(&lock);
        let mut items = self.load()?;
        let before = items.len();
        items.retain(|item| !predicate(item));
        if items.len() == before {
            return Ok(false);
        }
        self.write_unlocked(&items)?;
        Ok(true)
    }

    /// Load, edit and write back while holding the document lock, so checks made
    /// inside `change` still hold when the array is written. `change` returns its
    /// result and whether the array changed; nothing is written when it reports no
    /// change or fails.
    pub fn modify<R, F>(&self, change: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<T>) -> Result<(R, bool)>,
    {
        let lock = self.backend.document_lock(T::FILE_NAME);
        let _guard = hold(&lock);
        let mut items = self.load()?;
        let (result, changed) = change(&mut items)?;
        if changed {
            self.write_unlocked(&items)?;
        }
        Ok(result)
    }

    /// Replace every record matching `predicate` with `replacements`, in one write.
    pub fn replace_where<P>(&self, predicate: P, replacements: Vec<T>) -> Result<()>
    where
        P: Fn(&T) -> bool,
    {
        let lock = self.backend.document_lock(T::FILE_NAME);
        let _guard = hold(&lock);
        let mut items = self.load()?;
        items.retain(|item| !predicate(item));
        items.extend(replacements);
        self.write_unlocked(&items)
    }

    pub fn find<P>(&self, predicate: P) -> Option<T>
    where
        P: Fn(&T) -> bool,
    {
        self.read().into_iter().find(|item| predicate(item))
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.read().into_iter().filter(|item| predicate(item)).collect()
    }

    pub fn for_user(&self, user_id: &str) -> Vec<T> {
        self.filter(|item| item.user_id() == user_id)
    }

    fn write_unlocked(&self, items: &[T]) -> Result<()> {
        let result = serde_json::to_string_pretty(items)
            .map_err(Into::into)
            .and_then(|content| self.backend.write_document(T::FILE_NAME, &content));
        if let Err(err) = &result {
            tracing::error!(file = T::FILE_NAME, error = %err, "failed to write records");
        }
        result
    }
}

fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
