//! # Command Layer
//!
//! Business rules for the file-backed entities. Each entity has its own
//! submodule of plain functions taking the [`FileStorage`](crate::store::FileStorage)
//! instances they need and returning typed records.
//!
//! ## What Commands Do NOT Do
//!
//! - **HTTP**: no status codes or envelopes; errors are [`BookmarkError`]
//!   variants (`Validation`, `NotFound`, `Conflict`) the server maps to statuses.
//! - **Identity**: `user_id` arrives already resolved and authorized.
//! - **Caching**: invalidation is the caller's job after a successful write.
//!
//! ## Testing Strategy
//!
//! Command tests run against [`MemBackend`](crate::store::MemBackend) so every
//! branch is covered without touching disk.
//!
//! ## Command Modules
//!
//! - [`categories`]: bookmark categories, names unique per user
//! - [`goal_folders`]: folders grouping goals
//! - [`goals`]: reading goals with status, progress and linked bookmarks
//! - [`hierarchy`]: folder placement in the sidebar tree

use serde::{Deserialize, Deserializer};

use crate::error::{BookmarkError, Result};
use crate::model::is_valid_uuid;

pub mod categories;
pub mod goal_folders;
pub mod goals;
pub mod hierarchy;

const MAX_NAME_LEN: usize = 200;

/// Trimmed, non-empty name of bounded length.
pub(crate) fn require_name(kind: &str, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BookmarkError::Validation(format!("{kind} name is required")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(BookmarkError::Validation(format!(
            "{kind} name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

pub(crate) fn require_id(kind: &str, id: &str) -> Result<()> {
    if is_valid_uuid(id) {
        Ok(())
    } else {
        Err(BookmarkError::Validation(format!("Invalid {kind} id")))
    }
}

/// Empty strings from form inputs count as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Distinguishes a missing field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
