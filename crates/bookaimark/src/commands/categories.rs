use chrono::Utc;
use serde::Deserialize;

use super::{double_option, non_empty, require_id, require_name};
use crate::error::{BookmarkError, Result};
use crate::model::Category;
use crate::store::{FileStorage, StorageBackend};

pub const DUPLICATE_NAME: &str = "Category with this name already exists";
pub const NOT_FOUND: &str = "Category not found";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Fields to change; absent fields are left alone, `null` clears optional ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
    #[serde(default, rename = "bookmarkCount")]
    pub bookmark_count: Option<u64>,
}

/// The user's categories, sorted by name.
pub fn list<B: StorageBackend>(storage: &FileStorage<Category, B>, user_id: &str) -> Vec<Category> {
    let mut categories = storage.for_user(user_id);
    categories.sort_by_key(|c| c.name.to_lowercase());
    categories
}

pub fn create<B: StorageBackend>(
    storage: &FileStorage<Category, B>,
    user_id: &str,
    input: NewCategory,
) -> Result<Category> {
    let name = require_name("Category", &input.name)?;
    let mut category = Category::new(user_id, name);
    category.description = non_empty(input.description);
    category.color = non_empty(input.color);

    storage.modify(|categories| {
        ensure_unique(categories, user_id, &category.name, None)?;
        categories.push(category.clone());
        Ok(((), true))
    })?;
    Ok(category)
}

pub fn update<B: StorageBackend>(
    storage: &FileStorage<Category, B>,
    user_id: &str,
    id: &str,
    patch: CategoryPatch,
) -> Result<Category> {
    require_id("category", id)?;
    let name = patch
        .name
        .as_deref()
        .map(|name| require_name("Category", name))
        .transpose()?;

    storage.modify(|categories| {
        if let Some(name) = &name {
            ensure_unique(categories, user_id, name, Some(id))?;
        }
        let category = categories
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id)
            .ok_or_else(|| BookmarkError::NotFound(NOT_FOUND.to_string()))?;
        if let Some(name) = name {
            category.name = name;
        }
        if let Some(description) = patch.description {
            category.description = non_empty(description);
        }
        if let Some(color) = patch.color {
            category.color = non_empty(color);
        }
        if let Some(count) = patch.bookmark_count {
            category.bookmark_count = count;
        }
        category.updated_at = Utc::now();
        Ok((category.clone(), true))
    })
}

pub fn delete<B: StorageBackend>(
    storage: &FileStorage<Category, B>,
    user_id: &str,
    id: &str,
) -> Result<()> {
    require_id("category", id)?;
    if storage.delete(|c| c.id == id && c.user_id == user_id)? {
        Ok(())
    } else {
        Err(BookmarkError::NotFound(NOT_FOUND.to_string()))
    }
}

/// Names are unique per user, ignoring case.
fn ensure_unique(
    categories: &[Category],
    user_id: &str,
    name: &str,
    except_id: Option<&str>,
) -> Result<()> {
    let wanted = name.to_lowercase();
    let taken = categories.iter().any(|c| {
        c.user_id == user_id
            && Some(c.id.as_str()) != except_id
            && c.name.to_lowercase() == wanted
    });
    if taken {
        return Err(BookmarkError::Conflict(DUPLICATE_NAME.to_string()));
    }
    Ok(())
}
