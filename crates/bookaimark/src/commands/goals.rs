use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{double_option, non_empty, require_id, require_name};
use crate::error::{BookmarkError, Result};
use crate::model::{Goal, GoalFolder, GoalPriority, GoalStatus};
use crate::store::{FileStorage, StorageBackend};

pub const NOT_FOUND: &str = "Goal not found";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGoal {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub status: Option<GoalStatus>,
    #[serde(default)]
    pub priority: Option<GoalPriority>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bookmark_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    /// `null` moves the goal out of its folder.
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<GoalStatus>,
    #[serde(default)]
    pub priority: Option<GoalPriority>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default, deserialize_with = "double_option")]
    pub deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub bookmark_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct GoalFilter {
    pub folder_id: Option<String>,
    pub status: Option<GoalStatus>,
}

/// The user's goals matching `filter`, newest first.
pub fn list<B: StorageBackend>(
    storage: &FileStorage<Goal, B>,
    user_id: &str,
    filter: &GoalFilter,
) -> Vec<Goal> {
    let mut goals = storage.filter(|g| {
        g.user_id == user_id
            && filter
                .folder_id
                .as_deref()
                .map_or(true, |folder| g.folder_id.as_deref() == Some(folder))
            && filter.status.map_or(true, |status| g.status == status)
    });
    goals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    goals
}

pub fn create<B: StorageBackend>(
    goals: &FileStorage<Goal, B>,
    folders: &FileStorage<GoalFolder, B>,
    user_id: &str,
    input: NewGoal,
) -> Result<Goal> {
    let name = require_name("Goal", &input.name)?;
    let folder_id = non_empty(input.folder_id);
    if let Some(folder_id) = &folder_id {
        ensure_folder(folders, user_id, folder_id)?;
    }
    let progress = input.progress.map(check_progress).transpose()?;

    let mut goal = Goal::new(user_id, name);
    goal.description = non_empty(input.description);
    goal.folder_id = folder_id;
    goal.status = input.status.unwrap_or_default();
    goal.priority = input.priority.unwrap_or_default();
    goal.progress = progress.unwrap_or(0);
    goal.deadline = input.deadline;
    goal.bookmark_ids = dedup(input.bookmark_ids);
    settle_completion(&mut goal);

    goals.append(goal.clone())?;
    Ok(goal)
}

pub fn update<B: StorageBackend>(
    goals: &FileStorage<Goal, B>,
    folders: &FileStorage<GoalFolder, B>,
    user_id: &str,
    id: &str,
    patch: GoalPatch,
) -> Result<Goal> {
    require_id("goal", id)?;
    let name = patch
        .name
        .as_deref()
        .map(|name| require_name("Goal", name))
        .transpose()?;
    let folder_id = patch.folder_id.map(non_empty);
    if let Some(Some(folder_id)) = &folder_id {
        ensure_folder(folders, user_id, folder_id)?;
    }
    let progress = patch.progress.map(check_progress).transpose()?;

    let mut updated = None;
    goals.update(
        |g| g.id == id && g.user_id == user_id,
        |g| {
            if let Some(name) = &name {
                g.name = name.clone();
            }
            if let Some(description) = &patch.description {
                g.description = non_empty(description.clone());
            }
            if let Some(folder_id) = &folder_id {
                g.folder_id = folder_id.clone();
            }
            if let Some(status) = patch.status {
                g.status = status;
            }
            if let Some(priority) = patch.priority {
                g.priority = priority;
            }
            if let Some(progress) = progress {
                g.progress = progress;
            }
            if let Some(deadline) = patch.deadline {
                g.deadline = deadline;
            }
            if let Some(ids) = &patch.bookmark_ids {
                g.bookmark_ids = dedup(ids.clone());
            }
            settle_completion(g);
            g.updated_at = Utc::now();
            updated = Some(g.clone());
        },
    )?;
    updated.ok_or_else(|| BookmarkError::NotFound(NOT_FOUND.to_string()))
}

pub fn delete<B: StorageBackend>(
    storage: &FileStorage<Goal, B>,
    user_id: &str,
    id: &str,
) -> Result<()> {
    require_id("goal", id)?;
    if storage.delete(|g| g.id == id && g.user_id == user_id)? {
        Ok(())
    } else {
        Err(BookmarkError::NotFound(NOT_FOUND.to_string()))
    }
}

fn ensure_folder<B: StorageBackend>(
    folders: &FileStorage<GoalFolder, B>,
    user_id: &str,
    folder_id: &str,
) -> Result<()> {
    require_id("folder", folder_id)?;
    folders
        .find(|f| f.id == folder_id && f.user_id == user_id)
        .map(|_| ())
        .ok_or_else(|| BookmarkError::NotFound(super::goal_folders::NOT_FOUND.to_string()))
}

fn check_progress(progress: u8) -> Result<u8> {
    if progress > 100 {
        return Err(BookmarkError::Validation(
            "Progress must be between 0 and 100".to_string(),
        ));
    }
    Ok(progress)
}

/// Completed goals are at 100%, and a goal at 100% is completed.
fn settle_completion(goal: &mut Goal) {
    if goal.status == GoalStatus::Completed {
        goal.progress = 100;
    } else if goal.progress == 100 && goal.status != GoalStatus::Archived {
        goal.status = GoalStatus::Completed;
    }
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
