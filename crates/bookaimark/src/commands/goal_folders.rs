use chrono::Utc;
use serde::Deserialize;

use super::{double_option, non_empty, require_id, require_name};
use crate::error::{BookmarkError, Result};
use crate::model::{Goal, GoalFolder, HierarchyAssignment};
use crate::store::{FileStorage, StorageBackend};

pub const NOT_FOUND: &str = "Folder not found";
pub const DUPLICATE_NAME: &str = "Folder with this name already exists";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGoalFolder {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalFolderPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
}

/// What deleting a folder touched besides the folder itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderRemoval {
    pub detached_goals: usize,
    pub removed_assignments: usize,
}

pub fn list<B: StorageBackend>(
    storage: &FileStorage<GoalFolder, B>,
    user_id: &str,
) -> Vec<GoalFolder> {
    let mut folders = storage.for_user(user_id);
    folders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    folders
}

pub fn get<B: StorageBackend>(
    storage: &FileStorage<GoalFolder, B>,
    user_id: &str,
    id: &str,
) -> Result<GoalFolder> {
    require_id("folder", id)?;
    storage
        .find(|f| f.id == id && f.user_id == user_id)
        .ok_or_else(|| BookmarkError::NotFound(NOT_FOUND.to_string()))
}

pub fn create<B: StorageBackend>(
    storage: &FileStorage<GoalFolder, B>,
    user_id: &str,
    input: NewGoalFolder,
) -> Result<GoalFolder> {
    let name = require_name("Folder", &input.name)?;
    let mut folder = GoalFolder::new(user_id, name);
    folder.description = non_empty(input.description);
    folder.color = non_empty(input.color);

    storage.modify(|folders| {
        ensure_unique(folders, user_id, &folder.name, None)?;
        folders.push(folder.clone());
        Ok(((), true))
    })?;
    Ok(folder)
}

pub fn update<B: StorageBackend>(
    storage: &FileStorage<GoalFolder, B>,
    user_id: &str,
    id: &str,
    patch: GoalFolderPatch,
) -> Result<GoalFolder> {
    require_id("folder", id)?;
    let name = patch
        .name
        .as_deref()
        .map(|name| require_name("Folder", name))
        .transpose()?;

    storage.modify(|folders| {
        if let Some(name) = &name {
            ensure_unique(folders, user_id, name, Some(id))?;
        }
        let folder = folders
            .iter_mut()
            .find(|f| f.id == id && f.user_id == user_id)
            .ok_or_else(|| BookmarkError::NotFound(NOT_FOUND.to_string()))?;
        if let Some(name) = name {
            folder.name = name;
        }
        if let Some(description) = patch.description {
            folder.description = non_empty(description);
        }
        if let Some(color) = patch.color {
            folder.color = non_empty(color);
        }
        folder.updated_at = Utc::now();
        Ok((folder.clone(), true))
    })
}

/// Delete a folder. Its goals survive without a folder and its placement in
/// the sidebar tree is dropped. The folder row goes last, so a failed write
/// never leaves goals or placements pointing at a missing folder.
pub fn delete<B: StorageBackend>(
    folders: &FileStorage<GoalFolder, B>,
    goals: &FileStorage<Goal, B>,
    hierarchy: &FileStorage<HierarchyAssignment, B>,
    user_id: &str,
    id: &str,
) -> Result<FolderRemoval> {
    get(folders, user_id, id)?;

    let mut removal = FolderRemoval::default();
    goals.update(
        |g| g.user_id == user_id && g.folder_id.as_deref() == Some(id),
        |g| {
            g.folder_id = None;
            g.updated_at = Utc::now();
            removal.detached_goals += 1;
        },
    )?;

    removal.removed_assignments = hierarchy.modify(|assignments| {
        let before = assignments.len();
        assignments.retain(|a| !(a.user_id == user_id && a.folder_id == id));
        let removed = before - assignments.len();
        Ok((removed, removed > 0))
    })?;

    if !folders.delete(|f| f.id == id && f.user_id == user_id)? {
        return Err(BookmarkError::NotFound(NOT_FOUND.to_string()));
    }

    tracing::debug!(
        folder = id,
        detached_goals = removal.detached_goals,
        removed_assignments = removal.removed_assignments,
        "folder deleted"
    );
    Ok(removal)
}

fn ensure_unique(
    folders: &[GoalFolder],
    user_id: &str,
    name: &str,
    except_id: Option<&str>,
) -> Result<()> {
    let wanted = name.to_lowercase();
    let taken = folders.iter().any(|f| {
        f.user_id == user_id
            && Some(f.id.as_str()) != except_id
            && f.name.to_lowercase() == wanted
    });
    if taken {
        return Err(BookmarkError::Conflict(DUPLICATE_NAME.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::new_id;
    use crate::store::MemBackend;
    use std::sync::Arc;

    struct Stores {
        backend: Arc<MemBackend>,
        folders: FileStorage<GoalFolder, MemBackend>,
        goals: FileStorage<Goal, MemBackend>,
        hierarchy: FileStorage<HierarchyAssignment, MemBackend>,
    }

    fn stores() -> Stores {
        let backend = Arc::new(MemBackend::new());
        Stores {
            folders: FileStorage::with_backend(Arc::clone(&backend)),
            goals: FileStorage::with_backend(Arc::clone(&backend)),
            hierarchy: FileStorage::with_backend(Arc::clone(&backend)),
            backend,
        }
    }

    fn named(name: &str) -> NewGoalFolder {
        NewGoalFolder {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_get_folder() {
        let s = stores();
        let folder = create(&s.folders, "u1", named("Reading")).unwrap();

        assert_eq!(get(&s.folders, "u1", &folder.id).unwrap(), folder);
        assert!(matches!(
            get(&s.folders, "u2", &folder.id),
            Err(BookmarkError::NotFound(ref msg)) if msg == NOT_FOUND
        ));
    }

    #[test]
    fn test_duplicate_folder_name_conflicts() {
        let s = stores();
        create(&s.folders, "u1", named("Reading")).unwrap();
        assert!(matches!(
            create(&s.folders, "u1", named("reading")),
            Err(BookmarkError::Conflict(_))
        ));
    }

    #[test]
    fn test_update_folder() {
        let s = stores();
        let folder = create(&s.folders, "u1", named("Reading")).unwrap();
        let patch = GoalFolderPatch {
            color: Some(Some("#00ff00".into())),
            ..Default::default()
        };

        let updated = update(&s.folders, "u1", &folder.id, patch).unwrap();
        assert_eq!(updated.name, "Reading");
        assert_eq!(updated.color.as_deref(), Some("#00ff00"));
    }

    #[test]
    fn test_delete_missing_folder_is_not_found() {
        let s = stores();
        let err = delete(&s.folders, &s.goals, &s.hierarchy, "u1", &new_id()).unwrap_err();
        assert_eq!(err.to_string(), NOT_FOUND);
    }

    #[test]
    fn test_delete_detaches_goals_and_drops_placement() {
        let s = stores();
        let folder = create(&s.folders, "u1", named("Reading")).unwrap();

        let mut inside = Goal::new("u1", "Finish book");
        inside.folder_id = Some(folder.id.clone());
        let outside = Goal::new("u1", "Other");
        s.goals.write(&[inside.clone(), outside.clone()]).unwrap();
        s.hierarchy
            .append(HierarchyAssignment {
                id: new_id(),
                user_id: "u1".into(),
                folder_id: folder.id.clone(),
                parent_id: None,
                position: 0,
            })
            .unwrap();

        let removal = delete(&s.folders, &s.goals, &s.hierarchy, "u1", &folder.id).unwrap();

        assert_eq!(
            removal,
            FolderRemoval {
                detached_goals: 1,
                removed_assignments: 1
            }
        );
        assert!(list(&s.folders, "u1").is_empty());
        assert!(s.goals.read().iter().all(|g| g.folder_id.is_none()));
        assert_eq!(s.goals.read().len(), 2);
        assert!(s.hierarchy.read().is_empty());
    }

    #[test]
    fn test_rename_to_taken_name_conflicts() {
        let s = stores();
        create(&s.folders, "u1", named("Reading")).unwrap();
        let other = create(&s.folders, "u1", named("Travel")).unwrap();
        let patch = GoalFolderPatch {
            name: Some("READING".into()),
            ..Default::default()
        };

        assert!(matches!(
            update(&s.folders, "u1", &other.id, patch),
            Err(BookmarkError::Conflict(ref msg)) if msg == DUPLICATE_NAME
        ));
        assert_eq!(get(&s.folders, "u1", &other.id).unwrap().name, "Travel");
    }

    #[test]
    fn test_failed_detach_keeps_the_folder() {
        let s = stores();
        let folder = create(&s.folders, "u1", named("Reading")).unwrap();
        let mut inside = Goal::new("u1", "Finish book");
        inside.folder_id = Some(folder.id.clone());
        s.goals.append(inside).unwrap();

        s.backend.set_simulate_write_error(true);
        assert!(delete(&s.folders, &s.goals, &s.hierarchy, "u1", &folder.id).is_err());
        s.backend.set_simulate_write_error(false);

        // Nothing points at a missing folder: the row and the goal link both survive.
        assert_eq!(get(&s.folders, "u1", &folder.id).unwrap(), folder);
        assert_eq!(
            s.goals.read()[0].folder_id.as_deref(),
            Some(folder.id.as_str())
        );

        let removal = delete(&s.folders, &s.goals, &s.hierarchy, "u1", &folder.id).unwrap();
        assert_eq!(removal.detached_goals, 1);
        assert!(list(&s.folders, "u1").is_empty());
    }
}
