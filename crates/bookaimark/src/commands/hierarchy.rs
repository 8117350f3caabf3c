use serde::Deserialize;
use std::collections::{HashMap, HashSet};

use crate::error::{BookmarkError, Result};
use crate::model::{new_id, HierarchyAssignment};
use crate::store::{FileStorage, StorageBackend};

/// One folder's requested place in the tree.
#[derive(Debug, Clone, Deserialize)]
pub struct Placement {
    pub folder_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: u32,
}

/// The user's assignments ordered by parent, then position.
pub fn list<B: StorageBackend>(
    storage: &FileStorage<HierarchyAssignment, B>,
    user_id: &str,
) -> Vec<HierarchyAssignment> {
    let mut assignments = storage.for_user(user_id);
    assignments.sort_by(|a, b| {
        a.parent_id
            .cmp(&b.parent_id)
            .then(a.position.cmp(&b.position))
    });
    assignments
}

/// Replace the user's whole tree. Other users' assignments are untouched.
pub fn replace<B: StorageBackend>(
    storage: &FileStorage<HierarchyAssignment, B>,
    user_id: &str,
    placements: Vec<Placement>,
) -> Result<Vec<HierarchyAssignment>> {
    validate(&placements)?;

    let assignments: Vec<HierarchyAssignment> = placements
        .into_iter()
        .map(|p| HierarchyAssignment {
            id: new_id(),
            user_id: user_id.to_string(),
            folder_id: p.folder_id.trim().to_string(),
            parent_id: p
                .parent_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            position: p.position,
        })
        .collect();

    storage.replace_where(|a| a.user_id == user_id, assignments)?;
    Ok(list(storage, user_id))
}

fn validate(placements: &[Placement]) -> Result<()> {
    let mut parents: HashMap<&str, Option<&str>> = HashMap::new();
    for placement in placements {
        let folder = placement.folder_id.trim();
        if folder.is_empty() {
            return Err(BookmarkError::Validation("folder_id is required".to_string()));
        }
        let parent = placement
            .parent_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());
        if parent == Some(folder) {
            return Err(BookmarkError::Validation(format!(
                "Folder {folder} cannot be its own parent"
            )));
        }
        if parents.insert(folder, parent).is_some() {
            return Err(BookmarkError::Validation(format!(
                "Folder {folder} is assigned more than once"
            )));
        }
    }

    for start in parents.keys() {
        let mut seen = HashSet::new();
        let mut current = Some(*start);
        while let Some(folder) = current {
            if !seen.insert(folder) {
                return Err(BookmarkError::Validation(
                    "Folder hierarchy contains a cycle".to_string(),
                ));
            }
            current = parents.get(folder).copied().flatten();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemBackend;
    use std::sync::Arc;

    fn storage() -> FileStorage<HierarchyAssignment, MemBackend> {
        FileStorage::with_backend(Arc::new(MemBackend::new()))
    }

    fn place(folder: &str, parent: Option<&str>, position: u32) -> Placement {
        Placement {
            folder_id: folder.to_string(),
            parent_id: parent.map(str::to_string),
            position,
        }
    }

    #[test]
    fn test_replace_swaps_only_the_users_tree() {
        let storage = storage();
        replace(&storage, "u2", vec![place("x", None, 0)]).unwrap();
        replace(&storage, "u1", vec![place("a", None, 0), place("b", None, 1)]).unwrap();

        let tree = replace(
            &storage,
            "u1",
            vec![place("c", None, 1), place("a", None, 0), place("b", Some("a"), 0)],
        )
        .unwrap();

        let folders: Vec<&str> = tree.iter().map(|a| a.folder_id.as_str()).collect();
        assert_eq!(folders, vec!["a", "c", "b"]);
        assert_eq!(list(&storage, "u2").len(), 1);
    }

    #[test]
    fn test_replace_with_empty_list_clears_tree() {
        let storage = storage();
        replace(&storage, "u1", vec![place("a", None, 0)]).unwrap();
        assert!(replace(&storage, "u1", Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_duplicate_and_self_parented_folders() {
        let storage = storage();
        assert!(matches!(
            replace(&storage, "u1", vec![place("a", None, 0), place("a", None, 1)]),
            Err(BookmarkError::Validation(_))
        ));
        assert!(matches!(
            replace(&storage, "u1", vec![place("a", Some("a"), 0)]),
            Err(BookmarkError::Validation(_))
        ));
        assert!(matches!(
            replace(&storage, "u1", vec![place(" ", None, 0)]),
            Err(BookmarkError::Validation(_))
        ));
        assert!(storage.read().is_empty());
    }

    #[test]
    fn test_rejects_cycles() {
        let storage = storage();
        let err = replace(
            &storage,
            "u1",
            vec![place("a", Some("b"), 0), place("b", Some("a"), 0)],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Folder hierarchy contains a cycle");
    }
}
