//! # API Facade
//!
//! A thin facade over the command layer and the settings store. It is the single
//! entry point the server (or any other front end) uses for data operations.
//!
//! ## What the API Does NOT Do
//!
//! - **Business logic**: that belongs in `commands/*.rs`
//! - **Identity checks**: callers pass an already authorized `user_id`
//! - **Presentation**: returns records and reports, never envelopes or strings
//!
//! ## Generic Over StorageBackend
//!
//! `BookmarkApi<B: StorageBackend>` is generic over the document backend:
//! - Production: `BookmarkApi<FsBackend>`, built by [`BookmarkApi::open`]
//! - Testing: `BookmarkApi<MemBackend>`

use serde_json::Value;
use std::sync::Arc;

use crate::commands::categories::{self, CategoryPatch, NewCategory};
use crate::commands::goal_folders::{self, FolderRemoval, GoalFolderPatch, NewGoalFolder};
use crate::commands::goals::{self, GoalFilter, GoalPatch, NewGoal};
use crate::commands::hierarchy::{self, Placement};
use crate::config::BookmarkConfig;
use crate::error::Result;
use crate::model::{Category, Goal, GoalFolder, HierarchyAssignment};
use crate::settings::{SettingRead, TriStore, WriteReport};
use crate::store::{FileStorage, FsBackend, StorageBackend};

pub struct BookmarkApi<B: StorageBackend = FsBackend> {
    categories: FileStorage<Category, B>,
    goal_folders: FileStorage<GoalFolder, B>,
    goals: FileStorage<Goal, B>,
    hierarchy: FileStorage<HierarchyAssignment, B>,
    settings: TriStore,
}

impl BookmarkApi<FsBackend> {
    /// Open the data directory named by `config` and wire the settings backends.
    pub fn open(config: &BookmarkConfig) -> Result<Self> {
        let root = config.resolved_data_dir();
        tracing::info!(data_dir = %root.display(), "opening data directory");
        let backend = Arc::new(FsBackend::new(root));
        let settings = TriStore::from_config(config, Arc::clone(&backend))?;
        Ok(Self::new(backend, settings))
    }
}

impl<B: StorageBackend> BookmarkApi<B> {
    pub fn new(backend: Arc<B>, settings: TriStore) -> Self {
        Self {
            categories: FileStorage::with_backend(Arc::clone(&backend)),
            goal_folders: FileStorage::with_backend(Arc::clone(&backend)),
            goals: FileStorage::with_backend(Arc::clone(&backend)),
            hierarchy: FileStorage::with_backend(backend),
            settings,
        }
    }

    pub fn settings(&self) -> &TriStore {
        &self.settings
    }

    pub fn list_categories(&self, user_id: &str) -> Vec<Category> {
        categories::list(&self.categories, user_id)
    }

    pub fn create_category(&self, user_id: &str, input: NewCategory) -> Result<Category> {
        categories::create(&self.categories, user_id, input)
    }

    pub fn update_category(&self, user_id: &str, id: &str, patch: CategoryPatch) -> Result<Category> {
        categories::update(&self.categories, user_id, id, patch)
    }

    pub fn delete_category(&self, user_id: &str, id: &str) -> Result<()> {
        categories::delete(&self.categories, user_id, id)
    }

    pub fn list_goal_folders(&self, user_id: &str) -> Vec<GoalFolder> {
        goal_folders::list(&self.goal_folders, user_id)
    }

    pub fn create_goal_folder(&self, user_id: &str, input: NewGoalFolder) -> Result<GoalFolder> {
        goal_folders::create(&self.goal_folders, user_id, input)
    }

    pub fn update_goal_folder(
        &self,
        user_id: &str,
        id: &str,
        patch: GoalFolderPatch,
    ) -> Result<GoalFolder> {
        goal_folders::update(&self.goal_folders, user_id, id, patch)
    }

    pub fn delete_goal_folder(&self, user_id: &str, id: &str) -> Result<FolderRemoval> {
        goal_folders::delete(
            &self.goal_folders,
            &self.goals,
            &self.hierarchy,
            user_id,
            id,
        )
    }

    pub fn list_goals(&self, user_id: &str, filter: &GoalFilter) -> Vec<Goal> {
        goals::list(&self.goals, user_id, filter)
    }

    pub fn create_goal(&self, user_id: &str, input: NewGoal) -> Result<Goal> {
        goals::create(&self.goals, &self.goal_folders, user_id, input)
    }

    pub fn update_goal(&self, user_id: &str, id: &str, patch: GoalPatch) -> Result<Goal> {
        goals::update(&self.goals, &self.goal_folders, user_id, id, patch)
    }

    pub fn delete_goal(&self, user_id: &str, id: &str) -> Result<()> {
        goals::delete(&self.goals, user_id, id)
    }

    pub fn list_hierarchy(&self, user_id: &str) -> Vec<HierarchyAssignment> {
        hierarchy::list(&self.hierarchy, user_id)
    }

    pub fn replace_hierarchy(
        &self,
        user_id: &str,
        placements: Vec<Placement>,
    ) -> Result<Vec<HierarchyAssignment>> {
        hierarchy::replace(&self.hierarchy, user_id, placements)
    }

    pub async fn read_setting(&self, user_id: &str, key: &str, default: Value) -> Result<SettingRead> {
        self.settings.read(user_id, key, default).await
    }

    pub async fn write_setting(&self, user_id: &str, key: &str, value: Value) -> Result<WriteReport> {
        self.settings.write(user_id, key, value).await
    }
}
