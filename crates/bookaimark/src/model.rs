//! # Domain Model
//!
//! Records persisted by the file-backed store. Every record carries a string `id`
//! (a UUID v4 generated by the caller) and the owning `user_id`; the storage layer
//! itself is schema-agnostic and only relies on the [`Record`] trait.
//!
//! ## Files
//!
//! | Record | File |
//! |--------|------|
//! | [`Category`] | `categories.json` |
//! | [`GoalFolder`] | `goal_folders.json` |
//! | [`Goal`] | `goals.json` |
//! | [`HierarchyAssignment`] | `hierarchy_assignments.json` |
//!
//! Field names follow the JSON the web client already consumes, which is why
//! `Category::bookmark_count` serializes as `bookmarkCount` while the rest stay
//! snake_case.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record that can live in a [`crate::store::FileStorage`].
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// File name (relative to the data directory) holding the array of records.
    const FILE_NAME: &'static str;

    fn id(&self) -> &str;
    fn user_id(&self) -> &str;
}

/// Fresh record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn is_valid_uuid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "bookmarkCount", default)]
    pub bookmark_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            color: None,
            bookmark_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Category {
    const FILE_NAME: &'static str = "categories.json";

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalFolder {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoalFolder {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            name: name.into(),
            description: None,
            color: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for GoalFolder {
    const FILE_NAME: &'static str = "goal_folders.json";

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Archived,
}

impl std::str::FromStr for GoalStatus {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(format!("Invalid goal status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default)]
    pub priority: GoalPriority,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bookmark_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            folder_id: None,
            name: name.into(),
            description: None,
            status: GoalStatus::default(),
            priority: GoalPriority::default(),
            progress: 0,
            deadline: None,
            bookmark_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Goal {
    const FILE_NAME: &'static str = "goals.json";

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Placement of a folder in the user's sidebar tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyAssignment {
    pub id: String,
    pub user_id: String,
    pub folder_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: u32,
}

impl Record for HierarchyAssignment {
    const FILE_NAME: &'static str = "hierarchy_assignments.json";

    fn id(&self) -> &str {
        &self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serializes_bookmark_count_in_camel_case() {
        let category = Category::new("user-1", "Dev");
        let json = serde_json::to_value(&category).unwrap();
        assert_eq!(json["bookmarkCount"], 0);
        assert_eq!(json["name"], "Dev");
        assert!(json.get("bookmark_count").is_none());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_goal_defaults_when_fields_missing() {
        let raw = serde_json::json!({
            "id": "g1",
            "user_id": "u1",
            "name": "Read more",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let goal: Goal = serde_json::from_value(raw).unwrap();
        assert_eq!(goal.status, GoalStatus::NotStarted);
        assert_eq!(goal.priority, GoalPriority::Medium);
        assert_eq!(goal.progress, 0);
        assert!(goal.bookmark_ids.is_empty());
        assert!(goal.folder_id.is_none());
    }

    #[test]
    fn test_goal_status_parsing() {
        assert_eq!("in_progress".parse::<GoalStatus>(), Ok(GoalStatus::InProgress));
        assert_eq!(" Completed ".parse::<GoalStatus>(), Ok(GoalStatus::Completed));
        assert!("done".parse::<GoalStatus>().is_err());
    }

    #[test]
    fn test_new_ids_are_valid_uuids() {
        let id = new_id();
        assert!(is_valid_uuid(&id));
        assert!(!is_valid_uuid("not-a-uuid"));
    }
}
