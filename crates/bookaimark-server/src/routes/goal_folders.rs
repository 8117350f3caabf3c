//! `/api/goal-folders`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use bookaimark::commands::goal_folders::{GoalFolderPatch, NewGoalFolder};

use super::{query, target_id, IdQuery, UserQuery, WithId, WithUser};
use crate::auth::resolve_owner;
use crate::response::{list as list_response, ok, success, ApiResult, SuccessOptions};
use crate::state::SharedState;

const RESOURCE: &str = "goal-folders";

pub async fn list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let folders = state
        .run(move |api| Ok(api.list_goal_folders(&user_id)))
        .await?;
    Ok(list_response(folders))
}

pub async fn create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<WithUser<NewGoalFolder>>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;

    let owner = user_id.clone();
    let folder = state
        .run(move |api| api.create_goal_folder(&owner, body.input))
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(success(
        folder,
        SuccessOptions::created().message("Folder created"),
    ))
}

pub async fn update(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<WithId<GoalFolderPatch>>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;
    let id = target_id(body.id, "Folder")?;

    let owner = user_id.clone();
    let folder = state
        .run(move |api| api.update_goal_folder(&owner, &id, body.patch))
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(ok(folder))
}

/// Deleting a folder detaches its goals and drops its hierarchy placements,
/// so those resources are invalidated too.
pub async fn remove(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let id = target_id(params.id, "Folder")?;

    let (owner, target) = (user_id.clone(), id.clone());
    let removal = state
        .run(move |api| api.delete_goal_folder(&owner, &target))
        .await?;
    state.invalidate(&[RESOURCE, "goals", "hierarchy"], &user_id);
    Ok(success(
        serde_json::json!({ "id": id }),
        SuccessOptions::default()
            .message("Folder deleted")
            .meta(serde_json::json!({
                "detached_goals": removal.detached_goals,
                "removed_assignments": removal.removed_assignments,
            })),
    ))
}
