//! `/api/hierarchy`: the user's folder tree, replaced wholesale on PUT.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use bookaimark::commands::hierarchy::Placement;
use serde::Deserialize;

use super::{query, UserQuery};
use crate::auth::resolve_owner;
use crate::response::{list as list_response, success, ApiResult, SuccessOptions};
use crate::state::SharedState;

const RESOURCE: &str = "hierarchy";

#[derive(Debug, Deserialize)]
pub struct ReplaceBody {
    #[serde(default)]
    pub user_id: Option<String>,
    pub assignments: Vec<Placement>,
}

pub async fn list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let assignments = state
        .run(move |api| Ok(api.list_hierarchy(&user_id)))
        .await?;
    Ok(list_response(assignments))
}

pub async fn replace(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<ReplaceBody>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;

    let owner = user_id.clone();
    let assignments = state
        .run(move |api| api.replace_hierarchy(&owner, body.assignments))
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    let count = assignments.len();
    Ok(success(
        assignments,
        SuccessOptions::default()
            .message("Hierarchy updated")
            .meta(serde_json::json!({ "count": count })),
    ))
}
