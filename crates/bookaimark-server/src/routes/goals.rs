//! `/api/goals`. GET takes optional `folder_id` and `status` filters.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use bookaimark::commands::goals::{GoalFilter, GoalPatch, NewGoal};
use bookaimark::model::GoalStatus;
use serde::Deserialize;

use super::{query, target_id, IdQuery, WithId, WithUser};
use crate::auth::resolve_owner;
use crate::response::{list as list_response, ok, success, ApiError, ApiResult, SuccessOptions};
use crate::state::SharedState;

const RESOURCE: &str = "goals";

#[derive(Debug, Default, Deserialize)]
pub struct GoalQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl GoalQuery {
    fn filter(&self) -> Result<GoalFilter, ApiError> {
        let status = match self.status.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(
                raw.parse::<GoalStatus>()
                    .map_err(|err| ApiError::validation_error(err))?,
            ),
            None => None,
        };
        Ok(GoalFilter {
            folder_id: self.folder_id.clone().filter(|id| !id.trim().is_empty()),
            status,
        })
    }
}

pub async fn list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<GoalQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let filter = params.filter()?;
    let goals = state
        .run(move |api| Ok(api.list_goals(&user_id, &filter)))
        .await?;
    Ok(list_response(goals))
}

pub async fn create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<WithUser<NewGoal>>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;

    let owner = user_id.clone();
    let goal = state
        .run(move |api| api.create_goal(&owner, body.input))
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(success(goal, SuccessOptions::created().message("Goal created")))
}

pub async fn update(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<WithId<GoalPatch>>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;
    let id = target_id(body.id, "Goal")?;

    let owner = user_id.clone();
    let goal = state
        .run(move |api| api.update_goal(&owner, &id, body.patch))
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(ok(goal))
}

pub async fn remove(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let id = target_id(params.id, "Goal")?;

    let (owner, target) = (user_id.clone(), id.clone());
    state
        .run(move |api| api.delete_goal(&owner, &target))
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(success(
        serde_json::json!({ "id": id }),
        SuccessOptions::default().message("Goal deleted"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parses_status() {
        let query = GoalQuery {
            status: Some("in_progress".into()),
            folder_id: Some(" ".into()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.status, Some(GoalStatus::InProgress));
        assert_eq!(filter.folder_id, None);
    }

    #[test]
    fn test_filter_rejects_unknown_status() {
        let query = GoalQuery {
            status: Some("someday".into()),
            ..Default::default()
        };
        let err = query.filter().unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "Invalid goal status: someday");
    }
}
