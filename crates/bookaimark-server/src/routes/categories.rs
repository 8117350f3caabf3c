//! `/api/categories`. Duplicate names answer 400 rather than 409.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use bookaimark::commands::categories::{CategoryPatch, NewCategory};

use super::{query, target_id, IdQuery, UserQuery, WithId, WithUser};
use crate::auth::resolve_owner;
use crate::response::{list as list_response, ok, success, ApiError, ApiResult, SuccessOptions};
use crate::state::SharedState;

const RESOURCE: &str = "categories";

pub async fn list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let categories = state
        .run(move |api| Ok(api.list_categories(&user_id)))
        .await?;
    Ok(list_response(categories))
}

pub async fn create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<WithUser<NewCategory>>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;

    let owner = user_id.clone();
    let category = state
        .run(move |api| api.create_category(&owner, body.input))
        .await
        .map_err(ApiError::conflict_as_validation)?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(success(
        category,
        SuccessOptions::created().message("Category created"),
    ))
}

pub async fn update(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<WithId<CategoryPatch>>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;
    let id = target_id(body.id, "Category")?;

    let owner = user_id.clone();
    let category = state
        .run(move |api| api.update_category(&owner, &id, body.patch))
        .await
        .map_err(ApiError::conflict_as_validation)?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(ok(category))
}

pub async fn remove(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let id = target_id(params.id, "Category")?;

    let (owner, target) = (user_id.clone(), id.clone());
    state
        .run(move |api| api.delete_category(&owner, &target))
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(success(
        serde_json::json!({ "id": id }),
        SuccessOptions::default().message("Category deleted"),
    ))
}
