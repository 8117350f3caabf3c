//! # HTTP Routes
//!
//! One module per resource. Handlers follow the same steps:
//!
//! 1. Authenticate the caller.
//! 2. Parse the query or body (extractor rejections become 400s).
//! 3. Resolve the `user_id` the caller may act on
//!    ([`resolve_owner`](crate::auth::resolve_owner)).
//! 4. Call one [`BookmarkApi`](bookaimark::api::BookmarkApi) method.
//! 5. On writes, invalidate the resource's cached GETs and the user's tag.
//! 6. Wrap the result in the response envelope.
//!
//! Identity is resolved before the body is inspected, so an unauthenticated
//! request is a 401 whatever it carries.

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::middleware;
use crate::response::{handle_panic, ApiError};
use crate::state::SharedState;

pub mod categories;
pub mod goal_folders;
pub mod goals;
pub mod health;
pub mod hierarchy;
pub mod settings;

pub fn create_router(state: SharedState) -> Router {
    let api = Router::new()
        .route(
            "/api/categories",
            get(categories::list)
                .post(categories::create)
                .put(categories::update)
                .delete(categories::remove),
        )
        .route(
            "/api/goal-folders",
            get(goal_folders::list)
                .post(goal_folders::create)
                .put(goal_folders::update)
                .delete(goal_folders::remove),
        )
        .route(
            "/api/goals",
            get(goals::list)
                .post(goals::create)
                .put(goals::update)
                .delete(goals::remove),
        )
        .route("/api/hierarchy", get(hierarchy::list).put(hierarchy::replace))
        .route("/api/settings", get(settings::read).put(settings::write))
        .layer(from_fn_with_state(state.clone(), middleware::cache))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    Router::new()
        .route("/api/health", get(health::health))
        .merge(api)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `?user_id=` on list routes.
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `?id=&user_id=` on DELETE.
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A POST body: the entity's fields plus an optional `user_id`.
#[derive(Debug, Deserialize)]
pub struct WithUser<T> {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub input: T,
}

/// A PUT body: the record `id`, an optional `user_id` and the fields to change.
#[derive(Debug, Deserialize)]
pub struct WithId<T> {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub patch: T,
}

pub(crate) fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    Ok(query?.0)
}

/// The `id` a PUT or DELETE targets.
pub(crate) fn target_id(id: Option<String>, kind: &str) -> Result<String, ApiError> {
    id.filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::validation_error(format!("{kind} id is required")))
}
