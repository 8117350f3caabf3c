//! `/api/settings`: per-user key/value settings through the tri-store.
//!
//! GET answers the stored value or `null`, with the backend it came from in
//! `meta.source`. PUT answers the written value with the per-backend write
//! report in `meta.report`; it only fails when every backend failed.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::query;
use crate::auth::resolve_owner;
use crate::response::{success, ApiError, ApiResult, SuccessOptions};
use crate::state::SharedState;

const RESOURCE: &str = "settings";

#[derive(Debug, Default, Deserialize)]
pub struct SettingQuery {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SettingBody {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn require_key(key: Option<String>) -> Result<String, ApiError> {
    key.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::validation_error("Setting key is required"))
}

pub async fn read(
    State(state): State<SharedState>,
    headers: HeaderMap,
    params: Result<Query<SettingQuery>, QueryRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let params = query(params)?;
    let user_id = resolve_owner(&identity, params.user_id.as_deref())?;
    let key = require_key(params.key)?;

    let read = state.api.read_setting(&user_id, &key, Value::Null).await?;
    Ok(success(
        read.value,
        SuccessOptions::default().meta(serde_json::json!({ "source": read.source })),
    ))
}

pub async fn write(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<SettingBody>, JsonRejection>,
) -> ApiResult {
    let identity = state.authenticate(&headers)?;
    let Json(body) = body?;
    let user_id = resolve_owner(&identity, body.user_id.as_deref())?;
    let key = require_key(body.key)?;

    let report = state
        .api
        .write_setting(&user_id, &key, body.value.clone())
        .await?;
    state.invalidate(&[RESOURCE], &user_id);
    Ok(success(
        body.value,
        SuccessOptions::default()
            .message("Setting saved")
            .meta(serde_json::json!({ "report": report })),
    ))
}
