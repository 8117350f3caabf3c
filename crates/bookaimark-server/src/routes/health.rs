use axum::response::Response;

use crate::response::ok;

pub async fn health() -> Response {
    ok(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
