//! Combines the API routes from all portal modules into a unified router.

use axum::{routing::get, Json, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::intake::configure())
        .merge(crate::companies::configure())
        .merge(crate::invites::configure())
        .merge(crate::assets::configure())
        .merge(crate::secrets::configure())
        .route("/health", get(handle_health))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
