use crate::api::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the database answers and the farm config has been loaded.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(e) = sqlx::query("SELECT 1").execute(state.repo.pool()).await {
        tracing::warn!(error = %e, "Readiness check: database unavailable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "database unavailable"})),
        );
    }

    let catalog = state.config_cache.snapshot();
    if let Err(e) = catalog.farm_rate() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "config not loaded", "error": e.to_string()})),
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "config_loaded_at_ms": catalog.loaded_at().map(|t| t.as_ms()),
        })),
    )
}
