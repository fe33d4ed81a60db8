use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .route("/healthz", get(health).with_state(state.clone()))
        .nest("/appointments", appointment_routes(state))
}

async fn health(State(config): State<Arc<AppConfig>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend_configured": config.is_configured(),
    }))
}
