// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // Every booking operation acts as the authenticated patient
    let protected_routes = Router::new()
        .route("/slots/validate", post(handlers::validate_slot))
        .route("/doctors/{doctor_id}/capacity", get(handlers::get_doctor_capacity))
        .route("/doctors/{doctor_id}/booked", get(handlers::get_booked_appointments))
        .route("/book", post(handlers::book_appointment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
