use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    Json,
};
use serde_json::json;

use booking_cell::router::booking_routes;
use reminder_cell::router::reminder_routes;
use reminder_cell::services::ReminderScheduler;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>, scheduler: Arc<ReminderScheduler>) -> Router {
    Router::new()
        .route(
            "/",
            get(|| async { Json(json!({ "status": "ok", "service": "luma-clinic-api" })) }),
        )
        .nest("/appointments", booking_routes(state.clone()))
        .nest("/scheduler", reminder_routes(state, scheduler))
}
