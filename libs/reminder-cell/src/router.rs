// libs/reminder-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::get, routing::post, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::ReminderScheduler;

pub fn reminder_routes(config: Arc<AppConfig>, scheduler: Arc<ReminderScheduler>) -> Router {
    // All scheduler operations require authentication; handlers enforce the
    // admin role on top.
    Router::new()
        .route("/stats", get(handlers::get_scheduler_stats))
        .route(
            "/appointments/{appointment_id}/dispatch",
            post(handlers::dispatch_appointment_reminder),
        )
        .route("/sweeps/dispatch", post(handlers::run_dispatch_sweep))
        .route("/sweeps/cleanup", post(handlers::run_cleanup_sweep))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(scheduler)
}
