// libs/reminder-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::ReminderError;
use crate::services::ReminderScheduler;

fn map_reminder_error(err: ReminderError) -> AppError {
    match err {
        ReminderError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        ReminderError::NothingDue => {
            AppError::BadRequest("No reminder is due for this appointment".to_string())
        }
        ReminderError::AlreadyRunning => {
            AppError::Conflict("Scheduler is already running".to_string())
        }
        ReminderError::DeliveryFailure(msg) => AppError::ExternalService(msg),
        ReminderError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// GET /scheduler/stats - operational snapshot for the admin dashboard
#[axum::debug_handler]
pub async fn get_scheduler_stats(
    State(scheduler): State<Arc<ReminderScheduler>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let stats = scheduler
        .stats(Utc::now())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({
        "success": true,
        "stats": stats
    })))
}

/// POST /scheduler/appointments/{appointment_id}/dispatch - send the due
/// reminder for one appointment without waiting for the next sweep
#[axum::debug_handler]
pub async fn dispatch_appointment_reminder(
    State(scheduler): State<Arc<ReminderScheduler>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    info!(
        "Manual reminder dispatch for appointment {} requested by {}",
        appointment_id, user.id
    );

    scheduler
        .dispatch_for_appointment(appointment_id, Utc::now())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Reminder dispatched"
    })))
}

/// POST /scheduler/sweeps/dispatch - run a dispatch sweep immediately
#[axum::debug_handler]
pub async fn run_dispatch_sweep(
    State(scheduler): State<Arc<ReminderScheduler>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let summary = scheduler
        .run_dispatch_sweep(Utc::now())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({
        "success": true,
        "summary": summary
    })))
}

/// POST /scheduler/sweeps/cleanup - run a cleanup sweep immediately
#[axum::debug_handler]
pub async fn run_cleanup_sweep(
    State(scheduler): State<Arc<ReminderScheduler>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let summary = scheduler
        .run_cleanup_sweep(Utc::now())
        .await
        .map_err(map_reminder_error)?;

    Ok(Json(json!({
        "success": true,
        "summary": summary
    })))
}
