// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    ActorRole, Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest, CancelAppointmentRequest, CompleteAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::booking::BookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub client_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

fn actor_role(user: &User) -> ActorRole {
    if user.is_admin() {
        ActorRole::Admin
    } else {
        ActorRole::Client
    }
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotTaken => {
            AppError::Conflict("Requested slot is already booked".to_string())
        }
        AppointmentError::PolicyViolation(msg) => AppError::PolicyViolation(msg),
        AppointmentError::InvalidStatusTransition(status) => {
            AppError::PolicyViolation(format!("Cannot modify appointment in status: {}", status))
        }
        AppointmentError::InvalidTime(msg) => AppError::BadRequest(msg),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::Unauthorized => {
            AppError::Forbidden("Not authorized for this appointment action".to_string())
        }
        AppointmentError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

fn ensure_owner_or_admin(appointment: &Appointment, user: &User) -> Result<(), AppError> {
    let is_owner = appointment.client_id.to_string() == user.id;
    if !is_owner && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to access this appointment".to_string(),
        ));
    }
    Ok(())
}

// ==============================================================================
// SLOT DISCOVERY
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<SlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let slots = booking_service
        .available_slots(params.date, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "date": params.date,
        "available_slots": slots,
        "total": slots.len()
    })))
}

// ==============================================================================
// BOOKING AND MUTATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Clients book for themselves; only the admin books on behalf of others.
    let is_own = request.client_id.to_string() == user.id;
    if !is_own && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Not authorized to book for this client".to_string(),
        ));
    }

    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .book_appointment(request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    ensure_owner_or_admin(&appointment, &user)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;
    ensure_owner_or_admin(&appointment, &user)?;

    let updated = booking_service
        .update_appointment(appointment_id, request, actor_role(&user), auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": updated,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;
    ensure_owner_or_admin(&appointment, &user)?;

    let cancelled = booking_service
        .cancel_appointment(appointment_id, request, actor_role(&user), auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": cancelled,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let confirmed = booking_service
        .confirm_appointment(appointment_id, actor_role(&user), auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": confirmed,
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let completed = booking_service
        .complete_appointment(appointment_id, request, actor_role(&user), auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": completed,
        "message": "Appointment completed"
    })))
}

// ==============================================================================
// SEARCH
// ==============================================================================

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<AppointmentQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking_service = BookingService::new(&state);

    let mut search_query = AppointmentSearchQuery {
        client_id: params.client_id,
        status: params.status,
        from_date: params.from_date,
        to_date: params.to_date,
        limit: params.limit,
        offset: params.offset,
    };

    // Non-admins only ever see their own appointments.
    if !user.is_admin() {
        if let Ok(client_uuid) = Uuid::parse_str(&user.id) {
            search_query.client_id = Some(client_uuid);
        }
    }

    let appointments = booking_service
        .search_appointments(search_query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
        "limit": params.limit,
        "offset": params.offset
    })))
}
