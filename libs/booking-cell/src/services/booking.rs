// libs/booking-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::{AppConfig, SchedulingPolicy};
use shared_database::supabase::{is_conflict, SupabaseClient};

use crate::models::{
    ActorRole, Appointment, AppointmentError, AppointmentSearchQuery, BookAppointmentRequest,
    CancelAppointmentRequest, CompleteAppointmentRequest, Reminder, ReminderChannel,
    UpdateAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::SlotCalendar;

/// Orchestrates slot availability, validation, conflict checks and the
/// lifecycle state machine into the externally exposed booking operations.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    slots: SlotCalendar,
    lifecycle: AppointmentLifecycleService,
    policy: SchedulingPolicy,
    time_pattern: Regex,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let policy = config.scheduling.clone();
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            slots: SlotCalendar::new(policy.clone()),
            lifecycle: AppointmentLifecycleService::new(policy.clone()),
            policy,
            time_pattern: Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$")
                .expect("static time pattern compiles"),
        }
    }

    // ==========================================================================
    // SLOT DISCOVERY
    // ==========================================================================

    /// Bookable `HH:MM` start times for a date.
    pub async fn available_slots(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<String>, AppointmentError> {
        let booked = self.active_appointments_for_date(date, auth_token).await?;
        Ok(self.slots.available_slots(date, &booked))
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for client {} on {} at {}",
            request.client_id, request.date, request.start_time
        );

        let now = Utc::now();
        let start_time = self.validate_booking_request(&request, now)?;

        if self
            .slot_is_taken(request.date, start_time, None, auth_token)
            .await?
        {
            warn!(
                "Slot conflict on {} at {} - rejecting booking",
                request.date, request.start_time
            );
            return Err(AppointmentError::SlotTaken);
        }

        let start_datetime = request.date.and_time(start_time).and_utc();
        let reminders = self.compute_reminders(start_datetime, now);

        let row = json!({
            "client_id": request.client_id,
            "date": request.date,
            "start_time": start_time.format("%H:%M:%S").to_string(),
            "session_type": request.session_type,
            "duration_minutes": request.duration_minutes,
            "price": request.price,
            "payment_status": "pending",
            "status": "scheduled",
            "notes": request.notes,
            "reminders": reminders,
            "follow_up_required": false,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let result: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(row),
                Some(SupabaseClient::returning_representation()),
            )
            .await
            .map_err(|e| {
                // The storage layer carries a uniqueness constraint on the
                // active (date, start_time) pair; a 409 here means another
                // booking won the race after our read-side check.
                if is_conflict(&e) {
                    AppointmentError::SlotTaken
                } else {
                    AppointmentError::DatabaseError(e.to_string())
                }
            })?;

        let appointment = result
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        info!(
            "Appointment {} booked with {} reminder(s)",
            appointment.id,
            appointment.reminders.len()
        );
        Ok(appointment)
    }

    // ==========================================================================
    // LIFECYCLE OPERATIONS
    // ==========================================================================

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        actor: ActorRole,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {}", appointment_id);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        let now = Utc::now();
        self.lifecycle
            .check_cancel(&appointment, &request.reason, actor, now)?;

        let patch = json!({
            "status": "cancelled",
            "cancellation_reason": request.reason.trim(),
            "cancelled_at": now.to_rfc3339(),
            "cancelled_by": actor,
            "updated_at": now.to_rfc3339(),
        });

        let cancelled = self.patch_appointment(appointment_id, patch, auth_token).await?;
        info!("Appointment {} cancelled by {}", appointment_id, actor);
        Ok(cancelled)
    }

    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        actor: ActorRole,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Confirming appointment {}", appointment_id);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle.check_confirm(&appointment, actor)?;

        let patch = json!({
            "status": "confirmed",
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_appointment(appointment_id, patch, auth_token).await
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        request: CompleteAppointmentRequest,
        actor: ActorRole,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Completing appointment {}", appointment_id);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle.check_complete(&appointment, actor)?;

        if request.session_notes.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Session notes are required to complete an appointment".to_string(),
            ));
        }
        if request.session_notes.len() > self.policy.max_notes_length {
            return Err(AppointmentError::ValidationError(format!(
                "Session notes exceed {} characters",
                self.policy.max_notes_length
            )));
        }

        let patch = json!({
            "status": "completed",
            "session_notes": request.session_notes,
            "follow_up_required": request.follow_up_required.unwrap_or(false),
            "follow_up_date": request.follow_up_date,
            "updated_at": Utc::now().to_rfc3339(),
        });

        self.patch_appointment(appointment_id, patch, auth_token).await
    }

    /// Update an appointment. A date or time change is a reschedule: it runs
    /// the reschedule policy gate plus a fresh conflict check against the new
    /// slot (excluding this appointment), and recomputes unsent reminders for
    /// the new start.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        actor: ActorRole,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        let now = Utc::now();
        let mut patch = serde_json::Map::new();

        if request.is_reschedule() {
            self.lifecycle.check_reschedule(&current, actor, now)?;

            let new_date = request.date.unwrap_or(current.date);
            let new_time = match &request.start_time {
                Some(raw) => self.parse_start_time(raw)?,
                None => current.start_time,
            };

            self.validate_slot_timing(new_date, new_time, now)?;

            if self
                .slot_is_taken(new_date, new_time, Some(appointment_id), auth_token)
                .await?
            {
                return Err(AppointmentError::SlotTaken);
            }

            let new_start = new_date.and_time(new_time).and_utc();
            let reminders = self.reschedule_reminders(&current.reminders, new_start, now);

            patch.insert("date".to_string(), json!(new_date));
            patch.insert(
                "start_time".to_string(),
                json!(new_time.format("%H:%M:%S").to_string()),
            );
            patch.insert("reminders".to_string(), json!(reminders));
        }

        if let Some(notes) = &request.notes {
            if notes.len() > self.policy.max_notes_length {
                return Err(AppointmentError::ValidationError(format!(
                    "Notes exceed {} characters",
                    self.policy.max_notes_length
                )));
            }
            patch.insert("notes".to_string(), json!(notes));
        }

        if let Some(payment_status) = request.payment_status {
            if actor != ActorRole::Admin {
                return Err(AppointmentError::Unauthorized);
            }
            patch.insert("payment_status".to_string(), json!(payment_status));
        }

        if patch.is_empty() {
            return Ok(current);
        }

        patch.insert("updated_at".to_string(), json!(now.to_rfc3339()));
        self.patch_appointment(appointment_id, Value::Object(patch), auth_token)
            .await
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;

        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(client_id) = query.client_id {
            query_parts.push(format!("client_id=eq.{}", client_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            query_parts.push(format!("date=gte.{}", from_date));
        }
        if let Some(to_date) = query.to_date {
            query_parts.push(format!("date=lte.{}", to_date));
        }

        query_parts.push("order=date.asc,start_time.asc".to_string());
        query_parts.push(format!("limit={}", query.limit.unwrap_or(50)));
        query_parts.push(format!("offset={}", query.offset.unwrap_or(0)));

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })
            .collect()
    }

    async fn active_appointments_for_date(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?date=eq.{}&status=in.(scheduled,confirmed)",
            date
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })
            .collect()
    }

    // ==========================================================================
    // VALIDATION AND CONFLICTS
    // ==========================================================================

    fn parse_start_time(&self, raw: &str) -> Result<NaiveTime, AppointmentError> {
        if !self.time_pattern.is_match(raw) {
            return Err(AppointmentError::InvalidTime(format!(
                "Time must match HH:MM, got '{}'",
                raw
            )));
        }
        NaiveTime::parse_from_str(raw, "%H:%M")
            .map_err(|_| AppointmentError::InvalidTime(format!("Unparseable time '{}'", raw)))
    }

    /// The slot must be inside business hours and strictly in the future.
    fn validate_slot_timing(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if !self.slots.within_business_hours(time) {
            return Err(AppointmentError::InvalidTime(format!(
                "Sessions run between {:02}:00 and {:02}:00",
                self.policy.business_start_hour, self.policy.business_end_hour
            )));
        }

        if date.and_time(time).and_utc() <= now {
            return Err(AppointmentError::InvalidTime(
                "Appointment must be scheduled for a future time".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_booking_request(
        &self,
        request: &BookAppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<NaiveTime, AppointmentError> {
        let start_time = self.parse_start_time(&request.start_time)?;
        self.validate_slot_timing(request.date, start_time, now)?;

        if request.duration_minutes < self.policy.min_duration_minutes
            || request.duration_minutes > self.policy.max_duration_minutes
        {
            return Err(AppointmentError::ValidationError(format!(
                "Duration must be between {} and {} minutes",
                self.policy.min_duration_minutes, self.policy.max_duration_minutes
            )));
        }

        if !request.price.is_finite() || request.price < 0.0 {
            return Err(AppointmentError::ValidationError(
                "Price must be non-negative".to_string(),
            ));
        }

        if let Some(notes) = &request.notes {
            if notes.len() > self.policy.max_notes_length {
                return Err(AppointmentError::ValidationError(format!(
                    "Notes exceed {} characters",
                    self.policy.max_notes_length
                )));
            }
        }

        Ok(start_time)
    }

    /// Is any active appointment, regardless of client, already holding the
    /// exact (date, start time) pair? Single-practitioner clinic, so the
    /// check is global rather than per resource.
    async fn slot_is_taken(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?date=eq.{}&start_time=eq.{}&status=in.(scheduled,confirmed)",
            date,
            time.format("%H:%M:%S")
        );
        if let Some(id) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(!result.is_empty())
    }

    // ==========================================================================
    // REMINDERS
    // ==========================================================================

    /// One reminder per configured offset, skipping any whose dispatch time
    /// is already in the past (a same-day booking gets no 24h reminder).
    fn compute_reminders(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Reminder> {
        self.policy
            .reminder_offsets_hours
            .iter()
            .filter_map(|&offset| {
                let scheduled_for = start - chrono::Duration::hours(offset);
                (scheduled_for > now).then_some(Reminder {
                    channel: ReminderChannel::Email,
                    sent: false,
                    sent_at: None,
                    scheduled_for,
                })
            })
            .collect()
    }

    /// After a reschedule, already-sent reminders stay as an audit record;
    /// unsent ones are replaced with a fresh set for the new start.
    fn reschedule_reminders(
        &self,
        existing: &[Reminder],
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<Reminder> {
        let mut reminders: Vec<Reminder> =
            existing.iter().filter(|r| r.sent).cloned().collect();
        reminders.extend(self.compute_reminders(new_start, now));
        reminders
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        patch: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(patch),
                Some(SupabaseClient::returning_representation()),
            )
            .await
            .map_err(|e| {
                if is_conflict(&e) {
                    AppointmentError::SlotTaken
                } else {
                    AppointmentError::DatabaseError(e.to_string())
                }
            })?;

        result.into_iter().next().ok_or(AppointmentError::NotFound)
    }
}
