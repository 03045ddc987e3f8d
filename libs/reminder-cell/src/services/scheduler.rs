// libs/reminder-cell/src/services/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use booking_cell::models::{ActorRole, Appointment};
use booking_cell::services::lifecycle::AppointmentLifecycleService;
use shared_config::{AppConfig, SchedulingPolicy};
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CleanupSweepSummary, DispatchSweepSummary, ReminderError, SchedulerState, SchedulerStats,
};
use crate::services::notifier::NotificationSender;

const DISPATCH_INTERVAL: Duration = Duration::from_secs(5 * 60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const REMINDER_TEMPLATE: &str = "appointment_reminder";

/// Owns the two periodic sweeps: reminder dispatch (every five minutes) and
/// cleanup (daily). Explicitly started and stopped by whoever composes the
/// server; holds no global state.
pub struct ReminderScheduler {
    supabase: Arc<SupabaseClient>,
    notifier: Arc<dyn NotificationSender>,
    lifecycle: AppointmentLifecycleService,
    policy: SchedulingPolicy,
    state: RwLock<SchedulerState>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(config: &AppConfig, notifier: Arc<dyn NotificationSender>) -> Self {
        let policy = config.scheduling.clone();
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            notifier,
            lifecycle: AppointmentLifecycleService::new(policy.clone()),
            policy,
            state: RwLock::new(SchedulerState::Idle),
            handles: Mutex::new(Vec::new()),
        }
    }

    // ==========================================================================
    // LIFECYCLE OF THE SWEEP LOOPS
    // ==========================================================================

    pub async fn start(self: &Arc<Self>) -> Result<(), ReminderError> {
        {
            let mut state = self.state.write().await;
            if *state == SchedulerState::Running {
                return Err(ReminderError::AlreadyRunning);
            }
            *state = SchedulerState::Running;
        }

        info!(
            "Starting reminder scheduler (dispatch every {}s, cleanup every {}s)",
            DISPATCH_INTERVAL.as_secs(),
            CLEANUP_INTERVAL.as_secs()
        );

        let dispatcher = Arc::clone(self);
        let dispatch_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DISPATCH_INTERVAL);
            loop {
                ticker.tick().await;
                if !dispatcher.is_running().await {
                    break;
                }
                match dispatcher.run_dispatch_sweep(Utc::now()).await {
                    Ok(summary) => debug!(
                        "Dispatch sweep done: {} dispatched, {} failed of {} examined",
                        summary.dispatched, summary.failed, summary.examined
                    ),
                    Err(e) => error!("Dispatch sweep failed: {}", e),
                }
            }
        });

        let cleaner = Arc::clone(self);
        let cleanup_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                ticker.tick().await;
                if !cleaner.is_running().await {
                    break;
                }
                match cleaner.run_cleanup_sweep(Utc::now()).await {
                    Ok(summary) => debug!(
                        "Cleanup sweep done: {} reminders pruned, {} no-shows marked",
                        summary.reminders_pruned, summary.no_shows_marked
                    ),
                    Err(e) => error!("Cleanup sweep failed: {}", e),
                }
            }
        });

        let mut handles = self.handles.lock().await;
        handles.push(dispatch_handle);
        handles.push(cleanup_handle);

        Ok(())
    }

    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            *state = SchedulerState::Idle;
        }

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }

        info!("Reminder scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.state.read().await == SchedulerState::Running
    }

    // ==========================================================================
    // DISPATCH SWEEP
    // ==========================================================================

    /// Dispatch every due, unsent reminder among active appointments. A
    /// delivery failure affects only its own appointment; the reminder stays
    /// unsent and is retried on the next cycle.
    pub async fn run_dispatch_sweep(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DispatchSweepSummary, ReminderError> {
        let appointments = self.fetch_active_appointments().await?;
        let mut summary = DispatchSweepSummary::default();

        for appointment in appointments {
            if !appointment.reminders.iter().any(|r| r.is_due(now)) {
                continue;
            }
            summary.examined += 1;

            match self.dispatch_one(&appointment, now).await {
                Ok(()) => summary.dispatched += 1,
                Err(e) => {
                    warn!(
                        "Reminder dispatch failed for appointment {}: {}",
                        appointment.id, e
                    );
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Operator escape hatch: dispatch the due reminder of a single
    /// appointment through the same path the sweep uses.
    pub async fn dispatch_for_appointment(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ReminderError> {
        let appointment = self.fetch_appointment(appointment_id).await?;

        if !appointment.is_active() {
            return Err(ReminderError::NothingDue);
        }
        if !appointment.reminders.iter().any(|r| r.is_due(now)) {
            return Err(ReminderError::NothingDue);
        }

        self.dispatch_one(&appointment, now).await
    }

    /// Send one notification for the first due reminder and mark exactly
    /// that reminder as sent.
    async fn dispatch_one(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<(), ReminderError> {
        let due_index = appointment
            .reminders
            .iter()
            .position(|r| r.is_due(now))
            .ok_or(ReminderError::NothingDue)?;

        let recipient = self.lookup_client_email(appointment.client_id).await?;

        self.notifier
            .send(
                &recipient,
                REMINDER_TEMPLATE,
                json!({
                    "appointment_id": appointment.id,
                    "date": appointment.date,
                    "start_time": appointment.start_time.format("%H:%M").to_string(),
                    "session_type": appointment.session_type,
                }),
            )
            .await?;

        let mut reminders = appointment.reminders.clone();
        reminders[due_index].sent = true;
        reminders[due_index].sent_at = Some(now);

        self.patch_appointment(
            appointment.id,
            json!({
                "reminders": reminders,
                "updated_at": now.to_rfc3339(),
            }),
        )
        .await?;

        info!(
            "Reminder dispatched for appointment {} ({})",
            appointment.id, recipient
        );
        Ok(())
    }

    // ==========================================================================
    // CLEANUP SWEEP
    // ==========================================================================

    /// Daily maintenance: prune sent reminders older than the retention
    /// window, then flip stale active appointments to no-show. Both passes
    /// tolerate per-item failures and are idempotent.
    pub async fn run_cleanup_sweep(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CleanupSweepSummary, ReminderError> {
        let mut summary = CleanupSweepSummary::default();

        summary.reminders_pruned = self.prune_sent_reminders(now).await?;
        summary.no_shows_marked = self.mark_no_shows(now).await?;

        Ok(summary)
    }

    async fn prune_sent_reminders(&self, now: DateTime<Utc>) -> Result<usize, ReminderError> {
        let cutoff = now - chrono::Duration::days(self.policy.reminder_retention_days);

        // Prune candidates are past-dated: a sent reminder precedes its
        // session start, so one older than the retention window cannot
        // belong to an upcoming appointment.
        let path = format!(
            "/rest/v1/appointments?date=lte.{}&reminders=neq.[]",
            now.date_naive()
        );
        let appointments = self.fetch_appointments(&path).await?;

        let mut pruned = 0;
        for appointment in appointments {
            let retained: Vec<_> = appointment
                .reminders
                .iter()
                .filter(|r| !(r.sent && r.sent_at.map(|t| t < cutoff).unwrap_or(false)))
                .cloned()
                .collect();

            let removed = appointment.reminders.len() - retained.len();
            if removed == 0 {
                continue;
            }

            match self
                .patch_appointment(
                    appointment.id,
                    json!({
                        "reminders": retained,
                        "updated_at": now.to_rfc3339(),
                    }),
                )
                .await
            {
                Ok(()) => pruned += removed,
                Err(e) => warn!(
                    "Failed to prune reminders for appointment {}: {}",
                    appointment.id, e
                ),
            }
        }

        Ok(pruned)
    }

    async fn mark_no_shows(&self, now: DateTime<Utc>) -> Result<usize, ReminderError> {
        let appointments = self.fetch_active_appointments().await?;

        let mut marked = 0;
        for appointment in appointments {
            if self
                .lifecycle
                .check_mark_no_show(&appointment, ActorRole::System, now)
                .is_err()
            {
                continue;
            }

            match self
                .patch_appointment(
                    appointment.id,
                    json!({
                        "status": "no_show",
                        "updated_at": now.to_rfc3339(),
                    }),
                )
                .await
            {
                Ok(()) => {
                    info!("Appointment {} marked as no-show", appointment.id);
                    marked += 1;
                }
                Err(e) => warn!(
                    "Failed to mark appointment {} as no-show: {}",
                    appointment.id, e
                ),
            }
        }

        Ok(marked)
    }

    // ==========================================================================
    // STATISTICS
    // ==========================================================================

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<SchedulerStats, ReminderError> {
        let today = now.date_naive();
        let start_of_day = today.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now);

        let todays_path = format!(
            "/rest/v1/appointments?date=eq.{}&status=in.(scheduled,confirmed)",
            today
        );
        let todays_active = self.fetch_appointments(&todays_path).await?.len();

        let active = self.fetch_active_appointments().await?;
        let due_unsent = active
            .iter()
            .flat_map(|a| a.reminders.iter())
            .filter(|r| r.is_due(now))
            .count();

        // Reminders sent today sit on appointments starting no more than the
        // largest reminder offset ahead, and no earlier than yesterday.
        let max_offset = self
            .policy
            .reminder_offsets_hours
            .iter()
            .copied()
            .max()
            .unwrap_or(24);
        let window_end = (now + chrono::Duration::hours(max_offset + 1)).date_naive();
        let sent_path = format!(
            "/rest/v1/appointments?date=gte.{}&date=lte.{}&reminders=neq.[]",
            today.pred_opt().unwrap_or(today),
            window_end
        );
        let sent_today = self
            .fetch_appointments(&sent_path)
            .await?
            .iter()
            .flat_map(|a| a.reminders.iter())
            .filter(|r| r.sent && r.sent_at.map(|t| t >= start_of_day).unwrap_or(false))
            .count();

        Ok(SchedulerStats {
            todays_active_appointments: todays_active,
            due_unsent_reminders: due_unsent,
            reminders_sent_today: sent_today,
            sweep_active: self.is_running().await,
        })
    }

    // ==========================================================================
    // STORE ACCESS
    // ==========================================================================

    async fn fetch_active_appointments(&self) -> Result<Vec<Appointment>, ReminderError> {
        self.fetch_appointments("/rest/v1/appointments?status=in.(scheduled,confirmed)")
            .await
    }

    async fn fetch_appointments(&self, path: &str) -> Result<Vec<Appointment>, ReminderError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    ReminderError::DatabaseError(format!("Failed to parse appointment: {}", e))
                })
            })
            .collect()
    }

    async fn fetch_appointment(&self, id: Uuid) -> Result<Appointment, ReminderError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let mut rows = self.fetch_appointments(&path).await?;
        if rows.is_empty() {
            return Err(ReminderError::NotFound);
        }
        Ok(rows.remove(0))
    }

    async fn patch_appointment(&self, id: Uuid, patch: Value) -> Result<(), ReminderError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(patch),
                Some(SupabaseClient::returning_representation()),
            )
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn lookup_client_email(&self, client_id: Uuid) -> Result<String, ReminderError> {
        let path = format!("/rest/v1/profiles?id=eq.{}&select=email", client_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| ReminderError::DatabaseError(e.to_string()))?;

        result
            .first()
            .and_then(|row| row.get("email"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ReminderError::DeliveryFailure(format!("No email on file for client {}", client_id))
            })
    }
}
