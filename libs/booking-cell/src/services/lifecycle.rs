// libs/booking-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use shared_config::SchedulingPolicy;

use crate::models::{ActorRole, Appointment, AppointmentError, AppointmentStatus};

/// State machine for an appointment's status, including the time-window
/// policies gating client-initiated changes.
///
/// Every check takes the acting role and the current instant explicitly, so
/// the rules live in one place instead of being scattered across handlers.
pub struct AppointmentLifecycleService {
    policy: SchedulingPolicy,
}

impl AppointmentLifecycleService {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self { policy }
    }

    /// All statuses reachable from `current`.
    pub fn valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    pub fn validate_status_transition(
        &self,
        current: AppointmentStatus,
        new: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition {} -> {}", current, new);

        if !self.valid_transitions(current).contains(&new) {
            warn!("Invalid status transition attempted: {} -> {}", current, new);
            return Err(AppointmentError::InvalidStatusTransition(current));
        }

        Ok(())
    }

    /// Admin confirmation of a scheduled appointment, no time restriction.
    pub fn check_confirm(
        &self,
        appointment: &Appointment,
        actor: ActorRole,
    ) -> Result<(), AppointmentError> {
        if actor != ActorRole::Admin {
            return Err(AppointmentError::Unauthorized);
        }
        if appointment.status != AppointmentStatus::Scheduled {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }
        Ok(())
    }

    /// Cancellation: scheduled only, and at least `cancel_window_hours`
    /// before the session start. Cancelling frees the slot with no
    /// compensating action, hence the longer notice window compared to
    /// rescheduling.
    pub fn check_cancel(
        &self,
        appointment: &Appointment,
        reason: &str,
        actor: ActorRole,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if !matches!(actor, ActorRole::Client | ActorRole::Admin) {
            return Err(AppointmentError::Unauthorized);
        }
        if appointment.status != AppointmentStatus::Scheduled {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let trimmed = reason.trim();
        if trimmed.is_empty() {
            return Err(AppointmentError::ValidationError(
                "Cancellation reason is required".to_string(),
            ));
        }
        if trimmed.len() > self.policy.max_notes_length {
            return Err(AppointmentError::ValidationError(format!(
                "Cancellation reason exceeds {} characters",
                self.policy.max_notes_length
            )));
        }

        let window = Duration::hours(self.policy.cancel_window_hours);
        if appointment.start_datetime() - now < window {
            return Err(AppointmentError::PolicyViolation(format!(
                "less than {} hours before appointment",
                self.policy.cancel_window_hours
            )));
        }

        Ok(())
    }

    /// Rescheduling gate: scheduled only, at least `reschedule_window_hours`
    /// before the *current* start. The new slot's conflict check is the
    /// booking service's job.
    pub fn check_reschedule(
        &self,
        appointment: &Appointment,
        actor: ActorRole,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if !matches!(actor, ActorRole::Client | ActorRole::Admin) {
            return Err(AppointmentError::Unauthorized);
        }
        if appointment.status != AppointmentStatus::Scheduled {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let window = Duration::hours(self.policy.reschedule_window_hours);
        if appointment.start_datetime() - now < window {
            return Err(AppointmentError::PolicyViolation(format!(
                "less than {} hours before appointment",
                self.policy.reschedule_window_hours
            )));
        }

        Ok(())
    }

    /// Completion with session notes: admin only, from any non-terminal state.
    pub fn check_complete(
        &self,
        appointment: &Appointment,
        actor: ActorRole,
    ) -> Result<(), AppointmentError> {
        if actor != ActorRole::Admin {
            return Err(AppointmentError::Unauthorized);
        }
        if appointment.status.is_terminal() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }
        Ok(())
    }

    /// System-only transition applied by the cleanup sweep.
    pub fn check_mark_no_show(
        &self,
        appointment: &Appointment,
        actor: ActorRole,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if actor != ActorRole::System {
            return Err(AppointmentError::Unauthorized);
        }
        if !self.should_mark_no_show(appointment, now) {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }
        Ok(())
    }

    /// An active appointment whose end time passed more than the grace
    /// period ago was never attended.
    pub fn should_mark_no_show(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        if !appointment.is_active() {
            return false;
        }

        let grace = Duration::hours(self.policy.no_show_grace_hours);
        now - appointment.end_datetime() > grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    use crate::models::{PaymentStatus, SessionType};

    fn service() -> AppointmentLifecycleService {
        AppointmentLifecycleService::new(SchedulingPolicy::default())
    }

    fn appointment_starting_in(hours: i64, status: AppointmentStatus) -> Appointment {
        let start = Utc::now() + Duration::hours(hours);
        Appointment {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            date: start.date_naive(),
            start_time: start.time(),
            session_type: SessionType::Individual,
            duration_minutes: 50,
            price: 80.0,
            payment_status: PaymentStatus::Pending,
            status,
            notes: None,
            reminders: vec![],
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            session_notes: None,
            follow_up_required: false,
            follow_up_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_terminal_states_have_no_transitions() {
        let svc = service();
        assert!(svc.valid_transitions(AppointmentStatus::Completed).is_empty());
        assert!(svc.valid_transitions(AppointmentStatus::Cancelled).is_empty());
        assert!(svc.valid_transitions(AppointmentStatus::NoShow).is_empty());
    }

    #[test]
    fn test_confirm_requires_admin_and_scheduled() {
        let svc = service();
        let appt = appointment_starting_in(48, AppointmentStatus::Scheduled);

        assert!(svc.check_confirm(&appt, ActorRole::Admin).is_ok());
        assert_matches!(
            svc.check_confirm(&appt, ActorRole::Client),
            Err(AppointmentError::Unauthorized)
        );

        let confirmed = appointment_starting_in(48, AppointmentStatus::Confirmed);
        assert_matches!(
            svc.check_confirm(&confirmed, ActorRole::Admin),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
    }

    #[test]
    fn test_cancel_inside_window_is_policy_violation() {
        let svc = service();
        let appt = appointment_starting_in(23, AppointmentStatus::Scheduled);

        let err = svc
            .check_cancel(&appt, "can't make it", ActorRole::Client, Utc::now())
            .unwrap_err();
        assert_matches!(err, AppointmentError::PolicyViolation(msg) if msg.contains("24 hours"));
    }

    #[test]
    fn test_cancel_outside_window_succeeds() {
        let svc = service();
        let appt = appointment_starting_in(25, AppointmentStatus::Scheduled);

        assert!(svc
            .check_cancel(&appt, "can't make it", ActorRole::Client, Utc::now())
            .is_ok());
    }

    #[test]
    fn test_cancel_requires_reason() {
        let svc = service();
        let appt = appointment_starting_in(48, AppointmentStatus::Scheduled);

        assert_matches!(
            svc.check_cancel(&appt, "   ", ActorRole::Client, Utc::now()),
            Err(AppointmentError::ValidationError(_))
        );
    }

    #[test]
    fn test_cancel_from_confirmed_is_rejected() {
        // The 24h window only applies to scheduled appointments; confirmed
        // ones need the admin to intervene.
        let svc = service();
        let appt = appointment_starting_in(48, AppointmentStatus::Confirmed);

        assert_matches!(
            svc.check_cancel(&appt, "changed my mind", ActorRole::Client, Utc::now()),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
    }

    #[test]
    fn test_reschedule_window_is_12_hours() {
        let svc = service();

        let inside = appointment_starting_in(11, AppointmentStatus::Scheduled);
        assert_matches!(
            svc.check_reschedule(&inside, ActorRole::Client, Utc::now()),
            Err(AppointmentError::PolicyViolation(msg)) if msg.contains("12 hours")
        );

        let outside = appointment_starting_in(13, AppointmentStatus::Scheduled);
        assert!(svc
            .check_reschedule(&outside, ActorRole::Client, Utc::now())
            .is_ok());
    }

    #[test]
    fn test_complete_admin_only_from_non_terminal() {
        let svc = service();
        let scheduled = appointment_starting_in(-2, AppointmentStatus::Scheduled);
        let confirmed = appointment_starting_in(-2, AppointmentStatus::Confirmed);
        let cancelled = appointment_starting_in(-2, AppointmentStatus::Cancelled);

        assert!(svc.check_complete(&scheduled, ActorRole::Admin).is_ok());
        assert!(svc.check_complete(&confirmed, ActorRole::Admin).is_ok());
        assert_matches!(
            svc.check_complete(&cancelled, ActorRole::Admin),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
        assert_matches!(
            svc.check_complete(&scheduled, ActorRole::Client),
            Err(AppointmentError::Unauthorized)
        );
    }

    #[test]
    fn test_no_show_respects_grace_period() {
        let svc = service();
        let now = Utc::now();

        // Ended ~2 hours ago (start 3h ago minus 50 minutes duration).
        let stale = appointment_starting_in(-3, AppointmentStatus::Scheduled);
        assert!(svc.should_mark_no_show(&stale, now));

        // Ended roughly half an hour ago, still within the 1 hour grace.
        let recent = appointment_starting_in(-1, AppointmentStatus::Confirmed);
        assert!(!svc.should_mark_no_show(&recent, now));

        let completed = appointment_starting_in(-3, AppointmentStatus::Completed);
        assert!(!svc.should_mark_no_show(&completed, now));
    }

    #[test]
    fn test_mark_no_show_is_system_only() {
        let svc = service();
        let appt = appointment_starting_in(-3, AppointmentStatus::Scheduled);

        assert!(svc.check_mark_no_show(&appt, ActorRole::System, Utc::now()).is_ok());
        assert_matches!(
            svc.check_mark_no_show(&appt, ActorRole::Admin, Utc::now()),
            Err(AppointmentError::Unauthorized)
        );
    }

    #[test]
    fn test_validate_status_transition_table() {
        let svc = service();

        assert!(svc
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Confirmed)
            .is_ok());
        assert!(svc
            .validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Completed)
            .is_ok());
        assert_matches!(
            svc.validate_status_transition(
                AppointmentStatus::Cancelled,
                AppointmentStatus::Scheduled
            ),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
        assert_matches!(
            svc.validate_status_transition(
                AppointmentStatus::Confirmed,
                AppointmentStatus::Scheduled
            ),
            Err(AppointmentError::InvalidStatusTransition(_))
        );
    }

    #[test]
    fn test_start_and_end_datetime_helpers() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let mut appt = appointment_starting_in(24, AppointmentStatus::Scheduled);
        appt.date = date;
        appt.start_time = NaiveTime::from_hms_opt(10, 40, 0).unwrap();
        appt.duration_minutes = 50;

        assert_eq!(
            appt.end_datetime() - appt.start_datetime(),
            Duration::minutes(50)
        );
        assert_eq!(appt.start_datetime().date_naive(), date);
    }
}
