// libs/reminder-cell/src/models.rs
use serde::{Deserialize, Serialize};

/// Whether the background sweep loops are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Operational snapshot exposed to the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub todays_active_appointments: usize,
    pub due_unsent_reminders: usize,
    pub reminders_sent_today: usize,
    pub sweep_active: bool,
}

/// Outcome of one reminder dispatch sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchSweepSummary {
    pub examined: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupSweepSummary {
    pub reminders_pruned: usize,
    pub no_shows_marked: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("Appointment not found")]
    NotFound,

    #[error("No due reminder for this appointment")]
    NothingDue,

    #[error("Notification delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
