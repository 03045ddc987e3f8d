// libs/reminder-cell/src/lib.rs
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    CleanupSweepSummary, DispatchSweepSummary, ReminderError, SchedulerState, SchedulerStats,
};
pub use router::reminder_routes;
pub use services::{EmailNotificationService, NotificationSender, ReminderScheduler};
