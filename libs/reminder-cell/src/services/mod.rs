// libs/reminder-cell/src/services/mod.rs
pub mod notifier;
pub mod scheduler;

pub use notifier::{EmailNotificationService, NotificationSender};
pub use scheduler::ReminderScheduler;
