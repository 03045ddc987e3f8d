use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub email_function_url: String,
    pub scheduling: SchedulingPolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            email_function_url: env::var("EMAIL_FUNCTION_URL")
                .unwrap_or_else(|_| {
                    warn!("EMAIL_FUNCTION_URL not set, using empty value");
                    String::new()
                }),
            scheduling: SchedulingPolicy::default(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.email_function_url.is_empty()
    }
}

/// Business constants for the booking and reminder components.
///
/// Every hour/window/stride the clinic operates on lives here so the slot
/// calendar, lifecycle state machine, booking service and reminder scheduler
/// all read the same numbers.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    /// Spacing between bookable start times, independent of session duration.
    pub slot_stride_minutes: u32,
    pub business_start_hour: u32,
    /// Exclusive: no session may start at or after this hour.
    pub business_end_hour: u32,
    pub cancel_window_hours: i64,
    pub reschedule_window_hours: i64,
    pub no_show_grace_hours: i64,
    /// Offsets before the session start at which reminders are scheduled.
    pub reminder_offsets_hours: Vec<i64>,
    pub min_duration_minutes: i32,
    pub max_duration_minutes: i32,
    pub max_notes_length: usize,
    /// Sent reminders older than this are pruned by the cleanup sweep.
    pub reminder_retention_days: i64,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            slot_stride_minutes: 50,
            business_start_hour: 9,
            business_end_hour: 22,
            cancel_window_hours: 24,
            reschedule_window_hours: 12,
            no_show_grace_hours: 1,
            reminder_offsets_hours: vec![24, 2],
            min_duration_minutes: 30,
            max_duration_minutes: 120,
            max_notes_length: 1000,
            reminder_retention_days: 7,
        }
    }
}
