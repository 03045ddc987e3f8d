// libs/booking-cell/src/services/slots.rs
use chrono::{NaiveDate, NaiveTime, Timelike};
use tracing::debug;

use shared_config::SchedulingPolicy;

use crate::models::Appointment;

/// Computes the bookable start times for a date from the business-hours
/// template and the appointments already occupying slots.
pub struct SlotCalendar {
    policy: SchedulingPolicy,
}

impl SlotCalendar {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self { policy }
    }

    /// The full business-hours template: start times from the opening hour
    /// up to but not including the closing hour, spaced by the slot stride.
    ///
    /// The stride drives spacing, not the session duration; with the default
    /// 09:00-22:00 / 50-minute policy this yields 09:00, 09:50, ... 21:30.
    pub fn template(&self) -> impl Iterator<Item = NaiveTime> + '_ {
        let start_minute = self.policy.business_start_hour * 60;
        let end_minute = self.policy.business_end_hour * 60;
        let stride = self.policy.slot_stride_minutes.max(1);

        (start_minute..end_minute)
            .step_by(stride as usize)
            .filter_map(|m| NaiveTime::from_hms_opt(m / 60, m % 60, 0))
    }

    /// Ordered `HH:MM` start times still free on `date`.
    ///
    /// Only active appointments block a slot; a cancelled booking at a time
    /// frees it again. A fully booked date returns an empty vec.
    pub fn available_slots(&self, date: NaiveDate, appointments: &[Appointment]) -> Vec<String> {
        let taken: Vec<NaiveTime> = appointments
            .iter()
            .filter(|a| a.date == date && a.is_active())
            .map(|a| a.start_time)
            .collect();

        let slots: Vec<String> = self
            .template()
            .filter(|t| !taken.contains(t))
            .map(|t| t.format("%H:%M").to_string())
            .collect();

        debug!(
            "Computed {} available slots for {} ({} taken)",
            slots.len(),
            date,
            taken.len()
        );

        slots
    }

    /// A session may start any time within business hours, exclusive of the
    /// closing hour.
    pub fn within_business_hours(&self, time: NaiveTime) -> bool {
        time.hour() >= self.policy.business_start_hour && time.hour() < self.policy.business_end_hour
    }
}
