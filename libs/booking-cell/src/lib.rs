pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    ActorRole, Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest,
    CancelAppointmentRequest, CompleteAppointmentRequest, PaymentStatus, Reminder,
    ReminderChannel, SessionType, UpdateAppointmentRequest,
};

pub use router::booking_routes;

pub use services::{AppointmentLifecycleService, BookingService, SlotCalendar};
