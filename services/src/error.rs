use chrono::{DateTime, Utc};
use db::StoreError;

pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Everything check-in, check-out and reporting can reject.
///
/// Messages are user-facing; [`AttendanceError::code`] is the stable key the
/// API layer maps to a status code.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("Class session {0} not found")]
    SessionNotFound(i64),

    #[error("Class session {0} does not have a start and end time configured")]
    SessionNotConfigured(i64),

    #[error("Class session is not active; it runs from {start} to {end}")]
    SessionNotActive {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("You are {distance:.0} m from the class location; check-in requires being within {radius:.0} m")]
    OutOfRange { distance: f64, radius: f64 },

    #[error("Check-in is closed for this session; more than 40% of the class has elapsed")]
    AttendanceWindowExceeded,

    #[error("Attendance record {0} not found")]
    RecordNotFound(i64),

    #[error("You have already checked out of this session")]
    AlreadyCheckedOut,

    #[error("Class session {0} does not have an end time configured")]
    SessionEndNotConfigured(i64),

    #[error("Check-out opens when the class ends at {session_end}")]
    CheckoutTooEarly { session_end: DateTime<Utc> },

    #[error("Check-out closed at {deadline}")]
    CheckoutWindowExpired { deadline: DateTime<Utc> },

    #[error("Class session end time must be after its start time")]
    InvalidDuration,

    #[error("Invalid month {0}; expected 1-12")]
    InvalidMonth(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::SessionNotFound(_) => "session_not_found",
            AttendanceError::SessionNotConfigured(_) => "session_not_configured",
            AttendanceError::SessionNotActive { .. } => "session_not_active",
            AttendanceError::OutOfRange { .. } => "out_of_range",
            AttendanceError::AttendanceWindowExceeded => "attendance_window_exceeded",
            AttendanceError::RecordNotFound(_) => "record_not_found",
            AttendanceError::AlreadyCheckedOut => "already_checked_out",
            AttendanceError::SessionEndNotConfigured(_) => "session_end_not_configured",
            AttendanceError::CheckoutTooEarly { .. } => "checkout_too_early",
            AttendanceError::CheckoutWindowExpired { .. } => "checkout_window_expired",
            AttendanceError::InvalidDuration => "invalid_duration",
            AttendanceError::InvalidMonth(_) => "invalid_month",
            AttendanceError::Store(StoreError::Timeout(_)) => "store_timeout",
            AttendanceError::Store(StoreError::Database(_)) => "store_error",
        }
    }
}
