//! Attendance engine: geofenced check-in/out and attendance reporting.
//!
//! The engine talks to persistence only through [`db::Store`] and reads time
//! only through [`clock::Clock`], so both are injected by the caller.

pub mod aggregator;
pub mod attendance;
pub mod clock;
pub mod error;
pub mod geo;
pub mod status;

pub use aggregator::AttendanceAggregator;
pub use attendance::{AttendanceService, AttendanceState, CheckInOutcome};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AttendanceError, AttendanceResult};
pub use status::{AttendanceStatus, Classification};
