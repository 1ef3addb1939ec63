//! Maps how far into a session a check-in happens to a status and score.

use chrono::{DateTime, Utc};
use db::models::attendance_record::RecordStatus;
use serde::Serialize;

use crate::error::{AttendanceError, AttendanceResult};

/// Share of the session (in percent) after which a check-in is late.
pub const PRESENT_UNTIL_PERCENT: i128 = 15;
/// Share of the session (in percent) after which a check-in is rejected.
pub const LATE_UNTIL_PERCENT: i128 = 40;

/// Attendance as reported. `Absent` is only ever derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn score(self) -> f64 {
        match self {
            AttendanceStatus::Present => 1.0,
            AttendanceStatus::Late => 0.5,
            AttendanceStatus::Absent => 0.0,
        }
    }

    /// The storable form, if any.
    pub fn as_record(self) -> Option<RecordStatus> {
        match self {
            AttendanceStatus::Present => Some(RecordStatus::Present),
            AttendanceStatus::Late => Some(RecordStatus::Late),
            AttendanceStatus::Absent => None,
        }
    }
}

impl From<RecordStatus> for AttendanceStatus {
    fn from(value: RecordStatus) -> Self {
        match value {
            RecordStatus::Present => AttendanceStatus::Present,
            RecordStatus::Late => AttendanceStatus::Late,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub status: AttendanceStatus,
    pub score: f64,
    /// `(now - start) / (end - start)`, for logging.
    pub elapsed_fraction: f64,
}

/// Classifies a check-in at `now` for a session running `start..end`.
///
/// Thresholds are inclusive on the better status: exactly 15% elapsed is
/// still present and exactly 40% is still late. Comparison is done in integer
/// milliseconds so boundaries are exact.
pub fn classify(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AttendanceResult<Classification> {
    let duration = i128::from((end - start).num_milliseconds());
    if duration <= 0 {
        return Err(AttendanceError::InvalidDuration);
    }
    let elapsed = i128::from((now - start).num_milliseconds());

    let status = if elapsed * 100 <= duration * PRESENT_UNTIL_PERCENT {
        AttendanceStatus::Present
    } else if elapsed * 100 <= duration * LATE_UNTIL_PERCENT {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Absent
    };

    Ok(Classification {
        status,
        score: status.score(),
        elapsed_fraction: elapsed as f64 / duration as f64,
    })
}
