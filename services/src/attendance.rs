//! Check-in / check-out state machine.
//!
//! Per `(student, session, date)` a student moves
//! `NotCheckedIn -> CheckedIn -> CheckedOut`. The store's unique key on that
//! triple makes check-in idempotent under concurrent calls, and the
//! conditional check-out update makes the second transition happen once.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use db::models::attendance_record::Model as AttendanceRecord;
use db::models::class_session::GeoPoint;
use db::{InsertOutcome, NewAttendanceRecord, Store};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{AttendanceError, AttendanceResult};
use crate::geo;
use crate::status::{self, AttendanceStatus};

/// Minutes after a session ends during which check-out stays open.
pub const CHECKOUT_GRACE_MINUTES: i64 = 15;

pub fn checkout_grace() -> Duration {
    Duration::minutes(CHECKOUT_GRACE_MINUTES)
}

/// Last instant at which a session's records can be checked out.
pub fn checkout_deadline(session_end: DateTime<Utc>) -> DateTime<Utc> {
    session_end + checkout_grace()
}

/// Calendar day a session's records are keyed under: the UTC date of its
/// start. A session crossing midnight keeps a single key.
pub fn attendance_date(session_start: DateTime<Utc>) -> NaiveDate {
    session_start.date_naive()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInOutcome {
    pub record: AttendanceRecord,
    pub already_checked_in: bool,
    /// Measured distance to the session location when a geofence applied.
    pub distance_meters: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttendanceState {
    NotCheckedIn,
    CheckedIn { record: AttendanceRecord },
    CheckedOut { record: AttendanceRecord },
}

pub struct AttendanceService<S, C> {
    store: S,
    clock: C,
    default_radius_meters: f64,
}

impl<S: Store, C: Clock> AttendanceService<S, C> {
    /// Uses the default geofence radius from [`common::config`].
    pub fn new(store: S, clock: C) -> Self {
        Self::with_default_radius(store, clock, common::config::default_radius_meters())
    }

    pub fn with_default_radius(store: S, clock: C, default_radius_meters: f64) -> Self {
        Self {
            store,
            clock,
            default_radius_meters,
        }
    }

    pub async fn check_in(
        &self,
        student_id: i64,
        session_id: i64,
        student_lat: f64,
        student_lng: f64,
    ) -> AttendanceResult<CheckInOutcome> {
        let now = self.clock.now();
        self.check_in_at(student_id, session_id, student_lat, student_lng, now)
            .await
    }

    pub async fn check_in_at(
        &self,
        student_id: i64,
        session_id: i64,
        student_lat: f64,
        student_lng: f64,
        now: DateTime<Utc>,
    ) -> AttendanceResult<CheckInOutcome> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(AttendanceError::SessionNotFound(session_id))?;

        let (start, end) = session
            .window()
            .ok_or(AttendanceError::SessionNotConfigured(session_id))?;
        let date = attendance_date(start);

        if let Some(record) = self
            .store
            .find_attendance_record(student_id, session_id, date)
            .await?
        {
            debug!(student_id, session_id, record_id = record.id, "already checked in");
            return Ok(CheckInOutcome {
                record,
                already_checked_in: true,
                distance_meters: None,
            });
        }

        if now < start || now > end {
            warn!(student_id, session_id, %now, "check-in outside session window");
            return Err(AttendanceError::SessionNotActive { start, end });
        }

        let distance_meters = match session.geofence(self.default_radius_meters) {
            Some(fence) => {
                let check = geo::check_fence(&fence, GeoPoint::new(student_lat, student_lng));
                if !check.inside() {
                    warn!(
                        student_id,
                        session_id,
                        distance = check.distance_meters,
                        radius = check.radius_meters,
                        "check-in out of range"
                    );
                    return Err(AttendanceError::OutOfRange {
                        distance: check.distance_meters,
                        radius: check.radius_meters,
                    });
                }
                Some(check.distance_meters)
            }
            None => None,
        };

        let classification = status::classify(start, end, now)?;
        let Some(record_status) = classification.status.as_record() else {
            warn!(
                student_id,
                session_id,
                elapsed = classification.elapsed_fraction,
                "check-in past the late threshold"
            );
            return Err(AttendanceError::AttendanceWindowExceeded);
        };

        let outcome = self
            .store
            .insert_attendance_record(NewAttendanceRecord {
                student_id,
                session_id,
                date,
                check_in_time: now,
                status: record_status,
                score: classification.score,
            })
            .await?;

        match outcome {
            InsertOutcome::Inserted(record) => {
                info!(
                    student_id,
                    session_id,
                    record_id = record.id,
                    status = %record.status,
                    "checked in"
                );
                Ok(CheckInOutcome {
                    record,
                    already_checked_in: false,
                    distance_meters,
                })
            }
            InsertOutcome::Existing(record) => {
                debug!(student_id, session_id, record_id = record.id, "concurrent check-in converged");
                Ok(CheckInOutcome {
                    record,
                    already_checked_in: true,
                    distance_meters,
                })
            }
        }
    }

    pub async fn check_out(&self, record_id: i64) -> AttendanceResult<AttendanceRecord> {
        let now = self.clock.now();
        self.check_out_at(record_id, now).await
    }

    pub async fn check_out_at(
        &self,
        record_id: i64,
        now: DateTime<Utc>,
    ) -> AttendanceResult<AttendanceRecord> {
        let record = self
            .store
            .get_attendance_record(record_id)
            .await?
            .ok_or(AttendanceError::RecordNotFound(record_id))?;

        if record.is_checked_out() {
            return Err(AttendanceError::AlreadyCheckedOut);
        }

        let session = self
            .store
            .get_session(record.session_id)
            .await?
            .ok_or(AttendanceError::SessionNotFound(record.session_id))?;
        let session_end = session
            .end_time
            .ok_or(AttendanceError::SessionEndNotConfigured(session.id))?;

        if now < session_end {
            warn!(record_id, %now, %session_end, "check-out before session end");
            return Err(AttendanceError::CheckoutTooEarly { session_end });
        }
        let deadline = checkout_deadline(session_end);
        if now > deadline {
            warn!(record_id, %now, %deadline, "check-out after grace window");
            return Err(AttendanceError::CheckoutWindowExpired { deadline });
        }

        // A competing check-out between the read above and this write leaves
        // zero rows updated.
        let updated = self
            .store
            .update_checkout(record_id, now)
            .await?
            .ok_or(AttendanceError::AlreadyCheckedOut)?;

        info!(
            record_id,
            student_id = updated.student_id,
            session_id = updated.session_id,
            "checked out"
        );
        Ok(updated)
    }

    /// Where the student stands for the session. An unscheduled session has
    /// no records, so the student is never checked in to it.
    pub async fn state(
        &self,
        student_id: i64,
        session_id: i64,
    ) -> AttendanceResult<AttendanceState> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(AttendanceError::SessionNotFound(session_id))?;
        let Some(start) = session.start_time else {
            return Ok(AttendanceState::NotCheckedIn);
        };
        let date = attendance_date(start);
        let record = self
            .store
            .find_attendance_record(student_id, session_id, date)
            .await?;

        Ok(match record {
            None => AttendanceState::NotCheckedIn,
            Some(record) if record.is_checked_out() => AttendanceState::CheckedOut { record },
            Some(record) => AttendanceState::CheckedIn { record },
        })
    }
}

/// Checked in, never checked out, and the grace window is over.
pub fn left_early(
    record: Option<&AttendanceRecord>,
    session_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match (record, session_end) {
        (Some(r), Some(end)) => !r.is_checked_out() && now > checkout_deadline(end),
        _ => false,
    }
}

/// Status reported for a student with or without a record.
pub fn reported_status(record: Option<&AttendanceRecord>) -> AttendanceStatus {
    record
        .map(|r| AttendanceStatus::from(r.status))
        .unwrap_or(AttendanceStatus::Absent)
}
