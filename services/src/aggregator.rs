//! Read-only attendance reports.
//!
//! A session with no record for a student counts as absent with score 0.
//! Every report derives its totals through [`score_and_rate`].

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use db::models::attendance_record::Model as AttendanceRecord;
use db::models::class_session::Model as ClassSession;
use db::{EnrollmentFilter, RecordFilter, Store};
use serde::Serialize;
use tracing::debug;

use crate::attendance::{attendance_date, left_early, reported_status};
use crate::clock::Clock;
use crate::error::{AttendanceError, AttendanceResult};
use crate::status::AttendanceStatus;

/// Score sum and attendance percentage over a number of counted sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreAndRate {
    pub total_score: f64,
    /// Percent, rounded to one decimal.
    pub attendance_rate: f64,
}

pub fn score_and_rate<I>(scores: I, total_sessions: usize) -> ScoreAndRate
where
    I: IntoIterator<Item = f64>,
{
    let total_score: f64 = scores.into_iter().sum();
    let attendance_rate = if total_sessions == 0 {
        0.0
    } else {
        round1(total_score / total_sessions as f64 * 100.0)
    };
    ScoreAndRate {
        total_score,
        attendance_rate,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Status counts plus score and rate for a set of counted sessions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttendanceTotals {
    pub total_sessions: usize,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub total_score: f64,
    pub attendance_rate: f64,
}

impl AttendanceTotals {
    fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = AttendanceStatus>,
    {
        let statuses: Vec<AttendanceStatus> = statuses.into_iter().collect();
        let count = |wanted: AttendanceStatus| statuses.iter().filter(|s| **s == wanted).count();
        let ScoreAndRate {
            total_score,
            attendance_rate,
        } = score_and_rate(statuses.iter().map(|s| s.score()), statuses.len());

        Self {
            total_sessions: statuses.len(),
            present: count(AttendanceStatus::Present),
            late: count(AttendanceStatus::Late),
            absent: count(AttendanceStatus::Absent),
            total_score,
            attendance_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRow {
    pub student_id: i64,
    pub status: AttendanceStatus,
    pub score: f64,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub left_early: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub session_id: i64,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
    pub students: Vec<DailyRow>,
}

/// One session as seen by one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionAttendance {
    pub session_id: i64,
    pub class_id: i64,
    pub session_name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub score: f64,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub left_early: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReport {
    pub student_id: i64,
    pub year: i32,
    pub month: u32,
    pub class_id: Option<i64>,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
    pub sessions: Vec<SessionAttendance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentMonthlyRow {
    pub student_id: i64,
    pub enrolled_at: DateTime<Utc>,
    /// Sessions of the month on or after the enrollment date.
    pub counted_sessions: usize,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub total_score: f64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMonthlySummary {
    pub class_id: i64,
    pub year: i32,
    pub month: u32,
    pub total_sessions: usize,
    /// Highest total score first.
    pub students: Vec<StudentMonthlyRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub student_id: i64,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
    pub sessions: Vec<SessionAttendance>,
}

/// Inclusive `[first instant, last instant]` of a UTC calendar month.
pub fn month_bounds(year: i32, month: u32) -> AttendanceResult<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(AttendanceError::InvalidMonth(month))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or(AttendanceError::InvalidMonth(month))?;

    let start = Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN));
    let end = Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN)) - Duration::nanoseconds(1);
    Ok((start, end))
}

fn session_date(session: &ClassSession) -> Option<NaiveDate> {
    session.start_time.map(attendance_date)
}

/// Whether a session is dated on or after the student's enrollment day.
fn counts_for(session: &ClassSession, enrolled: NaiveDate) -> bool {
    session_date(session).is_some_and(|d| d >= enrolled)
}

pub struct AttendanceAggregator<S, C> {
    store: S,
    clock: C,
}

impl<S: Store, C: Clock> AttendanceAggregator<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Every student enrolled on or before `date`, with their status for the
    /// session on that day.
    pub async fn daily_summary(
        &self,
        session_id: i64,
        date: NaiveDate,
    ) -> AttendanceResult<DailySummary> {
        let now = self.clock.now();
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(AttendanceError::SessionNotFound(session_id))?;

        let enrollments = self
            .store
            .get_enrollments(EnrollmentFilter::Class(session.class_id))
            .await?;
        let records: HashMap<i64, AttendanceRecord> = self
            .store
            .query_records(RecordFilter::default().sessions(vec![session_id]).on(date))
            .await?
            .into_iter()
            .map(|r| (r.student_id, r))
            .collect();

        let students: Vec<DailyRow> = enrollments
            .iter()
            .filter(|e| e.enrolled_date() <= date)
            .map(|e| {
                let record = records.get(&e.student_id);
                let status = reported_status(record);
                DailyRow {
                    student_id: e.student_id,
                    status,
                    score: status.score(),
                    check_in_time: record.map(|r| r.check_in_time),
                    check_out_time: record.and_then(|r| r.check_out_time),
                    left_early: left_early(record, session.end_time, now),
                }
            })
            .collect();

        let totals = AttendanceTotals::from_statuses(students.iter().map(|r| r.status));
        debug!(session_id, %date, students = students.len(), "built daily summary");

        Ok(DailySummary {
            session_id,
            date,
            totals,
            students,
        })
    }

    pub async fn monthly_report(
        &self,
        student_id: i64,
        month: u32,
        year: i32,
        class_id: Option<i64>,
    ) -> AttendanceResult<MonthlyReport> {
        let (start, end) = month_bounds(year, month)?;
        let enrolled = self.enrolled_classes(student_id, class_id).await?;
        let class_ids: Vec<i64> = enrolled.keys().copied().collect();
        let sessions = self
            .store
            .query_sessions_in_range(&class_ids, start, end)
            .await?;

        let (totals, sessions) = self.student_sessions(student_id, &enrolled, sessions).await?;
        debug!(student_id, year, month, sessions = sessions.len(), "built monthly report");

        Ok(MonthlyReport {
            student_id,
            year,
            month,
            class_id,
            totals,
            sessions,
        })
    }

    /// Per-student totals for a class over a month. Sessions dated before a
    /// student's enrollment are not counted for that student.
    pub async fn class_monthly_summary(
        &self,
        class_id: i64,
        month: u32,
        year: i32,
    ) -> AttendanceResult<ClassMonthlySummary> {
        let (start, end) = month_bounds(year, month)?;
        let sessions = self
            .store
            .query_sessions_in_range(&[class_id], start, end)
            .await?;
        let enrollments = self
            .store
            .get_enrollments(EnrollmentFilter::Class(class_id))
            .await?;

        let student_ids: Vec<i64> = enrollments.iter().map(|e| e.student_id).collect();
        let session_ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
        let records = self
            .store
            .query_records(
                RecordFilter::default()
                    .students(student_ids)
                    .sessions(session_ids),
            )
            .await?;

        let mut by_student: HashMap<i64, HashMap<i64, AttendanceRecord>> = HashMap::new();
        for record in records {
            by_student
                .entry(record.student_id)
                .or_default()
                .entry(record.session_id)
                .or_insert(record);
        }

        let mut students: Vec<StudentMonthlyRow> = enrollments
            .iter()
            .map(|e| {
                let enrolled = e.enrolled_date();
                let counted: Vec<&ClassSession> = sessions
                    .iter()
                    .filter(|s| counts_for(s, enrolled))
                    .collect();
                let own = by_student.get(&e.student_id);
                let attended: Vec<&AttendanceRecord> = counted
                    .iter()
                    .filter_map(|s| own.and_then(|m| m.get(&s.id)))
                    .collect();

                let present = attended
                    .iter()
                    .filter(|r| AttendanceStatus::from(r.status) == AttendanceStatus::Present)
                    .count();
                let late = attended.len() - present;
                let ScoreAndRate {
                    total_score,
                    attendance_rate,
                } = score_and_rate(attended.iter().map(|r| r.score), counted.len());

                StudentMonthlyRow {
                    student_id: e.student_id,
                    enrolled_at: e.enrolled_at,
                    counted_sessions: counted.len(),
                    present,
                    late,
                    absent: counted.len().saturating_sub(present + late),
                    total_score,
                    attendance_rate,
                }
            })
            .collect();

        students.sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| a.student_id.cmp(&b.student_id))
        });
        debug!(class_id, year, month, students = students.len(), "built class monthly summary");

        Ok(ClassMonthlySummary {
            class_id,
            year,
            month,
            total_sessions: sessions.len(),
            students,
        })
    }

    /// All fully elapsed sessions of the student's classes since enrolling.
    pub async fn overall_stats(&self, student_id: i64) -> AttendanceResult<OverallStats> {
        let now = self.clock.now();
        let enrolled = self.enrolled_classes(student_id, None).await?;
        let class_ids: Vec<i64> = enrolled.keys().copied().collect();
        let sessions = self
            .store
            .query_sessions_ended_before(&class_ids, now)
            .await?;

        let (totals, sessions) = self.student_sessions(student_id, &enrolled, sessions).await?;
        debug!(student_id, sessions = sessions.len(), "built overall stats");

        Ok(OverallStats {
            student_id,
            totals,
            sessions,
        })
    }

    /// Enrollment day per class the student belongs to, optionally narrowed
    /// to one class.
    async fn enrolled_classes(
        &self,
        student_id: i64,
        only: Option<i64>,
    ) -> AttendanceResult<HashMap<i64, NaiveDate>> {
        Ok(self
            .store
            .get_enrollments(EnrollmentFilter::Student(student_id))
            .await?
            .into_iter()
            .filter(|e| only.map_or(true, |wanted| wanted == e.class_id))
            .map(|e| (e.class_id, e.enrolled_date()))
            .collect())
    }

    async fn student_sessions(
        &self,
        student_id: i64,
        enrolled: &HashMap<i64, NaiveDate>,
        mut sessions: Vec<ClassSession>,
    ) -> AttendanceResult<(AttendanceTotals, Vec<SessionAttendance>)> {
        sessions.retain(|s| {
            enrolled
                .get(&s.class_id)
                .is_some_and(|day| counts_for(s, *day))
        });

        let now = self.clock.now();
        let session_ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
        // One record per (student, session): its date is the session's own.
        let records: HashMap<i64, AttendanceRecord> = self
            .store
            .query_records(RecordFilter::for_student(student_id).sessions(session_ids))
            .await?
            .into_iter()
            .map(|r| (r.session_id, r))
            .collect();

        let rows: Vec<SessionAttendance> = sessions
            .into_iter()
            .map(|s| {
                let record = records.get(&s.id);
                let status = reported_status(record);
                SessionAttendance {
                    session_id: s.id,
                    class_id: s.class_id,
                    left_early: left_early(record, s.end_time, now),
                    session_name: s.name,
                    start_time: s.start_time,
                    end_time: s.end_time,
                    status,
                    score: record.map(|r| r.score).unwrap_or(0.0),
                    check_in_time: record.map(|r| r.check_in_time),
                    check_out_time: record.and_then(|r| r.check_out_time),
                }
            })
            .collect();

        let totals = AttendanceTotals::from_statuses(rows.iter().map(|r| r.status));
        Ok((totals, rows))
    }
}
