//! Persistence seam for the attendance engine.
//!
//! [`Store`] is the only way the engine touches data. [`DbStore`] implements
//! it over a SeaORM connection; every call runs under the timeout the caller
//! configured and surfaces an elapsed deadline as [`StoreError::Timeout`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, OnConflict, SimpleExpr};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};
use tracing::debug;

use crate::models::attendance_record::{self, RecordStatus};
use crate::models::{class_session, enrollment};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Which side of the enrollment relation to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentFilter {
    Class(i64),
    Student(i64),
}

/// Conjunctive record filter. `None` fields are unconstrained; an empty id
/// list matches nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub student_ids: Option<Vec<i64>>,
    pub session_ids: Option<Vec<i64>>,
    pub date: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn for_student(student_id: i64) -> Self {
        Self {
            student_ids: Some(vec![student_id]),
            ..Default::default()
        }
    }

    pub fn students(mut self, ids: Vec<i64>) -> Self {
        self.student_ids = Some(ids);
        self
    }

    pub fn sessions(mut self, ids: Vec<i64>) -> Self {
        self.session_ids = Some(ids);
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn matches_nothing(&self) -> bool {
        matches!(&self.student_ids, Some(ids) if ids.is_empty())
            || matches!(&self.session_ids, Some(ids) if ids.is_empty())
    }
}

/// Fields written by a check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendanceRecord {
    pub student_id: i64,
    pub session_id: i64,
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub status: RecordStatus,
    pub score: f64,
}

/// Result of an insert racing on the `(student, session, date)` key.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(attendance_record::Model),
    /// Another writer got there first; this is the row it stored.
    Existing(attendance_record::Model),
}

impl InsertOutcome {
    pub fn into_record(self) -> attendance_record::Model {
        match self {
            InsertOutcome::Inserted(r) | InsertOutcome::Existing(r) => r,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_session(&self, id: i64) -> StoreResult<Option<class_session::Model>>;

    async fn get_enrollments(
        &self,
        filter: EnrollmentFilter,
    ) -> StoreResult<Vec<enrollment::Model>>;

    async fn find_attendance_record(
        &self,
        student_id: i64,
        session_id: i64,
        date: NaiveDate,
    ) -> StoreResult<Option<attendance_record::Model>>;

    async fn get_attendance_record(
        &self,
        id: i64,
    ) -> StoreResult<Option<attendance_record::Model>>;

    /// Inserts unless a row with the same key exists, in which case that row
    /// is returned untouched.
    async fn insert_attendance_record(
        &self,
        record: NewAttendanceRecord,
    ) -> StoreResult<InsertOutcome>;

    /// Sets `check_out_time` if it is still null. Returns `None` when the row
    /// is missing or was already checked out.
    async fn update_checkout(
        &self,
        id: i64,
        time: DateTime<Utc>,
    ) -> StoreResult<Option<attendance_record::Model>>;

    /// Sessions of `class_ids` whose start lies in `[start, end]`, ordered by
    /// start time.
    async fn query_sessions_in_range(
        &self,
        class_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<class_session::Model>>;

    /// Sessions of `class_ids` whose end is strictly before `before`.
    async fn query_sessions_ended_before(
        &self,
        class_ids: &[i64],
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<class_session::Model>>;

    async fn query_records(
        &self,
        filter: RecordFilter,
    ) -> StoreResult<Vec<attendance_record::Model>>;
}

/// [`Store`] backed by a SeaORM connection.
#[derive(Debug, Clone)]
pub struct DbStore {
    db: DatabaseConnection,
    timeout: Duration,
}

impl DbStore {
    /// Uses the `STORE_TIMEOUT_MS` configured in [`common::config`].
    pub fn new(db: DatabaseConnection) -> Self {
        let timeout = Duration::from_millis(common::config::store_timeout_ms());
        Self::with_timeout(db, timeout)
    }

    pub fn with_timeout(db: DatabaseConnection, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, DbErr>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    async fn sessions_where(
        &self,
        class_ids: &[i64],
        time: SimpleExpr,
    ) -> StoreResult<Vec<class_session::Model>> {
        if class_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = class_ids.to_vec();
        self.run(
            class_session::Entity::find()
                .filter(class_session::Column::ClassId.is_in(ids))
                .filter(time)
                .order_by_asc(class_session::Column::StartTime)
                .order_by_asc(class_session::Column::Id)
                .all(&self.db),
        )
        .await
    }
}

#[async_trait]
impl Store for DbStore {
    async fn get_session(&self, id: i64) -> StoreResult<Option<class_session::Model>> {
        self.run(class_session::Entity::find_by_id(id).one(&self.db))
            .await
    }

    async fn get_enrollments(
        &self,
        filter: EnrollmentFilter,
    ) -> StoreResult<Vec<enrollment::Model>> {
        let query = match filter {
            EnrollmentFilter::Class(id) => {
                enrollment::Entity::find().filter(enrollment::Column::ClassId.eq(id))
            }
            EnrollmentFilter::Student(id) => {
                enrollment::Entity::find().filter(enrollment::Column::StudentId.eq(id))
            }
        };
        self.run(
            query
                .order_by_asc(enrollment::Column::StudentId)
                .order_by_asc(enrollment::Column::ClassId)
                .all(&self.db),
        )
        .await
    }

    async fn find_attendance_record(
        &self,
        student_id: i64,
        session_id: i64,
        date: NaiveDate,
    ) -> StoreResult<Option<attendance_record::Model>> {
        self.run(
            attendance_record::Entity::find()
                .filter(attendance_record::Column::StudentId.eq(student_id))
                .filter(attendance_record::Column::SessionId.eq(session_id))
                .filter(attendance_record::Column::Date.eq(date))
                .one(&self.db),
        )
        .await
    }

    async fn get_attendance_record(
        &self,
        id: i64,
    ) -> StoreResult<Option<attendance_record::Model>> {
        self.run(attendance_record::Entity::find_by_id(id).one(&self.db))
            .await
    }

    async fn insert_attendance_record(
        &self,
        record: NewAttendanceRecord,
    ) -> StoreResult<InsertOutcome> {
        let NewAttendanceRecord {
            student_id,
            session_id,
            date,
            check_in_time,
            status,
            score,
        } = record;

        let active = attendance_record::ActiveModel {
            id: NotSet,
            student_id: Set(student_id),
            session_id: Set(session_id),
            date: Set(date),
            check_in_time: Set(check_in_time),
            check_out_time: Set(None),
            status: Set(status),
            score: Set(score),
        };

        let on_conflict = OnConflict::columns([
            attendance_record::Column::StudentId,
            attendance_record::Column::SessionId,
            attendance_record::Column::Date,
        ])
        .do_nothing()
        .to_owned();

        let inserted = match self
            .run(
                attendance_record::Entity::insert(active)
                    .on_conflict(on_conflict)
                    .exec_without_returning(&self.db),
            )
            .await
        {
            Ok(rows) => rows > 0,
            Err(StoreError::Database(DbErr::RecordNotInserted)) => false,
            Err(e) => return Err(e),
        };

        let stored = self
            .find_attendance_record(student_id, session_id, date)
            .await?
            .ok_or_else(|| {
                StoreError::Database(DbErr::RecordNotFound(format!(
                    "Attendance record for student {student_id}, session {session_id} on {date} vanished after insert"
                )))
            })?;

        if inserted {
            Ok(InsertOutcome::Inserted(stored))
        } else {
            debug!(student_id, session_id, %date, "attendance insert hit existing row");
            Ok(InsertOutcome::Existing(stored))
        }
    }

    async fn update_checkout(
        &self,
        id: i64,
        time: DateTime<Utc>,
    ) -> StoreResult<Option<attendance_record::Model>> {
        let res = self
            .run(
                attendance_record::Entity::update_many()
                    .col_expr(attendance_record::Column::CheckOutTime, Expr::value(time))
                    .filter(attendance_record::Column::Id.eq(id))
                    .filter(attendance_record::Column::CheckOutTime.is_null())
                    .exec(&self.db),
            )
            .await?;

        if res.rows_affected == 0 {
            return Ok(None);
        }
        self.get_attendance_record(id).await
    }

    async fn query_sessions_in_range(
        &self,
        class_ids: &[i64],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<class_session::Model>> {
        // Instants are bound and stored as RFC 3339 UTC text, which sorts
        // chronologically. A null start never matches.
        self.sessions_where(class_ids, class_session::Column::StartTime.between(start, end))
            .await
    }

    async fn query_sessions_ended_before(
        &self,
        class_ids: &[i64],
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<class_session::Model>> {
        self.sessions_where(class_ids, class_session::Column::EndTime.lt(before))
            .await
    }

    async fn query_records(
        &self,
        filter: RecordFilter,
    ) -> StoreResult<Vec<attendance_record::Model>> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut query = attendance_record::Entity::find();
        if let Some(ids) = filter.student_ids {
            query = query.filter(attendance_record::Column::StudentId.is_in(ids));
        }
        if let Some(ids) = filter.session_ids {
            query = query.filter(attendance_record::Column::SessionId.is_in(ids));
        }
        if let Some(date) = filter.date {
            query = query.filter(attendance_record::Column::Date.eq(date));
        }

        self.run(
            query
                .order_by_asc(attendance_record::Column::CheckInTime)
                .order_by_asc(attendance_record::Column::Id)
                .all(&self.db),
        )
        .await
    }
}
