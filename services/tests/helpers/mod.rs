#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::DbStore;
use db::models::class_session::Model as SessionModel;
use db::models::enrollment::Model as EnrollmentModel;
use db::test_utils::{seed_session, setup_test_store};
use services::{AttendanceAggregator, AttendanceService, FixedClock};

pub const CLASS_ID: i64 = 301;
pub const LAT: f64 = 11.55;
pub const LNG: f64 = 104.93;

pub struct TestCtx {
    pub store: DbStore,
    pub clock: Arc<FixedClock>,
    pub service: AttendanceService<DbStore, Arc<FixedClock>>,
    pub aggregator: AttendanceAggregator<DbStore, Arc<FixedClock>>,
}

impl TestCtx {
    pub async fn new(now: DateTime<Utc>) -> Self {
        let (_, store) = setup_test_store().await;
        let clock = Arc::new(FixedClock::new(now));
        let service = AttendanceService::with_default_radius(store.clone(), clock.clone(), 100.0);
        let aggregator = AttendanceAggregator::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            service,
            aggregator,
        }
    }

    pub async fn session(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> SessionModel {
        seed_session(self.store.connection(), CLASS_ID, start, end, Some((LAT, LNG, 100.0))).await
    }

    pub async fn clear_end(&self, session: &SessionModel) -> SessionModel {
        SessionModel::set_schedule(self.store.connection(), session.id, session.start_time, None)
            .await
            .expect("clear session end")
    }

    pub async fn enroll(&self, student_id: i64, at: DateTime<Utc>) {
        EnrollmentModel::enroll(self.store.connection(), student_id, CLASS_ID, at)
            .await
            .expect("enroll student");
    }

    /// Checks `student_id` in at `at` from the session location.
    pub async fn check_in(&self, student_id: i64, session: &SessionModel, at: DateTime<Utc>) -> i64 {
        self.clock.set(at);
        self.service
            .check_in(student_id, session.id, LAT, LNG)
            .await
            .expect("check in")
            .record
            .id
    }
}
