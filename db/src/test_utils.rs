use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use migration::Migrator;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;

use crate::models::class_session::Model as SessionModel;
use crate::store::DbStore;

pub async fn setup_test_db() -> DatabaseConnection {
    let db = crate::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Migrated in-memory database plus a store over the same connection.
pub async fn setup_test_store() -> (DatabaseConnection, DbStore) {
    let db = setup_test_db().await;
    let store = DbStore::with_timeout(db.clone(), Duration::from_secs(5));
    (db, store)
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .expect("valid UTC timestamp")
}

/// Scheduled session, optionally geofenced at `(lat, lng, radius)`.
pub async fn seed_session(
    db: &DatabaseConnection,
    class_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    location: Option<(f64, f64, f64)>,
) -> SessionModel {
    let name = format!("Class {class_id} @ {}", start.format("%Y-%m-%d %H:%M"));
    let session = SessionModel::create(db, class_id, &name, 1, Some(start), Some(end))
        .await
        .expect("create session");

    match location {
        Some((lat, lng, radius)) => SessionModel::set_location(db, session.id, lat, lng, Some(radius))
            .await
            .expect("set session location"),
        None => session,
    }
}
