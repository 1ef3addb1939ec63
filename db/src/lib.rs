pub mod models;
pub mod store;
pub mod test_utils;

pub use store::{
    DbStore, EnrollmentFilter, InsertOutcome, NewAttendanceRecord, RecordFilter, Store,
    StoreError, StoreResult,
};

use sea_orm::{Database, DatabaseConnection, DbErr};
use std::path::Path;

/// Opens a connection from a DSN or a bare SQLite file path.
pub async fn connect(path_or_url: &str) -> Result<DatabaseConnection, DbErr> {
    let url = if path_or_url.starts_with("sqlite:")
        || path_or_url.starts_with("postgres://")
        || path_or_url.starts_with("mysql://")
    {
        path_or_url.to_owned()
    } else {
        // SQLite won't create intermediate dirs.
        if let Some(parent) = Path::new(path_or_url).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        format!("sqlite://{path_or_url}?mode=rwc")
    };

    Database::connect(&url).await
}
