use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// A student's membership of a class. Sessions dated before `enrolled_at`
/// are never counted against the student.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub class_id: i64,

    pub enrolled_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// UTC calendar day of enrollment.
    pub fn enrolled_date(&self) -> NaiveDate {
        self.enrolled_at.date_naive()
    }

    pub async fn enroll(
        db: &DbConn,
        student_id: i64,
        class_id: i64,
        enrolled_at: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            student_id: Set(student_id),
            class_id: Set(class_id),
            enrolled_at: Set(enrolled_at),
        }
        .insert(db)
        .await
    }
}
