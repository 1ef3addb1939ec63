use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// One concrete scheduled class occurrence.
///
/// Rows are owned by the class-management layer; the attendance engine only
/// reads them. `start_time`/`end_time` are optional because a class can be
/// created before it is scheduled.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "class_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub class_id: i64,
    pub name: String,
    pub teacher_id: i64,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_meters: Option<f64>,

    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Builds a point, replacing non-finite coordinates with `0.0`.
    pub fn new(lat: f64, lng: f64) -> Self {
        let clean = |v: f64| if v.is_finite() { v } else { 0.0 };
        Self {
            lat: clean(lat),
            lng: clean(lng),
        }
    }
}

/// Circular check-in region around a session's location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoFence {
    pub center: GeoPoint,
    pub radius_meters: f64,
}

impl Model {
    /// Returns `(start, end)` when both ends of the session are scheduled.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// The session's geofence, or `None` when no location is configured.
    ///
    /// A location without a radius uses `default_radius_meters`.
    pub fn geofence(&self, default_radius_meters: f64) -> Option<GeoFence> {
        let (lat, lng) = (self.latitude?, self.longitude?);
        Some(GeoFence {
            center: GeoPoint::new(lat, lng),
            radius_meters: self.radius_meters.unwrap_or(default_radius_meters),
        })
    }

    pub async fn create(
        db: &DbConn,
        class_id: i64,
        name: &str,
        teacher_id: i64,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Model, DbErr> {
        let active_model = ActiveModel {
            class_id: Set(class_id),
            name: Set(name.to_owned()),
            teacher_id: Set(teacher_id),
            latitude: Set(None),
            longitude: Set(None),
            radius_meters: Set(None),
            start_time: Set(start_time),
            end_time: Set(end_time),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        active_model.insert(db).await
    }

    /// Replaces the schedule; `None` leaves that end unscheduled.
    pub async fn set_schedule(
        db: &DbConn,
        session_id: i64,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Model, DbErr> {
        let model = Entity::find_by_id(session_id)
            .one(db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound("Class session not found".to_string()))?;

        let mut active_model: ActiveModel = model.into();
        active_model.start_time = Set(start_time);
        active_model.end_time = Set(end_time);
        active_model.update(db).await
    }

    pub async fn set_location(
        db: &DbConn,
        session_id: i64,
        latitude: f64,
        longitude: f64,
        radius_meters: Option<f64>,
    ) -> Result<Model, DbErr> {
        let model = Entity::find_by_id(session_id)
            .one(db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound("Class session not found".to_string()))?;

        let mut active_model: ActiveModel = model.into();
        active_model.latitude = Set(Some(latitude));
        active_model.longitude = Set(Some(longitude));
        active_model.radius_meters = Set(radius_meters);
        active_model.update(db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_window_requires_both_ends() {
        let db = setup_test_db().await;
        let start = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();

        let open = Model::create(&db, 1, "Unscheduled", 7, Some(start), None)
            .await
            .unwrap();
        assert!(open.window().is_none());

        let end = Utc.with_ymd_and_hms(2025, 10, 1, 10, 0, 0).unwrap();
        let full = Model::create(&db, 1, "Lecture", 7, Some(start), Some(end))
            .await
            .unwrap();
        assert_eq!(full.window(), Some((start, end)));
    }

    #[tokio::test]
    async fn test_geofence_only_with_coordinates() {
        let db = setup_test_db().await;
        let s = Model::create(&db, 1, "Lab", 7, None, None).await.unwrap();
        assert!(s.geofence(100.0).is_none());

        let s = Model::set_location(&db, s.id, 11.55, 104.93, None)
            .await
            .unwrap();
        let fence = s.geofence(100.0).unwrap();
        assert_eq!(fence.center, GeoPoint::new(11.55, 104.93));
        assert_eq!(fence.radius_meters, 100.0);

        let s = Model::set_location(&db, s.id, 11.55, 104.93, Some(25.0))
            .await
            .unwrap();
        assert_eq!(s.geofence(100.0).unwrap().radius_meters, 25.0);
    }

    #[tokio::test]
    async fn test_set_schedule_can_clear_an_end() {
        let db = setup_test_db().await;
        let start = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 10, 1, 10, 0, 0).unwrap();
        let s = Model::create(&db, 1, "Lecture", 7, Some(start), Some(end))
            .await
            .unwrap();

        let s = Model::set_schedule(&db, s.id, Some(start), None).await.unwrap();
        assert_eq!(s.end_time, None);
        assert!(s.window().is_none());

        assert!(Model::set_schedule(&db, 9999, None, None).await.is_err());
    }

    #[test]
    fn test_geo_point_sanitizes_non_finite() {
        let p = GeoPoint::new(f64::NAN, f64::INFINITY);
        assert_eq!(p, GeoPoint { lat: 0.0, lng: 0.0 });
    }
}
