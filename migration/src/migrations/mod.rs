pub mod m202510010001_create_class_sessions;
pub mod m202510010002_create_enrollments;
pub mod m202510010003_create_attendance_records;
