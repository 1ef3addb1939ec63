mod helpers;

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use db::test_utils::utc;
    use db::{RecordFilter, Store};
    use db::models::attendance_record::RecordStatus;
    use futures::future::join_all;
    use services::{AttendanceError, AttendanceState};

    use crate::helpers::{LAT, LNG, TestCtx};

    #[tokio::test]
    async fn test_morning_class_scenario() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 8, 0, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 0, 0))
            .await;

        // On time, standing at the session location
        ctx.clock.set(utc(2025, 10, 1, 9, 5, 0));
        let first = ctx.service.check_in(1, session.id, LAT, LNG).await.unwrap();
        assert!(!first.already_checked_in);
        assert_eq!(first.record.status, RecordStatus::Present);
        assert_eq!(first.record.score, 1.0);

        ctx.clock.set(utc(2025, 10, 1, 10, 5, 0));
        let out = ctx.service.check_out(first.record.id).await.unwrap();
        assert_eq!(out.check_out_time, Some(utc(2025, 10, 1, 10, 5, 0)));

        // 75% of the class elapsed
        ctx.clock.set(utc(2025, 10, 1, 9, 45, 0));
        let err = ctx.service.check_in(2, session.id, LAT, LNG).await.unwrap_err();
        assert!(matches!(err, AttendanceError::AttendanceWindowExceeded));
        assert_eq!(err.code(), "attendance_window_exceeded");

        let rows = ctx
            .store
            .query_records(RecordFilter::default().sessions(vec![session.id]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, 1);
    }

    #[tokio::test]
    async fn test_explicit_now_matches_clock_driven_check_in() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 0, 0, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 40, 0))
            .await;

        // 100 minute session: 15 min is the last present instant
        let at = utc(2025, 10, 1, 9, 15, 0);
        let present = ctx
            .service
            .check_in_at(1, session.id, LAT, LNG, at)
            .await
            .unwrap();
        assert_eq!(present.record.status, RecordStatus::Present);

        let late = ctx
            .service
            .check_in_at(2, session.id, LAT, LNG, at + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(late.record.status, RecordStatus::Late);

        let still_late = ctx
            .service
            .check_in_at(3, session.id, LAT, LNG, utc(2025, 10, 1, 9, 40, 0))
            .await
            .unwrap();
        assert_eq!(still_late.record.status, RecordStatus::Late);

        let err = ctx
            .service
            .check_in_at(4, session.id, LAT, LNG, utc(2025, 10, 1, 9, 40, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::AttendanceWindowExceeded));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_check_ins_converge() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 9, 2, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 0, 0))
            .await;

        let attempts = (0..8).map(|_| ctx.service.check_in(5, session.id, LAT, LNG));
        let results = join_all(attempts).await;

        let ids: Vec<i64> = results
            .iter()
            .map(|r| r.as_ref().expect("check in").record.id)
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));

        let fresh = results
            .iter()
            .filter(|r| !r.as_ref().unwrap().already_checked_in)
            .count();
        assert_eq!(fresh, 1);

        let rows = ctx
            .store
            .query_records(RecordFilter::for_student(5))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_state_follows_the_lifecycle() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 9, 1, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 0, 0))
            .await;

        assert_eq!(
            ctx.service.state(1, session.id).await.unwrap(),
            AttendanceState::NotCheckedIn
        );

        let id = ctx.check_in(1, &session, utc(2025, 10, 1, 9, 1, 0)).await;
        assert!(matches!(
            ctx.service.state(1, session.id).await.unwrap(),
            AttendanceState::CheckedIn { record } if record.id == id
        ));

        ctx.clock.set(utc(2025, 10, 1, 10, 14, 59));
        ctx.service.check_out(id).await.unwrap();
        assert!(matches!(
            ctx.service.state(1, session.id).await.unwrap(),
            AttendanceState::CheckedOut { .. }
        ));
    }

    #[tokio::test]
    async fn test_checkout_gating_relative_to_session_end() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 9, 0, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 0, 0))
            .await;
        let early = ctx.check_in(1, &session, utc(2025, 10, 1, 9, 1, 0)).await;
        let expired = ctx.check_in(2, &session, utc(2025, 10, 1, 9, 2, 0)).await;
        let on_time = ctx.check_in(3, &session, utc(2025, 10, 1, 9, 3, 0)).await;

        let err = ctx
            .service
            .check_out_at(early, utc(2025, 10, 1, 9, 50, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::CheckoutTooEarly { .. }));

        let err = ctx
            .service
            .check_out_at(expired, utc(2025, 10, 1, 10, 16, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::CheckoutWindowExpired { .. }));

        let ok = ctx
            .service
            .check_out_at(on_time, utc(2025, 10, 1, 10, 10, 0))
            .await
            .unwrap();
        assert!(ok.check_out_time.is_some());

        // Exactly at session end is allowed
        ctx.service
            .check_out_at(early, utc(2025, 10, 1, 10, 0, 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_checkout_deadline_is_inclusive_to_the_millisecond() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 9, 0, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 0, 0))
            .await;
        let at_deadline = ctx.check_in(1, &session, utc(2025, 10, 1, 9, 1, 0)).await;
        let past_deadline = ctx.check_in(2, &session, utc(2025, 10, 1, 9, 2, 0)).await;
        let deadline = utc(2025, 10, 1, 10, 15, 0);

        let ok = ctx.service.check_out_at(at_deadline, deadline).await.unwrap();
        assert_eq!(ok.check_out_time, Some(deadline));

        let err = ctx
            .service
            .check_out_at(past_deadline, deadline + Duration::milliseconds(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::CheckoutWindowExpired { deadline: d } if d == deadline
        ));
    }

    #[tokio::test]
    async fn test_concurrent_check_outs_succeed_once() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 9, 0, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 0, 0))
            .await;
        let id = ctx.check_in(1, &session, utc(2025, 10, 1, 9, 1, 0)).await;

        let attempts = [utc(2025, 10, 1, 10, 5, 0), utc(2025, 10, 1, 10, 6, 0)]
            .map(|at| ctx.service.check_out_at(id, at));
        let results = join_all(attempts).await;

        let ok: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(ok.len(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AttendanceError::AlreadyCheckedOut))));

        let stored = ctx.store.get_attendance_record(id).await.unwrap().unwrap();
        assert_eq!(stored.check_out_time, ok[0].check_out_time);
    }

    #[tokio::test]
    async fn test_checkout_needs_a_session_end() {
        let ctx = TestCtx::new(utc(2025, 10, 1, 9, 0, 0)).await;
        let session = ctx
            .session(utc(2025, 10, 1, 9, 0, 0), utc(2025, 10, 1, 10, 0, 0))
            .await;
        let id = ctx.check_in(1, &session, utc(2025, 10, 1, 9, 1, 0)).await;
        let session = ctx.clear_end(&session).await;

        let err = ctx
            .service
            .check_out_at(id, utc(2025, 10, 1, 10, 5, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::SessionEndNotConfigured(sid) if sid == session.id));
        assert_eq!(err.code(), "session_end_not_configured");
    }
}
