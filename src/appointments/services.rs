use tracing::{info, warn};
use uuid::Uuid;

use super::dto::AppointmentRequest;
use super::repo_types::{Appointment, AppointmentFilter, AppointmentListItem, AppointmentStatus};
use crate::error::AppError;
use crate::rules::{
    validate_cancellation, validate_completion, validate_reschedule, validate_schedule,
    validate_time, RuleViolation, ScheduleRequest,
};
use crate::state::AppState;

pub async fn list(
    st: &AppState,
    filter: AppointmentFilter,
) -> Result<Vec<AppointmentListItem>, AppError> {
    Ok(st.appointments.find_all(&filter).await?)
}

pub async fn get(st: &AppState, id: Uuid) -> Result<Appointment, AppError> {
    st.appointments
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("appointment"))
}

async fn ensure_parties(st: &AppState, req: &AppointmentRequest) -> Result<(), AppError> {
    if st.patients.find_by_id(req.patient_id).await?.is_none() {
        return Err(AppError::NotFound("patient"));
    }
    if st.professionals.find_by_id(req.professional_id).await?.is_none() {
        return Err(AppError::NotFound("professional"));
    }
    Ok(())
}

pub async fn create(st: &AppState, req: AppointmentRequest) -> Result<Appointment, AppError> {
    validate_time(req.scheduled_at, st.now())?;
    ensure_parties(st, &req).await?;

    let request = ScheduleRequest {
        patient_id: req.patient_id,
        professional_id: req.professional_id,
        scheduled_at: req.scheduled_at,
        exclude_id: None,
    };
    let now = st.now();
    let check = |existing: &[Appointment]| validate_schedule(&request, now, existing);

    let appointment = st
        .appointments
        .insert_checked(&request, &check)
        .await
        .inspect_err(|e| log_rejection(e, &request))?;

    info!(
        appointment_id = %appointment.id,
        professional_id = %appointment.professional_id,
        scheduled_at = %appointment.scheduled_at,
        "appointment scheduled"
    );
    Ok(appointment)
}

pub async fn update(
    st: &AppState,
    id: Uuid,
    req: AppointmentRequest,
) -> Result<Appointment, AppError> {
    let current = get(st, id).await?;
    validate_reschedule(&current)?;
    validate_time(req.scheduled_at, st.now())?;
    ensure_parties(st, &req).await?;

    let request = ScheduleRequest {
        patient_id: req.patient_id,
        professional_id: req.professional_id,
        scheduled_at: req.scheduled_at,
        exclude_id: Some(id),
    };
    let now = st.now();
    let check = |existing: &[Appointment]| validate_schedule(&request, now, existing);

    let updated = st
        .appointments
        .reschedule_checked(id, &request, &check)
        .await
        .inspect_err(|e| log_rejection(e, &request))?;

    match updated {
        Some(a) => {
            info!(appointment_id = %id, scheduled_at = %a.scheduled_at, "appointment updated");
            Ok(a)
        }
        // closed or removed since `current` was read
        None => {
            validate_reschedule(&get(st, id).await?)?;
            Err(AppError::NotFound("appointment"))
        }
    }
}

pub async fn cancel(
    st: &AppState,
    id: Uuid,
    reason: Option<String>,
) -> Result<Appointment, AppError> {
    let appointment = get(st, id).await?;
    validate_cancellation(&appointment, st.now())?;

    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let cancelled = apply(st, id, AppointmentStatus::Cancelled, reason.as_deref()).await?;
    info!(appointment_id = %id, "appointment cancelled");
    Ok(cancelled)
}

pub async fn complete(st: &AppState, id: Uuid) -> Result<Appointment, AppError> {
    let appointment = get(st, id).await?;
    validate_completion(&appointment)?;

    let completed = apply(st, id, AppointmentStatus::Completed, None).await?;
    info!(appointment_id = %id, "appointment completed");
    Ok(completed)
}

async fn apply(
    st: &AppState,
    id: Uuid,
    to: AppointmentStatus,
    reason: Option<&str>,
) -> Result<Appointment, AppError> {
    if let Some(a) = st.appointments.transition(id, to, reason).await? {
        return Ok(a);
    }
    // another request closed the appointment first
    let latest = get(st, id).await?;
    warn!(appointment_id = %id, status = %latest.status, "lost status transition race");
    Err(RuleViolation::NotScheduled {
        status: latest.status,
        action: to.past_action(),
    }
    .into())
}

fn log_rejection(err: &AppError, request: &ScheduleRequest) {
    if let AppError::Rule(v) = err {
        warn!(
            professional_id = %request.professional_id,
            scheduled_at = %request.scheduled_at,
            violation = %v,
            "schedule rejected"
        );
    }
}

#[cfg(test)]
mod appointment_service_tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::FixedClock;
    use crate::patients::{self, dto::PatientRequest};
    use crate::professionals::{self, dto::ProfessionalRequest};
    use time::{macros::datetime, Duration, OffsetDateTime};

    const START: OffsetDateTime = datetime!(2026-05-04 08:00 UTC);

    struct Fixture {
        st: AppState,
        clock: Arc<FixedClock>,
        patient: Uuid,
        professional: Uuid,
    }

    async fn fixture() -> Fixture {
        let clock = FixedClock::at(START);
        let st = AppState::fake(clock.clone());
        let patient = patients::services::create(
            &st,
            PatientRequest {
                name: "Ana".into(),
                email: "ana@clinic.org".into(),
                phone: "555-0101".into(),
            },
        )
        .await
        .unwrap();
        let professional = professionals::services::create(
            &st,
            ProfessionalRequest {
                name: "Dr. Lima".into(),
                specialty: "Cardiology".into(),
            },
        )
        .await
        .unwrap();
        Fixture {
            st,
            clock,
            patient: patient.id,
            professional: professional.id,
        }
    }

    impl Fixture {
        fn at(&self, scheduled_at: OffsetDateTime) -> AppointmentRequest {
            AppointmentRequest {
                patient_id: self.patient,
                professional_id: self.professional,
                scheduled_at,
            }
        }

        async fn other_professional(&self) -> Uuid {
            professionals::services::create(
                &self.st,
                ProfessionalRequest {
                    name: "Dr. Alves".into(),
                    specialty: "Dermatology".into(),
                },
            )
            .await
            .unwrap()
            .id
        }
    }

    fn is_rule(err: &AppError, f: impl Fn(&RuleViolation) -> bool) -> bool {
        matches!(err, AppError::Rule(v) if f(v))
    }

    #[tokio::test]
    async fn end_to_end_booking_scenario() {
        let fx = fixture().await;
        let t = START + Duration::hours(3);

        let first = create(&fx.st, fx.at(t)).await.unwrap();
        assert_eq!(first.status, AppointmentStatus::Scheduled);

        let err = create(&fx.st, fx.at(t + Duration::minutes(30))).await.unwrap_err();
        assert!(is_rule(&err, |v| matches!(
            v,
            RuleViolation::DoubleBooking { conflicting } if *conflicting == first.id
        )));

        create(&fx.st, fx.at(t + Duration::minutes(90))).await.unwrap();

        // still three hours of notice
        assert_eq!(fx.st.now(), t - Duration::hours(3));
        let cancelled = cancel(&fx.st, first.id, Some("patient travelling".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("patient travelling"));

        let err = complete(&fx.st, first.id).await.unwrap_err();
        assert!(is_rule(&err, |v| matches!(v, RuleViolation::NotScheduled { .. })));
    }

    #[tokio::test]
    async fn past_time_is_rejected_before_anything_else() {
        let fx = fixture().await;
        let mut req = fx.at(START);
        req.patient_id = Uuid::new_v4(); // unknown, but the time check comes first
        let err = create(&fx.st, req).await.unwrap_err();
        assert!(is_rule(&err, |v| *v == RuleViolation::InvalidTime));
    }

    #[tokio::test]
    async fn out_of_range_time_leaves_store_usable() {
        let fx = fixture().await;
        let err = create(&fx.st, fx.at(datetime!(9999-12-31 23:30 UTC)))
            .await
            .unwrap_err();
        assert!(is_rule(&err, |v| *v == RuleViolation::OutOfRange));

        let a = create(&fx.st, fx.at(START + Duration::days(1))).await.unwrap();
        let err = update(&fx.st, a.id, fx.at(datetime!(9999-12-31 22:30 -03:00)))
            .await
            .unwrap_err();
        assert!(is_rule(&err, |v| *v == RuleViolation::OutOfRange));
        assert_eq!(get(&fx.st, a.id).await.unwrap().scheduled_at, START + Duration::days(1));
    }

    #[tokio::test]
    async fn unknown_parties_are_not_found() {
        let fx = fixture().await;
        let later = START + Duration::days(1);

        let mut req = fx.at(later);
        req.patient_id = Uuid::new_v4();
        assert!(matches!(create(&fx.st, req).await, Err(AppError::NotFound("patient"))));

        let mut req = fx.at(later);
        req.professional_id = Uuid::new_v4();
        assert!(matches!(
            create(&fx.st, req).await,
            Err(AppError::NotFound("professional"))
        ));
    }

    #[tokio::test]
    async fn window_bounds_are_inclusive() {
        let fx = fixture().await;
        let t = START + Duration::days(1);
        create(&fx.st, fx.at(t)).await.unwrap();

        for edge in [t - Duration::hours(1), t + Duration::hours(1)] {
            let err = create(&fx.st, fx.at(edge)).await.unwrap_err();
            assert!(is_rule(&err, |v| matches!(v, RuleViolation::DoubleBooking { .. })));
        }
        create(&fx.st, fx.at(t + Duration::minutes(61))).await.unwrap();
    }

    #[tokio::test]
    async fn other_professionals_and_cancelled_slots_are_free() {
        let fx = fixture().await;
        let t = START + Duration::days(1);
        let first = create(&fx.st, fx.at(t)).await.unwrap();

        let mut other = fx.at(t);
        other.professional_id = fx.other_professional().await;
        create(&fx.st, other).await.unwrap();

        cancel(&fx.st, first.id, None).await.unwrap();
        create(&fx.st, fx.at(t)).await.unwrap();
    }

    #[tokio::test]
    async fn editing_keeps_own_slot_but_not_others() {
        let fx = fixture().await;
        let t = START + Duration::days(1);
        let a = create(&fx.st, fx.at(t)).await.unwrap();
        let b = create(&fx.st, fx.at(t + Duration::hours(3))).await.unwrap();

        let same = update(&fx.st, a.id, fx.at(t)).await.unwrap();
        assert_eq!(same.scheduled_at, t);

        let moved = update(&fx.st, a.id, fx.at(t + Duration::minutes(45))).await.unwrap();
        assert_eq!(moved.scheduled_at, t + Duration::minutes(45));

        let err = update(&fx.st, a.id, fx.at(t + Duration::hours(2) + Duration::minutes(30)))
            .await
            .unwrap_err();
        assert!(is_rule(&err, |v| matches!(
            v,
            RuleViolation::DoubleBooking { conflicting } if *conflicting == b.id
        )));

        let err = update(&fx.st, a.id, fx.at(START - Duration::hours(1))).await.unwrap_err();
        assert!(is_rule(&err, |v| *v == RuleViolation::InvalidTime));
    }

    #[tokio::test]
    async fn closed_appointments_cannot_be_edited() {
        let fx = fixture().await;
        let t = START + Duration::days(1);
        let a = create(&fx.st, fx.at(t)).await.unwrap();
        complete(&fx.st, a.id).await.unwrap();

        let err = update(&fx.st, a.id, fx.at(t + Duration::days(1))).await.unwrap_err();
        assert!(is_rule(&err, |v| matches!(
            v,
            RuleViolation::NotScheduled { status: AppointmentStatus::Completed, .. }
        )));
    }

    #[tokio::test]
    async fn cancellation_notice() {
        let fx = fixture().await;
        let soon = create(&fx.st, fx.at(START + Duration::minutes(90))).await.unwrap();
        let err = cancel(&fx.st, soon.id, None).await.unwrap_err();
        assert!(is_rule(&err, |v| *v == RuleViolation::TooLate));
        assert_eq!(get(&fx.st, soon.id).await.unwrap().status, AppointmentStatus::Scheduled);

        let exact = create(&fx.st, fx.at(START + Duration::hours(4))).await.unwrap();
        fx.clock.advance(Duration::hours(2));
        let done = cancel(&fx.st, exact.id, Some("   ".into())).await.unwrap();
        assert_eq!(done.status, AppointmentStatus::Cancelled);
        assert_eq!(done.cancellation_reason, None);

        let err = cancel(&fx.st, exact.id, None).await.unwrap_err();
        assert!(is_rule(&err, |v| matches!(
            v,
            RuleViolation::NotScheduled { status: AppointmentStatus::Cancelled, action: "cancelled" }
        )));
    }

    #[tokio::test]
    async fn completion_is_terminal() {
        let fx = fixture().await;
        let a = create(&fx.st, fx.at(START + Duration::days(1))).await.unwrap();
        let done = complete(&fx.st, a.id).await.unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);

        assert!(complete(&fx.st, a.id).await.is_err());
        assert!(cancel(&fx.st, a.id, None).await.is_err());
        assert!(matches!(
            complete(&fx.st, Uuid::new_v4()).await,
            Err(AppError::NotFound("appointment"))
        ));
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let fx = fixture().await;
        let day1 = START + Duration::days(1);
        let day2 = START + Duration::days(2);
        let a = create(&fx.st, fx.at(day1)).await.unwrap();
        create(&fx.st, fx.at(day2)).await.unwrap();
        cancel(&fx.st, a.id, None).await.unwrap();

        let all = list(&fx.st, AppointmentFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].appointment.scheduled_at, day2);
        assert_eq!(all[0].patient_name, "Ana");
        assert_eq!(all[0].specialty, "Cardiology");

        let cancelled = list(
            &fx.st,
            AppointmentFilter {
                status: Some(AppointmentStatus::Cancelled),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].appointment.id, a.id);

        let on_day1 = list(
            &fx.st,
            AppointmentFilter {
                date: Some(day1.date()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(on_day1.len(), 1);

        let by_name = list(
            &fx.st,
            AppointmentFilter {
                search: Some("lima".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_name.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_bookings_for_one_slot_admit_one() {
        let fx = fixture().await;
        let t = START + Duration::days(1);
        let mut handles = Vec::new();
        for i in 0..8 {
            let st = fx.st.clone();
            let req = fx.at(t + Duration::minutes(i * 5));
            handles.push(tokio::spawn(async move { create(&st, req).await }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }
}
