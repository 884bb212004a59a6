use tracing::info;
use uuid::Uuid;

use super::dto::ProfessionalRequest;
use super::repo_types::{Professional, ProfessionalFilter, ProfessionalInput};
use crate::error::AppError;
use crate::rules::{validate_deletion, EntityKind};
use crate::state::AppState;
use crate::validation::FieldErrors;

fn validate(mut req: ProfessionalRequest) -> Result<ProfessionalInput, AppError> {
    let mut errs = FieldErrors::new();
    errs.require(&mut req.name, "name is required");
    errs.require(&mut req.specialty, "specialty is required");
    errs.finish()?;
    Ok(ProfessionalInput {
        name: req.name,
        specialty: req.specialty,
    })
}

pub async fn list(st: &AppState, filter: ProfessionalFilter) -> Result<Vec<Professional>, AppError> {
    Ok(st.professionals.find_all(&filter).await?)
}

pub async fn get(st: &AppState, id: Uuid) -> Result<Professional, AppError> {
    st.professionals
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("professional"))
}

pub async fn create(st: &AppState, req: ProfessionalRequest) -> Result<Professional, AppError> {
    let input = validate(req)?;
    let professional = st.professionals.insert(&input).await?;
    info!(professional_id = %professional.id, "professional created");
    Ok(professional)
}

pub async fn update(
    st: &AppState,
    id: Uuid,
    req: ProfessionalRequest,
) -> Result<Professional, AppError> {
    let input = validate(req)?;
    let professional = st
        .professionals
        .update(id, &input)
        .await?
        .ok_or(AppError::NotFound("professional"))?;
    info!(professional_id = %id, "professional updated");
    Ok(professional)
}

pub async fn delete(st: &AppState, id: Uuid) -> Result<(), AppError> {
    if st.professionals.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("professional"));
    }
    let has_dependents = st.professionals.has_dependent_appointments(id).await?;
    validate_deletion(EntityKind::Professional, has_dependents)?;
    if !st.professionals.delete(id).await? {
        return Err(AppError::NotFound("professional"));
    }
    info!(professional_id = %id, "professional deleted");
    Ok(())
}

#[cfg(test)]
mod professional_service_tests {
    use super::*;
    use crate::appointments::{self, dto::AppointmentRequest};
    use crate::clock::FixedClock;
    use crate::patients::{self, dto::PatientRequest};
    use crate::rules::RuleViolation;
    use time::{macros::datetime, Duration};

    fn state() -> AppState {
        AppState::fake(FixedClock::at(datetime!(2026-05-04 08:00 UTC)))
    }

    fn req(name: &str, specialty: &str) -> ProfessionalRequest {
        ProfessionalRequest {
            name: name.into(),
            specialty: specialty.into(),
        }
    }

    #[tokio::test]
    async fn create_update_and_search() {
        let st = state();
        let lima = create(&st, req("Dr. Lima", "Cardiology")).await.unwrap();
        create(&st, req("Dr. Alves", "Dermatology")).await.unwrap();

        let updated = update(&st, lima.id, req("Dr. Lima", " Pediatrics ")).await.unwrap();
        assert_eq!(updated.specialty, "Pediatrics");

        let hits = list(&st, ProfessionalFilter { search: Some("derma".into()) }).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Dr. Alves");

        // same name twice is allowed
        create(&st, req("Dr. Lima", "Cardiology")).await.unwrap();
        assert_eq!(list(&st, ProfessionalFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn specialty_is_required() {
        let st = state();
        let err = create(&st, req("Dr. Lima", "  ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == &["specialty is required"]));
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let st = state();
        let err = update(&st, Uuid::new_v4(), req("X", "Y")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("professional")));
    }

    #[tokio::test]
    async fn delete_blocked_even_by_closed_appointments() {
        let st = state();
        let prof = create(&st, req("Dr. Lima", "Cardiology")).await.unwrap();
        let patient = patients::services::create(
            &st,
            PatientRequest {
                name: "Ana".into(),
                email: "ana@clinic.org".into(),
                phone: "555".into(),
            },
        )
        .await
        .unwrap();
        let appt = appointments::services::create(
            &st,
            AppointmentRequest {
                patient_id: patient.id,
                professional_id: prof.id,
                scheduled_at: st.now() + Duration::days(2),
            },
        )
        .await
        .unwrap();
        appointments::services::cancel(&st, appt.id, None).await.unwrap();

        let err = delete(&st, prof.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Rule(RuleViolation::HasDependents(EntityKind::Professional))
        ));
    }
}
