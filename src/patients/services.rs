use tracing::{info, warn};
use uuid::Uuid;

use super::dto::PatientRequest;
use super::repo_types::{Patient, PatientFilter, PatientInput};
use crate::error::AppError;
use crate::rules::{validate_deletion, EntityKind, RuleViolation};
use crate::state::AppState;
use crate::validation::FieldErrors;

fn validate(mut req: PatientRequest) -> Result<PatientInput, AppError> {
    let mut errs = FieldErrors::new();
    errs.require(&mut req.name, "name is required");
    errs.email(&mut req.email);
    errs.require(&mut req.phone, "phone is required");
    errs.finish()?;
    Ok(PatientInput {
        name: req.name,
        email: req.email,
        phone: req.phone,
    })
}

pub async fn list(st: &AppState, filter: PatientFilter) -> Result<Vec<Patient>, AppError> {
    Ok(st.patients.find_all(&filter).await?)
}

pub async fn get(st: &AppState, id: Uuid) -> Result<Patient, AppError> {
    st.patients
        .find_by_id(id)
        .await?
        .ok_or(AppError::NotFound("patient"))
}

pub async fn create(st: &AppState, req: PatientRequest) -> Result<Patient, AppError> {
    let input = validate(req)?;
    if st.patients.exists_by_email(&input.email, None).await? {
        warn!(email = %input.email, "email already registered");
        return Err(RuleViolation::DuplicateEmail.into());
    }
    let patient = st.patients.insert(&input).await?;
    info!(patient_id = %patient.id, "patient created");
    Ok(patient)
}

pub async fn update(st: &AppState, id: Uuid, req: PatientRequest) -> Result<Patient, AppError> {
    let input = validate(req)?;
    if st.patients.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("patient"));
    }
    if st.patients.exists_by_email(&input.email, Some(id)).await? {
        warn!(email = %input.email, patient_id = %id, "email already registered");
        return Err(RuleViolation::DuplicateEmail.into());
    }
    let patient = st
        .patients
        .update(id, &input)
        .await?
        .ok_or(AppError::NotFound("patient"))?;
    info!(patient_id = %id, "patient updated");
    Ok(patient)
}

pub async fn delete(st: &AppState, id: Uuid) -> Result<(), AppError> {
    if st.patients.find_by_id(id).await?.is_none() {
        return Err(AppError::NotFound("patient"));
    }
    let has_dependents = st.patients.has_dependent_appointments(id).await?;
    validate_deletion(EntityKind::Patient, has_dependents)?;
    if !st.patients.delete(id).await? {
        return Err(AppError::NotFound("patient"));
    }
    info!(patient_id = %id, "patient deleted");
    Ok(())
}
