//! In-memory persistence used by tests and `STORAGE_BACKEND=memory`.
//!
//! A single mutex guards all three tables, so a check and the write that
//! follows it always see the same state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::appointments::repo::{AppointmentRepo, OverlapCheck};
use crate::appointments::repo_types::{
    Appointment, AppointmentFilter, AppointmentListItem, AppointmentStatus,
};
use crate::clock::Clock;
use crate::error::AppError;
use crate::patients::repo::PatientRepo;
use crate::patients::repo_types::{Patient, PatientFilter, PatientInput};
use crate::professionals::repo::ProfessionalRepo;
use crate::professionals::repo_types::{Professional, ProfessionalFilter, ProfessionalInput};
use crate::rules::{EntityKind, RuleViolation, ScheduleRequest};

#[derive(Default)]
struct Tables {
    patients: HashMap<Uuid, Patient>,
    professionals: HashMap<Uuid, Professional>,
    appointments: HashMap<Uuid, Appointment>,
}

impl Tables {
    fn overlapping(
        &self,
        professional_id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
        exclude_id: Option<Uuid>,
    ) -> Vec<Appointment> {
        self.appointments
            .values()
            .filter(|a| {
                a.professional_id == professional_id
                    && a.status == AppointmentStatus::Scheduled
                    && Some(a.id) != exclude_id
                    && a.scheduled_at >= start
                    && a.scheduled_at <= end
            })
            .cloned()
            .collect()
    }

    fn email_taken(&self, email: &str, exclude_id: Option<Uuid>) -> bool {
        self.patients
            .values()
            .any(|p| p.email == email && Some(p.id) != exclude_id)
    }

    fn ensure_parties(&self, request: &ScheduleRequest) -> Result<(), AppError> {
        if !self.professionals.contains_key(&request.professional_id) {
            return Err(AppError::NotFound("professional"));
        }
        if !self.patients.contains_key(&request.patient_id) {
            return Err(AppError::NotFound("patient"));
        }
        Ok(())
    }
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tables: Mutex::new(Tables::default()),
        }
    }

    fn tables(&self) -> anyhow::Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

/// Case-insensitive substring match, the in-memory stand-in for ILIKE.
fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
impl PatientRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Patient>> {
        Ok(self.tables()?.patients.get(&id).cloned())
    }

    async fn find_all(&self, filter: &PatientFilter) -> anyhow::Result<Vec<Patient>> {
        let t = self.tables()?;
        let mut out: Vec<Patient> = t
            .patients
            .values()
            .filter(|p| match filter.search.as_deref() {
                None => true,
                Some(q) => contains(&p.name, q) || contains(&p.email, q) || contains(&p.phone, q),
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn exists_by_email(&self, email: &str, exclude_id: Option<Uuid>) -> anyhow::Result<bool> {
        Ok(self.tables()?.email_taken(email, exclude_id))
    }

    async fn has_dependent_appointments(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .tables()?
            .appointments
            .values()
            .any(|a| a.patient_id == id))
    }

    async fn insert(&self, input: &PatientInput) -> Result<Patient, AppError> {
        let mut t = self.tables()?;
        if t.email_taken(&input.email, None) {
            return Err(RuleViolation::DuplicateEmail.into());
        }
        let now = self.clock.now();
        let patient = Patient {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            created_at: now,
            updated_at: now,
        };
        t.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn update(&self, id: Uuid, input: &PatientInput) -> Result<Option<Patient>, AppError> {
        let mut t = self.tables()?;
        if t.email_taken(&input.email, Some(id)) {
            return Err(RuleViolation::DuplicateEmail.into());
        }
        let now = self.clock.now();
        Ok(t.patients.get_mut(&id).map(|p| {
            p.name = input.name.clone();
            p.email = input.email.clone();
            p.phone = input.phone.clone();
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.tables()?;
        if t.appointments.values().any(|a| a.patient_id == id) {
            return Err(RuleViolation::HasDependents(EntityKind::Patient).into());
        }
        Ok(t.patients.remove(&id).is_some())
    }
}

#[async_trait]
impl ProfessionalRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Professional>> {
        Ok(self.tables()?.professionals.get(&id).cloned())
    }

    async fn find_all(&self, filter: &ProfessionalFilter) -> anyhow::Result<Vec<Professional>> {
        let t = self.tables()?;
        let mut out: Vec<Professional> = t
            .professionals
            .values()
            .filter(|p| match filter.search.as_deref() {
                None => true,
                Some(q) => contains(&p.name, q) || contains(&p.specialty, q),
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn has_dependent_appointments(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .tables()?
            .appointments
            .values()
            .any(|a| a.professional_id == id))
    }

    async fn insert(&self, input: &ProfessionalInput) -> anyhow::Result<Professional> {
        let now = self.clock.now();
        let professional = Professional {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            specialty: input.specialty.clone(),
            created_at: now,
            updated_at: now,
        };
        self.tables()?
            .professionals
            .insert(professional.id, professional.clone());
        Ok(professional)
    }

    async fn update(&self, id: Uuid, input: &ProfessionalInput) -> anyhow::Result<Option<Professional>> {
        let now = self.clock.now();
        Ok(self.tables()?.professionals.get_mut(&id).map(|p| {
            p.name = input.name.clone();
            p.specialty = input.specialty.clone();
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut t = self.tables()?;
        if t.appointments.values().any(|a| a.professional_id == id) {
            return Err(RuleViolation::HasDependents(EntityKind::Professional).into());
        }
        Ok(t.professionals.remove(&id).is_some())
    }
}

#[async_trait]
impl AppointmentRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Appointment>> {
        Ok(self.tables()?.appointments.get(&id).cloned())
    }

    async fn find_all(&self, filter: &AppointmentFilter) -> anyhow::Result<Vec<AppointmentListItem>> {
        let t = self.tables()?;
        let mut out = Vec::new();
        for a in t.appointments.values() {
            let (Some(patient), Some(prof)) = (
                t.patients.get(&a.patient_id),
                t.professionals.get(&a.professional_id),
            ) else {
                continue;
            };
            if let Some(q) = filter.search.as_deref() {
                if !contains(&patient.name, q) && !contains(&prof.name, q) {
                    continue;
                }
            }
            if filter.status.is_some_and(|s| s != a.status) {
                continue;
            }
            if let Some(day) = filter.date {
                if a.scheduled_at.to_offset(UtcOffset::UTC).date() != day {
                    continue;
                }
            }
            out.push(AppointmentListItem {
                appointment: a.clone(),
                patient_name: patient.name.clone(),
                professional_name: prof.name.clone(),
                specialty: prof.specialty.clone(),
            });
        }
        out.sort_by(|a, b| b.appointment.scheduled_at.cmp(&a.appointment.scheduled_at));
        Ok(out)
    }

    async fn find_overlapping(
        &self,
        professional_id: Uuid,
        window_start: OffsetDateTime,
        window_end: OffsetDateTime,
        exclude_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Appointment>> {
        Ok(self
            .tables()?
            .overlapping(professional_id, window_start, window_end, exclude_id))
    }

    async fn insert_checked(
        &self,
        request: &ScheduleRequest,
        check: &OverlapCheck<'_>,
    ) -> Result<Appointment, AppError> {
        let mut t = self.tables()?;
        t.ensure_parties(request)?;

        let (start, end) = request.window()?;
        check(t.overlapping(request.professional_id, start, end, None).as_slice())?;

        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            professional_id: request.professional_id,
            scheduled_at: request.scheduled_at,
            status: AppointmentStatus::Scheduled,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        t.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn reschedule_checked(
        &self,
        id: Uuid,
        request: &ScheduleRequest,
        check: &OverlapCheck<'_>,
    ) -> Result<Option<Appointment>, AppError> {
        let mut t = self.tables()?;
        t.ensure_parties(request)?;

        let (start, end) = request.window()?;
        check(t.overlapping(request.professional_id, start, end, Some(id)).as_slice())?;

        let now = self.clock.now();
        Ok(t.appointments
            .get_mut(&id)
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .map(|a| {
                a.patient_id = request.patient_id;
                a.professional_id = request.professional_id;
                a.scheduled_at = request.scheduled_at;
                a.updated_at = now;
                a.clone()
            }))
    }

    async fn transition(
        &self,
        id: Uuid,
        to: AppointmentStatus,
        cancellation_reason: Option<&str>,
    ) -> anyhow::Result<Option<Appointment>> {
        let now = self.clock.now();
        Ok(self
            .tables()?
            .appointments
            .get_mut(&id)
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .map(|a| {
                a.status = to;
                a.cancellation_reason = cancellation_reason.map(str::to_string);
                a.updated_at = now;
                a.clone()
            }))
    }
}

#[cfg(test)]
mod memory_tests {
    use super::*;
    use crate::clock::FixedClock;
    use time::{macros::datetime, Duration};

    const NOW: OffsetDateTime = datetime!(2026-05-04 08:00 UTC);

    async fn seeded() -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new(FixedClock::at(NOW));
        let patient = PatientRepo::insert(
            &store,
            &PatientInput {
                name: "Ana".into(),
                email: "ana@clinic.org".into(),
                phone: "555".into(),
            },
        )
        .await
        .unwrap();
        let prof = ProfessionalRepo::insert(
            &store,
            &ProfessionalInput {
                name: "Dr. Lima".into(),
                specialty: "Cardiology".into(),
            },
        )
        .await
        .unwrap();
        (store, patient.id, prof.id)
    }

    fn request(patient: Uuid, prof: Uuid, at: OffsetDateTime) -> ScheduleRequest {
        ScheduleRequest {
            patient_id: patient,
            professional_id: prof,
            scheduled_at: at,
            exclude_id: None,
        }
    }

    fn accept(_: &[Appointment]) -> Result<(), RuleViolation> {
        Ok(())
    }

    #[tokio::test]
    async fn find_overlapping_uses_closed_window() {
        let (store, patient, prof) = seeded().await;
        let t = NOW + Duration::days(1);
        let a = store.insert_checked(&request(patient, prof, t), &accept).await.unwrap();
        store
            .insert_checked(&request(patient, prof, t + Duration::hours(3)), &accept)
            .await
            .unwrap();

        let hits = store
            .find_overlapping(prof, t - Duration::hours(1), t, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);

        let hits = store
            .find_overlapping(prof, t - Duration::hours(1), t, Some(a.id))
            .await
            .unwrap();
        assert!(hits.is_empty());

        store
            .transition(a.id, AppointmentStatus::Cancelled, Some("sick"))
            .await
            .unwrap();
        let hits = store
            .find_overlapping(prof, t, t, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn rejected_check_writes_nothing() {
        let (store, patient, prof) = seeded().await;
        let deny = |_: &[Appointment]| -> Result<(), RuleViolation> { Err(RuleViolation::InvalidTime) };
        let err = store
            .insert_checked(&request(patient, prof, NOW + Duration::days(1)), &deny)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rule(RuleViolation::InvalidTime)));
        assert!(AppointmentRepo::find_all(&store, &AppointmentFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn vanished_patient_is_not_found() {
        let (store, _, prof) = seeded().await;
        let err = store
            .insert_checked(&request(Uuid::new_v4(), prof, NOW + Duration::days(1)), &accept)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("patient")));
    }

    #[tokio::test]
    async fn out_of_range_window_keeps_lock_healthy() {
        let (store, patient, prof) = seeded().await;
        let far = datetime!(9999-12-31 23:30 UTC);
        let err = store
            .insert_checked(&request(patient, prof, far), &accept)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rule(RuleViolation::OutOfRange)));
        store
            .insert_checked(&request(patient, prof, NOW + Duration::days(1)), &accept)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transition_only_from_scheduled() {
        let (store, patient, prof) = seeded().await;
        let a = store
            .insert_checked(&request(patient, prof, NOW + Duration::days(1)), &accept)
            .await
            .unwrap();
        let done = store
            .transition(a.id, AppointmentStatus::Completed, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert!(store
            .transition(a.id, AppointmentStatus::Cancelled, Some("late"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_guards_referenced_rows() {
        let (store, patient, prof) = seeded().await;
        store
            .insert_checked(&request(patient, prof, NOW + Duration::days(1)), &accept)
            .await
            .unwrap();
        assert!(matches!(
            PatientRepo::delete(&store, patient).await,
            Err(AppError::Rule(RuleViolation::HasDependents(EntityKind::Patient)))
        ));
        assert!(matches!(
            ProfessionalRepo::delete(&store, prof).await,
            Err(AppError::Rule(RuleViolation::HasDependents(EntityKind::Professional)))
        ));
    }
}
