use anyhow::Context;
use async_trait::async_trait;
use sqlx::{Executor, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    Appointment, AppointmentFilter, AppointmentListItem, AppointmentListRow, AppointmentRow,
    AppointmentStatus,
};
use crate::db::{is_foreign_key_violation, like_pattern, lock_professional, PgStore};
use crate::error::AppError;
use crate::rules::{RuleViolation, ScheduleRequest};

/// Rule check run against the overlapping appointments, inside the same
/// atomic section as the write that follows it.
pub type OverlapCheck<'a> = dyn Fn(&[Appointment]) -> Result<(), RuleViolation> + Send + Sync + 'a;

#[async_trait]
pub trait AppointmentRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Appointment>>;
    async fn find_all(&self, filter: &AppointmentFilter) -> anyhow::Result<Vec<AppointmentListItem>>;

    /// Scheduled appointments of `professional_id` with `scheduled_at` in the
    /// closed window `[window_start, window_end]`.
    async fn find_overlapping(
        &self,
        professional_id: Uuid,
        window_start: OffsetDateTime,
        window_end: OffsetDateTime,
        exclude_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Appointment>>;

    /// Inserts a new scheduled appointment if `check` accepts the current
    /// overlapping set. Concurrent calls for one professional are serialized.
    async fn insert_checked(
        &self,
        request: &ScheduleRequest,
        check: &OverlapCheck<'_>,
    ) -> Result<Appointment, AppError>;

    /// Moves a still-scheduled appointment to new parties/time under the same
    /// guarantee as `insert_checked`. `None` if no scheduled row matched.
    async fn reschedule_checked(
        &self,
        id: Uuid,
        request: &ScheduleRequest,
        check: &OverlapCheck<'_>,
    ) -> Result<Option<Appointment>, AppError>;

    /// Applies `to` only while the row is still scheduled.
    async fn transition(
        &self,
        id: Uuid,
        to: AppointmentStatus,
        cancellation_reason: Option<&str>,
    ) -> anyhow::Result<Option<Appointment>>;
}

const COLUMNS: &str = "id, patient_id, professional_id, scheduled_at, status, \
                       cancellation_reason, created_at, updated_at";

async fn overlapping<'e, E>(
    exec: E,
    professional_id: Uuid,
    window_start: OffsetDateTime,
    window_end: OffsetDateTime,
    exclude_id: Option<Uuid>,
) -> anyhow::Result<Vec<Appointment>>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
        r#"
        SELECT {COLUMNS}
          FROM appointments
         WHERE professional_id = $1
           AND status = 'scheduled'
           AND scheduled_at BETWEEN $2 AND $3
           AND ($4::uuid IS NULL OR id <> $4)
        "#
    ))
    .bind(professional_id)
    .bind(window_start)
    .bind(window_end)
    .bind(exclude_id)
    .fetch_all(exec)
    .await
    .context("find overlapping appointments")?;

    rows.into_iter().map(Appointment::try_from).collect()
}

/// The professional row is locked, so an FK failure means the patient went away.
fn party_write_error(err: sqlx::Error, what: &'static str) -> AppError {
    if is_foreign_key_violation(&err) {
        return AppError::NotFound("patient");
    }
    anyhow::Error::new(err).context(what).into()
}

#[async_trait]
impl AppointmentRepo for PgStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Appointment>> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {COLUMNS} FROM appointments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find appointment by id")?;
        row.map(Appointment::try_from).transpose()
    }

    async fn find_all(&self, filter: &AppointmentFilter) -> anyhow::Result<Vec<AppointmentListItem>> {
        let pattern = filter.search.as_deref().map(like_pattern);
        let rows = sqlx::query_as::<_, AppointmentListRow>(
            r#"
            SELECT a.id, a.patient_id, a.professional_id, a.scheduled_at, a.status,
                   a.cancellation_reason, a.created_at, a.updated_at,
                   p.name AS patient_name,
                   prof.name AS professional_name,
                   prof.specialty
              FROM appointments a
              JOIN patients p ON p.id = a.patient_id
              JOIN professionals prof ON prof.id = a.professional_id
             WHERE ($1::text IS NULL OR p.name ILIKE $1 OR prof.name ILIKE $1)
               AND ($2::text IS NULL OR a.status = $2)
               AND ($3::date IS NULL OR (a.scheduled_at AT TIME ZONE 'UTC')::date = $3)
             ORDER BY a.scheduled_at DESC
            "#,
        )
        .bind(pattern)
        .bind(filter.status.map(AppointmentStatus::as_str))
        .bind(filter.date)
        .fetch_all(&self.db)
        .await
        .context("list appointments")?;

        rows.into_iter().map(AppointmentListItem::try_from).collect()
    }

    async fn find_overlapping(
        &self,
        professional_id: Uuid,
        window_start: OffsetDateTime,
        window_end: OffsetDateTime,
        exclude_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Appointment>> {
        overlapping(&self.db, professional_id, window_start, window_end, exclude_id).await
    }

    async fn insert_checked(
        &self,
        request: &ScheduleRequest,
        check: &OverlapCheck<'_>,
    ) -> Result<Appointment, AppError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        if !lock_professional(&mut tx, request.professional_id).await? {
            return Err(AppError::NotFound("professional"));
        }

        let (start, end) = request.window()?;
        let existing = overlapping(&mut *tx, request.professional_id, start, end, None).await?;
        check(existing.as_slice())?;

        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            INSERT INTO appointments (id, patient_id, professional_id, scheduled_at, status)
            VALUES ($1, $2, $3, $4, 'scheduled')
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(request.patient_id)
        .bind(request.professional_id)
        .bind(request.scheduled_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| party_write_error(e, "insert appointment"))?;

        tx.commit().await.context("commit tx")?;
        Ok(Appointment::try_from(row)?)
    }

    async fn reschedule_checked(
        &self,
        id: Uuid,
        request: &ScheduleRequest,
        check: &OverlapCheck<'_>,
    ) -> Result<Option<Appointment>, AppError> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        if !lock_professional(&mut tx, request.professional_id).await? {
            return Err(AppError::NotFound("professional"));
        }

        let (start, end) = request.window()?;
        let existing = overlapping(&mut *tx, request.professional_id, start, end, Some(id)).await?;
        check(existing.as_slice())?;

        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            UPDATE appointments
               SET patient_id = $2, professional_id = $3, scheduled_at = $4, updated_at = now()
             WHERE id = $1 AND status = 'scheduled'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(request.patient_id)
        .bind(request.professional_id)
        .bind(request.scheduled_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| party_write_error(e, "reschedule appointment"))?;

        tx.commit().await.context("commit tx")?;
        Ok(row.map(Appointment::try_from).transpose()?)
    }

    async fn transition(
        &self,
        id: Uuid,
        to: AppointmentStatus,
        cancellation_reason: Option<&str>,
    ) -> anyhow::Result<Option<Appointment>> {
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            r#"
            UPDATE appointments
               SET status = $2, cancellation_reason = $3, updated_at = now()
             WHERE id = $1 AND status = 'scheduled'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(to.as_str())
        .bind(cancellation_reason)
        .fetch_optional(&self.db)
        .await
        .context("update appointment status")?;
        row.map(Appointment::try_from).transpose()
    }
}
