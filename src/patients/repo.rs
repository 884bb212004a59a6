use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{Patient, PatientFilter, PatientInput};
use crate::db::{is_foreign_key_violation, is_unique_violation, like_pattern, PgStore};
use crate::error::AppError;
use crate::rules::{EntityKind, RuleViolation};

#[async_trait]
pub trait PatientRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Patient>>;
    async fn find_all(&self, filter: &PatientFilter) -> anyhow::Result<Vec<Patient>>;
    async fn exists_by_email(&self, email: &str, exclude_id: Option<Uuid>) -> anyhow::Result<bool>;
    /// True when any appointment, whatever its status, references the patient.
    async fn has_dependent_appointments(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Fails with `DuplicateEmail` if the unique index rejects the row.
    async fn insert(&self, input: &PatientInput) -> Result<Patient, AppError>;
    async fn update(&self, id: Uuid, input: &PatientInput) -> Result<Option<Patient>, AppError>;
    /// Fails with `HasDependents` if an appointment still references the row.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

const COLUMNS: &str = "id, name, email, phone, created_at, updated_at";

#[async_trait]
impl PatientRepo for PgStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Patient>> {
        let row = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {COLUMNS} FROM patients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find patient by id")?;
        Ok(row)
    }

    async fn find_all(&self, filter: &PatientFilter) -> anyhow::Result<Vec<Patient>> {
        let pattern = filter.search.as_deref().map(like_pattern);
        let rows = sqlx::query_as::<_, Patient>(&format!(
            r#"
            SELECT {COLUMNS}
              FROM patients
             WHERE $1::text IS NULL
                OR name ILIKE $1 OR email ILIKE $1 OR phone ILIKE $1
             ORDER BY name
            "#
        ))
        .bind(pattern)
        .fetch_all(&self.db)
        .await
        .context("list patients")?;
        Ok(rows)
    }

    async fn exists_by_email(&self, email: &str, exclude_id: Option<Uuid>) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM patients
                 WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.db)
        .await
        .context("check patient email")?;
        Ok(exists)
    }

    async fn has_dependent_appointments(&self, id: Uuid) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM appointments WHERE patient_id = $1)"#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .context("check patient appointments")?;
        Ok(exists)
    }

    async fn insert(&self, input: &PatientInput) -> Result<Patient, AppError> {
        let res = sqlx::query_as::<_, Patient>(&format!(
            r#"
            INSERT INTO patients (id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(p) => Ok(p),
            Err(e) if is_unique_violation(&e) => Err(RuleViolation::DuplicateEmail.into()),
            Err(e) => Err(anyhow::Error::new(e).context("insert patient").into()),
        }
    }

    async fn update(&self, id: Uuid, input: &PatientInput) -> Result<Option<Patient>, AppError> {
        let res = sqlx::query_as::<_, Patient>(&format!(
            r#"
            UPDATE patients
               SET name = $2, email = $3, phone = $4, updated_at = now()
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .fetch_optional(&self.db)
        .await;

        match res {
            Ok(p) => Ok(p),
            Err(e) if is_unique_violation(&e) => Err(RuleViolation::DuplicateEmail.into()),
            Err(e) => Err(anyhow::Error::new(e).context("update patient").into()),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query(r#"DELETE FROM patients WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await;

        match res {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(RuleViolation::HasDependents(EntityKind::Patient).into())
            }
            Err(e) => Err(anyhow::Error::new(e).context("delete patient").into()),
        }
    }
}
