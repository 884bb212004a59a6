use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{Professional, ProfessionalFilter, ProfessionalInput};
use crate::db::{is_foreign_key_violation, like_pattern, PgStore};
use crate::error::AppError;
use crate::rules::{EntityKind, RuleViolation};

#[async_trait]
pub trait ProfessionalRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Professional>>;
    async fn find_all(&self, filter: &ProfessionalFilter) -> anyhow::Result<Vec<Professional>>;
    async fn has_dependent_appointments(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn insert(&self, input: &ProfessionalInput) -> anyhow::Result<Professional>;
    async fn update(&self, id: Uuid, input: &ProfessionalInput) -> anyhow::Result<Option<Professional>>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

const COLUMNS: &str = "id, name, specialty, created_at, updated_at";

#[async_trait]
impl ProfessionalRepo for PgStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Professional>> {
        let row = sqlx::query_as::<_, Professional>(&format!(
            "SELECT {COLUMNS} FROM professionals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find professional by id")?;
        Ok(row)
    }

    async fn find_all(&self, filter: &ProfessionalFilter) -> anyhow::Result<Vec<Professional>> {
        let pattern = filter.search.as_deref().map(like_pattern);
        let rows = sqlx::query_as::<_, Professional>(&format!(
            r#"
            SELECT {COLUMNS}
              FROM professionals
             WHERE $1::text IS NULL OR name ILIKE $1 OR specialty ILIKE $1
             ORDER BY name
            "#
        ))
        .bind(pattern)
        .fetch_all(&self.db)
        .await
        .context("list professionals")?;
        Ok(rows)
    }

    async fn has_dependent_appointments(&self, id: Uuid) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS (SELECT 1 FROM appointments WHERE professional_id = $1)"#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await
        .context("check professional appointments")?;
        Ok(exists)
    }

    async fn insert(&self, input: &ProfessionalInput) -> anyhow::Result<Professional> {
        let row = sqlx::query_as::<_, Professional>(&format!(
            r#"
            INSERT INTO professionals (id, name, specialty)
            VALUES ($1, $2, $3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.specialty)
        .fetch_one(&self.db)
        .await
        .context("insert professional")?;
        Ok(row)
    }

    async fn update(&self, id: Uuid, input: &ProfessionalInput) -> anyhow::Result<Option<Professional>> {
        let row = sqlx::query_as::<_, Professional>(&format!(
            r#"
            UPDATE professionals
               SET name = $2, specialty = $3, updated_at = now()
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.specialty)
        .fetch_optional(&self.db)
        .await
        .context("update professional")?;
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let res = sqlx::query(r#"DELETE FROM professionals WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await;

        match res {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(RuleViolation::HasDependents(EntityKind::Professional).into())
            }
            Err(e) => Err(anyhow::Error::new(e).context("delete professional").into()),
        }
    }
}
