use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Professional {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ProfessionalInput {
    pub name: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfessionalFilter {
    /// Matched against name and specialty.
    pub search: Option<String>,
}
