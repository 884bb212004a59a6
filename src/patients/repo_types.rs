use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Patient record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: String, // unique, stored lowercased
    pub phone: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated fields for an insert or update.
#[derive(Debug, Clone)]
pub struct PatientInput {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    /// Matched against name, email and phone.
    pub search: Option<String>,
}
