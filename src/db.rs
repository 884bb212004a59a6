use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set")?;
    let db = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;
    tracing::info!("database ready");

    Ok(db)
}

/// PostgreSQL-backed implementation of every repository trait.
#[derive(Clone)]
pub struct PgStore {
    pub db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Locks the professional row until the transaction ends, so overlap checks
/// and the following write for one professional never interleave.
/// Returns false when the professional does not exist.
pub(crate) async fn lock_professional(
    tx: &mut Transaction<'_, Postgres>,
    professional_id: Uuid,
) -> anyhow::Result<bool> {
    let row = sqlx::query_scalar::<_, Uuid>(
        r#"SELECT id FROM professionals WHERE id = $1 FOR UPDATE"#,
    )
    .bind(professional_id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock professional")?;
    Ok(row.is_some())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Escapes `%`, `_` and `\` so user search text is matched literally by ILIKE.
pub(crate) fn like_pattern(search: &str) -> String {
    let mut out = String::with_capacity(search.len() + 2);
    out.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
