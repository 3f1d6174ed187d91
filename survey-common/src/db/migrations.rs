//! Tracked data migrations
//!
//! Column additions are handled by schema sync. Migrations here transform
//! data and run once each, tracked in the `schema_migrations` table.
//!
//! Never edit a released migration; append a new one and bump
//! [`CURRENT_MIGRATION_VERSION`].

use crate::schema::{SchemaVersion, SurveySchema};
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Highest migration known to this build
pub const CURRENT_MIGRATION_VERSION: i64 = 1;

/// Current migration version (0 when none has run)
pub async fn get_migration_version(pool: &SqlitePool) -> Result<i64> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn record_migration(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Run all pending migrations in order
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;
    let current = get_migration_version(pool).await?;

    if current >= CURRENT_MIGRATION_VERSION {
        info!("Migrations up to date (version {})", current);
        return Ok(());
    }

    if current < 1 {
        migrate_v1(pool).await?;
        record_migration(pool, 1).await?;
    }

    info!("Migrations complete (version {})", CURRENT_MIGRATION_VERSION);
    Ok(())
}

/// Migration v1: classify rows written before records carried a version.
///
/// Such rows got the first-edition default when `schema_version` was added.
/// Rows that answered a question only later editions ask are reassigned.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let first = SchemaVersion::BoardMemberV1.schema();

    for version in SchemaVersion::all().iter().skip(1) {
        let exclusive = exclusive_keys(version.schema(), first);
        if exclusive.is_empty() {
            continue;
        }

        let condition = exclusive
            .iter()
            .map(|key| format!("{} IS NOT NULL", key))
            .collect::<Vec<_>>()
            .join(" OR ");

        let sql = format!(
            "UPDATE responses SET schema_version = ? WHERE schema_version = ? AND document_path IS NULL AND ({})",
            condition
        );
        let result = sqlx::query(&sql)
            .bind(version.id())
            .bind(first.version.id())
            .execute(pool)
            .await?;

        if result.rows_affected() > 0 {
            info!(
                "Migration v1: reassigned {} legacy rows to {}",
                result.rows_affected(),
                version
            );
        }
    }

    Ok(())
}

fn exclusive_keys(schema: &SurveySchema, baseline: &SurveySchema) -> Vec<&'static str> {
    schema
        .fields
        .iter()
        .filter(|f| baseline.field(f.key).is_none())
        .map(|f| f.key)
        .collect()
}
