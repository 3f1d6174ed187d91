//! Table schema definitions
//!
//! The `responses` column set is derived from the schema registry: one column
//! per answer key over every survey edition, so adding an edition adds
//! columns without redefining the table.

use crate::db::schema_sync::{ColumnDefinition, SchemaSync, TableSchema};
use crate::schema::{all_fields, SchemaVersion};
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

pub const RESPONSES_TABLE: &str = "responses";

/// Responses table schema
pub struct ResponsesTableSchema;

impl TableSchema for ResponsesTableSchema {
    fn table_name() -> &'static str {
        RESPONSES_TABLE
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        let mut columns = vec![
            ColumnDefinition::surrogate_key("id"),
            // Rows from tables that predate versioning are the first edition
            ColumnDefinition::new("schema_version", "TEXT")
                .not_null()
                .default(format!("'{}'", SchemaVersion::BoardMemberV1.id())),
            // Key of the document store copy; NULL for rows that predate it
            ColumnDefinition::new("document_path", "TEXT"),
            ColumnDefinition::new("timestamp", "TEXT").not_null(),
        ];

        // Multi-choice answers are stored as a JSON array string
        columns.extend(
            all_fields()
                .into_iter()
                .map(|field| ColumnDefinition::new(field.key, "TEXT")),
        );

        columns
    }

    fn post_sync_statements() -> Vec<String> {
        vec![format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_responses_document_path ON {}(document_path)",
            RESPONSES_TABLE
        )]
    }
}

/// Synchronize all table schemas
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    info!("Synchronizing table schemas");
    SchemaSync::sync_table::<ResponsesTableSchema>(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responses_columns_cover_every_edition() {
        let columns = ResponsesTableSchema::expected_columns();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(&names[..4], &["id", "schema_version", "document_path", "timestamp"]);
        for version in SchemaVersion::all() {
            for field in version.schema().fields {
                assert!(names.contains(&field.key), "missing column {}", field.key);
            }
        }
        assert!(columns[0].primary_key && columns[0].autoincrement);
    }

    #[test]
    fn test_column_names_are_unique() {
        let columns = ResponsesTableSchema::expected_columns();
        for (i, column) in columns.iter().enumerate() {
            assert!(columns[i + 1..].iter().all(|c| c.name != column.name));
        }
    }
}
