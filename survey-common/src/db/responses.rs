//! Queries on the `responses` table

use crate::db::table_schemas::RESPONSES_TABLE;
use crate::record::{AnswerValue, Answers, ResponseRecord};
use crate::schema::{FieldSpec, SchemaVersion};
use crate::time;
use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use tracing::warn;

/// Rows read back from the relational store
#[derive(Debug, Default)]
pub struct StoredResponses {
    /// Decoded records ordered by submission time
    pub records: Vec<ResponseRecord>,
    /// Rows that could not be decoded
    pub skipped: usize,
}

/// Insert a record as a new row and return its id
pub async fn insert_response<'e, E>(
    executor: E,
    record: &ResponseRecord,
    document_path: Option<&str>,
) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let (sql, values) = insert_statement(record, "");
    let result = bind_insert(&sql, record, document_path, &values)
        .execute(executor)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Insert a record keyed on its document path.
///
/// Returns `false` when a row for that path already exists; the existing row
/// is left untouched since documents are immutable.
pub async fn upsert_response<'e, E>(
    executor: E,
    record: &ResponseRecord,
    document_path: &str,
) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let (sql, values) = insert_statement(record, " ON CONFLICT(document_path) DO NOTHING");
    let result = bind_insert(&sql, record, Some(document_path), &values)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load every row, optionally restricted to one survey edition
pub async fn list_responses(
    pool: &SqlitePool,
    version: Option<SchemaVersion>,
) -> Result<StoredResponses> {
    let rows = match version {
        Some(v) => {
            sqlx::query(&format!(
                "SELECT * FROM {} WHERE schema_version = ? ORDER BY id",
                RESPONSES_TABLE
            ))
            .bind(v.id())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!("SELECT * FROM {} ORDER BY id", RESPONSES_TABLE))
                .fetch_all(pool)
                .await?
        }
    };

    let mut stored = StoredResponses::default();
    for row in &rows {
        match decode_row(row) {
            Ok(record) => stored.records.push(record),
            Err(reason) => {
                let id: Option<i64> = row.try_get("id").ok();
                warn!(row_id = ?id, reason = %reason, "Skipping undecodable response row");
                stored.skipped += 1;
            }
        }
    }
    stored.records.sort_by_key(|r| (r.timestamp, r.id));

    Ok(stored)
}

pub async fn count_responses(pool: &SqlitePool, version: Option<SchemaVersion>) -> Result<i64> {
    let count = match version {
        Some(v) => {
            sqlx::query_scalar(&format!(
                "SELECT COUNT(*) FROM {} WHERE schema_version = ?",
                RESPONSES_TABLE
            ))
            .bind(v.id())
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", RESPONSES_TABLE))
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count)
}

/// Whether a row already mirrors the given document
pub async fn has_document(pool: &SqlitePool, document_path: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE document_path = ?)",
        RESPONSES_TABLE
    ))
    .bind(document_path)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

fn insert_statement(record: &ResponseRecord, suffix: &str) -> (String, Vec<Option<String>>) {
    let fields = record.schema_version.schema().fields;

    let mut columns = vec!["schema_version", "document_path", "timestamp"];
    columns.extend(fields.iter().map(|f| f.key));
    let placeholders = vec!["?"; columns.len()].join(", ");

    let values = fields
        .iter()
        .map(|f| record.get(f.key).and_then(column_value))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        RESPONSES_TABLE,
        columns.join(", "),
        placeholders,
        suffix
    );
    (sql, values)
}

fn bind_insert<'q>(
    sql: &'q str,
    record: &ResponseRecord,
    document_path: Option<&str>,
    values: &'q [Option<String>],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let mut query = sqlx::query(sql)
        .bind(record.schema_version.id())
        .bind(document_path.map(str::to_string))
        .bind(time::to_storage(&record.timestamp));
    for value in values {
        query = query.bind(value.as_deref());
    }
    query
}

fn column_value(answer: &AnswerValue) -> Option<String> {
    match answer {
        AnswerValue::Text(s) => Some(s.clone()),
        // Vec<String> serialization cannot fail
        AnswerValue::List(items) => serde_json::to_string(items).ok(),
        AnswerValue::Null => None,
    }
}

fn decode_row(row: &SqliteRow) -> std::result::Result<ResponseRecord, String> {
    let id: i64 = row.try_get("id").map_err(|e| e.to_string())?;

    let version_id: String = row.try_get("schema_version").map_err(|e| e.to_string())?;
    let version = SchemaVersion::parse(&version_id)
        .ok_or_else(|| format!("unknown schema version '{}'", version_id))?;

    let raw_ts: String = row.try_get("timestamp").map_err(|e| e.to_string())?;
    let timestamp =
        time::parse_stored(&raw_ts).ok_or_else(|| format!("unparseable timestamp '{}'", raw_ts))?;

    let mut answers = Answers::new();
    for field in version.schema().fields {
        answers.insert(field.key, decode_column(row, field)?);
    }

    Ok(ResponseRecord::from_stored(Some(id), version, timestamp, answers))
}

fn decode_column(row: &SqliteRow, field: &FieldSpec) -> std::result::Result<AnswerValue, String> {
    let raw: Option<String> = row
        .try_get(field.key)
        .map_err(|e| format!("column {}: {}", field.key, e))?;

    match raw {
        None => Ok(AnswerValue::Null),
        Some(text) if field.kind.is_multi() => serde_json::from_str::<Vec<String>>(&text)
            .map(AnswerValue::List)
            .map_err(|e| format!("column {}: {}", field.key, e)),
        Some(text) => Ok(AnswerValue::Text(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::prepare_schema(&pool).await.unwrap();
        pool
    }

    fn board_member(yes_no: &str) -> ResponseRecord {
        ResponseRecord::new(
            SchemaVersion::BoardMemberV1,
            &json!({
                "bm_yes_no": yes_no,
                "bm_nominee": "Non ancora definito",
                "impacts": ["Budget", "Outsourcing"],
                "bm_notes": "nessuna",
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_list_round_trip() {
        let pool = setup_test_db().await;
        let record = board_member("Sì");

        let id = insert_response(&pool, &record, Some("responses/a.json")).await.unwrap();
        assert!(id > 0);

        let stored = list_responses(&pool, None).await.unwrap();
        assert_eq!(stored.skipped, 0);
        assert_eq!(stored.records.len(), 1);

        let read = &stored.records[0];
        assert_eq!(read.id, Some(id));
        assert_eq!(read.answers, record.answers);
        assert_eq!(read.timestamp, record.timestamp);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_document() {
        let pool = setup_test_db().await;
        let record = board_member("No");

        assert!(upsert_response(&pool, &record, "responses/b.json").await.unwrap());
        assert!(!upsert_response(&pool, &record, "responses/b.json").await.unwrap());
        assert!(upsert_response(&pool, &record, "responses/c.json").await.unwrap());

        assert_eq!(count_responses(&pool, None).await.unwrap(), 2);
        assert!(has_document(&pool, "responses/b.json").await.unwrap());
        assert!(!has_document(&pool, "responses/zzz.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_plain_inserts_without_path_do_not_collide() {
        let pool = setup_test_db().await;
        let record = board_member("No");

        insert_response(&pool, &record, None).await.unwrap();
        insert_response(&pool, &record, None).await.unwrap();

        assert_eq!(count_responses(&pool, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_version() {
        let pool = setup_test_db().await;
        insert_response(&pool, &board_member("Sì"), None).await.unwrap();

        let v2 = list_responses(&pool, Some(SchemaVersion::AmlPackageV2)).await.unwrap();
        assert!(v2.records.is_empty());
        assert_eq!(count_responses(&pool, Some(SchemaVersion::BoardMemberV1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let pool = setup_test_db().await;
        insert_response(&pool, &board_member("Sì"), None).await.unwrap();

        sqlx::query(
            "INSERT INTO responses (schema_version, timestamp, bm_yes_no, impacts) VALUES ('board_member_v1', '2024-05-29 10:00:00', 'No', 'not json')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO responses (schema_version, timestamp) VALUES ('v9', '2024-05-29 10:00:00')")
            .execute(&pool)
            .await
            .unwrap();

        let stored = list_responses(&pool, None).await.unwrap();
        assert_eq!(stored.records.len(), 1);
        assert_eq!(stored.skipped, 2);
    }

    #[tokio::test]
    async fn test_empty_table_lists_nothing() {
        let pool = setup_test_db().await;
        let stored = list_responses(&pool, None).await.unwrap();
        assert!(stored.records.is_empty());
        assert_eq!(stored.skipped, 0);
    }
}
