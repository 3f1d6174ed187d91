//! Declarative table schemas
//!
//! A table's columns are declared once in code ([`TableSchema`]). At startup
//! the table is created if missing and any declared column an older database
//! lacks is added with `ALTER TABLE ADD COLUMN`. Columns are never dropped or
//! retyped here; such drift is only reported.

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER")
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            autoincrement: false,
            default_value: None,
        }
    }

    /// INTEGER PRIMARY KEY AUTOINCREMENT surrogate key
    pub fn surrogate_key(name: impl Into<String>) -> Self {
        let mut column = Self::new(name, "INTEGER");
        column.primary_key = true;
        column.autoincrement = true;
        column
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    fn create_clause(&self) -> String {
        let mut clause = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            clause.push_str(" PRIMARY KEY");
            if self.autoincrement {
                clause.push_str(" AUTOINCREMENT");
            }
        }
        if self.not_null {
            clause.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            clause.push_str(&format!(" DEFAULT {}", default));
        }
        clause
    }
}

/// Column as reported by `PRAGMA table_info`
#[derive(Debug, Clone)]
pub struct ActualColumn {
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub pk: bool,
}

/// Difference between declared and actual schema
#[derive(Debug, Clone)]
pub enum SchemaDrift {
    /// Declared column absent from the database (fixable)
    MissingColumn { column: ColumnDefinition },
    /// Column exists with an incompatible type (reported only)
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
}

/// Declared schema of one table
pub trait TableSchema {
    fn table_name() -> &'static str;

    /// Columns in creation order
    fn expected_columns() -> Vec<ColumnDefinition>;

    /// Extra statements run after the table is in shape (indexes)
    fn post_sync_statements() -> Vec<String> {
        Vec::new()
    }
}

pub struct SchemaSync;

impl SchemaSync {
    /// Create the table if needed, add missing columns, run post-sync statements
    pub async fn sync_table<T: TableSchema>(pool: &SqlitePool) -> Result<()> {
        let table_name = T::table_name();
        let expected = T::expected_columns();

        sqlx::query(&Self::create_table_sql(table_name, &expected))
            .execute(pool)
            .await?;

        let actual = Self::introspect_table(pool, table_name).await?;
        let drift = Self::compare(&expected, &actual);

        if drift.is_empty() {
            info!("Schema up to date for '{}'", table_name);
        }

        for change in drift {
            match change {
                SchemaDrift::MissingColumn { column } => {
                    Self::add_column(pool, table_name, &column).await?;
                }
                SchemaDrift::TypeMismatch {
                    column,
                    expected,
                    actual,
                } => {
                    warn!(
                        "Type mismatch in {}.{}: expected '{}', found '{}'",
                        table_name, column, expected, actual
                    );
                }
            }
        }

        for statement in T::post_sync_statements() {
            sqlx::query(&statement).execute(pool).await?;
        }

        Ok(())
    }

    pub fn create_table_sql(table_name: &str, columns: &[ColumnDefinition]) -> String {
        let clauses: Vec<String> = columns.iter().map(ColumnDefinition::create_clause).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            table_name,
            clauses.join(",\n    ")
        )
    }

    pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| ActualColumn {
                name: row.get("name"),
                type_name: row.get("type"),
                not_null: row.get::<i32, _>("notnull") != 0,
                pk: row.get::<i32, _>("pk") != 0,
            })
            .collect())
    }

    pub fn compare(expected: &[ColumnDefinition], actual: &[ActualColumn]) -> Vec<SchemaDrift> {
        expected
            .iter()
            .filter_map(|col| match actual.iter().find(|a| a.name == col.name) {
                None => Some(SchemaDrift::MissingColumn {
                    column: col.clone(),
                }),
                Some(found) if !types_compatible(&col.sql_type, &found.type_name) => {
                    Some(SchemaDrift::TypeMismatch {
                        column: col.name.clone(),
                        expected: col.sql_type.clone(),
                        actual: found.type_name.clone(),
                    })
                }
                Some(_) => None,
            })
            .collect()
    }

    async fn add_column(pool: &SqlitePool, table: &str, column: &ColumnDefinition) -> Result<()> {
        let mut sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column.name, column.sql_type);

        // SQLite only accepts NOT NULL on added columns when a default exists
        match (&column.default_value, column.not_null) {
            (Some(default), true) => sql.push_str(&format!(" NOT NULL DEFAULT {}", default)),
            (Some(default), false) => sql.push_str(&format!(" DEFAULT {}", default)),
            (None, true) => warn!(
                "Cannot add NOT NULL column {}.{} without a default; adding it as nullable",
                table, column.name
            ),
            (None, false) => {}
        }

        info!("Adding column {}.{} ({})", table, column.name, column.sql_type);

        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                info!("Column {}.{} already added concurrently", table, column.name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// SQLite type affinity comparison
fn types_compatible(expected: &str, actual: &str) -> bool {
    let affinity = |t: &str| {
        let t = t.to_uppercase();
        if t.contains("INT") {
            "INTEGER"
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            "TEXT"
        } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            "REAL"
        } else if t.is_empty() || t.contains("BLOB") {
            "BLOB"
        } else {
            "NUMERIC"
        }
    };
    affinity(expected) == affinity(actual)
}
