//! Tracker table shape and the SQL used to read and write it
//!
//! The expected shape is declared once, with MySQL type keywords. Each dialect
//! reads its live table into [`LiveColumn`]s and hands them to
//! [`verify_schema`], which translates the live types before comparing.

use ezmig_core::Dialect;

use crate::error::{MigrateError, MigrateResult};
use crate::translator::translate;

/// Name of the tracker table
pub const TABLE_NAME: &str = "ez_migrations";

/// Dialect the expected column types are written in
pub const CANONICAL_DIALECT: Dialect = Dialect::MySql;

/// Columns, in insert order
pub const COLUMNS: [&str; 5] = ["batch_id", "migrated_at", "up", "down", "path"];

/// Expected description of one tracker column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub data_type: &'static str,
    pub nullable: bool,
    pub primary: bool,
    pub unique: bool,
}

const fn column(
    name: &'static str,
    data_type: &'static str,
    primary: bool,
    unique: bool,
) -> ColumnSpec {
    ColumnSpec {
        name,
        data_type,
        nullable: false,
        primary,
        unique,
    }
}

pub const EXPECTED_SCHEMA: [ColumnSpec; 5] = [
    column("batch_id", "CHAR", true, false),
    column("migrated_at", "VARCHAR", true, true),
    column("up", "TEXT", false, false),
    column("down", "TEXT", false, false),
    column("path", "VARCHAR", false, true),
];

/// A column as reported by the live database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    /// Type keyword, without length or precision
    pub data_type: String,
    pub nullable: bool,
    pub primary: bool,
    pub unique: bool,
}

impl LiveColumn {
    pub fn new(
        name: impl Into<String>,
        data_type: &str,
        nullable: bool,
        primary: bool,
        unique: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: normalize_type(data_type),
            nullable,
            primary,
            unique,
        }
    }
}

/// `varchar(255)` becomes `VARCHAR`
pub fn normalize_type(raw: &str) -> String {
    raw.split('(')
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn describe(flag: bool, yes: &str, no: &str) -> String {
    let text = if flag { yes } else { no };
    text.to_string()
}

/// Compare the live tracker table against [`EXPECTED_SCHEMA`]
pub fn verify_schema(live_dialect: Dialect, columns: &[LiveColumn]) -> MigrateResult<()> {
    for live in columns {
        if !EXPECTED_SCHEMA
            .iter()
            .any(|spec| spec.name.eq_ignore_ascii_case(&live.name))
        {
            return Err(MigrateError::schema_mismatch(&live.name, "unexpected column"));
        }
    }

    for spec in EXPECTED_SCHEMA.iter() {
        let live = columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(spec.name))
            .ok_or_else(|| MigrateError::schema_mismatch(spec.name, "column is missing"))?;

        match translate(live_dialect, CANONICAL_DIALECT, &live.data_type) {
            Some(data_type) if data_type == spec.data_type => {}
            Some(data_type) => {
                return Err(MigrateError::schema_mismatch(
                    spec.name,
                    format!("expected type {}, found {}", spec.data_type, data_type),
                ))
            }
            None => {
                return Err(MigrateError::schema_mismatch(
                    spec.name,
                    format!("unsupported type {}", live.data_type),
                ))
            }
        }

        if live.nullable != spec.nullable {
            return Err(MigrateError::schema_mismatch(
                spec.name,
                describe(spec.nullable, "expected a nullable column", "expected NOT NULL"),
            ));
        }
        if live.primary != spec.primary {
            return Err(MigrateError::schema_mismatch(
                spec.name,
                describe(
                    spec.primary,
                    "expected to be part of the primary key",
                    "expected to stay out of the primary key",
                ),
            ));
        }
        if live.unique != spec.unique {
            return Err(MigrateError::schema_mismatch(
                spec.name,
                describe(spec.unique, "expected UNIQUE constraint", "unexpected UNIQUE constraint"),
            ));
        }
    }

    Ok(())
}

/// Statement creating the tracker table
pub fn create_table_sql() -> String {
    format!(
        "CREATE TABLE {} (\n    \
            batch_id CHAR(36) NOT NULL,\n    \
            migrated_at VARCHAR(32) NOT NULL,\n    \
            up TEXT NOT NULL,\n    \
            down TEXT NOT NULL,\n    \
            path VARCHAR(255) NOT NULL,\n    \
            PRIMARY KEY (batch_id, migrated_at),\n    \
            UNIQUE (migrated_at),\n    \
            UNIQUE (path)\n\
        )",
        TABLE_NAME
    )
}

/// Bind parameter marker for the 1-based `index`
pub fn placeholder(dialect: Dialect, index: usize) -> String {
    match dialect {
        Dialect::Postgres => format!("${}", index),
        Dialect::MySql | Dialect::Sqlite => "?".to_string(),
    }
}

fn placeholders(dialect: Dialect, start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| placeholder(dialect, i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Multi-row insert for `rows` migrations, binding [`COLUMNS`] row by row
pub fn insert_sql(dialect: Dialect, rows: usize) -> String {
    let values = (0..rows)
        .map(|row| format!("({})", placeholders(dialect, row * COLUMNS.len() + 1, COLUMNS.len())))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        TABLE_NAME,
        COLUMNS.join(", "),
        values
    )
}

/// Delete `rows` migrations by `migrated_at`
pub fn delete_sql(dialect: Dialect, rows: usize) -> String {
    format!(
        "DELETE FROM {} WHERE migrated_at IN ({})",
        TABLE_NAME,
        placeholders(dialect, 1, rows)
    )
}

pub fn select_all_sql() -> String {
    format!("SELECT {} FROM {}", COLUMNS.join(", "), TABLE_NAME)
}

pub fn select_last_sql() -> String {
    format!(
        "SELECT {} FROM {} ORDER BY migrated_at DESC LIMIT 1",
        COLUMNS.join(", "),
        TABLE_NAME
    )
}

pub fn select_batch_sql(dialect: Dialect) -> String {
    format!(
        "SELECT {} FROM {} WHERE batch_id = {} ORDER BY migrated_at DESC",
        COLUMNS.join(", "),
        TABLE_NAME,
        placeholder(dialect, 1)
    )
}
