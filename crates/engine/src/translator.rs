//! Type keyword translation between SQL dialects
//!
//! Only the handful of keywords the tracker table uses are known. The tracker
//! schema is declared with MySQL keywords and the live table of any other
//! dialect is translated into them before the comparison.

use ezmig_core::Dialect;

use crate::error::{MigrateError, MigrateResult};

/// Type keywords the translator knows about
pub const TYPE_KEYWORDS: [&str; 5] = ["CHAR", "CHARACTER", "TEXT", "VARCHAR", "CHARACTER VARYING"];

fn known(keyword: &str) -> Option<&'static str> {
    TYPE_KEYWORDS.iter().copied().find(|k| *k == keyword)
}

fn override_for(from: Dialect, to: Dialect, keyword: &str) -> Option<&'static str> {
    use Dialect::*;

    match (from, to, keyword) {
        (MySql, Postgres, "CHAR") => Some("CHARACTER"),
        (MySql, Postgres, "VARCHAR") => Some("CHARACTER VARYING"),
        (MySql, Sqlite, "CHAR") | (MySql, Sqlite, "VARCHAR") => Some("TEXT"),
        (Postgres, MySql, "CHARACTER") | (Postgres, Sqlite, "CHARACTER") => Some("CHAR"),
        (Postgres, MySql, "CHARACTER VARYING") | (Postgres, Sqlite, "CHARACTER VARYING") => {
            Some("VARCHAR")
        }
        _ => None,
    }
}

/// Translate `keyword` as written in `from` into its `to` spelling.
///
/// Returns `None` for keywords outside [`TYPE_KEYWORDS`]. Pairs without an
/// explicit mapping keep the keyword as is.
pub fn translate(from: Dialect, to: Dialect, keyword: &str) -> Option<&'static str> {
    let keyword = known(keyword.trim().to_uppercase().as_str())?;
    if from == to {
        return Some(keyword);
    }

    Some(override_for(from, to, keyword).unwrap_or(keyword))
}

/// [`translate`] taking dialect names, as found in configuration files
pub fn translate_named(from: &str, to: &str, keyword: &str) -> MigrateResult<Option<&'static str>> {
    let from: Dialect = from.parse().map_err(MigrateError::Configuration)?;
    let to: Dialect = to.parse().map_err(MigrateError::Configuration)?;
    Ok(translate(from, to, keyword))
}
