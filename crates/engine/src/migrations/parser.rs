//! Migration File Parser - File system operations for migrations
//!
//! Lists, reads and scaffolds `<timestamp>-<name>.sql` migration files. Each
//! file carries an up and a down section delimited by marker lines:
//!
//! ```text
//! -- ez-migration-up
//! CREATE TABLE users (id INT);
//! -- ez-migration-up
//!
//! -- ez-migration-down
//! DROP TABLE users;
//! -- ez-migration-down
//! ```
//!
//! Files are ordered lexicographically by name.

use chrono::Utc;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::definitions::{DOWN_MARKER, UP_MARKER};
use crate::error::{MigrateError, MigrateResult};
use crate::migration::{new_batch_id, Migration};
use ezmig_core::MigrateConfig;

/// Statements allowed in a migration
const DDL_KEYWORDS: [&str; 5] = ["CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME"];

const MIGRATION_TEMPLATE: &str = "-- ez-migration-up\n\
-- write the up migration here\n\
-- ez-migration-up\n\
\n\
-- ez-migration-down\n\
-- write the down migration here\n\
-- ez-migration-down\n";

fn ddl_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(r"(?i)^(?:{})\b", DDL_KEYWORDS.join("|")))
            .expect("DDL pattern is a valid regex")
    })
}

// Byte length of the quoted run opening `sql`, both quotes included
fn quoted_len(sql: &str, quote: char) -> usize {
    let mut chars = sql.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if c == '\\' && quote != '`' {
            chars.next();
        } else if c == quote {
            if sql[i + 1..].starts_with(quote) {
                chars.next();
            } else {
                return i + 1;
            }
        }
    }
    sql.len()
}

// The `$tag$` opening a dollar-quoted body at the start of `sql`
fn dollar_tag(sql: &str) -> Option<&str> {
    let end = sql[1..].find('$')?;
    let tag = &sql[1..end + 1];
    let valid = tag.chars().next().map_or(true, |c| c.is_alphabetic() || c == '_')
        && tag.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then(|| &sql[..end + 2])
}

fn dollar_quoted_len(sql: &str, tag: &str) -> usize {
    sql[tag.len()..]
        .find(tag)
        .map_or(sql.len(), |i| i + 2 * tag.len())
}

fn line_comment_len(sql: &str) -> usize {
    sql.find('\n').unwrap_or(sql.len())
}

/// Walk `sql` dropping comments. With `split`, top-level `;` ends a piece.
///
/// String literals, quoted identifiers and dollar-quoted bodies are copied
/// untouched, so a `;` or `--` inside them is plain text.
fn scan(sql: &str, split: bool) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut rest = sql;

    while let Some(c) = rest.chars().next() {
        let taken = match c {
            '\'' | '"' | '`' => {
                let len = quoted_len(rest, c);
                current.push_str(&rest[..len]);
                len
            }
            '$' => match dollar_tag(rest) {
                Some(tag) => {
                    let len = dollar_quoted_len(rest, tag);
                    current.push_str(&rest[..len]);
                    len
                }
                None => {
                    current.push(c);
                    1
                }
            },
            '-' if rest.starts_with("--") => line_comment_len(rest),
            '#' => line_comment_len(rest),
            '/' if rest.starts_with("/*") => rest[2..].find("*/").map_or(rest.len(), |i| i + 4),
            ';' if split => {
                pieces.push(std::mem::take(&mut current));
                1
            }
            _ => {
                current.push(c);
                c.len_utf8()
            }
        };
        rest = &rest[taken..];
    }

    pieces.push(current);
    pieces
}

/// Remove `--`, `#` and `/* */` comments from SQL text
pub fn strip_comments(sql: &str) -> String {
    scan(sql, false).concat()
}

/// Statements of `sql` with comments removed, blank statements skipped
pub fn split_statements(sql: &str) -> Vec<String> {
    scan(sql, true)
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_ddl(statement: &str) -> bool {
    ddl_pattern().is_match(statement)
}

/// Whether any statement of `sql` is something other than DDL
pub fn has_dml(sql: &str) -> bool {
    split_statements(sql).iter().any(|statement| !is_ddl(statement))
}

/// Whether any statement of `sql` is DDL
pub fn has_ddl(sql: &str) -> bool {
    split_statements(sql).iter().any(|statement| is_ddl(statement))
}

/// Split a migration file body into its up and down SQL
pub fn parse_sections(path: &str, content: &str) -> MigrateResult<(String, String)> {
    let lines: Vec<&str> = content.lines().collect();
    let is_marker = |line: &str, marker: &str| line.trim().eq_ignore_ascii_case(marker);

    let ups: Vec<usize> = (0..lines.len()).filter(|&i| is_marker(lines[i], UP_MARKER)).collect();
    let downs: Vec<usize> = (0..lines.len())
        .filter(|&i| is_marker(lines[i], DOWN_MARKER))
        .collect();

    if ups.len() + downs.len() < 3 || ups.is_empty() || downs.is_empty() {
        return Err(MigrateError::format(
            path,
            format!(
                "expected the '{}' and '{}' marker pairs, found {} up and {} down markers",
                UP_MARKER,
                DOWN_MARKER,
                ups.len(),
                downs.len()
            ),
        ));
    }
    if ups.len() > 2 || downs.len() > 2 {
        return Err(MigrateError::format(path, "more than one up or down section"));
    }

    let up_start = ups[0];
    let down_start = downs[0];
    if up_start > down_start {
        return Err(MigrateError::format(path, "the up section must come before the down section"));
    }

    let up_end = match ups.get(1) {
        Some(&end) if end < down_start => end,
        Some(_) => {
            return Err(MigrateError::format(path, "the up section must close before the down section"))
        }
        None => down_start,
    };
    let down_end = downs.get(1).copied().unwrap_or(lines.len());

    let up = lines[up_start + 1..up_end].join("\n").trim().to_string();
    let down = lines[down_start + 1..down_end].join("\n").trim().to_string();

    if strip_comments(&up).trim().is_empty() {
        return Err(MigrateError::format(path, "the up section is empty"));
    }
    if strip_comments(&down).trim().is_empty() {
        return Err(MigrateError::format(path, "the down section is empty"));
    }

    for (section, sql) in [("up", &up), ("down", &down)] {
        if has_dml(sql) {
            return Err(MigrateError::format(
                path,
                format!(
                    "the {} section contains data statements, move them to a seed file",
                    section
                ),
            ));
        }
    }

    Ok((up, down))
}

/// Create `<timestamp>-<name>.sql` in `dir` with `template` as its content
pub(crate) async fn scaffold_file(dir: &Path, name: &str, template: &str) -> MigrateResult<PathBuf> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MigrateError::format(dir.display().to_string(), "a file name is required"));
    }

    fs::create_dir_all(dir).await?;

    let slug = name.replace(char::is_whitespace, "-");
    let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let path = dir.join(format!("{}-{}.sql", timestamp, slug));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    file.write_all(template.as_bytes()).await?;
    file.flush().await?;

    Ok(path)
}

/// Migration file parser for listing, loading and creating migrations
#[derive(Debug, Clone)]
pub struct MigrationFileParser {
    migrations_dir: PathBuf,
}

impl MigrationFileParser {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn from_config(config: &MigrateConfig) -> Self {
        Self::new(&config.migrations_path)
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Sorted `.sql` file names, creating the migrations directory if absent
    pub async fn list_files(&self) -> MigrateResult<Vec<String>> {
        fs::create_dir_all(&self.migrations_dir).await?;

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.migrations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if path.extension().map_or(false, |ext| ext == "sql") {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Parse a single migration file, without a batch id
    pub async fn make_migration_from_file(&self, name: &str) -> MigrateResult<Migration> {
        self.parse_file(name, None).await
    }

    /// Every migration file, tagged with one fresh batch id
    pub async fn all_migrations(&self) -> MigrateResult<Vec<Migration>> {
        let files = self.list_files().await?;
        self.parse_batch(&files).await
    }

    /// The migration right after `name`, if any
    pub async fn next(&self, name: &str) -> MigrateResult<Option<Migration>> {
        let files = self.list_files().await?;
        let index = Self::position(&files, name)?;
        match files.get(index + 1) {
            Some(next) => Ok(Some(self.parse_file(next, None).await?)),
            None => Ok(None),
        }
    }

    /// The migration right before `name`, if any
    pub async fn before(&self, name: &str) -> MigrateResult<Option<Migration>> {
        let files = self.list_files().await?;
        let index = Self::position(&files, name)?;
        match index.checked_sub(1) {
            Some(previous) => Ok(Some(self.parse_file(&files[previous], None).await?)),
            None => Ok(None),
        }
    }

    /// Every migration after `name`, tagged with one fresh batch id
    pub async fn all_next_to(&self, name: &str) -> MigrateResult<Vec<Migration>> {
        let files = self.list_files().await?;
        let index = Self::position(&files, name)?;
        self.parse_batch(&files[index + 1..]).await
    }

    /// Every migration before `name`, tagged with one fresh batch id
    pub async fn all_before_to(&self, name: &str) -> MigrateResult<Vec<Migration>> {
        let files = self.list_files().await?;
        let index = Self::position(&files, name)?;
        self.parse_batch(&files[..index]).await
    }

    /// Create a new migration file from the marker template
    pub async fn make_migration_file(&self, name: &str) -> MigrateResult<PathBuf> {
        let path = scaffold_file(&self.migrations_dir, name, MIGRATION_TEMPLATE).await?;
        tracing::info!("Created migration file {}", path.display());
        Ok(path)
    }

    fn position(files: &[String], name: &str) -> MigrateResult<usize> {
        let name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name);

        files
            .iter()
            .position(|file| file == name)
            .ok_or_else(|| MigrateError::MigrationNotFound(name.to_string()))
    }

    async fn parse_batch(&self, files: &[String]) -> MigrateResult<Vec<Migration>> {
        let batch_id = new_batch_id();
        let mut migrations = Vec::with_capacity(files.len());
        for file in files {
            migrations.push(self.parse_file(file, Some(batch_id.clone())).await?);
        }
        Ok(migrations)
    }

    async fn parse_file(&self, name: &str, batch_id: Option<String>) -> MigrateResult<Migration> {
        let path = self.migrations_dir.join(name);
        let shown = path.display().to_string();

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MigrateError::MigrationNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let (up, down) = parse_sections(&shown, &content)?;
        tracing::debug!("Parsed migration {}", shown);
        Migration::new(batch_id, up, down, shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn body(up: &str, down: &str) -> String {
        format!(
            "{UP_MARKER}\n{up}\n{UP_MARKER}\n\n{DOWN_MARKER}\n{down}\n{DOWN_MARKER}\n"
        )
    }

    async fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).await.unwrap();
    }

    #[test]
    fn test_parse_sections() {
        let (up, down) = parse_sections(
            "001-a.sql",
            &body("CREATE TABLE users (id INT);", "DROP TABLE users;"),
        )
        .unwrap();
        assert_eq!(up, "CREATE TABLE users (id INT);");
        assert_eq!(down, "DROP TABLE users;");
    }

    #[test]
    fn test_parse_sections_with_three_markers() {
        let content = format!(
            "{UP_MARKER}\nCREATE TABLE a (id INT);\n{DOWN_MARKER}\nDROP TABLE a;\n{DOWN_MARKER}\n"
        );
        let (up, down) = parse_sections("001-a.sql", &content).unwrap();
        assert_eq!(up, "CREATE TABLE a (id INT);");
        assert_eq!(down, "DROP TABLE a;");

        let open_down = format!("{UP_MARKER}\nCREATE TABLE a (id INT);\n{UP_MARKER}\n{DOWN_MARKER}\nDROP TABLE a;\n");
        let (_, down) = parse_sections("001-a.sql", &open_down).unwrap();
        assert_eq!(down, "DROP TABLE a;");
    }

    #[test]
    fn test_parse_sections_rejects_malformed_files() {
        let too_few = format!("{UP_MARKER}\nCREATE TABLE a (id INT);\n{DOWN_MARKER}\nDROP TABLE a;\n");
        assert!(matches!(
            parse_sections("a.sql", &too_few),
            Err(MigrateError::Format { .. })
        ));

        let reversed = format!(
            "{DOWN_MARKER}\nDROP TABLE a;\n{DOWN_MARKER}\n{UP_MARKER}\nCREATE TABLE a (id INT);\n{UP_MARKER}\n"
        );
        assert!(parse_sections("a.sql", &reversed).is_err());

        let empty_up = body("-- nothing to do", "DROP TABLE a;");
        assert!(parse_sections("a.sql", &empty_up).is_err());

        let dml = body("INSERT INTO a VALUES (1);", "DROP TABLE a;");
        assert!(matches!(
            parse_sections("a.sql", &dml),
            Err(MigrateError::Format { .. })
        ));
    }

    #[test]
    fn test_has_dml() {
        assert!(!has_dml("CREATE TABLE a (id INT); ALTER TABLE a ADD b INT;"));
        assert!(!has_dml("-- seed later: INSERT INTO a VALUES (1)\ndrop table a;"));
        assert!(!has_dml("/* UPDATE a SET b = 1; */ TRUNCATE a; # DELETE FROM a"));
        assert!(has_dml("CREATE TABLE a (id INT); INSERT INTO a VALUES (1);"));
        assert!(has_dml("update a set b = 2"));
        assert!(!has_dml("   "));
    }

    #[test]
    fn test_split_statements_keeps_quoted_text_whole() {
        assert_eq!(
            split_statements("ALTER TABLE t ADD c TEXT DEFAULT 'a;b'; DROP TABLE u;"),
            vec!["ALTER TABLE t ADD c TEXT DEFAULT 'a;b'", "DROP TABLE u"]
        );
        assert_eq!(
            split_statements(r#"CREATE TABLE "odd;name" (note TEXT DEFAULT 'it''s -- fine');"#),
            vec![r#"CREATE TABLE "odd;name" (note TEXT DEFAULT 'it''s -- fine')"#]
        );
        assert_eq!(
            split_statements("CREATE TABLE `a;b` (id INT); -- trailing; comment"),
            vec!["CREATE TABLE `a;b` (id INT)"]
        );
    }

    #[test]
    fn test_dollar_quoted_bodies_are_one_statement() {
        let function = "CREATE FUNCTION touch() RETURNS trigger AS $$ BEGIN NEW.updated_at := now(); RETURN NEW; END; $$ LANGUAGE plpgsql;";
        assert_eq!(split_statements(function).len(), 1);
        assert!(!has_dml(function));

        let tagged = "CREATE FUNCTION f() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql; DROP TABLE a;";
        assert_eq!(split_statements(tagged).len(), 2);

        assert!(has_dml("UPDATE a SET b = $1; DROP TABLE a;"));
    }

    #[test]
    fn test_parse_sections_accepts_semicolons_inside_ddl() {
        let default = body("ALTER TABLE t ADD c TEXT DEFAULT 'a;b';", "ALTER TABLE t DROP COLUMN c;");
        let (up, _) = parse_sections("a.sql", &default).unwrap();
        assert_eq!(up, "ALTER TABLE t ADD c TEXT DEFAULT 'a;b';");

        let function = body(
            "CREATE FUNCTION touch() RETURNS trigger AS $$\nBEGIN\n  NEW.updated_at := now();\n  RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql;",
            "DROP FUNCTION touch();",
        );
        assert!(parse_sections("a.sql", &function).is_ok());
    }

    #[test]
    fn test_has_ddl() {
        assert!(has_ddl("INSERT INTO a VALUES (1); DROP TABLE a;"));
        assert!(!has_ddl("INSERT INTO a VALUES (1); UPDATE a SET id = 2;"));
    }

    #[tokio::test]
    async fn test_list_files_creates_directory_and_sorts() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("migrations");
        let parser = MigrationFileParser::new(&dir);

        assert!(parser.list_files().await.unwrap().is_empty());
        assert!(dir.exists());

        fs::write(dir.join("002-b.sql"), "").await.unwrap();
        fs::write(dir.join("001-a.sql"), "").await.unwrap();
        fs::write(dir.join("notes.txt"), "").await.unwrap();

        assert_eq!(parser.list_files().await.unwrap(), vec!["001-a.sql", "002-b.sql"]);
    }

    #[tokio::test]
    async fn test_navigation() {
        let temp = TempDir::new().unwrap();
        write(&temp, "T1-a.sql", &body("CREATE TABLE a (id INT);", "DROP TABLE a;")).await;
        write(&temp, "T2-b.sql", &body("CREATE TABLE b (id INT);", "DROP TABLE b;")).await;
        write(&temp, "T3-c.sql", &body("CREATE TABLE c (id INT);", "DROP TABLE c;")).await;
        let parser = MigrationFileParser::new(temp.path());

        let next = parser.next("T1-a.sql").await.unwrap().unwrap();
        assert_eq!(next.file_name(), "T2-b.sql");
        assert!(next.batch_id().is_none());
        assert!(parser.next("T3-c.sql").await.unwrap().is_none());

        let before = parser.before("T2-b.sql").await.unwrap().unwrap();
        assert_eq!(before.file_name(), "T1-a.sql");
        assert!(parser.before("T1-a.sql").await.unwrap().is_none());

        let after: Vec<_> = parser.all_next_to("T1-a.sql").await.unwrap();
        let names: Vec<&str> = after.iter().map(|m| m.file_name()).collect();
        assert_eq!(names, vec!["T2-b.sql", "T3-c.sql"]);
        assert!(after[0].batch_id().is_some());
        assert_eq!(after[0].batch_id(), after[1].batch_id());

        let earlier = parser.all_before_to("T3-c.sql").await.unwrap();
        assert_eq!(earlier.len(), 2);

        assert!(matches!(
            parser.next("T9-missing.sql").await,
            Err(MigrateError::MigrationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_all_migrations_share_a_batch() {
        let temp = TempDir::new().unwrap();
        write(&temp, "001-a.sql", &body("CREATE TABLE a (id INT);", "DROP TABLE a;")).await;
        write(&temp, "002-b.sql", &body("CREATE TABLE b (id INT);", "DROP TABLE b;")).await;
        let parser = MigrationFileParser::new(temp.path());

        let first = parser.all_migrations().await.unwrap();
        let second = parser.all_migrations().await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].batch_id(), first[1].batch_id());
        assert_ne!(first[0].batch_id(), second[0].batch_id());
        assert!(first[0].migrated_at() < first[1].migrated_at());
    }

    #[tokio::test]
    async fn test_make_migration_file() {
        let temp = TempDir::new().unwrap();
        let parser = MigrationFileParser::new(temp.path().join("migrations"));

        let path = parser.make_migration_file("create users").await.unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.ends_with("-create-users.sql"));
        assert_eq!(name.len(), "20240101120000123-create-users.sql".len());

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.starts_with(UP_MARKER));
        assert!(content.contains(DOWN_MARKER));

        assert!(parser.make_migration_file("   ").await.is_err());
    }
}
