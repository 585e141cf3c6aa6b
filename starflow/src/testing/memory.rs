//! An in-process warehouse for tests and local runs.
//!
//! `MemoryWarehouse` understands the handful of statement shapes the loaders
//! issue. It keeps tables as row vectors, serves object-storage prefixes for
//! `COPY`, and answers `INSERT ... SELECT` from results registered up front.
//! It does not evaluate arbitrary SQL.

use crate::errors::WarehouseError;
use crate::observability::redact_credentials;
use crate::warehouse::{Row, ScalarValue, Warehouse};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        fn $name() -> &'static Regex {
            static PATTERN: OnceLock<Regex> = OnceLock::new();
            PATTERN.get_or_init(|| Regex::new($re).unwrap_or_else(|e| unreachable!("valid pattern: {e}")))
        }
    };
}

pattern!(create_pattern, r"(?is)^CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?(\w+)\s*(\((.*)\))?\s*$");
pattern!(drop_pattern, r"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\s+)?(\w+)\s*$");
pattern!(delete_pattern, r"(?is)^DELETE\s+FROM\s+(\w+)\s*$");
pattern!(insert_pattern, r"(?is)^INSERT\s+INTO\s+(\w+)\s+(SELECT\b.*)$");
pattern!(copy_pattern, r"(?is)^COPY\s+(\w+)\s+FROM\s+'([^']+)'");
pattern!(count_pattern, r"(?is)^SELECT\s+COUNT\(\*\)\s+FROM\s+(\w+)(\s+WHERE\s+(\w+)\s+IS\s+NULL)?\s*$");

#[derive(Debug, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug)]
struct FailureRule {
    pattern: String,
    message: String,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Table>,
    objects: BTreeMap<String, Vec<Row>>,
    selects: HashMap<String, Vec<Row>>,
    answers: HashMap<String, Vec<Row>>,
    failures: Vec<FailureRule>,
    log: Vec<String>,
}

impl State {
    fn check_failure(&mut self, statement: &str) -> Result<(), WarehouseError> {
        let hit = self.failures.iter_mut().find(|rule| {
            statement.contains(&rule.pattern) && rule.remaining.map_or(true, |n| n > 0)
        });
        if let Some(rule) = hit {
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return Err(WarehouseError::new(rule.message.clone()).with_statement(statement));
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str, statement: &str) -> Result<&mut Table, WarehouseError> {
        self.tables
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| missing_relation(name, statement))
    }

    fn execute(&mut self, statement: &str) -> Result<u64, WarehouseError> {
        if let Some(caps) = create_pattern().captures(statement) {
            let name = caps[2].to_lowercase();
            if self.tables.contains_key(&name) {
                if caps.get(1).is_some() {
                    return Ok(0);
                }
                return Err(WarehouseError::new(format!("relation \"{name}\" already exists"))
                    .with_statement(statement));
            }
            let columns = caps.get(4).map(|m| parse_columns(m.as_str())).unwrap_or_default();
            self.tables.insert(name, Table { columns, rows: Vec::new() });
            return Ok(0);
        }

        if let Some(caps) = drop_pattern().captures(statement) {
            let name = caps[2].to_lowercase();
            if self.tables.remove(&name).is_none() && caps.get(1).is_none() {
                return Err(missing_relation(&name, statement));
            }
            return Ok(0);
        }

        if let Some(caps) = delete_pattern().captures(statement) {
            let table = self.table_mut(&caps[1], statement)?;
            let deleted = table.rows.len();
            table.rows.clear();
            return Ok(deleted as u64);
        }

        if let Some(caps) = insert_pattern().captures(statement) {
            let key = normalize(&caps[2]);
            let rows = self.selects.get(&key).cloned().ok_or_else(|| {
                WarehouseError::new("MemoryWarehouse has no result registered for this SELECT")
                    .with_statement(statement)
            })?;
            let table = self.table_mut(&caps[1], statement)?;
            let inserted = rows.len();
            table.rows.extend(rows);
            return Ok(inserted as u64);
        }

        if let Some(caps) = copy_pattern().captures(statement) {
            let prefix = caps[2].to_string();
            let rows: Vec<Row> = self
                .objects
                .iter()
                .filter(|(uri, _)| uri.starts_with(&prefix))
                .flat_map(|(_, rows)| rows.iter().cloned())
                .collect();
            let table = self.table_mut(&caps[1], statement)?;
            let copied = rows.len();
            table.rows.extend(rows);
            return Ok(copied as u64);
        }

        Err(WarehouseError::new("MemoryWarehouse does not support this statement").with_statement(statement))
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        if let Some(rows) = self.answers.get(&normalize(sql)) {
            return Ok(rows.clone());
        }

        if let Some(caps) = count_pattern().captures(sql.trim()) {
            let table = self.table_mut(&caps[1], sql)?;
            let count = match caps.get(3) {
                None => table.rows.len(),
                Some(column) => {
                    let column = column.as_str().to_lowercase();
                    let index = table.columns.iter().position(|c| *c == column).ok_or_else(|| {
                        WarehouseError::new(format!("column \"{column}\" does not exist")).with_statement(sql)
                    })?;
                    table
                        .rows
                        .iter()
                        .filter(|row| row.get(index).map_or(true, ScalarValue::is_null))
                        .count()
                }
            };
            return Ok(vec![vec![ScalarValue::Int(i64::try_from(count).unwrap_or(i64::MAX))]]);
        }

        Err(WarehouseError::new("MemoryWarehouse has no answer registered for this query").with_statement(sql))
    }
}

fn missing_relation(name: &str, statement: &str) -> WarehouseError {
    WarehouseError::new(format!("relation \"{}\" does not exist", name.to_lowercase())).with_statement(statement)
}

/// Collapses whitespace so registered selects match regardless of layout.
fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts column names from a `CREATE TABLE` body.
fn parse_columns(body: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => entries.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    entries.push(current);

    entries
        .iter()
        .filter_map(|entry| entry.split_whitespace().next())
        .map(str::to_lowercase)
        .filter(|word| !matches!(word.as_str(), "primary" | "unique" | "constraint" | "foreign"))
        .collect()
}

/// Splits a script into statements. Quoted `;` are not supported.
fn split_statements(script: &str) -> impl Iterator<Item = &str> {
    script.split(';').map(str::trim).filter(|s| !s.is_empty())
}

/// In-process [`Warehouse`] double.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    /// Creates an empty warehouse with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with the given columns, replacing any existing one.
    pub fn create_table(&self, name: &str, columns: &[&str]) {
        self.state.lock().tables.insert(
            name.to_lowercase(),
            Table {
                columns: columns.iter().map(|c| c.to_lowercase()).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Appends rows to an existing table. Returns false if the table is missing.
    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) -> bool {
        match self.state.lock().tables.get_mut(&table.to_lowercase()) {
            Some(t) => {
                t.rows.extend(rows);
                true
            }
            None => false,
        }
    }

    /// Returns a copy of a table's rows.
    #[must_use]
    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.state.lock().tables.get(&table.to_lowercase()).map(|t| t.rows.clone())
    }

    /// Returns the number of rows in a table, `None` if it doesn't exist.
    #[must_use]
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.state.lock().tables.get(&table.to_lowercase()).map(|t| t.rows.len())
    }

    /// Returns true if the table exists.
    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(&table.to_lowercase())
    }

    /// Stores an object; `COPY` loads every object under the given prefix.
    pub fn put_object(&self, uri: impl Into<String>, rows: Vec<Row>) {
        self.state.lock().objects.insert(uri.into(), rows);
    }

    /// Registers the rows a `SELECT` produces for `INSERT INTO ... SELECT`.
    pub fn register_select(&self, select_sql: &str, rows: Vec<Row>) {
        self.state.lock().selects.insert(normalize(select_sql), rows);
    }

    /// Registers a fixed result for a query passed to `get_records`.
    pub fn register_answer(&self, query: &str, rows: Vec<Row>) {
        self.state.lock().answers.insert(normalize(query), rows);
    }

    /// Fails every statement containing `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>, message: impl Into<String>) {
        self.state.lock().failures.push(FailureRule {
            pattern: pattern.into(),
            message: message.into(),
            remaining: None,
        });
    }

    /// Fails the next `times` statements containing `pattern`.
    pub fn fail_times(&self, pattern: impl Into<String>, times: u32, message: impl Into<String>) {
        self.state.lock().failures.push(FailureRule {
            pattern: pattern.into(),
            message: message.into(),
            remaining: Some(times),
        });
    }

    /// Returns every statement and query received, credentials redacted.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Returns the logged statements that start with `prefix` (case-insensitive).
    #[must_use]
    pub fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_uppercase();
        self.statements()
            .into_iter()
            .filter(|s| s.to_uppercase().starts_with(&prefix))
            .collect()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn run(&self, sql: &str) -> Result<u64, WarehouseError> {
        let mut state = self.state.lock();
        let mut affected = 0;
        for statement in split_statements(sql) {
            state.log.push(redact_credentials(statement));
            state.check_failure(statement)?;
            affected += state.execute(statement)?;
        }
        Ok(affected)
    }

    async fn get_records(&self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        let mut state = self.state.lock();
        let query = sql.trim().trim_end_matches(';');
        state.log.push(redact_credentials(query));
        state.check_failure(query)?;
        state.query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql;
    use pretty_assertions::assert_eq;

    fn text(v: &str) -> ScalarValue {
        ScalarValue::Text(v.to_string())
    }

    #[tokio::test]
    async fn test_create_tables_script() {
        let warehouse = MemoryWarehouse::new();
        warehouse.run(sql::CREATE_TABLES).await.unwrap();

        for table in ["staging_events", "staging_songs", "songplays", "users", "songs", "artists", "time"] {
            assert!(warehouse.has_table(table), "{table} missing");
        }
        // Idempotent thanks to IF NOT EXISTS.
        warehouse.run(sql::CREATE_TABLES).await.unwrap();
    }

    #[test]
    fn test_parse_columns_skips_constraints() {
        let columns = parse_columns("songplay_id VARCHAR(32) NOT NULL, start_time TIMESTAMP, PRIMARY KEY (songplay_id)");
        assert_eq!(columns, vec!["songplay_id".to_string(), "start_time".to_string()]);
    }

    #[tokio::test]
    async fn test_copy_reads_prefix() {
        let warehouse = MemoryWarehouse::new();
        warehouse.create_table("staging_songs", &["song_id"]);
        warehouse.put_object("s3://bucket/song_data/A/a.json", vec![vec![text("S1")]]);
        warehouse.put_object("s3://bucket/song_data/B/b.json", vec![vec![text("S2")]]);
        warehouse.put_object("s3://bucket/log_data/l.json", vec![vec![text("L1")]]);

        let copied = warehouse
            .run("COPY staging_songs\nFROM 's3://bucket/song_data'\nACCESS_KEY_ID 'k'\nSECRET_ACCESS_KEY 's';")
            .await
            .unwrap();

        assert_eq!(copied, 2);
        assert_eq!(warehouse.row_count("staging_songs"), Some(2));
        assert!(warehouse.statements()[0].contains("ACCESS_KEY_ID '***'"));
    }

    #[tokio::test]
    async fn test_insert_select_and_delete() {
        let warehouse = MemoryWarehouse::new();
        warehouse.create_table("users", &["user_id"]);
        warehouse.register_select("SELECT DISTINCT userid\n  FROM staging_events", vec![vec![ScalarValue::Int(1)]]);

        assert_eq!(
            warehouse.run("INSERT INTO users SELECT DISTINCT userid FROM staging_events").await.unwrap(),
            1
        );
        assert_eq!(warehouse.run("DELETE FROM users").await.unwrap(), 1);
        assert_eq!(warehouse.row_count("users"), Some(0));
    }

    #[tokio::test]
    async fn test_unknown_select_and_table_are_errors() {
        let warehouse = MemoryWarehouse::new();
        assert!(warehouse.run("DELETE FROM users").await.is_err());
        warehouse.create_table("users", &["user_id"]);
        assert!(warehouse.run("INSERT INTO users SELECT 1").await.is_err());
        assert!(warehouse.run("VACUUM users").await.is_err());
    }

    #[tokio::test]
    async fn test_count_queries() {
        let warehouse = MemoryWarehouse::new();
        warehouse.create_table("users", &["user_id", "first_name"]);
        warehouse.insert_rows(
            "users",
            vec![
                vec![ScalarValue::Int(1), text("Ann")],
                vec![ScalarValue::Null, text("Bob")],
            ],
        );

        let total = warehouse.get_records("SELECT COUNT(*) FROM users").await.unwrap();
        assert_eq!(total, vec![vec![ScalarValue::Int(2)]]);

        let nulls = warehouse
            .get_records("SELECT COUNT(*) FROM users WHERE user_id IS NULL")
            .await
            .unwrap();
        assert_eq!(nulls, vec![vec![ScalarValue::Int(1)]]);

        assert!(warehouse.get_records("SELECT COUNT(*) FROM users WHERE age IS NULL").await.is_err());
    }

    #[tokio::test]
    async fn test_registered_answer_wins() {
        let warehouse = MemoryWarehouse::new();
        warehouse.register_answer("SELECT MAX(level) FROM users", vec![vec![text("paid")]]);
        let rows = warehouse.get_records("SELECT MAX(level) FROM users").await.unwrap();
        assert_eq!(rows, vec![vec![text("paid")]]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let warehouse = MemoryWarehouse::new();
        warehouse.create_table("users", &["user_id"]);
        warehouse.fail_times("DELETE FROM users", 1, "connection reset");

        let err = warehouse.run("DELETE FROM users").await.unwrap_err();
        assert_eq!(err.message, "connection reset");
        assert_eq!(err.statement.as_deref(), Some("DELETE FROM users"));
        assert!(warehouse.run("DELETE FROM users").await.is_ok());

        warehouse.fail_on("users", "permission denied");
        assert!(warehouse.run("DELETE FROM users").await.is_err());
        assert!(warehouse.run("DELETE FROM users").await.is_err());
    }
}
