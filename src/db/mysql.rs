use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::db::schema::{
    ColumnSchema, ExecutionResult, ForeignKeyEdge, KeyRole, Row as ResultRow, SchemaDescription,
    TableSchema,
};
use crate::db::statement::single_statement;
use crate::db::{DbConfig, DbError, SqlBackend, SqlSession};

const TABLES_QUERY: &str = "
    SELECT CAST(table_name AS CHAR) AS table_name
    FROM information_schema.tables
    WHERE table_schema = ?
    ORDER BY table_name";

const COLUMNS_QUERY: &str = "
    SELECT CAST(table_name AS CHAR) AS table_name,
           CAST(column_name AS CHAR) AS column_name,
           CAST(column_type AS CHAR) AS column_type,
           CAST(column_key AS CHAR) AS column_key
    FROM information_schema.columns
    WHERE table_schema = ?
    ORDER BY table_name, ordinal_position";

const FOREIGN_KEYS_QUERY: &str = "
    SELECT CAST(table_name AS CHAR) AS table_name,
           CAST(column_name AS CHAR) AS column_name,
           CAST(referenced_table_name AS CHAR) AS referenced_table_name,
           CAST(referenced_column_name AS CHAR) AS referenced_column_name
    FROM information_schema.key_column_usage
    WHERE table_schema = ? AND referenced_table_name IS NOT NULL
    ORDER BY table_name, column_name, constraint_name";

pub struct MySqlBackend {
    connect_timeout: Duration,
    default_port: u16,
}

impl MySqlBackend {
    pub fn new(connect_timeout: Duration, default_port: u16) -> Self {
        Self {
            connect_timeout,
            default_port,
        }
    }

    fn connect_options(&self, config: &DbConfig) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(config.host())
            .port(config.port.unwrap_or(self.default_port))
            .username(config.user())
            .password(config.password())
            .database(config.database())
    }
}

#[async_trait]
impl SqlBackend for MySqlBackend {
    async fn connect(&self, config: &DbConfig) -> Result<Box<dyn SqlSession>, DbError> {
        config.validate()?;

        let options = self.connect_options(config);
        let mut conn = tokio::time::timeout(self.connect_timeout, options.connect())
            .await
            .map_err(|_| {
                DbError::Connection(format!(
                    "timed out after {}s connecting to {}",
                    self.connect_timeout.as_secs(),
                    config.host()
                ))
            })?
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let active: Option<String> = sqlx::query_scalar("SELECT DATABASE()")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        info!(
            host = %config.host(),
            database = active.as_deref().unwrap_or("<none>"),
            "Connected to MySQL"
        );

        Ok(Box::new(MySqlSession {
            conn: Some(conn),
            database: config.database().to_string(),
        }))
    }
}

pub struct MySqlSession {
    conn: Option<MySqlConnection>,
    database: String,
}

impl MySqlSession {
    fn conn(&mut self) -> Result<&mut MySqlConnection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Connection("connection already closed".to_string()))
    }
}

#[async_trait]
impl SqlSession for MySqlSession {
    async fn load_schema(&mut self) -> Result<SchemaDescription, DbError> {
        let database = self.database.clone();
        let conn = self.conn()?;
        let introspection = |e: sqlx::Error| DbError::Introspection(e.to_string());

        let table_rows = sqlx::query(TABLES_QUERY)
            .bind(&database)
            .fetch_all(&mut *conn)
            .await
            .map_err(introspection)?;

        let mut tables = Vec::with_capacity(table_rows.len());
        for row in &table_rows {
            tables.push(TableSchema {
                name: row.try_get("table_name").map_err(introspection)?,
                columns: Vec::new(),
            });
        }

        let column_rows = sqlx::query(COLUMNS_QUERY)
            .bind(&database)
            .fetch_all(&mut *conn)
            .await
            .map_err(introspection)?;

        for row in &column_rows {
            let table_name: String = row.try_get("table_name").map_err(introspection)?;
            let key: Option<String> = row.try_get("column_key").map_err(introspection)?;
            let column = ColumnSchema {
                name: row.try_get("column_name").map_err(introspection)?,
                data_type: row.try_get("column_type").map_err(introspection)?,
                key_role: KeyRole::from_column_key(key.as_deref().unwrap_or("")),
            };

            match tables.iter_mut().find(|t| t.name == table_name) {
                Some(table) => table.columns.push(column),
                None => warn!(table = %table_name, "Column for unlisted table skipped"),
            }
        }

        let fk_rows = sqlx::query(FOREIGN_KEYS_QUERY)
            .bind(&database)
            .fetch_all(&mut *conn)
            .await
            .map_err(introspection)?;

        let mut foreign_keys = Vec::with_capacity(fk_rows.len());
        for row in &fk_rows {
            foreign_keys.push(ForeignKeyEdge {
                from_table: row.try_get("table_name").map_err(introspection)?,
                from_column: row.try_get("column_name").map_err(introspection)?,
                to_table: row.try_get("referenced_table_name").map_err(introspection)?,
                to_column: row.try_get("referenced_column_name").map_err(introspection)?,
            });
        }

        info!(
            database = %database,
            tables = tables.len(),
            foreign_keys = foreign_keys.len(),
            "Schema loaded"
        );

        Ok(SchemaDescription::new(tables, foreign_keys))
    }

    async fn execute(&mut self, sql: &str) -> Result<ExecutionResult, DbError> {
        let start_time = Instant::now();
        let sql = single_statement(sql)?;
        let conn = self.conn()?;

        // Text protocol, so any single statement the server accepts can run
        let rows: Vec<MySqlRow> = sqlx::Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| DbError::Execution(execution_message(&e)))?;

        let result = ExecutionResult::new(rows.iter().map(row_to_json).collect());

        info!(
            rows = result.row_count,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(result)
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!("Error closing MySQL connection: {}", e);
            }
        }
    }
}

/// Prefers the server's own message ("Table 'shop.foo' doesn't exist") over
/// sqlx's wrapper text.
fn execution_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    }
}

fn row_to_json(row: &MySqlRow) -> ResultRow {
    let mut object = ResultRow::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = extract_value(row, i, column.name(), column.type_info().name());
        object.insert(column.name().to_string(), value);
    }
    object
}

/// A NULL cell decodes to `Ok(None)`, so any error here is a non-NULL value
/// that could not be read.
fn checked<T>(
    result: Result<Option<T>, sqlx::Error>,
    column: &str,
    type_name: &str,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(column, type_name, "Failed to decode cell: {}", e);
            None
        }
    }
}

/// Decodes a single cell into JSON based on the MySQL type name.
fn extract_value(row: &MySqlRow, index: usize, column: &str, type_name: &str) -> Value {
    let value = match type_kind(type_name) {
        TypeKind::Null => None,
        TypeKind::Bool => checked(row.try_get::<Option<bool>, _>(index), column, type_name)
            .map(Value::Bool),
        TypeKind::Signed => checked(row.try_get::<Option<i64>, _>(index), column, type_name)
            .map(Value::from),
        TypeKind::Unsigned => checked(row.try_get::<Option<u64>, _>(index), column, type_name)
            .map(Value::from),
        TypeKind::Float => checked(row.try_get::<Option<f32>, _>(index), column, type_name)
            .map(|v| Value::from(v as f64)),
        TypeKind::Double => checked(row.try_get::<Option<f64>, _>(index), column, type_name)
            .map(Value::from),
        TypeKind::Date => checked(
            row.try_get::<Option<chrono::NaiveDate>, _>(index),
            column,
            type_name,
        )
        .map(|d| Value::String(d.to_string())),
        TypeKind::DateTime => checked(
            row.try_get::<Option<chrono::NaiveDateTime>, _>(index),
            column,
            type_name,
        )
        .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S").to_string())),
        TypeKind::Timestamp => checked(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index),
            column,
            type_name,
        )
        .map(|d| Value::String(d.to_rfc3339())),
        TypeKind::Json => checked(row.try_get::<Option<Value>, _>(index), column, type_name),
        // sqlx's byte types refuse BIT columns, so read the raw bytes
        TypeKind::Bit => checked(
            row.try_get_unchecked::<Option<Vec<u8>>, _>(index),
            column,
            type_name,
        )
        .map(|bytes| Value::from(bits_to_u64(&bytes))),
        TypeKind::Binary => checked(
            row.try_get_unchecked::<Option<Vec<u8>>, _>(index),
            column,
            type_name,
        )
        .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        // DECIMAL, TIME, YEAR, ENUM, SET and text all arrive as strings on the wire
        TypeKind::Text => checked(
            row.try_get_unchecked::<Option<String>, _>(index),
            column,
            type_name,
        )
        .map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

/// BIT(n) arrives big-endian, at most eight bytes wide.
fn bits_to_u64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeKind {
    Null,
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    Date,
    DateTime,
    Timestamp,
    Json,
    Bit,
    Binary,
    Text,
}

fn type_kind(type_name: &str) -> TypeKind {
    let upper = type_name.to_ascii_uppercase();
    let unsigned = upper.ends_with("UNSIGNED");
    let base = upper.split_whitespace().next().unwrap_or("");

    match base {
        "NULL" => TypeKind::Null,
        "BOOLEAN" => TypeKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" if unsigned => TypeKind::Unsigned,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => TypeKind::Signed,
        "FLOAT" => TypeKind::Float,
        "DOUBLE" => TypeKind::Double,
        "DATE" => TypeKind::Date,
        "DATETIME" => TypeKind::DateTime,
        "TIMESTAMP" => TypeKind::Timestamp,
        "JSON" => TypeKind::Json,
        "BIT" => TypeKind::Bit,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            TypeKind::Binary
        }
        _ => TypeKind::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_types_respect_signedness() {
        assert_eq!(type_kind("INT"), TypeKind::Signed);
        assert_eq!(type_kind("BIGINT UNSIGNED"), TypeKind::Unsigned);
        assert_eq!(type_kind("TINYINT"), TypeKind::Signed);
    }

    #[test]
    fn string_like_types_decode_as_text() {
        assert_eq!(type_kind("VARCHAR"), TypeKind::Text);
        assert_eq!(type_kind("DECIMAL"), TypeKind::Text);
        assert_eq!(type_kind("TIME"), TypeKind::Text);
        assert_eq!(type_kind("ENUM"), TypeKind::Text);
    }

    #[test]
    fn temporal_and_binary_types() {
        assert_eq!(type_kind("DATETIME"), TypeKind::DateTime);
        assert_eq!(type_kind("TIMESTAMP"), TypeKind::Timestamp);
        assert_eq!(type_kind("BLOB"), TypeKind::Binary);
        assert_eq!(type_kind("JSON"), TypeKind::Json);
    }

    #[test]
    fn bit_columns_decode_as_numbers() {
        assert_eq!(type_kind("BIT"), TypeKind::Bit);
        assert_eq!(type_kind("VARBINARY"), TypeKind::Binary);
        assert_eq!(bits_to_u64(&[0x01]), 1);
        assert_eq!(bits_to_u64(&[0x01, 0x00]), 256);
        assert_eq!(bits_to_u64(&[]), 0);
    }

    #[tokio::test]
    async fn incomplete_config_fails_before_connecting() {
        let backend = MySqlBackend::new(Duration::from_secs(1), 3306);
        let config = DbConfig {
            host: None,
            ..DbConfig::new("localhost", "root", "", "shop")
        };

        match backend.connect(&config).await {
            Err(DbError::InvalidConfig(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("connected without a host"),
        }
    }
}
