pub mod mermaid;
pub mod mysql;
pub mod schema;
pub mod statement;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schema::{ExecutionResult, SchemaDescription};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0}")]
    Connection(String),
    #[error("{0}")]
    Introspection(String),
    #[error("{0}")]
    Execution(String),
    #[error("invalid database config: {0}")]
    InvalidConfig(String),
}

/// Connection details supplied by the caller for a single request.
///
/// Every field is optional on the wire so that handlers can answer a missing
/// field with their own error format instead of a framework rejection.
#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DbConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl DbConfig {
    pub fn new(host: &str, user: &str, password: &str, database: &str) -> Self {
        Self {
            host: Some(host.to_string()),
            user: Some(user.to_string()),
            password: Some(password.to_string()),
            database: Some(database.to_string()),
            port: None,
        }
    }

    /// Host, user and database must be present and non-empty. An empty
    /// password is allowed.
    pub fn validate(&self) -> Result<(), DbError> {
        let missing: Vec<&str> = [
            ("host", &self.host),
            ("user", &self.user),
            ("database", &self.database),
        ]
        .iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DbError::InvalidConfig(format!("missing {}", missing.join(", "))))
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or_default()
    }

    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    pub fn database(&self) -> &str {
        self.database.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("port", &self.port)
            .finish()
    }
}

/// Opens one connection per request. Nothing is pooled across requests
/// because each caller may point at a different server.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn connect(&self, config: &DbConfig) -> Result<Box<dyn SqlSession>, DbError>;
}

#[async_trait]
pub trait SqlSession: Send {
    /// Reads tables, columns and foreign keys of the connected database.
    async fn load_schema(&mut self) -> Result<SchemaDescription, DbError>;

    async fn execute(&mut self, sql: &str) -> Result<ExecutionResult, DbError>;

    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_host_is_rejected() {
        let config = DbConfig {
            host: Some(String::new()),
            user: Some("a".to_string()),
            password: None,
            database: Some("b".to_string()),
            port: None,
        };

        match config.validate() {
            Err(DbError::InvalidConfig(msg)) => assert_eq!(msg, "missing host"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_password_is_allowed() {
        let config = DbConfig {
            password: None,
            ..DbConfig::new("localhost", "root", "", "shop")
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_output_hides_password() {
        let config = DbConfig::new("localhost", "root", "hunter2", "shop");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
