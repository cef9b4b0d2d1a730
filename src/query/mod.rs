//! Sequencing for `/process-transcription` and `/schema-mermaid`:
//! received → schema-loaded → sql-generated → (sql-executed | sql-generation-failed)
//! → viz-classified → responded.

pub mod engine;
pub mod viz;

use std::sync::Arc;
use tracing::{info, warn};

use crate::db::schema::{ExecutionResult, SchemaDescription};
use crate::db::{mermaid, DbConfig, DbError, SqlBackend, SqlSession};
use crate::llm::{LlmError, LlmManager};
use engine::{GeneratedQuery, QueryEngine};
use viz::{VisualizationDecision, VizClassifier, VizType};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Database connection failed: {0}")]
    Connection(DbError),
    #[error("Failed to extract DB schema: {0}")]
    Schema(DbError),
    #[error("Error processing transcription: {0}")]
    Model(LlmError),
    #[error("SQL execution failed: {message}")]
    Execution {
        message: String,
        sql: String,
        viz_type: VizType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// The model could not map the request onto the schema.
    NoQuery {
        explanation: String,
        viz_type: VizType,
    },
    Answered {
        sql: String,
        result: ExecutionResult,
        decision: VisualizationDecision,
    },
}

pub struct QueryPipeline {
    backend: Arc<dyn SqlBackend>,
    engine: QueryEngine,
    classifier: VizClassifier,
}

impl QueryPipeline {
    pub fn new(backend: Arc<dyn SqlBackend>, llm: Arc<LlmManager>) -> Self {
        Self {
            backend,
            engine: QueryEngine::new(Arc::clone(&llm)),
            classifier: VizClassifier::new(llm),
        }
    }

    /// Answers one transcription against the database in `config`. The
    /// schema used for the prompt is read over the same connection that
    /// executes the generated SQL.
    pub async fn run(&self, config: &DbConfig, transcription: &str) -> Result<QueryOutcome, QueryError> {
        info!("Received transcription: {}", transcription);

        let mut session = self.backend.connect(config).await.map_err(QueryError::Connection)?;
        let outcome = self.run_in_session(session.as_mut(), transcription).await;
        session.close().await;
        outcome
    }

    async fn run_in_session(
        &self,
        session: &mut dyn SqlSession,
        transcription: &str,
    ) -> Result<QueryOutcome, QueryError> {
        let schema = session.load_schema().await.map_err(QueryError::Schema)?;
        info!(tables = schema.tables.len(), "schema-loaded");

        let generated = self
            .engine
            .generate(&schema, transcription)
            .await
            .map_err(QueryError::Model)?;

        let GeneratedQuery {
            sql,
            raw_output,
            viz_hint,
        } = generated;

        let Some(sql) = sql else {
            info!("sql-generation-failed");
            return Ok(QueryOutcome::NoQuery {
                explanation: raw_output,
                viz_type: viz_hint.unwrap_or_default(),
            });
        };
        info!("sql-generated");

        let result = match self.engine.execute(session, &sql).await {
            Ok(result) => result,
            Err(e) => {
                warn!(sql = %sql, "SQL query failed: {}", e);
                return Err(QueryError::Execution {
                    message: e.to_string(),
                    sql,
                    viz_type: viz_hint.unwrap_or_default(),
                });
            }
        };
        info!(rows = result.row_count, "sql-executed");

        let decision = self
            .classify_or_fallback(transcription, &sql, &schema, &result, viz_hint)
            .await;
        info!(viz_type = %decision.viz_type, "viz-classified");

        Ok(QueryOutcome::Answered {
            sql,
            result,
            decision,
        })
    }

    /// A failed classification does not discard rows that were already
    /// fetched; the fallback tag is used instead.
    async fn classify_or_fallback(
        &self,
        transcription: &str,
        sql: &str,
        schema: &SchemaDescription,
        result: &ExecutionResult,
        viz_hint: Option<VizType>,
    ) -> VisualizationDecision {
        match self
            .classifier
            .classify(transcription, sql, schema, result, viz_hint)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Visualization classification failed: {}", e);
                VisualizationDecision {
                    viz_type: viz_hint.unwrap_or_default(),
                    explanation: format!("Visualization suggestion unavailable: {}", e),
                }
            }
        }
    }

    pub async fn schema(&self, config: &DbConfig) -> Result<SchemaDescription, QueryError> {
        let mut session = self.backend.connect(config).await.map_err(QueryError::Connection)?;
        let schema = session.load_schema().await.map_err(QueryError::Schema);
        session.close().await;
        schema
    }

    pub async fn schema_diagram(&self, config: &DbConfig) -> Result<String, QueryError> {
        let schema = self.schema(config).await?;
        Ok(mermaid::render(&schema))
    }
}
