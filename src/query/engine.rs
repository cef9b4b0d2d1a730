use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::schema::{ExecutionResult, SchemaDescription};
use crate::db::{statement, DbError, SqlSession};
use crate::llm::{parser, prompts, LlmError, LlmManager};
use crate::query::viz::{viz_from_response, VizType};

/// What the first model call produced. `sql` is `None` when the reply had no
/// fenced `sql` block; `raw_output` then explains why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedQuery {
    pub sql: Option<String>,
    pub raw_output: String,
    pub viz_hint: Option<VizType>,
}

impl GeneratedQuery {
    pub fn from_response(raw_output: String) -> Self {
        Self {
            sql: parser::extract_sql(&raw_output),
            viz_hint: viz_from_response(&raw_output),
            raw_output,
        }
    }
}

pub struct QueryEngine {
    llm: Arc<LlmManager>,
}

impl QueryEngine {
    pub fn new(llm: Arc<LlmManager>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        schema: &SchemaDescription,
        utterance: &str,
    ) -> Result<GeneratedQuery, LlmError> {
        let prompt = prompts::sql_prompt(schema, utterance);
        debug!("SQL prompt: {}", prompt);

        let response = self.llm.complete(&prompt).await?;
        debug!("Full model response: {}", response);

        let generated = GeneratedQuery::from_response(response);
        match &generated.sql {
            Some(sql) => info!("Extracted SQL: {}", sql),
            None => info!("No SQL block in model response"),
        }
        Ok(generated)
    }

    /// Runs the statement as-is. No retry and no rewriting. Batches are
    /// refused before they reach the server.
    pub async fn execute(
        &self,
        session: &mut dyn SqlSession,
        sql: &str,
    ) -> Result<ExecutionResult, DbError> {
        let statement = statement::single_statement(sql)?;
        session.execute(statement).await
    }
}
