use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::schema::Row;
use crate::db::DbConfig;
use crate::query::viz::VizType;
use crate::query::{QueryError, QueryOutcome};
use crate::web::state::{AppState, DEFAULT_SESSION};

/// Header naming the caller's config slot.
pub const SESSION_HEADER: &str = "x-session-id";

/// Multipart field carrying the recording.
pub const AUDIO_FIELD: &str = "audio";

// Request types

#[derive(Debug, Deserialize)]
pub struct ProcessTranscriptionRequest {
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default, rename = "dbConfig")]
    pub db_config: Option<DbConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SchemaMermaidRequest {
    #[serde(default, rename = "dbConfig")]
    pub db_config: Option<DbConfig>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub audio_url: String,
    pub transcription: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessTranscriptionResponse {
    pub sql_query: Option<String>,
    pub results: Option<Vec<Row>>,
    pub viz_type: VizType,
    pub explanation: String,
}

#[derive(Debug, Serialize)]
pub struct MermaidResponse {
    pub mermaid: String,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
}

fn session_id(headers: &HeaderMap) -> &str {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_SESSION)
}

// Audio upload and transcription
pub async fn upload_audio(
    State(app_state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let missing = || (StatusCode::BAD_REQUEST, "No audio file uploaded".to_string());

    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected upload: {}", e);
        missing()
    })?;

    let mut staged = None;
    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {}", e);
        (StatusCode::BAD_REQUEST, e.body_text())
    })? {
        if field.name() != Some(AUDIO_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let file_name = field.file_name().unwrap_or(AUDIO_FIELD).to_string();
        let mut audio = app_state.transcription.stage(&file_name).map_err(|e| {
            error!("Failed to stage upload: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error processing audio: {}", e))
        })?;

        while let Some(chunk) = field.chunk().await.map_err(|e| {
            warn!("Upload interrupted: {}", e);
            (StatusCode::BAD_REQUEST, e.body_text())
        })? {
            audio.write_chunk(&chunk).await.map_err(|e| {
                error!("Failed to write staged audio: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Error processing audio: {}", e))
            })?;
        }
        audio.finish().await.map_err(|e| {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error processing audio: {}", e))
        })?;

        staged = Some(audio);
        break;
    }

    let staged = staged.filter(|audio| !audio.is_empty()).ok_or_else(missing)?;

    let transcribed = app_state.transcription.transcribe(staged).await.map_err(|e| {
        error!("Error processing audio: {}", e);
        let status = if e.is_timeout() {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, format!("Error processing audio: {}", e))
    })?;

    info!(url = %transcribed.audio_url, "Transcription: {}", transcribed.transcription);

    Ok(Json(UploadResponse {
        audio_url: transcribed.audio_url,
        transcription: transcribed.transcription,
    }))
}

// Natural-language query over the caller's database
pub async fn process_transcription(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<ProcessTranscriptionRequest>, JsonRejection>,
) -> Response {
    let missing = || {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing transcription or DB config" })),
        )
            .into_response()
    };

    let Ok(Json(request)) = payload else {
        return missing();
    };
    let (Some(transcription), Some(db_config)) = (
        request.transcription.filter(|t| !t.trim().is_empty()),
        request.db_config,
    ) else {
        warn!("Missing transcription or dbConfig");
        return missing();
    };

    match app_state.queries.run(&db_config, &transcription).await {
        Ok(QueryOutcome::NoQuery {
            explanation,
            viz_type,
        }) => Json(ProcessTranscriptionResponse {
            sql_query: None,
            results: None,
            viz_type,
            explanation,
        })
        .into_response(),
        Ok(QueryOutcome::Answered {
            sql,
            result,
            decision,
        }) => Json(ProcessTranscriptionResponse {
            sql_query: Some(sql),
            results: Some(result.rows),
            viz_type: decision.viz_type,
            explanation: decision.explanation,
        })
        .into_response(),
        Err(QueryError::Execution {
            message,
            sql,
            viz_type,
        }) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "SQL execution failed",
                "message": message,
                "sql_query": sql,
                "viz_type": viz_type,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// Saved DB config for the caller's session
pub async fn set_db_config(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DbConfig>, JsonRejection>,
) -> Result<&'static str, (StatusCode, String)> {
    let incomplete = || (StatusCode::BAD_REQUEST, "Incomplete DB config".to_string());

    let Json(config) = payload.map_err(|_| incomplete())?;
    config.validate().map_err(|e| {
        warn!("Rejected DB config: {}", e);
        incomplete()
    })?;

    app_state.save_db_config(session_id(&headers), config).await;
    Ok("DB config saved.")
}

// ER diagram of the request's or the session's database
pub async fn schema_mermaid(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MermaidResponse>, (StatusCode, String)> {
    let missing = || (StatusCode::BAD_REQUEST, "Missing DB config".to_string());

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SchemaMermaidRequest::default()
    } else {
        serde_json::from_slice::<SchemaMermaidRequest>(&body).map_err(|e| {
            warn!("Unreadable schema-mermaid body: {}", e);
            missing()
        })?
    };

    let db_config = match request.db_config {
        Some(config) => config,
        None => app_state
            .db_config(session_id(&headers))
            .await
            .ok_or_else(missing)?,
    };

    let mermaid = app_state.queries.schema_diagram(&db_config).await.map_err(|e| {
        error!("Failed to generate Mermaid schema: {}", e);
        let detail = match e {
            QueryError::Connection(inner) | QueryError::Schema(inner) => inner.to_string(),
            other => other.to_string(),
        };
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to generate Mermaid schema: {}", detail),
        )
    })?;

    Ok(Json(MermaidResponse { mermaid }))
}

// System status
pub async fn health(State(app_state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let uptime = chrono::Utc::now()
        .signed_duration_since(app_state.startup_time)
        .num_seconds();

    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime,
    })
}
