use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use voxsql::audio::assemblyai::AssemblyAiClient;
use voxsql::audio::cloudinary::CloudinaryStore;
use voxsql::audio::pipeline::TranscriptionPipeline;
use voxsql::audio::polling::PollPolicy;
use voxsql::config::{AppConfig, CliArgs};
use voxsql::db::mysql::MySqlBackend;
use voxsql::llm::LlmManager;
use voxsql::query::QueryPipeline;
use voxsql::util::logging::init_tracing;
use voxsql::web::{self, state::AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let upload_dir = PathBuf::from(&config.upload_dir);
    if !upload_dir.exists() {
        info!("Creating upload directory: {}", config.upload_dir);
        std::fs::create_dir_all(&upload_dir)?;
    }

    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm = Arc::new(LlmManager::new(&config.llm)?);

    let backend = Arc::new(MySqlBackend::new(
        config.database.connect_timeout(),
        config.database.default_port,
    ));
    let queries = QueryPipeline::new(backend, llm);

    let store = Arc::new(CloudinaryStore::new(&config.storage)?);
    let service = Arc::new(AssemblyAiClient::new(&config.transcription)?);
    let policy = PollPolicy::from(&config.transcription);
    info!(
        initial_ms = policy.initial.as_millis() as u64,
        max_wait_secs = policy.max_wait.as_secs(),
        "Transcription polling policy"
    );
    let transcription = TranscriptionPipeline::new(store, service, policy, upload_dir);

    let app_state = Arc::new(AppState::new(config.clone(), queries, transcription));

    info!("Starting VoxSQL server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
