use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
    /// Saved DB configs kept at once; the least recently saved is evicted.
    pub max_sessions: usize,
    /// Saved DB configs expire this long after their last write.
    pub session_ttl_secs: u64,
}

impl WebConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "gemini", "remote", or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Object storage credentials for uploaded audio.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_url: String,
    pub folder: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TranscriptionConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub backoff_multiplier: f64,
    pub max_wait_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub connect_timeout_secs: u64,
    pub default_port: u16,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,
    pub database: DatabaseConfig,
    pub upload_dir: String,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory for temporary audio files
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Defaults first, so a partial file only needs to name what it changes
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/voxsql/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // VOXSQL_LLM__API_KEY, VOXSQL_STORAGE__API_SECRET, ...
        config_builder = config_builder.add_source(
            Environment::with_prefix("VOXSQL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(upload_dir) = &args.upload_dir {
            config.upload_dir = upload_dir.clone();
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                max_upload_mb: 25,
                max_sessions: 1024,
                session_ttl_secs: 24 * 60 * 60,
            },
            llm: LlmConfig {
                backend: "gemini".to_string(),
                model: "gemini-1.5-flash".to_string(),
                api_key: None,
                api_url: None,
                temperature: 0.1,
                timeout_secs: 60,
            },
            storage: StorageConfig {
                cloud_name: None,
                api_key: None,
                api_secret: None,
                api_url: "https://api.cloudinary.com/v1_1".to_string(),
                folder: None,
            },
            transcription: TranscriptionConfig {
                api_url: "https://api.assemblyai.com/v2".to_string(),
                api_key: None,
                poll_interval_ms: 3000,
                max_poll_interval_ms: 15_000,
                backoff_multiplier: 1.5,
                max_wait_secs: 600,
            },
            database: DatabaseConfig {
                connect_timeout_secs: 10,
                default_port: 3306,
            },
            upload_dir: "uploads".to_string(),
        }
    }
}
