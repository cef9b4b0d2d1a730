pub mod assemblyai;
pub mod cloudinary;
pub mod pipeline;
pub mod polling;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Durable copy of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at `path` and returns a publicly fetchable URL.
    async fn upload(&self, path: &Path, file_name: &str) -> Result<StoredObject, StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TranscriptionJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn submit(&self, audio_url: &str) -> Result<TranscriptionJob, TranscriptionError>;

    async fn fetch(&self, job_id: &str) -> Result<TranscriptionJob, TranscriptionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("storage configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("transcription api request failed: {0}")]
    Request(String),
    #[error("Transcription failed: {0}")]
    Failed(String),
    #[error("transcription job {job_id} still pending after {waited_secs}s")]
    TimedOut { job_id: String, waited_secs: u64 },
    #[error("transcription configuration error: {0}")]
    Config(String),
}
