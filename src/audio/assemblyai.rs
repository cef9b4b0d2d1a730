use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::audio::{TranscriptionError, TranscriptionJob, TranscriptionService};
use crate::config::TranscriptionConfig;

pub struct AssemblyAiClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl AssemblyAiClient {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, TranscriptionError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TranscriptionError::Config("transcription.api_key is required".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TranscriptionError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("authorization", &self.api_key)
    }

    async fn read_job(response: Response) -> Result<TranscriptionJob, TranscriptionError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriptionError::Request(format!("status {}: {}", status, body)));
        }

        response
            .json::<TranscriptionJob>()
            .await
            .map_err(|e| TranscriptionError::Request(format!("parse response: {}", e)))
    }
}

#[async_trait]
impl TranscriptionService for AssemblyAiClient {
    async fn submit(&self, audio_url: &str) -> Result<TranscriptionJob, TranscriptionError> {
        let url = format!("{}/transcript", self.api_url);
        debug!(%url, audio_url, "Submitting transcription job");

        let response = self
            .authorized(self.client.post(&url))
            .json(&json!({ "audio_url": audio_url }))
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        Self::read_job(response).await
    }

    async fn fetch(&self, job_id: &str) -> Result<TranscriptionJob, TranscriptionError> {
        let url = format!("{}/transcript/{}", self.api_url, job_id);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| TranscriptionError::Request(e.to_string()))?;

        Self::read_job(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn api_key_is_required() {
        let config = AppConfig::default().transcription;
        assert!(matches!(
            AssemblyAiClient::new(&config),
            Err(TranscriptionError::Config(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let mut config = AppConfig::default().transcription;
        config.api_key = Some("key".to_string());
        config.api_url = "http://localhost:9000/v2/".to_string();
        let client = AssemblyAiClient::new(&config).unwrap();
        assert_eq!(client.api_url, "http://localhost:9000/v2");
    }
}
