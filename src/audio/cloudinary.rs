use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::audio::{ObjectStore, StorageError, StoredObject};
use crate::config::StorageConfig;

/// Signed uploads to Cloudinary with `resource_type` detection left to the
/// service (`/auto/upload`). Uploaded objects are never deleted.
pub struct CloudinaryStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_secret: String,
    folder: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StorageError::Config(format!("storage.{} is required", name)))
        };

        let cloud_name = required(&config.cloud_name, "cloud_name")?;
        let api_key = required(&config.api_key, "api_key")?;
        let api_secret = required(&config.api_secret, "api_secret")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/auto/upload",
                config.api_url.trim_end_matches('/'),
                cloud_name
            ),
            api_key,
            api_secret,
            folder: config.folder.clone().filter(|f| !f.is_empty()),
        })
    }

    fn signature(&self, timestamp: i64) -> String {
        sign_params(&self.signed_params(timestamp), &self.api_secret)
    }

    fn signed_params(&self, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut params = vec![("timestamp", timestamp.to_string())];
        if let Some(folder) = &self.folder {
            params.push(("folder", folder.clone()));
        }
        params
    }
}

/// `sha256("a=1&b=2" + secret)` over the parameters sorted by name.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!("{:x}", Sha256::digest(format!("{}{}", joined, api_secret).as_bytes()))
}

#[async_trait]
impl ObjectStore for CloudinaryStore {
    async fn upload(&self, path: &Path, file_name: &str) -> Result<StoredObject, StorageError> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();

        // Streamed from disk, never buffered whole
        let file_part = multipart::Part::stream_with_length(reqwest::Body::from(file), size)
            .file_name(file_name.to_string())
            .mime_str(mime.as_ref())
            .map_err(|e| StorageError::UploadFailed(format!("mime: {}", e)))?;

        let timestamp = chrono::Utc::now().timestamp();
        let mut form = multipart::Form::new()
            .part("file", file_part)
            .text("api_key", self.api_key.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", self.signature(timestamp));
        for (name, value) in self.signed_params(timestamp) {
            form = form.text(name, value);
        }

        debug!(endpoint = %self.endpoint, bytes = size, "Uploading audio to Cloudinary");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(StorageError::UploadFailed(format!("status {}: {}", status, message)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("parse response: {}", e)))?;

        info!(url = %uploaded.secure_url, bytes = size, "Audio stored");
        Ok(StoredObject {
            url: uploaded.secure_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn signature_sorts_parameters() {
        let a = sign_params(
            &[("timestamp", "1700000000".to_string()), ("folder", "voice".to_string())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "voice".to_string()), ("timestamp", "1700000000".to_string())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_depends_on_secret() {
        let params = [("timestamp", "1".to_string())];
        assert_ne!(sign_params(&params, "a"), sign_params(&params, "b"));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let config = AppConfig::default().storage;
        assert!(matches!(CloudinaryStore::new(&config), Err(StorageError::Config(_))));
    }
}
