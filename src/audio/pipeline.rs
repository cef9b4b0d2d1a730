use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::audio::polling::PollPolicy;
use crate::audio::{
    JobStatus, ObjectStore, StorageError, TranscriptionError, TranscriptionJob, TranscriptionService,
};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to stage upload: {0}")]
    Staging(#[from] io::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

impl AudioError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AudioError::Transcription(TranscriptionError::TimedOut { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscribedAudio {
    pub audio_url: String,
    pub transcription: String,
}

/// An uploaded file spooled to the upload directory. The file is removed
/// when this value is dropped, whether or not the upload succeeded.
pub struct StagedAudio {
    file: NamedTempFile,
    writer: tokio::fs::File,
    file_name: String,
    bytes: u64,
}

impl StagedAudio {
    pub fn create(upload_dir: &Path, file_name: &str) -> io::Result<Self> {
        let file_name = sanitize_file_name(file_name);
        let suffix = Path::new(&file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let file = tempfile::Builder::new()
            .prefix("audio-")
            .suffix(&suffix)
            .tempfile_in(upload_dir)?;
        let writer = tokio::fs::File::from_std(file.as_file().try_clone()?);

        Ok(Self {
            file,
            writer,
            file_name,
            bytes: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    fn discard(self) {
        let path = self.file.path().to_path_buf();
        drop(self.writer);
        if let Err(e) = self.file.close() {
            warn!("Failed to remove staged audio {}: {}", path.display(), e);
        }
    }
}

/// Keeps the final path component and replaces anything outside
/// `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}

/// Upload → durable URL → transcription job → polled transcript.
pub struct TranscriptionPipeline {
    store: Arc<dyn ObjectStore>,
    service: Arc<dyn TranscriptionService>,
    policy: PollPolicy,
    upload_dir: PathBuf,
}

impl TranscriptionPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        service: Arc<dyn TranscriptionService>,
        policy: PollPolicy,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            service,
            policy,
            upload_dir: upload_dir.into(),
        }
    }

    pub fn stage(&self, file_name: &str) -> io::Result<StagedAudio> {
        StagedAudio::create(&self.upload_dir, file_name)
    }

    pub async fn transcribe(&self, staged: StagedAudio) -> Result<TranscribedAudio, AudioError> {
        info!(file = staged.file_name(), bytes = staged.len(), "Uploading staged audio");

        let stored = self.store.upload(staged.path(), staged.file_name()).await;
        staged.discard();
        let stored = stored?;

        let transcription = self.transcribe_url(&stored.url).await?;
        Ok(TranscribedAudio {
            audio_url: stored.url,
            transcription,
        })
    }

    /// Submits `audio_url` and polls until the job completes, fails, or the
    /// poll policy runs out.
    pub async fn transcribe_url(&self, audio_url: &str) -> Result<String, TranscriptionError> {
        let submitted = self.service.submit(audio_url).await?;
        info!(job_id = %submitted.id, "Transcription job submitted");
        self.await_transcript(&submitted.id).await
    }

    async fn await_transcript(&self, job_id: &str) -> Result<String, TranscriptionError> {
        let started = Instant::now();
        let mut delays = self.policy.schedule();

        loop {
            let job = self.service.fetch(job_id).await?;
            debug!(job_id, status = ?job.status, "Polled transcription job");

            if let Some(result) = terminal_result(job) {
                if result.is_ok() {
                    info!(job_id, elapsed_ms = started.elapsed().as_millis() as u64, "Transcription completed");
                }
                return result;
            }

            let Some(delay) = delays.next() else {
                warn!(job_id, "Transcription did not finish within the polling window");
                return Err(TranscriptionError::TimedOut {
                    job_id: job_id.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            };
            tokio::time::sleep(delay).await;
        }
    }
}

fn terminal_result(job: TranscriptionJob) -> Option<Result<String, TranscriptionError>> {
    match job.status {
        JobStatus::Completed => Some(Ok(job.text.unwrap_or_default())),
        JobStatus::Error => Some(Err(TranscriptionError::Failed(
            job.error.unwrap_or_else(|| "unknown error".to_string()),
        ))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StoredObject;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingStore {
        seen: Mutex<Option<(PathBuf, bool, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn upload(&self, path: &Path, file_name: &str) -> Result<StoredObject, StorageError> {
            let contents = std::fs::read(path).unwrap_or_default();
            *self.seen.lock().unwrap() = Some((path.to_path_buf(), path.exists(), contents));
            if self.fail {
                return Err(StorageError::UploadFailed("rejected".to_string()));
            }
            Ok(StoredObject {
                url: format!("https://cdn.test/{}", file_name),
            })
        }
    }

    /// Returns `pending` non-terminal statuses before the final one.
    struct ScriptedService {
        pending: usize,
        last: TranscriptionJob,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TranscriptionService for ScriptedService {
        async fn submit(&self, _audio_url: &str) -> Result<TranscriptionJob, TranscriptionError> {
            Ok(job("queued", None, None))
        }

        async fn fetch(&self, _job_id: &str) -> Result<TranscriptionJob, TranscriptionError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if n < self.pending {
                Ok(job("processing", None, None))
            } else {
                Ok(self.last.clone())
            }
        }
    }

    fn job(status: &str, text: Option<&str>, error: Option<&str>) -> TranscriptionJob {
        serde_json::from_value(serde_json::json!({
            "id": "job-1",
            "status": status,
            "text": text,
            "error": error,
        }))
        .unwrap()
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            initial: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            multiplier: 2.0,
            max_wait: Duration::from_millis(10),
        }
    }

    fn build(dir: &Path, store_fails: bool, service: ScriptedService) -> (TranscriptionPipeline, Arc<RecordingStore>) {
        let store = Arc::new(RecordingStore {
            seen: Mutex::new(None),
            fail: store_fails,
        });
        let pipeline = TranscriptionPipeline::new(store.clone(), Arc::new(service), fast_policy(), dir);
        (pipeline, store)
    }

    fn completes_with(text: &str, pending: usize) -> ScriptedService {
        ScriptedService {
            pending,
            last: job("completed", Some(text), None),
            fetches: AtomicUsize::new(0),
        }
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\voice memo.webm"), "voice_memo.webm");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "audio");
    }

    #[tokio::test]
    async fn transcript_is_returned_unmodified_and_staged_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = build(dir.path(), false, completes_with("  How many orders?  ", 2));

        let mut staged = pipeline.stage("memo.webm").unwrap();
        staged.write_chunk(b"RIFF....").await.unwrap();
        staged.finish().await.unwrap();

        let result = pipeline.transcribe(staged).await.unwrap();
        assert_eq!(result.audio_url, "https://cdn.test/memo.webm");
        assert_eq!(result.transcription, "  How many orders?  ");

        let (path, existed, contents) = store.seen.lock().unwrap().clone().unwrap();
        assert!(existed);
        assert_eq!(contents, b"RIFF....");
        assert!(path.extension().is_some_and(|ext| ext == "webm"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn staged_file_removed_when_upload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = build(dir.path(), true, completes_with("unused", 0));

        let mut staged = pipeline.stage("memo.wav").unwrap();
        staged.write_chunk(b"data").await.unwrap();
        staged.finish().await.unwrap();

        let err = pipeline.transcribe(staged).await.unwrap_err();
        assert!(matches!(err, AudioError::Storage(_)));
        let (path, _, _) = store.seen.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_job_reports_service_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = ScriptedService {
            pending: 1,
            last: job("error", None, Some("Audio file is empty")),
            fetches: AtomicUsize::new(0),
        };
        let (pipeline, _) = build(dir.path(), false, service);

        let err = pipeline.transcribe_url("https://cdn.test/a.wav").await.unwrap_err();
        assert_eq!(err.to_string(), "Transcription failed: Audio file is empty");
    }

    #[tokio::test]
    async fn polling_gives_up_after_max_wait() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = build(dir.path(), false, completes_with("late", usize::MAX));

        let err = pipeline.transcribe_url("https://cdn.test/a.wav").await.unwrap_err();
        assert!(matches!(err, TranscriptionError::TimedOut { ref job_id, .. } if job_id == "job-1"));
        assert!(AudioError::from(err).is_timeout());
    }
}
