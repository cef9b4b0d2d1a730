use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::audio::pipeline::TranscriptionPipeline;
use crate::config::AppConfig;
use crate::db::DbConfig;
use crate::query::QueryPipeline;

/// Session used when a request carries no `X-Session-Id` header.
pub const DEFAULT_SESSION: &str = "default";

struct SessionSlot {
    config: DbConfig,
    saved_at: Instant,
}

/// Saved DB configs keyed by session id.
///
/// Bounded two ways: slots expire `ttl` after their last write, and once
/// `capacity` live slots exist the least recently saved one is evicted.
pub struct SessionStore {
    slots: RwLock<HashMap<String, SessionSlot>>,
    capacity: usize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Replaces whatever the session had saved before.
    pub async fn save(&self, session: &str, config: DbConfig) {
        let now = Instant::now();
        let mut slots = self.slots.write().await;

        slots.retain(|_, slot| now.duration_since(slot.saved_at) < self.ttl);

        if !slots.contains_key(session) && slots.len() >= self.capacity {
            let oldest = slots
                .iter()
                .min_by_key(|(_, slot)| slot.saved_at)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                debug!(session = %id, "Evicting saved DB config");
                slots.remove(&id);
            }
        }

        slots.insert(
            session.to_string(),
            SessionSlot {
                config,
                saved_at: now,
            },
        );
    }

    pub async fn get(&self, session: &str) -> Option<DbConfig> {
        let slots = self.slots.read().await;
        slots
            .get(session)
            .filter(|slot| slot.saved_at.elapsed() < self.ttl)
            .map(|slot| slot.config.clone())
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub queries: QueryPipeline,
    pub transcription: TranscriptionPipeline,
    sessions: SessionStore,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, queries: QueryPipeline, transcription: TranscriptionPipeline) -> Self {
        let sessions = SessionStore::new(config.web.max_sessions, config.web.session_ttl());
        Self {
            config,
            queries,
            transcription,
            sessions,
            startup_time: chrono::Utc::now(),
        }
    }

    pub async fn save_db_config(&self, session: &str, config: DbConfig) {
        info!(session, host = config.host(), database = config.database(), "Saved DB config");
        self.sessions.save(session, config).await;
    }

    pub async fn db_config(&self, session: &str) -> Option<DbConfig> {
        self.sessions.get(session).await
    }
}
