//! In-memory store for analysis results and webcam sessions.
//!
//! The store is owned by whoever builds the provider and is shared through
//! an `Arc`. Nothing is persisted: contents live until `clear()` or process
//! exit.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::model::{AnalysisResult, MediaType, WebcamAnalysisResult};

/// A stored analysis: either still being processed or finished.
#[derive(Debug, Clone)]
pub enum StoredAnalysis {
    Pending {
        media_type: MediaType,
        submitted_at: DateTime<Utc>,
    },
    Ready(AnalysisResult),
}

/// Most webcam sessions tracked at once. Beyond this the least recently
/// seen session is forgotten.
pub const MAX_SESSIONS: usize = 1024;

/// Per-session bookkeeping for webcam analysis.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub frames_analyzed: u64,
    pub last_result: Option<WebcamAnalysisResult>,
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub total_analyses: usize,
    pub media_type_counts: BTreeMap<MediaType, usize>,
    pub deepfake_count: usize,
    pub active_webcam_sessions: usize,
}

pub struct ResultStore {
    results: RwLock<HashMap<String, StoredAnalysis>>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    max_sessions: usize,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::with_session_capacity(MAX_SESSIONS)
    }
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that tracks at most `max_sessions` webcam sessions.
    pub fn with_session_capacity(max_sessions: usize) -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Register an id whose result is still being produced.
    pub async fn mark_pending(&self, id: &str, media_type: MediaType) {
        let mut results = self.results.write().await;
        results.insert(
            id.to_string(),
            StoredAnalysis::Pending {
                media_type,
                submitted_at: Utc::now(),
            },
        );
    }

    /// Store a finished result, replacing any pending marker for its id.
    pub async fn insert(&self, result: AnalysisResult) {
        debug!(id = %result.id, media_type = %result.media_type, "storing analysis result");
        let mut results = self.results.write().await;
        results.insert(result.id.clone(), StoredAnalysis::Ready(result));
    }

    pub async fn get(&self, id: &str) -> Option<StoredAnalysis> {
        self.results.read().await.get(id).cloned()
    }

    /// Finished result for `id`, ignoring pending entries.
    pub async fn get_ready(&self, id: &str) -> Option<AnalysisResult> {
        match self.get(id).await {
            Some(StoredAnalysis::Ready(result)) => Some(result),
            _ => None,
        }
    }

    /// Remove an entry. Returns false when the id was unknown.
    pub async fn remove(&self, id: &str) -> bool {
        self.results.write().await.remove(id).is_some()
    }

    /// Finished results, newest first, optionally filtered by media type.
    pub async fn list(&self, media_type: Option<MediaType>, limit: usize) -> Vec<AnalysisResult> {
        let results = self.results.read().await;
        let mut ready: Vec<AnalysisResult> = results
            .values()
            .filter_map(|entry| match entry {
                StoredAnalysis::Ready(r) => Some(r),
                StoredAnalysis::Pending { .. } => None,
            })
            .filter(|r| media_type.map_or(true, |m| r.media_type == m))
            .cloned()
            .collect();
        ready.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        ready.truncate(limit);
        ready
    }

    pub async fn stats(&self) -> StoreStats {
        let results = self.results.read().await;
        let mut stats = StoreStats {
            total_analyses: results.len(),
            ..StoreStats::default()
        };
        for entry in results.values() {
            if let StoredAnalysis::Ready(r) = entry {
                *stats.media_type_counts.entry(r.media_type).or_default() += 1;
                if r.is_deepfake {
                    stats.deepfake_count += 1;
                }
            }
        }
        stats.active_webcam_sessions = self.sessions.read().await.len();
        stats
    }

    /// Count one more analyzed frame for `session_id`, creating the session
    /// on first use. Returns the new frame count.
    pub async fn next_frame(&self, session_id: &str) -> u64 {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .values()
                .min_by_key(|r| r.last_seen)
                .map(|r| r.session_id.clone());
            if let Some(oldest) = oldest {
                debug!(session = %oldest, "evicting least recently seen webcam session");
                sessions.remove(&oldest);
            }
        }
        let record = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord {
                session_id: session_id.to_string(),
                created_at: now,
                last_seen: now,
                frames_analyzed: 0,
                last_result: None,
            });
        record.last_seen = now;
        record.frames_analyzed += 1;
        record.frames_analyzed
    }

    /// Remember the latest result produced for a session.
    pub async fn record_frame_result(&self, result: &WebcamAnalysisResult) {
        let mut sessions = self.sessions.write().await;
        if let Some(record) = sessions.get_mut(&result.session_id) {
            record.last_result = Some(result.clone());
        }
    }

    pub async fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Drop every result and session.
    pub async fn clear(&self) {
        self.results.write().await.clear();
        self.sessions.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result(id: &str, media_type: MediaType, is_deepfake: bool, age_secs: i64) -> AnalysisResult {
        AnalysisResult {
            id: id.to_string(),
            media_type,
            timestamp: Utc::now() - Duration::seconds(age_secs),
            is_deepfake,
            confidence: 0.9,
            details: Default::default(),
            areas: Vec::new(),
            processing_time: 1.0,
        }
    }

    #[tokio::test]
    async fn test_pending_then_ready() {
        let store = ResultStore::new();
        store.mark_pending("image-1-a", MediaType::Image).await;
        assert!(matches!(store.get("image-1-a").await, Some(StoredAnalysis::Pending { .. })));
        assert!(store.get_ready("image-1-a").await.is_none());

        store.insert(result("image-1-a", MediaType::Image, false, 0)).await;
        assert!(store.get_ready("image-1-a").await.is_some());
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = ResultStore::new();
        store.insert(result("image-old", MediaType::Image, false, 30)).await;
        store.insert(result("image-new", MediaType::Image, true, 1)).await;
        store.insert(result("audio-x", MediaType::Audio, false, 5)).await;
        store.mark_pending("video-p", MediaType::Video).await;

        let images = store.list(Some(MediaType::Image), 10).await;
        let ids: Vec<_> = images.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["image-new", "image-old"]);

        assert_eq!(store.list(None, 2).await.len(), 2);
        assert_eq!(store.list(None, 10).await.len(), 3);
    }

    #[tokio::test]
    async fn test_stats_and_remove() {
        let store = ResultStore::new();
        store.insert(result("image-a", MediaType::Image, true, 0)).await;
        store.insert(result("video-b", MediaType::Video, false, 0)).await;
        store.next_frame("session-1").await;

        let stats = store.stats().await;
        assert_eq!(stats.total_analyses, 2);
        assert_eq!(stats.deepfake_count, 1);
        assert_eq!(stats.media_type_counts.get(&MediaType::Video), Some(&1));
        assert_eq!(stats.active_webcam_sessions, 1);

        assert!(store.remove("image-a").await);
        assert!(!store.remove("image-a").await);

        store.clear().await;
        assert_eq!(store.stats().await, StoreStats::default());
    }

    #[tokio::test]
    async fn test_session_frame_counter() {
        let store = ResultStore::new();
        assert_eq!(store.next_frame("s").await, 1);
        assert_eq!(store.next_frame("s").await, 2);
        assert_eq!(store.next_frame("other").await, 1);
        assert_eq!(store.session("s").await.map(|r| r.frames_analyzed), Some(2));
    }

    #[tokio::test]
    async fn test_session_map_is_bounded() {
        let store = ResultStore::with_session_capacity(2);
        store.next_frame("first").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.next_frame("second").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.next_frame("first").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(store.next_frame("third").await, 1);
        assert_eq!(store.stats().await.active_webcam_sessions, 2);
        assert!(store.session("second").await.is_none());
        assert_eq!(store.session("first").await.map(|r| r.frames_analyzed), Some(2));
    }
}
