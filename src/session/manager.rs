//! Interactive Session Manager: registry and lifecycle control
//!
//! Thin delegation over the per-session operations, plus the two eviction
//! paths: explicit close and idle cleanup. Unknown ids answer with a
//! not-found sentinel (`false` / empty / `None`), never a panic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::{InteractiveSession, SessionStatus, SessionType};
use crate::config::SessionConfig;

/// Registry and lifecycle controller for multiple concurrent sessions.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<InteractiveSession>>>,
    counter: AtomicU64,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager with default session timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Create a manager with custom session timeouts.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            config,
        }
    }

    /// Register a new (unstarted) session and return its identifier.
    ///
    /// The type is auto-detected from the command text unless supplied.
    /// Identifiers are monotonic and never reused, also after eviction.
    pub fn create(&self, command: &str, session_type: Option<SessionType>) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("interactive_{n}");
        let session_type = session_type.unwrap_or_else(|| SessionType::detect(command));

        let session = Arc::new(InteractiveSession::new(
            id.clone(),
            command,
            session_type,
            self.config.clone(),
        ));
        self.lock_sessions().insert(id.clone(), session);
        info!(id = %id, %session_type, command, "created session");
        id
    }

    /// Start a session. `false` for unknown ids or failed connects.
    pub async fn start(&self, id: &str) -> bool {
        match self.get(id) {
            Some(session) => session.start().await,
            None => false,
        }
    }

    /// Send one input line to a session.
    pub async fn send(&self, id: &str, text: &str) -> bool {
        match self.get(id) {
            Some(session) => session.send_input(text).await,
            None => false,
        }
    }

    /// Poll a session's stdout for up to `timeout`.
    pub async fn output(&self, id: &str, timeout: Duration) -> Vec<String> {
        match self.get(id) {
            Some(session) => session.get_output(timeout).await,
            None => Vec::new(),
        }
    }

    /// Status snapshot for one session.
    pub fn status(&self, id: &str) -> Option<SessionStatus> {
        self.get(id).map(|session| session.status())
    }

    /// Status snapshots for every registered session.
    pub fn list(&self) -> Vec<SessionStatus> {
        self.lock_sessions()
            .values()
            .map(|session| session.status())
            .collect()
    }

    /// Close a session and remove it from the registry.
    pub async fn close(&self, id: &str) -> bool {
        let Some(session) = self.lock_sessions().remove(id) else {
            return false;
        };
        session.close().await
    }

    /// Close and evict every session.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.lock_sessions().drain().collect();
        for (_, session) in drained {
            session.close().await;
        }
    }

    /// Close and evict every session idle for longer than `threshold`,
    /// returning how many were evicted.
    pub async fn cleanup_idle(&self, threshold: Duration) -> usize {
        let threshold_secs = threshold.as_secs() as i64;
        let now = Utc::now();
        let stale: Vec<Arc<InteractiveSession>> = {
            let mut sessions = self.lock_sessions();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| (now - s.last_activity()).num_seconds() > threshold_secs)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let evicted = stale.len();
        for session in stale {
            debug!(id = session.id(), "evicting idle session");
            session.close().await;
        }
        if evicted > 0 {
            info!(evicted, "idle session cleanup");
        }
        evicted
    }

    fn get(&self, id: &str) -> Option<Arc<InteractiveSession>> {
        self.lock_sessions().get(id).cloned()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<InteractiveSession>>> {
        self.sessions.lock().expect("session registry lock poisoned")
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
