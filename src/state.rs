//! Shared application state and the session lifecycle sweep.

use crate::engine::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::info;

/// Default idle time before a session is evicted (1 hour).
pub const SESSION_TTL_SECS: u64 = 3600;

/// Default period of the eviction sweep.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
            session_ttl: Duration::from_secs(SESSION_TTL_SECS),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Spawn the periodic eviction of idle sessions.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let ttl = self.session_ttl;
        tokio::spawn(async move {
            let mut interval = interval(every);
            loop {
                interval.tick().await;
                let evicted = engine.sessions().evict_idle(Instant::now(), ttl).await;
                if !evicted.is_empty() {
                    info!(count = evicted.len(), "Session sweep evicted idle sessions");
                }
            }
        })
    }
}
