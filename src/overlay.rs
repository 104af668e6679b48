//! Per-session copy-on-write views of canonical grids.

use crate::catalog::GridCatalog;
use crate::error::EngineError;
use crate::grid::{Cell, Grid, Point};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::info;

/// A caller-scoped set of grid overlays, one per map it has mutated.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    overlays: HashMap<String, Arc<Grid>>,
    pub created_at: Instant,
    pub last_accessed: Instant,
    /// Set by eviction under the session lock. A caller that fetched the
    /// entry before it was removed sees this and must not write into it.
    retired: bool,
}

impl Session {
    fn new(id: &str) -> Self {
        let now = Instant::now();
        Self {
            id: id.to_string(),
            overlays: HashMap::new(),
            created_at: now,
            last_accessed: now,
            retired: false,
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    fn info(&self, now: Instant) -> SessionInfo {
        let mut maps: Vec<String> = self.overlays.keys().cloned().collect();
        maps.sort();
        SessionInfo {
            id: self.id.clone(),
            maps,
            age_secs: now.saturating_duration_since(self.created_at).as_secs(),
            idle_secs: now.saturating_duration_since(self.last_accessed).as_secs(),
        }
    }
}

/// Read-only view of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub maps: Vec<String>,
    pub age_secs: u64,
    pub idle_secs: u64,
}

type SessionEntry = Arc<Mutex<Session>>;

/// Session map over a shared canonical catalog.
///
/// The outer lock only guards membership; each session has its own mutex, so
/// operations on different sessions never wait on each other.
pub struct SessionOverlayStore {
    catalog: Arc<GridCatalog>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionOverlayStore {
    pub fn new(catalog: Arc<GridCatalog>) -> Self {
        Self {
            catalog,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &GridCatalog {
        &self.catalog
    }

    async fn entry(&self, id: &str) -> Option<SessionEntry> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn entry_or_create(&self, id: &str) -> SessionEntry {
        if let Some(entry) = self.entry(id).await {
            return entry;
        }
        self.sessions
            .write()
            .await
            .entry(id.to_string())
            .or_insert_with(|| {
                info!("Created session: {}", id);
                Arc::new(Mutex::new(Session::new(id)))
            })
            .clone()
    }

    /// Register an empty session. Returns false if it already existed.
    pub async fn create(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return false;
        }
        sessions.insert(id.to_string(), Arc::new(Mutex::new(Session::new(id))));
        info!("Created session: {}", id);
        true
    }

    pub async fn get(&self, id: &str) -> Result<SessionInfo, EngineError> {
        let entry = self.entry(id).await.ok_or_else(|| invalid_session(id))?;
        let session = entry.lock().await;
        if session.retired {
            return Err(invalid_session(id));
        }
        Ok(session.info(Instant::now()))
    }

    pub async fn touch(&self, id: &str) -> Result<(), EngineError> {
        let entry = self.entry(id).await.ok_or_else(|| invalid_session(id))?;
        let mut session = entry.lock().await;
        if session.retired {
            return Err(invalid_session(id));
        }
        session.touch();
        Ok(())
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let entries: Vec<SessionEntry> = self.sessions.read().await.values().cloned().collect();
        let now = Instant::now();
        let mut list = Vec::with_capacity(entries.len());
        for entry in entries {
            let session = entry.lock().await;
            if !session.retired {
                list.push(session.info(now));
            }
        }
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// The grid a session currently sees for `map`.
    ///
    /// Falls back to the canonical grid when there is no session or the
    /// session has not mutated this map. No copy is made on this path.
    pub async fn resolve(&self, map: &str, session: Option<&str>) -> Result<Arc<Grid>, EngineError> {
        let canonical = self.catalog.get(map)?;
        let Some(id) = session else {
            return Ok(canonical);
        };
        let Some(entry) = self.entry(id).await else {
            return Ok(canonical);
        };

        let mut session = entry.lock().await;
        if session.retired {
            return Ok(canonical);
        }
        session.touch();
        Ok(session.overlays.get(map).cloned().unwrap_or(canonical))
    }

    /// Mark `point` blocked in the session's overlay of `map`.
    ///
    /// The first block for a `(map, session)` pair copies the canonical grid.
    /// Snapshots handed out earlier by [`resolve`](Self::resolve) keep their
    /// contents: the overlay is cloned again if one is still alive.
    pub async fn block(&self, map: &str, session_id: &str, point: Point) -> Result<Arc<Grid>, EngineError> {
        let canonical = self.catalog.get(map)?;
        if !canonical.in_bounds(point) {
            return Err(EngineError::OutOfBounds {
                point,
                width: canonical.width(),
                height: canonical.height(),
            });
        }

        loop {
            let entry = self.entry_or_create(session_id).await;
            let mut session = entry.lock().await;
            if session.retired {
                // Evicted between lookup and lock; start over with a fresh entry.
                continue;
            }

            let overlay = session
                .overlays
                .entry(map.to_string())
                .or_insert_with(|| {
                    info!(session = session_id, map, "Copying canonical grid into overlay");
                    Arc::new(Grid::clone(&canonical))
                });
            if overlay.get(point) != Some(Cell::Blocked) {
                Arc::make_mut(overlay).set(point, Cell::Blocked);
            }
            let grid = Arc::clone(overlay);
            session.touch();
            return Ok(grid);
        }
    }

    /// Remove one session immediately.
    pub async fn evict(&self, id: &str) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get(id).cloned().ok_or_else(|| invalid_session(id))?;
        entry.lock().await.retired = true;
        sessions.remove(id);
        info!("Deleted session: {}", id);
        Ok(())
    }

    /// Remove every session idle for longer than `ttl` as of `now`.
    pub async fn evict_idle(&self, now: Instant, ttl: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write().await;

        let mut expired = Vec::new();
        for (id, entry) in sessions.iter() {
            let mut session = entry.lock().await;
            if now.saturating_duration_since(session.last_accessed) > ttl {
                session.retired = true;
                expired.push(id.clone());
            }
        }

        for id in &expired {
            sessions.remove(id);
            info!("Cleaning up expired session: {}", id);
        }
        expired
    }

    /// Drop all sessions.
    pub async fn reset(&self) {
        let mut sessions = self.sessions.write().await;
        for entry in sessions.values() {
            entry.lock().await.retired = true;
        }
        sessions.clear();
    }
}

fn invalid_session(id: &str) -> EngineError {
    EngineError::InvalidSession { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionOverlayStore {
        let catalog = GridCatalog::new([
            ("Office".to_string(), Grid::new(5, 5)),
            ("Hall".to_string(), Grid::new(3, 3)),
        ]);
        SessionOverlayStore::new(Arc::new(catalog))
    }

    #[tokio::test]
    async fn block_is_isolated_from_canonical() {
        let store = store();
        let p = Point::new(2, 2);
        let grid = store.block("Office", "s1", p).await.unwrap();
        assert_eq!(grid.get(p), Some(Cell::Blocked));

        let session = store.resolve("Office", Some("s1")).await.unwrap();
        assert_eq!(session.get(p), Some(Cell::Blocked));

        let canonical = store.resolve("Office", None).await.unwrap();
        assert_eq!(canonical.get(p), Some(Cell::Walkable));
        assert_eq!(store.catalog().get("Office").unwrap().get(p), Some(Cell::Walkable));
    }

    #[tokio::test]
    async fn sessions_do_not_see_each_other() {
        let store = store();
        store.block("Office", "a", Point::new(0, 0)).await.unwrap();
        store.block("Office", "b", Point::new(1, 1)).await.unwrap();

        let a = store.resolve("Office", Some("a")).await.unwrap();
        let b = store.resolve("Office", Some("b")).await.unwrap();
        assert!(!a.is_walkable(Point::new(0, 0)));
        assert!(a.is_walkable(Point::new(1, 1)));
        assert!(b.is_walkable(Point::new(0, 0)));
        assert!(!b.is_walkable(Point::new(1, 1)));
    }

    #[tokio::test]
    async fn overlays_are_per_map() {
        let store = store();
        store.block("Office", "s1", Point::new(1, 1)).await.unwrap();

        // Same session, other map: still canonical
        let hall = store.resolve("Hall", Some("s1")).await.unwrap();
        assert!(hall.is_walkable(Point::new(1, 1)));
        assert_eq!(store.get("s1").await.unwrap().maps, vec!["Office"]);
    }

    #[tokio::test]
    async fn repeated_blocks_accumulate_and_are_idempotent() {
        let store = store();
        store.block("Office", "s1", Point::new(0, 1)).await.unwrap();
        store.block("Office", "s1", Point::new(0, 2)).await.unwrap();
        let grid = store.block("Office", "s1", Point::new(0, 2)).await.unwrap();
        let blocked = grid.cells().iter().filter(|c| **c == Cell::Blocked).count();
        assert_eq!(blocked, 2);
    }

    #[tokio::test]
    async fn snapshot_survives_later_block() {
        let store = store();
        store.block("Office", "s1", Point::new(0, 0)).await.unwrap();
        let snapshot = store.resolve("Office", Some("s1")).await.unwrap();

        store.block("Office", "s1", Point::new(4, 4)).await.unwrap();
        assert!(snapshot.is_walkable(Point::new(4, 4)));

        let fresh = store.resolve("Office", Some("s1")).await.unwrap();
        assert!(!fresh.is_walkable(Point::new(4, 4)));
        assert!(!fresh.is_walkable(Point::new(0, 0)));
    }

    #[tokio::test]
    async fn block_rejects_bad_input() {
        let store = store();
        assert!(matches!(
            store.block("Nowhere", "s1", Point::new(0, 0)).await,
            Err(EngineError::UnknownMap { .. })
        ));
        assert!(matches!(
            store.block("Office", "s1", Point::new(5, 0)).await,
            Err(EngineError::OutOfBounds { .. })
        ));
        assert!(matches!(
            store.block("Office", "s1", Point::new(0, -1)).await,
            Err(EngineError::OutOfBounds { .. })
        ));
        // Failed mutations create nothing
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn resolve_unknown_session_reads_canonical() {
        let store = store();
        let grid = store.resolve("Office", Some("ghost")).await.unwrap();
        assert!(Arc::ptr_eq(&grid, &store.catalog().get("Office").unwrap()));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_and_reads_fall_back() {
        let store = store();
        store.block("Office", "old", Point::new(2, 2)).await.unwrap();

        let ttl = Duration::from_secs(60);
        let later = Instant::now() + Duration::from_secs(120);
        let evicted = store.evict_idle(later, ttl).await;
        assert_eq!(evicted, vec!["old".to_string()]);

        let grid = store.resolve("Office", Some("old")).await.unwrap();
        assert!(grid.is_walkable(Point::new(2, 2)));
        assert!(matches!(
            store.get("old").await,
            Err(EngineError::InvalidSession { .. })
        ));
    }

    #[tokio::test]
    async fn recently_touched_sessions_survive_sweep() {
        let store = store();
        store.block("Office", "busy", Point::new(2, 2)).await.unwrap();
        store.resolve("Office", Some("busy")).await.unwrap();

        let evicted = store
            .evict_idle(Instant::now(), Duration::from_secs(60))
            .await;
        assert!(evicted.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn lifecycle_operations() {
        let store = store();
        assert!(store.create("s1").await);
        assert!(!store.create("s1").await);
        store.touch("s1").await.unwrap();
        assert_eq!(store.list().await.len(), 1);

        store.evict("s1").await.unwrap();
        assert!(matches!(
            store.evict("s1").await,
            Err(EngineError::InvalidSession { .. })
        ));
        assert!(matches!(
            store.touch("s1").await,
            Err(EngineError::InvalidSession { .. })
        ));

        store.block("Office", "a", Point::new(0, 0)).await.unwrap();
        store.block("Office", "b", Point::new(0, 0)).await.unwrap();
        store.reset().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn block_waiting_on_an_evicted_session_recreates_it() {
        let store = Arc::new(store());
        assert!(store.create("s1").await);
        let old = store.entry("s1").await.unwrap();
        let mut guard = old.lock().await;

        let task = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.block("Office", "s1", Point::new(1, 1)).await })
        };
        // Map, this test and the waiting block each hold the entry
        while Arc::strong_count(&old) < 3 {
            tokio::task::yield_now().await;
        }

        // Evict the way the sweep does, while block is parked on the lock
        guard.retired = true;
        store.sessions.write().await.remove("s1");
        drop(guard);

        let grid = task.await.unwrap().unwrap();
        assert_eq!(grid.get(Point::new(1, 1)), Some(Cell::Blocked));
        assert!(old.lock().await.overlays.is_empty());

        let fresh = store.entry("s1").await.unwrap();
        assert!(!Arc::ptr_eq(&fresh, &old));
        assert_eq!(store.get("s1").await.unwrap().maps, vec!["Office"]);
        let seen = store.resolve("Office", Some("s1")).await.unwrap();
        assert!(!seen.is_walkable(Point::new(1, 1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_blocks_on_one_session_are_not_lost() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for x in 0..5 {
            for y in 0..5 {
                let store = Arc::clone(&store);
                handles.push(tokio::spawn(async move {
                    store.block("Office", "shared", Point::new(x, y)).await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let grid = store.resolve("Office", Some("shared")).await.unwrap();
        assert!(grid.cells().iter().all(|c| *c == Cell::Blocked));
    }
}
