use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::Session;

/// Keeps conversation sessions between turns.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> anyhow::Result<Option<Session>>;
    fn put(&self, session: &Session) -> anyhow::Result<()>;
    /// Drops sessions idle for longer than `idle`, returning how many went away.
    fn expire(&self, idle: Duration) -> anyhow::Result<usize>;
    fn count(&self) -> anyhow::Result<usize>;
}

/// Process-local store bounded to `max_sessions`; the least recently active
/// session is evicted to make room.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_sessions: usize,
}

impl InMemorySessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("session store mutex poisoned"))
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> anyhow::Result<Option<Session>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn put(&self, session: &Session) -> anyhow::Result<()> {
        let mut sessions = self.lock()?;
        if !sessions.contains_key(&session.id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .values()
                .min_by_key(|s| s.last_activity)
                .map(|s| s.id.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                tracing::info!(session = %oldest, "evicted least recently active session");
            }
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn expire(&self, idle: Duration) -> anyhow::Result<usize> {
        let cutoff = Utc::now().naive_utc() - idle;
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity > cutoff);
        Ok(before - sessions.len())
    }

    fn count(&self) -> anyhow::Result<usize> {
        Ok(self.lock()?.len())
    }
}

/// Store over the `sessions` table. Each write pushes `expires_at` forward by
/// the idle timeout.
pub struct SqliteSessionStore {
    db: Arc<Mutex<Connection>>,
    idle: Duration,
}

impl SqliteSessionStore {
    pub fn new(db: Arc<Mutex<Connection>>, idle: Duration) -> Self {
        Self { db, idle }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let conn = self
            .db
            .lock()
            .map_err(|_| anyhow::anyhow!("database mutex poisoned"))?;
        f(&*conn)
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, id: &str) -> anyhow::Result<Option<Session>> {
        self.with_conn(|conn| queries::get_session(conn, id))
    }

    fn put(&self, session: &Session) -> anyhow::Result<()> {
        let expires_at = session.last_activity + self.idle;
        self.with_conn(|conn| queries::save_session(conn, session, &expires_at))
    }

    // Rows carry their own deadline, set from the idle timeout at write time.
    fn expire(&self, _idle: Duration) -> anyhow::Result<usize> {
        self.with_conn(queries::expire_sessions)
    }

    fn count(&self) -> anyhow::Result<usize> {
        self.with_conn(queries::count_sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn session_active_minutes_ago(id: &str, minutes: i64) -> Session {
        let mut session = Session::new(id, "GREETING");
        session.last_activity = Utc::now().naive_utc() - Duration::minutes(minutes);
        session
    }

    #[test]
    fn test_in_memory_evicts_least_recently_active() {
        let store = InMemorySessionStore::new(2);
        store.put(&session_active_minutes_ago("a", 10)).unwrap();
        store.put(&session_active_minutes_ago("b", 1)).unwrap();
        store.put(&session_active_minutes_ago("c", 0)).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_some());

        // Updating an existing session never evicts.
        store.put(&session_active_minutes_ago("b", 0)).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_in_memory_expire_idle() {
        let store = InMemorySessionStore::new(10);
        store.put(&session_active_minutes_ago("old", 120)).unwrap();
        store.put(&session_active_minutes_ago("fresh", 5)).unwrap();

        assert_eq!(store.expire(Duration::minutes(60)).unwrap(), 1);
        assert!(store.get("old").unwrap().is_none());
        assert!(store.get("fresh").unwrap().is_some());
    }

    #[test]
    fn test_sqlite_store_roundtrip_and_expiry() {
        let db = Arc::new(Mutex::new(init_db(":memory:").unwrap()));
        let store = SqliteSessionStore::new(db, Duration::minutes(60));

        let mut session = session_active_minutes_ago("s1", 0);
        session.current_state = "GET_CPF".to_string();
        store.put(&session).unwrap();
        store.put(&session_active_minutes_ago("s2", 90)).unwrap();

        let loaded = store.get("s1").unwrap().unwrap();
        assert_eq!(loaded.current_state, "GET_CPF");
        assert!(store.get("s2").unwrap().is_none());

        assert_eq!(store.expire(Duration::minutes(60)).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}
