use crate::error::{AgentError, Result};
use crate::events::Event;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// One conversation: the turn history plus outputs published by agents.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub events: Vec<Event>,
    pub state: HashMap<String, String>,
    pub last_update: DateTime<Utc>,
}

impl Session {
    fn new(key: SessionKey) -> Self {
        Self {
            key,
            events: Vec::new(),
            state: HashMap::new(),
            last_update: Utc::now(),
        }
    }
}

/// Shared handle to a single session, threaded through every agent step.
#[derive(Clone)]
pub struct SessionHandle {
    key: SessionKey,
    inner: Arc<RwLock<Session>>,
    turn: Arc<Mutex<()>>,
}

impl SessionHandle {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Last writer wins: a later publish under the same key replaces the value.
    pub async fn publish(&self, output_key: &str, value: impl Into<String>) {
        let mut session = self.inner.write().await;
        session.state.insert(output_key.to_string(), value.into());
        session.last_update = Utc::now();
    }

    pub async fn read(&self, output_key: &str) -> Option<String> {
        self.inner.read().await.state.get(output_key).cloned()
    }

    pub async fn append_event(&self, event: Event) {
        let mut session = self.inner.write().await;
        session.last_update = event.timestamp;
        session.events.push(event);
    }

    pub async fn events(&self) -> Vec<Event> {
        self.inner.read().await.events.clone()
    }

    pub async fn state(&self) -> HashMap<String, String> {
        self.inner.read().await.state.clone()
    }

    /// Claims the session for one turn. The claim lasts until the guard is
    /// dropped; a second claim in the meantime fails with `TurnInProgress`.
    pub fn begin_turn(&self) -> Result<OwnedMutexGuard<()>> {
        Arc::clone(&self.turn)
            .try_lock_owned()
            .map_err(|_| AgentError::TurnInProgress(self.key.clone()))
    }
}

/// Process-wide store holding one session per (app, user, session) triple.
///
/// Sessions are never evicted; they live as long as the store does.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionKey, SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_session(&self, key: SessionKey) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            return Err(AgentError::SessionExists(key));
        }
        let handle = Self::handle_for(key.clone());
        sessions.insert(key, handle.clone());
        tracing::debug!(session = %handle.key, "session created");
        Ok(handle)
    }

    pub async fn get_or_create(&self, key: SessionKey) -> SessionHandle {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(session = %key, "session created");
                Self::handle_for(key)
            })
            .clone()
    }

    pub async fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.read().await.get(key).cloned()
    }

    pub async fn publish(
        &self,
        key: &SessionKey,
        output_key: &str,
        value: impl Into<String>,
    ) -> Result<()> {
        let handle = self
            .get(key)
            .await
            .ok_or_else(|| AgentError::SessionNotFound(key.clone()))?;
        handle.publish(output_key, value).await;
        Ok(())
    }

    /// Absent sessions and absent keys both read as `None`.
    pub async fn read(&self, key: &SessionKey, output_key: &str) -> Option<String> {
        match self.get(key).await {
            Some(handle) => handle.read(output_key).await,
            None => None,
        }
    }

    pub async fn list_sessions(&self, app_name: &str, user_id: &str) -> Vec<SessionKey> {
        let sessions = self.sessions.read().await;
        let mut keys: Vec<SessionKey> = sessions
            .keys()
            .filter(|k| k.app_name == app_name && k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        keys
    }

    fn handle_for(key: SessionKey) -> SessionHandle {
        SessionHandle {
            inner: Arc::new(RwLock::new(Session::new(key.clone()))),
            turn: Arc::new(Mutex::new(())),
            key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(session_id: &str) -> SessionKey {
        SessionKey::new("loop_app", "user1", session_id)
    }

    #[tokio::test]
    async fn test_read_unset_key_is_absent() {
        let store = SessionStore::new();
        store.create_session(key("s1")).await.unwrap();

        assert_eq!(store.read(&key("s1"), "validation_result").await, None);
        assert_eq!(store.read(&key("missing"), "validation_result").await, None);
    }

    #[tokio::test]
    async fn test_publish_overwrites_previous_value() {
        let store = SessionStore::new();
        store.create_session(key("s1")).await.unwrap();

        store.publish(&key("s1"), "edge_cases", "first").await.unwrap();
        store.publish(&key("s1"), "edge_cases", "second").await.unwrap();

        assert_eq!(
            store.read(&key("s1"), "edge_cases").await.as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_publish_requires_session() {
        let store = SessionStore::new();
        let err = store.publish(&key("nope"), "x", "y").await.unwrap_err();
        assert_eq!(err, AgentError::SessionNotFound(key("nope")));
    }

    #[tokio::test]
    async fn test_create_session_rejects_duplicates() {
        let store = SessionStore::new();
        store.create_session(key("s1")).await.unwrap();
        let err = store.create_session(key("s1")).await.err().unwrap();
        assert_eq!(err, AgentError::SessionExists(key("s1")));
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_session() {
        let store = SessionStore::new();
        let first = store.get_or_create(key("s1")).await;
        first.publish("k", "v").await;

        let second = store.get_or_create(key("s1")).await;
        assert_eq!(second.read("k").await.as_deref(), Some("v"));
        assert_eq!(store.list_sessions("loop_app", "user1").await, vec![key("s1")]);
    }

    #[tokio::test]
    async fn test_turn_claim_is_exclusive_until_released() {
        let store = SessionStore::new();
        let handle = store.create_session(key("s1")).await.unwrap();
        let other = store.get(&key("s1")).await.unwrap();

        let claim = handle.begin_turn().unwrap();
        assert_eq!(
            other.begin_turn().err(),
            Some(AgentError::TurnInProgress(key("s1")))
        );
        assert!(store.get_or_create(key("s2")).await.begin_turn().is_ok());

        drop(claim);
        assert!(other.begin_turn().is_ok());
    }

    #[tokio::test]
    async fn test_append_event_keeps_order() {
        let store = SessionStore::new();
        let handle = store.get_or_create(key("s1")).await;
        handle.append_event(Event::new("inv", "a")).await;
        handle.append_event(Event::new("inv", "b")).await;

        let authors: Vec<String> = handle.events().await.into_iter().map(|e| e.author).collect();
        assert_eq!(authors, vec!["a", "b"]);
    }
}
