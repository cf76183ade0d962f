use crate::agent::{Agent, EventStream, InvocationContext, boxed, validate_tree};
use crate::error::{AgentError, Result};
use crate::events::{Content, Event, USER_AUTHOR};
use crate::session::{SessionKey, SessionStore};
use async_stream::try_stream;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;

/// Drives one root agent against the session store, one turn per call.
///
/// The runner decides nothing about finality or escalation; it resolves the
/// session, records the turn input and every produced event in the session
/// history, and forwards the events in order.
pub struct Runner {
    app_name: String,
    root: Arc<dyn Agent>,
    store: SessionStore,
    auto_create_session: bool,
}

impl Runner {
    /// Fails with a structural error when the agent tree is malformed.
    pub fn new(app_name: impl Into<String>, root: Arc<dyn Agent>, store: SessionStore) -> Result<Self> {
        validate_tree(root.as_ref())?;
        Ok(Self {
            app_name: app_name.into(),
            root,
            store,
            auto_create_session: false,
        })
    }

    /// Create missing sessions on first use instead of failing the turn.
    pub fn auto_create_session(mut self, enabled: bool) -> Self {
        self.auto_create_session = enabled;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn session_key(&self, user_id: &str, session_id: &str) -> SessionKey {
        SessionKey::new(self.app_name.clone(), user_id, session_id)
    }

    /// Lazily runs one turn. Nothing executes until the stream is polled, and
    /// dropping the stream abandons the rest of the turn.
    pub fn run(&self, user_id: &str, session_id: &str, content: Content) -> EventStream {
        let key = self.session_key(user_id, session_id);
        let root = Arc::clone(&self.root);
        let store = self.store.clone();
        let auto_create = self.auto_create_session;

        boxed(try_stream! {
            let session = if auto_create {
                store.get_or_create(key.clone()).await
            } else {
                match store.get(&key).await {
                    Some(session) => session,
                    None => {
                        Err::<(), _>(AgentError::SessionNotFound(key.clone()))?;
                        return;
                    }
                }
            };

            // held until the stream finishes or is dropped
            let _turn = session.begin_turn()?;

            let ctx = InvocationContext::new(session.clone(), content);
            tracing::info!(
                session = %key,
                invocation = %ctx.invocation_id,
                agent = %root.name(),
                "turn started"
            );
            session
                .append_event(ctx.event(USER_AUTHOR).with_content(ctx.user_content.clone()))
                .await;

            let mut saw_final = false;
            let mut produced = 0usize;
            let mut events = Arc::clone(&root).run(ctx.clone());
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::error!(session = %key, error = %err, "turn failed");
                        Err::<(), _>(err)?;
                        return;
                    }
                };
                tracing::debug!(
                    author = %event.author,
                    is_final = event.is_final,
                    escalate = event.actions.escalate,
                    "event"
                );
                saw_final |= event.is_final;
                produced += 1;
                session.append_event(event.clone()).await;
                yield event;
            }

            if !saw_final {
                tracing::error!(session = %key, agent = %root.name(), "turn ended without a final event");
                Err::<(), _>(AgentError::no_final_event(root.name()))?;
            }
            tracing::info!(session = %key, events = produced, "turn completed");
        })
    }

    /// Drains one turn and summarizes it.
    pub async fn run_turn(
        &self,
        user_id: &str,
        session_id: &str,
        content: Content,
    ) -> Result<TurnOutcome> {
        let events: Vec<Event> = self.run(user_id, session_id, content).try_collect().await?;
        Ok(TurnOutcome::from_events(events))
    }
}

/// Everything one turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub events: Vec<Event>,
    /// `(author, text)` of each final event that carried text, in stream order.
    pub final_responses: Vec<(String, String)>,
}

impl TurnOutcome {
    pub fn from_events(events: Vec<Event>) -> Self {
        let final_responses = events
            .iter()
            .filter(|e| e.is_final)
            .filter_map(|e| e.text().map(|text| (e.author.clone(), text)))
            .collect();
        Self {
            events,
            final_responses,
        }
    }

    pub fn last_response(&self) -> Option<&str> {
        self.final_responses.last().map(|(_, text)| text.as_str())
    }

    pub fn escalated(&self) -> bool {
        self.events.iter().any(Event::is_escalation)
    }
}
