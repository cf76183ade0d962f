use thiserror::Error;

use crate::session::SessionKey;

/// Errors surfaced by agents, the session store and the runner.
///
/// A turn either completes with a full event stream or ends with exactly one of
/// these; the session that produced it stays usable for the next turn.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// The external backend of a leaf agent failed, timed out or answered with
    /// something that could not be turned into an event.
    #[error("backend error in agent '{agent}': {message}")]
    Backend { agent: String, message: String },

    /// An agent finished its stream without a final event for its own name.
    #[error("agent '{agent}' completed without a final response")]
    NoFinalEvent { agent: String },

    /// The agent graph is malformed; raised before any turn executes.
    #[error("invalid agent graph: {0}")]
    Structural(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionKey),

    #[error("session already exists: {0}")]
    SessionExists(SessionKey),

    /// Another turn is still running against this session.
    #[error("a turn is already in progress for session {0}")]
    TurnInProgress(SessionKey),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn backend(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            agent: agent.into(),
            message: message.into(),
        }
    }

    pub fn no_final_event(agent: impl Into<String>) -> Self {
        Self::NoFinalEvent {
            agent: agent.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
