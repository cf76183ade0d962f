pub mod gate;
pub mod llm_agent;
pub mod loop_agent;
pub mod sequential;
pub mod tools;

pub use gate::GateAgent;
pub use llm_agent::{LlmAgent, LlmAgentBuilder};
pub use loop_agent::LoopAgent;
pub use sequential::SequentialAgent;

use crate::error::{AgentError, Result};
use crate::events::{Content, Event};
use crate::session::SessionHandle;
use futures::Stream;
use futures::stream::BoxStream;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Lazy, ordered sequence of events produced by one agent for one turn.
///
/// Nothing runs until the stream is polled, and dropping it stops the
/// remaining agents from executing.
pub type EventStream = BoxStream<'static, Result<Event>>;

/// Pins a stream of agent events, fixing its item type for `try_stream!` bodies.
pub fn boxed<S>(stream: S) -> EventStream
where
    S: Stream<Item = Result<Event>> + Send + 'static,
{
    Box::pin(stream)
}

/// A unit of execution driven against a shared session.
///
/// Leaves talk to an external backend, composites drive their children.
/// Either way an agent only ever communicates through the events it yields and
/// the outputs it publishes to the session.
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &[]
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream;
}

/// Everything an agent sees of the turn it is running in.
#[derive(Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    pub session: SessionHandle,
    pub user_content: Content,
}

impl InvocationContext {
    pub fn new(session: SessionHandle, user_content: Content) -> Self {
        Self {
            invocation_id: format!("e-{}", Uuid::new_v4()),
            session,
            user_content,
        }
    }

    /// Text of the turn's input, empty when the input carries no text part.
    pub fn user_text(&self) -> String {
        self.user_content.text().unwrap_or_default()
    }

    pub fn event(&self, author: &str) -> Event {
        Event::new(self.invocation_id.clone(), author)
    }
}

/// Whether `agent` must end its stream with a final event under its own name.
///
/// Composites author nothing themselves; their children are held to this
/// check one level down.
pub(crate) fn owes_final_event(agent: &dyn Agent) -> bool {
    agent.sub_agents().is_empty()
}

/// Rejects agent trees where two agents share a name, since final events are
/// attributed by author.
pub fn validate_tree(root: &dyn Agent) -> Result<()> {
    fn walk<'a>(agent: &'a dyn Agent, seen: &mut HashSet<&'a str>) -> Result<()> {
        if agent.name().trim().is_empty() {
            return Err(AgentError::Structural("agent name cannot be empty".to_string()));
        }
        if !seen.insert(agent.name()) {
            return Err(AgentError::Structural(format!(
                "duplicate agent name '{}'",
                agent.name()
            )));
        }
        for child in agent.sub_agents() {
            walk(child.as_ref(), seen)?;
        }
        Ok(())
    }

    walk(root, &mut HashSet::new())
}
