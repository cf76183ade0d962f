use super::{Agent, EventStream, InvocationContext, boxed, owes_final_event};
use crate::error::{AgentError, Result};
use async_stream::try_stream;
use futures::StreamExt;
use std::sync::Arc;

/// Runs its children once each, strictly in order.
///
/// Escalation is ignored here; only a loop acts on it. The first child error
/// ends the invocation and the remaining children never start, and so does a
/// leaf child that finishes without a final event of its own.
pub struct SequentialAgent {
    name: String,
    description: String,
    children: Vec<Arc<dyn Agent>>,
}

impl SequentialAgent {
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Agent>>) -> Result<Self> {
        let name = name.into();
        if children.is_empty() {
            return Err(AgentError::Structural(format!(
                "sequential agent '{}' has no children",
                name
            )));
        }
        Ok(Self {
            name,
            description: String::new(),
            children,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Agent for SequentialAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.children
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        boxed(try_stream! {
            for (index, child) in self.children.iter().enumerate() {
                tracing::debug!(agent = %self.name, child = %child.name(), index, "running child");
                let mut answered = !owes_final_event(child.as_ref());
                let mut events = Arc::clone(child).run(ctx.clone());
                while let Some(event) = events.next().await {
                    let event = event?;
                    answered |= event.is_final && event.author == child.name();
                    yield event;
                }
                if !answered {
                    tracing::error!(agent = %self.name, child = %child.name(), "child ended without a final event");
                    Err::<(), _>(AgentError::no_final_event(child.name()))?;
                }
            }
        })
    }
}
