use super::{Agent, EventStream, InvocationContext, boxed, owes_final_event};
use crate::error::{AgentError, Result};
use async_stream::try_stream;
use futures::StreamExt;
use std::sync::Arc;

/// Where a loop invocation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running { iteration: u32, child: usize },
    Terminated(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Escalated { iteration: u32, child: usize },
    MaxIterations,
}

impl LoopState {
    /// Transition taken once the child at the current position has been fully
    /// drained. `escalated` tells whether any of its events asked to stop.
    pub fn advance(self, escalated: bool, children: usize, max_iterations: u32) -> LoopState {
        match self {
            LoopState::Idle => LoopState::Running {
                iteration: 1,
                child: 0,
            },
            LoopState::Running { iteration, child } if escalated => {
                LoopState::Terminated(Termination::Escalated { iteration, child })
            }
            LoopState::Running { iteration, child } if child + 1 < children => {
                LoopState::Running {
                    iteration,
                    child: child + 1,
                }
            }
            LoopState::Running { iteration, .. } if iteration >= max_iterations => {
                LoopState::Terminated(Termination::MaxIterations)
            }
            LoopState::Running { iteration, .. } => LoopState::Running {
                iteration: iteration + 1,
                child: 0,
            },
            done @ LoopState::Terminated(_) => done,
        }
    }
}

/// Re-runs its children in order until one of them escalates or
/// `max_iterations` full passes have completed.
///
/// Session state is never reset between passes, so each pass sees what the
/// previous ones published. The iteration cap always holds, even when nothing
/// ever escalates.
pub struct LoopAgent {
    name: String,
    description: String,
    children: Vec<Arc<dyn Agent>>,
    max_iterations: u32,
}

impl LoopAgent {
    pub fn new(
        name: impl Into<String>,
        children: Vec<Arc<dyn Agent>>,
        max_iterations: u32,
    ) -> Result<Self> {
        let name = name.into();
        if max_iterations < 1 {
            return Err(AgentError::Structural(format!(
                "loop agent '{}' needs max_iterations >= 1",
                name
            )));
        }
        if children.is_empty() {
            return Err(AgentError::Structural(format!(
                "loop agent '{}' has no children",
                name
            )));
        }
        Ok(Self {
            name,
            description: String::new(),
            children,
            max_iterations,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Agent for LoopAgent {
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
            let children = self.children.len();
            let mut state = LoopState::Idle.advance(false, children, self.max_iterations);

            while let LoopState::Running { iteration, child } = state {
                let agent = Arc::clone(&self.children[child]);
                tracing::debug!(
                    agent = %self.name,
                    iteration,
                    child = %agent.name(),
                    "running loop child"
                );

                let mut escalated = false;
                let mut answered = !owes_final_event(agent.as_ref());
                let mut events = Arc::clone(&agent).run(ctx.clone());
                while let Some(event) = events.next().await {
                    let event = event?;
                    escalated |= event.is_escalation();
                    answered |= event.is_final && event.author == agent.name();
                    yield event;
                }
                if !answered {
                    tracing::error!(agent = %self.name, iteration, child = %agent.name(), "child ended without a final event");
                    Err::<(), _>(AgentError::no_final_event(agent.name()))?;
                }

                state = state.advance(escalated, children, self.max_iterations);
            }

            tracing::debug!(agent = %self.name, ?state, "loop terminated");
        })
    }
}
