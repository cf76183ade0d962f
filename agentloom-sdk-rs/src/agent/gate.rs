use super::{Agent, EventStream, InvocationContext, boxed};
use async_stream::try_stream;
use std::sync::Arc;

type Predicate = dyn Fn(&str) -> bool + Send + Sync;

enum Condition {
    UserInput(Box<Predicate>),
    State { key: String, predicate: Box<Predicate> },
}

/// Decision leaf that emits one content-free event whose `escalate` flag says
/// whether the enclosing loop should stop.
pub struct GateAgent {
    name: String,
    condition: Condition,
}

impl GateAgent {
    /// Stops when the turn's input, trimmed and lowercased, equals `token`.
    pub fn sentinel(name: impl Into<String>, token: impl Into<String>) -> Self {
        let token = token.into().trim().to_lowercase();
        Self::when(name, move |input| input.trim().to_lowercase() == token)
    }

    /// Stops when `predicate` holds for the turn's raw input text.
    pub fn when<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            condition: Condition::UserInput(Box::new(predicate)),
        }
    }

    /// Stops when `predicate` holds for the value published under `key`.
    /// An absent key never stops the loop.
    pub fn when_state<F>(name: impl Into<String>, key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            condition: Condition::State {
                key: key.into(),
                predicate: Box::new(predicate),
            },
        }
    }

    async fn should_stop(&self, ctx: &InvocationContext) -> bool {
        match &self.condition {
            Condition::UserInput(predicate) => predicate(&ctx.user_text()),
            Condition::State { key, predicate } => ctx
                .session
                .read(key)
                .await
                .is_some_and(|value| predicate(&value)),
        }
    }
}

impl Agent for GateAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Signals loop termination when its stop condition holds."
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        boxed(try_stream! {
            let stop = self.should_stop(&ctx).await;
            tracing::debug!(gate = %self.name, stop, "gate evaluated");
            yield ctx.event(&self.name).escalating(stop).final_response();
        })
    }
}
