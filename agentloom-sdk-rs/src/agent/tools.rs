use crate::events::EventActions;
use crate::session::SessionHandle;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

pub const EXIT_LOOP_TOOL_NAME: &str = "exit_loop";

/// State a tool can touch while it runs inside a leaf agent.
///
/// Anything written to `actions` is attached to the event that carries the
/// tool's response, which is how a tool asks the enclosing loop to stop.
pub struct ToolContext {
    pub agent_name: String,
    pub session: SessionHandle,
    pub actions: EventActions,
}

impl ToolContext {
    pub fn new(agent_name: impl Into<String>, session: SessionHandle) -> Self {
        Self {
            agent_name: agent_name.into(),
            session,
            actions: EventActions::default(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> String;
    fn description(&self) -> String;
    fn parameters(&self) -> Value; // JSON Schema
    async fn call(&self, args: Value, ctx: &mut ToolContext) -> Result<Value, String>;
}

/// Zero-argument capability that terminates the enclosing loop.
///
/// Any agent that declares it can end the loop, not only a dedicated gate.
pub struct ExitLoopTool;

#[async_trait]
impl Tool for ExitLoopTool {
    fn name(&self) -> String {
        EXIT_LOOP_TOOL_NAME.to_string()
    }

    fn description(&self) -> String {
        "Call this function only when the work is complete and no further refinement is needed; it ends the loop."
            .to_string()
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn call(&self, _args: Value, ctx: &mut ToolContext) -> Result<Value, String> {
        tracing::info!(agent = %ctx.agent_name, "exit_loop triggered");
        ctx.actions.escalate = true;
        Ok(serde_json::json!({}))
    }
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;
type ToolHandler = dyn Fn(Value, &mut ToolContext) -> ToolFuture + Send + Sync;

/// A tool backed by a closure, for capabilities that do not need their own type.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Box<ToolHandler>,
}

impl FunctionTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, &mut ToolContext) -> ToolFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
            handler: Box::new(handler),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext) -> Result<Value, String> {
        (self.handler)(args, ctx).await
    }
}
