use super::tools::{Tool, ToolContext};
use super::{Agent, EventStream, InvocationContext, boxed};
use crate::error::{AgentError, Result};
use crate::events::{Content, EventActions, Part, USER_AUTHOR};
use crate::llm::{Backend, BackendRequest, ToolDeclaration};
use crate::session::SessionHandle;
use async_stream::try_stream;
use std::sync::Arc;

const DEFAULT_MAX_STEPS: usize = 10;

/// Leaf agent that delegates each turn to an external backend.
///
/// A turn runs a short tool loop: while the backend asks for tool calls the
/// agent yields the calls and their responses as intermediate events, and the
/// first plain answer becomes the final event. A tool that sets `escalate`
/// ends the turn right after its response event, which is then the final one.
pub struct LlmAgent {
    name: String,
    description: String,
    instruction: String,
    tools: Vec<Arc<dyn Tool>>,
    output_key: Option<String>,
    max_steps: usize,
    backend: Arc<dyn Backend>,
}

impl LlmAgent {
    pub fn builder(name: impl Into<String>, backend: Arc<dyn Backend>) -> LlmAgentBuilder {
        LlmAgentBuilder {
            name: name.into(),
            description: String::new(),
            instruction: String::new(),
            tools: Vec::new(),
            output_key: None,
            max_steps: DEFAULT_MAX_STEPS,
            backend,
        }
    }

    /// Session history as the backend should see it.
    ///
    /// The agent's own events and user input are passed as they are; text from
    /// other agents is handed over as user-side context.
    async fn history(&self, ctx: &InvocationContext) -> Vec<Content> {
        let events = ctx.session.events().await;
        let mut saw_current_input = false;
        let mut contents = Vec::with_capacity(events.len() + 1);

        for event in &events {
            let Some(content) = &event.content else {
                continue;
            };
            if event.author == USER_AUTHOR {
                saw_current_input |= event.invocation_id == ctx.invocation_id;
                contents.push(content.clone());
            } else if event.author == self.name {
                contents.push(content.clone());
            } else if let Some(text) = content.text() {
                contents.push(Content::user_text(format!(
                    "For context: [{}] said: {}",
                    event.author, text
                )));
            }
        }

        if !saw_current_input {
            contents.push(ctx.user_content.clone());
        }
        contents
    }

    async fn execute_tools(
        &self,
        calls: &[crate::llm::ToolCallRequest],
        session: &SessionHandle,
    ) -> (Vec<Part>, EventActions) {
        let mut responses = Vec::with_capacity(calls.len());
        let mut actions = EventActions::default();

        for call in calls {
            let mut tool_ctx = ToolContext::new(self.name.clone(), session.clone());
            let result = match self.tools.iter().find(|t| t.name() == call.name) {
                Some(tool) => tool.call(call.args.clone(), &mut tool_ctx).await,
                None => Err(format!("Tool {} not found", call.name)),
            };
            let response = match result {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(agent = %self.name, tool = %call.name, error = %e, "tool call failed");
                    serde_json::json!({ "error": e })
                }
            };
            actions.merge(tool_ctx.actions);
            responses.push(Part::FunctionResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response,
            });
        }

        (responses, actions)
    }
}

impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        boxed(try_stream! {
            let instruction = render_instruction(&self.instruction, &ctx.session).await;
            let declarations: Vec<ToolDeclaration> = self
                .tools
                .iter()
                .map(|t| ToolDeclaration {
                    name: t.name(),
                    description: t.description(),
                    parameters: t.parameters(),
                })
                .collect();
            let mut contents = self.history(&ctx).await;

            for step in 1..=self.max_steps {
                tracing::debug!(agent = %self.name, step, "leaf step");
                let request = BackendRequest {
                    agent_name: self.name.clone(),
                    instruction: instruction.clone(),
                    contents: contents.clone(),
                    tools: declarations.clone(),
                };
                let response = match self.backend.generate(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(agent = %self.name, error = %e, "backend call failed");
                        Err::<(), _>(AgentError::backend(self.name.clone(), e.to_string()))?;
                        return;
                    }
                };
                if response.is_empty() {
                    Err::<(), _>(AgentError::backend(
                        self.name.clone(),
                        "backend returned neither text nor tool calls",
                    ))?;
                }

                if response.tool_calls.is_empty() {
                    let mut event = ctx
                        .event(&self.name)
                        .with_content(Content::model(vec![Part::text(response.text)]))
                        .final_response();
                    if let (Some(key), Some(text)) = (&self.output_key, event.text()) {
                        ctx.session.publish(key, text.clone()).await;
                        event.actions.state_delta.insert(key.clone(), text);
                        tracing::debug!(agent = %self.name, output_key = %key, "output published");
                    }
                    yield event;
                    return;
                }

                let mut call_parts = Vec::with_capacity(response.tool_calls.len() + 1);
                if !response.text.trim().is_empty() {
                    call_parts.push(Part::text(response.text.clone()));
                }
                for call in &response.tool_calls {
                    call_parts.push(Part::FunctionCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        args: call.args.clone(),
                    });
                }
                let call_content = Content::model(call_parts);
                contents.push(call_content.clone());
                yield ctx.event(&self.name).with_content(call_content);

                let (responses, actions) = self.execute_tools(&response.tool_calls, &ctx.session).await;
                let escalated = actions.escalate;
                let response_content = Content::new(USER_AUTHOR, responses);
                contents.push(response_content.clone());

                let event = ctx
                    .event(&self.name)
                    .with_content(response_content)
                    .with_actions(actions);
                if escalated {
                    tracing::debug!(agent = %self.name, "tool escalated, ending turn");
                    yield event.final_response();
                    return;
                }
                yield event;
            }

            Err::<(), _>(AgentError::no_final_event(self.name.clone()))?;
        })
    }
}

pub struct LlmAgentBuilder {
    name: String,
    description: String,
    instruction: String,
    tools: Vec<Arc<dyn Tool>>,
    output_key: Option<String>,
    max_steps: usize,
    backend: Arc<dyn Backend>,
}

impl LlmAgentBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Upper bound on backend calls per turn.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Result<LlmAgent> {
        if self.max_steps == 0 {
            return Err(AgentError::Structural(format!(
                "agent '{}' needs max_steps >= 1",
                self.name
            )));
        }
        Ok(LlmAgent {
            name: self.name,
            description: self.description,
            instruction: self.instruction,
            tools: self.tools,
            output_key: self.output_key,
            max_steps: self.max_steps,
            backend: self.backend,
        })
    }
}

/// Replaces `{key}` and `{key?}` with values published to the session.
///
/// Missing keys render empty. Braces around anything that is not an
/// identifier are left alone.
pub async fn render_instruction(template: &str, session: &SessionHandle) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let state = session.state().await;
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if placeholder_key(&after[..end]).is_some() => {
                let raw = &after[..end];
                let key = placeholder_key(raw).unwrap_or(raw);
                match state.get(key) {
                    Some(value) => out.push_str(value),
                    None => tracing::debug!(key, "instruction placeholder has no value"),
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn placeholder_key(raw: &str) -> Option<&str> {
    let key = raw.strip_suffix('?').unwrap_or(raw);
    let starts_ok = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    (starts_ok && rest_ok).then_some(key)
}
