//! Deterministic agents and backends shared by the unit tests.

use crate::agent::{Agent, EventStream, InvocationContext, boxed};
use crate::error::{AgentError, Result};
use crate::events::{Content, Event, Part};
use crate::llm::{Backend, BackendError, BackendRequest, BackendResponse, ToolCallRequest};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub async fn collect_events(stream: EventStream) -> Result<Vec<Event>> {
    stream.try_collect().await
}

/// Answers with a fixed script of responses and records every request.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<std::result::Result<BackendResponse, String>>>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<std::result::Result<BackendResponse, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn call(tool: &str) -> BackendResponse {
        BackendResponse {
            text: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: format!("call-{}", tool),
                name: tool.to_string(),
                args: serde_json::json!({}),
            }],
        }
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(
        &self,
        request: BackendRequest,
    ) -> std::result::Result<BackendResponse, BackendError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(message.into()),
            None => Err("script exhausted".into()),
        }
    }
}

/// Echoes the turn input as its final answer, optionally publishing it.
pub struct EchoAgent {
    name: String,
    output_key: Option<String>,
    runs: AtomicUsize,
}

impl EchoAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            output_key: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn publishing(mut self, key: &str) -> Self {
        self.output_key = Some(key.to_string());
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        boxed(try_stream! {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let text = ctx.user_text();
            if let Some(key) = &self.output_key {
                ctx.session.publish(key, text.clone()).await;
            }
            yield ctx
                .event(&self.name)
                .with_content(Content::model(vec![Part::text(text)]))
                .final_response();
        })
    }
}

/// Records what it reads from the session under `key` on every run.
pub struct ReadingAgent {
    name: String,
    key: String,
    observed: Mutex<Vec<Option<String>>>,
}

impl ReadingAgent {
    pub fn new(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            observed: Mutex::new(Vec::new()),
        }
    }

    pub fn observed(&self) -> Vec<Option<String>> {
        self.observed.lock().unwrap().clone()
    }
}

impl Agent for ReadingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        boxed(try_stream! {
            let value = ctx.session.read(&self.key).await;
            self.observed.lock().unwrap().push(value);
            yield ctx.event(&self.name).final_response();
        })
    }
}

/// Fails like a leaf whose backend rejected the input.
pub struct FailingAgent {
    name: String,
}

impl FailingAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Agent for FailingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, _ctx: InvocationContext) -> EventStream {
        boxed(futures::stream::iter([Err(AgentError::backend(
            self.name.clone(),
            "malformed input",
        ))]))
    }
}

/// Escalates on its `nth` run (1-based) and answers normally otherwise.
pub struct EscalateOnRun {
    name: String,
    nth: usize,
    runs: AtomicUsize,
}

impl EscalateOnRun {
    pub fn new(name: &str, nth: usize) -> Self {
        Self {
            name: name.to_string(),
            nth,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl Agent for EscalateOnRun {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        boxed(try_stream! {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            yield ctx
                .event(&self.name)
                .with_content(Content::model(vec![Part::text(format!("run {}", run))]))
                .escalating(run == self.nth)
                .final_response();
        })
    }
}

/// Speaks without ever producing a final event of its own.
pub struct SilentAgent {
    name: String,
}

impl SilentAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Agent for SilentAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        boxed(try_stream! {
            yield ctx
                .event(&self.name)
                .with_content(Content::model(vec![Part::text("still thinking")]));
        })
    }
}

/// Yields a fixed list of events, unchanged, on every run.
pub struct ReplayAgent {
    name: String,
    events: Vec<Event>,
}

impl ReplayAgent {
    pub fn new(name: &str, events: Vec<Event>) -> Self {
        Self {
            name: name.to_string(),
            events,
        }
    }
}

impl Agent for ReplayAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, _ctx: InvocationContext) -> EventStream {
        boxed(futures::stream::iter(self.events.clone().into_iter().map(Ok)))
    }
}
