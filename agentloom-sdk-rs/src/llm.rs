use crate::events::{Content, Part};
use async_trait::async_trait;
use genai::Client;
use genai::chat::{ChatMessage, ChatRequest, ChatRole, ContentPart, ToolCall, ToolResponse};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::time::Duration;

pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// What a leaf hands its backend for one model call.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub agent_name: String,
    pub instruction: String,
    pub contents: Vec<Content>,
    pub tools: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl BackendResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_calls.is_empty()
    }
}

/// The external collaborator behind a leaf agent: a model server or tool broker.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, request: BackendRequest) -> Result<BackendResponse, BackendError>;
}

#[derive(Deserialize, Clone, Debug)]
pub struct LLMConfig {
    pub model: String,
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl LLMConfig {
    /// Reads `AGENTLOOM_MODEL` (or `GEMINI_MODEL`), `AGENTLOOM_API_KEY` and
    /// `AGENTLOOM_TIMEOUT_SECS`.
    pub fn from_env() -> crate::error::Result<Self> {
        let model = env::var("AGENTLOOM_MODEL")
            .or_else(|_| env::var("GEMINI_MODEL"))
            .map_err(|_| {
                crate::error::AgentError::Config(
                    "AGENTLOOM_MODEL (or GEMINI_MODEL) must be set".to_string(),
                )
            })?;
        let timeout_secs = match env::var("AGENTLOOM_TIMEOUT_SECS") {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                crate::error::AgentError::Config(format!(
                    "AGENTLOOM_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?),
            Err(_) => None,
        };
        Ok(Self {
            model,
            api_key: env::var("AGENTLOOM_API_KEY").ok(),
            timeout_secs,
        })
    }
}

/// `genai`-backed model client.
#[derive(Clone)]
pub struct LLM {
    pub model: String,
    pub client: Client,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl LLM {
    pub fn new(config: LLMConfig) -> Self {
        let client = Client::default();
        Self {
            model: config.model,
            client,
            api_key: config.api_key,
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    fn export_api_key(&self) {
        let Some(key) = &self.api_key else {
            return;
        };
        let var = if self.model.starts_with("gpt") {
            "OPENAI_API_KEY"
        } else if self.model.starts_with("claude") {
            "ANTHROPIC_API_KEY"
        } else if self.model.starts_with("gemini") {
            "GEMINI_API_KEY"
        } else {
            return;
        };
        if env::var(var).is_err() {
            unsafe {
                env::set_var(var, key);
            }
        }
    }

    async fn completion(&self, chat_req: ChatRequest) -> Result<BackendResponse, BackendError> {
        self.export_api_key();

        let call = self.client.exec_chat(&self.model, chat_req, None);
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| format!("model call timed out after {}s", limit.as_secs()))??,
            None => call.await?,
        };

        let text: String = output.content.texts().join("");
        let tool_calls = output
            .tool_calls()
            .into_iter()
            .map(|t| ToolCallRequest {
                id: t.call_id.clone(),
                name: t.fn_name.clone(),
                args: t.fn_arguments.clone(),
            })
            .collect();

        Ok(BackendResponse { text, tool_calls })
    }
}

#[async_trait]
impl Backend for LLM {
    async fn generate(&self, request: BackendRequest) -> Result<BackendResponse, BackendError> {
        let mut chat_req = ChatRequest::new(to_chat_messages(&request));

        let genai_tools: Vec<genai::chat::Tool> = request
            .tools
            .iter()
            .map(|t| genai::chat::Tool {
                name: t.name.clone(),
                description: Some(t.description.clone()),
                schema: Some(t.parameters.clone()),
                config: None,
            })
            .collect();
        if !genai_tools.is_empty() {
            chat_req = chat_req.with_tools(genai_tools);
        }

        tracing::debug!(
            agent = %request.agent_name,
            model = %self.model,
            messages = request.contents.len(),
            "calling model"
        );
        self.completion(chat_req).await
    }
}

/// Text and tool calls of one content become a single message; each tool
/// response becomes its own message.
fn to_chat_messages(request: &BackendRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    if !request.instruction.trim().is_empty() {
        messages.push(ChatMessage::system(request.instruction.clone()));
    }

    for content in &request.contents {
        let mut parts = vec![];
        let mut responses = vec![];
        for part in &content.parts {
            match part {
                Part::Text { text } => parts.push(ContentPart::Text(text.clone())),
                Part::FunctionCall { id, name, args } => {
                    parts.push(ContentPart::ToolCall(ToolCall {
                        call_id: id.clone(),
                        fn_name: name.clone(),
                        fn_arguments: args.clone(),
                    }))
                }
                Part::FunctionResponse { id, response, .. } => responses.push(ChatMessage::from(
                    ToolResponse::new(id.clone(), response.to_string()),
                )),
            }
        }

        if !parts.is_empty() {
            let role = if content.role == "model" {
                ChatRole::Assistant
            } else {
                ChatRole::User
            };
            messages.push(ChatMessage {
                role,
                content: parts.into(),
                options: None,
            });
        }
        messages.extend(responses);
    }

    messages
}
