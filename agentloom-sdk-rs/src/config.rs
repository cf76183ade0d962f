use crate::error::{AgentError, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// Which pipeline shape the interactive runner drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowMode {
    /// Every agent once, in order.
    Sequential,
    /// Draft and validate until the validator calls `exit_loop`.
    Loop,
    /// Draft and validate until the user types the stop word.
    Gate,
}

impl FromStr for WorkflowMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(WorkflowMode::Sequential),
            "loop" => Ok(WorkflowMode::Loop),
            "gate" => Ok(WorkflowMode::Gate),
            other => Err(AgentError::Config(format!(
                "unknown workflow mode '{}' (expected sequential, loop or gate)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub mode: WorkflowMode,
    pub max_iterations: u32,
    pub stop_word: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            app_name: "SequentialRequirementWorkflow".to_string(),
            user_id: "user1".to_string(),
            session_id: "session1".to_string(),
            mode: WorkflowMode::Sequential,
            max_iterations: 5,
            stop_word: "done".to_string(),
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Builds the config from `AGENTLOOM_*` variables, falling back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(mode) = get("AGENTLOOM_WORKFLOW") {
            config.mode = mode.parse()?;
            if config.mode != WorkflowMode::Sequential {
                config.app_name = "loop_app".to_string();
            }
        }
        if let Some(app) = get("AGENTLOOM_APP") {
            config.app_name = app;
        }
        if let Some(user) = get("AGENTLOOM_USER") {
            config.user_id = user;
        }
        if let Some(session) = get("AGENTLOOM_SESSION") {
            config.session_id = session;
        }
        if let Some(raw) = get("AGENTLOOM_MAX_ITERATIONS") {
            config.max_iterations = raw.parse::<u32>().ok().filter(|n| *n >= 1).ok_or_else(|| {
                AgentError::Config(format!(
                    "AGENTLOOM_MAX_ITERATIONS must be a positive integer, got '{}'",
                    raw
                ))
            })?;
        }
        if let Some(word) = get("AGENTLOOM_STOP_WORD") {
            config.stop_word = word;
        }
        Ok(config)
    }
}
