use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Author used for events that carry the caller's turn input.
pub const USER_AUTHOR: &str = "user";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        id: String,
        name: String,
        args: Value,
    },
    FunctionResponse {
        id: String,
        name: String,
        response: Value,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            role: role.into(),
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new("user", vec![Part::text(text)])
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self::new("model", parts)
    }

    /// Concatenation of every text part, or `None` when there is no text part at all.
    /// Function calls and responses never contribute.
    pub fn text(&self) -> Option<String> {
        let mut texts = self.parts.iter().filter_map(Part::as_text).peekable();
        texts.peek()?;
        Some(texts.collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    /// Asks the enclosing loop to stop after the current child.
    #[serde(default)]
    pub escalate: bool,
    /// Outputs published to the session by the step that produced the event.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub state_delta: BTreeMap<String, String>,
}

impl EventActions {
    pub fn merge(&mut self, other: EventActions) {
        self.escalate |= other.escalate;
        self.state_delta.extend(other.state_delta);
    }
}

/// An immutable record produced during a turn.
///
/// Events are only ever appended to a stream; once yielded they are not
/// changed. `is_final` marks an agent's concluded answer for the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    pub author: String,
    pub content: Option<Content>,
    pub is_final: bool,
    #[serde(default)]
    pub actions: EventActions,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            content: None,
            is_final: false,
            actions: EventActions::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn final_response(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn escalating(mut self, escalate: bool) -> Self {
        self.actions.escalate = escalate;
        self
    }

    pub fn text(&self) -> Option<String> {
        self.content.as_ref().and_then(Content::text)
    }

    pub fn is_escalation(&self) -> bool {
        self.actions.escalate
    }

    pub fn function_calls(&self) -> Vec<&Part> {
        self.content
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter(|p| matches!(p, Part::FunctionCall { .. }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_skips_non_text_parts() {
        let content = Content::model(vec![
            Part::text("hello "),
            Part::FunctionCall {
                id: "c1".to_string(),
                name: "exit_loop".to_string(),
                args: serde_json::json!({}),
            },
            Part::text("world"),
        ]);
        assert_eq!(content.text().as_deref(), Some("hello world"));
    }

    #[test]
    fn test_text_absent_without_text_parts() {
        let content = Content::model(vec![Part::FunctionResponse {
            id: "c1".to_string(),
            name: "exit_loop".to_string(),
            response: serde_json::json!({}),
        }]);
        assert_eq!(content.text(), None);

        let event = Event::new("inv", "Gate").final_response();
        assert_eq!(event.text(), None);
    }

    #[test]
    fn test_actions_merge_keeps_escalation() {
        let mut actions = EventActions::default();
        actions.merge(EventActions {
            escalate: true,
            state_delta: BTreeMap::from([("k".to_string(), "v".to_string())]),
        });
        actions.merge(EventActions::default());
        assert!(actions.escalate);
        assert_eq!(actions.state_delta.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn test_event_serializes_tagged_parts() {
        let event = Event::new("inv", "Echo")
            .with_content(Content::model(vec![Part::text("hi")]))
            .final_response();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["content"]["parts"][0]["type"], "text");
        assert_eq!(json["is_final"], true);
        assert!(json["actions"].get("state_delta").is_none());
    }
}
