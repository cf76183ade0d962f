use crate::agent::{Agent, EventStream, InvocationContext};
use futures::StreamExt;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives the labeled text of an agent's final answers.
pub trait LabelSink: Send + Sync {
    fn emit(&self, label: &str, text: &str);
}

/// Prints `[label] text` on stdout.
pub struct StdoutSink;

impl LabelSink for StdoutSink {
    fn emit(&self, label: &str, text: &str) {
        println!("\n[{}] {}", label, text);
    }
}

/// Keeps every labeled answer in memory, in arrival order.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LabelSink for MemorySink {
    fn emit(&self, label: &str, text: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((label.to_string(), text.to_string()));
    }
}

/// Decorates an agent so that its own final answers are reported to a sink
/// under a label.
///
/// The decorated stream is the wrapped agent's stream, event for event. Final
/// events authored by nested children are not reported; they carry their own
/// author.
pub struct LabeledAgent {
    inner: Arc<dyn Agent>,
    label: String,
    sink: Arc<dyn LabelSink>,
}

impl LabeledAgent {
    pub fn wrap(inner: Arc<dyn Agent>, label: impl Into<String>, sink: Arc<dyn LabelSink>) -> Self {
        Self {
            inner,
            label: label.into(),
            sink,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Agent for LabeledAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        self.inner.sub_agents()
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        let author = self.inner.name().to_string();
        let label = self.label.clone();
        let sink = Arc::clone(&self.sink);

        Arc::clone(&self.inner)
            .run(ctx)
            .inspect(move |item| {
                let Ok(event) = item else {
                    return;
                };
                if !event.is_final || event.author != author {
                    return;
                }
                if let Some(text) = event.text() {
                    sink.emit(&label, &text);
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{GateAgent, SequentialAgent};
    use crate::events::{Content, Event, Part};
    use crate::session::{SessionKey, SessionStore};
    use crate::testing::{EchoAgent, FailingAgent, ReplayAgent, collect_events};

    async fn context(text: &str) -> InvocationContext {
        let session = SessionStore::new()
            .get_or_create(SessionKey::new("loop_app", "user1", "session1"))
            .await;
        InvocationContext::new(session, Content::user_text(text))
    }

    fn scripted_events() -> Vec<Event> {
        vec![
            Event::new("inv", "SampleAgent").with_content(Content::model(vec![
                Part::text("thinking"),
                Part::FunctionCall {
                    id: "c1".to_string(),
                    name: "search".to_string(),
                    args: serde_json::json!({ "q": "hipaa" }),
                },
            ])),
            Event::new("inv", "SampleAgent").with_content(Content::new(
                "user",
                vec![Part::FunctionResponse {
                    id: "c1".to_string(),
                    name: "search".to_string(),
                    response: serde_json::json!({ "hits": 3 }),
                }],
            )),
            Event::new("inv", "SampleAgent")
                .with_content(Content::model(vec![Part::text("draft "), Part::text("ready")]))
                .final_response(),
        ]
    }

    #[tokio::test]
    async fn test_passes_events_through_unchanged() {
        let expected = scripted_events();
        let inner = Arc::new(ReplayAgent::new("SampleAgent", expected.clone()));
        let sink = MemorySink::new();
        let labeled = Arc::new(LabeledAgent::wrap(inner, "Sample", Arc::new(sink.clone())));

        let events = collect_events(labeled.run(context("q").await)).await.unwrap();
        assert_eq!(events, expected);
        assert_eq!(sink.entries(), vec![("Sample".to_string(), "draft ready".to_string())]);
    }

    #[tokio::test]
    async fn test_ignores_finals_from_nested_children() {
        let seq = Arc::new(
            SequentialAgent::new(
                "workflow",
                vec![
                    Arc::new(EchoAgent::new("A")) as Arc<dyn Agent>,
                    Arc::new(EchoAgent::new("B")),
                ],
            )
            .unwrap(),
        );
        let sink = MemorySink::new();
        let labeled = Arc::new(LabeledAgent::wrap(seq, "Workflow", Arc::new(sink.clone())));

        let events = collect_events(labeled.run(context("hi").await)).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_content_free_finals_are_not_labeled() {
        let gate = Arc::new(GateAgent::sentinel("StopWhenDone", "done"));
        let sink = MemorySink::new();
        let labeled = Arc::new(LabeledAgent::wrap(gate, "Stop", Arc::new(sink.clone())));

        let events = collect_events(labeled.run(context("done").await)).await.unwrap();
        assert!(events[0].is_escalation());
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let sink = MemorySink::new();
        let labeled = Arc::new(LabeledAgent::wrap(
            Arc::new(FailingAgent::new("IngestAgent")),
            "Ingest",
            Arc::new(sink.clone()),
        ));

        assert!(collect_events(labeled.run(context("x").await)).await.is_err());
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_memory_sink_survives_poisoned_lock() {
        let sink = MemorySink::new();
        sink.emit("Sample", "before");

        let poisoner = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("writer died mid-emit");
        })
        .join();

        sink.emit("Validation", "after");
        assert_eq!(
            sink.entries(),
            vec![
                ("Sample".to_string(), "before".to_string()),
                ("Validation".to_string(), "after".to_string()),
            ]
        );
    }

    #[test]
    fn test_keeps_wrapped_identity() {
        let labeled = LabeledAgent::wrap(
            Arc::new(EchoAgent::new("ValidationAgent")),
            "Validation",
            Arc::new(StdoutSink),
        );
        assert_eq!(labeled.name(), "ValidationAgent");
        assert_eq!(labeled.label(), "Validation");
    }
}
