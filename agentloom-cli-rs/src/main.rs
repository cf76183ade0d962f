mod pipeline;
mod prompts;

use agentloom_sdk_rs::aggregator::StdoutSink;
use agentloom_sdk_rs::config::{WorkflowConfig, WorkflowMode};
use agentloom_sdk_rs::events::Content;
use agentloom_sdk_rs::llm::{Backend, LLMConfig, LLM};
use agentloom_sdk_rs::runner::Runner;
use agentloom_sdk_rs::session::{SessionKey, SessionStore};
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    agentloom_sdk_rs::logger::init_logging();

    let config = WorkflowConfig::from_env()?;
    let backend: Arc<dyn Backend> = Arc::new(LLM::new(LLMConfig::from_env()?));
    let root = pipeline::build_workflow(&config, backend, Arc::new(StdoutSink))?;

    let store = SessionStore::new();
    store
        .create_session(SessionKey::new(
            config.app_name.clone(),
            config.user_id.clone(),
            config.session_id.clone(),
        ))
        .await?;
    let runner = Runner::new(config.app_name.clone(), root, store)?;

    tracing::info!(
        app = %runner.app_name(),
        mode = ?config.mode,
        session = %config.session_id,
        "Workflow ready"
    );
    println!("Enter your requirement text (empty line to exit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            println!("Goodbye!");
            break;
        }

        if let Err(e) = run_turn(&runner, &config, line).await {
            println!("Error while running workflow: {}", e);
        }
        println!("{}", "=".repeat(20));
    }

    Ok(())
}

/// Drives one turn. Loop and gate workflows report through the labeled sink,
/// so only the sequential pipeline prints its stage outputs here.
async fn run_turn(
    runner: &Runner,
    config: &WorkflowConfig,
    input: String,
) -> agentloom_sdk_rs::Result<()> {
    let mut events = runner.run(&config.user_id, &config.session_id, Content::user_text(input));
    while let Some(event) = events.next().await {
        let event = event?;
        if config.mode != WorkflowMode::Sequential || !event.is_final {
            continue;
        }
        if let Some(text) = event.text() {
            println!("\n----- {} -----", event.author);
            println!("{}", text);
        }
    }
    Ok(())
}
