use crate::prompts::*;
use agentloom_sdk_rs::Result;
use agentloom_sdk_rs::agent::{Agent, GateAgent, LlmAgent, LoopAgent, SequentialAgent};
use agentloom_sdk_rs::aggregator::{LabelSink, LabeledAgent};
use agentloom_sdk_rs::config::{WorkflowConfig, WorkflowMode};
use agentloom_sdk_rs::llm::Backend;
use agentloom_sdk_rs::tools::ExitLoopTool;
use std::sync::Arc;

pub const SEQUENTIAL_WORKFLOW_NAME: &str = "SequentialRequirementWorkflow";
pub const LOOP_WORKFLOW_NAME: &str = "loop_orchestrator";

/// Builds the root agent for the configured workflow mode.
pub fn build_workflow(
    config: &WorkflowConfig,
    backend: Arc<dyn Backend>,
    sink: Arc<dyn LabelSink>,
) -> Result<Arc<dyn Agent>> {
    let root: Arc<dyn Agent> = match config.mode {
        WorkflowMode::Sequential => Arc::new(build_sequential(backend)?),
        WorkflowMode::Loop => {
            let sample = leaf("SampleAgent", SAMPLE_INSTRUCTION, None, &backend)?;
            let validation = Arc::new(
                LlmAgent::builder("ValidationAgent", Arc::clone(&backend))
                    .description("Validates the draft and ends the loop when it is correct.")
                    .instruction(format!("{}{}", VALIDATION_INSTRUCTION, VALIDATION_EXIT_SUFFIX))
                    .tool(Arc::new(ExitLoopTool))
                    .output_key("validation_result")
                    .build()?,
            );
            Arc::new(LoopAgent::new(
                LOOP_WORKFLOW_NAME,
                vec![
                    labeled(sample, "SampleAgent", &sink),
                    labeled(validation, "ValidationAgent", &sink),
                ],
                config.max_iterations,
            )?)
        }
        WorkflowMode::Gate => {
            let sample = leaf("SampleAgent", SAMPLE_INSTRUCTION, None, &backend)?;
            let validation = leaf(
                "ValidationAgent",
                VALIDATION_INSTRUCTION,
                Some("validation_result"),
                &backend,
            )?;
            Arc::new(LoopAgent::new(
                LOOP_WORKFLOW_NAME,
                vec![
                    labeled(sample, "SampleAgent", &sink),
                    labeled(validation, "ValidationAgent", &sink),
                    Arc::new(GateAgent::sentinel("StopWhenDone", config.stop_word.clone())),
                ],
                config.max_iterations,
            )?)
        }
    };
    Ok(root)
}

fn build_sequential(backend: Arc<dyn Backend>) -> Result<SequentialAgent> {
    let stages = [
        ("IngestAgent", INGEST_INSTRUCTION, "requirement"),
        ("KbAgent", KB_INSTRUCTION, "health_care_regulations"),
        ("TestCaseAgent", TEST_CASE_INSTRUCTION, "test_cases"),
        ("EdgeCaseAgent", EDGE_CASE_INSTRUCTION, "edge_cases"),
        ("ComplianceAgent", COMPLIANCE_INSTRUCTION, "compliance_report"),
    ];
    let children = stages
        .into_iter()
        .map(|(name, instruction, key)| {
            leaf(name, instruction, Some(key), &backend).map(|a| a as Arc<dyn Agent>)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SequentialAgent::new(SEQUENTIAL_WORKFLOW_NAME, children)?
        .with_description("Run ingestion first, then compliance lookup using the ingestion output."))
}

fn leaf(
    name: &str,
    instruction: &str,
    output_key: Option<&str>,
    backend: &Arc<dyn Backend>,
) -> Result<Arc<LlmAgent>> {
    let mut builder = LlmAgent::builder(name, Arc::clone(backend)).instruction(instruction);
    if let Some(key) = output_key {
        builder = builder.output_key(key);
    }
    Ok(Arc::new(builder.build()?))
}

fn labeled(agent: Arc<LlmAgent>, label: &str, sink: &Arc<dyn LabelSink>) -> Arc<dyn Agent> {
    Arc::new(LabeledAgent::wrap(agent, label, Arc::clone(sink)))
}
