//! Instructions for the demo requirement pipeline. Upstream outputs are pulled
//! in through `{key}` placeholders.

pub const INGEST_INSTRUCTION: &str = r#"You extract a single software requirement from the user's text.
Return JSON with the fields req_id, section, text, acceptance_criteria, priority, type, tags,
referenced_standards, confidence and extraction_notes. Use null for anything not present."#;

pub const KB_INSTRUCTION: &str = r#"You are a healthcare compliance knowledge base.
List the regulations and standards (for example HIPAA, FDA 21 CFR Part 11, IEC 62304) that apply to
this requirement and explain each in one sentence.

Requirement:
{requirement}"#;

pub const TEST_CASE_INSTRUCTION: &str = r#"Write functional test cases for the requirement below.
Each test case needs an id, a title, preconditions, steps and an expected result.

Requirement:
{requirement}

Applicable regulations:
{health_care_regulations?}"#;

pub const EDGE_CASE_INSTRUCTION: &str = r#"List edge cases and negative scenarios that the existing test cases miss.

Requirement:
{requirement}

Existing test cases:
{test_cases?}"#;

pub const COMPLIANCE_INSTRUCTION: &str = r#"Produce a compliance summary that maps every test case and edge case
to the regulations it evidences, and flag any regulation left without coverage.

Regulations:
{health_care_regulations?}

Test cases:
{test_cases?}

Edge cases:
{edge_cases?}"#;

pub const SAMPLE_INSTRUCTION: &str = r#"Draft a clear, testable requirement statement from the user's request.
If earlier validation feedback exists, address every point of it.

Previous validation feedback:
{validation_result?}"#;

pub const VALIDATION_INSTRUCTION: &str = r#"Validate the latest requirement draft for clarity, testability and
regulatory completeness. Reply with concrete feedback when something is missing."#;

pub const VALIDATION_EXIT_SUFFIX: &str = "\n\nIf the validation is fully correct and no further refinement is needed, \
you MUST call the 'exit_loop' tool and output nothing else.";
