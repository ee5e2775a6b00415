use serde_json::Value;

use crate::intent::Topic;

/// Base system prompt for the conversational path. Topic fragments and live
/// context are appended per request; nothing here is environment-specific.
pub const BASE_PROMPT: &str = r"You are Trestle, an assistant for integration engine lifecycle work.

You are connected to a live integration engine. Users interact via chat to build, modify, monitor, test, and govern integrations using natural language.

Work generically for the current namespace and production context discovered at runtime.
Do not assume any specific customer/site, production name, host naming convention, or integration topology unless explicitly provided by live API data in this session.

For generated classes, use a neutral default prefix:
Trestle.Generated.<Domain>.<ComponentType>.<Name>

Respond in the user's language and be precise about message field paths, engine APIs, and execution/approval boundaries.";

const NEW_INTEGRATION_PROMPT: &str = r"

## Mode: New Integration Design

The user wants to create a new integration. Follow this workflow:

1. **Understand the requirement**: what system sends what message to what target?
2. **Ask clarifying questions**: message formats and fields, ports, business rules, error handling
3. **Design the topology**: which components are needed (service/process/operation/router/transform/lookup table)?
4. **Show how it connects**: map to existing production hosts
5. **Generate code**: produce complete, compilable class definitions

When you are ready to generate code, output COMPLETE class definitions.
Each class should be a full, compilable definition starting with 'Class' and ending with '}'.
Use the Trestle.Generated.<Domain>.* naming convention.";

const MODIFY_INTEGRATION_PROMPT: &str = r"

## Mode: Modify Existing Integration

The user wants to change an existing integration. Follow this workflow:
1. Identify which existing components need modification
2. Explain what will change and what stays the same
3. Generate the modified class with only the necessary changes
4. Note any production configuration changes needed";

const MONITOR_PROMPT: &str = r"

## Mode: Monitor / Status Check

The user wants to check system health. Provide information about:
- Production status (running/stopped/troubled)
- Message queue depths
- Error counts and recent errors
- Specific host health
Suggest remedial actions for any issues found.";

const EXPLAIN_PROMPT: &str = r"

## Mode: Explain

The user wants to understand existing code or configuration.
Provide clear, non-technical explanations when possible.
Reference specific class names, host names, and message field paths.";

const TEST_PROMPT: &str = r"

## Mode: Testing

The user wants to test an integration. Help with:
- Generating unit test classes
- Creating synthetic test messages
- Interpreting test results
- Suggesting test scenarios";

const ROLLBACK_PROMPT: &str = r"

## Mode: Rollback

The user wants to undo a previous deployment. Guide them through:
- Which version to roll back to
- What classes will be restored/removed
- Impact on the running production";

fn topic_fragment(topic: Topic) -> &'static str {
    match topic {
        Topic::NewIntegration => NEW_INTEGRATION_PROMPT,
        Topic::ModifyIntegration => MODIFY_INTEGRATION_PROMPT,
        Topic::Monitor => MONITOR_PROMPT,
        Topic::Explain => EXPLAIN_PROMPT,
        Topic::Test => TEST_PROMPT,
        Topic::Rollback => ROLLBACK_PROMPT,
        Topic::General => "",
    }
}

/// System prompt for the plain conversational turn: base text, the topic's
/// mode fragment, then whatever live context is available.
pub fn build_chat_system_prompt(
    topic: Topic,
    production_status: Option<&Value>,
    namespace: &str,
) -> String {
    let mut prompt = String::from(BASE_PROMPT);
    prompt.push_str(topic_fragment(topic));
    if let Some(status) = production_status {
        let pretty = serde_json::to_string_pretty(status).unwrap_or_default();
        prompt.push_str(&format!("\n\n## Current Production Status\n{pretty}"));
    }
    prompt.push_str(&format!("\n\n## Current Namespace: {namespace}"));
    prompt
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::build_chat_system_prompt;
    use crate::intent::Topic;

    #[test]
    fn general_topic_appends_only_the_namespace() {
        let prompt = build_chat_system_prompt(Topic::General, None, "PROD");
        assert!(prompt.starts_with("You are Trestle"));
        assert!(!prompt.contains("## Mode:"));
        assert!(prompt.ends_with("## Current Namespace: PROD"));
    }

    #[test]
    fn topic_fragments_are_included() {
        let prompt = build_chat_system_prompt(Topic::NewIntegration, None, "DEV");
        assert!(prompt.contains("## Mode: New Integration Design"));
        assert!(prompt.contains("Trestle.Generated.<Domain>.*"));
    }

    #[test]
    fn production_status_is_embedded_as_json() {
        let status = json!({ "status": "Running" });
        let prompt = build_chat_system_prompt(Topic::Monitor, Some(&status), "PROD");
        assert!(prompt.contains("## Current Production Status"));
        assert!(prompt.contains("\"status\": \"Running\""));
        assert!(prompt.contains("## Mode: Monitor / Status Check"));
    }
}
