use serde_json::Value;

use crate::catalog::ActionCatalog;
use crate::chat::{tail, ChatMessage};
use crate::intent::Topic;

/// How many prior turns the planner sees. Older turns add cost without
/// improving action selection.
pub const PLANNER_HISTORY_TURNS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlannerMode {
    Respond,
    Actions,
}

/// One raw action candidate exactly as the model emitted it. Every field is
/// untrusted; the normalizer decides what survives. Note the absence of an
/// approval flag: whatever the model claimed is recomputed, never read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlannedAction {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub op: Option<String>,
    pub target: Option<String>,
    pub summary: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub payload: Option<Value>,
}

impl PlannedAction {
    fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id: text("id"),
            kind: text("type"),
            op: text("op"),
            target: text("target"),
            summary: text("summary"),
            endpoint: text("endpoint"),
            method: text("method"),
            payload: map.get("payload").cloned(),
        })
    }
}

/// The planner's verdict for one turn: answer in prose, or hand a set of
/// raw action candidates to the normalizer.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannerDecision {
    pub mode: PlannerMode,
    pub response: String,
    pub actions: Vec<PlannedAction>,
}

/// Parses the planner's reply. Strict JSON is tried first; if the model
/// wrapped the JSON in prose or a code fence, one retry parses the window
/// from the first `{` to the last `}`. Anything else is `None` and the
/// caller falls through to the next strategy.
pub fn parse_planner_decision(text: &str) -> Option<PlannerDecision> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(decision) = try_parse_json(trimmed) {
        return Some(decision);
    }

    let first = trimmed.find('{')?;
    let last = trimmed.rfind('}')?;
    if last > first {
        tracing::debug!(event_name = "planner_decision_reparse", "retrying with brace window");
        return try_parse_json(&trimmed[first..=last]);
    }
    None
}

fn try_parse_json(text: &str) -> Option<PlannerDecision> {
    let value: Value = serde_json::from_str(text).ok()?;
    let map = value.as_object()?;

    let mode = match map.get("mode").and_then(Value::as_str) {
        Some("respond") => PlannerMode::Respond,
        Some("actions") => PlannerMode::Actions,
        _ => return None,
    };
    let response = map.get("response").and_then(Value::as_str).unwrap_or_default().to_string();
    let actions = map
        .get("actions")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(PlannedAction::from_value).collect())
        .unwrap_or_default();

    Some(PlannerDecision { mode, response, actions })
}

const PLANNER_DECISION_SCHEMA: &str = r#"{"mode":"respond|actions","response":"string","actions":[{"id":"string","type":"string","op":"discover|query|mutate|execute|govern","target":"string","summary":"string","requiresApproval":true|false,"endpoint":"/path","method":"GET|POST","payload":{}}]}"#;

/// System prompt for the single planner call. `capabilities` is the
/// best-effort live capability snapshot, already serialized; `None` leaves
/// the slot blank.
pub fn build_planner_system_prompt(
    catalog: &ActionCatalog,
    topic: Topic,
    namespace: &str,
    capabilities: Option<&str>,
) -> String {
    [
        "You are the Trestle action planner.".to_string(),
        "Decide whether to respond conversationally or output executable action proposals."
            .to_string(),
        "Return ONLY JSON. No markdown, no prose outside JSON.".to_string(),
        "JSON schema:".to_string(),
        PLANNER_DECISION_SCHEMA.to_string(),
        "Rules:".to_string(),
        "- Use actions only when the user asks for real environment operations.".to_string(),
        "- For read-only queries, prefer actions with op=query or op=discover and a concrete target."
            .to_string(),
        "- For mutating/deployment actions, requiresApproval=true.".to_string(),
        "- Do NOT ask for extra confirmation for read-only actions; execute via action broker immediately."
            .to_string(),
        "- Prefer generic op+target actions. Endpoint/method are optional compatibility fields."
            .to_string(),
        format!("Intent: {topic}"),
        format!("Namespace: {namespace}"),
        capabilities.map(|json| format!("Capabilities: {json}")).unwrap_or_default(),
        format!("Action catalog: {}", catalog.planner_digest()),
    ]
    .join("\n")
}

/// User prompt: the request itself plus a short replay of recent turns.
pub fn build_planner_user_prompt(message: &str, history: &[ChatMessage]) -> String {
    let recent = tail(history, PLANNER_HISTORY_TURNS)
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str().to_uppercase(), turn.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut sections = vec![format!("User request: {message}")];
    if !recent.is_empty() {
        sections.push(format!("Recent conversation:\n{recent}"));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        build_planner_system_prompt, build_planner_user_prompt, parse_planner_decision, PlannerMode,
    };
    use crate::catalog::ActionCatalog;
    use crate::chat::ChatMessage;
    use crate::intent::Topic;

    #[test]
    fn strict_json_decisions_parse() {
        let decision = parse_planner_decision(
            r#"{"mode":"actions","actions":[{"type":"production_status"}]}"#,
        )
        .unwrap();

        assert_eq!(decision.mode, PlannerMode::Actions);
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.actions[0].kind.as_deref(), Some("production_status"));
        assert_eq!(decision.response, "");
    }

    #[test]
    fn fenced_json_is_recovered_from_the_brace_window() {
        let reply = "Sure, here is the plan:\n```json\n{\"mode\":\"respond\",\"response\":\"All quiet.\"}\n```";
        let decision = parse_planner_decision(reply).unwrap();
        assert_eq!(decision.mode, PlannerMode::Respond);
        assert_eq!(decision.response, "All quiet.");
    }

    #[test]
    fn non_string_response_fields_are_coerced_to_empty() {
        let decision = parse_planner_decision(r#"{"mode":"respond","response":42}"#).unwrap();
        assert_eq!(decision.response, "");
    }

    #[test]
    fn malformed_action_entries_are_skipped() {
        let decision = parse_planner_decision(
            r#"{"mode":"actions","actions":["garbage",{"type":"queue_counts"}]}"#,
        )
        .unwrap();
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.actions[0].kind.as_deref(), Some("queue_counts"));
    }

    #[test]
    fn unusable_planner_replies_yield_none() {
        assert!(parse_planner_decision("").is_none());
        assert!(parse_planner_decision("   ").is_none());
        assert!(parse_planner_decision("I would check the queues first.").is_none());
        assert!(parse_planner_decision(r#"{"mode":"chat"}"#).is_none());
        assert!(parse_planner_decision("prose { not json } prose").is_none());
    }

    #[test]
    fn system_prompt_carries_topic_namespace_and_catalog() {
        let catalog = ActionCatalog::builtin();
        let prompt = build_planner_system_prompt(&catalog, Topic::Monitor, "PROD", None);

        assert!(prompt.contains("Return ONLY JSON."));
        assert!(prompt.contains("Intent: monitor"));
        assert!(prompt.contains("Namespace: PROD"));
        assert!(prompt.contains("\"type\":\"production_status\""));
        assert!(!prompt.contains("Capabilities:"));
    }

    #[test]
    fn system_prompt_includes_capabilities_when_available() {
        let catalog = ActionCatalog::builtin();
        let prompt = build_planner_system_prompt(
            &catalog,
            Topic::General,
            "DEV",
            Some(r#"[{"capability":"production/status","allowed":true}]"#),
        );
        assert!(prompt.contains("Capabilities: [{\"capability\":\"production/status\""));
    }

    #[test]
    fn user_prompt_replays_only_recent_history() {
        let history: Vec<ChatMessage> = (0..12)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("question {i}"))
                } else {
                    ChatMessage::assistant(format!("answer {i}"))
                }
            })
            .collect();

        let prompt = build_planner_user_prompt("what changed?", &history);
        assert!(prompt.starts_with("User request: what changed?"));
        assert!(prompt.contains("Recent conversation:\nUSER: question 4"));
        assert!(!prompt.contains("question 2"));
        assert!(prompt.contains("ASSISTANT: answer 11"));
    }

    #[test]
    fn user_prompt_without_history_is_just_the_request() {
        let prompt = build_planner_user_prompt("hello", &[]);
        assert_eq!(prompt, "User request: hello");
    }

    #[test]
    fn planner_payloads_survive_parsing() {
        let decision = parse_planner_decision(
            r#"{"mode":"actions","actions":[{"type":"sql_read","payload":{"args":{"query":"SELECT 1"}}}]}"#,
        )
        .unwrap();
        assert_eq!(
            decision.actions[0].payload,
            Some(json!({ "args": { "query": "SELECT 1" } }))
        );
    }
}
