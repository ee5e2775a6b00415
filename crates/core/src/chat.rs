use serde::{Deserialize, Serialize};

use crate::action::ActionProposal;
use crate::artifacts::Generation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One prior conversation turn, as replayed to the planner and chat models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
}

/// Last `limit` turns of a history, oldest first.
pub fn tail(history: &[ChatMessage], limit: usize) -> &[ChatMessage] {
    &history[history.len().saturating_sub(limit)..]
}

/// Which broker sub-path produced a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplySource {
    DirectActionBroker,
    ModelActionBroker,
    PlainChat,
    GeneratedCode,
}

impl ReplySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectActionBroker => "direct-action-broker",
            Self::ModelActionBroker => "model-action-broker",
            Self::PlainChat => "plain-chat",
            Self::GeneratedCode => "generated-code",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    DirectRead,
    ApprovalRequired,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectRead => "direct-read",
            Self::ApprovalRequired => "approval-required",
        }
    }
}

/// How many proposals actually ran this turn, and whether anything is still
/// waiting on approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub mode: ExecutionMode,
    pub executed_count: usize,
}

/// Final product of one broker turn: the reply text, which sub-path built
/// it, every proposal with its settled status, and any class definitions
/// extracted from model prose.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerResponse {
    pub reply: String,
    pub source: ReplySource,
    /// Backend model that contributed to this reply, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionProposal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
}

impl BrokerResponse {
    pub fn plain(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            source: ReplySource::PlainChat,
            model: None,
            actions: Vec::new(),
            execution: None,
            generation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{tail, BrokerResponse, ChatMessage, ChatRole};

    #[test]
    fn tail_keeps_the_most_recent_turns() {
        let history: Vec<ChatMessage> =
            (0..10).map(|i| ChatMessage::user(format!("turn {i}"))).collect();

        let recent = tail(&history, 8);
        assert_eq!(recent.len(), 8);
        assert_eq!(recent[0].content, "turn 2");
        assert_eq!(recent[7].content, "turn 9");
    }

    #[test]
    fn tail_of_a_short_history_is_the_whole_history() {
        let history = vec![ChatMessage::user("only")];
        assert_eq!(tail(&history, 8).len(), 1);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let message = ChatMessage { role: ChatRole::Assistant, content: "hi".to_string() };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
    }

    #[test]
    fn plain_responses_serialize_without_empty_sections() {
        let response = BrokerResponse::plain("hello");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["reply"], "hello");
        assert_eq!(value["source"], "plain-chat");
        assert!(value.get("model").is_none());
        assert!(value.get("actions").is_none());
        assert!(value.get("execution").is_none());
        assert!(value.get("generation").is_none());
    }
}
