use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Broad operation class carried by catalog entries and action proposals.
///
/// The approval gate keys off this alone: `query` and `discover` are
/// read-only, everything else mutates state somewhere and must be held for
/// a human.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Discover,
    Query,
    Mutate,
    Execute,
    Govern,
}

impl OperationKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discover" => Some(Self::Discover),
            "query" => Some(Self::Query),
            "mutate" => Some(Self::Mutate),
            "execute" => Some(Self::Execute),
            "govern" => Some(Self::Govern),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Query => "query",
            Self::Mutate => "mutate",
            Self::Execute => "execute",
            Self::Govern => "govern",
        }
    }

    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Discover | Self::Query)
    }

    pub fn requires_approval(self) -> bool {
        !self.is_read_only()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Lenient parse for untrusted planner output. Anything unrecognized
    /// falls back to GET, the safe direction.
    pub fn parse_or_get(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "POST" => Self::Post,
            _ => Self::Get,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a proposal within one broker turn. Reads that ran are
/// `Executed`; everything else (including reads that failed) is parked as
/// `PendingApproval` for the downstream approval step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    Executed,
    PendingApproval,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::PendingApproval => "pending-approval",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single concrete unit of work the broker either executed or is handing
/// to the approval step. Only `id`, `type`, `summary`, the approval flag,
/// and `status` are guaranteed; routing fields stay empty on proposals that
/// exist purely to be shown to a human (for example the legacy change-plan
/// placeholder). Wire names follow the engine's camelCase contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionProposal {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<OperationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub summary: String,
    pub requires_approval: bool,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl ActionProposal {
    /// True when the executor may run this proposal inline: it must not be
    /// approval-gated and must look like a read (`query`/`discover` op, or
    /// a plain GET route).
    pub fn is_direct_read(&self) -> bool {
        if self.requires_approval {
            return false;
        }
        self.op.map(OperationKind::is_read_only).unwrap_or(false)
            || self.method == Some(HttpMethod::Get)
    }
}

pub fn action_id() -> String {
    format!("act-{}", Uuid::new_v4().simple())
}
