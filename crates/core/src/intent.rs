use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::action::{action_id, ActionProposal, ActionStatus, HttpMethod, OperationKind};

/// Coarse conversation topic. Shapes the chat system prompt only; it never
/// gates execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    NewIntegration,
    ModifyIntegration,
    Monitor,
    Explain,
    Test,
    Rollback,
    General,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewIntegration => "new_integration",
            Self::ModifyIntegration => "modify_integration",
            Self::Monitor => "monitor",
            Self::Explain => "explain",
            Self::Test => "test",
            Self::Rollback => "rollback",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First matching rule wins; rollback outranks monitor outranks explain and
/// so on down to the catch-all.
pub fn classify_topic(message: &str) -> Topic {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if has(&["roll back", "rollback", "undo", "revert"]) {
        return Topic::Rollback;
    }
    if has(&["status", "running", "error", "queue", "how is", "how are", "health"]) {
        return Topic::Monitor;
    }
    if has(&["explain", "what does", "how does", "show me", "describe"]) {
        return Topic::Explain;
    }
    if has(&["test", "run test", "unit test", "validate"]) {
        return Topic::Test;
    }
    if has(&["change", "modify", "update", "add to", "remove from", "edit", "also send"]) {
        return Topic::ModifyIntegration;
    }
    if has(&[
        "need",
        "create",
        "build",
        "set up",
        "receive",
        "forward",
        "integrate",
        "connect",
        "new",
        "implement",
        "feed",
        "adt",
        "oru",
        "rde",
    ]) {
        return Topic::NewIntegration;
    }

    Topic::General
}

/// A deterministically parsed action plus whether the user asked for a
/// non-committal dry run. Dry-run phrasing is honored for the host-mutation
/// patterns only.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectAction {
    pub action: ActionProposal,
    pub dry_run: bool,
}

static DRY_RUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdry[- ]run(?:\s+only)?\b|\bplan only\b|\bpreview\b").unwrap());
static LOOKUP_TABLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blookup table\s+([A-Za-z0-9_.-]+)").unwrap());
static READ_VERB_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(show|get|list)\b").unwrap());
static LOOKUP_NOUN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(content|entries|values|table)\b").unwrap());
static METADATA_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bmetadata\b").unwrap());
static CLASS_META_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:class\s+metadata\s+for|metadata\s+for\s+class|metadata\s+for|class)\s+([A-Za-z0-9_.%]+)",
    )
    .unwrap()
});
static INVOKE_POLICY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(invoke policy|invocation policy)\b").unwrap());
static LIST_CLASSES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blist classes\b|\bshow classes\b|\bclass list\b").unwrap());
static CLASS_PATTERN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|under|from)\s+(?:the\s+)?([A-Za-z0-9_.%*]+)\s*(?:packages?)?").unwrap()
});
static HOST_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:named|called)\s+([A-Za-z0-9_.-]+)").unwrap());
static ADD_HOST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\badd\b.*\bbusiness host\b").unwrap());
static REMOVE_VERB_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bremove\b|\bdelete\b").unwrap());
static BUSINESS_HOST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbusiness host\b").unwrap());
static PROCESS_HOST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbusiness process\b|\bprocess\b").unwrap());
static OPERATION_HOST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbusiness operation\b|\boperation\b").unwrap());
static DISABLED_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bdisabled\b").unwrap());

fn read_proposal(kind: &str, op: OperationKind, target: String, summary: String) -> ActionProposal {
    ActionProposal {
        id: action_id(),
        kind: kind.to_string(),
        op: Some(op),
        target: Some(target),
        summary,
        requires_approval: false,
        status: ActionStatus::Executed,
        endpoint: None,
        method: None,
        payload: json!({ "args": {} }),
    }
}

/// Recognizes a closed set of surface phrasings and maps each to a fully
/// formed proposal. Patterns are tried in a fixed order and the first match
/// wins; anything else returns `None` and the caller moves on to the model
/// planner.
pub fn parse_direct_action(message: &str) -> Option<DirectAction> {
    let text = message;
    let dry_run = DRY_RUN_REGEX.is_match(text);

    if let Some(captures) = LOOKUP_TABLE_REGEX.captures(text) {
        if READ_VERB_REGEX.is_match(text) && LOOKUP_NOUN_REGEX.is_match(text) {
            let table_name = &captures[1];
            return Some(DirectAction {
                dry_run: false,
                action: read_proposal(
                    "lookup_read",
                    OperationKind::Query,
                    format!("lookup/{table_name}"),
                    format!("Read lookup table '{table_name}' entries."),
                ),
            });
        }
    }

    if METADATA_REGEX.is_match(text) {
        if let Some(captures) = CLASS_META_REGEX.captures(text) {
            let class_name = &captures[1];
            return Some(DirectAction {
                dry_run: false,
                action: read_proposal(
                    "class_meta_read",
                    OperationKind::Query,
                    format!("classmeta/{class_name}"),
                    format!("Read metadata for class '{class_name}'."),
                ),
            });
        }
    }

    if INVOKE_POLICY_REGEX.is_match(text) {
        return Some(DirectAction {
            dry_run: false,
            action: read_proposal(
                "invoke_policy_read",
                OperationKind::Discover,
                "invoke-policy".to_string(),
                "Read current generic class invocation policy.".to_string(),
            ),
        });
    }

    if LIST_CLASSES_REGEX.is_match(text) {
        let pattern = extract_class_pattern(text);
        let mut action = read_proposal(
            "dictionary_classes_read",
            OperationKind::Query,
            "dictionary/classes".to_string(),
            format!("List classes matching pattern '{pattern}'."),
        );
        action.payload = json!({ "args": { "pattern": pattern, "maxRows": 500 } });
        return Some(DirectAction { dry_run: false, action });
    }

    let host_name = HOST_NAME_REGEX.captures(text).map(|captures| captures[1].to_string());

    if ADD_HOST_REGEX.is_match(text) {
        if let Some(host_name) = &host_name {
            let mut class_name = "Engine.BusinessService";
            if PROCESS_HOST_REGEX.is_match(text) {
                class_name = "Engine.BusinessProcess";
            }
            if OPERATION_HOST_REGEX.is_match(text) {
                class_name = "Engine.BusinessOperation";
            }
            let enabled = !DISABLED_REGEX.is_match(text);
            return Some(DirectAction {
                dry_run,
                action: ActionProposal {
                    id: action_id(),
                    kind: "add_production_host".to_string(),
                    op: Some(OperationKind::Mutate),
                    target: Some("production/host/add".to_string()),
                    summary: format!(
                        "Add host '{host_name}' ({class_name}), enabled={}.",
                        if enabled { "true" } else { "false" }
                    ),
                    requires_approval: true,
                    status: ActionStatus::PendingApproval,
                    endpoint: None,
                    method: None,
                    payload: json!({
                        "args": {
                            "config": {
                                "name": host_name,
                                "className": class_name,
                                "category": "Generated",
                                "enabled": enabled,
                            },
                        },
                    }),
                },
            });
        }
    }

    if REMOVE_VERB_REGEX.is_match(text) && BUSINESS_HOST_REGEX.is_match(text) {
        if let Some(host_name) = &host_name {
            return Some(DirectAction {
                dry_run,
                action: ActionProposal {
                    id: action_id(),
                    kind: "remove_production_host".to_string(),
                    op: Some(OperationKind::Mutate),
                    target: Some("production/host/remove".to_string()),
                    summary: format!("Remove host '{host_name}'."),
                    requires_approval: true,
                    status: ActionStatus::PendingApproval,
                    endpoint: None,
                    method: None,
                    payload: json!({ "args": { "name": host_name } }),
                },
            });
        }
    }

    None
}

/// Package filter for a class-listing request, in the dictionary's `%`
/// wildcard dialect.
fn extract_class_pattern(message: &str) -> String {
    let Some(captures) = CLASS_PATTERN_REGEX.captures(message) else {
        return "Trestle.%".to_string();
    };
    let mut raw = captures[1].trim().replace('*', "%");
    if !raw.contains('%') {
        if raw.ends_with('.') {
            raw.push('%');
        } else {
            raw.push_str(".%");
        }
    }
    raw
}

/// Request shapes the coarse legacy matcher can still catch after both the
/// direct parser and the planner have passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyAction {
    ProductionTopology,
    ProductionStatus,
    QueueCounts,
    EventLog,
    LookupTables,
    ApprovalRequired,
}

static TOPOLOGY_VERB_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(list|show|get).*(production items|production hosts|production topology|all hosts)")
        .unwrap()
});
static TOPOLOGY_PHRASE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(current production items|list current production)").unwrap());
static STATUS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(production status|is .*production.*running|current production status)").unwrap()
});
static QUEUES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(queue|queues|queue depth|backlog)\b").unwrap());
static EVENTS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(recent errors|event log|production events|last .* errors)").unwrap()
});
static LOOKUPS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(lookup tables|list lookups|show lookups)").unwrap());
static APPROVAL_VERB_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(approve|deploy|rollback|roll back|start production|stop production)\b").unwrap()
});
static CHANGE_REQUEST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(create|add|connect|wire|modify|change|update).*(business service|business process|business operation|router|routing rule|transform|production|host|integration|route)",
    )
    .unwrap()
});

pub fn detect_legacy_action(message: &str) -> Option<LegacyAction> {
    if TOPOLOGY_VERB_REGEX.is_match(message) || TOPOLOGY_PHRASE_REGEX.is_match(message) {
        return Some(LegacyAction::ProductionTopology);
    }
    if STATUS_REGEX.is_match(message) {
        return Some(LegacyAction::ProductionStatus);
    }
    if QUEUES_REGEX.is_match(message) {
        return Some(LegacyAction::QueueCounts);
    }
    if EVENTS_REGEX.is_match(message) {
        return Some(LegacyAction::EventLog);
    }
    if LOOKUPS_REGEX.is_match(message) {
        return Some(LegacyAction::LookupTables);
    }
    if APPROVAL_VERB_REGEX.is_match(message) || CHANGE_REQUEST_REGEX.is_match(message) {
        return Some(LegacyAction::ApprovalRequired);
    }
    None
}

static APPROVE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(approve|deploy)\b").unwrap());
static ROLLBACK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(rollback|roll back|revert|undo)\b").unwrap());
static START_PRODUCTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(start production)\b").unwrap());
static STOP_PRODUCTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(stop production)\b").unwrap());

fn approval_proposal(kind: &str, summary: &str, endpoint: &str) -> ActionProposal {
    ActionProposal {
        id: action_id(),
        kind: kind.to_string(),
        op: None,
        target: None,
        summary: summary.to_string(),
        requires_approval: true,
        status: ActionStatus::PendingApproval,
        endpoint: Some(endpoint.to_string()),
        method: Some(HttpMethod::Post),
        payload: json!({}),
    }
}

/// Proposals for the legacy approval-required branch. A deterministically
/// parsed mutation wins outright; otherwise one proposal per recognized
/// keyword family, with a generic change-plan placeholder as the floor.
pub fn build_approval_proposals(message: &str) -> Vec<ActionProposal> {
    if let Some(parsed) = parse_direct_action(message) {
        if parsed.action.requires_approval {
            let mut action = parsed.action;
            action.status = ActionStatus::PendingApproval;
            return vec![action];
        }
    }

    let mut proposals = Vec::new();

    if APPROVE_REGEX.is_match(message) {
        proposals.push(approval_proposal(
            "approve_deploy_generation",
            "Approve the pending generation and deploy to production.",
            "/generate/approve",
        ));
    }
    if ROLLBACK_REGEX.is_match(message) {
        proposals.push(approval_proposal(
            "rollback_version",
            "Rollback production to a selected previous version snapshot.",
            "/lifecycle/rollback/:id",
        ));
    }
    if START_PRODUCTION_REGEX.is_match(message) {
        proposals.push(approval_proposal(
            "start_production",
            "Start the target production.",
            "/production/start",
        ));
    }
    if STOP_PRODUCTION_REGEX.is_match(message) {
        proposals.push(approval_proposal(
            "stop_production",
            "Stop the target production.",
            "/production/stop",
        ));
    }

    if proposals.is_empty() {
        proposals.push(ActionProposal {
            id: action_id(),
            kind: "integration_change_plan".to_string(),
            op: None,
            target: None,
            summary: "Prepare integration change plan and require explicit approval before apply/deploy."
                .to_string(),
            requires_approval: true,
            status: ActionStatus::PendingApproval,
            endpoint: None,
            method: None,
            payload: Value::Null,
        });
    }

    proposals
}
