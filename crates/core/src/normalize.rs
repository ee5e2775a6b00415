use serde_json::{json, Value};

use crate::action::{action_id, ActionProposal, ActionStatus, HttpMethod, OperationKind};
use crate::catalog::ActionCatalog;
use crate::planner::PlannedAction;

/// Reconciles raw, untrusted action candidates against the capability
/// catalog.
///
/// A candidate survives when it names a catalog entry (by `type`, else by
/// `(endpoint, method)`) or carries a generic shape: a valid operation kind
/// plus a non-empty target. Safety metadata is never trusted from the
/// candidate: a matched entry supplies both the operation class and the
/// approval flag, and generic shapes derive approval from their parsed
/// operation class.
pub fn normalize(catalog: &ActionCatalog, candidates: Vec<PlannedAction>) -> Vec<ActionProposal> {
    let mut normalized = Vec::new();

    for raw in candidates {
        let route_method =
            raw.method.as_deref().map(HttpMethod::parse_or_get).unwrap_or(HttpMethod::Get);
        let entry = raw
            .kind
            .as_deref()
            .filter(|kind| !kind.is_empty())
            .and_then(|kind| catalog.by_kind(kind))
            .or_else(|| {
                raw.endpoint
                    .as_deref()
                    .filter(|endpoint| !endpoint.is_empty())
                    .and_then(|endpoint| catalog.by_route(endpoint, route_method))
            });

        // A matched entry owns the operation class and the approval flag;
        // an op string the candidate claimed is ignored. Only entry-less
        // candidates are classified from their own (op, target) shape.
        let (op, requires_approval) = match entry {
            Some(entry) => (Some(entry.op), entry.requires_approval),
            None => {
                let claimed = raw
                    .op
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .and_then(OperationKind::parse);
                let has_target =
                    raw.target.as_deref().is_some_and(|target| !target.trim().is_empty());
                match (claimed, has_target) {
                    (Some(op), true) => (Some(op), op.requires_approval()),
                    _ => {
                        tracing::debug!(
                            event_name = "proposal_dropped",
                            kind = raw.kind.as_deref().unwrap_or(""),
                            "candidate matches no catalog entry and has no generic shape"
                        );
                        continue;
                    }
                }
            }
        };
        let target = raw
            .target
            .clone()
            .filter(|target| !target.trim().is_empty())
            .or_else(|| entry.map(|entry| entry.target.clone()));
        let status =
            if requires_approval { ActionStatus::PendingApproval } else { ActionStatus::Executed };

        // Only used when the candidate is generic-shaped with no catalog
        // entry, in which case op and target are both present.
        let label = match (op, target.as_deref()) {
            (Some(op), Some(target)) => format!("{op}:{target}"),
            _ => String::new(),
        };
        let kind = raw
            .kind
            .clone()
            .filter(|kind| !kind.is_empty())
            .or_else(|| entry.map(|entry| entry.kind.clone()))
            .unwrap_or_else(|| label.clone());
        let summary = raw
            .summary
            .clone()
            .filter(|summary| !summary.is_empty())
            .or_else(|| entry.map(|entry| entry.description.clone()))
            .unwrap_or_else(|| label.clone());
        let endpoint = raw
            .endpoint
            .clone()
            .filter(|endpoint| !endpoint.is_empty())
            .or_else(|| entry.map(|entry| entry.endpoint.clone()));
        let method = match raw.method.as_deref().filter(|method| !method.trim().is_empty()) {
            Some(value) => Some(HttpMethod::parse_or_get(value)),
            None => entry.map(|entry| entry.method),
        };
        let payload = match raw.payload {
            Some(Value::Null) | None => json!({}),
            Some(value) => value,
        };

        normalized.push(ActionProposal {
            id: raw.id.filter(|id| !id.is_empty()).unwrap_or_else(action_id),
            kind,
            op,
            target,
            summary,
            requires_approval,
            status,
            endpoint,
            method,
            payload,
        });
    }

    normalized
}
