use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{HttpMethod, OperationKind};

/// One action the broker is allowed to propose. Everything a planner or
/// parser emits is reconciled against these entries; fields the model
/// invents never survive reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub op: OperationKind,
    pub target: String,
    pub endpoint: String,
    pub method: HttpMethod,
    pub requires_approval: bool,
    pub description: String,
}

/// The fixed capability catalog. Approval flags are derived from the
/// operation class at construction, never stored independently.
#[derive(Clone, Debug)]
pub struct ActionCatalog {
    entries: Vec<CatalogEntry>,
}

fn entry(
    kind: &str,
    op: OperationKind,
    target: &str,
    endpoint: &str,
    method: HttpMethod,
    description: &str,
) -> CatalogEntry {
    CatalogEntry {
        kind: kind.to_string(),
        op,
        target: target.to_string(),
        endpoint: endpoint.to_string(),
        method,
        requires_approval: op.requires_approval(),
        description: description.to_string(),
    }
}

impl ActionCatalog {
    pub fn builtin() -> Self {
        use HttpMethod::{Get, Post};
        use OperationKind::{Discover, Execute, Mutate, Query};

        Self {
            entries: vec![
                entry(
                    "production_status",
                    Query,
                    "production/status",
                    "/production/status",
                    Get,
                    "Read live production status",
                ),
                entry(
                    "production_topology",
                    Query,
                    "production/topology",
                    "/production/topology",
                    Get,
                    "Read current production topology and items",
                ),
                entry(
                    "queue_counts",
                    Query,
                    "production/queues",
                    "/production/queues",
                    Get,
                    "Read live queue counts",
                ),
                entry(
                    "event_log",
                    Query,
                    "production/events",
                    "/production/events",
                    Get,
                    "Read recent production events",
                ),
                entry("lookup_tables", Query, "lookups", "/lookups", Get, "Read lookup table catalog"),
                entry(
                    "lookup_read",
                    Query,
                    "lookup/ErrorCodes",
                    "/lookups/ErrorCodes",
                    Get,
                    "Read a lookup table content (set target to lookup/<TableName>)",
                ),
                entry(
                    "schema_catalog_read",
                    Query,
                    "schemas",
                    "/schemas",
                    Get,
                    "Read message schema catalog",
                ),
                entry(
                    "dictionary_classes_read",
                    Query,
                    "dictionary/classes",
                    "/operate",
                    Post,
                    "Read dictionary class catalog (args.pattern, args.maxRows)",
                ),
                entry(
                    "class_meta_read",
                    Query,
                    "classmeta/Trestle.Api.Dispatcher",
                    "/operate",
                    Post,
                    "Read class metadata (set target to classmeta/<ClassName>)",
                ),
                entry(
                    "invoke_policy_read",
                    Discover,
                    "invoke-policy",
                    "/operate",
                    Post,
                    "Read invoke policy guards",
                ),
                entry(
                    "sql_read",
                    Query,
                    "sql/select",
                    "/sql",
                    Post,
                    "Run read-only SQL SELECT via generic operate args.query",
                ),
                entry(
                    "approve_deploy_generation",
                    Execute,
                    "generation/approve",
                    "/generate/approve",
                    Post,
                    "Approve and deploy a generated change set",
                ),
                entry(
                    "reject_generation",
                    Execute,
                    "generation/reject",
                    "/generate/reject",
                    Post,
                    "Reject a generated change set",
                ),
                entry(
                    "rollback_version",
                    Execute,
                    "lifecycle/rollback",
                    "/lifecycle/rollback/:id",
                    Post,
                    "Rollback to a version snapshot",
                ),
                entry(
                    "start_production",
                    Execute,
                    "production/start",
                    "/production/start",
                    Post,
                    "Start production",
                ),
                entry(
                    "stop_production",
                    Execute,
                    "production/stop",
                    "/production/stop",
                    Post,
                    "Stop production",
                ),
                entry(
                    "add_production_host",
                    Mutate,
                    "production/host/add",
                    "/operate",
                    Post,
                    "Add business host to production",
                ),
                entry(
                    "remove_production_host",
                    Mutate,
                    "production/host/remove",
                    "/operate",
                    Post,
                    "Remove business host from production",
                ),
                entry(
                    "update_production_host_settings",
                    Mutate,
                    "production/host/settings",
                    "/operate",
                    Post,
                    "Update business host settings in production",
                ),
                entry(
                    "invoke_classmethod",
                    Execute,
                    "class/invoke",
                    "/operate",
                    Post,
                    "Invoke policy-approved class method with args.className, args.method, args.arguments[]",
                ),
            ],
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn by_kind(&self, kind: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }

    /// Route lookup for proposals that arrive without a usable `type`.
    /// Several entries share `/operate`; the first one in catalog order wins.
    pub fn by_route(&self, endpoint: &str, method: HttpMethod) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.endpoint == endpoint && entry.method == method)
    }

    /// The JSON array embedded verbatim in the planner system prompt.
    pub fn planner_digest(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Null)
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::ActionCatalog;
    use crate::action::HttpMethod;

    #[test]
    fn approval_flags_track_operation_class() {
        let catalog = ActionCatalog::builtin();
        for entry in catalog.entries() {
            assert_eq!(
                entry.requires_approval,
                entry.op.requires_approval(),
                "entry {} carries a stale approval flag",
                entry.kind
            );
        }
    }

    #[test]
    fn read_actions_are_open_and_writes_are_gated() {
        let catalog = ActionCatalog::builtin();

        for kind in ["production_status", "queue_counts", "lookup_read", "invoke_policy_read"] {
            let entry = catalog.by_kind(kind).unwrap();
            assert!(!entry.requires_approval, "{kind} should not be gated");
        }

        for kind in
            ["add_production_host", "rollback_version", "stop_production", "invoke_classmethod"]
        {
            let entry = catalog.by_kind(kind).unwrap();
            assert!(entry.requires_approval, "{kind} should be gated");
        }
    }

    #[test]
    fn route_lookup_finds_plain_reads() {
        let catalog = ActionCatalog::builtin();
        let entry = catalog.by_route("/production/status", HttpMethod::Get).unwrap();
        assert_eq!(entry.kind, "production_status");
    }

    #[test]
    fn shared_operate_route_resolves_in_catalog_order() {
        let catalog = ActionCatalog::builtin();
        let entry = catalog.by_route("/operate", HttpMethod::Post).unwrap();
        assert_eq!(entry.kind, "dictionary_classes_read");
    }

    #[test]
    fn planner_digest_is_a_full_array() {
        let catalog = ActionCatalog::builtin();
        let digest = catalog.planner_digest();
        let rows = digest.as_array().unwrap();
        assert_eq!(rows.len(), catalog.entries().len());
        assert_eq!(rows[0]["type"], "production_status");
        assert_eq!(rows[0]["requiresApproval"], false);
    }
}
