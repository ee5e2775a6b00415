use serde::{Deserialize, Serialize};
use serde_json::Value;

use trestle_core::action::OperationKind;

/// Request body for the engine's generic operate endpoint. Optional fields
/// are omitted from the wire payload entirely rather than sent as null.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub op: OperationKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl OperateRequest {
    pub fn new(op: OperationKind, target: impl Into<String>) -> Self {
        Self {
            request_id: None,
            correlation_id: None,
            namespace: None,
            op,
            target: target.into(),
            action: None,
            args: None,
            dry_run: None,
            idempotency_key: None,
        }
    }
}

/// One row of the engine's capability discovery response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub capability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CapabilityEntry, OperateRequest};
    use trestle_core::action::OperationKind;

    #[test]
    fn operate_request_serializes_camel_case_and_skips_absent_fields() {
        let mut request = OperateRequest::new(OperationKind::Query, "production/queues");
        request.namespace = Some("MAIN".to_string());
        request.action = Some("read".to_string());
        request.args = Some(json!({}));
        request.dry_run = Some(false);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["op"], "query");
        assert_eq!(value["target"], "production/queues");
        assert_eq!(value["namespace"], "MAIN");
        assert_eq!(value["dryRun"], false);
        assert!(value.get("requestId").is_none());
        assert!(value.get("idempotencyKey").is_none());
    }

    #[test]
    fn capability_entries_deserialize_with_optional_reason() {
        let rows: Vec<CapabilityEntry> = serde_json::from_value(json!([
            { "capability": "production/queues", "allowed": true },
            { "capability": "production/host/add", "namespace": "MAIN", "allowed": false, "reason": "approval required" },
        ]))
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].allowed);
        assert_eq!(rows[1].reason.as_deref(), Some("approval required"));
    }
}
