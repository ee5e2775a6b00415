use serde_json::{json, Value};

use trestle_core::action::{ActionProposal, ActionStatus, HttpMethod, OperationKind};
use trestle_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use trestle_core::envelope::unwrap_data;
use trestle_core::render::{render_read_block, summarize_read_result};
use trestle_engine::{EngineOperator, OperateRequest};

/// What one pass over a normalized action list produced: the proposals with
/// final statuses, rendered result blocks, one-line execution notes, and the
/// counters the response envelope reports.
pub struct ExecutionOutcome {
    pub actions: Vec<ActionProposal>,
    pub blocks: Vec<String>,
    pub notes: Vec<String>,
    pub executed_count: usize,
    pub any_pending: bool,
}

/// Runs the read-only side of an action plan. Approval-gated proposals are
/// parked without touching the engine; anything that looks like a read is
/// executed inline and rendered into the reply.
pub struct ReadExecutor<'a> {
    pub engine: &'a dyn EngineOperator,
    pub audit: &'a dyn AuditSink,
    pub namespace: &'a str,
    pub generic_operate_enabled: bool,
    pub correlation_id: &'a str,
}

impl ReadExecutor<'_> {
    pub async fn run(
        &self,
        user_message: &str,
        mut actions: Vec<ActionProposal>,
    ) -> ExecutionOutcome {
        let mut blocks = Vec::new();
        let mut notes = Vec::new();
        let mut executed_count = 0;

        for action in &mut actions {
            if action.requires_approval {
                action.status = ActionStatus::PendingApproval;
                self.record(action, "action.approval_queued", AuditCategory::Approval, AuditOutcome::Pending);
                continue;
            }
            // Non-reads that slipped past approval keep their optimistic
            // status; they are reported, never run.
            if !action.is_direct_read() || (action.target.is_none() && action.endpoint.is_none()) {
                continue;
            }

            match self.read(action).await {
                Ok(data) => {
                    action.status = ActionStatus::Executed;
                    executed_count += 1;
                    notes.push(summarize_read_result(&action.kind, action.target.as_deref(), &data));
                    let block =
                        render_read_block(&action.kind, action.target.as_deref(), &data, user_message);
                    if !block.is_empty() {
                        blocks.push(block);
                    }
                    self.record(action, "action.executed", AuditCategory::Execution, AuditOutcome::Success);
                }
                Err(detail) => {
                    action.status = ActionStatus::PendingApproval;
                    let label = action.target.clone().unwrap_or_else(|| action.kind.clone());
                    notes.push(format!("Read action failed ({label}): {detail}"));
                    self.record(action, "action.failed", AuditCategory::Execution, AuditOutcome::Failed);
                }
            }
        }

        let any_pending = actions.iter().any(|action| action.requires_approval);
        ExecutionOutcome { actions, blocks, notes, executed_count, any_pending }
    }

    /// One read, through the generic operate endpoint when it is enabled and
    /// the proposal carries an op/target pair, otherwise through the
    /// proposal's GET endpoint.
    async fn read(&self, action: &ActionProposal) -> Result<Value, String> {
        if self.generic_operate_enabled {
            if let (Some(op), Some(target)) = (action.op, action.target.as_deref()) {
                if op.is_read_only() {
                    return self.read_via_operate(op, target, action).await;
                }
            }
        }
        if let Some(endpoint) = action.endpoint.as_deref() {
            let raw = self
                .engine
                .request(HttpMethod::Get, endpoint, None)
                .await
                .map_err(|err| err.to_string())?;
            return Ok(unwrap_data(raw));
        }
        Err("No target or endpoint available for direct read action.".to_string())
    }

    async fn read_via_operate(
        &self,
        op: OperationKind,
        target: &str,
        action: &ActionProposal,
    ) -> Result<Value, String> {
        let mut request = OperateRequest::new(op, target);
        request.correlation_id = Some(self.correlation_id.to_string());
        request.namespace = Some(self.namespace.to_string());
        request.action = Some("read".to_string());
        request.args =
            Some(if action.payload.is_null() { json!({}) } else { action.payload.clone() });
        request.dry_run = Some(false);

        let raw = self.engine.operate(request).await.map_err(|err| err.to_string())?;
        Ok(unwrap_data(raw))
    }

    fn record(
        &self,
        action: &ActionProposal,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) {
        self.audit.emit(
            AuditEvent::new(
                Some(action.id.clone()),
                Some(self.namespace.to_string()),
                self.correlation_id,
                event_type,
                category,
                "action-broker",
                outcome,
            )
            .with_metadata("type", action.kind.clone())
            .with_metadata("target", action.target.clone().unwrap_or_default()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use trestle_core::action::{action_id, ActionProposal, ActionStatus, HttpMethod, OperationKind};
    use trestle_core::audit::InMemoryAuditSink;
    use trestle_engine::{EngineError, EngineOperator, OperateRequest};

    use super::ReadExecutor;

    #[derive(Default)]
    struct FakeEngine {
        operate_calls: Mutex<Vec<OperateRequest>>,
        request_calls: Mutex<Vec<String>>,
        response: Option<Value>,
    }

    #[async_trait]
    impl EngineOperator for FakeEngine {
        async fn operate(&self, request: OperateRequest) -> Result<Value, EngineError> {
            self.operate_calls.lock().unwrap().push(request);
            self.answer()
        }

        async fn request(
            &self,
            _method: HttpMethod,
            path: &str,
            _body: Option<&Value>,
        ) -> Result<Value, EngineError> {
            self.request_calls.lock().unwrap().push(path.to_string());
            self.answer()
        }

        async fn capabilities(&self, _namespace: &str) -> Result<Value, EngineError> {
            self.answer()
        }
    }

    impl FakeEngine {
        fn answer(&self) -> Result<Value, EngineError> {
            match &self.response {
                Some(value) => Ok(value.clone()),
                None => Err(EngineError::Api { status: 503, status_text: "Service Unavailable".to_string() }),
            }
        }
    }

    fn read_proposal() -> ActionProposal {
        ActionProposal {
            id: action_id(),
            kind: "queue_counts".to_string(),
            op: Some(OperationKind::Query),
            target: Some("production/queues".to_string()),
            summary: "Read queue counts.".to_string(),
            requires_approval: false,
            status: ActionStatus::Executed,
            endpoint: Some("/production/queues".to_string()),
            method: Some(HttpMethod::Get),
            payload: Value::Null,
        }
    }

    fn mutate_proposal() -> ActionProposal {
        ActionProposal {
            id: action_id(),
            kind: "add_production_host".to_string(),
            op: Some(OperationKind::Mutate),
            target: Some("production/host/add".to_string()),
            summary: "Add host 'Foo'.".to_string(),
            requires_approval: true,
            status: ActionStatus::PendingApproval,
            endpoint: Some("/operate".to_string()),
            method: Some(HttpMethod::Post),
            payload: json!({ "args": { "config": { "name": "Foo" } } }),
        }
    }

    fn executor<'a>(engine: &'a FakeEngine, audit: &'a InMemoryAuditSink) -> ReadExecutor<'a> {
        ReadExecutor {
            engine,
            audit,
            namespace: "MAIN",
            generic_operate_enabled: false,
            correlation_id: "req-test",
        }
    }

    #[tokio::test]
    async fn approval_gated_actions_never_touch_the_engine() {
        let engine = FakeEngine::default();
        let audit = InMemoryAuditSink::default();

        let outcome = executor(&engine, &audit).run("add a host", vec![mutate_proposal()]).await;

        assert!(engine.operate_calls.lock().unwrap().is_empty());
        assert!(engine.request_calls.lock().unwrap().is_empty());
        assert_eq!(outcome.executed_count, 0);
        assert!(outcome.any_pending);
        assert_eq!(outcome.actions[0].status, ActionStatus::PendingApproval);
        assert_eq!(audit.events().len(), 1);
        assert_eq!(audit.events()[0].event_type, "action.approval_queued");
    }

    #[tokio::test]
    async fn reads_fall_back_to_the_endpoint_when_operate_is_disabled() {
        let engine = FakeEngine {
            response: Some(json!({
                "status": "ok",
                "data": { "queues": [{ "name": "Intake", "count": 3 }] },
            })),
            ..FakeEngine::default()
        };
        let audit = InMemoryAuditSink::default();

        let outcome = executor(&engine, &audit).run("queue counts", vec![read_proposal()]).await;

        assert_eq!(engine.request_calls.lock().unwrap().as_slice(), ["/production/queues"]);
        assert!(engine.operate_calls.lock().unwrap().is_empty());
        assert_eq!(outcome.executed_count, 1);
        assert!(!outcome.any_pending);
        assert_eq!(outcome.notes, ["Queue snapshot read: 1 host(s)."]);
        assert_eq!(outcome.blocks, ["Queue counts (1 host(s)):\n- Intake: 3"]);
    }

    #[tokio::test]
    async fn reads_go_through_operate_when_enabled() {
        let engine = FakeEngine {
            response: Some(json!({ "data": { "queues": [] }, "meta": {} })),
            ..FakeEngine::default()
        };
        let audit = InMemoryAuditSink::default();
        let mut runner = executor(&engine, &audit);
        runner.generic_operate_enabled = true;

        runner.run("queue counts", vec![read_proposal()]).await;

        let calls = engine.operate_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, "production/queues");
        assert_eq!(calls[0].op, OperationKind::Query);
        assert_eq!(calls[0].action.as_deref(), Some("read"));
        assert_eq!(calls[0].args, Some(json!({})));
        assert_eq!(calls[0].dry_run, Some(false));
        assert!(engine.request_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_reads_are_parked_with_a_note() {
        let engine = FakeEngine::default();
        let audit = InMemoryAuditSink::default();

        let outcome = executor(&engine, &audit).run("queue counts", vec![read_proposal()]).await;

        assert_eq!(outcome.executed_count, 0);
        assert_eq!(outcome.actions[0].status, ActionStatus::PendingApproval);
        // Failed reads are parked, but only approval-gated work raises the
        // pending flag for the reply footer.
        assert!(!outcome.any_pending);
        assert_eq!(
            outcome.notes,
            ["Read action failed (production/queues): engine api error: 503 Service Unavailable"]
        );
        assert_eq!(audit.events()[0].event_type, "action.failed");
    }

    #[tokio::test]
    async fn routeless_reads_keep_their_optimistic_status() {
        let engine = FakeEngine::default();
        let audit = InMemoryAuditSink::default();
        let mut action = read_proposal();
        action.target = None;
        action.endpoint = None;

        let outcome = executor(&engine, &audit).run("", vec![action]).await;

        assert_eq!(outcome.actions[0].status, ActionStatus::Executed);
        assert_eq!(outcome.executed_count, 0);
        assert!(outcome.notes.is_empty());
    }
}
