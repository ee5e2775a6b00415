use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use trestle_core::action::{action_id, ActionProposal, ActionStatus, HttpMethod, OperationKind};
use trestle_core::artifacts::extract_generation;
use trestle_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use trestle_core::catalog::ActionCatalog;
use trestle_core::chat::{
    BrokerResponse, ChatMessage, ExecutionMode, ExecutionSummary, ReplySource,
};
use trestle_core::compose::compose;
use trestle_core::config::AppConfig;
use trestle_core::envelope::unwrap_data;
use trestle_core::intent::{
    build_approval_proposals, classify_topic, detect_legacy_action, parse_direct_action,
    DirectAction, LegacyAction, Topic,
};
use trestle_core::normalize::normalize;
use trestle_core::planner::{
    build_planner_system_prompt, build_planner_user_prompt, parse_planner_decision, PlannerMode,
};
use trestle_core::prompts::build_chat_system_prompt;
use trestle_core::render::{render_read_block, summarize_read_result, EVENT_ROW_CAP};
use trestle_engine::{EngineOperator, OperateRequest};

use crate::executor::ReadExecutor;
use crate::model::{ChatModel, ModelRequest, StreamChunk};

pub const NO_MODEL_REPLY: &str =
    "No chat model is configured. Set an Anthropic or OpenAI API key in the broker configuration.";

/// One conversational turn as received from the caller. `namespace` and
/// `production_status` are optional caller-side context: the namespace falls
/// back to the configured default, and the status snapshot (when the caller
/// has one) is embedded into the plain-chat system prompt.
#[derive(Clone, Debug, Default)]
pub struct BrokerRequest {
    pub message: String,
    pub history: Vec<ChatMessage>,
    pub namespace: Option<String>,
    pub production_status: Option<Value>,
    pub conversation_id: Option<String>,
}

impl BrokerRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    fn correlation_id(&self) -> String {
        self.conversation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// The orchestration driver. One instance serves many conversations; all
/// per-turn state lives in local values, so `handle` can run concurrently.
///
/// Each turn walks a fixed strategy chain and the first stage that produces
/// a response wins:
///
/// 1. direct deterministic parse, executed or queued immediately
/// 2. model-planned actions, normalized against the catalog
/// 3. the coarser legacy matcher as a deterministic safety net
/// 4. a plain conversational turn with a topic-shaped prompt
///
/// Stages 1 and 3 work without any model configured; stage 4 without a
/// model yields a fixed pointer at the missing key instead of failing.
pub struct ActionBroker {
    engine: Arc<dyn EngineOperator>,
    model: Option<Arc<dyn ChatModel>>,
    catalog: ActionCatalog,
    audit: Arc<dyn AuditSink>,
    namespace: String,
    generic_operate_enabled: bool,
}

impl ActionBroker {
    pub fn new(
        engine: Arc<dyn EngineOperator>,
        model: Option<Arc<dyn ChatModel>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            engine,
            model,
            catalog: ActionCatalog::builtin(),
            audit: Arc::new(NoopAuditSink),
            namespace: config.engine.namespace.clone(),
            generic_operate_enabled: config.broker.generic_operate_enabled,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub async fn handle(&self, request: BrokerRequest) -> BrokerResponse {
        let topic = classify_topic(&request.message);

        // Explicit actionable phrasing skips the model entirely.
        if parse_direct_action(&request.message).is_some() {
            if let Some(response) = self.try_actionable(&request).await {
                return response;
            }
        }
        if let Some(response) = self.try_planned(&request, topic).await {
            return response;
        }
        if let Some(response) = self.try_actionable(&request).await {
            return response;
        }
        self.plain_chat(&request, topic).await
    }

    /// Streaming variant of [`handle`](Self::handle). The broker stages are
    /// not incremental, so their replies arrive as one content chunk after
    /// an attribution chunk; only the plain-chat stage streams through to
    /// the backend.
    pub async fn handle_stream(&self, request: BrokerRequest) -> Vec<StreamChunk> {
        let topic = classify_topic(&request.message);

        if parse_direct_action(&request.message).is_some() {
            if let Some(response) = self.try_actionable(&request).await {
                return buffered_chunks(&response);
            }
        }
        if let Some(response) = self.try_planned(&request, topic).await {
            return buffered_chunks(&response);
        }
        if let Some(response) = self.try_actionable(&request).await {
            return buffered_chunks(&response);
        }

        let Some(model) = self.model.as_ref() else {
            return vec![StreamChunk::content(NO_MODEL_REPLY), StreamChunk::done()];
        };
        let system_prompt =
            build_chat_system_prompt(topic, request.production_status.as_ref(), self.namespace_for(&request));
        let chat_request = ModelRequest::new(request.message.clone(), system_prompt)
            .with_history(request.history.clone());

        let mut chunks = vec![StreamChunk::attribution(model.model_id())];
        match model.chat_stream(chat_request).await {
            Ok(stream) => chunks.extend(stream),
            Err(err) => {
                chunks.push(StreamChunk::content(format!(
                    "I could not reach the chat model. Error: {err}"
                )));
                chunks.push(StreamChunk::done());
            }
        }
        chunks
    }

    /// The deterministic broker: the narrow direct parser first, then the
    /// coarse legacy matcher. `None` means neither recognized the message.
    async fn try_actionable(&self, request: &BrokerRequest) -> Option<BrokerResponse> {
        if let Some(parsed) = parse_direct_action(&request.message) {
            if let (Some(op), Some(_)) = (parsed.action.op, parsed.action.target.as_deref()) {
                return Some(self.run_direct(request, parsed, op).await);
            }
        }
        let legacy = detect_legacy_action(&request.message)?;
        Some(self.run_legacy(request, legacy).await)
    }

    async fn run_direct(
        &self,
        request: &BrokerRequest,
        parsed: DirectAction,
        op: OperationKind,
    ) -> BrokerResponse {
        let DirectAction { mut action, dry_run } = parsed;
        let namespace = self.namespace_for(request).to_string();
        let correlation_id = request.correlation_id();
        let is_read = op.is_read_only();

        if !is_read && !dry_run {
            action.requires_approval = true;
            action.status = ActionStatus::PendingApproval;
            let reply = [
                "Execution plan prepared. No production changes were executed yet.".to_string(),
                "Human approval is required before applying this mutation.".to_string(),
                "Proposed actions:".to_string(),
                format!("- {}", action.summary),
            ]
            .join("\n");
            self.record(
                &action,
                &namespace,
                &correlation_id,
                "action.approval_queued",
                AuditCategory::Approval,
                AuditOutcome::Pending,
            );
            return BrokerResponse {
                reply,
                source: ReplySource::DirectActionBroker,
                model: None,
                actions: vec![action],
                execution: Some(ExecutionSummary {
                    mode: ExecutionMode::ApprovalRequired,
                    executed_count: 0,
                }),
                generation: None,
            };
        }

        let target = action.target.clone().unwrap_or_default();
        let mut operate = OperateRequest::new(op, target.clone());
        operate.correlation_id = Some(correlation_id.clone());
        operate.namespace = Some(namespace.clone());
        operate.action = Some(if is_read { "read" } else { "apply" }.to_string());
        operate.args = Some(direct_args(&action.payload));
        operate.dry_run = Some(dry_run);

        match self.engine.operate(operate).await {
            Ok(raw) => {
                let data = unwrap_data(raw);
                let reply = if dry_run && !is_read {
                    let pretty = serde_json::to_string_pretty(&data).unwrap_or_default();
                    format!(
                        "Dry-run executed. No production mutation was applied.\n\nResult:\n```json\n{pretty}\n```"
                    )
                } else {
                    let block =
                        render_read_block(&action.kind, action.target.as_deref(), &data, &request.message);
                    let mut lines = vec![if block.is_empty() {
                        format!("Action executed: {target}")
                    } else {
                        block
                    }];
                    let summary =
                        summarize_read_result(&action.kind, action.target.as_deref(), &data);
                    if !summary.is_empty() {
                        lines.push(String::new());
                        lines.push("Execution results:".to_string());
                        lines.push(format!("- {summary}"));
                    }
                    lines.join("\n")
                };

                action.requires_approval = false;
                action.status = ActionStatus::Executed;
                self.record(
                    &action,
                    &namespace,
                    &correlation_id,
                    "action.executed",
                    AuditCategory::Direct,
                    AuditOutcome::Success,
                );
                BrokerResponse {
                    reply,
                    source: ReplySource::DirectActionBroker,
                    model: None,
                    actions: vec![action],
                    execution: Some(ExecutionSummary {
                        mode: ExecutionMode::DirectRead,
                        executed_count: 1,
                    }),
                    generation: None,
                }
            }
            Err(err) => {
                self.record(
                    &action,
                    &namespace,
                    &correlation_id,
                    "action.failed",
                    AuditCategory::Direct,
                    AuditOutcome::Failed,
                );
                // This is the path with no further fallback, so the failure
                // is surfaced verbatim instead of degrading.
                BrokerResponse {
                    reply: format!("I could not execute the requested operation. Error: {err}"),
                    source: ReplySource::DirectActionBroker,
                    model: None,
                    actions: Vec::new(),
                    execution: None,
                    generation: None,
                }
            }
        }
    }

    async fn try_planned(&self, request: &BrokerRequest, topic: Topic) -> Option<BrokerResponse> {
        let model = self.model.as_ref()?;
        let namespace = self.namespace_for(request).to_string();

        let capabilities = self.capability_snapshot(&namespace).await;
        let system_prompt =
            build_planner_system_prompt(&self.catalog, topic, &namespace, capabilities.as_deref());
        let planner_request = ModelRequest::new(
            build_planner_user_prompt(&request.message, &request.history),
            system_prompt,
        );

        let raw = match model.chat(planner_request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(event_name = "planner_call_failed", error = %err);
                return None;
            }
        };

        let decision = parse_planner_decision(&raw.content)?;
        if decision.mode != PlannerMode::Actions || decision.actions.is_empty() {
            return None;
        }
        let normalized = normalize(&self.catalog, decision.actions);
        if normalized.is_empty() {
            return None;
        }

        let correlation_id = request.correlation_id();
        self.audit.emit(
            AuditEvent::new(
                None,
                Some(namespace.clone()),
                correlation_id.clone(),
                "plan.accepted",
                AuditCategory::Planning,
                "action-broker",
                AuditOutcome::Success,
            )
            .with_metadata("actions", normalized.len().to_string()),
        );

        let executor = ReadExecutor {
            engine: self.engine.as_ref(),
            audit: self.audit.as_ref(),
            namespace: &namespace,
            generic_operate_enabled: self.generic_operate_enabled,
            correlation_id: &correlation_id,
        };
        let outcome = executor.run(&request.message, normalized).await;

        let reply = compose(&decision.response, &outcome.blocks, &outcome.notes, outcome.any_pending);
        let mode = if outcome.any_pending {
            ExecutionMode::ApprovalRequired
        } else {
            ExecutionMode::DirectRead
        };

        Some(BrokerResponse {
            reply,
            source: ReplySource::ModelActionBroker,
            model: Some(raw.model_id),
            actions: outcome.actions,
            execution: Some(ExecutionSummary { mode, executed_count: outcome.executed_count }),
            generation: None,
        })
    }

    async fn run_legacy(&self, request: &BrokerRequest, legacy: LegacyAction) -> BrokerResponse {
        match legacy {
            LegacyAction::ProductionTopology => {
                self.legacy_read(
                    request,
                    "production_topology",
                    "/production/topology",
                    None,
                    "Listed current production items from the live topology endpoint.",
                )
                .await
            }
            LegacyAction::ProductionStatus => {
                self.legacy_read(
                    request,
                    "production_status",
                    "/production/status",
                    None,
                    "Fetched live production status from the engine.",
                )
                .await
            }
            LegacyAction::QueueCounts => {
                self.legacy_read(
                    request,
                    "queue_counts",
                    "/production/queues",
                    None,
                    "Fetched live queue depths from the engine.",
                )
                .await
            }
            LegacyAction::EventLog => {
                self.legacy_read(
                    request,
                    "event_log",
                    "/production/events",
                    Some(EVENT_ROW_CAP),
                    "Fetched recent production events from the engine.",
                )
                .await
            }
            LegacyAction::LookupTables => {
                self.legacy_read(
                    request,
                    "lookup_tables",
                    "/lookups",
                    None,
                    "Fetched lookup table list from the engine.",
                )
                .await
            }
            LegacyAction::ApprovalRequired => self.legacy_approval(request),
        }
    }

    async fn legacy_read(
        &self,
        request: &BrokerRequest,
        kind: &str,
        endpoint: &str,
        row_limit: Option<usize>,
        summary: &str,
    ) -> BrokerResponse {
        let namespace = self.namespace_for(request).to_string();
        let correlation_id = request.correlation_id();
        let fetch_path = match row_limit {
            Some(count) => format!("{endpoint}?count={count}"),
            None => endpoint.to_string(),
        };

        match self.engine.request(HttpMethod::Get, &fetch_path, None).await {
            Ok(raw) => {
                let data = unwrap_data(raw);
                let reply = render_read_block(kind, None, &data, &request.message);
                let action = ActionProposal {
                    id: action_id(),
                    kind: kind.to_string(),
                    op: None,
                    target: None,
                    summary: summary.to_string(),
                    requires_approval: false,
                    status: ActionStatus::Executed,
                    endpoint: Some(endpoint.to_string()),
                    method: Some(HttpMethod::Get),
                    payload: Value::Null,
                };
                self.record(
                    &action,
                    &namespace,
                    &correlation_id,
                    "action.executed",
                    AuditCategory::Direct,
                    AuditOutcome::Success,
                );
                BrokerResponse {
                    reply,
                    source: ReplySource::DirectActionBroker,
                    model: None,
                    actions: vec![action],
                    execution: Some(ExecutionSummary {
                        mode: ExecutionMode::DirectRead,
                        executed_count: 1,
                    }),
                    generation: None,
                }
            }
            Err(err) => BrokerResponse {
                reply: format!("I could not execute the requested engine action. Error: {err}"),
                source: ReplySource::DirectActionBroker,
                model: None,
                actions: Vec::new(),
                execution: None,
                generation: None,
            },
        }
    }

    fn legacy_approval(&self, request: &BrokerRequest) -> BrokerResponse {
        let namespace = self.namespace_for(request).to_string();
        let correlation_id = request.correlation_id();
        let proposals = build_approval_proposals(&request.message);

        let mut lines = vec![
            "Execution plan prepared. No production changes were executed yet.".to_string(),
            "Human approval is required before deployment or runtime mutations.".to_string(),
            "Proposed actions:".to_string(),
        ];
        lines.extend(proposals.iter().map(|proposal| format!("- {}", proposal.summary)));

        for proposal in &proposals {
            self.record(
                proposal,
                &namespace,
                &correlation_id,
                "action.approval_queued",
                AuditCategory::Approval,
                AuditOutcome::Pending,
            );
        }

        BrokerResponse {
            reply: lines.join("\n"),
            source: ReplySource::DirectActionBroker,
            model: None,
            actions: proposals,
            execution: Some(ExecutionSummary {
                mode: ExecutionMode::ApprovalRequired,
                executed_count: 0,
            }),
            generation: None,
        }
    }

    async fn plain_chat(&self, request: &BrokerRequest, topic: Topic) -> BrokerResponse {
        let Some(model) = self.model.as_ref() else {
            return BrokerResponse::plain(NO_MODEL_REPLY);
        };
        let namespace = self.namespace_for(request).to_string();
        let correlation_id = request.correlation_id();
        let system_prompt =
            build_chat_system_prompt(topic, request.production_status.as_ref(), &namespace);
        let chat_request = ModelRequest::new(request.message.clone(), system_prompt)
            .with_history(request.history.clone());

        let reply = match model.chat(chat_request).await {
            Ok(reply) => reply,
            Err(err) => {
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        Some(namespace),
                        correlation_id,
                        "chat.failed",
                        AuditCategory::Chat,
                        "plain-chat",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("topic", topic.as_str()),
                );
                return BrokerResponse::plain(format!(
                    "I could not reach the chat model. Error: {err}"
                ));
            }
        };

        self.audit.emit(
            AuditEvent::new(
                None,
                Some(namespace),
                correlation_id,
                "chat.completed",
                AuditCategory::Chat,
                "plain-chat",
                AuditOutcome::Success,
            )
            .with_metadata("topic", topic.as_str()),
        );

        // Build/modify conversations may carry class definitions worth
        // lifting out of the prose.
        let generation = match topic {
            Topic::NewIntegration | Topic::ModifyIntegration => {
                extract_generation(&request.message, &reply.content)
            }
            _ => None,
        };
        let source = if generation.is_some() {
            ReplySource::GeneratedCode
        } else {
            ReplySource::PlainChat
        };

        BrokerResponse {
            reply: reply.content,
            source,
            model: Some(reply.model_id),
            actions: Vec::new(),
            execution: None,
            generation,
        }
    }

    /// Live capability snapshot for the planner prompt, only meaningful when
    /// the generic operate surface is on. Failures degrade to no snapshot.
    async fn capability_snapshot(&self, namespace: &str) -> Option<String> {
        if !self.generic_operate_enabled {
            return None;
        }
        match self.engine.capabilities(namespace).await {
            Ok(raw) => serde_json::to_string(&unwrap_data(raw)).ok(),
            Err(err) => {
                tracing::debug!(event_name = "capability_snapshot_failed", error = %err);
                None
            }
        }
    }

    fn namespace_for<'a>(&'a self, request: &'a BrokerRequest) -> &'a str {
        request.namespace.as_deref().unwrap_or(&self.namespace)
    }

    fn record(
        &self,
        action: &ActionProposal,
        namespace: &str,
        correlation_id: &str,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) {
        self.audit.emit(
            AuditEvent::new(
                Some(action.id.clone()),
                Some(namespace.to_string()),
                correlation_id,
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

/// Operate args for a deterministically parsed action: the payload's `args`
/// member when present, the whole payload otherwise, `{}` as the floor.
fn direct_args(payload: &Value) -> Value {
    if let Some(args) = payload.get("args") {
        if !args.is_null() {
            return args.clone();
        }
    }
    if payload.is_null() {
        json!({})
    } else {
        payload.clone()
    }
}

fn buffered_chunks(response: &BrokerResponse) -> Vec<StreamChunk> {
    let attribution =
        response.model.clone().unwrap_or_else(|| response.source.as_str().to_string());
    vec![
        StreamChunk::attribution(attribution),
        StreamChunk::content(response.reply.clone()),
        StreamChunk::done(),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use trestle_core::chat::{BrokerResponse, ReplySource};

    use super::{buffered_chunks, direct_args};

    #[test]
    fn direct_args_prefer_the_args_member() {
        assert_eq!(
            direct_args(&json!({ "args": { "pattern": "Billing.%" } })),
            json!({ "pattern": "Billing.%" })
        );
        assert_eq!(direct_args(&json!({ "pattern": "X" })), json!({ "pattern": "X" }));
        assert_eq!(direct_args(&serde_json::Value::Null), json!({}));
    }

    #[test]
    fn buffered_chunks_attribute_to_the_model_or_the_source() {
        let mut response = BrokerResponse::plain("done");
        response.source = ReplySource::DirectActionBroker;

        let chunks = buffered_chunks(&response);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].model_id.as_deref(), Some("direct-action-broker"));
        assert_eq!(chunks[1].token, "done");
        assert!(chunks[2].done);

        response.model = Some("claude-opus-4-1-20250805".to_string());
        let chunks = buffered_chunks(&response);
        assert_eq!(chunks[0].model_id.as_deref(), Some("claude-opus-4-1-20250805"));
    }
}
