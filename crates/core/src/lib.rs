pub mod action;
pub mod artifacts;
pub mod audit;
pub mod catalog;
pub mod chat;
pub mod compose;
pub mod config;
pub mod envelope;
pub mod intent;
pub mod normalize;
pub mod planner;
pub mod prompts;
pub mod render;

pub use action::{action_id, ActionProposal, ActionStatus, HttpMethod, OperationKind};
pub use artifacts::{ClassKind, GeneratedClass, Generation};
pub use catalog::{ActionCatalog, CatalogEntry};
pub use chat::{
    BrokerResponse, ChatMessage, ChatRole, ExecutionMode, ExecutionSummary, ReplySource,
};
pub use intent::{classify_topic, DirectAction, LegacyAction, Topic};
pub use normalize::normalize;
pub use planner::{PlannedAction, PlannerDecision, PlannerMode};
