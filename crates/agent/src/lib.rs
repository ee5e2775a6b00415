//! Agent runtime - model-backed action brokering over the engine
//!
//! This crate is the conversational side of trestle - the broker that turns
//! a chat turn into engine reads, approval-gated proposals, or a plain model
//! reply:
//! - Parses explicit operational phrasing without any model call
//! - Plans actions with a chat model and re-validates them against the
//!   capability catalog
//! - Executes read-only actions immediately, queues everything else for
//!   human approval
//! - Falls back to a topic-shaped conversational turn
//!
//! # Architecture
//!
//! Each turn walks a fixed strategy chain (see `broker`):
//! 1. **Direct parse** (`trestle_core::intent`) - deterministic, zero model calls
//! 2. **Planned actions** (`ActionBroker::handle`) - one planner call, strict
//!    JSON decision, catalog normalization, inline read execution
//! 3. **Legacy matcher** - coarse deterministic safety net
//! 4. **Plain chat** - topic-enriched prompt, artifact extraction for
//!    build/modify conversations
//!
//! # Key Types
//!
//! - `ActionBroker` - the orchestration driver (see `broker` module)
//! - `ChatModel` - pluggable trait over Anthropic/OpenAI backends
//! - `BrokerRequest` / `BrokerResponse` - one turn in, one settled reply out
//!
//! # Safety Principle
//!
//! The model is strictly a proposer. It NEVER decides what requires approval:
//! the approval flag is recomputed from the operation class during
//! normalization, and mutating actions are never executed by this crate.

pub mod anthropic;
pub mod broker;
mod executor;
pub mod model;
pub mod openai;

pub use broker::{ActionBroker, BrokerRequest, NO_MODEL_REPLY};
pub use model::{build_model, ChatModel, ChatReply, ModelError, ModelRequest, StreamChunk};
