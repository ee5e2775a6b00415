pub mod client;
pub mod contract;
pub mod error;

pub use client::{EngineOperator, HttpEngineClient};
pub use contract::{CapabilityEntry, OperateRequest};
pub use error::EngineError;
