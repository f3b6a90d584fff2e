pub mod config;
pub mod error;
pub mod graph;
pub mod import;
pub mod run;
pub mod traits;

pub use config::AppConfig;
pub use error::{Result, TrellisError};
pub use graph::{DecisionRule, Edge, NodeKind, WorkflowGraph, WorkflowNode};
pub use import::{WorkflowConfig, WorkflowDoc};
pub use run::{ExecutionId, ExecutionRecord, LogEntry, LogKind, RunStatus};
pub use traits::InferenceClient;
