//! Workflow Execution Engine.
//!
//! A workflow is a directed graph of typed nodes (start, agentic,
//! decision, memory, end) connected by edges. The `WorkflowEngine` walks
//! the graph depth-first from its start node, dispatching behavior per
//! node kind: agentic nodes call the injected `InferenceClient`, decision
//! nodes pick a branch by evaluating conditions over prior node outputs,
//! memory nodes capture resolved context. Every step appends to an
//! ordered execution log streamed through a registered sink, and a run
//! can be stopped cooperatively between node dispatches.

pub mod condition;
pub mod executor;
pub mod resolver;
pub mod store;

pub use condition::{evaluate_condition, Evaluation, Verdict};
pub use executor::{EngineOptions, LogSink, WorkflowEngine};
pub use resolver::{resolve_template, Resolution, Template};
pub use store::OutputStore;
