use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::graph::{NodeKind, WorkflowGraph, WorkflowNode};
use trellis_core::run::{ExecutionRecord, LogEntry, LogKind, RunStatus};
use trellis_core::traits::InferenceClient;

use crate::condition::{evaluate_condition, Verdict};
use crate::resolver::resolve_template;
use crate::store::OutputStore;

/// Callback receiving every log entry as it is appended. Invoked inline
/// with the engine's own control flow; it must not block.
pub type LogSink = Box<dyn Fn(&LogEntry) + Send + Sync>;

/// Pseudo node ids for entries not tied to a graph node.
const SYSTEM: (&str, &str) = ("SYSTEM", "System");
const USER: (&str, &str) = ("USER", "User");
const MODEL: (&str, &str) = ("MODEL", "Model");

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Model used for agentic nodes and preloaded at run start.
    pub default_model: Option<String>,
    /// Upper bound on dispatched nodes per run; exceeding it aborts the
    /// run instead of looping forever on a cyclic graph.
    pub max_steps: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_model: None,
            max_steps: 1000,
        }
    }
}

/// What a node dispatch produced, and where traversal goes next.
struct Step {
    output: Value,
    advance: Advance,
}

enum Advance {
    /// Generic advancement: follow every normal outgoing edge, in order.
    Follow,
    /// A decision picked this branch; nothing else is followed.
    Goto(String),
    /// Dead end on this path.
    Halt,
}

/// Workflow execution engine.
///
/// Walks a graph depth-first from its start node, dispatching behavior per
/// node kind, resolving `{nodeId.field}` references against prior outputs,
/// and appending to an ordered execution log. One run at a time; the run
/// state and output store are owned by the engine and exposed only as
/// clone snapshots.
pub struct WorkflowEngine {
    client: Arc<dyn InferenceClient>,
    options: EngineOptions,
    record: Mutex<Option<ExecutionRecord>>,
    outputs: Mutex<OutputStore>,
    sink: Mutex<Option<LogSink>>,
}

impl WorkflowEngine {
    pub fn new(client: Arc<dyn InferenceClient>, options: EngineOptions) -> Self {
        Self {
            client,
            options,
            record: Mutex::new(None),
            outputs: Mutex::new(OutputStore::new()),
            sink: Mutex::new(None),
        }
    }

    /// Register the callback that receives each log entry as it is
    /// appended.
    pub fn set_log_sink(&self, sink: impl Fn(&LogEntry) + Send + Sync + 'static) {
        *self.sink.lock().unwrap() = Some(Box::new(sink));
    }

    /// Snapshot of the current (or most recent) run.
    pub fn current_execution(&self) -> Option<ExecutionRecord> {
        self.record.lock().unwrap().clone()
    }

    /// Snapshot of the per-node outputs of the current run.
    pub fn node_outputs(&self) -> OutputStore {
        self.outputs.lock().unwrap().clone()
    }

    fn status(&self) -> Option<RunStatus> {
        self.record.lock().unwrap().as_ref().map(|r| r.status)
    }

    /// Request a cooperative stop.
    ///
    /// Flips a Running record to Stopped; an in-flight inference call is
    /// not aborted, but no further node is dispatched afterwards.
    pub fn stop(&self) {
        let entry = {
            let mut guard = self.record.lock().unwrap();
            match guard.as_mut() {
                Some(record) if record.status == RunStatus::Running => {
                    record.status = RunStatus::Stopped;
                    record.end_time = Some(Utc::now());
                    let entry = LogEntry::new(
                        LogKind::Info,
                        SYSTEM.0,
                        SYSTEM.1,
                        "Execution stopped by user",
                    );
                    record.log.push(entry.clone());
                    Some(entry)
                }
                _ => None,
            }
        };
        if let Some(entry) = entry {
            self.emit(&entry);
        }
    }

    /// Run a workflow graph.
    ///
    /// Creates a fresh execution record (replacing any previous run's),
    /// preloads the default model if one is configured, and walks the
    /// graph from its start node. Fatal errors mark the record `Error`
    /// and propagate; a cooperative stop yields an `Ok` record with
    /// status `Stopped`.
    pub async fn start(
        &self,
        graph: &WorkflowGraph,
        user_input: Option<String>,
    ) -> Result<ExecutionRecord> {
        {
            let mut guard = self.record.lock().unwrap();
            if matches!(guard.as_ref(), Some(r) if r.status == RunStatus::Running) {
                return Err(TrellisError::RunInProgress);
            }
            *guard = Some(ExecutionRecord::new(user_input.clone()));
        }
        self.outputs.lock().unwrap().clear();

        if let Some(input) = &user_input {
            self.push(
                LogEntry::new(LogKind::UserInput, USER.0, USER.1, input.clone())
                    .with_input(json!({ "userInput": input })),
            );
        }
        self.log(SYSTEM, LogKind::Info, "Starting workflow execution");

        if let Some(model) = self.options.default_model.clone() {
            self.log(MODEL, LogKind::Info, "Loading model into memory...");
            if let Err(e) = self.client.preload_model(&model).await {
                self.log(MODEL, LogKind::Error, format!("Failed to load model: {}", e));
                self.finish(RunStatus::Error);
                return Err(e);
            }
            self.log(MODEL, LogKind::Info, "Model loaded successfully");
        }

        match self.traverse(graph, user_input.as_deref()).await {
            Ok(()) => {
                if self.status() == Some(RunStatus::Running) {
                    self.finish(RunStatus::Completed);
                    self.log(SYSTEM, LogKind::Success, "Workflow completed successfully");
                }
            }
            Err(e) => {
                self.finish(RunStatus::Error);
                self.log(SYSTEM, LogKind::Error, format!("Execution failed: {}", e));
                return Err(e);
            }
        }

        // The record was installed at the top of this call.
        Ok(self
            .record
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ExecutionRecord::new(None)))
    }

    /// Depth-first traversal over an explicit work stack.
    ///
    /// The status check at the top of the loop is the sole cancellation
    /// point: a stop request takes effect before the next node dispatch.
    async fn traverse(&self, graph: &WorkflowGraph, user_input: Option<&str>) -> Result<()> {
        let start = graph.start_node().ok_or(TrellisError::MissingStartNode)?;

        if let Some(input) = user_input {
            self.outputs.lock().unwrap().insert(
                start.id.clone(),
                json!({ "input": input, "timestamp": now() }),
            );
        }

        let mut stack = vec![start.id.clone()];
        let mut steps = 0usize;

        while let Some(node_id) = stack.pop() {
            if self.status() != Some(RunStatus::Running) {
                return Ok(());
            }
            steps += 1;
            if steps > self.options.max_steps {
                return Err(TrellisError::TraversalLimitExceeded(self.options.max_steps));
            }

            let node = graph.node(&node_id)?;
            self.set_current(&node.id);
            self.log_node(
                node,
                LogKind::NodeStart,
                format!("Executing {} [{}]", node.id, node.label),
            );

            let step = match self.dispatch(node, graph).await {
                Ok(step) => step,
                Err(e) => {
                    self.log_node(
                        node,
                        LogKind::Error,
                        format!("Error in {} [{}]: {}", node.id, node.label, e),
                    );
                    return Err(e);
                }
            };

            self.outputs
                .lock()
                .unwrap()
                .insert(node.id.clone(), step.output.clone());
            self.push(
                LogEntry::new(
                    LogKind::NodeComplete,
                    &node.id,
                    &node.label,
                    format!("{} [{}] completed", node.id, node.label),
                )
                .with_output(step.output),
            );

            match step.advance {
                Advance::Follow => {
                    let targets: Vec<String> = graph
                        .normal_edges(&node.id)
                        .map(|e| e.target.clone())
                        .collect();
                    // Reverse push: the first declared edge is popped
                    // first, so order matches sequential recursion.
                    for target in targets.into_iter().rev() {
                        stack.push(target);
                    }
                }
                Advance::Goto(target) => stack.push(target),
                Advance::Halt => {}
            }
        }

        Ok(())
    }

    async fn dispatch(&self, node: &WorkflowNode, graph: &WorkflowGraph) -> Result<Step> {
        match node.kind {
            NodeKind::Start => Ok(self.run_start(node)),
            NodeKind::Agentic => self.run_agentic(node).await,
            NodeKind::Decision => Ok(self.run_decision(node, graph)),
            NodeKind::Memory => Ok(self.run_memory(node)),
            NodeKind::End => Ok(self.run_end(node)),
        }
    }

    fn run_start(&self, node: &WorkflowNode) -> Step {
        // Passes the seeded user input along, if any.
        let output = self
            .outputs
            .lock()
            .unwrap()
            .get(&node.id)
            .cloned()
            .unwrap_or_else(|| json!({ "status": "started", "timestamp": now() }));

        self.log_node(
            node,
            LogKind::Info,
            format!("{} [{}] - start node processed", node.id, node.label),
        );
        Step {
            output,
            advance: Advance::Follow,
        }
    }

    async fn run_agentic(&self, node: &WorkflowNode) -> Result<Step> {
        if node.system_prompt.is_none() && node.user_prompt.is_none() {
            self.log_node(
                node,
                LogKind::Info,
                format!(
                    "{} [{}] - no prompts defined, skipping execution",
                    node.id, node.label
                ),
            );
            return Ok(Step {
                output: json!({ "status": "skipped", "reason": "no_prompts" }),
                advance: Advance::Follow,
            });
        }

        let model = self
            .options
            .default_model
            .clone()
            .ok_or(TrellisError::ModelNotConfigured)?;

        self.log_node(
            node,
            LogKind::Info,
            format!("{} [{}] - preparing prompts...", node.id, node.label),
        );

        let store = self.outputs.lock().unwrap().clone();
        let system = resolve_template(node.system_prompt.as_deref().unwrap_or(""), &store);
        let user = resolve_template(node.user_prompt.as_deref().unwrap_or(""), &store);
        self.log_unresolved(node, system.unresolved.iter().chain(&user.unresolved));

        self.log_node(
            node,
            LogKind::Info,
            format!("{} [{}] - sending request to model...", node.id, node.label),
        );

        let response = match self
            .client
            .generate(
                &model,
                &system.text,
                &user.text,
                node.output_format.as_deref(),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                self.log_node(
                    node,
                    LogKind::Error,
                    format!("{} [{}] - model request failed: {}", node.id, node.label, e),
                );
                return Err(e);
            }
        };

        // Structured responses pass through as JSON; everything else is
        // wrapped so downstream references still have a field to hit.
        let output = serde_json::from_str::<Value>(&response)
            .unwrap_or_else(|_| json!({ "response": response, "raw": true }));

        self.push(
            LogEntry::new(
                LogKind::Success,
                &node.id,
                &node.label,
                format!("{} [{}] - model response received", node.id, node.label),
            )
            .with_output(output.clone()),
        );

        Ok(Step {
            output,
            advance: Advance::Follow,
        })
    }

    fn run_decision(&self, node: &WorkflowNode, graph: &WorkflowGraph) -> Step {
        self.log_node(
            node,
            LogKind::Info,
            format!("{} [{}] - evaluating decision rules...", node.id, node.label),
        );

        if node.decisions.is_empty() {
            self.log_node(
                node,
                LogKind::Info,
                format!("{} [{}] - decision node has no rules", node.id, node.label),
            );
            return Step {
                output: json!({ "status": "no_decisions", "timestamp": now() }),
                advance: Advance::Halt,
            };
        }

        let store = self.outputs.lock().unwrap().clone();

        for rule in &node.decisions {
            self.log_node(
                node,
                LogKind::Info,
                format!(
                    "{} [{}] - testing condition: {}",
                    node.id, node.label, rule.condition
                ),
            );

            let eval = evaluate_condition(&rule.condition, &store);
            self.log_unresolved(node, eval.unresolved.iter());

            match eval.verdict {
                Verdict::Unsupported => {
                    self.log_node(
                        node,
                        LogKind::Error,
                        format!(
                            "{} [{}] - unsupported condition: {} (resolved: {})",
                            node.id, node.label, rule.condition, eval.resolved
                        ),
                    );
                    // Treated as false; the run continues.
                }
                Verdict::False => {}
                Verdict::True => {
                    self.log_node(
                        node,
                        LogKind::Success,
                        format!("{} [{}] - decision taken: {}", node.id, node.label, rule.label),
                    );

                    return match graph.decision_edge(&node.id, &rule.id) {
                        Some(edge) => Step {
                            output: json!({
                                "decision": rule.label,
                                "targetNode": edge.target,
                                "timestamp": now(),
                            }),
                            advance: Advance::Goto(edge.target.clone()),
                        },
                        None => {
                            self.log_node(
                                node,
                                LogKind::Info,
                                format!(
                                    "{} [{}] - decision {} has no outgoing connection",
                                    node.id, node.label, rule.label
                                ),
                            );
                            Step {
                                output: json!({
                                    "decision": rule.label,
                                    "targetNode": null,
                                    "timestamp": now(),
                                }),
                                advance: Advance::Halt,
                            }
                        }
                    };
                }
            }
        }

        self.log_node(
            node,
            LogKind::Warning,
            format!("{} [{}] - no decision condition was met", node.id, node.label),
        );
        Step {
            output: json!({ "status": "no_decision", "timestamp": now() }),
            advance: Advance::Halt,
        }
    }

    fn run_memory(&self, node: &WorkflowNode) -> Step {
        let store = self.outputs.lock().unwrap().clone();
        let context = resolve_template(node.context.as_deref().unwrap_or(""), &store);
        self.log_unresolved(node, context.unresolved.iter());

        self.log_node(
            node,
            LogKind::Database,
            format!(
                "{} [{}] - storing context: {}",
                node.id, node.label, context.text
            ),
        );

        let output = json!({
            "context": context.text,
            "stored": true,
            "timestamp": now(),
        });

        self.push(
            LogEntry::new(
                LogKind::Database,
                &node.id,
                &node.label,
                format!("{} [{}] - context stored", node.id, node.label),
            )
            .with_output(output.clone()),
        );

        Step {
            output,
            advance: Advance::Follow,
        }
    }

    fn run_end(&self, node: &WorkflowNode) -> Step {
        self.log_node(
            node,
            LogKind::Info,
            format!("{} [{}] - end node reached", node.id, node.label),
        );

        let output = json!({
            "status": "completed",
            "timestamp": now(),
            "finalNode": true,
            "message": "Workflow finished successfully",
        });

        self.push(
            LogEntry::new(
                LogKind::Success,
                &node.id,
                &node.label,
                format!("{} [{}] - workflow finished", node.id, node.label),
            )
            .with_output(output.clone()),
        );

        Step {
            output,
            advance: Advance::Follow,
        }
    }

    fn log_unresolved<'a>(
        &self,
        node: &WorkflowNode,
        tokens: impl Iterator<Item = &'a String>,
    ) {
        for token in tokens {
            self.log_node(
                node,
                LogKind::Info,
                format!(
                    "{} [{}] - variable {} could not be resolved",
                    node.id, node.label, token
                ),
            );
        }
    }

    fn set_current(&self, node_id: &str) {
        if let Some(record) = self.record.lock().unwrap().as_mut() {
            record.current_node_id = Some(node_id.to_string());
        }
    }

    fn finish(&self, status: RunStatus) {
        if let Some(record) = self.record.lock().unwrap().as_mut() {
            record.status = status;
            record.end_time = Some(Utc::now());
        }
    }

    fn log(&self, scope: (&str, &str), kind: LogKind, message: impl Into<String>) {
        self.push(LogEntry::new(kind, scope.0, scope.1, message));
    }

    fn log_node(&self, node: &WorkflowNode, kind: LogKind, message: impl Into<String>) {
        self.push(LogEntry::new(kind, &node.id, &node.label, message));
    }

    fn push(&self, entry: LogEntry) {
        if let Some(record) = self.record.lock().unwrap().as_mut() {
            record.log.push(entry.clone());
        }
        self.emit(&entry);
    }

    fn emit(&self, entry: &LogEntry) {
        debug!(
            kind = %entry.kind,
            node_id = %entry.node_id,
            message = %entry.message,
            "log entry"
        );
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink(entry);
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}
