//! Import of the authored workflow document.
//!
//! The editor exports a JSON document of node records; `nextNodes` entries
//! compile to normal edges and `decisions[]` entries to decision edges
//! keyed by the rule id. Entries pointing at ids absent from the document
//! are dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::graph::{DecisionRule, Edge, NodeKind, WorkflowGraph, WorkflowNode};

/// A node record as authored in the workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub next_nodes: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<DecisionRule>,
}

/// Generation settings embedded in a workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub default_model: String,
    #[serde(default)]
    pub ollama_address: Option<String>,
    #[serde(default)]
    pub available_models: Vec<String>,
}

/// A complete authored workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDoc {
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub config: Option<WorkflowConfig>,
}

impl WorkflowDoc {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compile the document into a runnable graph.
    ///
    /// Fails on an unrecognized `nodeType`; a missing `nodeType` defaults
    /// to agentic, matching the editor's behavior.
    pub fn compile(&self) -> Result<WorkflowGraph> {
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();

        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut edges = Vec::new();

        for record in &self.nodes {
            let kind = match &record.node_type {
                Some(s) => NodeKind::parse(s)?,
                None => NodeKind::Agentic,
            };

            nodes.push(WorkflowNode {
                id: record.id.clone(),
                kind,
                label: record.name.clone(),
                system_prompt: record.system_prompt.clone(),
                user_prompt: record.user_prompt.clone(),
                output_format: record.output_format.clone(),
                context: record.context.clone(),
                decisions: record.decisions.clone(),
            });

            for next in &record.next_nodes {
                if !known.contains(next.as_str()) {
                    debug!(source = %record.id, target = %next, "Dropping edge to unknown node");
                    continue;
                }
                edges.push(Edge::normal(&record.id, next));
            }

            for rule in &record.decisions {
                if rule.target_node_id.is_empty() || !known.contains(rule.target_node_id.as_str())
                {
                    debug!(source = %record.id, rule = %rule.id, "Dropping decision edge to unknown node");
                    continue;
                }
                edges.push(Edge::decision(
                    &record.id,
                    &rule.target_node_id,
                    &rule.id,
                    &rule.label,
                ));
            }
        }

        Ok(WorkflowGraph::new(nodes, edges))
    }
}
