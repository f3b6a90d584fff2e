use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TrellisError};

/// The closed set of step behaviors a node can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Agentic,
    Decision,
    Memory,
    End,
}

impl NodeKind {
    /// Parse the free-form kind string used by the workflow document format.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Self::Start),
            "agentic" => Ok(Self::Agentic),
            "decision" => Ok(Self::Decision),
            "memory" => Ok(Self::Memory),
            "end" => Ok(Self::End),
            other => Err(TrellisError::UnknownNodeKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Agentic => "agentic",
            Self::Decision => "decision",
            Self::Memory => "memory",
            Self::End => "end",
        };
        write!(f, "{}", s)
    }
}

/// A branch rule on a decision node.
///
/// The rule id doubles as the edge handle: the outgoing edge whose
/// `source_handle` equals this id is the branch taken when `condition`
/// evaluates true.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRule {
    pub id: String,
    pub condition: String,
    pub label: String,
    pub target_node_id: String,
}

/// A node in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within the graph.
    pub id: String,
    pub kind: NodeKind,
    /// Human-readable name, used in log entries.
    pub label: String,
    /// System prompt template (agentic nodes).
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// User prompt template (agentic nodes).
    #[serde(default)]
    pub user_prompt: Option<String>,
    /// Hint appended to the prompt describing the expected output shape.
    #[serde(default)]
    pub output_format: Option<String>,
    /// Context template (memory nodes).
    #[serde(default)]
    pub context: Option<String>,
    /// Branch rules (decision nodes), evaluated in declared order.
    #[serde(default)]
    pub decisions: Vec<DecisionRule>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            system_prompt: None,
            user_prompt: None,
            output_format: None,
            context: None,
            decisions: vec![],
        }
    }

    /// Set the system and user prompt templates.
    pub fn with_prompts(
        mut self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        self.system_prompt = Some(system.into());
        self.user_prompt = Some(user.into());
        self
    }

    /// Set the expected output format hint.
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    /// Set the context template.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the decision rules.
    pub fn with_decisions(mut self, decisions: Vec<DecisionRule>) -> Self {
        self.decisions = decisions;
        self
    }
}

/// An edge connecting two nodes.
///
/// Edges without a `label` are normal edges, taken unconditionally during
/// generic advancement. An edge whose `source_handle` matches a decision
/// rule's id is that rule's branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub source_handle: Option<String>,
}

impl Edge {
    /// Create a normal (unconditional) edge.
    pub fn normal(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: None,
            source_handle: None,
        }
    }

    /// Create a decision edge for the given rule handle.
    pub fn decision(
        source: impl Into<String>,
        target: impl Into<String>,
        handle: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: Some(label.into()),
            source_handle: Some(handle.into()),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.label.is_none()
    }
}

/// Read-only view over the nodes and edges supplied at run start.
///
/// Authoring belongs to the editor layer; the engine only queries.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    nodes: Vec<WorkflowNode>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Build a graph from nodes and edges.
    ///
    /// Node ids are expected to be unique; on a duplicate the first
    /// occurrence wins.
    pub fn new(nodes: Vec<WorkflowNode>, edges: Vec<Edge>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.contains_key(&node.id) {
                warn!(node_id = %node.id, "Duplicate node id in graph, keeping first");
                continue;
            }
            index.insert(node.id.clone(), i);
        }
        Self {
            nodes,
            index,
            edges,
        }
    }

    /// Look up a node by id.
    pub fn get(&self, id: &str) -> Option<&WorkflowNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Look up a node by id, failing if absent.
    pub fn node(&self, id: &str) -> Result<&WorkflowNode> {
        self.get(id)
            .ok_or_else(|| TrellisError::NodeNotFound(id.to_string()))
    }

    /// The first node of kind Start, in declaration order.
    pub fn start_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    /// Normal (label-less) outgoing edges of a node, in declaration order.
    pub fn normal_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges
            .iter()
            .filter(move |e| e.source == id && e.is_normal())
    }

    /// The decision edge for a rule handle, if one is connected.
    pub fn decision_edge(&self, id: &str, handle: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.source == id && e.source_handle.as_deref() == Some(handle))
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
