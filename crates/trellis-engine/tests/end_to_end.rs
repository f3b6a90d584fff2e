//! Full-run scenario: Start → Agentic → Decision branching to one of two
//! end nodes, with the log streamed through a sink.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use trellis_core::error::Result;
use trellis_core::graph::{DecisionRule, Edge, NodeKind, WorkflowGraph, WorkflowNode};
use trellis_core::run::{LogKind, RunStatus};
use trellis_core::traits::InferenceClient;
use trellis_engine::{EngineOptions, WorkflowEngine};

/// Always answers with a positive sentiment classification.
struct SentimentClient;

impl InferenceClient for SentimentClient {
    fn test_connection(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async { Ok(vec!["test-model".to_string()]) })
    }

    fn preload_model<'a>(&'a self, _model: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn generate<'a>(
        &'a self,
        _model: &'a str,
        _system_prompt: &'a str,
        user_prompt: &'a str,
        _output_format: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        let prompt = user_prompt.to_string();
        Box::pin(async move {
            assert!(prompt.contains("hello"), "user input should reach the prompt");
            Ok(r#"{"sentiment": "positive"}"#.to_string())
        })
    }
}

fn sentiment_graph() -> WorkflowGraph {
    let nodes = vec![
        WorkflowNode::new("START_01", "Entry", NodeKind::Start),
        WorkflowNode::new("AGENT_01", "Classifier", NodeKind::Agentic)
            .with_prompts("You classify sentiment.", "Classify: {START_01.input}")
            .with_output_format(r#"{"sentiment": "positive|negative"}"#),
        WorkflowNode::new("DEC_01", "Router", NodeKind::Decision).with_decisions(vec![
            DecisionRule {
                id: "d-pos".into(),
                condition: r#"{AGENT_01.sentiment} == "positive""#.into(),
                label: "Positive".into(),
                target_node_id: "END_A".into(),
            },
            DecisionRule {
                id: "d-neg".into(),
                condition: r#"{AGENT_01.sentiment} == "negative""#.into(),
                label: "Negative".into(),
                target_node_id: "END_B".into(),
            },
        ]),
        WorkflowNode::new("END_A", "Positive End", NodeKind::End),
        WorkflowNode::new("END_B", "Negative End", NodeKind::End),
    ];
    let edges = vec![
        Edge::normal("START_01", "AGENT_01"),
        Edge::normal("AGENT_01", "DEC_01"),
        Edge::decision("DEC_01", "END_A", "d-pos", "Positive"),
        Edge::decision("DEC_01", "END_B", "d-neg", "Negative"),
    ];
    WorkflowGraph::new(nodes, edges)
}

/// Assert `wanted` appears as an ordered subsequence of the run's
/// (kind, node_id) log pairs.
fn assert_log_subsequence(log: &[(LogKind, String)], wanted: &[(LogKind, &str)]) {
    let mut it = log.iter();
    for (kind, node_id) in wanted {
        assert!(
            it.any(|(k, n)| k == kind && n == node_id),
            "missing log entry {:?} {} after previous match; full log: {:?}",
            kind,
            node_id,
            log
        );
    }
}

#[tokio::test]
async fn test_sentiment_workflow_reaches_positive_end() {
    let engine = WorkflowEngine::new(
        Arc::new(SentimentClient),
        EngineOptions {
            default_model: Some("test-model".into()),
            max_steps: 100,
        },
    );

    let streamed: Arc<Mutex<Vec<(LogKind, String)>>> = Arc::new(Mutex::new(vec![]));
    engine.set_log_sink({
        let streamed = streamed.clone();
        move |entry| {
            streamed
                .lock()
                .unwrap()
                .push((entry.kind, entry.node_id.clone()));
        }
    });

    let record = engine
        .start(&sentiment_graph(), Some("hello".into()))
        .await
        .unwrap();

    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.end_time.is_some());
    assert_eq!(record.user_input.as_deref(), Some("hello"));

    let pairs: Vec<(LogKind, String)> = record
        .log
        .iter()
        .map(|e| (e.kind, e.node_id.clone()))
        .collect();

    assert_log_subsequence(
        &pairs,
        &[
            (LogKind::UserInput, "USER"),
            (LogKind::Info, "SYSTEM"),
            (LogKind::NodeStart, "START_01"),
            (LogKind::NodeComplete, "START_01"),
            (LogKind::NodeStart, "AGENT_01"),
            (LogKind::NodeComplete, "AGENT_01"),
            (LogKind::NodeStart, "DEC_01"),
            (LogKind::Success, "DEC_01"),
            (LogKind::NodeStart, "END_A"),
            (LogKind::NodeComplete, "END_A"),
            (LogKind::Success, "SYSTEM"),
        ],
    );

    // The negative branch was never traversed
    assert!(!pairs
        .iter()
        .any(|(kind, node)| *kind == LogKind::NodeStart && node == "END_B"));

    // The sink saw every entry, in the same order, as it was appended
    assert_eq!(*streamed.lock().unwrap(), pairs);

    // Every traversed node has a stored output; END_B does not
    let outputs = engine.node_outputs();
    assert_eq!(outputs.get("AGENT_01").unwrap()["sentiment"], "positive");
    assert_eq!(outputs.get("DEC_01").unwrap()["targetNode"], "END_A");
    assert_eq!(outputs.get("END_A").unwrap()["status"], "completed");
    assert!(outputs.get("END_B").is_none());
}

#[tokio::test]
async fn test_variable_roundtrip_through_memory_node() {
    let engine = WorkflowEngine::new(Arc::new(SentimentClient), EngineOptions::default());

    let nodes = vec![
        WorkflowNode::new("S", "Start", NodeKind::Start),
        WorkflowNode::new("M", "Recap", NodeKind::Memory)
            .with_context("user said {S.input}, pending {S.missing}"),
    ];
    let graph = WorkflowGraph::new(nodes, vec![Edge::normal("S", "M")]);

    let record = engine.start(&graph, Some("hi".into())).await.unwrap();
    assert_eq!(record.status, RunStatus::Completed);

    let context = engine.node_outputs().get("M").cloned().unwrap();
    // Resolved strings are quoted; the missing token stays verbatim
    assert_eq!(context["context"], "user said \"hi\", pending {S.missing}");
    assert_eq!(context["stored"], true);

    // The unresolved variable surfaced as an informational entry
    assert!(record
        .log
        .iter()
        .any(|e| e.kind == LogKind::Info && e.message.contains("{S.missing}")));
}
