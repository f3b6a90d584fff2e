use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Graph errors
    #[error("Workflow has no start node")]
    MissingStartNode,

    #[error("Node '{0}' not found in graph")]
    NodeNotFound(String),

    #[error("Unknown node kind: {0}")]
    UnknownNodeKind(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    // Engine errors
    #[error("A run is already in progress")]
    RunInProgress,

    #[error("Traversal exceeded {0} steps")]
    TraversalLimitExceeded(usize),

    #[error("No generation model configured")]
    ModelNotConfigured,

    // Inference errors
    #[error("Inference request failed: {0}")]
    Inference(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
