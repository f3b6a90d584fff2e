use futures::future::BoxFuture;

use crate::error::Result;

/// Inference service client — the four operations the engine depends on.
///
/// Implementations are expected to be fallible, asynchronous, and
/// potentially slow; the engine performs no retries of its own. The engine
/// receives an `Arc<dyn InferenceClient>` at construction, so test doubles
/// slot in without touching engine code.
pub trait InferenceClient: Send + Sync + 'static {
    /// Whether the service is reachable.
    fn test_connection(&self) -> BoxFuture<'_, bool>;

    /// Names of the models the service has available.
    fn list_models(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Ensure the model is resident in memory.
    ///
    /// Idempotent for a model already marked loaded. On success a periodic
    /// keep-alive ping keeps the model from being evicted between
    /// generation calls.
    fn preload_model<'a>(&'a self, model: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Single non-streaming generation round trip.
    fn generate<'a>(
        &'a self,
        model: &'a str,
        system_prompt: &'a str,
        user_prompt: &'a str,
        output_format: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>>;
}
