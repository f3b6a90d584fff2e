use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trellis_core::config::OllamaSettings;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::InferenceClient;

// Request types
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    keep_alive: String,
}

// Response types
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Default)]
struct ModelState {
    current: Option<String>,
    loaded: bool,
}

/// Ollama HTTP client.
///
/// Talks to `/api/tags` for connectivity and model listing and to
/// `/api/generate` for preload, keep-alive pings, and generation. A
/// successful preload starts a background task that pings the service
/// periodically so the model stays resident between generation calls.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    keep_alive: String,
    keep_alive_interval: Duration,
    state: Mutex<ModelState>,
    pinger: Mutex<Option<CancellationToken>>,
}

impl OllamaClient {
    pub fn new(settings: &OllamaSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| TrellisError::Inference(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            keep_alive: settings.keep_alive.clone(),
            keep_alive_interval: Duration::from_secs(settings.keep_alive_interval_secs),
            state: Mutex::new(ModelState::default()),
            pinger: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn generate_body(&self, model: &str, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            keep_alive: self.keep_alive.clone(),
        }
    }

    async fn post_generate(&self, body: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self
            .http
            .post(self.endpoint("generate"))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                TrellisError::Inference(format!(
                    "failed to reach Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(TrellisError::Inference(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| TrellisError::Inference(format!("malformed generate response: {}", e)))
    }

    async fn fetch_tags(&self) -> Result<TagsResponse> {
        let response = self
            .http
            .get(self.endpoint("tags"))
            .send()
            .await
            .map_err(|e| {
                TrellisError::Inference(format!(
                    "failed to reach Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(TrellisError::Inference(format!(
                "HTTP {} from model listing",
                response.status()
            )));
        }

        response
            .json::<TagsResponse>()
            .await
            .map_err(|e| TrellisError::Inference(format!("malformed tags response: {}", e)))
    }

    async fn preload(&self, model: &str) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.loaded && state.current.as_deref() == Some(model) {
                debug!(model, "Model already loaded");
                return Ok(());
            }
        }

        info!(model, "Preloading model");
        {
            let mut state = self.state.lock().unwrap();
            state.current = Some(model.to_string());
            state.loaded = false;
        }

        // A tiny generation round trip forces the model into memory.
        let body = self.generate_body(model, "Hello");
        self.post_generate(&body).await?;

        self.state.lock().unwrap().loaded = true;
        info!(model, "Model loaded");
        self.start_keep_alive(model);
        Ok(())
    }

    /// Spawn (or replace) the periodic keep-alive ping for a model.
    fn start_keep_alive(&self, model: &str) {
        let token = CancellationToken::new();
        if let Some(old) = self.pinger.lock().unwrap().replace(token.clone()) {
            old.cancel();
        }

        let http = self.http.clone();
        let url = self.endpoint("generate");
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: "ping".to_string(),
            stream: false,
            keep_alive: self.keep_alive.clone(),
        };
        let interval = self.keep_alive_interval;
        let model = model.to_string();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the model was just loaded.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(model, "Keep-alive stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match http.post(&url).json(&body).send().await {
                            Ok(resp) if resp.status().is_success() => {
                                debug!(model, "Keep-alive ping ok");
                            }
                            Ok(resp) => {
                                warn!(model, status = %resp.status(), "Keep-alive ping rejected");
                            }
                            Err(e) => {
                                warn!(model, error = %e, "Keep-alive ping failed");
                            }
                        }
                    }
                }
            }
        });
    }

    /// Cancel the background keep-alive ping, if any.
    pub fn stop_keep_alive(&self) {
        if let Some(token) = self.pinger.lock().unwrap().take() {
            token.cancel();
        }
    }
}

impl Drop for OllamaClient {
    fn drop(&mut self) {
        self.stop_keep_alive();
    }
}

/// Flatten system prompt, user prompt, and format hint into the single
/// prompt string `/api/generate` accepts.
fn compose_prompt(system_prompt: &str, user_prompt: &str, output_format: Option<&str>) -> String {
    let mut prompt = String::new();
    if !system_prompt.is_empty() {
        prompt.push_str("System: ");
        prompt.push_str(system_prompt);
        prompt.push_str("\n\n");
    }
    if !user_prompt.is_empty() {
        prompt.push_str("User: ");
        prompt.push_str(user_prompt);
        prompt.push_str("\n\n");
    }
    if let Some(format) = output_format {
        if !format.is_empty() {
            prompt.push_str("Expected output format: ");
            prompt.push_str(format);
            prompt.push_str("\n\n");
        }
    }
    prompt
}

impl InferenceClient for OllamaClient {
    fn test_connection(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.fetch_tags().await.is_ok() })
    }

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let tags = self.fetch_tags().await?;
            Ok(tags.models.into_iter().map(|m| m.name).collect())
        })
    }

    fn preload_model<'a>(&'a self, model: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.preload(model))
    }

    fn generate<'a>(
        &'a self,
        model: &'a str,
        system_prompt: &'a str,
        user_prompt: &'a str,
        output_format: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            // Idempotent when the model is already resident.
            self.preload(model).await?;

            let prompt = compose_prompt(system_prompt, user_prompt, output_format);
            debug!(model, prompt_len = prompt.len(), "Sending generate request");

            let body = self.generate_body(model, &prompt);
            let response = self.post_generate(&body).await?;
            debug!(model, done = response.done, "Generate response received");
            Ok(response.response)
        })
    }
}
