mod factory;
mod google;
mod open_ai;
mod sse;

pub use factory::ProviderFactory;
pub use google::GoogleProvider;
pub use open_ai::OpenAIProvider;
pub use sse::{SseDecoder, SseEvent};

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Response;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;
use crate::images::PreparedImage;

/// One image attached to a completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub base64: String,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

impl From<&PreparedImage> for ImagePayload {
    fn from(image: &PreparedImage) -> Self {
        Self {
            base64: image.base64.clone(),
            mime_type: image.mime_type.to_string(),
        }
    }
}

/// Provider-neutral description of a single model call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_text: String,
    pub images: Vec<ImagePayload>,
    /// Overrides the provider's configured budget
    pub max_tokens: Option<u32>,
    /// Overrides the provider's configured temperature
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_text: user_text.into(),
            ..Default::default()
        }
    }

    pub fn with_images(mut self, images: Vec<ImagePayload>) -> Self {
        self.images = images;
        self
    }

    pub fn with_budget(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = Some(max_tokens);
        self.temperature = Some(temperature);
        self
    }
}

/// Unified trait for vision-capable chat providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "google")
    fn provider_name(&self) -> &str;

    /// Single-shot completion returning the model's text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ScanError>;

    /// Streaming completion. `on_text` receives each text increment in
    /// arrival order; the accumulated text is returned at the end.
    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String, ScanError>;
}

/// Run a provider call under a deadline and a cancellation token.
///
/// A missed deadline is a [`ScanError::NetworkError`]; cancellation is a
/// recoverable [`ScanError::ApiError`]. An already-cancelled token wins over a
/// call that is ready immediately.
pub async fn guarded<T, F>(
    call: F,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, ScanError>
where
    F: Future<Output = Result<T, ScanError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ScanError::api("Request cancelled")),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(inner) => inner,
            Err(_) => Err(ScanError::network(format!(
                "Request timed out after {}s",
                timeout.as_secs()
            ))),
        },
    }
}

/// Turn a non-success status into a recoverable API error carrying the body
pub(crate) async fn ensure_success(
    provider: &str,
    response: Response,
) -> Result<Response, ScanError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!("{} error body: {}", provider, body);
    Err(ScanError::api(format!(
        "{provider} request failed with status {status}"
    )))
}

/// Drain an event-stream body, handing every extracted text increment to
/// `on_text`. Chunks that are not valid JSON are logged and skipped.
pub(crate) async fn read_event_stream(
    provider: &str,
    mut response: Response,
    extract: fn(&Value) -> Option<String>,
    on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
) -> Result<String, ScanError> {
    let mut decoder = SseDecoder::default();
    let mut full = String::new();

    let mut handle = |event: SseEvent, full: &mut String| {
        let SseEvent::Data(data) = event else {
            return;
        };
        match serde_json::from_str::<Value>(&data) {
            Ok(value) => {
                if let Some(text) = extract(&value).filter(|t| !t.is_empty()) {
                    full.push_str(&text);
                    on_text(&text);
                }
            }
            Err(e) => warn!("Skipping malformed {} stream chunk: {}", provider, e),
        }
    };

    while let Some(chunk) = response.chunk().await? {
        for event in decoder.feed(&chunk) {
            handle(event, &mut full);
        }
    }
    for event in decoder.finish() {
        handle(event, &mut full);
    }

    Ok(full)
}
