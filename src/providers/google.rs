use crate::config::ProviderConfig;
use crate::error::ScanError;
use crate::providers::{ensure_success, read_event_stream, CompletionRequest, LlmProvider};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` provider
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GoogleProvider {
    /// Create a new Google Gemini provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, String> {
        // Try config first, then the two environment variable spellings
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or("GEMINI_API_KEY not found in config or environment")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(GoogleProvider {
            client: Client::new(),
            api_key,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    #[doc(hidden)]
    pub fn with_base_url(api_key: String, base_url: String, model: String) -> Self {
        GoogleProvider {
            client: Client::new(),
            api_key,
            base_url,
            model,
            temperature: 0.3,
            max_tokens: 3072,
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut parts = vec![json!({"text": request.user_text})];
        parts.extend(request.images.iter().map(|image| {
            json!({"inline_data": {"mime_type": image.mime_type, "data": image.base64}})
        }));

        json!({
            "systemInstruction": {"parts": [{"text": request.system_prompt}]},
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {
                "temperature": request.temperature.unwrap_or(self.temperature),
                "maxOutputTokens": request.max_tokens.unwrap_or(self.max_tokens)
            }
        })
    }

    fn url(&self, method: &str, query: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}?{}key={}",
            self.base_url, self.model, method, query, self.api_key
        )
    }

    async fn post(&self, url: String, request: &CompletionRequest) -> Result<reqwest::Response, ScanError> {
        let response = self.client.post(url).json(&self.body(request)).send().await?;
        ensure_success(self.provider_name(), response).await
    }
}

/// Concatenate the text parts of the first candidate
fn candidate_text(body: &Value) -> Option<String> {
    let parts = body["candidates"][0]["content"]["parts"].as_array()?;
    Some(parts.iter().filter_map(|part| part["text"].as_str()).collect())
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn provider_name(&self) -> &str {
        "google"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ScanError> {
        let response = self.post(self.url("generateContent", ""), request).await?;

        let response_body: Value = response.json().await?;
        debug!("{:?}", response_body);

        candidate_text(&response_body)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ScanError::api("No content in Gemini response"))
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String, ScanError> {
        let response = self
            .post(self.url("streamGenerateContent", "alt=sse&"), request)
            .await?;
        read_event_stream(self.provider_name(), response, candidate_text, on_text).await
    }
}
