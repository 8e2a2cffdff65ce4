use crate::config::ProviderConfig;
use crate::error::ScanError;
use crate::providers::{
    ensure_success, read_event_stream, CompletionRequest, LlmProvider,
};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, String> {
        // Try config first, then fall back to environment variable
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or("OPENAI_API_KEY not found in config or environment")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(OpenAIProvider {
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
        OpenAIProvider {
            client: Client::new(),
            api_key,
            base_url,
            model,
            temperature: 0.3,
            max_tokens: 3072,
        }
    }

    fn body(&self, request: &CompletionRequest, stream: bool) -> Value {
        // Text-only calls send a plain string; vision calls send content parts
        let user_content = if request.images.is_empty() {
            json!(request.user_text)
        } else {
            let mut parts = vec![json!({"type": "text", "text": request.user_text})];
            parts.extend(request.images.iter().map(|image| {
                json!({"type": "image_url", "image_url": {"url": image.data_url()}})
            }));
            Value::Array(parts)
        };

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": user_content}
            ],
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": stream
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ScanError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;
        ensure_success(self.provider_name(), response).await
    }
}

fn delta_text(chunk: &Value) -> Option<String> {
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ScanError> {
        let response = self.post(&self.body(request, false)).await?;

        let response_body: Value = response.json().await?;
        debug!("{:?}", response_body);
        let content = response_body["choices"][0]["message"]["content"]
            .as_str()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ScanError::api("No content in OpenAI response"))?
            .to_string();

        Ok(content)
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String, ScanError> {
        let response = self.post(&self.body(request, true)).await?;
        read_event_stream(self.provider_name(), response, delta_text, on_text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ImagePayload;
    use mockito::{Matcher, Server};

    fn provider(url: String) -> OpenAIProvider {
        OpenAIProvider::with_base_url("fake_api_key".to_string(), url, "gpt-4o".to_string())
    }

    fn vision_request() -> CompletionRequest {
        CompletionRequest::new("system", "Analyze this image and generate a recipe.").with_images(
            vec![ImagePayload {
                base64: "QUJD".to_string(),
                mime_type: "image/jpeg".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_complete_sends_image_parts() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer fake_api_key")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "system"},
                    {"role": "user", "content": [
                        {"type": "text", "text": "Analyze this image and generate a recipe."},
                        {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,QUJD"}}
                    ]}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": "[\"eggs\"]"}}]}"#)
            .create_async()
            .await;

        let result = provider(server.url()).complete(&vision_request()).await.unwrap();
        assert_eq!(result, "[\"eggs\"]");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_api_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body(r#"{"error": "boom"}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .complete(&vision_request())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::ApiError {
                recoverable: true,
                ..
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_content_is_recoverable() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": ""}}]}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .complete(&vision_request())
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::api("No content in OpenAI response"));
    }

    #[tokio::test]
    async fn test_stream_accumulates_in_order_and_skips_garbage() {
        let mut server = Server::new_async().await;
        let body = [
            r#"data: {"choices":[{"delta":{"content":"The"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":" n"}}]}"#,
            "data: {not json",
            r#"data: {"choices":[{"delta":{"content":"ew reci"}}]}"#,
            r#"data: {"choices":[{"delta":{}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"pe is"}}]}"#,
            "data: [DONE]",
        ]
        .join("\n\n");
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let mut seen = Vec::new();
        let full = provider(server.url())
            .complete_stream(&vision_request(), &mut |text: &str| seen.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["The", " n", "ew reci", "pe is"]);
        assert_eq!(full, "The new recipe is");
        mock.assert_async().await;
    }

    #[test]
    fn test_text_only_body_uses_plain_content() {
        let provider = provider("http://localhost".to_string());
        let body = provider.body(&CompletionRequest::new("sys", "hello").with_budget(500, 0.1), false);
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["max_tokens"], 500);
    }

    #[tokio::test]
    async fn test_provider_name() {
        assert_eq!(provider("http://localhost".to_string()).provider_name(), "openai");
    }
}
