//! Model client: every operation that talks to the LLM goes through here.
//!
//! Each call builds a prompt, runs the provider under the configured deadline
//! and the caller's cancellation token, then parses and validates the reply.
//! Recipe identity is always assigned locally.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::availability::check_recipe_availability;
use crate::config::{AppConfig, DetectionConfig, ValidationConfig};
use crate::culinary::validate_recipe;
use crate::error::ScanError;
use crate::images::PreparedImage;
use crate::model::{FridgeRecommendations, Recipe, RecipeResult, StreamChunk};
use crate::parser::{
    parse_recipe_response, parse_recommendations, parse_string_list, RecipeIdentity,
};
use crate::prompts::{
    build_inventory_message, build_recipe_from_name_message, build_recipe_ideas_message,
    build_refinement_message, build_system_prompt, PromptKind, PromptOptions,
    DEFAULT_IMAGE_INSTRUCTION, DETECTION_INSTRUCTION,
};
use crate::providers::{guarded, CompletionRequest, ImagePayload, LlmProvider};

#[derive(Clone)]
pub struct RecipeClient {
    provider: Arc<dyn LlmProvider>,
    validation: ValidationConfig,
    detection: DetectionConfig,
    timeout: Duration,
}

fn payloads(images: &[PreparedImage]) -> Vec<ImagePayload> {
    images.iter().map(ImagePayload::from).collect()
}

/// A photo recipe that breaks a culinary rule is kept, with the rule attached
/// to its warnings
fn flag_culinary_issues(result: &mut RecipeResult) {
    if let Err(violation) = validate_recipe(&result.recipe) {
        warn!("'{}' breaks a culinary rule: {}", result.recipe.title, violation);
        result
            .warnings
            .get_or_insert_with(Vec::new)
            .push(violation.to_string());
    }
}

/// Validation failures inside a generation call mean "regenerate"
fn regenerate(err: ScanError) -> ScanError {
    match err {
        ScanError::ApiError { message, .. } => ScanError::api(message),
        other => other,
    }
}

impl RecipeClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AppConfig) -> Self {
        Self {
            provider,
            validation: config.validation.clone(),
            detection: config.detection.clone(),
            timeout: config.request_timeout(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ScanError> {
        debug!(
            "Calling {} with {} image(s)",
            self.provider.provider_name(),
            request.images.len()
        );
        guarded(self.provider.complete(request), self.timeout, cancel).await
    }

    fn image_request(
        images: &[PreparedImage],
        user_text: Option<&str>,
        options: &PromptOptions,
    ) -> CompletionRequest {
        CompletionRequest::new(
            build_system_prompt(PromptKind::RecipeGeneration, options),
            user_text.unwrap_or(DEFAULT_IMAGE_INSTRUCTION),
        )
        .with_images(payloads(images))
    }

    /// Generate a recipe from one or more photos
    pub async fn generate_recipe_from_image(
        &self,
        images: &[PreparedImage],
        user_text: Option<&str>,
        options: &PromptOptions,
        cancel: &CancellationToken,
    ) -> Result<RecipeResult, ScanError> {
        let request = Self::image_request(images, user_text, options);
        let content = self.complete(&request, cancel).await?;
        let mut result =
            parse_recipe_response(&content, &self.validation, RecipeIdentity::fresh())?;
        flag_culinary_issues(&mut result);
        info!("Generated recipe '{}'", result.recipe.title);
        Ok(result)
    }

    /// Streaming variant of [`generate_recipe_from_image`](Self::generate_recipe_from_image).
    ///
    /// `on_chunk` sees every text increment in arrival order, then a single
    /// completion sentinel; parsing happens only after the sentinel.
    pub async fn generate_recipe_stream(
        &self,
        images: &[PreparedImage],
        user_text: Option<&str>,
        options: &PromptOptions,
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
        cancel: &CancellationToken,
    ) -> Result<RecipeResult, ScanError> {
        let request = Self::image_request(images, user_text, options);

        let content = {
            let mut forward = |text: &str| on_chunk(StreamChunk::partial(text));
            guarded(
                self.provider.complete_stream(&request, &mut forward),
                self.timeout,
                cancel,
            )
            .await?
        };
        on_chunk(StreamChunk::done());

        let mut result =
            parse_recipe_response(&content, &self.validation, RecipeIdentity::fresh())?;
        flag_culinary_issues(&mut result);
        Ok(result)
    }

    /// Cheap ingredient-name pre-check. Never fails: any problem yields an
    /// empty list.
    pub async fn detect_ingredients(
        &self,
        images: &[PreparedImage],
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let request = CompletionRequest::new(
            build_system_prompt(PromptKind::IngredientDetection, &PromptOptions::default()),
            DETECTION_INSTRUCTION,
        )
        .with_images(payloads(images))
        .with_budget(self.detection.max_tokens, self.detection.temperature);

        let detected = match self.complete(&request, cancel).await {
            Ok(content) => parse_string_list(&content),
            Err(e) => Err(e),
        };

        detected.unwrap_or_else(|e| {
            warn!("Ingredient detection failed, treating as no detections: {}", e);
            Vec::new()
        })
    }

    /// Full recipe for a named dish restricted to `available` (plus pantry
    /// staples). Structural, culinary and availability checks all apply.
    pub async fn generate_recipe_from_name(
        &self,
        recipe_name: &str,
        available: &[String],
        options: &PromptOptions,
        cancel: &CancellationToken,
    ) -> Result<RecipeResult, ScanError> {
        let options = PromptOptions {
            available_ingredients: Some(available.to_vec()),
            ..options.clone()
        };
        let request = CompletionRequest::new(
            build_system_prompt(PromptKind::RecipeFromName, &options),
            build_recipe_from_name_message(recipe_name, available),
        );

        let content = self.complete(&request, cancel).await?;
        let mut result = parse_recipe_response(&content, &self.validation, RecipeIdentity::fresh())
            .map_err(regenerate)?;

        if let Err(violation) = validate_recipe(&result.recipe) {
            warn!("Rejected '{}': {}", result.recipe.title, violation);
            return Err(ScanError::api(format!(
                "Recipe failed culinary validation ({}): {}",
                violation.rule(),
                violation
            )));
        }

        let report = check_recipe_availability(&result.recipe, available);
        if !report.is_valid() {
            warn!(
                "Rejected '{}': unavailable ingredients {:?}",
                result.recipe.title, report.violations
            );
            return Err(ScanError::api(format!(
                "Recipe uses unavailable ingredients: {}",
                report.violations.join(", ")
            )));
        }

        if !report.missing_optional.is_empty() {
            result.recipe.missing_optional = Some(report.missing_optional);
        }
        info!("Generated recipe '{}' from name", result.recipe.title);
        Ok(result)
    }

    /// Apply a free-text modification to an existing recipe. The id and
    /// creation time survive; `updated_at` is refreshed.
    pub async fn refine_recipe(
        &self,
        recipe: &Recipe,
        instruction: &str,
        options: &PromptOptions,
        cancel: &CancellationToken,
    ) -> Result<Recipe, ScanError> {
        let recipe_json = serde_json::to_string_pretty(recipe)
            .map_err(|e| ScanError::malformed(format!("Failed to serialize recipe: {e}")))?;
        let request = CompletionRequest::new(
            build_system_prompt(PromptKind::RecipeRefinement, options),
            build_refinement_message(&recipe_json, &recipe.title, instruction),
        );

        let content = self.complete(&request, cancel).await?;
        let result = parse_recipe_response(&content, &self.validation, RecipeIdentity::of(recipe))
            .map_err(regenerate)?;

        validate_recipe(&result.recipe).map_err(|violation| {
            ScanError::api(format!(
                "Refined recipe failed culinary validation ({}): {}",
                violation.rule(),
                violation
            ))
        })?;

        Ok(result.recipe)
    }

    /// Shopping suggestions for the current inventory
    pub async fn recommend_ingredients(
        &self,
        inventory: &[String],
        cancel: &CancellationToken,
    ) -> Result<FridgeRecommendations, ScanError> {
        let request = CompletionRequest::new(
            build_system_prompt(PromptKind::IngredientRecommendation, &PromptOptions::default()),
            build_inventory_message(inventory),
        );
        let content = self.complete(&request, cancel).await?;
        parse_recommendations(&content)
    }

    /// Up to `count` dish names cookable from `inventory`
    pub async fn generate_recipe_ideas(
        &self,
        inventory: &[String],
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ScanError> {
        let request = CompletionRequest::new(
            build_system_prompt(PromptKind::RecipeIdeas, &PromptOptions::with_available(inventory)),
            build_recipe_ideas_message(inventory, count),
        );
        let content = self.complete(&request, cancel).await?;
        let mut ideas = parse_string_list(&content)?;
        ideas.truncate(count);
        Ok(ideas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::ScriptedProvider;
    use serde_json::json;

    fn client(provider: Arc<ScriptedProvider>) -> RecipeClient {
        RecipeClient::new(provider, &AppConfig::default())
    }

    fn stir_fry(extra: serde_json::Value) -> String {
        let mut ingredients = vec![
            json!({"name": "chicken breast", "quantity": 300, "unit": "g"}),
            json!({"name": "broccoli", "quantity": 1, "unit": "head"}),
            json!({"name": "olive oil", "quantity": 1, "unit": "tbsp"}),
            json!({"name": "salt", "quantity": null, "unit": null}),
        ];
        if !extra.is_null() {
            ingredients.push(extra);
        }
        json!({
            "id": "x",
            "title": "Chicken Stir Fry",
            "ingredients": ingredients,
            "steps": [{"stepNumber": 1, "instruction": "Stir fry everything"}],
            "tags": ["Dinner", "Quick"],
            "confidence": 0.9
        })
        .to_string()
    }

    fn inventory() -> Vec<String> {
        vec![
            "chicken breast".to_string(),
            "broccoli".to_string(),
            "olive oil".to_string(),
        ]
    }

    fn sundae() -> String {
        json!({
            "title": "Fridge Sundae",
            "ingredients": [
                {"name": "ice cream", "quantity": 2, "unit": "scoop"},
                {"name": "ketchup", "quantity": 1, "unit": "tbsp"}
            ],
            "steps": [{"stepNumber": 1, "instruction": "Scoop and drizzle"}],
            "tags": ["Dessert"],
            "warnings": ["Ice cream looked freezer burnt"]
        })
        .to_string()
    }

    fn shelf_photo() -> Vec<PreparedImage> {
        vec![PreparedImage {
            base64: "aGVsbG8=".to_string(),
            mime_type: "image/png",
            width: 1,
            height: 1,
            size_bytes: 5,
        }]
    }

    #[tokio::test]
    async fn test_photo_recipe_carries_culinary_warning() {
        let client = client(ScriptedProvider::new(sundae()));
        let cancel = CancellationToken::new();

        let result = client
            .generate_recipe_from_image(&shelf_photo(), None, &PromptOptions::default(), &cancel)
            .await
            .unwrap();
        let warnings = result.warnings.unwrap();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0], "Ice cream looked freezer burnt");
        assert!(warnings[1].starts_with("[condiment-with-sweet]"));
        assert!(warnings[1].contains("ketchup"));

        let mut chunks = Vec::new();
        let streamed = client
            .generate_recipe_stream(
                &shelf_photo(),
                None,
                &PromptOptions::default(),
                &mut |chunk: StreamChunk| chunks.push(chunk),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(streamed.recipe.title, "Fridge Sundae");
        assert_eq!(streamed.warnings.map(|w| w.len()), Some(2));
    }

    #[tokio::test]
    async fn test_clean_photo_recipe_has_no_warnings() {
        let result = client(ScriptedProvider::new(stir_fry(serde_json::Value::Null)))
            .generate_recipe_from_image(
                &shelf_photo(),
                None,
                &PromptOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.warnings.is_none());
    }

    #[tokio::test]
    async fn test_from_name_accepts_available_recipe() {
        let provider = ScriptedProvider::new(stir_fry(json!({
            "name": "sesame seeds", "quantity": 1, "unit": "tsp", "isOptional": true
        })));
        let result = client(provider.clone())
            .generate_recipe_from_name(
                "Chicken Stir Fry",
                &inventory(),
                &PromptOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_ne!(result.recipe.id, "x");
        assert_eq!(
            result.recipe.missing_optional,
            Some(vec!["sesame seeds".to_string()])
        );

        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].system_prompt.contains("chicken breast, broccoli, olive oil"));
        assert!(seen[0].user_text.contains("\"Chicken Stir Fry\""));
    }

    #[tokio::test]
    async fn test_from_name_rejects_unavailable_ingredient() {
        let provider = ScriptedProvider::new(stir_fry(json!({
            "name": "soy sauce", "quantity": 2, "unit": "tbsp"
        })));
        let err = client(provider)
            .generate_recipe_from_name(
                "Chicken Stir Fry",
                &inventory(),
                &PromptOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            ScanError::ApiError {
                message,
                recoverable,
            } => {
                assert!(recoverable);
                assert!(message.contains("soy sauce"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_from_name_rejects_culinary_violation() {
        let reply = json!({
            "id": "x",
            "title": "Ketchup Sundae",
            "ingredients": [
                {"name": "ketchup", "quantity": 1, "unit": "tbsp"},
                {"name": "ice cream", "quantity": 1, "unit": "cup"}
            ],
            "steps": [{"stepNumber": 1, "instruction": "Combine"}],
            "tags": ["Snack"]
        });
        let available = vec!["ketchup".to_string(), "ice cream".to_string()];
        let err = client(ScriptedProvider::new(reply.to_string()))
            .generate_recipe_from_name("Sundae", &available, &PromptOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("condiment-with-sweet"));
    }

    #[tokio::test]
    async fn test_from_name_structural_failure_is_recoverable() {
        let err = client(ScriptedProvider::new("not json"))
            .generate_recipe_from_name("Soup", &inventory(), &PromptOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_stream_sentinel_is_last() {
        let provider = ScriptedProvider::new(stir_fry(serde_json::Value::Null));
        let mut chunks = Vec::new();
        let result = client(provider)
            .generate_recipe_stream(
                &[],
                None,
                &PromptOptions::default(),
                &mut |chunk: StreamChunk| chunks.push(chunk),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(text, "The new recipe is");
        assert_eq!(chunks.last(), Some(&StreamChunk::done()));
        assert_eq!(chunks.iter().filter(|c| c.is_complete).count(), 1);
        assert_eq!(result.recipe.title, "Chicken Stir Fry");
    }

    #[tokio::test]
    async fn test_detection_degrades_to_empty() {
        let provider = ScriptedProvider::new("I see a fridge!");
        let detected = client(provider.clone())
            .detect_ingredients(&[], &CancellationToken::new())
            .await;
        assert!(detected.is_empty());

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, Some(500));
    }

    #[tokio::test]
    async fn test_cancelled_call_fails_fast() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provider = ScriptedProvider::new("[]");
        let result = client(provider.clone())
            .generate_recipe_ideas(&inventory(), 3, &cancel)
            .await;
        assert_eq!(result, Err(ScanError::api("Request cancelled")));
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refine_keeps_identity() {
        let provider = ScriptedProvider::new(stir_fry(serde_json::Value::Null));
        let client = client(provider);
        let cancel = CancellationToken::new();
        let original = client
            .generate_recipe_from_image(&[], None, &PromptOptions::default(), &cancel)
            .await
            .unwrap()
            .recipe;

        let refined = client
            .refine_recipe(&original, "make it spicier", &PromptOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(refined.id, original.id);
        assert_eq!(refined.created_at, original.created_at);
        assert!(refined.updated_at >= original.updated_at);
    }

    #[tokio::test]
    async fn test_ideas_are_truncated() {
        let provider = ScriptedProvider::new(r#"["A", "B", "C", "D"]"#);
        let ideas = client(provider)
            .generate_recipe_ideas(&inventory(), 2, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ideas, vec!["A", "B"]);
    }
}
