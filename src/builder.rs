use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::client::RecipeClient;
use crate::config::AppConfig;
use crate::error::ChefError;
use crate::images::{prepare_images, ImageSource};
use crate::model::{
    FridgeItem, FridgeItemInput, FridgeRecommendations, Recipe, RecipeResult, StreamChunk,
};
use crate::providers::{LlmProvider, ProviderFactory};
use crate::session::{ScanCoordinator, ScanSession};
use crate::store::{FileStore, Fridge, KeyValueStore, MemoryStore, RecipeBook, SettingsStore};

/// Which hosted model to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Google,
}

impl Provider {
    /// Provider name used by the factory
    fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Google => "google",
        }
    }
}

/// Builder for the [`FridgeChef`] service
#[derive(Default)]
pub struct FridgeChefBuilder {
    config: Option<AppConfig>,
    provider: Option<Provider>,
    provider_impl: Option<Arc<dyn LlmProvider>>,
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    store: Option<Arc<dyn KeyValueStore>>,
    data_dir: Option<PathBuf>,
}

impl FridgeChefBuilder {
    /// Use an explicit configuration instead of `fridge-chef.toml` and the
    /// environment
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Select the model provider
    ///
    /// # Example
    /// ```
    /// use fridge_chef::{FridgeChef, Provider};
    ///
    /// let builder = FridgeChef::builder().provider(Provider::OpenAI);
    /// ```
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use a ready-made provider, bypassing the factory
    pub fn provider_impl(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider_impl = Some(provider);
        self
    }

    /// Set the API key for the selected provider
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the model name for the selected provider
    ///
    /// # Example
    /// ```
    /// use fridge_chef::{FridgeChef, Provider};
    ///
    /// let builder = FridgeChef::builder()
    ///     .provider(Provider::Google)
    ///     .model("gemini-2.5-flash");
    /// ```
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Point the provider at a proxy or compatible endpoint
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Deadline for every model call
    ///
    /// # Example
    /// ```
    /// use fridge_chef::FridgeChef;
    /// use std::time::Duration;
    ///
    /// let builder = FridgeChef::builder().timeout(Duration::from_secs(30));
    /// ```
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Use a custom key-value collaborator for recipes, inventory and settings
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persist collections as JSON files in `dir`
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Assemble the service
    ///
    /// # Errors
    /// Returns `ChefError` if:
    /// - configuration cannot be loaded
    /// - the provider is unknown, disabled or has no API key
    /// - both a custom store and a data directory were given
    /// - the data directory cannot be created
    ///
    /// # Example
    /// ```no_run
    /// # use fridge_chef::{FridgeChef, Provider};
    /// # fn main() -> Result<(), fridge_chef::ChefError> {
    /// let chef = FridgeChef::builder()
    ///     .provider(Provider::OpenAI)
    ///     .api_key("sk-...")
    ///     .data_dir("./fridge-data")
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn build(self) -> Result<FridgeChef, ChefError> {
        let mut config = match self.config {
            Some(config) => config,
            None => AppConfig::load()?,
        };
        if let Some(timeout) = self.timeout {
            config.timeout = timeout.as_secs().max(1);
        }

        let provider = match self.provider_impl {
            Some(provider) => provider,
            None => {
                let name = self
                    .provider
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_else(|| config.default_provider.clone());
                let mut provider_config = config.provider_config(&name);
                if let Some(key) = self.api_key {
                    provider_config.api_key = Some(key);
                }
                if let Some(model) = self.model {
                    provider_config.model = model;
                }
                if let Some(url) = self.base_url {
                    provider_config.base_url = Some(url);
                }
                Arc::from(ProviderFactory::create(&name, &provider_config)?)
            }
        };

        let store: Arc<dyn KeyValueStore> = match (self.store, self.data_dir) {
            (Some(_), Some(_)) => {
                return Err(ChefError::Builder(
                    "Cannot set both a custom store and a data directory".to_string(),
                ))
            }
            (Some(store), None) => store,
            (None, Some(dir)) => Arc::new(FileStore::new(dir)?),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        Ok(FridgeChef::assemble(config, provider, store))
    }
}

/// The recipe service: scan sessions, inventory, saved recipes and the
/// model-backed helpers, wired to one provider and one store
pub struct FridgeChef {
    client: RecipeClient,
    recipes: RecipeBook,
    fridge: Fridge,
    settings: SettingsStore,
    session: ScanCoordinator,
    config: AppConfig,
}

impl FridgeChef {
    /// Creates a new builder
    ///
    /// # Example
    /// ```
    /// use fridge_chef::FridgeChef;
    ///
    /// let builder = FridgeChef::builder();
    /// ```
    pub fn builder() -> FridgeChefBuilder {
        FridgeChefBuilder::default()
    }

    fn assemble(
        config: AppConfig,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        info!("Using provider '{}'", provider.provider_name());
        let client = RecipeClient::new(provider, &config);
        let recipes = RecipeBook::new(store.clone());
        let fridge = Fridge::new(store.clone());
        let settings = SettingsStore::new(store);
        let session = ScanCoordinator::new(
            client.clone(),
            recipes.clone(),
            settings.clone(),
            config.image.clone(),
        );
        Self {
            client,
            recipes,
            fridge,
            settings,
            session,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> &RecipeClient {
        &self.client
    }

    pub fn recipes(&self) -> &RecipeBook {
        &self.recipes
    }

    pub fn fridge(&self) -> &Fridge {
        &self.fridge
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn session(&self) -> &ScanCoordinator {
        &self.session
    }

    // Scan session

    pub fn start_scan(&self, sources: Vec<ImageSource>) -> ScanSession {
        self.session.start_scan(sources)
    }

    pub async fn confirm_and_generate(&self) -> Result<Recipe, ChefError> {
        self.session.confirm_and_generate().await
    }

    pub async fn confirm_and_generate_streaming(
        &self,
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> Result<Recipe, ChefError> {
        self.session.confirm_and_generate_streaming(on_chunk).await
    }

    pub fn retake(&self) {
        self.session.retake()
    }

    pub fn reset(&self) {
        self.session.reset()
    }

    /// Run the detection pre-check on the current session's photos.
    ///
    /// Never fails; returns an empty list when nothing could be detected.
    pub async fn detect_session_ingredients(&self, cancel: &CancellationToken) -> Vec<String> {
        let Some(session) = self.session.snapshot() else {
            return Vec::new();
        };
        let detected = self.detect_ingredients(&session.image_sources, cancel).await;
        if let Err(e) = self.session.set_detected_ingredients(detected.clone()) {
            warn!("Could not record detections: {}", e);
        }
        detected
    }

    /// Detection pre-check for arbitrary photos. Never fails.
    pub async fn detect_ingredients(
        &self,
        sources: &[ImageSource],
        cancel: &CancellationToken,
    ) -> Vec<String> {
        match prepare_images(sources, &self.config.image).await {
            Ok(images) => self.client.detect_ingredients(&images, cancel).await,
            Err(e) => {
                warn!("Skipping detection, image preparation failed: {}", e);
                Vec::new()
            }
        }
    }

    // Model-backed helpers over the inventory

    /// Inventory plus whatever the current session detected
    pub fn available_ingredients(&self) -> Vec<String> {
        let scanned = self
            .session
            .snapshot()
            .map(|s| s.detected_ingredients)
            .unwrap_or_default();
        self.fridge.available_ingredient_names(&scanned)
    }

    pub async fn generate_recipe_from_name(
        &self,
        recipe_name: &str,
        cancel: &CancellationToken,
    ) -> Result<RecipeResult, ChefError> {
        let available = self.available_ingredients();
        let options = self.settings.get().prompt_options();
        Ok(self
            .client
            .generate_recipe_from_name(recipe_name, &available, &options, cancel)
            .await?)
    }

    pub async fn generate_recipe_ideas(
        &self,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ChefError> {
        let available = self.available_ingredients();
        Ok(self
            .client
            .generate_recipe_ideas(&available, count, cancel)
            .await?)
    }

    pub async fn recommend_ingredients(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FridgeRecommendations, ChefError> {
        let available = self.available_ingredients();
        Ok(self.client.recommend_ingredients(&available, cancel).await?)
    }

    /// Refine a saved recipe and store the result in place
    pub async fn refine_recipe(
        &self,
        recipe_id: &str,
        instruction: &str,
        cancel: &CancellationToken,
    ) -> Result<Recipe, ChefError> {
        let recipe = self
            .recipes
            .get(recipe_id)
            .ok_or_else(|| crate::error::StorageError::NotFound(recipe_id.to_string()))?;
        let options = self.settings.get().prompt_options();
        let refined = self
            .client
            .refine_recipe(&recipe, instruction, &options, cancel)
            .await?;
        Ok(self.recipes.update(&refined)?)
    }

    // Collections

    pub fn add_fridge_item(&self, input: FridgeItemInput) -> Result<FridgeItem, ChefError> {
        Ok(self.fridge.add_item(input)?)
    }

    pub fn add_items_from_detection(
        &self,
        names: &[String],
        image_uri: Option<&str>,
    ) -> Result<Vec<FridgeItem>, ChefError> {
        Ok(self.fridge.add_items_from_detection(names, image_uri)?)
    }

    pub fn remove_fridge_item(&self, id: &str) -> Result<bool, ChefError> {
        Ok(self.fridge.remove_item(id)?)
    }

    pub fn clear_all_fridge_items(&self) -> Result<(), ChefError> {
        Ok(self.fridge.clear_all()?)
    }

    pub fn save_recipe(&self, recipe: &Recipe) -> Result<(), ChefError> {
        Ok(self.recipes.save(recipe)?)
    }

    pub fn delete_recipe(&self, id: &str) -> Result<bool, ChefError> {
        Ok(self.recipes.delete(id)?)
    }

    pub fn search_recipes(&self, query: &str) -> Vec<Recipe> {
        self.recipes.search(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::ScriptedProvider;
    use serde_json::json;

    fn chef(reply: &str) -> FridgeChef {
        FridgeChef::builder()
            .config(AppConfig::default())
            .provider_impl(ScriptedProvider::new(reply))
            .build()
            .unwrap()
    }

    #[test]
    fn test_disabled_provider_fails_build() {
        let mut config = AppConfig::default();
        let mut openai = config.provider_config("openai");
        openai.enabled = false;
        config.providers.insert("openai".to_string(), openai);

        let result = FridgeChef::builder()
            .config(config)
            .provider(Provider::OpenAI)
            .api_key("sk-test")
            .build();
        match result {
            Err(ChefError::Provider(message)) => assert!(message.contains("not enabled")),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_builder_with_key_and_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let chef = FridgeChef::builder()
            .config(AppConfig::default())
            .provider(Provider::Google)
            .api_key("test-key")
            .timeout(Duration::from_secs(5))
            .data_dir(dir.path())
            .build()
            .unwrap();
        assert_eq!(chef.client().provider_name(), "google");
        assert_eq!(chef.config().timeout, 5);

        chef.add_fridge_item(FridgeItemInput::named("eggs")).unwrap();
        assert!(dir.path().join("fridge_chef_fridge_items.json").exists());
    }

    #[test]
    fn test_store_and_data_dir_conflict() {
        let result = FridgeChef::builder()
            .config(AppConfig::default())
            .provider_impl(ScriptedProvider::new("[]"))
            .store(Arc::new(MemoryStore::new()))
            .data_dir("/tmp/unused")
            .build();
        assert!(matches!(result, Err(ChefError::Builder(_))));
    }

    #[tokio::test]
    async fn test_available_includes_session_detections() {
        let chef = chef(r#"["spinach", "Eggs"]"#);
        chef.add_fridge_item(FridgeItemInput::named("eggs")).unwrap();

        chef.start_scan(vec![]);
        let detected = chef.detect_session_ingredients(&CancellationToken::new()).await;
        assert_eq!(detected, vec!["spinach", "Eggs"]);
        assert_eq!(chef.available_ingredients(), vec!["eggs", "spinach"]);
    }

    #[tokio::test]
    async fn test_refine_updates_saved_recipe() {
        let reply = json!({
            "title": "Spicy Rice",
            "ingredients": [{"name": "rice", "quantity": 1, "unit": "cup"}],
            "steps": [{"stepNumber": 1, "instruction": "Cook"}],
            "tags": ["Dinner"]
        })
        .to_string();
        let chef = chef(&reply);
        let cancel = CancellationToken::new();

        let original = chef
            .client()
            .generate_recipe_from_image(&[], None, &Default::default(), &cancel)
            .await
            .unwrap()
            .recipe;
        chef.save_recipe(&original).unwrap();

        let refined = chef.refine_recipe(&original.id, "more chili", &cancel).await.unwrap();
        assert_eq!(refined.id, original.id);
        assert_eq!(chef.recipes().all().len(), 1);
        assert!(matches!(
            chef.refine_recipe("missing", "x", &cancel).await,
            Err(ChefError::Storage(_))
        ));
    }
}
