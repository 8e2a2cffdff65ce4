use crate::config::{AppConfig, ProviderConfig};
use crate::error::ChefError;
use crate::providers::{GoogleProvider, LlmProvider, OpenAIProvider};

pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider instance from configuration
    pub fn create(
        provider_name: &str,
        config: &ProviderConfig,
    ) -> Result<Box<dyn LlmProvider>, ChefError> {
        // Validate that provider is enabled
        if !config.enabled {
            return Err(ChefError::Provider(format!(
                "Provider '{}' is not enabled in configuration",
                provider_name
            )));
        }

        match provider_name {
            "openai" => Ok(Box::new(
                OpenAIProvider::new(config).map_err(ChefError::Provider)?,
            )),
            "google" | "gemini" => Ok(Box::new(
                GoogleProvider::new(config).map_err(ChefError::Provider)?,
            )),
            _ => Err(ChefError::Provider(format!(
                "Unknown provider: {}",
                provider_name
            ))),
        }
    }

    /// Get the default provider from configuration
    pub fn get_default_provider(config: &AppConfig) -> Result<Box<dyn LlmProvider>, ChefError> {
        let provider_name = &config.default_provider;
        let provider_config = config.providers.get(provider_name).ok_or_else(|| {
            ChefError::Provider(format!(
                "Default provider '{}' not found in configuration",
                provider_name
            ))
        })?;

        Self::create(provider_name, provider_config)
    }

    /// List all available provider names
    pub fn available_providers() -> Vec<&'static str> {
        vec!["openai", "google"]
    }
}
