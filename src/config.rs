use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Provider used when none is requested explicitly
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Map of provider name to provider configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Request deadline in seconds, applied to every model call
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Image preparation limits
    #[serde(default)]
    pub image: ImageConfig,
    /// Structural validation bounds
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Budget for the cheaper ingredient detection call
    #[serde(default)]
    pub detection: DetectionConfig,
}

/// Configuration for a specific model provider
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Whether this provider is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Model identifier (e.g., "gpt-4o", "gemini-2.5-flash-lite")
    pub model: String,
    /// Temperature for generation (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key for authentication (can also be set via environment variable)
    pub api_key: Option<String>,
    /// Base URL for API endpoint (for custom or proxy endpoints)
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Enabled provider with default sampling settings
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            enabled: default_enabled(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Model used when a provider has no configuration entry
pub fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4o",
        _ => "gemini-2.5-flash-lite",
    }
}

/// Limits applied when preparing a captured photo for upload
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ImageConfig {
    #[serde(default = "default_max_dimension")]
    pub max_width: u32,
    #[serde(default = "default_max_dimension")]
    pub max_height: u32,
    /// Compression quality, 0.0-1.0
    #[serde(default = "default_quality")]
    pub quality: f32,
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_dimension(),
            max_height: default_max_dimension(),
            quality: default_quality(),
            max_size_mb: default_max_size_mb(),
        }
    }
}

impl ImageConfig {
    pub fn max_size_bytes(&self) -> u64 {
        u64::from(self.max_size_mb) * 1024 * 1024
    }
}

/// How strictly ingredient quantity/unit fields are checked.
///
/// The two shipped app variants disagree here: one allows `null` quantity and
/// unit, the other requires both.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngredientSchema {
    /// `quantity` may be a number or null, `unit` a string or null
    #[default]
    Lenient,
    /// `quantity` must be a number and `unit` a string
    Strict,
}

/// Bounds used by the structural validator
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ValidationConfig {
    #[serde(default = "default_min_items")]
    pub min_ingredients: usize,
    #[serde(default = "default_max_ingredients")]
    pub max_ingredients: usize,
    #[serde(default = "default_min_items")]
    pub min_steps: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub ingredient_schema: IngredientSchema,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_ingredients: default_min_items(),
            max_ingredients: default_max_ingredients(),
            min_steps: default_min_items(),
            max_steps: default_max_steps(),
            ingredient_schema: IngredientSchema::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DetectionConfig {
    #[serde(default = "default_detection_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_detection_temperature")]
    pub temperature: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_detection_max_tokens(),
            temperature: default_detection_temperature(),
        }
    }
}

// Default value functions
fn default_provider() -> String {
    "google".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    3072
}

fn default_timeout() -> u64 {
    60
}

fn default_max_dimension() -> u32 {
    768
}

fn default_quality() -> f32 {
    0.7
}

fn default_max_size_mb() -> u32 {
    5
}

fn default_min_items() -> usize {
    1
}

fn default_max_ingredients() -> usize {
    50
}

fn default_max_steps() -> usize {
    30
}

fn default_detection_max_tokens() -> u32 {
    500
}

fn default_detection_temperature() -> f32 {
    0.3
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: HashMap::new(),
            timeout: default_timeout(),
            image: ImageConfig::default(),
            validation: ValidationConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with FRIDGE_CHEF__ prefix
    /// 2. fridge-chef.toml file in current directory
    /// 3. Default values
    ///
    /// Environment variable format: FRIDGE_CHEF__PROVIDERS__OPENAI__API_KEY
    pub fn load() -> Result<Self, ConfigError> {
        load_config()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Configuration for `provider`, falling back to defaults when the
    /// provider has no entry
    pub fn provider_config(&self, provider: &str) -> ProviderConfig {
        self.providers
            .get(provider)
            .cloned()
            .unwrap_or_else(|| ProviderConfig::for_model(default_model_for(provider)))
    }
}

/// Load configuration from file and environment variables
///
/// See [`AppConfig::load`] for the precedence rules.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        // Optional config file (can be missing)
        .add_source(File::with_name("fridge-chef").required(false))
        // Use double underscore for nested: FRIDGE_CHEF__PROVIDERS__OPENAI__API_KEY
        .add_source(
            Environment::with_prefix("FRIDGE_CHEF")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}
