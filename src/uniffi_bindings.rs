//! UniFFI bindings for fridge-chef
//!
//! FFI-friendly records and synchronous entry points for the iOS and Android
//! apps. Each call builds a [`FridgeChef`] and drives it on its own tokio
//! runtime.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::builder::{FridgeChef, Provider};
use crate::culinary::categorize_ingredient;
use crate::error::{ChefError, ScanError};
use crate::images::ImageSource;
use crate::model::{Ingredient, Recipe, RecipeResult};

#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();

/// FFI-compatible ingredient line
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct FfiIngredient {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub optional: bool,
}

impl From<Ingredient> for FfiIngredient {
    fn from(ingredient: Ingredient) -> Self {
        FfiIngredient {
            optional: ingredient.optional(),
            name: ingredient.name,
            quantity: ingredient.quantity,
            unit: ingredient.unit,
        }
    }
}

/// FFI-compatible recipe. `json` carries the full record for callers that
/// need fields not flattened here.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct FfiRecipe {
    pub id: String,
    pub title: String,
    /// Empty string if none
    pub description: String,
    pub ingredients: Vec<FfiIngredient>,
    /// Instructions in step order
    pub steps: Vec<String>,
    pub tags: Vec<String>,
    pub servings: u32,
    pub prep_time_minutes: u32,
    pub cook_time_minutes: u32,
    pub difficulty: String,
    pub missing_optional: Vec<String>,
    pub json: String,
}

/// Serialized name of a unit-like enum, as stored
fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::new(),
    }
}

impl From<Recipe> for FfiRecipe {
    fn from(recipe: Recipe) -> Self {
        let json = serde_json::to_string(&recipe).unwrap_or_default();
        let mut steps = recipe.steps;
        steps.sort_by_key(|s| s.step_number);

        FfiRecipe {
            id: recipe.id,
            title: recipe.title,
            description: recipe.description.unwrap_or_default(),
            ingredients: recipe.ingredients.into_iter().map(Into::into).collect(),
            steps: steps.into_iter().map(|s| s.instruction).collect(),
            tags: recipe.tags.iter().map(wire_name).collect(),
            servings: recipe.servings,
            prep_time_minutes: recipe.prep_time,
            cook_time_minutes: recipe.cook_time,
            difficulty: wire_name(&recipe.difficulty),
            missing_optional: recipe.missing_optional.unwrap_or_default(),
            json,
        }
    }
}

/// Recipe plus how sure the model was
#[derive(Debug, Clone)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct FfiRecipeResult {
    pub recipe: FfiRecipe,
    pub confidence: f64,
    pub detected_items: Vec<String>,
    pub warnings: Vec<String>,
}

impl From<RecipeResult> for FfiRecipeResult {
    fn from(result: RecipeResult) -> Self {
        FfiRecipeResult {
            recipe: result.recipe.into(),
            confidence: result.confidence,
            detected_items: result.detected_items,
            warnings: result.warnings.unwrap_or_default(),
        }
    }
}

/// FFI-compatible provider enum
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum FfiLlmProvider {
    OpenAI,
    Google,
}

impl From<FfiLlmProvider> for Provider {
    fn from(provider: FfiLlmProvider) -> Self {
        match provider {
            FfiLlmProvider::OpenAI => Provider::OpenAI,
            FfiLlmProvider::Google => Provider::Google,
        }
    }
}

/// FFI-compatible error type. Scan failures keep their code so the apps can
/// pick the right message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Error))]
pub enum FfiChefError {
    NoFoodDetected { message: String },
    ApiError { message: String, recoverable: bool },
    PermissionDenied { message: String },
    ImageTooLarge { size_bytes: u64, max_bytes: u64 },
    NetworkError { message: String },
    StorageError { message: String },
    ConfigError { message: String },
    RuntimeError { message: String },
}

impl fmt::Display for FfiChefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfiChefError::NoFoodDetected { message } => write!(f, "No food detected: {}", message),
            FfiChefError::ApiError { message, .. } => write!(f, "API error: {}", message),
            FfiChefError::PermissionDenied { message } => {
                write!(f, "Permission denied: {}", message)
            }
            FfiChefError::ImageTooLarge {
                size_bytes,
                max_bytes,
            } => write!(f, "Image too large: {} bytes (max {})", size_bytes, max_bytes),
            FfiChefError::NetworkError { message } => write!(f, "Network error: {}", message),
            FfiChefError::StorageError { message } => write!(f, "Storage error: {}", message),
            FfiChefError::ConfigError { message } => write!(f, "Config error: {}", message),
            FfiChefError::RuntimeError { message } => write!(f, "Runtime error: {}", message),
        }
    }
}

impl std::error::Error for FfiChefError {}

impl From<ScanError> for FfiChefError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::NoFoodDetected { message } => FfiChefError::NoFoodDetected { message },
            ScanError::ApiError {
                message,
                recoverable,
            } => FfiChefError::ApiError {
                message,
                recoverable,
            },
            ScanError::PermissionDenied { message } => FfiChefError::PermissionDenied { message },
            ScanError::ImageTooLarge {
                size_bytes,
                max_bytes,
            } => FfiChefError::ImageTooLarge {
                size_bytes,
                max_bytes,
            },
            ScanError::NetworkError { message } => FfiChefError::NetworkError { message },
        }
    }
}

impl From<ChefError> for FfiChefError {
    fn from(err: ChefError) -> Self {
        match err {
            ChefError::Scan(e) => e.into(),
            ChefError::Storage(e) => FfiChefError::StorageError {
                message: e.to_string(),
            },
            ChefError::Config(e) => FfiChefError::ConfigError {
                message: e.to_string(),
            },
            ChefError::Provider(message) | ChefError::Builder(message) => {
                FfiChefError::ConfigError { message }
            }
            other @ (ChefError::NoActiveSession
            | ChefError::SessionNotReady { .. }
            | ChefError::SessionReplaced(_)) => {
                FfiChefError::ApiError {
                    message: other.to_string(),
                    recoverable: true,
                }
            }
        }
    }
}

/// Per-call configuration
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct FfiChefConfig {
    /// Uses the configured default if not specified
    pub provider: Option<FfiLlmProvider>,
    /// Uses the environment if not specified
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    /// Directory for saved recipes, inventory and settings. In-memory when
    /// not specified.
    pub data_dir: Option<String>,
}

fn create_runtime() -> Result<tokio::runtime::Runtime, FfiChefError> {
    tokio::runtime::Runtime::new().map_err(|e| FfiChefError::RuntimeError {
        message: format!("Failed to create async runtime: {}", e),
    })
}

fn build_chef(config: Option<FfiChefConfig>) -> Result<FridgeChef, FfiChefError> {
    let config = config.unwrap_or_default();
    let mut builder = FridgeChef::builder();

    if let Some(provider) = config.provider {
        builder = builder.provider(provider.into());
    }
    if let Some(api_key) = config.api_key {
        builder = builder.api_key(api_key);
    }
    if let Some(model) = config.model {
        builder = builder.model(model);
    }
    if let Some(secs) = config.timeout_seconds {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(dir) = config.data_dir {
        builder = builder.data_dir(dir);
    }

    Ok(builder.build()?)
}

fn sources(image_paths: Vec<String>) -> Vec<ImageSource> {
    image_paths.into_iter().map(ImageSource::path).collect()
}

/// Generate a recipe from one or more fridge photos. The recipe is saved to
/// the configured store.
#[cfg_attr(feature = "uniffi", uniffi::export)]
pub fn generate_recipe_from_images(
    image_paths: Vec<String>,
    config: Option<FfiChefConfig>,
) -> Result<FfiRecipe, FfiChefError> {
    let chef = build_chef(config)?;
    let rt = create_runtime()?;
    rt.block_on(async {
        chef.start_scan(sources(image_paths));
        let recipe = chef.confirm_and_generate().await?;
        Ok(recipe.into())
    })
}

/// Quick ingredient detection. Returns an empty list when nothing is found.
#[cfg_attr(feature = "uniffi", uniffi::export)]
pub fn detect_ingredients(
    image_paths: Vec<String>,
    config: Option<FfiChefConfig>,
) -> Result<Vec<String>, FfiChefError> {
    let chef = build_chef(config)?;
    let rt = create_runtime()?;
    Ok(rt.block_on(chef.detect_ingredients(&sources(image_paths), &CancellationToken::new())))
}

/// Generate a named dish using only `available` plus pantry staples
#[cfg_attr(feature = "uniffi", uniffi::export)]
pub fn generate_recipe_from_name(
    recipe_name: String,
    available: Vec<String>,
    config: Option<FfiChefConfig>,
) -> Result<FfiRecipeResult, FfiChefError> {
    let chef = build_chef(config)?;
    let options = chef.settings().get().prompt_options();
    let rt = create_runtime()?;
    rt.block_on(async {
        let result = chef
            .client()
            .generate_recipe_from_name(&recipe_name, &available, &options, &CancellationToken::new())
            .await?;
        Ok(result.into())
    })
}

/// Dish names that could be cooked from `inventory`
#[cfg_attr(feature = "uniffi", uniffi::export)]
pub fn generate_recipe_ideas(
    inventory: Vec<String>,
    count: u32,
    config: Option<FfiChefConfig>,
) -> Result<Vec<String>, FfiChefError> {
    let chef = build_chef(config)?;
    let rt = create_runtime()?;
    rt.block_on(async {
        Ok(chef
            .client()
            .generate_recipe_ideas(&inventory, count as usize, &CancellationToken::new())
            .await?)
    })
}

/// Culinary category of an ingredient name, e.g. "savory-protein"
#[cfg_attr(feature = "uniffi", uniffi::export)]
pub fn categorize(ingredient: String) -> String {
    categorize_ingredient(&ingredient).as_str().to_string()
}

/// Get the library version
#[cfg_attr(feature = "uniffi", uniffi::export)]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Check if a provider has its API key in the environment
#[cfg_attr(feature = "uniffi", uniffi::export)]
pub fn is_provider_available(provider: FfiLlmProvider) -> bool {
    match provider {
        FfiLlmProvider::OpenAI => std::env::var("OPENAI_API_KEY").is_ok(),
        FfiLlmProvider::Google => {
            std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("GOOGLE_API_KEY").is_ok()
        }
    }
}
