pub mod availability;
pub mod builder;
pub mod client;
pub mod config;
pub mod culinary;
pub mod error;
pub mod images;
pub mod model;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod session;
pub mod store;
pub mod uniffi_bindings;

pub use builder::{FridgeChef, FridgeChefBuilder, Provider};
pub use client::RecipeClient;
pub use config::AppConfig;
pub use error::{ChefError, ScanError, ScanErrorCode, StorageError};
pub use images::{ImageSource, PreparedImage};
pub use model::{
    FoodCategory, FridgeItem, FridgeItemInput, FridgeItemUpdate, FridgeRecommendations,
    Ingredient, Recipe, RecipeResult, RecipeStep, RecipeTag, StreamChunk,
};
pub use session::{ScanSession, ScanStatus};
pub use store::{FileStore, KeyValueStore, MemoryStore, UserSettings};

use std::path::PathBuf;

/// Generate a recipe from fridge photos with the configured default provider.
///
/// Nothing is persisted; use [`FridgeChef::builder`] with a data directory to
/// keep results.
pub async fn scan_fridge(image_paths: &[PathBuf]) -> Result<Recipe, ChefError> {
    let chef = FridgeChef::builder().build()?;
    chef.start_scan(image_paths.iter().cloned().map(ImageSource::Path).collect());
    chef.confirm_and_generate().await
}
