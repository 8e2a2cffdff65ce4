use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse food group attached to ingredients and inventory items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FoodCategory {
    Protein,
    Vegetable,
    Grain,
    Dairy,
    Spice,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FoodCategory>,
    /// Garnishes and other nice-to-have items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_optional: Option<bool>,
}

impl Ingredient {
    pub fn optional(&self) -> bool {
        self.is_optional.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub value: f64,
    pub unit: TemperatureUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeStep {
    pub step_number: u32,
    pub instruction: String,
    /// Minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Temperature>,
}

/// Per-serving nutrition, grams except calories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecipeTag {
    Vegan,
    Vegetarian,
    #[serde(rename = "Gluten-Free")]
    GlutenFree,
    #[serde(rename = "Dairy-Free")]
    DairyFree,
    Quick,
    Healthy,
    #[serde(rename = "Budget-Friendly")]
    BudgetFriendly,
    #[serde(rename = "Comfort Food")]
    ComfortFood,
    Dinner,
    Lunch,
    Breakfast,
    Snack,
    Dessert,
    /// Anything the model invents outside the enumeration; dropped by the parser
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<RecipeStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macros: Option<Macros>,
    pub tags: Vec<RecipeTag>,
    #[serde(default = "default_servings")]
    pub servings: u32,
    /// Minutes
    #[serde(default)]
    pub prep_time: u32,
    /// Minutes
    #[serde(default)]
    pub cook_time: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    /// Optional ingredients that would improve the dish but are not in inventory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_optional: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_servings() -> u32 {
    2
}

impl Recipe {
    pub fn ingredient_names(&self) -> impl Iterator<Item = &str> {
        self.ingredients.iter().map(|i| i.name.as_str())
    }

    pub fn has_tag(&self, tag: RecipeTag) -> bool {
        self.tags.contains(&tag)
    }

    /// Case-insensitive substring match against title, description and ingredient names
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query))
            || self
                .ingredients
                .iter()
                .any(|i| i.name.to_lowercase().contains(&query))
    }
}

/// Accepted output of a recipe generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeResult {
    pub recipe: Recipe,
    /// 0.0-1.0
    pub confidence: f64,
    /// What the model reports having seen
    pub detected_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// One increment delivered to a streaming callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub content: String,
    pub is_complete: bool,
}

impl StreamChunk {
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_complete: false,
        }
    }

    pub fn done() -> Self {
        Self {
            content: String::new(),
            is_complete: true,
        }
    }
}

/// Inventory record kept in the fridge collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FridgeItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: FoodCategory,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Everything a caller supplies when adding an item by hand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FridgeItemInput {
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub category: FoodCategory,
    pub expires_at: Option<DateTime<Utc>>,
    pub image_uri: Option<String>,
    pub notes: Option<String>,
}

impl FridgeItemInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial update for an existing item; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FridgeItemUpdate {
    pub name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub category: Option<FoodCategory>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientRecommendation {
    pub ingredient: String,
    #[serde(default)]
    pub category: FoodCategory,
    pub priority: Priority,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub unlocks_recipes: Vec<String>,
}

/// Shopping suggestions for the current inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FridgeRecommendations {
    #[serde(default)]
    pub recommendations: Vec<IngredientRecommendation>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub current_strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub possible_recipes: Vec<String>,
}
