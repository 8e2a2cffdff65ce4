//! Turns raw model text into validated domain values.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{IngredientSchema, ValidationConfig};
use crate::error::ScanError;
use crate::model::{FridgeRecommendations, Recipe, RecipeResult, RecipeTag};

/// Error marker the model returns when the image holds nothing edible
pub const NO_FOOD_DETECTED: &str = "NO_FOOD_DETECTED";

const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Strip a Markdown code fence (```json or ```) around a JSON document
pub fn sanitize_json_response(response: &str) -> &str {
    let mut cleaned = response.trim();

    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }

    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }

    cleaned.trim()
}

fn parse_json(content: &str) -> Result<Value, ScanError> {
    serde_json::from_str(sanitize_json_response(content)).map_err(|e| {
        debug!("Unparseable model output: {}", content);
        ScanError::malformed(format!("Failed to parse model response as JSON: {e}"))
    })
}

/// Translate an explicit `{"error": "NO_FOOD_DETECTED"}` document
fn check_no_food(value: &Value) -> Result<(), ScanError> {
    if value.get("error").and_then(Value::as_str) == Some(NO_FOOD_DETECTED) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("No food detected in image")
            .to_string();
        return Err(ScanError::NoFoodDetected { message });
    }
    Ok(())
}

fn is_non_empty_str(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn validate_ingredient(
    index: usize,
    ingredient: &Value,
    schema: IngredientSchema,
) -> Result<(), String> {
    let obj = ingredient
        .as_object()
        .ok_or_else(|| format!("ingredient {index} is not an object"))?;

    if !is_non_empty_str(obj.get("name")) {
        return Err(format!("ingredient {index} has no name"));
    }

    let quantity = obj.get("quantity").unwrap_or(&Value::Null);
    let unit = obj.get("unit").unwrap_or(&Value::Null);

    let (quantity_ok, unit_ok) = match schema {
        IngredientSchema::Strict => (quantity.is_number(), unit.is_string()),
        IngredientSchema::Lenient => (
            quantity.is_number() || quantity.is_null(),
            unit.is_string() || unit.is_null(),
        ),
    };

    if !quantity_ok {
        return Err(format!("ingredient {index} has an invalid quantity"));
    }
    if !unit_ok {
        return Err(format!("ingredient {index} has an invalid unit"));
    }
    Ok(())
}

/// Positive step number; models sometimes write `2.0` for `2`
fn step_number(step: &Value) -> Option<u32> {
    let raw = step.get("stepNumber")?;
    let n = match raw.as_u64() {
        Some(n) => n,
        None => {
            let f = raw.as_f64()?;
            if f.fract() != 0.0 || f < 1.0 || f > f64::from(u32::MAX) {
                return None;
            }
            f as u64
        }
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

fn validate_step(index: usize, step: &Value) -> Result<(), String> {
    if step_number(step).is_none() {
        return Err(format!("step {index} has no positive stepNumber"));
    }
    if !is_non_empty_str(step.get("instruction")) {
        return Err(format!("step {index} has no instruction"));
    }
    Ok(())
}

fn check_bounds(what: &str, len: usize, min: usize, max: usize) -> Result<(), String> {
    if len < min || len > max {
        return Err(format!("{what} count {len} outside [{min}, {max}]"));
    }
    Ok(())
}

/// Structural validation of a recipe document: required fields, types and
/// array bounds. Returns the first problem found.
pub fn validate_recipe_value(value: &Value, config: &ValidationConfig) -> Result<(), String> {
    let obj = value.as_object().ok_or("recipe is not a JSON object")?;

    if !is_non_empty_str(obj.get("id")) {
        return Err("recipe has no id".to_string());
    }
    if !is_non_empty_str(obj.get("title")) {
        return Err("recipe has no title".to_string());
    }

    let array = |key: &str| {
        obj.get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("recipe field '{key}' is not an array"))
    };
    let ingredients = array("ingredients")?;
    let steps = array("steps")?;
    array("tags")?;

    check_bounds(
        "ingredient",
        ingredients.len(),
        config.min_ingredients,
        config.max_ingredients,
    )?;
    check_bounds("step", steps.len(), config.min_steps, config.max_steps)?;

    for (i, ingredient) in ingredients.iter().enumerate() {
        validate_ingredient(i, ingredient, config.ingredient_schema)?;
    }
    for (i, step) in steps.iter().enumerate() {
        validate_step(i, step)?;
    }

    Ok(())
}

/// Overwrite identity and timestamps with locally generated values, and give
/// every ingredient an id
fn stamp_identity(obj: &mut Map<String, Value>, id: &str, created: DateTime<Utc>, now: DateTime<Utc>) {
    obj.insert("id".to_string(), Value::String(id.to_string()));
    obj.insert("createdAt".to_string(), Value::String(created.to_rfc3339()));
    obj.insert("updatedAt".to_string(), Value::String(now.to_rfc3339()));

    if let Some(ingredients) = obj.get_mut("ingredients").and_then(Value::as_array_mut) {
        for ingredient in ingredients.iter_mut().filter_map(Value::as_object_mut) {
            ingredient.insert(
                "id".to_string(),
                Value::String(Uuid::new_v4().to_string()),
            );
        }
    }

    if let Some(steps) = obj.get_mut("steps").and_then(Value::as_array_mut) {
        for step in steps.iter_mut() {
            if let Some(n) = step_number(step) {
                step["stepNumber"] = Value::from(n);
            }
        }
    }
}

/// Identity to stamp onto an accepted recipe
#[derive(Debug, Clone)]
pub struct RecipeIdentity {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl RecipeIdentity {
    /// A brand-new identity for a freshly generated recipe
    pub fn fresh() -> Self {
        Self {
            id: format!("recipe_{}", Uuid::new_v4().simple()),
            created_at: Utc::now(),
        }
    }

    /// Keep the identity of an existing recipe (refinement)
    pub fn of(recipe: &Recipe) -> Self {
        Self {
            id: recipe.id.clone(),
            created_at: recipe.created_at,
        }
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse and structurally validate a recipe document.
///
/// An explicit no-food marker becomes [`ScanError::NoFoodDetected`]; any other
/// problem is a non-recoverable [`ScanError::ApiError`].
pub fn parse_recipe_response(
    content: &str,
    config: &ValidationConfig,
    identity: RecipeIdentity,
) -> Result<RecipeResult, ScanError> {
    let mut value = parse_json(content)?;
    check_no_food(&value)?;

    let obj = value
        .as_object_mut()
        .ok_or_else(|| ScanError::malformed("Model response is not a JSON object"))?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);
    let detected_items = strings(obj.get("detectedItems"));
    let warnings = obj
        .get("warnings")
        .and_then(Value::as_array)
        .map(|_| strings(obj.get("warnings")));

    stamp_identity(obj, &identity.id, identity.created_at, Utc::now());

    validate_recipe_value(&value, config).map_err(|reason| {
        warn!("Rejected recipe structure: {}", reason);
        ScanError::malformed(format!("Invalid recipe structure from API: {reason}"))
    })?;

    let mut recipe: Recipe = serde_json::from_value(value)
        .map_err(|e| ScanError::malformed(format!("Invalid recipe structure from API: {e}")))?;

    let before = recipe.tags.len();
    recipe.tags.retain(|tag| *tag != RecipeTag::Unrecognized);
    if recipe.tags.len() != before {
        warn!("Dropped {} unrecognized recipe tag(s)", before - recipe.tags.len());
    }

    Ok(RecipeResult {
        recipe,
        confidence,
        detected_items,
        warnings,
    })
}

/// Parse a bare JSON array of strings (ingredient names, recipe ideas)
pub fn parse_string_list(content: &str) -> Result<Vec<String>, ScanError> {
    let value = parse_json(content)?;
    check_no_food(&value)?;

    let items = value
        .as_array()
        .ok_or_else(|| ScanError::malformed("Expected a JSON array of strings"))?;

    Ok(items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse a shopping recommendations document
pub fn parse_recommendations(content: &str) -> Result<FridgeRecommendations, ScanError> {
    let value = parse_json(content)?;
    serde_json::from_value(value)
        .map_err(|e| ScanError::malformed(format!("Invalid recommendations document: {e}")))
}
