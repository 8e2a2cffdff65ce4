//! System prompts sent to the model.
//!
//! Prompt texts live next to this module as `.txt` files and are embedded at
//! compile time with `include_str!`, so they can be edited without dealing
//! with Rust string syntax.

use crate::culinary::CULINARY_RULES_PROMPT;

pub const RECIPE_GENERATION_PROMPT: &str = include_str!("recipe_generation.txt");
pub const RECIPE_FROM_NAME_PROMPT: &str = include_str!("recipe_from_name.txt");
pub const RECIPE_SCHEMA: &str = include_str!("recipe_schema.txt");
pub const INGREDIENT_DETECTION_PROMPT: &str = include_str!("ingredient_detection.txt");
pub const RECIPE_REFINEMENT_PROMPT: &str = include_str!("recipe_refinement.txt");
pub const INGREDIENT_RECOMMENDATION_PROMPT: &str = include_str!("ingredient_recommendation.txt");
pub const RECIPE_IDEAS_PROMPT: &str = include_str!("recipe_ideas.txt");

/// Default user text attached to an image when the caller gives none
pub const DEFAULT_IMAGE_INSTRUCTION: &str = "Analyze this image and generate a recipe.";
pub const DETECTION_INSTRUCTION: &str = "List all visible food ingredients in this image.";

/// Which model operation the prompt is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Full recipe from one or more photos
    RecipeGeneration,
    /// Full recipe for a named dish, no image
    RecipeFromName,
    /// Flat list of visible ingredient names
    IngredientDetection,
    /// Modify an existing recipe
    RecipeRefinement,
    /// Shopping suggestions for the inventory
    IngredientRecommendation,
    /// Dish names cookable from the inventory
    RecipeIdeas,
}

/// Context that narrows what the model may propose
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptOptions {
    /// Hard constraint: the model may only use these (plus pantry staples)
    pub available_ingredients: Option<Vec<String>>,
    pub dietary_restrictions: Vec<String>,
    pub cuisine_preference: Option<String>,
    pub custom_instructions: Option<String>,
}

impl PromptOptions {
    pub fn with_available(ingredients: &[String]) -> Self {
        Self {
            available_ingredients: Some(ingredients.to_vec()),
            ..Default::default()
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Build the system prompt for an operation. Pure string assembly.
pub fn build_system_prompt(kind: PromptKind, options: &PromptOptions) -> String {
    let mut prompt = match kind {
        PromptKind::RecipeGeneration => format!("{RECIPE_GENERATION_PROMPT}\n{RECIPE_SCHEMA}"),
        PromptKind::RecipeFromName => format!("{RECIPE_FROM_NAME_PROMPT}\n{RECIPE_SCHEMA}"),
        PromptKind::RecipeRefinement => format!("{RECIPE_REFINEMENT_PROMPT}\n{RECIPE_SCHEMA}"),
        PromptKind::IngredientDetection => INGREDIENT_DETECTION_PROMPT.to_string(),
        PromptKind::IngredientRecommendation => INGREDIENT_RECOMMENDATION_PROMPT.to_string(),
        PromptKind::RecipeIdeas => RECIPE_IDEAS_PROMPT.to_string(),
    };

    let generates_recipe = matches!(
        kind,
        PromptKind::RecipeGeneration | PromptKind::RecipeFromName | PromptKind::RecipeIdeas
    );

    if generates_recipe {
        if let Some(available) = options
            .available_ingredients
            .as_ref()
            .filter(|list| !list.is_empty())
        {
            prompt.push_str(&format!(
                "\n\nAVAILABLE INGREDIENTS (HARD CONSTRAINT): You may ONLY use the following ingredients, plus the pantry staples listed in the rules below. Any ingredient not in this list must be marked \"isOptional\": true or left out.\n{}",
                available.join(", ")
            ));
            prompt.push_str("\n\n");
            prompt.push_str(CULINARY_RULES_PROMPT);
        }
    }

    if let Some(instructions) = non_blank(options.custom_instructions.as_deref()) {
        prompt.push_str(&format!("\n\nADDITIONAL INSTRUCTIONS: {instructions}"));
    }

    if !options.dietary_restrictions.is_empty() {
        prompt.push_str(&format!(
            "\n\nDIETARY RESTRICTIONS: {}",
            options.dietary_restrictions.join(", ")
        ));
    }

    if let Some(cuisine) = non_blank(options.cuisine_preference.as_deref()) {
        prompt.push_str(&format!("\n\nCUISINE PREFERENCE: {cuisine}"));
    }

    prompt
}

/// User message for a refinement call
pub fn build_refinement_message(recipe_json: &str, title: &str, instruction: &str) -> String {
    format!("Modify the recipe \"{title}\" with this instruction: {instruction}\n\nRecipe:\n{recipe_json}")
}

/// User message asking for a full recipe for a named dish
pub fn build_recipe_from_name_message(recipe_name: &str, available: &[String]) -> String {
    format!(
        "Create a complete recipe for \"{}\" using only these ingredients: {}",
        recipe_name,
        available.join(", ")
    )
}

pub fn build_inventory_message(inventory: &[String]) -> String {
    format!("My fridge currently contains: {}", inventory.join(", "))
}

pub fn build_recipe_ideas_message(inventory: &[String], count: usize) -> String {
    format!(
        "Suggest up to {} recipes I can make with: {}",
        count,
        inventory.join(", ")
    )
}
