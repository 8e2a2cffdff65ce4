//! Checks that a recipe only uses what the user actually has.
//!
//! Matching is fuzzy: names are normalised and compared by equality or by
//! substring containment in either direction, so "tomato" matches "cherry
//! tomatoes" but "pea" also matches "peanut". Known to be imprecise.

use crate::culinary::is_pantry_staple;
use crate::model::{Ingredient, Recipe};

/// Lowercase, trim, drop one trailing `s`, strip punctuation
pub fn normalize_ingredient_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let singular = lowered.strip_suffix('s').unwrap_or(&lowered);
    singular
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whether a recipe ingredient matches any inventory entry
pub fn ingredient_matches_available(ingredient: &str, available: &[String]) -> bool {
    let wanted = normalize_ingredient_name(ingredient);
    if wanted.is_empty() {
        return false;
    }

    available.iter().any(|candidate| {
        let have = normalize_ingredient_name(candidate);
        !have.is_empty() && (wanted == have || wanted.contains(&have) || have.contains(&wanted))
    })
}

/// Outcome of checking a recipe against the inventory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailabilityReport {
    /// Non-optional ingredients the user does not have
    pub violations: Vec<String>,
    /// Optional ingredients the user does not have
    pub missing_optional: Vec<String>,
    /// Ingredients that matched the inventory or are pantry staples
    pub valid_ingredients: Vec<Ingredient>,
}

impl AvailabilityReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every ingredient of `recipe` against `available`.
/// Pantry staples always count as available.
pub fn check_recipe_availability(recipe: &Recipe, available: &[String]) -> AvailabilityReport {
    let mut report = AvailabilityReport::default();

    for ingredient in &recipe.ingredients {
        if is_pantry_staple(&ingredient.name)
            || ingredient_matches_available(&ingredient.name, available)
        {
            report.valid_ingredients.push(ingredient.clone());
        } else if ingredient.optional() {
            report.missing_optional.push(ingredient.name.clone());
        } else {
            report.violations.push(ingredient.name.clone());
        }
    }

    report
}

/// Merge inventory names with not-yet-committed scan results, lowercased and
/// without duplicates, preserving first-seen order
pub fn merge_available(inventory: &[String], scanned: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for name in inventory.iter().chain(scanned.iter()) {
        let name = name.trim().to_lowercase();
        if !name.is_empty() && !merged.contains(&name) {
            merged.push(name);
        }
    }
    merged
}
