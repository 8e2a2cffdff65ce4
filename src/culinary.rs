//! Hand-authored culinary plausibility rules.
//!
//! Ingredients are sorted into coarse flavour categories and a recipe is
//! rejected when it mixes categories no home cook would combine, whatever the
//! model proposed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Recipe, RecipeTag};

/// Flavour category used by the compatibility rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CulinaryCategory {
    SweetDessert,
    SavoryProtein,
    SavoryVegetable,
    CondimentSavory,
    CondimentSweet,
    GrainNeutral,
    DairyNeutral,
    PantryStaple,
    SpiceNeutral,
    Fruit,
    Unknown,
}

impl CulinaryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CulinaryCategory::SweetDessert => "sweet-dessert",
            CulinaryCategory::SavoryProtein => "savory-protein",
            CulinaryCategory::SavoryVegetable => "savory-vegetable",
            CulinaryCategory::CondimentSavory => "condiment-savory",
            CulinaryCategory::CondimentSweet => "condiment-sweet",
            CulinaryCategory::GrainNeutral => "grain-neutral",
            CulinaryCategory::DairyNeutral => "dairy-neutral",
            CulinaryCategory::PantryStaple => "pantry-staple",
            CulinaryCategory::SpiceNeutral => "spice-neutral",
            CulinaryCategory::Fruit => "fruit",
            CulinaryCategory::Unknown => "unknown",
        }
    }

    fn is_sweet(&self) -> bool {
        matches!(self, CulinaryCategory::SweetDessert | CulinaryCategory::Fruit)
    }

    fn is_savory_main(&self) -> bool {
        matches!(
            self,
            CulinaryCategory::SavoryProtein | CulinaryCategory::SavoryVegetable
        )
    }
}

impl fmt::Display for CulinaryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meal slot a recipe is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeCategory {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
    Dessert,
}

impl RecipeCategory {
    /// Derive the category from recipe tags. Dessert wins over breakfast,
    /// which wins over the other meal slots.
    pub fn from_tags(tags: &[RecipeTag]) -> Option<Self> {
        [
            (RecipeTag::Dessert, RecipeCategory::Dessert),
            (RecipeTag::Breakfast, RecipeCategory::Breakfast),
            (RecipeTag::Snack, RecipeCategory::Snack),
            (RecipeTag::Lunch, RecipeCategory::Lunch),
            (RecipeTag::Dinner, RecipeCategory::Dinner),
        ]
        .into_iter()
        .find(|(tag, _)| tags.contains(tag))
        .map(|(_, category)| category)
    }
}

use CulinaryCategory::*;

/// Static name to category table. Order matters for containment matching.
pub const INGREDIENT_CATEGORIES: &[(&str, CulinaryCategory)] = &[
    // Sweet/Dessert
    ("yogurt", SweetDessert),
    ("honey", SweetDessert),
    ("sugar", SweetDessert),
    ("chocolate", SweetDessert),
    ("granola", SweetDessert),
    ("maple syrup", SweetDessert),
    ("jam", SweetDessert),
    ("vanilla", SweetDessert),
    ("cinnamon", SweetDessert),
    ("nutella", SweetDessert),
    ("whipped cream", SweetDessert),
    ("ice cream", SweetDessert),
    // Fruits
    ("apple", Fruit),
    ("banana", Fruit),
    ("orange", Fruit),
    ("strawberry", Fruit),
    ("blueberry", Fruit),
    ("raspberry", Fruit),
    ("mango", Fruit),
    ("pineapple", Fruit),
    ("peach", Fruit),
    ("grape", Fruit),
    ("berry", Fruit),
    ("lemon", Fruit),
    ("lime", Fruit),
    // Savory proteins
    ("chicken", SavoryProtein),
    ("beef", SavoryProtein),
    ("pork", SavoryProtein),
    ("fish", SavoryProtein),
    ("salmon", SavoryProtein),
    ("tuna", SavoryProtein),
    ("turkey", SavoryProtein),
    ("bacon", SavoryProtein),
    ("ham", SavoryProtein),
    ("sausage", SavoryProtein),
    ("egg", SavoryProtein),
    ("tofu", SavoryProtein),
    // Savory vegetables
    ("onion", SavoryVegetable),
    ("garlic", SavoryVegetable),
    ("tomato", SavoryVegetable),
    ("potato", SavoryVegetable),
    ("carrot", SavoryVegetable),
    ("broccoli", SavoryVegetable),
    ("spinach", SavoryVegetable),
    ("lettuce", SavoryVegetable),
    ("cucumber", SavoryVegetable),
    ("bell pepper", SavoryVegetable),
    ("mushroom", SavoryVegetable),
    ("zucchini", SavoryVegetable),
    ("celery", SavoryVegetable),
    ("kale", SavoryVegetable),
    // Savory condiments, never in sweet dishes
    ("ketchup", CondimentSavory),
    ("mustard", CondimentSavory),
    ("mayo", CondimentSavory),
    ("mayonnaise", CondimentSavory),
    ("hot sauce", CondimentSavory),
    ("soy sauce", CondimentSavory),
    ("worcestershire", CondimentSavory),
    ("bbq sauce", CondimentSavory),
    ("salsa", CondimentSavory),
    ("ranch", CondimentSavory),
    ("vinegar", CondimentSavory),
    // Sweet condiments
    ("caramel", CondimentSweet),
    ("chocolate syrup", CondimentSweet),
    ("agave", CondimentSweet),
    // Neutral grains
    ("bread", GrainNeutral),
    ("rice", GrainNeutral),
    ("pasta", GrainNeutral),
    ("tortilla", GrainNeutral),
    ("oats", GrainNeutral),
    ("quinoa", GrainNeutral),
    ("couscous", GrainNeutral),
    ("flour", GrainNeutral),
    // Neutral dairy
    ("milk", DairyNeutral),
    ("cheese", DairyNeutral),
    ("cream", DairyNeutral),
    ("butter", DairyNeutral),
    ("sour cream", DairyNeutral),
    ("cream cheese", DairyNeutral),
    ("parmesan", DairyNeutral),
    ("mozzarella", DairyNeutral),
    // Pantry staples
    ("salt", PantryStaple),
    ("pepper", PantryStaple),
    ("black pepper", PantryStaple),
    ("oil", PantryStaple),
    ("olive oil", PantryStaple),
    ("vegetable oil", PantryStaple),
    ("water", PantryStaple),
    // Neutral spices
    ("cumin", SpiceNeutral),
    ("paprika", SpiceNeutral),
    ("oregano", SpiceNeutral),
    ("basil", SpiceNeutral),
    ("thyme", SpiceNeutral),
    ("rosemary", SpiceNeutral),
    ("chili powder", SpiceNeutral),
    ("ginger", SpiceNeutral),
    ("turmeric", SpiceNeutral),
];

/// Staples the model may assume without them being in the inventory
pub const PANTRY_STAPLES: &[&str] = &[
    "salt",
    "pepper",
    "black pepper",
    "oil",
    "olive oil",
    "vegetable oil",
    "water",
    "butter",
];

fn lookup(name: &str) -> Option<CulinaryCategory> {
    INGREDIENT_CATEGORIES
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, category)| *category)
}

fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{stem}y")
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    }
}

/// Classify an ingredient name: exact lookup, then singular form, then
/// substring containment against table keys in either direction.
pub fn categorize_ingredient(ingredient: &str) -> CulinaryCategory {
    let normalized = ingredient.trim().to_lowercase();
    if normalized.is_empty() {
        return Unknown;
    }

    if let Some(category) = lookup(&normalized) {
        return category;
    }

    let singular = singularize(&normalized);
    if let Some(category) = lookup(&singular) {
        return category;
    }

    INGREDIENT_CATEGORIES
        .iter()
        .find(|(key, _)| {
            normalized.contains(key)
                || key.contains(normalized.as_str())
                || (!singular.is_empty()
                    && (singular.contains(key) || key.contains(singular.as_str())))
        })
        .map(|(_, category)| *category)
        .unwrap_or(Unknown)
}

/// Whether an ingredient may be assumed to be in every kitchen
pub fn is_pantry_staple(ingredient: &str) -> bool {
    let normalized = ingredient.trim().to_lowercase();
    PANTRY_STAPLES.contains(&normalized.as_str())
        || PANTRY_STAPLES.contains(&singularize(&normalized).as_str())
        || categorize_ingredient(&normalized) == PantryStaple
}

/// The rule a rejected recipe broke
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum CulinaryViolation {
    /// A savory condiment next to something sweet, in any recipe
    CondimentWithSweet { condiment: String, sweet: String },
    /// A savory main ingredient or condiment in a dessert
    SavoryInDessert {
        ingredient: String,
        category: CulinaryCategory,
    },
    /// A breakfast mixing a savory condiment with sweet items
    BreakfastSweetSavoryMix { condiment: String, sweet: String },
}

impl CulinaryViolation {
    /// Stable identifier of the rule that fired
    pub fn rule(&self) -> &'static str {
        match self {
            CulinaryViolation::CondimentWithSweet { .. } => "condiment-with-sweet",
            CulinaryViolation::SavoryInDessert { .. } => "savory-in-dessert",
            CulinaryViolation::BreakfastSweetSavoryMix { .. } => "breakfast-sweet-savory-mix",
        }
    }
}

impl fmt::Display for CulinaryViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CulinaryViolation::CondimentWithSweet { condiment, sweet } => write!(
                f,
                "[{}] savory condiment '{}' combined with sweet ingredient '{}'",
                self.rule(),
                condiment,
                sweet
            ),
            CulinaryViolation::SavoryInDessert {
                ingredient,
                category,
            } => write!(
                f,
                "[{}] dessert contains {} ingredient '{}'",
                self.rule(),
                category,
                ingredient
            ),
            CulinaryViolation::BreakfastSweetSavoryMix { condiment, sweet } => write!(
                f,
                "[{}] breakfast mixes savory condiment '{}' with sweet ingredient '{}'",
                self.rule(),
                condiment,
                sweet
            ),
        }
    }
}

impl std::error::Error for CulinaryViolation {}

/// Check a recipe's ingredient list against the compatibility rules.
///
/// `pantry-staple` and `unknown` ingredients never take part in a check.
pub fn validate_recipe_ingredients<'a, I>(
    ingredients: I,
    recipe_category: Option<RecipeCategory>,
) -> Result<(), CulinaryViolation>
where
    I: IntoIterator<Item = &'a str>,
{
    let categorized: Vec<(&str, CulinaryCategory)> = ingredients
        .into_iter()
        .map(|name| (name, categorize_ingredient(name)))
        .filter(|(_, category)| !matches!(category, Unknown | PantryStaple))
        .collect();

    let first = |pred: &dyn Fn(CulinaryCategory) -> bool| {
        categorized
            .iter()
            .find(|(_, category)| pred(*category))
            .map(|(name, category)| (name.to_string(), *category))
    };

    let condiment = first(&|c| c == CondimentSavory);
    let sweet = first(&|c| c.is_sweet());

    match recipe_category {
        Some(RecipeCategory::Dessert) => {
            if let Some((ingredient, category)) =
                first(&|c| c == CondimentSavory || c.is_savory_main())
            {
                return Err(CulinaryViolation::SavoryInDessert {
                    ingredient,
                    category,
                });
            }
        }
        Some(RecipeCategory::Breakfast) => {
            if let (Some((condiment, _)), Some((sweet, _))) = (&condiment, &sweet) {
                return Err(CulinaryViolation::BreakfastSweetSavoryMix {
                    condiment: condiment.clone(),
                    sweet: sweet.clone(),
                });
            }
        }
        _ => {}
    }

    if let (Some((condiment, _)), Some((sweet, _))) = (condiment, sweet) {
        return Err(CulinaryViolation::CondimentWithSweet { condiment, sweet });
    }

    Ok(())
}

/// Run the compatibility rules on a full recipe, deriving its category from tags
pub fn validate_recipe(recipe: &Recipe) -> Result<(), CulinaryViolation> {
    validate_recipe_ingredients(
        recipe.ingredient_names(),
        RecipeCategory::from_tags(&recipe.tags),
    )
}

const CROSS_CATEGORY_SUBSTITUTIONS: &[(CulinaryCategory, CulinaryCategory)] = &[
    (DairyNeutral, SweetDessert),
    (GrainNeutral, SweetDessert),
    (SpiceNeutral, SweetDessert),
];

const FORBIDDEN_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("granola", "bread"),
    ("bread", "granola"),
    ("cereal", "bread"),
];

/// Whether swapping `original` for `substitute` makes culinary sense
pub fn is_valid_substitution(original: &str, substitute: &str) -> bool {
    let original_lower = original.to_lowercase();
    let substitute_lower = substitute.to_lowercase();

    if FORBIDDEN_SUBSTITUTIONS
        .iter()
        .any(|(from, to)| original_lower.contains(from) && substitute_lower.contains(to))
    {
        return false;
    }

    let from = categorize_ingredient(original);
    let to = categorize_ingredient(substitute);

    if from == to {
        return true;
    }

    if CROSS_CATEGORY_SUBSTITUTIONS
        .iter()
        .any(|&(a, b)| (from == a && to == b) || (from == b && to == a))
    {
        return true;
    }

    from == Unknown || to == Unknown
}

/// Rule text appended to generation prompts so bad combinations are
/// discouraged up front, not only rejected afterwards
pub const CULINARY_RULES_PROMPT: &str = include_str!("prompts/culinary_rules.txt");
