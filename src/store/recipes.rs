use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::error::StorageError;
use crate::model::{Recipe, RecipeTag};
use crate::store::{load, load_or_default, save, KeyValueStore, RECIPES_KEY};

/// Saved recipes
#[derive(Clone)]
pub struct RecipeBook {
    store: Arc<dyn KeyValueStore>,
}

impl RecipeBook {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn all(&self) -> Vec<Recipe> {
        load_or_default(self.store.as_ref(), RECIPES_KEY)
    }

    fn load(&self) -> Result<Vec<Recipe>, StorageError> {
        load(self.store.as_ref(), RECIPES_KEY)
    }

    fn write(&self, recipes: &[Recipe]) -> Result<(), StorageError> {
        save(self.store.as_ref(), RECIPES_KEY, recipes)
    }

    /// Insert, or replace the recipe with the same id
    pub fn save(&self, recipe: &Recipe) -> Result<(), StorageError> {
        let mut recipes = self.load()?;
        match recipes.iter_mut().find(|r| r.id == recipe.id) {
            Some(existing) => *existing = recipe.clone(),
            None => recipes.push(recipe.clone()),
        }
        self.write(&recipes)?;
        info!("Saved recipe '{}'", recipe.title);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Recipe> {
        self.all().into_iter().find(|r| r.id == id)
    }

    /// Replace an existing recipe, refreshing `updated_at`
    pub fn update(&self, recipe: &Recipe) -> Result<Recipe, StorageError> {
        let mut recipes = self.load()?;
        let existing = recipes
            .iter_mut()
            .find(|r| r.id == recipe.id)
            .ok_or_else(|| StorageError::NotFound(recipe.id.clone()))?;

        *existing = Recipe {
            updated_at: Utc::now(),
            ..recipe.clone()
        };
        let updated = existing.clone();
        self.write(&recipes)?;
        Ok(updated)
    }

    /// Remove by id; returns whether anything was removed
    pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut recipes = self.load()?;
        let before = recipes.len();
        recipes.retain(|r| r.id != id);
        if recipes.len() == before {
            return Ok(false);
        }
        self.write(&recipes)?;
        Ok(true)
    }

    /// Case-insensitive match on title, description and ingredient names
    pub fn search(&self, query: &str) -> Vec<Recipe> {
        self.all()
            .into_iter()
            .filter(|r| r.matches_query(query))
            .collect()
    }

    /// Recipes carrying every one of `tags`
    pub fn filter_by_tags(&self, tags: &[RecipeTag]) -> Vec<Recipe> {
        self.all()
            .into_iter()
            .filter(|r| tags.iter().all(|tag| r.has_tag(*tag)))
            .collect()
    }
}
