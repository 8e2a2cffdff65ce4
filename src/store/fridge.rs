use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use crate::availability::merge_available;
use crate::culinary::{categorize_ingredient, CulinaryCategory};
use crate::error::StorageError;
use crate::model::{FoodCategory, FridgeItem, FridgeItemInput, FridgeItemUpdate};
use crate::store::{load, load_or_default, save, KeyValueStore, FRIDGE_ITEMS_KEY};

fn new_item_id() -> String {
    format!("fridge_{}", Uuid::new_v4().simple())
}

/// Best-effort food group for a detected name
fn guess_category(name: &str) -> FoodCategory {
    match categorize_ingredient(name) {
        CulinaryCategory::SavoryProtein => FoodCategory::Protein,
        CulinaryCategory::SavoryVegetable => FoodCategory::Vegetable,
        CulinaryCategory::GrainNeutral => FoodCategory::Grain,
        CulinaryCategory::DairyNeutral => FoodCategory::Dairy,
        CulinaryCategory::SpiceNeutral => FoodCategory::Spice,
        _ => FoodCategory::Other,
    }
}

/// The user's ingredient inventory
#[derive(Clone)]
pub struct Fridge {
    store: Arc<dyn KeyValueStore>,
}

impl Fridge {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn items(&self) -> Vec<FridgeItem> {
        load_or_default(self.store.as_ref(), FRIDGE_ITEMS_KEY)
    }

    fn load(&self) -> Result<Vec<FridgeItem>, StorageError> {
        load(self.store.as_ref(), FRIDGE_ITEMS_KEY)
    }

    fn write(&self, items: &[FridgeItem]) -> Result<(), StorageError> {
        save(self.store.as_ref(), FRIDGE_ITEMS_KEY, items)
    }

    fn modify<F>(&self, id: &str, change: F) -> Result<FridgeItem, StorageError>
    where
        F: FnOnce(&mut FridgeItem),
    {
        let mut items = self.load()?;
        let item = items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        change(item);
        let changed = item.clone();
        self.write(&items)?;
        Ok(changed)
    }

    pub fn add_item(&self, input: FridgeItemInput) -> Result<FridgeItem, StorageError> {
        let item = FridgeItem {
            id: new_item_id(),
            name: input.name.trim().to_string(),
            quantity: input.quantity,
            unit: input.unit,
            category: input.category,
            added_at: Utc::now(),
            last_used_at: None,
            expires_at: input.expires_at,
            image_uri: input.image_uri,
            notes: input.notes,
        };

        let mut items = self.load()?;
        items.push(item.clone());
        self.write(&items)?;
        info!("Added '{}' to the fridge", item.name);
        Ok(item)
    }

    /// Add detected names, skipping any already present (case-insensitive).
    /// Returns only the newly created items.
    pub fn add_items_from_detection(
        &self,
        names: &[String],
        image_uri: Option<&str>,
    ) -> Result<Vec<FridgeItem>, StorageError> {
        let mut items = self.load()?;
        let mut added = Vec::new();

        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let lowered = name.to_lowercase();
            if items.iter().any(|item| item.name.to_lowercase() == lowered) {
                debug!("'{}' already in the fridge", name);
                continue;
            }
            let item = FridgeItem {
                id: new_item_id(),
                name: name.to_string(),
                quantity: None,
                unit: None,
                category: guess_category(name),
                added_at: Utc::now(),
                last_used_at: None,
                expires_at: None,
                image_uri: image_uri.map(str::to_string),
                notes: None,
            };
            items.push(item.clone());
            added.push(item);
        }

        if !added.is_empty() {
            self.write(&items)?;
            info!("Added {} detected item(s) to the fridge", added.len());
        }
        Ok(added)
    }

    pub fn update_item(&self, id: &str, update: FridgeItemUpdate) -> Result<FridgeItem, StorageError> {
        self.modify(id, |item| {
            if let Some(name) = update.name {
                item.name = name;
            }
            if let Some(quantity) = update.quantity {
                item.quantity = Some(quantity);
            }
            if let Some(unit) = update.unit {
                item.unit = Some(unit);
            }
            if let Some(category) = update.category {
                item.category = category;
            }
            if let Some(expires_at) = update.expires_at {
                item.expires_at = Some(expires_at);
            }
            if let Some(notes) = update.notes {
                item.notes = Some(notes);
            }
        })
    }

    pub fn mark_as_used(&self, id: &str) -> Result<FridgeItem, StorageError> {
        self.modify(id, |item| item.last_used_at = Some(Utc::now()))
    }

    /// Remove by id; returns whether anything was removed
    pub fn remove_item(&self, id: &str) -> Result<bool, StorageError> {
        let mut items = self.load()?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.write(&items)?;
        Ok(true)
    }

    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.write(&[])
    }

    /// Case-insensitive match on name and notes
    pub fn search(&self, query: &str) -> Vec<FridgeItem> {
        let query = query.to_lowercase();
        self.items()
            .into_iter()
            .filter(|item| {
                item.name.to_lowercase().contains(&query)
                    || item
                        .notes
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn filter_by_category(&self, category: FoodCategory) -> Vec<FridgeItem> {
        self.items()
            .into_iter()
            .filter(|item| item.category == category)
            .collect()
    }

    /// Inventory names plus scan results not yet committed, de-duplicated
    pub fn available_ingredient_names(&self, scanned: &[String]) -> Vec<String> {
        let names: Vec<String> = self.items().into_iter().map(|item| item.name).collect();
        merge_available(&names, scanned)
    }
}
