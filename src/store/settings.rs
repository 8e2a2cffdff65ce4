use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::prompts::PromptOptions;
use crate::store::{load, load_or_default, save, KeyValueStore, SETTINGS_KEY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub dietary_restrictions: Vec<String>,
    pub preferred_cuisines: Vec<String>,
    pub servings_default: u32,
    pub notifications_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            dietary_restrictions: Vec::new(),
            preferred_cuisines: Vec::new(),
            servings_default: 2,
            notifications_enabled: true,
        }
    }
}

impl UserSettings {
    /// Prompt context derived from the user's preferences
    pub fn prompt_options(&self) -> PromptOptions {
        PromptOptions {
            dietary_restrictions: self.dietary_restrictions.clone(),
            cuisine_preference: self.preferred_cuisines.first().cloned(),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn get(&self) -> UserSettings {
        load_or_default(self.store.as_ref(), SETTINGS_KEY)
    }

    pub fn save(&self, settings: &UserSettings) -> Result<(), StorageError> {
        save(self.store.as_ref(), SETTINGS_KEY, settings)
    }

    /// Read-modify-write the stored settings
    pub fn update<F>(&self, change: F) -> Result<UserSettings, StorageError>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut settings: UserSettings = load(self.store.as_ref(), SETTINGS_KEY)?;
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn add_dietary_restriction(&self, restriction: &str) -> Result<UserSettings, StorageError> {
        self.update(|s| {
            if !s.dietary_restrictions.iter().any(|r| r == restriction) {
                s.dietary_restrictions.push(restriction.to_string());
            }
        })
    }

    pub fn remove_dietary_restriction(&self, restriction: &str) -> Result<UserSettings, StorageError> {
        self.update(|s| s.dietary_restrictions.retain(|r| r != restriction))
    }

    pub fn add_preferred_cuisine(&self, cuisine: &str) -> Result<UserSettings, StorageError> {
        self.update(|s| {
            if !s.preferred_cuisines.iter().any(|c| c == cuisine) {
                s.preferred_cuisines.push(cuisine.to_string());
            }
        })
    }

    pub fn remove_preferred_cuisine(&self, cuisine: &str) -> Result<UserSettings, StorageError> {
        self.update(|s| s.preferred_cuisines.retain(|c| c != cuisine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    #[test]
    fn test_defaults_when_missing_or_corrupt() {
        let memory = Arc::new(MemoryStore::new());
        let settings = SettingsStore::new(memory.clone());
        assert_eq!(settings.get(), UserSettings::default());

        memory.set(SETTINGS_KEY, "][").unwrap();
        assert_eq!(settings.get().servings_default, 2);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let memory = Arc::new(MemoryStore::new());
        memory
            .set(SETTINGS_KEY, r#"{"dietaryRestrictions": ["vegan"]}"#)
            .unwrap();
        let settings = SettingsStore::new(memory).get();
        assert_eq!(settings.dietary_restrictions, vec!["vegan"]);
        assert!(settings.notifications_enabled);
    }

    #[test]
    fn test_restrictions_and_prompt_options() {
        let settings = SettingsStore::new(Arc::new(MemoryStore::new()));
        settings.add_dietary_restriction("vegan").unwrap();
        settings.add_dietary_restriction("vegan").unwrap();
        settings.add_preferred_cuisine("Thai").unwrap();
        settings.add_preferred_cuisine("Italian").unwrap();

        let options = settings.get().prompt_options();
        assert_eq!(options.dietary_restrictions, vec!["vegan"]);
        assert_eq!(options.cuisine_preference.as_deref(), Some("Thai"));

        let after = settings.remove_dietary_restriction("vegan").unwrap();
        assert!(after.dietary_restrictions.is_empty());
    }
}
