//! Scan session state machine.
//!
//! One session slot, observed through a `watch` channel. Every mutation
//! names the session it belongs to and is dropped if that session has since
//! been reset or replaced.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::RecipeClient;
use crate::config::ImageConfig;
use crate::error::{ChefError, ScanError};
use crate::images::{prepare_images, ImageSource, PreparedImage};
use crate::model::{Recipe, RecipeResult, StreamChunk};
use crate::store::{RecipeBook, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Idle,
    Capturing,
    Processing,
    Analyzing,
    Streaming,
    Success,
    Error,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Success | ScanStatus::Error)
    }
}

/// Observable state of one capture-to-recipe attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    pub id: String,
    pub status: ScanStatus,
    pub image_sources: Vec<ImageSource>,
    pub prepared_images: Vec<PreparedImage>,
    pub detected_ingredients: Vec<String>,
    pub generated_recipe: Option<Recipe>,
    pub error: Option<ScanError>,
    /// Text accumulated while streaming
    pub partial_text: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    fn new(image_sources: Vec<ImageSource>) -> Self {
        Self {
            id: format!("scan_{}", Uuid::new_v4().simple()),
            status: ScanStatus::Capturing,
            image_sources,
            prepared_images: Vec::new(),
            detected_ingredients: Vec::new(),
            generated_recipe: None,
            error: None,
            partial_text: String::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

pub struct ScanCoordinator {
    client: RecipeClient,
    recipes: RecipeBook,
    settings: SettingsStore,
    image_config: ImageConfig,
    session: watch::Sender<Option<ScanSession>>,
    cancel: Mutex<CancellationToken>,
}

impl ScanCoordinator {
    pub fn new(
        client: RecipeClient,
        recipes: RecipeBook,
        settings: SettingsStore,
        image_config: ImageConfig,
    ) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            client,
            recipes,
            settings,
            image_config,
            session,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ScanSession>> {
        self.session.subscribe()
    }

    pub fn snapshot(&self) -> Option<ScanSession> {
        self.session.borrow().clone()
    }

    pub fn status(&self) -> ScanStatus {
        self.session
            .borrow()
            .as_ref()
            .map_or(ScanStatus::Idle, |s| s.status)
    }

    /// Cancel whatever is in flight and install a fresh token
    fn renew_token(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `change` only if `id` is still the current session
    fn update(&self, id: &str, change: impl FnOnce(&mut ScanSession)) -> bool {
        self.session.send_if_modified(|slot| match slot {
            Some(session) if session.id == id => {
                change(session);
                true
            }
            _ => false,
        })
    }

    fn is_current(&self, id: &str) -> bool {
        self.session
            .borrow()
            .as_ref()
            .is_some_and(|s| s.id == id)
    }

    /// Start a new session for the given photos, replacing any previous one
    pub fn start_scan(&self, sources: Vec<ImageSource>) -> ScanSession {
        self.renew_token();
        let session = ScanSession::new(sources);
        info!(
            "Started scan {} with {} image(s)",
            session.id,
            session.image_sources.len()
        );
        if let Some(previous) = self.session.send_replace(Some(session.clone())) {
            if !previous.status.is_terminal() {
                warn!("Discarded in-flight scan {}", previous.id);
            }
        }
        session
    }

    /// Drop the current session and cancel its model call
    pub fn reset(&self) {
        self.renew_token();
        if let Some(previous) = self.session.send_replace(None) {
            info!("Reset scan {}", previous.id);
        }
    }

    pub fn retake(&self) {
        self.reset()
    }

    /// Remember what the detection pre-check found for the current session
    pub fn set_detected_ingredients(&self, ingredients: Vec<String>) -> Result<(), ChefError> {
        let id = self
            .snapshot()
            .map(|s| s.id)
            .ok_or(ChefError::NoActiveSession)?;
        self.update(&id, |s| s.detected_ingredients = ingredients);
        Ok(())
    }

    /// Prepare the session's photos and generate a recipe
    pub async fn confirm_and_generate(&self) -> Result<Recipe, ChefError> {
        self.run(None).await
    }

    /// Streaming variant; increments also accumulate in `partial_text`
    pub async fn confirm_and_generate_streaming(
        &self,
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> Result<Recipe, ChefError> {
        self.run(Some(on_chunk)).await
    }

    async fn run(
        &self,
        on_chunk: Option<&mut (dyn FnMut(StreamChunk) + Send)>,
    ) -> Result<Recipe, ChefError> {
        let session = self.snapshot().ok_or(ChefError::NoActiveSession)?;
        let id = session.id;
        let cancel = self.current_token();

        // Capturing -> Processing is checked and applied under one borrow so
        // a session is only ever handed to the model once
        let mut start = Err(ChefError::SessionReplaced(id.clone()));
        self.session.send_if_modified(|slot| {
            let Some(s) = slot.as_mut().filter(|s| s.id == id) else {
                return false;
            };
            if s.status != ScanStatus::Capturing {
                start = Err(ChefError::SessionNotReady {
                    id: id.clone(),
                    status: s.status,
                });
                return false;
            }
            if s.image_sources.is_empty() {
                let err = ScanError::api("No photo to analyze; capture or choose one first");
                s.status = ScanStatus::Error;
                s.error = Some(err.clone());
                s.completed_at = Some(Utc::now());
                start = Err(err.into());
                return true;
            }
            s.status = ScanStatus::Processing;
            start = Ok(());
            true
        });
        start?;

        let outcome = self
            .generate(&id, &session.image_sources, on_chunk, &cancel)
            .await;

        if !self.is_current(&id) {
            info!("Ignoring result of replaced scan {}", id);
            return Err(ChefError::SessionReplaced(id));
        }

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("Scan {} failed: {}", id, e);
                self.fail(&id, e.clone());
                return Err(e.into());
            }
        };

        let recipe = result.recipe;
        if let Err(e) = self.recipes.save(&recipe) {
            error!("Failed to save recipe from scan {}: {}", id, e);
            self.fail(&id, ScanError::api(format!("Failed to save recipe: {e}")));
            return Err(e.into());
        }

        let completed = self.update(&id, |s| {
            s.status = ScanStatus::Success;
            s.generated_recipe = Some(recipe.clone());
            s.completed_at = Some(Utc::now());
        });
        if !completed {
            return Err(ChefError::SessionReplaced(id));
        }
        Ok(recipe)
    }

    fn fail(&self, id: &str, err: ScanError) {
        self.update(id, |s| {
            s.status = ScanStatus::Error;
            s.error = Some(err);
            s.completed_at = Some(Utc::now());
        });
    }

    async fn generate(
        &self,
        id: &str,
        sources: &[ImageSource],
        on_chunk: Option<&mut (dyn FnMut(StreamChunk) + Send)>,
        cancel: &CancellationToken,
    ) -> Result<RecipeResult, ScanError> {
        let images = prepare_images(sources, &self.image_config).await?;
        let options = self.settings.get().prompt_options();
        let status = if on_chunk.is_some() {
            ScanStatus::Streaming
        } else {
            ScanStatus::Analyzing
        };

        let handed_over = self.update(id, |s| {
            s.prepared_images = images.clone();
            s.partial_text.clear();
            s.status = status;
        });
        if !handed_over {
            return Err(ScanError::api("Scan was replaced"));
        }

        match on_chunk {
            None => {
                self.client
                    .generate_recipe_from_image(&images, None, &options, cancel)
                    .await
            }
            Some(on_chunk) => {
                let mut forward = |chunk: StreamChunk| {
                    if !chunk.is_complete {
                        self.update(id, |s| {
                            if s.status == ScanStatus::Streaming {
                                s.partial_text.push_str(&chunk.content);
                            }
                        });
                    }
                    on_chunk(chunk);
                };
                self.client
                    .generate_recipe_stream(&images, None, &options, &mut forward, cancel)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::error::ScanErrorCode;
    use crate::providers::scripted::ScriptedProvider;
    use crate::providers::LlmProvider;
    use crate::store::{KeyValueStore, MemoryStore};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn photo(shade: u8) -> ImageSource {
        let img = RgbImage::from_pixel(32, 24, Rgb([shade, 120, 60]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        ImageSource::Base64(STANDARD.encode(out))
    }

    fn omelette() -> String {
        json!({
            "title": "Spinach Omelette",
            "ingredients": [
                {"name": "eggs", "quantity": 3, "unit": "piece"},
                {"name": "spinach", "quantity": 1, "unit": "cup"}
            ],
            "steps": [{"stepNumber": 1, "instruction": "Whisk and cook"}],
            "tags": ["Breakfast"],
            "detectedItems": ["eggs", "spinach"]
        })
        .to_string()
    }

    fn coordinator(provider: Arc<dyn LlmProvider>) -> (ScanCoordinator, RecipeBook) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let recipes = RecipeBook::new(store.clone());
        let coordinator = ScanCoordinator::new(
            RecipeClient::new(provider, &AppConfig::default()),
            recipes.clone(),
            SettingsStore::new(store),
            ImageConfig::default(),
        );
        (coordinator, recipes)
    }

    #[tokio::test]
    async fn test_confirm_without_session() {
        let (coordinator, _) = coordinator(ScriptedProvider::new(omelette()));
        assert_eq!(coordinator.status(), ScanStatus::Idle);
        assert!(matches!(
            coordinator.confirm_and_generate().await,
            Err(ChefError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_successful_scan_saves_recipe() {
        let (coordinator, recipes) = coordinator(ScriptedProvider::new(omelette()));
        coordinator.start_scan(vec![photo(10), photo(20)]);
        assert_eq!(coordinator.status(), ScanStatus::Capturing);

        let recipe = coordinator.confirm_and_generate().await.unwrap();

        let session = coordinator.snapshot().unwrap();
        assert_eq!(session.status, ScanStatus::Success);
        assert_eq!(session.prepared_images.len(), 2);
        assert_eq!(session.generated_recipe.as_ref(), Some(&recipe));
        assert!(session.completed_at.is_some());
        assert_eq!(recipes.get(&recipe.id), Some(recipe));
    }

    #[tokio::test]
    async fn test_no_food_ends_in_error_state() {
        let provider = ScriptedProvider::new(r#"{"error":"NO_FOOD_DETECTED","message":"empty shelf"}"#);
        let (coordinator, recipes) = coordinator(provider);
        coordinator.start_scan(vec![photo(0)]);

        let err = coordinator.confirm_and_generate().await.unwrap_err();
        assert!(matches!(err, ChefError::Scan(ScanError::NoFoodDetected { .. })));

        let session = coordinator.snapshot().unwrap();
        assert_eq!(session.status, ScanStatus::Error);
        assert_eq!(session.error.map(|e| e.code().as_str()), Some("NO_FOOD_DETECTED"));
        assert!(recipes.all().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_fills_partial_text() {
        let (coordinator, _) = coordinator(ScriptedProvider::new(omelette()));
        coordinator.start_scan(vec![photo(30)]);

        let mut chunks = Vec::new();
        coordinator
            .confirm_and_generate_streaming(&mut |chunk: StreamChunk| chunks.push(chunk))
            .await
            .unwrap();

        let session = coordinator.snapshot().unwrap();
        assert_eq!(session.partial_text, "The new recipe is");
        assert_eq!(session.status, ScanStatus::Success);
        assert_eq!(chunks.len(), 5);
        assert!(chunks[4].is_complete);
    }

    #[tokio::test]
    async fn test_stale_result_never_touches_new_session() {
        let gate = Arc::new(Notify::new());
        let (coordinator, recipes) = coordinator(ScriptedProvider::gated(omelette(), gate.clone()));
        let coordinator = Arc::new(coordinator);

        let first = coordinator.start_scan(vec![photo(1)]);
        let mut watcher = coordinator.subscribe();

        let in_flight = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.confirm_and_generate().await })
        };

        watcher
            .wait_for(|s| s.as_ref().is_some_and(|s| s.status == ScanStatus::Analyzing))
            .await
            .unwrap();

        coordinator.retake();
        let second = coordinator.start_scan(vec![photo(2)]);
        gate.notify_waiters();

        let stale = in_flight.await.unwrap();
        assert!(matches!(stale, Err(ChefError::SessionReplaced(id)) if id == first.id));

        let current = coordinator.snapshot().unwrap();
        assert_eq!(current.id, second.id);
        assert_eq!(current.status, ScanStatus::Capturing);
        assert_eq!(current.image_sources, vec![photo(2)]);
        assert!(current.generated_recipe.is_none());
        assert!(current.error.is_none());
        assert!(recipes.all().is_empty());
    }

    #[tokio::test]
    async fn test_finished_session_is_not_generated_again() {
        let provider = ScriptedProvider::new(omelette());
        let (coordinator, recipes) = coordinator(provider.clone());
        let session = coordinator.start_scan(vec![photo(40)]);
        let recipe = coordinator.confirm_and_generate().await.unwrap();

        let again = coordinator.confirm_and_generate().await;
        assert!(matches!(
            again,
            Err(ChefError::SessionNotReady { ref id, status: ScanStatus::Success }) if *id == session.id
        ));

        assert_eq!(provider.seen.lock().unwrap().len(), 1);
        assert_eq!(recipes.all(), vec![recipe.clone()]);
        let current = coordinator.snapshot().unwrap();
        assert_eq!(current.status, ScanStatus::Success);
        assert_eq!(current.generated_recipe, Some(recipe));
    }

    #[tokio::test]
    async fn test_confirm_while_generating_is_rejected() {
        let gate = Arc::new(Notify::new());
        let provider = ScriptedProvider::gated(omelette(), gate.clone());
        let (coordinator, recipes) = coordinator(provider.clone());
        let coordinator = Arc::new(coordinator);
        coordinator.start_scan(vec![photo(50)]);
        let mut watcher = coordinator.subscribe();

        let in_flight = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.confirm_and_generate().await })
        };
        watcher
            .wait_for(|s| s.as_ref().is_some_and(|s| s.status == ScanStatus::Analyzing))
            .await
            .unwrap();

        assert!(matches!(
            coordinator.confirm_and_generate().await,
            Err(ChefError::SessionNotReady { status: ScanStatus::Analyzing, .. })
        ));
        gate.notify_waiters();

        in_flight.await.unwrap().unwrap();
        assert_eq!(provider.seen.lock().unwrap().len(), 1);
        assert_eq!(recipes.all().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_without_photos_fails_before_the_model() {
        let provider = ScriptedProvider::new(omelette());
        let (coordinator, recipes) = coordinator(provider.clone());
        coordinator.start_scan(vec![]);

        let err = coordinator.confirm_and_generate().await.unwrap_err();
        match err {
            ChefError::Scan(scan) => {
                assert_eq!(scan.code(), ScanErrorCode::ApiError);
                assert!(scan.is_recoverable());
            }
            other => panic!("unexpected error {other:?}"),
        }

        let session = coordinator.snapshot().unwrap();
        assert_eq!(session.status, ScanStatus::Error);
        assert!(session.error.is_some_and(|e| e.is_recoverable()));
        assert!(session.completed_at.is_some());
        assert!(provider.seen.lock().unwrap().is_empty());
        assert!(recipes.all().is_empty());
    }

    #[tokio::test]
    async fn test_update_ignores_other_ids() {
        let (coordinator, _) = coordinator(ScriptedProvider::new(omelette()));
        let session = coordinator.start_scan(vec![]);
        assert!(!coordinator.update("scan_old", |s| s.status = ScanStatus::Error));
        assert!(coordinator.update(&session.id, |s| s.detected_ingredients.push("egg".into())));
        assert_eq!(coordinator.status(), ScanStatus::Capturing);

        coordinator.reset();
        assert!(coordinator.snapshot().is_none());
        assert!(!coordinator.update(&session.id, |s| s.status = ScanStatus::Error));
    }
}
