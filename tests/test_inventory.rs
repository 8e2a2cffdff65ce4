use std::sync::Arc;

use fridge_chef::providers::OpenAIProvider;
use fridge_chef::{
    AppConfig, FileStore, FridgeChef, FridgeItemInput, ImageSource, Provider, RecipeClient,
    ScanError,
};
use mockito::Matcher;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn openai_envelope(content: &str) -> String {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
}

fn stir_fry(extra: Option<serde_json::Value>) -> String {
    let mut ingredients = vec![
        json!({"name": "chicken breasts", "quantity": 300, "unit": "g"}),
        json!({"name": "Broccoli", "quantity": 1, "unit": "head"}),
        json!({"name": "vegetable oil", "quantity": 1, "unit": "tbsp"}),
        json!({"name": "garlic", "quantity": 2, "unit": "cloves"}),
    ];
    ingredients.extend(extra);
    json!({
        "title": "Chicken Stir Fry",
        "ingredients": ingredients,
        "steps": [
            {"stepNumber": 1, "instruction": "Slice the chicken"},
            {"stepNumber": 2, "instruction": "Stir fry with the broccoli and garlic"}
        ],
        "tags": ["Dinner", "Quick"]
    })
    .to_string()
}

#[tokio::test]
async fn test_unavailable_ingredient_is_rejected_for_regeneration() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("Chicken Stir Fry".to_string()))
        .with_status(200)
        .with_body(openai_envelope(&stir_fry(Some(
            json!({"name": "soy sauce", "quantity": 2, "unit": "tbsp"}),
        ))))
        .create_async()
        .await;

    let provider = OpenAIProvider::with_base_url(
        "test_key".to_string(),
        server.url(),
        "gpt-4o".to_string(),
    );
    let client = RecipeClient::new(Arc::new(provider), &AppConfig::default());
    let available: Vec<String> = ["chicken breast", "broccoli", "garlic"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let err = client
        .generate_recipe_from_name(
            "Chicken Stir Fry",
            &available,
            &Default::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        ScanError::ApiError {
            message,
            recoverable,
        } => {
            assert!(recoverable);
            assert!(message.contains("soy sauce"));
            // plural and case differences still match, oil is a staple
            assert!(!message.contains("chicken"));
            assert!(!message.contains("oil"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_recipe_from_name_uses_fridge_inventory() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("broccoli".to_string()))
        .with_status(200)
        .with_body(openai_envelope(&stir_fry(Some(
            json!({"name": "sesame seeds", "quantity": 1, "unit": "tsp", "isOptional": true}),
        ))))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let chef = FridgeChef::builder()
        .config(AppConfig::default())
        .provider(Provider::OpenAI)
        .api_key("test_key")
        .base_url(server.url())
        .data_dir(dir.path())
        .build()
        .unwrap();
    for name in ["chicken breast", "broccoli", "garlic"] {
        chef.add_fridge_item(FridgeItemInput::named(name)).unwrap();
    }

    let result = chef
        .generate_recipe_from_name("Chicken Stir Fry", &CancellationToken::new())
        .await
        .unwrap();
    mock.assert_async().await;

    assert_eq!(
        result.recipe.missing_optional,
        Some(vec!["sesame seeds".to_string()])
    );
}

#[tokio::test]
async fn test_ideas_are_truncated_to_count() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(openai_envelope(
            r#"["Frittata", "Shakshuka", "Fried Rice", "Egg Drop Soup"]"#,
        ))
        .create_async()
        .await;

    let chef = FridgeChef::builder()
        .config(AppConfig::default())
        .provider(Provider::OpenAI)
        .api_key("test_key")
        .base_url(server.url())
        .build()
        .unwrap();
    chef.add_fridge_item(FridgeItemInput::named("eggs")).unwrap();

    let ideas = chef
        .generate_recipe_ideas(2, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(ideas, vec!["Frittata", "Shakshuka"]);
}

#[tokio::test]
async fn test_detection_failure_degrades_to_empty() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .create_async()
        .await;

    let chef = FridgeChef::builder()
        .config(AppConfig::default())
        .provider(Provider::OpenAI)
        .api_key("test_key")
        .base_url(server.url())
        .build()
        .unwrap();

    let missing = vec![ImageSource::path("/no/such/photo.jpg")];
    let cancel = CancellationToken::new();
    assert!(chef.detect_ingredients(&missing, &cancel).await.is_empty());
    assert!(chef.detect_ingredients(&[], &cancel).await.is_empty());
}

#[test]
fn test_detected_items_dedup_and_persist() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let chef = FridgeChef::builder()
        .config(AppConfig::default())
        .provider(Provider::OpenAI)
        .api_key("test_key")
        .store(store.clone())
        .build()
        .unwrap();

    chef.add_fridge_item(FridgeItemInput::named("Tomato")).unwrap();
    let added = chef
        .add_items_from_detection(
            &["tomato".to_string(), "milk".to_string(), "Milk".to_string()],
            Some("file:///scan.jpg"),
        )
        .unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].name, "milk");

    // a second service over the same directory sees the same inventory
    let reopened = FridgeChef::builder()
        .config(AppConfig::default())
        .provider(Provider::OpenAI)
        .api_key("test_key")
        .store(store)
        .build()
        .unwrap();
    let names: Vec<String> = reopened.fridge().items().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["Tomato", "milk"]);

    assert!(reopened.remove_fridge_item(&added[0].id).unwrap());
    assert_eq!(chef.fridge().items().len(), 1);
}
