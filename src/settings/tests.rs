//! Tests for the settings engine.

use super::*;
use crate::catalog::{CatalogEntry, CatalogResponse};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Catalog double returning a fixed answer and counting fetches.
struct StaticCatalog {
    response: Option<CatalogResponse>,
    fetches: AtomicUsize,
}

impl StaticCatalog {
    fn with_models(ids: &[&str], default_model: &str) -> Self {
        let models = ids
            .iter()
            .map(|id| CatalogEntry {
                id: id.to_string(),
                label: crate::catalog::label_for(id).to_string(),
                is_default: *id == default_model,
            })
            .collect();
        Self {
            response: Some(CatalogResponse {
                models,
                default_model: default_model.to_string(),
            }),
            fetches: AtomicUsize::new(0),
        }
    }

    fn unavailable() -> Self {
        Self {
            response: None,
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch_catalog(&self) -> Result<CatalogResponse, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.response.clone().ok_or(CatalogError::Status(503))
    }
}

/// Store that fails every operation, like a browser with storage disabled.
struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("disabled".to_string()))
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("quota exceeded".to_string()))
    }

    fn remove(&mut self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disabled".to_string()))
    }
}

type TestEngine = SettingsEngine<MemoryStore, SequentialIds>;

fn engine_with(store: MemoryStore) -> TestEngine {
    SettingsEngine::with_id_provider(store, SequentialIds::new("custom"))
}

async fn initialized(store: MemoryStore, catalog: &StaticCatalog) -> TestEngine {
    let mut engine = engine_with(store);
    engine.initialize(catalog).await;
    engine
}

fn configured_store(selected: &str) -> MemoryStore {
    let settings = Settings {
        api_base: "https://api.example.com/v1".to_string(),
        api_key: "sk-user".to_string(),
        selected_model_id: selected.to_string(),
        ..Settings::default()
    };
    MemoryStore::new().with_entry(SETTINGS_KEY, &settings.to_json().unwrap())
}

fn stored(engine: &TestEngine) -> Settings {
    load_settings(engine.store()).unwrap().unwrap()
}

fn option_ids(engine: &TestEngine) -> Vec<String> {
    engine.model_options().into_iter().map(|o| o.value).collect()
}

// =========================================================================
// Initialization
// =========================================================================

#[tokio::test]
async fn starts_loading_with_defaults() {
    let engine = engine_with(MemoryStore::new());

    assert!(engine.is_loading_free_models());
    assert_eq!(engine.settings(), &Settings::default());
}

#[tokio::test]
async fn first_run_adopts_catalog_default() {
    let catalog = StaticCatalog::with_models(&["deepseek", "mistral"], "mistral");
    let engine = initialized(MemoryStore::new(), &catalog).await;

    assert!(!engine.is_loading_free_models());
    assert_eq!(engine.settings().selected_model_id, "mistral");
    assert_eq!(engine.default_free_model_id(), "mistral");
    assert_eq!(
        engine.model_options(),
        vec![
            ModelChoice { value: "deepseek".to_string(), label: "DeepSeek".to_string() },
            ModelChoice { value: "mistral".to_string(), label: "Mistral".to_string() },
        ]
    );
    assert_eq!(engine.selected_model_value(), "mistral");
}

#[tokio::test]
async fn catalog_failure_leaves_only_custom_models() {
    let catalog = StaticCatalog::unavailable();
    let engine = initialized(configured_store("gpt-4o"), &catalog).await;

    assert!(engine.free_models().is_empty());
    assert!(!engine.is_loading_free_models());
    assert_eq!(engine.settings().selected_model_id, "gpt-4o");
    assert_eq!(
        option_ids(&engine),
        vec!["gpt-4o", "gpt-4o-mini", "claude-3-5-sonnet", "deepseek-chat"]
    );
}

#[tokio::test]
async fn catalog_failure_without_custom_api_has_no_options() {
    let catalog = StaticCatalog::unavailable();
    let engine = initialized(MemoryStore::new(), &catalog).await;

    assert!(engine.model_options().is_empty());
    assert_eq!(engine.selected_model_value(), "");
}

#[tokio::test]
async fn initialize_runs_once() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = engine_with(MemoryStore::new());

    engine.initialize(&catalog).await;
    engine.initialize(&catalog).await;

    assert_eq!(catalog.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stored_selection_wins_over_catalog_default() {
    let catalog = StaticCatalog::with_models(&["deepseek", "mistral"], "deepseek");
    let engine = initialized(configured_store("claude-3-5-sonnet"), &catalog).await;

    assert_eq!(engine.settings().selected_model_id, "claude-3-5-sonnet");
    assert_eq!(engine.selected_model_value(), "claude-3-5-sonnet-20241022");
}

#[tokio::test]
async fn malformed_record_falls_back_to_defaults() {
    let store = MemoryStore::new().with_entry(SETTINGS_KEY, "{\"apiBase\": ");
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let engine = initialized(store, &catalog).await;

    assert_eq!(engine.settings().models, default_models());
    assert_eq!(engine.settings().selected_model_id, "deepseek");
}

#[tokio::test]
async fn stored_models_are_merged_with_new_built_ins() {
    let raw = serde_json::json!({
        "apiBase": "https://api.example.com",
        "apiKey": "sk-user",
        "models": [
            {"id": "custom-9", "value": "llama-3", "label": "Llama 3", "isBuiltIn": false},
            {"id": "gpt-4o", "label": "My GPT"}
        ],
        "selectedModelId": "custom-9"
    })
    .to_string();
    let catalog = StaticCatalog::unavailable();
    let engine = initialized(MemoryStore::new().with_entry(SETTINGS_KEY, &raw), &catalog).await;

    let models = &engine.settings().models;
    let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["custom-9", "gpt-4o", "gpt-4o-mini", "claude-3-5-sonnet", "deepseek-chat"]
    );
    assert_eq!(models[1].label, "My GPT");
    assert_eq!(models[1].value, "gpt-4o");
    assert!(models[1].is_built_in);
}

#[tokio::test]
async fn migrates_legacy_selection_and_removes_it() {
    let store = MemoryStore::new().with_entry(LEGACY_MODEL_KEY, "claude-3-5-sonnet-20241022");
    let catalog = StaticCatalog::unavailable();
    let engine = initialized(store, &catalog).await;

    assert_eq!(engine.settings().selected_model_id, "claude-3-5-sonnet");
    assert!(!engine.store().contains(LEGACY_MODEL_KEY));
    assert_eq!(stored(&engine).selected_model_id, "claude-3-5-sonnet");
}

#[tokio::test]
async fn unknown_legacy_value_is_dropped() {
    let store = MemoryStore::new().with_entry(LEGACY_MODEL_KEY, "text-davinci-003");
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let engine = initialized(store, &catalog).await;

    assert_eq!(engine.settings().selected_model_id, "deepseek");
    assert!(!engine.store().contains(LEGACY_MODEL_KEY));
}

#[tokio::test]
async fn legacy_value_ignored_when_settings_exist() {
    let store = configured_store("gpt-4o").with_entry(LEGACY_MODEL_KEY, "deepseek-chat");
    let catalog = StaticCatalog::unavailable();
    let engine = initialized(store, &catalog).await;

    assert_eq!(engine.settings().selected_model_id, "gpt-4o");
    assert!(!engine.store().contains(LEGACY_MODEL_KEY));
}

#[tokio::test]
async fn broken_storage_uses_defaults() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = SettingsEngine::with_id_provider(BrokenStore, SequentialIds::new("m"));
    engine.initialize(&catalog).await;

    assert_eq!(engine.settings().models, default_models());
    assert_eq!(engine.settings().selected_model_id, "deepseek");

    engine.update_api_base("https://api.example.com");
    assert_eq!(engine.settings().api_base, "https://api.example.com");
}

// =========================================================================
// Availability and auto-correction
// =========================================================================

#[tokio::test]
async fn configured_api_lists_free_models_first() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let engine = initialized(configured_store("deepseek"), &catalog).await;

    assert_eq!(
        option_ids(&engine),
        vec!["deepseek", "gpt-4o", "gpt-4o-mini", "claude-3-5-sonnet", "deepseek-chat"]
    );
}

#[tokio::test]
async fn clearing_api_key_reassigns_custom_selection_to_free_default() {
    let catalog = StaticCatalog::with_models(&["deepseek", "mistral"], "mistral");
    let mut engine = initialized(configured_store("gpt-4o-mini"), &catalog).await;
    assert_eq!(engine.settings().selected_model_id, "gpt-4o-mini");

    engine.update_api_key("");

    assert!(!engine.has_custom_api());
    assert_eq!(engine.settings().selected_model_id, "mistral");
    assert_eq!(stored(&engine).selected_model_id, "mistral");
    assert_eq!(option_ids(&engine), vec!["deepseek", "mistral"]);
}

#[tokio::test]
async fn reassigns_to_first_free_model_without_default() {
    let catalog = StaticCatalog::with_models(&["grok", "mistral"], "");
    let mut engine = initialized(configured_store("gpt-4o"), &catalog).await;

    engine.update_api_base("");

    assert_eq!(engine.settings().selected_model_id, "grok");
}

#[tokio::test]
async fn selection_survives_when_nothing_is_available() {
    let catalog = StaticCatalog::unavailable();
    let mut engine = initialized(configured_store("gpt-4o"), &catalog).await;

    engine.update_api_key("");

    assert_eq!(engine.settings().selected_model_id, "gpt-4o");
}

// =========================================================================
// Operations
// =========================================================================

#[tokio::test]
async fn api_fields_are_persisted_immediately() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = initialized(MemoryStore::new(), &catalog).await;

    engine.update_api_base("https://api.example.com/v1");
    engine.update_api_key("sk-new");

    let saved = stored(&engine);
    assert_eq!(saved.api_base, "https://api.example.com/v1");
    assert_eq!(saved.api_key, "sk-new");
    assert!(engine.has_custom_api());
}

#[tokio::test]
async fn add_model_appends_custom_entry() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = initialized(configured_store("deepseek"), &catalog).await;

    let first = engine.add_model(NewModel {
        value: "llama-3-70b".to_string(),
        label: "Llama 3 70B".to_string(),
        no_api_required: None,
    });
    let second = engine.add_model(NewModel {
        value: "qwen-72b".to_string(),
        label: "Qwen 72B".to_string(),
        no_api_required: None,
    });

    assert_eq!(first, "custom-1");
    assert_eq!(second, "custom-2");

    let saved = stored(&engine);
    let added = saved.models.iter().find(|m| m.id == "custom-1").unwrap();
    assert_eq!(added.value, "llama-3-70b");
    assert!(!added.is_built_in);
    assert_eq!(saved.models.last().unwrap().id, "custom-2");
}

#[tokio::test]
async fn update_model_patches_only_given_fields() {
    let catalog = StaticCatalog::unavailable();
    let mut engine = initialized(configured_store("gpt-4o"), &catalog).await;

    let updated = engine.update_model(
        "gpt-4o",
        ModelPatch {
            value: Some("gpt-4o-2024-11-20".to_string()),
            label: None,
        },
    );

    assert!(updated);
    let model = &engine.settings().models[0];
    assert_eq!(model.value, "gpt-4o-2024-11-20");
    assert_eq!(model.label, "GPT-4o");
    assert_eq!(stored(&engine).models[0].value, "gpt-4o-2024-11-20");
}

#[tokio::test]
async fn update_model_with_unknown_id_is_noop() {
    let catalog = StaticCatalog::unavailable();
    let mut engine = initialized(configured_store("gpt-4o"), &catalog).await;
    let before = engine.settings().clone();

    let updated = engine.update_model(
        "missing",
        ModelPatch {
            value: Some("x".to_string()),
            label: Some("y".to_string()),
        },
    );

    assert!(!updated);
    assert_eq!(engine.settings(), &before);
}

#[tokio::test]
async fn deleting_built_in_model_is_noop() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = initialized(configured_store("gpt-4o"), &catalog).await;
    let before = engine.settings().models.clone();

    assert!(!engine.delete_model("gpt-4o"));

    assert_eq!(engine.settings().models, before);
    assert_eq!(engine.settings().selected_model_id, "gpt-4o");
}

#[tokio::test]
async fn deleting_selected_custom_model_falls_back_to_first_model() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = initialized(configured_store("deepseek"), &catalog).await;
    let id = engine.add_model(NewModel {
        value: "llama-3".to_string(),
        label: "Llama 3".to_string(),
        no_api_required: None,
    });
    assert!(engine.select_model(&id));

    assert!(engine.delete_model(&id));

    assert!(engine.settings().models.iter().all(|m| m.id != id));
    assert_eq!(engine.settings().selected_model_id, "gpt-4o");
}

#[tokio::test]
async fn deleting_unselected_custom_model_keeps_selection() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = initialized(configured_store("deepseek"), &catalog).await;
    let id = engine.add_model(NewModel {
        value: "llama-3".to_string(),
        label: "Llama 3".to_string(),
        no_api_required: None,
    });

    assert!(engine.delete_model(&id));

    assert_eq!(engine.settings().selected_model_id, "deepseek");
    assert!(stored(&engine).models.iter().all(|m| m.id != id));
}

#[tokio::test]
async fn select_unknown_model_is_noop() {
    let catalog = StaticCatalog::with_models(&["deepseek", "mistral"], "deepseek");
    let mut engine = initialized(MemoryStore::new(), &catalog).await;

    assert!(!engine.select_model("does-not-exist"));
    assert_eq!(engine.settings().selected_model_id, "deepseek");
}

#[tokio::test]
async fn select_free_model_persists() {
    let catalog = StaticCatalog::with_models(&["deepseek", "mistral"], "deepseek");
    let mut engine = initialized(MemoryStore::new(), &catalog).await;

    assert!(engine.select_model("mistral"));

    assert_eq!(engine.settings().selected_model_id, "mistral");
    assert_eq!(stored(&engine).selected_model_id, "mistral");
}

#[tokio::test]
async fn selecting_custom_model_without_api_is_corrected() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let mut engine = initialized(MemoryStore::new(), &catalog).await;

    assert!(engine.select_model("gpt-4o"));

    assert_eq!(engine.settings().selected_model_id, "deepseek");
}

// =========================================================================
// Request target
// =========================================================================

#[tokio::test]
async fn custom_model_target_carries_credentials() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let engine = initialized(configured_store("claude-3-5-sonnet"), &catalog).await;

    assert_eq!(
        engine.request_target(),
        RequestTarget {
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_key: Some("sk-user".to_string()),
            api_base: Some("https://api.example.com/v1".to_string()),
        }
    );
}

#[tokio::test]
async fn free_model_target_has_no_credentials() {
    let catalog = StaticCatalog::with_models(&["deepseek"], "deepseek");
    let engine = initialized(configured_store("deepseek"), &catalog).await;

    let target = engine.request_target();
    assert_eq!(target.model, "deepseek");
    assert_eq!(target.api_key, None);
    assert_eq!(target.api_base, None);
}
