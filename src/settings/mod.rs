//! Client-side settings and model resolution.
//!
//! Three model sources feed the engine:
//! - free models advertised by the gateway catalog (no API key needed)
//! - user-added custom models
//! - built-in defaults shipped with the application
//!
//! The engine decides which model is active, keeps that choice valid as the
//! configuration changes, and persists every change to a client-local
//! key-value store.

mod catalog_client;
mod ids;
mod merge;
mod storage;
#[cfg(test)]
mod tests;
mod types;

pub use catalog_client::{free_model_options, CatalogError, CatalogSource, HttpCatalog};
pub use ids::{IdProvider, SequentialIds, UuidIds};
pub use merge::reconcile_models;
pub use storage::{load_settings, save_settings, KeyValueStore, MemoryStore, SqliteStore, StorageError};
pub use types::*;

/// Settings state machine for one client session.
pub struct SettingsEngine<S, I = UuidIds> {
    store: S,
    ids: I,
    settings: Settings,
    free_models: Vec<ModelOption>,
    is_loading_free_models: bool,
    default_free_model_id: String,
    initialized: bool,
}

impl<S: KeyValueStore> SettingsEngine<S, UuidIds> {
    pub fn new(store: S) -> Self {
        Self::with_id_provider(store, UuidIds)
    }
}

impl<S: KeyValueStore, I: IdProvider> SettingsEngine<S, I> {
    /// Create an engine holding defaults. Call [`initialize`](Self::initialize)
    /// before relying on the selection.
    pub fn with_id_provider(store: S, ids: I) -> Self {
        Self {
            store,
            ids,
            settings: Settings::default(),
            free_models: Vec::new(),
            is_loading_free_models: true,
            default_free_model_id: String::new(),
            initialized: false,
        }
    }

    /// Load stored settings and the free model catalog, then commit them.
    ///
    /// Runs once; later calls return immediately.
    pub async fn initialize<C: CatalogSource + ?Sized>(&mut self, catalog: &C) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        self.is_loading_free_models = true;

        let store = &mut self.store;
        let (loaded, fetched) =
            tokio::join!(async move { load_session_settings(store) }, catalog.fetch_catalog());
        let LoadedSettings {
            mut settings,
            migrated,
        } = loaded;

        match fetched {
            Ok(catalog) => {
                let (models, default_id) = free_model_options(catalog);
                tracing::debug!(count = models.len(), default = %default_id, "Loaded free model catalog");
                if settings.selected_model_id.is_empty() {
                    settings.selected_model_id = default_id.clone();
                }
                self.free_models = models;
                self.default_free_model_id = default_id;
            }
            Err(e) => {
                tracing::warn!("Free models unavailable, continuing with custom models: {}", e);
            }
        }

        self.settings = settings;
        self.is_loading_free_models = false;

        if migrated {
            self.persist();
        }
        self.ensure_selection_available();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn free_models(&self) -> &[ModelOption] {
        &self.free_models
    }

    pub fn is_loading_free_models(&self) -> bool {
        self.is_loading_free_models
    }

    pub fn default_free_model_id(&self) -> &str {
        &self.default_free_model_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn has_custom_api(&self) -> bool {
        self.settings.has_custom_api()
    }

    /// Models the user may pick right now: free models first, then custom and
    /// built-in models when a custom API is configured.
    pub fn available_models(&self) -> impl Iterator<Item = &ModelOption> + '_ {
        let custom: &[ModelOption] = if self.has_custom_api() {
            &self.settings.models
        } else {
            &[]
        };
        self.free_models.iter().chain(custom.iter())
    }

    /// The selected model, looked up among available models first.
    pub fn selected_model(&self) -> Option<&ModelOption> {
        let id = &self.settings.selected_model_id;
        self.available_models()
            .find(|m| &m.id == id)
            .or_else(|| self.settings.models.iter().find(|m| &m.id == id))
    }

    pub fn update_api_base(&mut self, value: impl Into<String>) {
        self.settings.api_base = value.into();
        self.persist();
        self.ensure_selection_available();
    }

    pub fn update_api_key(&mut self, value: impl Into<String>) {
        self.settings.api_key = value.into();
        self.persist();
        self.ensure_selection_available();
    }

    /// Append a custom model and return its new id.
    pub fn add_model(&mut self, model: NewModel) -> String {
        let id = self.ids.next_id();
        self.settings.models.push(ModelOption {
            id: id.clone(),
            value: model.value,
            label: model.label,
            is_built_in: false,
            no_api_required: model.no_api_required,
        });
        self.persist();
        self.ensure_selection_available();
        id
    }

    /// Patch a model's value and/or label. Returns false when `id` is unknown.
    pub fn update_model(&mut self, id: &str, patch: ModelPatch) -> bool {
        let Some(model) = self.settings.models.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if let Some(value) = patch.value {
            model.value = value;
        }
        if let Some(label) = patch.label {
            model.label = label;
        }
        self.persist();
        true
    }

    /// Remove a custom model. Built-in and unknown ids are left alone.
    pub fn delete_model(&mut self, id: &str) -> bool {
        let Some(position) = self.settings.models.iter().position(|m| m.id == id) else {
            return false;
        };
        if self.settings.models[position].is_built_in {
            tracing::debug!(model = id, "Refusing to delete built-in model");
            return false;
        }

        self.settings.models.remove(position);
        if self.settings.selected_model_id == id {
            self.settings.selected_model_id = self
                .settings
                .models
                .first()
                .map(|m| m.id.clone())
                .unwrap_or_default();
        }
        self.persist();
        self.ensure_selection_available();
        true
    }

    /// Select a model by id. Unknown ids are ignored.
    pub fn select_model(&mut self, id: &str) -> bool {
        let exists = self.available_models().any(|m| m.id == id)
            || self.settings.models.iter().any(|m| m.id == id);
        if !exists {
            return false;
        }
        self.settings.selected_model_id = id.to_string();
        self.persist();
        self.ensure_selection_available();
        true
    }

    /// Upstream identifier of the selected model, else the catalog default.
    pub fn selected_model_value(&self) -> String {
        self.selected_model()
            .map(|m| m.value.as_str())
            .filter(|value| !value.is_empty())
            .unwrap_or(self.default_free_model_id.as_str())
            .to_string()
    }

    /// Available models as `{value, label}` pairs, `value` being the model id.
    pub fn model_options(&self) -> Vec<ModelChoice> {
        self.available_models()
            .map(|m| ModelChoice {
                value: m.id.clone(),
                label: m.label.clone(),
            })
            .collect()
    }

    /// Model and credentials for the next completion request.
    ///
    /// The custom API key and base are only attached when a custom API is
    /// configured and the selected model is not a free one.
    pub fn request_target(&self) -> RequestTarget {
        let use_custom_api = self.has_custom_api()
            && self.selected_model().map(ModelOption::requires_api).unwrap_or(false);

        RequestTarget {
            model: self.selected_model_value(),
            api_key: use_custom_api.then(|| self.settings.api_key.clone()),
            api_base: use_custom_api.then(|| self.settings.api_base.clone()),
        }
    }

    /// Reassign the selection when it is not among the available models.
    fn ensure_selection_available(&mut self) {
        if self.is_loading_free_models {
            return;
        }
        let current = &self.settings.selected_model_id;
        if self.available_models().any(|m| &m.id == current) {
            return;
        }

        // Nothing to fall back to; keep the stored choice.
        let Some(first) = self.available_models().next() else {
            return;
        };
        let next = if self.default_free_model_id.is_empty() {
            first.id.clone()
        } else {
            self.default_free_model_id.clone()
        };

        if next != self.settings.selected_model_id {
            tracing::debug!(
                from = %self.settings.selected_model_id,
                to = %next,
                "Selected model unavailable, reassigning"
            );
            self.settings.selected_model_id = next;
            self.persist();
        }
    }

    fn persist(&mut self) {
        if let Err(e) = save_settings(&mut self.store, &self.settings) {
            tracing::warn!("Failed to save settings: {}", e);
        }
    }
}

struct LoadedSettings {
    settings: Settings,
    migrated: bool,
}

/// Read stored settings, falling back to defaults and migrating the legacy
/// single-value selection when no usable record exists.
fn load_session_settings<S: KeyValueStore>(store: &mut S) -> LoadedSettings {
    let stored = match load_settings(store) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!("Ignoring unreadable settings: {}", e);
            None
        }
    };

    let legacy = match store.get(LEGACY_MODEL_KEY) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to read legacy model selection: {}", e);
            None
        }
    };
    if legacy.is_some() {
        if let Err(e) = store.remove(LEGACY_MODEL_KEY) {
            tracing::warn!("Failed to remove legacy model selection: {}", e);
        }
    }

    if let Some(settings) = stored {
        return LoadedSettings {
            settings,
            migrated: false,
        };
    }

    let mut settings = Settings::default();
    let migrated_id = legacy.and_then(|value| {
        settings
            .models
            .iter()
            .find(|m| m.is_built_in && m.value == value)
            .map(|m| m.id.clone())
    });

    match migrated_id {
        Some(id) => {
            tracing::info!(model = %id, "Migrated legacy model selection");
            settings.selected_model_id = id;
            LoadedSettings {
                settings,
                migrated: true,
            }
        }
        None => LoadedSettings {
            settings,
            migrated: false,
        },
    }
}
