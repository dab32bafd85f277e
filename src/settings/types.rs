//! Settings data model and its persisted JSON shape.

use serde::{Deserialize, Serialize};

use super::merge::reconcile_models;

/// Storage key holding the serialized [`Settings`] record.
pub const SETTINGS_KEY: &str = "prompt-relay.settings";

/// Storage key of the pre-settings schema: a bare selected model value.
pub const LEGACY_MODEL_KEY: &str = "prompt-relay.selected-model";

/// A selectable model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelOption {
    pub id: String,
    /// Identifier sent upstream as the request's `model`.
    pub value: String,
    pub label: String,
    pub is_built_in: bool,
    /// Usable without a configured custom API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_api_required: Option<bool>,
}

impl ModelOption {
    pub fn built_in(id: &str, value: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            value: value.to_string(),
            label: label.to_string(),
            is_built_in: true,
            no_api_required: None,
        }
    }

    pub fn requires_api(&self) -> bool {
        !self.no_api_required.unwrap_or(false)
    }
}

/// Models shipped with the application.
pub fn default_models() -> Vec<ModelOption> {
    vec![
        ModelOption::built_in("gpt-4o", "gpt-4o", "GPT-4o"),
        ModelOption::built_in("gpt-4o-mini", "gpt-4o-mini", "GPT-4o Mini"),
        ModelOption::built_in(
            "claude-3-5-sonnet",
            "claude-3-5-sonnet-20241022",
            "Claude 3.5 Sonnet",
        ),
        ModelOption::built_in("deepseek-chat", "deepseek-chat", "DeepSeek Chat"),
    ]
}

/// User settings, persisted as a single record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_base: String,
    pub api_key: String,
    pub models: Vec<ModelOption>,
    pub selected_model_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            models: default_models(),
            selected_model_id: String::new(),
        }
    }
}

impl Settings {
    /// A custom upstream counts as configured only with both base and key.
    pub fn has_custom_api(&self) -> bool {
        !self.api_base.is_empty() && !self.api_key.is_empty()
    }

    /// Decode a stored record, reconciling its models with the current defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let stored: StoredSettings = serde_json::from_str(raw)?;
        let defaults = Settings::default();

        Ok(Self {
            api_base: stored.api_base.unwrap_or(defaults.api_base),
            api_key: stored.api_key.unwrap_or(defaults.api_key),
            models: match stored.models {
                Some(models) => reconcile_models(models, &default_models()),
                None => defaults.models,
            },
            selected_model_id: stored.selected_model_id.unwrap_or(defaults.selected_model_id),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A stored record as found on disk; any field may predate the current schema.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    api_base: Option<String>,
    api_key: Option<String>,
    models: Option<Vec<StoredModel>>,
    selected_model_id: Option<String>,
}

/// A stored model entry. Only `id` is mandatory.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredModel {
    pub id: String,
    pub value: Option<String>,
    pub label: Option<String>,
    pub is_built_in: Option<bool>,
    pub no_api_required: Option<bool>,
}

impl From<ModelOption> for StoredModel {
    fn from(model: ModelOption) -> Self {
        Self {
            id: model.id,
            value: Some(model.value),
            label: Some(model.label),
            is_built_in: Some(model.is_built_in),
            no_api_required: model.no_api_required,
        }
    }
}

/// Fields supplied when adding a custom model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewModel {
    pub value: String,
    pub label: String,
    pub no_api_required: Option<bool>,
}

/// Partial update applied by `update_model`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelPatch {
    pub value: Option<String>,
    pub label: Option<String>,
}

/// A `{value, label}` pair for model pickers. `value` is the model id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelChoice {
    pub value: String,
    pub label: String,
}

/// What the next completion request should use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTarget {
    /// Upstream model identifier for the request body.
    pub model: String,
    /// Bearer credential, present only for a custom-API model.
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}
