//! Free model catalog.
//!
//! The server advertises a configuration-driven allow-list of models that can
//! be used without a personal API key.

use crate::config::CatalogConfig;
use serde::{Deserialize, Serialize};

/// Display names for known free model ids.
const MODEL_LABELS: &[(&str, &str)] = &[
    ("deepseek", "DeepSeek"),
    ("mistral", "Mistral"),
    ("openai", "GPT-4o"),
    ("openai-fast", "GPT-4o Mini"),
    ("openai-large", "GPT-4.5"),
    ("claude", "Claude Sonnet"),
    ("claude-fast", "Claude Haiku"),
    ("claude-large", "Claude Opus"),
    ("gemini", "Gemini Pro"),
    ("gemini-fast", "Gemini Flash"),
    ("grok", "Grok"),
    ("qwen-coder", "Qwen Coder"),
];

/// One entry of the advertised catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Body of `GET /api/v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub models: Vec<CatalogEntry>,
    pub default_model: String,
}

/// Look up the display label for a model id, falling back to the id itself.
pub fn label_for(id: &str) -> &str {
    MODEL_LABELS
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, label)| *label)
        .unwrap_or(id)
}

/// Build the catalog from configuration, preserving allow-list order.
pub fn build_catalog(config: &CatalogConfig) -> CatalogResponse {
    let models = config
        .free_models
        .iter()
        .map(|id| CatalogEntry {
            id: id.clone(),
            label: label_for(id).to_string(),
            is_default: *id == config.default_model,
        })
        .collect();

    CatalogResponse {
        models,
        default_model: config.default_model.clone(),
    }
}
