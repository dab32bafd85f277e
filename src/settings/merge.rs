//! Reconciliation of stored models with the current built-in defaults.

use std::collections::HashSet;

use super::types::{ModelOption, StoredModel};

/// Reconcile a stored built-in entry with its current default definition.
///
/// Stored `value`, `label` and `is_built_in` win when present; anything the
/// stored record lacks is backfilled from the default. `no_api_required` is
/// always the default's.
fn reconcile_built_in(stored: StoredModel, default: &ModelOption) -> ModelOption {
    ModelOption {
        id: default.id.clone(),
        value: stored.value.unwrap_or_else(|| default.value.clone()),
        label: stored.label.unwrap_or_else(|| default.label.clone()),
        is_built_in: stored.is_built_in.unwrap_or(default.is_built_in),
        no_api_required: default.no_api_required,
    }
}

fn custom_model(stored: StoredModel) -> ModelOption {
    ModelOption {
        value: stored.value.unwrap_or_default(),
        label: stored.label.unwrap_or_default(),
        is_built_in: stored.is_built_in.unwrap_or(false),
        no_api_required: stored.no_api_required,
        id: stored.id,
    }
}

/// Merge stored models with `defaults`.
///
/// Stored entries keep their order; built-ins missing from storage are
/// appended in default order. Repeated stored ids keep their first entry.
pub fn reconcile_models(stored: Vec<StoredModel>, defaults: &[ModelOption]) -> Vec<ModelOption> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(stored.len() + defaults.len());

    for model in stored {
        if !seen.insert(model.id.clone()) {
            continue;
        }
        match defaults.iter().find(|d| d.id == model.id) {
            Some(default) => merged.push(reconcile_built_in(model, default)),
            None => merged.push(custom_model(model)),
        }
    }

    merged.extend(
        defaults
            .iter()
            .filter(|d| !seen.contains(&d.id))
            .cloned(),
    );

    merged
}
