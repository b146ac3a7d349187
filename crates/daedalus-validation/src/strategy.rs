//! Child enumeration for composite model nodes.
//!
//! A [`ValidationStrategy`] decides which children a node has and the
//! model-state key each child is validated under. Binders that use
//! non-default key conventions record the matching strategy so that
//! validation errors land on the keys the client posted.

use daedalus_core::names::{create_index_model_name, create_property_model_name};
use daedalus_core::{ModelMetadata, ModelMetadataProvider, ModelValue, ValidationStrategy};
use std::sync::Arc;

use crate::error::ValidationError;

/// One child to visit.
#[derive(Debug, Clone)]
pub struct ValidationEntry {
    /// Child metadata.
    pub metadata: Arc<ModelMetadata>,
    /// Child model-state key.
    pub key: String,
    /// Child value.
    pub model: ModelValue,
}

/// Enumerates the children of `model` under `key`.
///
/// Collections with more than `max_elements` elements are rejected before any
/// child is produced.
pub fn enumerate_children(
    strategy: &ValidationStrategy,
    provider: &ModelMetadataProvider,
    metadata: &ModelMetadata,
    key: &str,
    model: &ModelValue,
    max_elements: usize,
) -> Result<Vec<ValidationEntry>, ValidationError> {
    if let Some(len) = collection_len(model) {
        if len > max_elements {
            return Err(ValidationError::collection_too_large(max_elements, len, key));
        }
    }

    let children = match (strategy, model) {
        (ValidationStrategy::SuppressChildren, _) => Vec::new(),
        (_, ModelValue::Object(object)) => provider
            .properties(metadata)
            .iter()
            .filter_map(|property| {
                let name = property.name()?;
                Some(ValidationEntry {
                    metadata: Arc::clone(property),
                    key: create_property_model_name(key, name),
                    model: object.get(name).unwrap_or(ModelValue::Null),
                })
            })
            .collect(),
        (ValidationStrategy::ExplicitIndexCollection(indexes), ModelValue::List(list)) => {
            let Some(element) = provider.element_metadata(metadata) else {
                return Ok(Vec::new());
            };
            indexes
                .iter()
                .zip(list.items())
                .map(|(index, item)| ValidationEntry {
                    metadata: Arc::clone(&element),
                    key: create_index_model_name(key, index),
                    model: item.clone(),
                })
                .collect()
        }
        (_, ModelValue::List(list)) => {
            let Some(element) = provider.element_metadata(metadata) else {
                return Ok(Vec::new());
            };
            list.items()
                .iter()
                .enumerate()
                .map(|(i, item)| ValidationEntry {
                    metadata: Arc::clone(&element),
                    key: create_index_model_name(key, &i.to_string()),
                    model: item.clone(),
                })
                .collect()
        }
        (ValidationStrategy::ShortFormDictionary(keys), ModelValue::Map(map)) => {
            let Some((_, value_metadata)) = provider.dictionary_metadata(metadata) else {
                return Ok(Vec::new());
            };
            keys.iter()
                .zip(map.entries())
                .map(|(entry_key, (_, value))| ValidationEntry {
                    metadata: Arc::clone(&value_metadata),
                    key: create_index_model_name(key, entry_key),
                    model: value.clone(),
                })
                .collect()
        }
        (_, ModelValue::Map(map)) => {
            let Some((key_metadata, value_metadata)) = provider.dictionary_metadata(metadata) else {
                return Ok(Vec::new());
            };
            let mut children = Vec::with_capacity(map.len() * 2);
            for (i, (entry_key, value)) in map.entries().iter().enumerate() {
                let entry_prefix = create_index_model_name(key, &i.to_string());
                children.push(ValidationEntry {
                    metadata: Arc::clone(&key_metadata),
                    key: create_property_model_name(&entry_prefix, "Key"),
                    model: entry_key.clone(),
                });
                children.push(ValidationEntry {
                    metadata: Arc::clone(&value_metadata),
                    key: create_property_model_name(&entry_prefix, "Value"),
                    model: value.clone(),
                });
            }
            children
        }
        _ => Vec::new(),
    };
    Ok(children)
}

fn collection_len(model: &ModelValue) -> Option<usize> {
    match model {
        ModelValue::List(list) => Some(list.len()),
        ModelValue::Map(map) => Some(map.len()),
        _ => None,
    }
}
