//! Dictionary binder.
//!
//! Entries are read in the indexed form first (`m[0].Key=a&m[0].Value=1`,
//! positional or with `m.index`). If that yields nothing, the short form
//! `m[a]=1` is tried, which records a short-form validation strategy so that
//! validation errors are keyed `m[a]` like the posted data.

use async_trait::async_trait;
use daedalus_core::convert::convert_from_str;
use daedalus_core::names::{create_index_model_name, create_property_model_name};
use daedalus_core::{ModelMap, ModelMetadata, ModelValue, ValidationStateEntry, ValidationStrategy};
use std::sync::Arc;
use tracing::debug;

use super::{bind_child, explicit_indexes};
use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::{BindingError, BindingResult};

/// Binds `Map<K, V>` models.
#[derive(Debug, Clone)]
pub struct DictionaryModelBinder {
    key_binder: Arc<dyn ModelBinder>,
    value_binder: Arc<dyn ModelBinder>,
}

impl DictionaryModelBinder {
    /// Creates a binder from key and value binders.
    #[must_use]
    pub fn new(key_binder: Arc<dyn ModelBinder>, value_binder: Arc<dyn ModelBinder>) -> Self {
        Self {
            key_binder,
            value_binder,
        }
    }

    async fn bind_indexed(
        &self,
        ctx: &mut ModelBindingContext<'_>,
        key_metadata: &Arc<ModelMetadata>,
        value_metadata: &Arc<ModelMetadata>,
        model_name: &str,
        max: usize,
    ) -> BindingResult<Vec<(ModelValue, ModelValue)>> {
        let explicit = explicit_indexes(ctx.value_provider().as_ref(), model_name);
        if let Some(indexes) = &explicit {
            if indexes.len() > max {
                return Err(BindingError::collection_too_large(max, model_name));
            }
        }

        let mut entries = Vec::new();
        let mut position = 0;
        loop {
            let index = match &explicit {
                Some(indexes) => match indexes.get(position) {
                    Some(index) => index.clone(),
                    None => break,
                },
                None => position.to_string(),
            };
            position += 1;

            let entry_name = create_index_model_name(model_name, &index);
            let key = bind_child(
                ctx,
                &self.key_binder,
                key_metadata,
                "Key",
                create_property_model_name(&entry_name, "Key"),
                None,
            )
            .await?;
            let Some(key) = key.into_model() else {
                if explicit.is_some() {
                    continue;
                }
                break;
            };
            let value = bind_child(
                ctx,
                &self.value_binder,
                value_metadata,
                "Value",
                create_property_model_name(&entry_name, "Value"),
                None,
            )
            .await?;
            entries.push((key, value.into_model().unwrap_or(ModelValue::Null)));
            if entries.len() > max {
                return Err(BindingError::collection_too_large(max, model_name));
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl ModelBinder for DictionaryModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let model_name = ctx.model_name().to_string();
        let metadata = Arc::clone(ctx.metadata());
        let (key_metadata, value_metadata) = ctx
            .metadata_provider()
            .dictionary_metadata(&metadata)
            .ok_or_else(|| BindingError::no_binder(metadata.model_type()))?;

        if !ctx.value_provider().contains_prefix(&model_name) {
            if ctx.is_top_level_object() {
                ctx.set_result(ModelBindingResult::Success(ModelValue::map(Vec::new())));
            }
            return Ok(());
        }

        let max = ctx.options().max_model_binding_collection_size;
        let entries = self
            .bind_indexed(ctx, &key_metadata, &value_metadata, &model_name, max)
            .await?;
        if !entries.is_empty() {
            debug!(model_name = %model_name, count = entries.len(), "dictionary bound from indexed keys");
            ctx.set_result(ModelBindingResult::Success(ModelValue::map(entries)));
            return Ok(());
        }

        let keys = ctx.value_provider().keys_from_prefix(&model_name);
        if keys.len() > max {
            return Err(BindingError::collection_too_large(max, &model_name));
        }

        let field_name = ctx.field_name().to_string();
        let mut entries = Vec::with_capacity(keys.len());
        let mut posted_keys = Vec::with_capacity(keys.len());
        for (segment, full_key) in keys {
            let key = match convert_from_str(key_metadata.model_type(), &segment) {
                Ok(key) => key,
                Err(_) => {
                    let message = ctx
                        .messages()
                        .attempted_value_is_invalid(&segment, &key_metadata.display_name());
                    ctx.model_state_mut().try_add_model_error(&full_key, message);
                    continue;
                }
            };
            let value = bind_child(ctx, &self.value_binder, &value_metadata, &field_name, full_key, None).await?;
            entries.push((key, value.into_model().unwrap_or(ModelValue::Null)));
            posted_keys.push(segment);
        }

        debug!(model_name = %model_name, count = entries.len(), "dictionary bound from short-form keys");
        let map = ModelMap::new(entries);
        if !posted_keys.is_empty() {
            ctx.validation_state_mut().insert(
                map.id(),
                ValidationStateEntry::new(
                    model_name,
                    metadata,
                    ValidationStrategy::ShortFormDictionary(posted_keys.into()),
                ),
            );
        }
        ctx.set_result(ModelBindingResult::Success(ModelValue::Map(map)));
        Ok(())
    }
}
