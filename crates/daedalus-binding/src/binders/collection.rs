//! Collection binder.
//!
//! Two key conventions are understood:
//!
//! - repeated keys (`ids=1&ids=2`), each value bound through the element
//!   binder;
//! - indexed keys, either positional (`ids[0]`, `ids[1]`, ..., stopping at
//!   the first index that does not bind) or explicit
//!   (`ids.index=a&ids[a]=..`), where every listed index is read.

use async_trait::async_trait;
use daedalus_core::names::create_index_model_name;
use daedalus_core::{
    ModelList, ModelMetadata, ModelValue, ValidationStateEntry, ValidationStrategy,
};
use std::sync::Arc;
use tracing::debug;

use super::{bind_child, explicit_indexes};
use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::{BindingError, BindingResult};
use crate::value_provider::{CompositeValueProvider, ElementalValueProvider};

/// Binds `List<T>` models element by element.
#[derive(Debug, Clone)]
pub struct CollectionModelBinder {
    element_binder: Arc<dyn ModelBinder>,
}

impl CollectionModelBinder {
    /// Creates a binder delegating elements to `element_binder`.
    #[must_use]
    pub fn new(element_binder: Arc<dyn ModelBinder>) -> Self {
        Self { element_binder }
    }
}

#[async_trait]
impl ModelBinder for CollectionModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let model_name = ctx.model_name().to_string();
        let metadata = Arc::clone(ctx.metadata());
        let element_metadata = ctx
            .metadata_provider()
            .element_metadata(&metadata)
            .ok_or_else(|| BindingError::no_binder(metadata.model_type()))?;

        if !ctx.value_provider().contains_prefix(&model_name) {
            if ctx.is_top_level_object() {
                let empty = ctx
                    .model()
                    .filter(|m| m.as_list().is_some())
                    .cloned()
                    .unwrap_or_else(|| ModelValue::list(Vec::new()));
                ctx.set_result(ModelBindingResult::Success(empty));
            }
            return Ok(());
        }

        let values = ctx.value_provider().get_value(&model_name);
        let max = ctx.options().max_model_binding_collection_size;
        let (items, explicit) = if values.is_none() {
            bind_indexed(ctx, &self.element_binder, &element_metadata, &model_name, max).await?
        } else {
            let items = bind_repeated(
                ctx,
                &self.element_binder,
                &element_metadata,
                &model_name,
                values.values(),
                max,
            )
            .await?;
            (items, None)
        };

        debug!(model_name = %model_name, count = items.len(), "collection bound");
        let list = ModelList::new(items);
        if let Some(indexes) = explicit {
            ctx.validation_state_mut().insert(
                list.id(),
                ValidationStateEntry::new(
                    model_name.clone(),
                    metadata,
                    ValidationStrategy::ExplicitIndexCollection(indexes.into()),
                ),
            );
        }
        if !values.is_none() {
            let attempted = values.to_string();
            ctx.model_state_mut()
                .set_model_value(&model_name, values.into_values(), attempted);
        }
        ctx.set_result(ModelBindingResult::Success(ModelValue::List(list)));
        Ok(())
    }
}

/// Binds `name[i]` elements. Returns the items and, for the explicit
/// convention, the indexes that were read.
async fn bind_indexed(
    ctx: &mut ModelBindingContext<'_>,
    element_binder: &Arc<dyn ModelBinder>,
    element_metadata: &Arc<ModelMetadata>,
    model_name: &str,
    max: usize,
) -> BindingResult<(Vec<ModelValue>, Option<Vec<String>>)> {
    let explicit = explicit_indexes(ctx.value_provider().as_ref(), model_name);
    if let Some(indexes) = &explicit {
        if indexes.len() > max {
            return Err(BindingError::collection_too_large(max, model_name));
        }
    }

    let mut items = Vec::new();
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

        let child_name = create_index_model_name(model_name, &index);
        let result = bind_child(ctx, element_binder, element_metadata, &index, child_name, None).await?;
        match result {
            ModelBindingResult::Success(value) => items.push(value),
            ModelBindingResult::Failed if explicit.is_some() => items.push(ModelValue::Null),
            ModelBindingResult::Failed => break,
        }
        if items.len() > max {
            return Err(BindingError::collection_too_large(max, model_name));
        }
    }
    Ok((items, explicit))
}

/// Binds each repeated value of `name` through the element binder.
async fn bind_repeated(
    ctx: &mut ModelBindingContext<'_>,
    element_binder: &Arc<dyn ModelBinder>,
    element_metadata: &Arc<ModelMetadata>,
    model_name: &str,
    values: &[String],
    max: usize,
) -> BindingResult<Vec<ModelValue>> {
    if values.len() > max {
        return Err(BindingError::collection_too_large(max, model_name));
    }

    let field_name = ctx.field_name().to_string();
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        let element_provider = CompositeValueProvider::new(vec![
            Arc::new(ElementalValueProvider::new(model_name, value.clone())),
            Arc::clone(ctx.value_provider()),
        ]);
        let mut scope = ctx.enter_nested_scope(
            Arc::clone(element_metadata),
            field_name.as_str(),
            model_name,
            None,
        )?;
        scope.set_value_provider(Arc::new(element_provider));
        element_binder.bind_model(&mut scope).await?;
        if let ModelBindingResult::Success(item) = scope.take_result() {
            items.push(item);
        }
    }
    Ok(items)
}
