//! Built-in binder providers and the default provider order.
//!
//! Providers are consulted in order and the first that returns a binder
//! wins, so source-specific providers come before shape-based ones.

use daedalus_core::{BindingSource, ModelType};
use std::sync::Arc;

use crate::binder::{ModelBinder, ModelBinderProvider, ModelBinderProviderContext};
use crate::binders::{
    BodyModelBinder, CancellationTokenModelBinder, CollectionModelBinder, ComplexObjectModelBinder,
    DictionaryModelBinder, FormCollectionModelBinder, FormFileModelBinder, HeaderModelBinder,
    ServicesModelBinder, SimpleTypeModelBinder,
};
use crate::error::{BindingError, BindingResult};
use crate::formatter::InputFormatter;

fn source_is(ctx: &ModelBinderProviderContext<'_>, source: &BindingSource) -> bool {
    ctx.metadata().binding_source() == Some(source)
}

/// Models bound from the service provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServicesModelBinderProvider;

impl ModelBinderProvider for ServicesModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        Ok(source_is(ctx, &BindingSource::Services)
            .then(|| Arc::new(ServicesModelBinder) as Arc<dyn ModelBinder>))
    }
}

/// Models bound from the request body.
#[derive(Debug, Clone)]
pub struct BodyModelBinderProvider {
    formatters: Arc<[Arc<dyn InputFormatter>]>,
}

impl BodyModelBinderProvider {
    /// Creates a provider whose binders use `formatters`.
    #[must_use]
    pub fn new(formatters: Arc<[Arc<dyn InputFormatter>]>) -> Self {
        Self { formatters }
    }
}

impl ModelBinderProvider for BodyModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        if !source_is(ctx, &BindingSource::Body) {
            return Ok(None);
        }
        if self.formatters.is_empty() {
            return Err(BindingError::NoBinder {
                model_type: format!("{} (no input formatters configured)", ctx.metadata().model_type()),
            });
        }
        Ok(Some(Arc::new(BodyModelBinder::new(Arc::clone(&self.formatters)))))
    }
}

/// Simple types and collections of simple types bound from a header.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderModelBinderProvider;

impl ModelBinderProvider for HeaderModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        if !source_is(ctx, &BindingSource::Header) {
            return Ok(None);
        }
        let model_type = ctx.metadata().model_type();
        let supported =
            model_type.is_simple() || model_type.element_type().is_some_and(ModelType::is_simple);
        Ok(supported.then(|| Arc::new(HeaderModelBinder) as Arc<dyn ModelBinder>))
    }
}

/// The request cancellation token.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancellationTokenModelBinderProvider;

impl ModelBinderProvider for CancellationTokenModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        let matched = matches!(ctx.metadata().model_type().underlying(), ModelType::CancellationToken);
        Ok(matched.then(|| Arc::new(CancellationTokenModelBinder) as Arc<dyn ModelBinder>))
    }
}

/// `FormFile` and `List<FormFile>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormFileModelBinderProvider;

impl ModelBinderProvider for FormFileModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        let model_type = ctx.metadata().model_type();
        let matched = matches!(model_type.underlying(), ModelType::FormFile)
            || model_type
                .element_type()
                .is_some_and(|element| matches!(element, ModelType::FormFile));
        Ok(matched.then(|| Arc::new(FormFileModelBinder) as Arc<dyn ModelBinder>))
    }
}

/// The raw form.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormCollectionModelBinderProvider;

impl ModelBinderProvider for FormCollectionModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        let matched = matches!(ctx.metadata().model_type().underlying(), ModelType::FormCollection);
        Ok(matched.then(|| Arc::new(FormCollectionModelBinder) as Arc<dyn ModelBinder>))
    }
}

/// Scalars and enums.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleTypeModelBinderProvider;

impl ModelBinderProvider for SimpleTypeModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        Ok(ctx
            .metadata()
            .model_type()
            .is_simple()
            .then(|| Arc::new(SimpleTypeModelBinder) as Arc<dyn ModelBinder>))
    }
}

/// `Map<K, V>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DictionaryModelBinderProvider;

impl ModelBinderProvider for DictionaryModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        let metadata = Arc::clone(ctx.metadata());
        let Some((key, value)) = ctx.metadata_provider().dictionary_metadata(&metadata) else {
            return Ok(None);
        };
        let key_binder = ctx.create_binder(&key)?;
        let value_binder = ctx.create_binder(&value)?;
        Ok(Some(Arc::new(DictionaryModelBinder::new(key_binder, value_binder))))
    }
}

/// `List<T>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectionModelBinderProvider;

impl ModelBinderProvider for CollectionModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        let metadata = Arc::clone(ctx.metadata());
        let Some(element) = ctx.metadata_provider().element_metadata(&metadata) else {
            return Ok(None);
        };
        let element_binder = ctx.create_binder(&element)?;
        Ok(Some(Arc::new(CollectionModelBinder::new(element_binder))))
    }
}

/// Registered complex types.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComplexObjectModelBinderProvider;

impl ModelBinderProvider for ComplexObjectModelBinderProvider {
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>> {
        let metadata = Arc::clone(ctx.metadata());
        if !metadata.model_type().is_complex() {
            return Ok(None);
        }
        let properties = ctx.metadata_provider().properties(&metadata);
        let mut bound = Vec::with_capacity(properties.len());
        for property in properties.iter() {
            let binder = ctx.create_binder(property)?;
            bound.push((Arc::clone(property), binder));
        }
        Ok(Some(Arc::new(ComplexObjectModelBinder::new(bound))))
    }
}

/// The built-in providers in resolution order.
#[must_use]
pub fn default_model_binder_providers(
    formatters: Arc<[Arc<dyn InputFormatter>]>,
) -> Vec<Arc<dyn ModelBinderProvider>> {
    vec![
        Arc::new(ServicesModelBinderProvider),
        Arc::new(BodyModelBinderProvider::new(formatters)),
        Arc::new(HeaderModelBinderProvider),
        Arc::new(CancellationTokenModelBinderProvider),
        Arc::new(FormFileModelBinderProvider),
        Arc::new(FormCollectionModelBinderProvider),
        Arc::new(SimpleTypeModelBinderProvider),
        Arc::new(DictionaryModelBinderProvider),
        Arc::new(CollectionModelBinderProvider),
        Arc::new(ComplexObjectModelBinderProvider),
    ]
}
