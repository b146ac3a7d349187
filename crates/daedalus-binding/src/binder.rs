//! Binder trait, binder providers and the caching binder factory.

use async_trait::async_trait;
use daedalus_core::{MetadataKey, ModelMetadata, ModelMetadataProvider};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, trace};

use crate::context::ModelBindingContext;
use crate::error::{BindingError, BindingResult};

/// Binds one model from the context in scope.
///
/// A binder records its outcome with
/// [`ModelBindingContext::set_result`]; conversion problems go to model
/// state. Returning `Err` aborts binding of the whole parameter.
#[async_trait]
pub trait ModelBinder: Send + Sync + fmt::Debug {
    /// Binds the model described by `ctx`.
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()>;
}

/// Chooses a binder for metadata.
pub trait ModelBinderProvider: Send + Sync + fmt::Debug {
    /// Returns a binder if this provider handles `ctx.metadata()`.
    fn get_binder(
        &self,
        ctx: &mut ModelBinderProviderContext<'_>,
    ) -> BindingResult<Option<Arc<dyn ModelBinder>>>;
}

/// What a [`ModelBinderProvider`] sees while a binder is being built.
pub struct ModelBinderProviderContext<'f> {
    factory: &'f ModelBinderFactory,
    metadata: Arc<ModelMetadata>,
    scope: &'f mut BuildScope,
}

impl ModelBinderProviderContext<'_> {
    /// Metadata a binder is requested for.
    #[must_use]
    pub fn metadata(&self) -> &Arc<ModelMetadata> {
        &self.metadata
    }

    /// Metadata provider, for element and property metadata.
    #[must_use]
    pub fn metadata_provider(&self) -> &ModelMetadataProvider {
        &self.factory.metadata_provider
    }

    /// Builds (or reuses) the binder for a child model.
    pub fn create_binder(&mut self, metadata: &Arc<ModelMetadata>) -> BindingResult<Arc<dyn ModelBinder>> {
        self.factory.create_binder_core(metadata, self.scope)
    }
}

impl fmt::Debug for ModelBinderProviderContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBinderProviderContext")
            .field("metadata", &self.metadata.key())
            .finish_non_exhaustive()
    }
}

/// Stands in for a binder whose construction is still running.
///
/// Self-referencing types (`Node { next: Node }`) would otherwise recurse
/// forever while building binders. The factory hands out a placeholder for
/// the in-progress key and points it at the finished binder afterwards.
#[derive(Debug)]
pub struct PlaceholderBinder {
    model_type: String,
    inner: OnceLock<Weak<dyn ModelBinder>>,
}

impl PlaceholderBinder {
    fn new(metadata: &ModelMetadata) -> Self {
        Self {
            model_type: metadata.model_type().to_string(),
            inner: OnceLock::new(),
        }
    }

    fn resolve(&self, binder: &Arc<dyn ModelBinder>) {
        let _ = self.inner.set(Arc::downgrade(binder));
    }
}

#[async_trait]
impl ModelBinder for PlaceholderBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let binder = self
            .inner
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| BindingError::IncompleteBinder {
                model_type: self.model_type.clone(),
            })?;
        binder.bind_model(ctx).await
    }
}

// State of one top-level binder build. Finished binders stay here until the
// outermost build succeeds, so a failed build caches nothing.
#[derive(Default)]
struct BuildScope {
    in_progress: HashMap<MetadataKey, Option<Arc<PlaceholderBinder>>>,
    built: HashMap<MetadataKey, Arc<dyn ModelBinder>>,
}

/// Builds binders by consulting providers in order and caches them per
/// metadata key.
///
/// Concurrent misses may build the same binder twice; the first insert wins.
pub struct ModelBinderFactory {
    providers: Vec<Arc<dyn ModelBinderProvider>>,
    metadata_provider: Arc<ModelMetadataProvider>,
    cache: DashMap<MetadataKey, Arc<dyn ModelBinder>>,
}

impl ModelBinderFactory {
    /// Creates a factory over an ordered provider list.
    #[must_use]
    pub fn new(
        metadata_provider: Arc<ModelMetadataProvider>,
        providers: Vec<Arc<dyn ModelBinderProvider>>,
    ) -> Self {
        Self {
            providers,
            metadata_provider,
            cache: DashMap::new(),
        }
    }

    /// Returns the binder for `metadata`.
    pub fn create_binder(&self, metadata: &Arc<ModelMetadata>) -> BindingResult<Arc<dyn ModelBinder>> {
        if let Some(hit) = self.cached(metadata.key()) {
            return Ok(hit);
        }
        let mut scope = BuildScope::default();
        let binder = self.create_binder_core(metadata, &mut scope)?;
        if let Some(existing) = self.cached(metadata.key()) {
            return Ok(existing);
        }
        for (key, built) in scope.built {
            self.cache.entry(key).or_insert(built);
        }
        debug!(metadata = %metadata.key(), cached = self.cache.len(), "model binders cached");
        Ok(binder)
    }

    /// The metadata provider binders are built against.
    #[must_use]
    pub fn metadata_provider(&self) -> &Arc<ModelMetadataProvider> {
        &self.metadata_provider
    }

    /// Number of cached binders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no binder has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn cached(&self, key: &MetadataKey) -> Option<Arc<dyn ModelBinder>> {
        self.cache.get(key).map(|e| Arc::clone(e.value()))
    }

    fn create_binder_core(
        &self,
        metadata: &Arc<ModelMetadata>,
        scope: &mut BuildScope,
    ) -> BindingResult<Arc<dyn ModelBinder>> {
        let key = metadata.key();
        if let Some(hit) = self.cached(key).or_else(|| scope.built.get(key).cloned()) {
            return Ok(hit);
        }
        if let Some(slot) = scope.in_progress.get_mut(key) {
            trace!(metadata = %key, "binder under construction, using placeholder");
            let placeholder = slot.get_or_insert_with(|| Arc::new(PlaceholderBinder::new(metadata)));
            return Ok(Arc::clone(placeholder) as Arc<dyn ModelBinder>);
        }

        scope.in_progress.insert(key.clone(), None);
        let built = self.consult_providers(metadata, scope);
        let placeholder = scope.in_progress.remove(key).flatten();
        let binder = built?;
        debug!(metadata = %key, binder = ?binder, "model binder created");

        if let Some(placeholder) = placeholder {
            placeholder.resolve(&binder);
        }
        scope.built.insert(key.clone(), Arc::clone(&binder));
        Ok(binder)
    }

    fn consult_providers(
        &self,
        metadata: &Arc<ModelMetadata>,
        scope: &mut BuildScope,
    ) -> BindingResult<Arc<dyn ModelBinder>> {
        let mut ctx = ModelBinderProviderContext {
            factory: self,
            metadata: Arc::clone(metadata),
            scope,
        };
        for provider in &self.providers {
            if let Some(binder) = provider.get_binder(&mut ctx)? {
                return Ok(binder);
            }
        }
        Err(BindingError::no_binder(metadata.model_type()))
    }
}

impl fmt::Debug for ModelBinderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBinderFactory")
            .field("providers", &self.providers)
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::InputFormatter;
    use crate::provider::default_model_binder_providers;
    use daedalus_core::{ModelType, PropertyDescriptor, TypeDescriptor};

    fn factory() -> ModelBinderFactory {
        let metadata = ModelMetadataProvider::builder()
            .register(
                TypeDescriptor::new("Holder")
                    .property(PropertyDescriptor::new("inner", ModelType::complex("Inner")))
                    .property(PropertyDescriptor::new("payload", ModelType::string()).from_body()),
            )
            .register(
                TypeDescriptor::new("Inner")
                    .property(PropertyDescriptor::new("owner", ModelType::complex("Holder"))),
            )
            .register(
                TypeDescriptor::new("Node")
                    .property(PropertyDescriptor::new("next", ModelType::complex("Node"))),
            )
            .build();
        let formatters: Arc<[Arc<dyn InputFormatter>]> = Arc::from(Vec::new());
        ModelBinderFactory::new(Arc::new(metadata), default_model_binder_providers(formatters))
    }

    #[test]
    fn test_failed_build_caches_nothing() {
        let factory = factory();
        let holder = factory.metadata_provider().for_type(&ModelType::complex("Holder"));
        let inner = factory.metadata_provider().for_type(&ModelType::complex("Inner"));

        let err = factory.create_binder(&holder).expect_err("no body formatter");
        assert!(matches!(err, BindingError::NoBinder { .. }));
        assert!(factory.is_empty());

        let err = factory.create_binder(&inner).expect_err("inner needs holder");
        assert!(matches!(err, BindingError::NoBinder { .. }));
        assert!(factory.is_empty());
    }

    #[test]
    fn test_successful_build_caches_every_binder() {
        let factory = factory();
        let node = factory.metadata_provider().for_type(&ModelType::complex("Node"));

        let first = factory.create_binder(&node).expect("node binder");
        assert!(!factory.is_empty());
        let second = factory.create_binder(&node).expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
