//! Entry point used by parameter binding.

use daedalus_core::{
    ModelMetadata, ModelMetadataProvider, ModelStateDictionary, ModelValue, MvcOptions,
    ValidationStateDictionary,
};
use std::sync::Arc;

use crate::error::ValidationResult;
use crate::provider::ValidatorCache;
use crate::visitor::ValidationVisitor;

/// Validates bound models with shared metadata, validator cache and options.
///
/// Cheap to clone; one instance serves every request.
#[derive(Debug, Clone)]
pub struct ObjectModelValidator {
    provider: Arc<ModelMetadataProvider>,
    cache: Arc<ValidatorCache>,
    options: Arc<MvcOptions>,
}

impl ObjectModelValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        provider: Arc<ModelMetadataProvider>,
        cache: Arc<ValidatorCache>,
        options: Arc<MvcOptions>,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    /// Returns the metadata provider.
    #[must_use]
    pub fn metadata_provider(&self) -> &Arc<ModelMetadataProvider> {
        &self.provider
    }

    /// Validates `model` under `prefix`.
    ///
    /// Null models are only validated when their metadata declares a
    /// `Required` rule, so a missing required parameter is reported.
    pub fn validate(
        &self,
        model_state: &mut ModelStateDictionary,
        validation_state: &mut ValidationStateDictionary,
        metadata: &Arc<ModelMetadata>,
        prefix: &str,
        model: &ModelValue,
    ) -> ValidationResult<bool> {
        let mut visitor = ValidationVisitor::new(
            &self.provider,
            &self.cache,
            &self.options,
            model_state,
            validation_state,
        );
        visitor.validate(metadata, prefix, model, metadata.is_required())
    }
}
