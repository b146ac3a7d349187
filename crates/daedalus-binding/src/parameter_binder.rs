//! Binds and validates one action parameter.

use daedalus_core::{
    ModelMetadataProvider, ModelStateDictionary, ModelValue, MvcOptions, ParameterDescriptor,
    RequestContext, ValidationStateDictionary,
};
use daedalus_validation::ObjectModelValidator;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::binder::ModelBinderFactory;
use crate::context::{BindingEnvironment, ModelBindingContext, ModelBindingResult};
use crate::error::BindingResult;
use crate::value_provider::ValueProvider;

/// Binds action parameters and validates the results.
///
/// Shared across requests; per-request state lives in the
/// [`ModelStateDictionary`] passed to [`bind_parameter`](Self::bind_parameter).
#[derive(Debug, Clone)]
pub struct ParameterBinder {
    metadata_provider: Arc<ModelMetadataProvider>,
    binder_factory: Arc<ModelBinderFactory>,
    validator: ObjectModelValidator,
    options: Arc<MvcOptions>,
}

impl ParameterBinder {
    /// Creates a parameter binder.
    #[must_use]
    pub fn new(
        metadata_provider: Arc<ModelMetadataProvider>,
        binder_factory: Arc<ModelBinderFactory>,
        validator: ObjectModelValidator,
        options: Arc<MvcOptions>,
    ) -> Self {
        Self {
            metadata_provider,
            binder_factory,
            validator,
            options,
        }
    }

    /// The metadata provider.
    #[must_use]
    pub fn metadata_provider(&self) -> &Arc<ModelMetadataProvider> {
        &self.metadata_provider
    }

    /// The binder factory.
    #[must_use]
    pub fn binder_factory(&self) -> &Arc<ModelBinderFactory> {
        &self.binder_factory
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &Arc<MvcOptions> {
        &self.options
    }

    /// Binds `parameter` of the action `owner` and validates the result.
    ///
    /// Keys are looked up under the binder model name if one is declared,
    /// otherwise under the parameter name when any key carries that prefix,
    /// otherwise under the empty prefix. Binding and validation errors are
    /// written to `model_state`; only guard violations and configuration
    /// problems are returned as `Err`.
    #[instrument(level = "debug", skip_all, fields(owner = %owner, parameter = %parameter.name))]
    pub async fn bind_parameter(
        &self,
        request: &RequestContext,
        value_provider: &Arc<dyn ValueProvider>,
        model_state: &mut ModelStateDictionary,
        owner: &str,
        parameter: &ParameterDescriptor,
    ) -> BindingResult<ModelBindingResult> {
        let metadata = self.metadata_provider.for_parameter(owner, parameter);
        let binder = self.binder_factory.create_binder(&metadata)?;

        let model_name = match metadata.binder_model_name() {
            Some(name) => name.to_string(),
            None if value_provider.contains_prefix(&parameter.name) => parameter.name.clone(),
            None => String::new(),
        };

        let env = BindingEnvironment {
            request,
            metadata_provider: &self.metadata_provider,
            options: &self.options,
        };
        let mut validation_state = ValidationStateDictionary::new();
        let (result, field_name) = {
            let mut ctx = ModelBindingContext::new_top_level(
                env,
                model_state,
                &mut validation_state,
                Arc::clone(value_provider),
                Arc::clone(&metadata),
                model_name.clone(),
            );
            binder.bind_model(&mut ctx).await?;
            let field_name = ctx.field_name().to_string();
            (ctx.take_result(), field_name)
        };

        match result.model() {
            Some(model) => {
                debug!(model_name = %model_name, "parameter bound");
                self.validator.validate(
                    model_state,
                    &mut validation_state,
                    &metadata,
                    &model_name,
                    model,
                )?;
            }
            None if metadata.is_binding_required() => {
                let message = self.options.messages.missing_bind_required_value(&field_name);
                model_state.try_add_model_error(&field_name, message);
            }
            None if metadata.is_required() => {
                let key = if model_name.is_empty() { &field_name } else { &model_name };
                self.validator.validate(
                    model_state,
                    &mut validation_state,
                    &metadata,
                    key,
                    &ModelValue::Null,
                )?;
            }
            None => {
                debug!(model_name = %model_name, "parameter not bound");
            }
        }
        Ok(result)
    }
}
