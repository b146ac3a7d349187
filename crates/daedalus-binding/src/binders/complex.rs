//! Complex-object binder.
//!
//! Before creating an instance the binder probes whether any data exists for
//! it. An optional nested object with nothing posted stays absent instead of
//! becoming an empty instance that then fails `Required` checks on its
//! properties.

use async_trait::async_trait;
use daedalus_core::names::create_property_model_name;
use daedalus_core::{BindingSource, ModelMetadata, ModelObject, ModelType, ModelValue};
use std::sync::Arc;
use tracing::{debug, trace};

use super::bind_child;
use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::BindingResult;

/// Result of the data probe run before a complex model is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelDataAvailability {
    /// No property has data and none is greedy. Binding yields no value.
    NoDataAvailable,
    /// No keyed data, but a greedy property (body, services, files, ...)
    /// may still produce a value.
    GreedyPropertiesMayHaveData,
    /// At least one property prefix is present in the value provider.
    ValueProviderDataAvailable,
}

/// Binds a registered complex type property by property.
#[derive(Debug, Clone)]
pub struct ComplexObjectModelBinder {
    properties: Vec<(Arc<ModelMetadata>, Arc<dyn ModelBinder>)>,
}

impl ComplexObjectModelBinder {
    /// Creates a binder from per-property binders in declaration order.
    #[must_use]
    pub fn new(properties: Vec<(Arc<ModelMetadata>, Arc<dyn ModelBinder>)>) -> Self {
        Self { properties }
    }

    /// Decides whether an instance should be created for the model in scope.
    ///
    /// Runs in one pass over the properties without binding any of them.
    pub fn probe(&self, ctx: &ModelBindingContext<'_>) -> ModelDataAvailability {
        if !ctx.is_top_level_object() && ctx.binding_source().is_some_and(BindingSource::is_greedy) {
            return ModelDataAvailability::NoDataAvailable;
        }

        let mut has_greedy = false;
        for (property, _) in &self.properties {
            if !can_bind_property(ctx, property) {
                continue;
            }
            if property.binding_source().is_some_and(BindingSource::is_greedy) {
                has_greedy = true;
                continue;
            }
            let model_name = create_property_model_name(ctx.model_name(), field_name(property));
            if ctx.value_provider_for(property).contains_prefix(&model_name) {
                return ModelDataAvailability::ValueProviderDataAvailable;
            }
        }

        if has_greedy {
            ModelDataAvailability::GreedyPropertiesMayHaveData
        } else {
            ModelDataAvailability::NoDataAvailable
        }
    }
}

#[async_trait]
impl ModelBinder for ComplexObjectModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let availability = self.probe(ctx);
        if availability == ModelDataAvailability::NoDataAvailable {
            debug!(model_name = %ctx.model_name(), "no data for complex model");
            return Ok(());
        }

        let metadata = Arc::clone(ctx.metadata());
        let object = match ctx.model().and_then(ModelValue::as_object) {
            Some(existing) => Arc::clone(existing),
            None => ModelObject::new(type_name(metadata.model_type())),
        };

        let mut attempted = false;
        let mut succeeded = false;
        for (property, binder) in &self.properties {
            if !can_bind_property(ctx, property) {
                trace!(property = ?property.name(), "property excluded from binding");
                continue;
            }
            let Some(name) = property.name() else {
                continue;
            };
            let field_name = field_name(property).to_string();
            let model_name = create_property_model_name(ctx.model_name(), &field_name);
            // Nested objects are bound into the existing instance.
            let existing = property
                .model_type()
                .is_complex()
                .then(|| object.get(name))
                .flatten();

            let result = bind_child(ctx, binder, property, &field_name, model_name.clone(), existing).await?;
            match result {
                ModelBindingResult::Success(value) => {
                    attempted = true;
                    succeeded = true;
                    if !property.is_read_only() {
                        object.set(name, value);
                    }
                }
                ModelBindingResult::Failed if property.is_binding_required() => {
                    attempted = true;
                    let message = ctx.messages().missing_bind_required_value(&field_name);
                    ctx.model_state_mut().try_add_model_error(&model_name, message);
                }
                ModelBindingResult::Failed => {}
            }
        }

        if !attempted && ctx.is_top_level_object() && metadata.is_binding_required() {
            let message = ctx.messages().missing_bind_required_value(ctx.field_name());
            let model_name = ctx.model_name().to_string();
            ctx.model_state_mut().try_add_model_error(&model_name, message);
        }

        if !succeeded && availability == ModelDataAvailability::GreedyPropertiesMayHaveData {
            debug!(model_name = %ctx.model_name(), "greedy properties produced nothing");
            return Ok(());
        }
        ctx.set_result(ModelBindingResult::Success(ModelValue::Object(object)));
        Ok(())
    }
}

fn field_name(property: &ModelMetadata) -> &str {
    property
        .binder_model_name()
        .or_else(|| property.name())
        .unwrap_or_default()
}

fn can_bind_property(ctx: &ModelBindingContext<'_>, property: &ModelMetadata) -> bool {
    if !property.is_binding_allowed() {
        return false;
    }
    if let Some(name) = property.name() {
        if !ctx.is_property_included(name) {
            return false;
        }
    }
    !property.is_read_only() || property.model_type().is_complex()
}

fn type_name(model_type: &ModelType) -> String {
    match model_type.underlying() {
        ModelType::Complex(name) => name.clone(),
        other => other.to_string(),
    }
}
