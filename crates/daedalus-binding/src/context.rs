//! Binding context with scoped push/pop.
//!
//! One [`ModelBindingContext`] exists per bound parameter. Binders descend
//! into properties and elements by entering a nested scope, which swaps in
//! the child's metadata, key and value provider. The returned
//! [`NestedScope`] guard restores the parent's values when dropped, so the
//! parent is restored on every exit path, including `?` and cancellation.

use daedalus_core::{
    BindingSource, ModelBindingMessages, ModelMetadata, ModelMetadataProvider,
    ModelStateDictionary, ModelValue, MvcOptions, RequestContext, ValidationStateDictionary,
};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::{BindingError, BindingResult};
use crate::value_provider::{CompositeValueProvider, ValueProvider};

/// Outcome of binding one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ModelBindingResult {
    /// No value was produced. Diagnostics, if any, are in model state.
    #[default]
    Failed,
    /// A value was produced.
    Success(ModelValue),
}

impl ModelBindingResult {
    /// Whether a value was produced.
    #[must_use]
    pub const fn is_model_set(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The produced value.
    #[must_use]
    pub const fn model(&self) -> Option<&ModelValue> {
        match self {
            Self::Success(model) => Some(model),
            Self::Failed => None,
        }
    }

    /// Consumes the result, returning the produced value.
    #[must_use]
    pub fn into_model(self) -> Option<ModelValue> {
        match self {
            Self::Success(model) => Some(model),
            Self::Failed => None,
        }
    }
}

/// Shared, read-only collaborators of a binding operation.
#[derive(Debug, Clone, Copy)]
pub struct BindingEnvironment<'r> {
    /// The request being bound.
    pub request: &'r RequestContext,
    /// Metadata for child models.
    pub metadata_provider: &'r ModelMetadataProvider,
    /// Limits and messages.
    pub options: &'r MvcOptions,
}

#[derive(Debug, Clone)]
struct BindingScope {
    metadata: Arc<ModelMetadata>,
    model_name: String,
    field_name: String,
    binding_source: Option<BindingSource>,
    is_top_level_object: bool,
    model: Option<ModelValue>,
    value_provider: Arc<dyn ValueProvider>,
    result: ModelBindingResult,
}

/// Mutable state threaded through a binder tree.
#[derive(Debug)]
pub struct ModelBindingContext<'r> {
    env: BindingEnvironment<'r>,
    original_value_provider: Arc<dyn ValueProvider>,
    model_state: &'r mut ModelStateDictionary,
    validation_state: &'r mut ValidationStateDictionary,
    scope: BindingScope,
    depth: usize,
}

impl<'r> ModelBindingContext<'r> {
    /// Creates the context for a top-level model.
    ///
    /// The value provider in scope is `value_provider` filtered by the
    /// metadata's binding source.
    pub fn new_top_level(
        env: BindingEnvironment<'r>,
        model_state: &'r mut ModelStateDictionary,
        validation_state: &'r mut ValidationStateDictionary,
        value_provider: Arc<dyn ValueProvider>,
        metadata: Arc<ModelMetadata>,
        model_name: impl Into<String>,
    ) -> Self {
        let model_name = model_name.into();
        let field_name = metadata
            .binder_model_name()
            .or_else(|| metadata.name())
            .map_or_else(|| model_name.clone(), str::to_string);
        let scoped_provider = filtered_provider(&value_provider, metadata.binding_source())
            .unwrap_or_else(|| Arc::clone(&value_provider));
        Self {
            env,
            original_value_provider: value_provider,
            model_state,
            validation_state,
            scope: BindingScope {
                binding_source: metadata.binding_source().cloned(),
                metadata,
                field_name,
                model_name,
                is_top_level_object: true,
                model: None,
                value_provider: scoped_provider,
                result: ModelBindingResult::Failed,
            },
            depth: 0,
        }
    }

    /// Enters a child scope.
    ///
    /// Fails once nesting exceeds `max_model_binding_recursion_depth`.
    pub fn enter_nested_scope(
        &mut self,
        metadata: Arc<ModelMetadata>,
        field_name: impl Into<String>,
        model_name: impl Into<String>,
        model: Option<ModelValue>,
    ) -> BindingResult<NestedScope<'_, 'r>> {
        let model_name = model_name.into();
        let max = self.env.options.max_model_binding_recursion_depth;
        if self.depth + 1 > max {
            return Err(BindingError::max_depth(max, model_name));
        }

        let value_provider = filtered_provider(&self.original_value_provider, metadata.binding_source())
            .unwrap_or_else(|| Arc::clone(&self.scope.value_provider));
        let child = BindingScope {
            binding_source: metadata.binding_source().cloned(),
            metadata,
            field_name: field_name.into(),
            model_name,
            is_top_level_object: false,
            model,
            value_provider,
            result: ModelBindingResult::Failed,
        };
        let saved = std::mem::replace(&mut self.scope, child);
        self.depth += 1;
        Ok(NestedScope {
            ctx: self,
            saved: Some(saved),
        })
    }

    /// The value provider a child with `metadata` would see, without entering
    /// its scope.
    #[must_use]
    pub fn value_provider_for(&self, metadata: &ModelMetadata) -> Arc<dyn ValueProvider> {
        filtered_provider(&self.original_value_provider, metadata.binding_source())
            .unwrap_or_else(|| Arc::clone(&self.scope.value_provider))
    }

    /// The request.
    #[must_use]
    pub const fn request(&self) -> &'r RequestContext {
        self.env.request
    }

    /// Shared collaborators.
    #[must_use]
    pub const fn environment(&self) -> BindingEnvironment<'r> {
        self.env
    }

    /// Metadata of the model in scope.
    #[must_use]
    pub fn metadata(&self) -> &Arc<ModelMetadata> {
        &self.scope.metadata
    }

    /// Key prefix of the model in scope.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.scope.model_name
    }

    /// Replaces the key prefix of the model in scope.
    pub fn set_model_name(&mut self, model_name: impl Into<String>) {
        self.scope.model_name = model_name.into();
    }

    /// Property, parameter or index name of the model in scope.
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.scope.field_name
    }

    /// Binding source of the model in scope.
    #[must_use]
    pub const fn binding_source(&self) -> Option<&BindingSource> {
        self.scope.binding_source.as_ref()
    }

    /// Whether the model in scope is the parameter itself.
    #[must_use]
    pub const fn is_top_level_object(&self) -> bool {
        self.scope.is_top_level_object
    }

    /// Existing value to bind into, if any.
    #[must_use]
    pub const fn model(&self) -> Option<&ModelValue> {
        self.scope.model.as_ref()
    }

    /// Result recorded by the binder in scope.
    #[must_use]
    pub const fn result(&self) -> &ModelBindingResult {
        &self.scope.result
    }

    /// Records the binder result for the model in scope.
    pub fn set_result(&mut self, result: ModelBindingResult) {
        self.scope.result = result;
    }

    /// Takes the recorded result, leaving `Failed`.
    pub fn take_result(&mut self) -> ModelBindingResult {
        std::mem::take(&mut self.scope.result)
    }

    /// Value provider for the model in scope.
    #[must_use]
    pub fn value_provider(&self) -> &Arc<dyn ValueProvider> {
        &self.scope.value_provider
    }

    /// Replaces the value provider for the model in scope.
    pub fn set_value_provider(&mut self, value_provider: Arc<dyn ValueProvider>) {
        self.scope.value_provider = value_provider;
    }

    /// The unfiltered value provider of the whole operation.
    #[must_use]
    pub fn original_value_provider(&self) -> &Arc<dyn ValueProvider> {
        &self.original_value_provider
    }

    /// Model state.
    #[must_use]
    pub fn model_state(&self) -> &ModelStateDictionary {
        self.model_state
    }

    /// Mutable model state.
    pub fn model_state_mut(&mut self) -> &mut ModelStateDictionary {
        self.model_state
    }

    /// Mutable validation state.
    pub fn validation_state_mut(&mut self) -> &mut ValidationStateDictionary {
        self.validation_state
    }

    /// Metadata provider.
    #[must_use]
    pub const fn metadata_provider(&self) -> &'r ModelMetadataProvider {
        self.env.metadata_provider
    }

    /// Options.
    #[must_use]
    pub const fn options(&self) -> &'r MvcOptions {
        self.env.options
    }

    /// Error message templates.
    #[must_use]
    pub fn messages(&self) -> &'r ModelBindingMessages {
        &self.env.options.messages
    }

    /// Number of nested scopes currently entered.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Whether the property filter of the model in scope admits `name`.
    #[must_use]
    pub fn is_property_included(&self, name: &str) -> bool {
        self.scope
            .metadata
            .property_filter()
            .map_or(true, |names| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
    }
}

// Greedy and absent sources see the provider already in scope.
fn filtered_provider(
    provider: &Arc<dyn ValueProvider>,
    source: Option<&BindingSource>,
) -> Option<Arc<dyn ValueProvider>> {
    let source = source.filter(|s| !s.is_greedy())?;
    Some(
        provider
            .filter(source)
            .unwrap_or_else(|| Arc::new(CompositeValueProvider::default())),
    )
}

/// Guard for a child scope. Dereferences to the context; restores the
/// parent scope on drop.
#[derive(Debug)]
pub struct NestedScope<'s, 'r> {
    ctx: &'s mut ModelBindingContext<'r>,
    saved: Option<BindingScope>,
}

impl<'r> Deref for NestedScope<'_, 'r> {
    type Target = ModelBindingContext<'r>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for NestedScope<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for NestedScope<'_, '_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.ctx.scope = saved;
        }
        self.ctx.depth -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_provider::NameValueProvider;
    use daedalus_core::testing::RequestBuilder;
    use daedalus_core::{ModelType, ParameterDescriptor};

    struct Fixture {
        request: RequestContext,
        provider: ModelMetadataProvider,
        options: MvcOptions,
        model_state: ModelStateDictionary,
        validation_state: ValidationStateDictionary,
    }

    impl Fixture {
        fn new(options: MvcOptions) -> Self {
            Self {
                request: RequestBuilder::get("/").build(),
                provider: ModelMetadataProvider::default(),
                options,
                model_state: ModelStateDictionary::new(),
                validation_state: ValidationStateDictionary::new(),
            }
        }

        fn context(&mut self, value_provider: Arc<dyn ValueProvider>) -> ModelBindingContext<'_> {
            let metadata = self.provider.for_type(&ModelType::int());
            let env = BindingEnvironment {
                request: &self.request,
                metadata_provider: &self.provider,
                options: &self.options,
            };
            ModelBindingContext::new_top_level(
                env,
                &mut self.model_state,
                &mut self.validation_state,
                value_provider,
                metadata,
                "root",
            )
        }
    }

    fn query(pairs: &[(&str, &str)]) -> Arc<dyn ValueProvider> {
        Arc::new(NameValueProvider::new(
            BindingSource::Query,
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        ))
    }

    #[test]
    fn test_scope_restores_parent() {
        let mut fixture = Fixture::new(MvcOptions::default());
        let child = fixture.provider.for_type(&ModelType::string());
        let mut ctx = fixture.context(query(&[]));
        {
            let mut scope = ctx
                .enter_nested_scope(child, "name", "root.name", None)
                .expect("scope");
            assert_eq!(scope.model_name(), "root.name");
            assert!(!scope.is_top_level_object());
            assert_eq!(scope.depth(), 1);
            scope.set_result(ModelBindingResult::Success("x".into()));
        }
        assert_eq!(ctx.model_name(), "root");
        assert_eq!(ctx.field_name(), "root");
        assert!(ctx.is_top_level_object());
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.result(), &ModelBindingResult::Failed);
    }

    #[test]
    fn test_scope_restores_on_early_return() {
        fn bind_child(ctx: &mut ModelBindingContext<'_>, metadata: Arc<ModelMetadata>) -> BindingResult<()> {
            let scope = ctx.enter_nested_scope(metadata, "a", "root.a", None)?;
            Err(BindingError::max_depth(0, scope.model_name()))
        }

        let mut fixture = Fixture::new(MvcOptions::default());
        let child = fixture.provider.for_type(&ModelType::string());
        let mut ctx = fixture.context(query(&[]));
        assert!(bind_child(&mut ctx, child).is_err());
        assert_eq!(ctx.model_name(), "root");
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_recursion_guard() {
        let options = MvcOptions {
            max_model_binding_recursion_depth: 2,
            ..MvcOptions::default()
        };
        let mut fixture = Fixture::new(options);
        let child = fixture.provider.for_type(&ModelType::int());
        let mut ctx = fixture.context(query(&[]));

        let mut first = ctx
            .enter_nested_scope(Arc::clone(&child), "a", "root.a", None)
            .expect("depth 1");
        let mut second = first
            .enter_nested_scope(Arc::clone(&child), "b", "root.a.b", None)
            .expect("depth 2");
        let err = second
            .enter_nested_scope(child, "c", "root.a.b.c", None)
            .expect_err("depth 3");
        assert!(matches!(
            err,
            BindingError::MaxRecursionDepthExceeded { max: 2, ref model_name } if model_name == "root.a.b.c"
        ));
    }

    #[test]
    fn test_child_source_filters_original_provider() {
        let mut fixture = Fixture::new(MvcOptions::default());
        let parameter = ParameterDescriptor::new("id", ModelType::int()).from_route();
        let from_route = fixture.provider.for_parameter("Orders.Get", &parameter);
        let mut ctx = fixture.context(query(&[("id", "1")]));
        assert!(ctx.value_provider().contains_prefix("id"));

        let scope = ctx
            .enter_nested_scope(from_route, "id", "id", None)
            .expect("scope");
        assert!(!scope.value_provider().contains_prefix("id"));
    }
}
