//! Wiring of binders, validators, filters and formatters into one invoker.

use bytes::Bytes;
use daedalus_binding::{
    default_model_binder_providers, default_value_provider_factories, InputFormatter, JsonInputFormatter,
    ModelBinderFactory, ModelBinderProvider, ParameterBinder, ValueProviderFactory,
};
use daedalus_config::DaedalusConfig;
use daedalus_core::{ModelMetadataProvider, MvcError, MvcOptions, RequestContext};
use daedalus_pipeline::filters::{DefaultFilterProvider, ModelStateInvalidFilter, UnsupportedContentTypeFilter};
use daedalus_pipeline::{
    error_response, ActionDescriptor, ActionDescriptorCatalog, ActionInvoker, ActionSelector, Filter,
    FilterDescriptor, FilterProvider, InvokerCache, OutputFormatterSelector, PipelineError,
};
use daedalus_validation::{ModelValidatorProvider, ObjectModelValidator, RuleValidatorProvider, ValidatorCache};
use http::Response;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Builder for [`Mvc`].
///
/// # Example
///
/// ```rust,ignore
/// let mvc = Mvc::builder()
///     .options(config.mvc)
///     .metadata(provider)
///     .global_filter(Filter::action(AuditFilter::default()))
///     .api_behavior(true)
///     .actions(actions)
///     .build();
/// ```
#[derive(Default)]
pub struct MvcBuilder {
    options: MvcOptions,
    metadata: Option<ModelMetadataProvider>,
    actions: Vec<ActionDescriptor>,
    global_filters: Vec<Filter>,
    global_descriptors: Vec<FilterDescriptor>,
    filter_providers: Vec<Arc<dyn FilterProvider>>,
    binder_providers: Vec<Arc<dyn ModelBinderProvider>>,
    validator_providers: Vec<Arc<dyn ModelValidatorProvider>>,
    input_formatters: Vec<Arc<dyn InputFormatter>>,
    value_provider_factories: Vec<Arc<dyn ValueProviderFactory>>,
    output_formatters: Option<OutputFormatterSelector>,
    api_behavior: bool,
}

impl MvcBuilder {
    /// Creates a builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes options from a loaded configuration.
    #[must_use]
    pub fn config(mut self, config: &DaedalusConfig) -> Self {
        self.options = config.mvc.clone();
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn options(mut self, options: MvcOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the metadata provider binders and validators read from.
    #[must_use]
    pub fn metadata(mut self, provider: ModelMetadataProvider) -> Self {
        self.metadata = Some(provider);
        self
    }

    /// Adds an action to the initial catalog.
    #[must_use]
    pub fn action(mut self, action: ActionDescriptor) -> Self {
        self.actions.push(action);
        self
    }

    /// Adds actions to the initial catalog.
    #[must_use]
    pub fn actions<I: IntoIterator<Item = ActionDescriptor>>(mut self, actions: I) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Adds a filter that runs for every action.
    #[must_use]
    pub fn global_filter(mut self, filter: Filter) -> Self {
        self.global_filters.push(filter);
        self
    }

    /// Adds a global filter descriptor, such as a factory.
    #[must_use]
    pub fn global_filter_descriptor(mut self, descriptor: FilterDescriptor) -> Self {
        self.global_descriptors.push(descriptor);
        self
    }

    /// Adds a filter provider. The default provider always runs too.
    #[must_use]
    pub fn filter_provider(mut self, provider: Arc<dyn FilterProvider>) -> Self {
        self.filter_providers.push(provider);
        self
    }

    /// Adds a binder provider consulted before the built-in ones.
    #[must_use]
    pub fn model_binder_provider(mut self, provider: Arc<dyn ModelBinderProvider>) -> Self {
        self.binder_providers.push(provider);
        self
    }

    /// Adds a validator provider consulted after the rule provider.
    #[must_use]
    pub fn validator_provider(mut self, provider: Arc<dyn ModelValidatorProvider>) -> Self {
        self.validator_providers.push(provider);
        self
    }

    /// Adds an input formatter ahead of the JSON formatter.
    #[must_use]
    pub fn input_formatter(mut self, formatter: Arc<dyn InputFormatter>) -> Self {
        self.input_formatters.push(formatter);
        self
    }

    /// Adds a value provider factory after the built-in ones.
    #[must_use]
    pub fn value_provider_factory(mut self, factory: Arc<dyn ValueProviderFactory>) -> Self {
        self.value_provider_factories.push(factory);
        self
    }

    /// Replaces the output formatters.
    #[must_use]
    pub fn output_formatters(mut self, selector: OutputFormatterSelector) -> Self {
        self.output_formatters = Some(selector);
        self
    }

    /// Answers 400 with problem details whenever model state is invalid.
    #[must_use]
    pub fn api_behavior(mut self, enabled: bool) -> Self {
        self.api_behavior = enabled;
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Mvc {
        let options = Arc::new(self.options);
        let metadata = Arc::new(self.metadata.unwrap_or_default());

        let mut input_formatters = self.input_formatters;
        input_formatters.push(Arc::new(JsonInputFormatter));
        let input_formatters: Arc<[Arc<dyn InputFormatter>]> = input_formatters.into();

        let mut binder_providers = self.binder_providers;
        binder_providers.extend(default_model_binder_providers(input_formatters));
        let binder_factory = Arc::new(ModelBinderFactory::new(Arc::clone(&metadata), binder_providers));

        let mut validator_providers: Vec<Arc<dyn ModelValidatorProvider>> = vec![Arc::new(RuleValidatorProvider)];
        validator_providers.extend(self.validator_providers);
        let validator = ObjectModelValidator::new(
            Arc::clone(&metadata),
            Arc::new(ValidatorCache::new(validator_providers)),
            Arc::clone(&options),
        );
        let parameter_binder = Arc::new(ParameterBinder::new(metadata, binder_factory, validator, Arc::clone(&options)));

        let mut value_provider_factories = default_value_provider_factories();
        value_provider_factories.extend(self.value_provider_factories);

        let mut global_filters = vec![Filter::action(UnsupportedContentTypeFilter)];
        if self.api_behavior {
            global_filters.push(Filter::action(ModelStateInvalidFilter));
        }
        global_filters.extend(self.global_filters);

        let mut filter_providers = self.filter_providers;
        if !filter_providers.is_empty() {
            filter_providers.push(Arc::new(DefaultFilterProvider));
        }

        let catalog = Arc::new(ActionDescriptorCatalog::new(self.actions));
        let mut invoker_cache = InvokerCache::new(Arc::clone(&catalog), filter_providers, global_filters);
        for descriptor in self.global_descriptors {
            invoker_cache = invoker_cache.with_global_descriptor(descriptor);
        }
        let invoker_cache = Arc::new(invoker_cache);

        let invoker = ActionInvoker::new(
            parameter_binder,
            value_provider_factories,
            invoker_cache,
            Arc::new(self.output_formatters.unwrap_or_default()),
        );

        debug!(
            actions = catalog.snapshot().actions().len(),
            version = catalog.version(),
            "mvc pipeline built"
        );

        Mvc {
            selector: ActionSelector::new(Arc::clone(&catalog)),
            catalog,
            invoker,
            options,
        }
    }
}

impl fmt::Debug for MvcBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MvcBuilder")
            .field("options", &self.options)
            .field("actions", &self.actions.len())
            .field("global_filters", &self.global_filters.len())
            .field("api_behavior", &self.api_behavior)
            .finish_non_exhaustive()
    }
}

/// A built pipeline: catalog, action selection and the invoker.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct Mvc {
    catalog: Arc<ActionDescriptorCatalog>,
    selector: ActionSelector,
    invoker: ActionInvoker,
    options: Arc<MvcOptions>,
}

impl Mvc {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> MvcBuilder {
        MvcBuilder::new()
    }

    /// The action catalog. Replacing it invalidates every cache.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ActionDescriptorCatalog> {
        &self.catalog
    }

    /// The action selector.
    #[must_use]
    pub const fn selector(&self) -> &ActionSelector {
        &self.selector
    }

    /// The invoker.
    #[must_use]
    pub const fn invoker(&self) -> &ActionInvoker {
        &self.invoker
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> &Arc<MvcOptions> {
        &self.options
    }

    /// Starts a task that drops invoker cache entries from older catalog
    /// versions whenever the catalog is replaced.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn_cache_maintenance(&self) -> JoinHandle<()> {
        self.invoker.invoker_cache().spawn_purge_task()
    }

    /// Runs `action` and renders unhandled errors as an error envelope.
    pub async fn invoke(&self, request: RequestContext, action: Arc<ActionDescriptor>) -> Response<Bytes> {
        let request_id = request.request_id().to_string();
        match self.invoker.invoke(Arc::new(request), action).await {
            Ok(response) => response,
            Err(err) => render_error(err, &request_id),
        }
    }

    /// Runs the catalog action with `display_name`, or answers 404.
    pub async fn invoke_by_name(&self, request: RequestContext, display_name: &str) -> Response<Bytes> {
        let action = self.catalog.snapshot().find_by_name(display_name).cloned();
        match action {
            Some(action) => self.invoke(request, action).await,
            None => {
                let request_id = request.request_id().to_string();
                debug!(action = display_name, "action not in catalog");
                error_response(
                    &MvcError::not_found(format!("action '{display_name}' not found")),
                    Some(&request_id),
                )
            }
        }
    }

    /// Picks the best of the route-matched `candidates` and runs it.
    ///
    /// Answers 404 when no candidate's constraints accept the request and
    /// 500 when the best candidates tie.
    pub async fn dispatch(&self, request: RequestContext, candidates: &[Arc<ActionDescriptor>]) -> Response<Bytes> {
        let request_id = request.request_id().to_string();
        match self.selector.select_best(&request, candidates) {
            Ok(Some(action)) => self.invoke(request, action).await,
            Ok(None) => error_response(
                &MvcError::not_found("no action accepted the request"),
                Some(&request_id),
            ),
            Err(err) => render_error(err, &request_id),
        }
    }
}

fn render_error(err: PipelineError, request_id: &str) -> Response<Bytes> {
    if matches!(err, PipelineError::AmbiguousMatch { .. }) {
        warn!(request_id, error = %err, "ambiguous action match");
    }
    let err: MvcError = err.into();
    error_response(&err, Some(request_id))
}
