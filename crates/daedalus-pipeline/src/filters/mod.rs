//! Filter kinds, descriptors, ordering and providers.
//!
//! Filters come in five kinds, one per pipeline stage. Each kind is a trait
//! with an executing and, where the stage has one, an executed half. A
//! [`Filter`] is the tagged union the invoker dispatches on.
//!
//! Within a stage filters run in `(scope, order)` order, with declaration
//! order breaking ties: global filters are declared before controller
//! filters, which are declared before action filters.

mod builtin;
mod context;

pub use builtin::{FnFilterFactory, ModelStateInvalidFilter, UnsupportedContentTypeFilter};
pub use context::{
    ActionContext, ActionExecutedContext, ActionExecutingContext, AuthorizationFilterContext,
    ExceptionContext, ResourceExecutedContext, ResourceExecutingContext, ResultExecutedContext,
    ResultExecutingContext,
};

use async_trait::async_trait;
use daedalus_core::ServiceProvider;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::descriptor::ActionDescriptor;
use crate::error::{PipelineError, PipelineResult};

/// Runs first; may short-circuit with a challenge or forbid result.
#[async_trait]
pub trait AuthorizationFilter: Send + Sync + fmt::Debug {
    /// Order within the scope.
    fn order(&self) -> i32 {
        0
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Decides whether the request may proceed.
    async fn on_authorization(&self, ctx: &mut AuthorizationFilterContext<'_>) -> anyhow::Result<()>;
}

/// Wraps binding, the action and the result.
#[async_trait]
pub trait ResourceFilter: Send + Sync + fmt::Debug {
    /// Order within the scope.
    fn order(&self) -> i32 {
        0
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Before the inner pipeline.
    async fn on_resource_executing(&self, _ctx: &mut ResourceExecutingContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// After the inner pipeline.
    async fn on_resource_executed(&self, _ctx: &mut ResourceExecutedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Wraps the action method.
#[async_trait]
pub trait ActionFilter: Send + Sync + fmt::Debug {
    /// Order within the scope.
    fn order(&self) -> i32 {
        0
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Before the action, after binding.
    async fn on_action_executing(&self, _ctx: &mut ActionExecutingContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// After the action.
    async fn on_action_executed(&self, _ctx: &mut ActionExecutedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sees errors escaping action or result execution.
#[async_trait]
pub trait ExceptionFilter: Send + Sync + fmt::Debug {
    /// Order within the scope.
    fn order(&self) -> i32 {
        0
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Inspects the error; may mark it handled and supply a result.
    async fn on_exception(&self, ctx: &mut ExceptionContext<'_>) -> anyhow::Result<()>;
}

/// Wraps result execution.
#[async_trait]
pub trait ResultFilter: Send + Sync + fmt::Debug {
    /// Order within the scope.
    fn order(&self) -> i32 {
        0
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Before the result runs.
    async fn on_result_executing(&self, _ctx: &mut ResultExecutingContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// After the result ran or was canceled.
    async fn on_result_executed(&self, _ctx: &mut ResultExecutedContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Pipeline stage a filter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStage {
    /// Authorization.
    Authorization,
    /// Resource.
    Resource,
    /// Action.
    Action,
    /// Exception.
    Exception,
    /// Result.
    Result,
}

impl FilterStage {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::Resource => "resource",
            Self::Action => "action",
            Self::Exception => "exception",
            Self::Result => "result",
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter of one of the five kinds.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Authorization filter.
    Authorization(Arc<dyn AuthorizationFilter>),
    /// Resource filter.
    Resource(Arc<dyn ResourceFilter>),
    /// Action filter.
    Action(Arc<dyn ActionFilter>),
    /// Exception filter.
    Exception(Arc<dyn ExceptionFilter>),
    /// Result filter.
    Result(Arc<dyn ResultFilter>),
}

impl Filter {
    /// Wraps an authorization filter.
    pub fn authorization(filter: impl AuthorizationFilter + 'static) -> Self {
        Self::Authorization(Arc::new(filter))
    }

    /// Wraps a resource filter.
    pub fn resource(filter: impl ResourceFilter + 'static) -> Self {
        Self::Resource(Arc::new(filter))
    }

    /// Wraps an action filter.
    pub fn action(filter: impl ActionFilter + 'static) -> Self {
        Self::Action(Arc::new(filter))
    }

    /// Wraps an exception filter.
    pub fn exception(filter: impl ExceptionFilter + 'static) -> Self {
        Self::Exception(Arc::new(filter))
    }

    /// Wraps a result filter.
    pub fn result(filter: impl ResultFilter + 'static) -> Self {
        Self::Result(Arc::new(filter))
    }

    /// The filter's own order.
    #[must_use]
    pub fn order(&self) -> i32 {
        match self {
            Self::Authorization(f) => f.order(),
            Self::Resource(f) => f.order(),
            Self::Action(f) => f.order(),
            Self::Exception(f) => f.order(),
            Self::Result(f) => f.order(),
        }
    }

    /// The filter's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authorization(f) => f.name(),
            Self::Resource(f) => f.name(),
            Self::Action(f) => f.name(),
            Self::Exception(f) => f.name(),
            Self::Result(f) => f.name(),
        }
    }

    /// The stage this filter runs in.
    #[must_use]
    pub const fn stage(&self) -> FilterStage {
        match self {
            Self::Authorization(_) => FilterStage::Authorization,
            Self::Resource(_) => FilterStage::Resource,
            Self::Action(_) => FilterStage::Action,
            Self::Exception(_) => FilterStage::Exception,
            Self::Result(_) => FilterStage::Result,
        }
    }
}

/// Where a filter was declared. Outer scopes run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterScope {
    /// Applies to every action.
    Global,
    /// Declared on the controller.
    Controller,
    /// Declared on the action.
    Action,
}

/// Creates filter instances, possibly from request services.
pub trait FilterFactory: Send + Sync + fmt::Debug {
    /// Whether one instance may serve every request. Reusable output is cached
    /// with the action's filter list; other factories run per request.
    fn is_reusable(&self) -> bool {
        false
    }

    /// Order within the scope.
    fn order(&self) -> i32 {
        0
    }

    /// Name used in logs and errors.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Creates a filter.
    fn create_instance(&self, services: &dyn ServiceProvider) -> anyhow::Result<Filter>;
}

/// A filter instance or a factory.
#[derive(Debug, Clone)]
pub enum FilterSource {
    /// A ready instance.
    Instance(Filter),
    /// A factory.
    Factory(Arc<dyn FilterFactory>),
}

/// A declared filter with its scope and order.
#[derive(Debug, Clone)]
pub struct FilterDescriptor {
    source: FilterSource,
    scope: FilterScope,
    order: i32,
}

impl FilterDescriptor {
    /// Declares an instance; the order comes from the filter.
    #[must_use]
    pub fn new(filter: Filter, scope: FilterScope) -> Self {
        let order = filter.order();
        Self {
            source: FilterSource::Instance(filter),
            scope,
            order,
        }
    }

    /// Declares a factory; the order comes from the factory.
    #[must_use]
    pub fn factory(factory: Arc<dyn FilterFactory>, scope: FilterScope) -> Self {
        let order = factory.order();
        Self {
            source: FilterSource::Factory(factory),
            scope,
            order,
        }
    }

    /// Overrides the order.
    #[must_use]
    pub const fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Instance or factory.
    #[must_use]
    pub const fn source(&self) -> &FilterSource {
        &self.source
    }

    /// Declaration scope.
    #[must_use]
    pub const fn scope(&self) -> FilterScope {
        self.scope
    }

    /// Order within the scope.
    #[must_use]
    pub const fn order(&self) -> i32 {
        self.order
    }
}

/// Sorts by `(scope, order)`. The sort is stable, so declaration order
/// breaks ties.
pub fn sort_filter_descriptors(descriptors: &mut [FilterDescriptor]) {
    descriptors.sort_by_key(|d| (d.scope, d.order));
}

/// A descriptor with its materialized filter.
#[derive(Debug, Clone)]
pub struct FilterItem {
    /// The declaration.
    pub descriptor: FilterDescriptor,
    /// The instance, once a provider created it.
    pub filter: Option<Filter>,
    /// Whether `filter` may be cached across requests.
    pub is_reusable: bool,
}

impl FilterItem {
    /// An item with no instance yet.
    #[must_use]
    pub const fn new(descriptor: FilterDescriptor) -> Self {
        Self {
            descriptor,
            filter: None,
            is_reusable: false,
        }
    }
}

/// Input and output of filter providers.
#[derive(Debug)]
pub struct FilterProviderContext<'a> {
    /// The action.
    pub action: &'a ActionDescriptor,
    /// Services for factories.
    pub services: &'a dyn ServiceProvider,
    /// Ordered items; providers fill in instances.
    pub results: Vec<FilterItem>,
}

/// Materializes filter instances for an action.
///
/// `on_providers_executing` runs in provider order, `on_providers_executed`
/// in reverse.
pub trait FilterProvider: Send + Sync + fmt::Debug {
    /// Provider order.
    fn order(&self) -> i32 {
        -1000
    }

    /// Creates instances.
    fn on_providers_executing(&self, ctx: &mut FilterProviderContext<'_>) -> PipelineResult<()>;

    /// Post-processes instances.
    fn on_providers_executed(&self, _ctx: &mut FilterProviderContext<'_>) -> PipelineResult<()> {
        Ok(())
    }
}

/// Instances are used as-is; factories are invoked.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFilterProvider;

impl DefaultFilterProvider {
    /// Creates the instance for one item if it has none.
    pub fn provide_filter(item: &mut FilterItem, services: &dyn ServiceProvider) -> PipelineResult<()> {
        if item.filter.is_some() {
            return Ok(());
        }
        match item.descriptor.source() {
            FilterSource::Instance(filter) => {
                item.filter = Some(filter.clone());
                item.is_reusable = true;
            }
            FilterSource::Factory(factory) => {
                let filter = factory
                    .create_instance(services)
                    .map_err(|e| PipelineError::filter(factory.name(), e))?;
                debug!(factory = factory.name(), stage = %filter.stage(), "filter created by factory");
                item.filter = Some(filter);
                item.is_reusable = factory.is_reusable();
            }
        }
        Ok(())
    }
}

impl FilterProvider for DefaultFilterProvider {
    fn on_providers_executing(&self, ctx: &mut FilterProviderContext<'_>) -> PipelineResult<()> {
        for item in &mut ctx.results {
            Self::provide_filter(item, ctx.services)?;
        }
        Ok(())
    }
}

/// Filters split by stage, each list in execution order.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    /// Authorization filters.
    pub authorization: Vec<Arc<dyn AuthorizationFilter>>,
    /// Resource filters.
    pub resource: Vec<Arc<dyn ResourceFilter>>,
    /// Action filters.
    pub action: Vec<Arc<dyn ActionFilter>>,
    /// Exception filters.
    pub exception: Vec<Arc<dyn ExceptionFilter>>,
    /// Result filters.
    pub result: Vec<Arc<dyn ResultFilter>>,
}

impl FilterSet {
    /// Splits ordered filters by stage, keeping their relative order.
    pub fn from_filters<I: IntoIterator<Item = Filter>>(filters: I) -> Self {
        let mut set = Self::default();
        for filter in filters {
            match filter {
                Filter::Authorization(f) => set.authorization.push(f),
                Filter::Resource(f) => set.resource.push(f),
                Filter::Action(f) => set.action.push(f),
                Filter::Exception(f) => set.exception.push(f),
                Filter::Result(f) => set.result.push(f),
            }
        }
        set
    }

    /// Total number of filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authorization.len()
            + self.resource.len()
            + self.action.len()
            + self.exception.len()
            + self.result.len()
    }

    /// Whether there are no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::Container;
    use proptest::prelude::*;

    #[derive(Debug)]
    struct Tagged {
        tag: usize,
        order: i32,
    }

    #[async_trait]
    impl ActionFilter for Tagged {
        fn order(&self) -> i32 {
            self.order
        }
    }

    fn tags_of(sorted: &[FilterDescriptor], declared: &[Arc<Tagged>]) -> Vec<usize> {
        sorted
            .iter()
            .filter_map(|descriptor| match descriptor.source() {
                FilterSource::Instance(Filter::Action(f)) => declared
                    .iter()
                    .find(|t| Arc::as_ptr(f).cast::<()>() == Arc::as_ptr(t).cast::<()>())
                    .map(|t| t.tag),
                _ => None,
            })
            .collect()
    }

    fn scope_strategy() -> impl Strategy<Value = FilterScope> {
        prop_oneof![
            Just(FilterScope::Global),
            Just(FilterScope::Controller),
            Just(FilterScope::Action),
        ]
    }

    proptest! {
        #[test]
        fn test_ordering_is_stable_sort_by_scope_then_order(
            specs in prop::collection::vec((scope_strategy(), -3i32..3), 0..24)
        ) {
            let tagged: Vec<Arc<Tagged>> = specs
                .iter()
                .enumerate()
                .map(|(tag, (_, order))| Arc::new(Tagged { tag, order: *order }))
                .collect();
            let declared: Vec<FilterDescriptor> = tagged
                .iter()
                .zip(&specs)
                .map(|(filter, (scope, _))| {
                    FilterDescriptor::new(Filter::Action(Arc::clone(filter) as Arc<dyn ActionFilter>), *scope)
                })
                .collect();

            let mut first = declared.clone();
            sort_filter_descriptors(&mut first);
            let mut second = declared;
            sort_filter_descriptors(&mut second);

            let first_tags = tags_of(&first, &tagged);
            let second_tags = tags_of(&second, &tagged);
            prop_assert_eq!(&first_tags, &second_tags);

            let mut expected: Vec<(FilterScope, i32, usize)> = specs
                .iter()
                .enumerate()
                .map(|(tag, (scope, order))| (*scope, *order, tag))
                .collect();
            expected.sort();
            let expected_tags: Vec<usize> = expected.into_iter().map(|(_, _, tag)| tag).collect();
            prop_assert_eq!(first_tags, expected_tags);
        }
    }

    #[test]
    fn test_descriptor_takes_filter_order() {
        let descriptor = FilterDescriptor::new(Filter::action(Tagged { tag: 0, order: -5 }), FilterScope::Action);
        assert_eq!(descriptor.order(), -5);
        assert_eq!(descriptor.with_order(3).order(), 3);
    }

    #[test]
    fn test_default_provider_materializes() {
        let services = Container::new();
        let factory = Arc::new(FnFilterFactory::new(false, |_| {
            Ok(Filter::action(Tagged { tag: 1, order: 0 }))
        }));
        let mut instance = FilterItem::new(FilterDescriptor::new(
            Filter::action(Tagged { tag: 0, order: 0 }),
            FilterScope::Global,
        ));
        let mut produced = FilterItem::new(FilterDescriptor::factory(factory, FilterScope::Action));

        DefaultFilterProvider::provide_filter(&mut instance, &services).expect("instance");
        DefaultFilterProvider::provide_filter(&mut produced, &services).expect("factory");
        assert!(instance.is_reusable);
        assert!(produced.filter.is_some());
        assert!(!produced.is_reusable);
    }

    #[test]
    fn test_factory_failure_names_factory() {
        let services = Container::new();
        let factory = Arc::new(FnFilterFactory::new(true, |_| Err(anyhow::anyhow!("missing clock"))));
        let mut item = FilterItem::new(FilterDescriptor::factory(factory, FilterScope::Action));
        let err = DefaultFilterProvider::provide_filter(&mut item, &services).unwrap_err();
        assert!(matches!(err, PipelineError::Filter { .. }));
        assert!(err.to_string().contains("missing clock"));
    }

    #[test]
    fn test_filter_set_split() {
        let set = FilterSet::from_filters([
            Filter::action(Tagged { tag: 0, order: 0 }),
            Filter::action(Tagged { tag: 1, order: 0 }),
        ]);
        assert_eq!(set.action.len(), 2);
        assert_eq!(set.len(), 2);
        assert!(set.resource.is_empty());
    }
}
