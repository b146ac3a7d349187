//! Action descriptors and handlers.
//!
//! An [`ActionDescriptor`] is immutable once built and shared by every
//! request that invokes it.

use async_trait::async_trait;
use daedalus_core::{ModelValue, ParameterDescriptor, RequestContext};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::constraints::ConstraintDescriptor;
use crate::filters::{Filter, FilterDescriptor, FilterScope};
use crate::results::BoxedActionResult;

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of an action descriptor. Cache key for per-action artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    fn next() -> Self {
        Self(NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bound arguments keyed by parameter name, in parameter order.
#[derive(Debug, Clone, Default)]
pub struct ActionArguments {
    values: IndexMap<String, ModelValue>,
}

impl ActionArguments {
    /// Creates an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an argument, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: ModelValue) -> Option<ModelValue> {
        self.values.insert(name.into(), value)
    }

    /// Returns an argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModelValue> {
        self.values.get(name)
    }

    /// Removes an argument.
    pub fn remove(&mut self, name: &str) -> Option<ModelValue> {
        self.values.shift_remove(name)
    }

    /// Deserializes an argument into `T`.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' was not bound"))?;
        Ok(value.deserialize()?)
    }

    /// Whether an argument is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Arguments in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What an action method returned.
#[derive(Debug, Clone)]
pub enum ActionOutput {
    /// An explicit result.
    Result(BoxedActionResult),
    /// A value written through output formatting with status 200.
    Value(serde_json::Value),
    /// Nothing; an empty 200 response.
    Empty,
}

impl ActionOutput {
    /// Serializes `value` into a [`ActionOutput::Value`].
    pub fn json<T: Serialize>(value: &T) -> anyhow::Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }
}

impl From<BoxedActionResult> for ActionOutput {
    fn from(result: BoxedActionResult) -> Self {
        Self::Result(result)
    }
}

/// The invocable body of an action.
#[async_trait]
pub trait ActionHandler: Send + Sync + fmt::Debug {
    /// Invokes the action with bound arguments.
    async fn invoke(
        &self,
        request: Arc<RequestContext>,
        arguments: ActionArguments,
    ) -> anyhow::Result<ActionOutput>;
}

/// An [`ActionHandler`] backed by an async closure.
///
/// # Example
///
/// ```rust,ignore
/// let handler = FnActionHandler::new(|_request, args| async move {
///     let id: i64 = args.get_as("id")?;
///     ActionOutput::json(&serde_json::json!({ "id": id }))
/// });
/// ```
pub struct FnActionHandler<F> {
    func: F,
}

impl<F, Fut> FnActionHandler<F>
where
    F: Fn(Arc<RequestContext>, ActionArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ActionOutput>> + Send + 'static,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnActionHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnActionHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> ActionHandler for FnActionHandler<F>
where
    F: Fn(Arc<RequestContext>, ActionArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ActionOutput>> + Send + 'static,
{
    async fn invoke(
        &self,
        request: Arc<RequestContext>,
        arguments: ActionArguments,
    ) -> anyhow::Result<ActionOutput> {
        (self.func)(request, arguments).await
    }
}

/// Immutable description of one invocable action.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    id: ActionId,
    display_name: String,
    controller: Option<String>,
    action_name: String,
    parameters: Vec<ParameterDescriptor>,
    filters: Vec<FilterDescriptor>,
    constraints: Vec<ConstraintDescriptor>,
    allow_anonymous: bool,
    metadata_owner: String,
    handler: Arc<dyn ActionHandler>,
}

impl ActionDescriptor {
    /// Starts building a descriptor for `controller.action`.
    pub fn builder(
        controller: impl Into<String>,
        action_name: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> ActionDescriptorBuilder {
        ActionDescriptorBuilder::new(Some(controller.into()), action_name.into(), handler)
    }

    /// Starts building a descriptor for an action without a controller.
    pub fn endpoint(action_name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> ActionDescriptorBuilder {
        ActionDescriptorBuilder::new(None, action_name.into(), handler)
    }

    /// Identity, unique per built descriptor.
    #[must_use]
    pub const fn id(&self) -> ActionId {
        self.id
    }

    /// `Controller.Action`, or the action name alone.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Controller name.
    #[must_use]
    pub fn controller(&self) -> Option<&str> {
        self.controller.as_deref()
    }

    /// Action name.
    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// Controller- and action-scoped filters in declaration order.
    #[must_use]
    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }

    /// Selection constraints.
    #[must_use]
    pub fn constraints(&self) -> &[ConstraintDescriptor] {
        &self.constraints
    }

    /// Whether authorization filters are bypassed.
    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    /// Owner name under which parameter metadata is cached.
    #[must_use]
    pub fn metadata_owner(&self) -> &str {
        &self.metadata_owner
    }

    /// The action body.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn ActionHandler> {
        &self.handler
    }
}

/// Builder for [`ActionDescriptor`].
#[derive(Debug)]
pub struct ActionDescriptorBuilder {
    controller: Option<String>,
    action_name: String,
    parameters: Vec<ParameterDescriptor>,
    filters: Vec<FilterDescriptor>,
    constraints: Vec<ConstraintDescriptor>,
    allow_anonymous: bool,
    handler: Arc<dyn ActionHandler>,
}

impl ActionDescriptorBuilder {
    fn new(controller: Option<String>, action_name: String, handler: Arc<dyn ActionHandler>) -> Self {
        Self {
            controller,
            action_name,
            parameters: Vec::new(),
            filters: Vec::new(),
            constraints: Vec::new(),
            allow_anonymous: false,
            handler,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Adds a filter declared on the controller.
    #[must_use]
    pub fn controller_filter(self, filter: Filter) -> Self {
        self.filter_descriptor(FilterDescriptor::new(filter, FilterScope::Controller))
    }

    /// Adds a filter declared on the action.
    #[must_use]
    pub fn filter(self, filter: Filter) -> Self {
        self.filter_descriptor(FilterDescriptor::new(filter, FilterScope::Action))
    }

    /// Adds a filter descriptor.
    #[must_use]
    pub fn filter_descriptor(mut self, descriptor: FilterDescriptor) -> Self {
        self.filters.push(descriptor);
        self
    }

    /// Adds a selection constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: ConstraintDescriptor) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Bypasses authorization filters.
    #[must_use]
    pub fn allow_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }

    /// Builds the descriptor with a fresh [`ActionId`].
    #[must_use]
    pub fn build(self) -> ActionDescriptor {
        let id = ActionId::next();
        let display_name = match &self.controller {
            Some(controller) => format!("{controller}.{}", self.action_name),
            None => self.action_name.clone(),
        };
        let metadata_owner = format!("{display_name}#{id}");
        ActionDescriptor {
            id,
            display_name,
            controller: self.controller,
            action_name: self.action_name,
            parameters: self.parameters,
            filters: self.filters,
            constraints: self.constraints,
            allow_anonymous: self.allow_anonymous,
            metadata_owner,
            handler: self.handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::testing::RequestBuilder;
    use daedalus_core::ModelType;

    fn echo() -> Arc<dyn ActionHandler> {
        Arc::new(FnActionHandler::new(|_request, args: ActionArguments| async move {
            let id: i64 = args.get_as("id")?;
            ActionOutput::json(&serde_json::json!({ "id": id }))
        }))
    }

    #[test]
    fn test_builder() {
        let action = ActionDescriptor::builder("Orders", "Get", echo())
            .parameter(ParameterDescriptor::new("id", ModelType::int()).from_route())
            .allow_anonymous()
            .build();
        assert_eq!(action.display_name(), "Orders.Get");
        assert_eq!(action.controller(), Some("Orders"));
        assert_eq!(action.parameters().len(), 1);
        assert!(action.allow_anonymous());
        assert!(action.metadata_owner().starts_with("Orders.Get#"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ActionDescriptor::endpoint("ping", echo()).build();
        let b = ActionDescriptor::endpoint("ping", echo()).build();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.display_name(), "ping");
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let mut args = ActionArguments::new();
        args.insert("id", ModelValue::Int(7));
        let request = Arc::new(RequestBuilder::get("/orders/7").build());
        let output = echo().invoke(request, args).await.expect("output");
        match output {
            ActionOutput::Value(value) => assert_eq!(value["id"], 7),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_argument_is_error() {
        let request = Arc::new(RequestBuilder::get("/").build());
        let err = echo().invoke(request, ActionArguments::new()).await.unwrap_err();
        assert!(err.to_string().contains("'id' was not bound"));
    }
}
