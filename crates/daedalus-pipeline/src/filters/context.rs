//! Contexts handed to filters at each stage.

use daedalus_binding::ValueProviderFactory;
use daedalus_core::{ModelStateDictionary, RequestContext};
use std::sync::Arc;

use crate::descriptor::{ActionArguments, ActionDescriptor};
use crate::error::PipelineError;
use crate::results::BoxedActionResult;

/// Per-request state shared by every stage.
#[derive(Debug)]
pub struct ActionContext {
    /// The request.
    pub request: Arc<RequestContext>,
    /// The action being invoked.
    pub action: Arc<ActionDescriptor>,
    /// Binding and validation outcomes.
    pub model_state: ModelStateDictionary,
}

impl ActionContext {
    /// Creates a context with empty model state capped at `max_errors`.
    #[must_use]
    pub fn new(request: Arc<RequestContext>, action: Arc<ActionDescriptor>, max_errors: usize) -> Self {
        Self {
            request,
            action,
            model_state: ModelStateDictionary::with_max_allowed_errors(max_errors),
        }
    }
}

/// Authorization stage. Setting `result` short-circuits the pipeline.
#[derive(Debug)]
pub struct AuthorizationFilterContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// Short-circuit result.
    pub result: Option<BoxedActionResult>,
}

/// Before the rest of the pipeline.
#[derive(Debug)]
pub struct ResourceExecutingContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// Short-circuit result.
    pub result: Option<BoxedActionResult>,
    /// Factories used to bind this request; filters may add or remove some.
    pub value_provider_factories: &'a mut Vec<Arc<dyn ValueProviderFactory>>,
}

/// After the rest of the pipeline.
#[derive(Debug)]
pub struct ResourceExecutedContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// The short-circuit result, or the result a handler supplies.
    pub result: Option<BoxedActionResult>,
    /// Whether a resource filter short-circuited.
    pub canceled: bool,
    /// Unhandled error from the inner pipeline.
    pub error: Option<PipelineError>,
    /// Set to stop `error` from propagating.
    pub exception_handled: bool,
}

/// Before the action runs, after binding.
#[derive(Debug)]
pub struct ActionExecutingContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// Bound arguments; filters may replace them.
    pub arguments: &'a mut ActionArguments,
    /// Short-circuit result.
    pub result: Option<BoxedActionResult>,
}

/// After the action ran, was short-circuited or failed.
#[derive(Debug)]
pub struct ActionExecutedContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// The action's result; may be replaced.
    pub result: Option<BoxedActionResult>,
    /// Whether an action filter short-circuited.
    pub canceled: bool,
    /// Error from the action or an inner filter.
    pub error: Option<PipelineError>,
    /// Set to stop `error` from propagating.
    pub exception_handled: bool,
}

/// An error escaping action or result execution.
#[derive(Debug)]
pub struct ExceptionContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// The error.
    pub error: PipelineError,
    /// Set to mark the error handled.
    pub exception_handled: bool,
    /// Result to execute instead. Setting it also marks the error handled.
    pub result: Option<BoxedActionResult>,
}

/// Before a result is executed.
#[derive(Debug)]
pub struct ResultExecutingContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// The result about to run; may be replaced.
    pub result: BoxedActionResult,
    /// Set to skip result execution.
    pub cancel: bool,
}

/// After a result was executed or canceled.
#[derive(Debug)]
pub struct ResultExecutedContext<'a> {
    /// Shared state.
    pub action_context: &'a mut ActionContext,
    /// The result.
    pub result: BoxedActionResult,
    /// Whether a result filter canceled execution.
    pub canceled: bool,
    /// Error from result execution or an inner filter.
    pub error: Option<PipelineError>,
    /// Set to stop `error` from propagating.
    pub exception_handled: bool,
}
