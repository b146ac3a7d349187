//! The action invoker.
//!
//! One invocation runs the filter stages around binding, the action method
//! and result execution:
//!
//! ```text
//! authorization -> resource -> [ exception ( action ( bind, invoke ) -> result ) ]
//! ```
//!
//! Every stage runs sequentially on the calling task. Executing halves run
//! in filter order and executed halves in reverse. An error raised by an
//! executing half, the binder, the action method or result execution is
//! offered to the exception filters once; errors raised by executed halves
//! skip them.

use bytes::Bytes;
use daedalus_binding::{CompositeValueProvider, ParameterBinder, ValueProvider, ValueProviderFactory};
use daedalus_core::{MvcOptions, RequestContext};
use daedalus_telemetry::metrics::{
    record_action_invoked, record_binding_failure, record_short_circuit, record_unhandled_exception,
};
use daedalus_telemetry::InFlightGuard;
use http::Response;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::descriptor::{ActionArguments, ActionDescriptor};
use crate::error::{PipelineError, PipelineResult};
use crate::filters::{
    ActionContext, ActionExecutedContext, ActionExecutingContext, AuthorizationFilterContext, ExceptionContext,
    FilterSet, FilterStage, ResourceExecutedContext, ResourceExecutingContext, ResultExecutedContext,
    ResultExecutingContext,
};
use crate::formatters::OutputFormatterSelector;
use crate::invoker_cache::{InvokerCache, InvokerCacheEntry};
use crate::results::{BoxedActionResult, EmptyResult, ResultContext};

/// Runs actions through the filter pipeline.
///
/// Shared across requests. All per-request state lives in the invocation.
#[derive(Debug, Clone)]
pub struct ActionInvoker {
    parameter_binder: Arc<ParameterBinder>,
    value_provider_factories: Arc<[Arc<dyn ValueProviderFactory>]>,
    invoker_cache: Arc<InvokerCache>,
    formatters: Arc<OutputFormatterSelector>,
    options: Arc<MvcOptions>,
}

impl ActionInvoker {
    /// Creates an invoker. Options are taken from the parameter binder.
    #[must_use]
    pub fn new(
        parameter_binder: Arc<ParameterBinder>,
        value_provider_factories: Vec<Arc<dyn ValueProviderFactory>>,
        invoker_cache: Arc<InvokerCache>,
        formatters: Arc<OutputFormatterSelector>,
    ) -> Self {
        let options = Arc::clone(parameter_binder.options());
        Self {
            parameter_binder,
            value_provider_factories: value_provider_factories.into(),
            invoker_cache,
            formatters,
            options,
        }
    }

    /// The invoker cache.
    #[must_use]
    pub const fn invoker_cache(&self) -> &Arc<InvokerCache> {
        &self.invoker_cache
    }

    /// The options in effect.
    #[must_use]
    pub const fn options(&self) -> &Arc<MvcOptions> {
        &self.options
    }

    /// Invokes `action` for `request`.
    ///
    /// Returns `Err` only for errors no filter handled. Authorization
    /// failures, short-circuits and invalid model state are responses.
    pub async fn invoke(
        &self,
        request: Arc<RequestContext>,
        action: Arc<ActionDescriptor>,
    ) -> PipelineResult<Response<Bytes>> {
        let span = info_span!(
            "action",
            action = action.display_name(),
            request_id = %request.request_id(),
        );
        async move {
            let _in_flight = InFlightGuard::new();
            let started = Instant::now();
            let outcome = self.run(request, Arc::clone(&action)).await;
            match &outcome {
                Ok(response) => {
                    debug!(status = response.status().as_u16(), "action completed");
                    record_action_invoked(action.display_name(), response.status().as_u16(), started.elapsed());
                }
                Err(err) => {
                    error!(error = %err, "unhandled error in action pipeline");
                    record_unhandled_exception(action.display_name());
                    record_action_invoked(action.display_name(), err.status_code().as_u16(), started.elapsed());
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: Arc<RequestContext>, action: Arc<ActionDescriptor>) -> PipelineResult<Response<Bytes>> {
        let (entry, filters) = self.invoker_cache.get(&action, request.services().as_ref())?;
        let mut invocation = Invocation {
            invoker: self,
            entry,
            filters,
            value_provider_factories: self.value_provider_factories.to_vec(),
            ctx: ActionContext::new(request, action, self.options.max_model_validation_errors),
        };
        invocation.run().await
    }
}

/// An error leaving the action or result stage.
struct StageFailure {
    error: PipelineError,
    /// Raised by an executed half; never offered to exception filters.
    from_executed: bool,
}

impl StageFailure {
    const fn executing(error: PipelineError) -> Self {
        Self {
            error,
            from_executed: false,
        }
    }
}

impl From<PipelineError> for StageFailure {
    fn from(error: PipelineError) -> Self {
        Self::executing(error)
    }
}

fn empty_response() -> Response<Bytes> {
    Response::new(Bytes::new())
}

struct Invocation<'a> {
    invoker: &'a ActionInvoker,
    entry: Arc<InvokerCacheEntry>,
    filters: FilterSet,
    value_provider_factories: Vec<Arc<dyn ValueProviderFactory>>,
    ctx: ActionContext,
}

impl Invocation<'_> {
    async fn run(&mut self) -> PipelineResult<Response<Bytes>> {
        if let Some(result) = self.run_authorization().await? {
            record_short_circuit(FilterStage::Authorization.as_str());
            return self.execute_result(&result).await;
        }
        self.run_resources().await
    }

    async fn execute_result(&self, result: &BoxedActionResult) -> PipelineResult<Response<Bytes>> {
        let ctx = ResultContext {
            request: &self.ctx.request,
            action: &self.ctx.action,
            model_state: &self.ctx.model_state,
            formatters: &self.invoker.formatters,
        };
        result.execute(&ctx).await
    }

    async fn run_authorization(&mut self) -> PipelineResult<Option<BoxedActionResult>> {
        for filter in &self.filters.authorization {
            let mut ctx = AuthorizationFilterContext {
                action_context: &mut self.ctx,
                result: None,
            };
            filter
                .on_authorization(&mut ctx)
                .await
                .map_err(|e| PipelineError::filter(filter.name(), e))?;
            if let Some(result) = ctx.result {
                warn!(filter = filter.name(), "authorization filter short-circuited");
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    async fn run_resources(&mut self) -> PipelineResult<Response<Bytes>> {
        let filters = self.filters.resource.clone();
        let mut entered = 0;
        let mut short_circuit = None;
        let mut error = None;
        for filter in &filters {
            let mut ctx = ResourceExecutingContext {
                action_context: &mut self.ctx,
                result: None,
                value_provider_factories: &mut self.value_provider_factories,
            };
            let outcome = filter.on_resource_executing(&mut ctx).await;
            let result = ctx.result.take();
            if let Err(e) = outcome {
                error = Some(PipelineError::filter(filter.name(), e));
                break;
            }
            entered += 1;
            if let Some(result) = result {
                debug!(filter = filter.name(), "resource filter short-circuited");
                record_short_circuit(FilterStage::Resource.as_str());
                short_circuit = Some(result);
                break;
            }
        }

        let canceled = short_circuit.is_some();
        let mut result = short_circuit;
        let mut response = None;
        match (&result, error.is_some()) {
            (_, true) => {}
            (Some(result), false) => match self.execute_result(result).await {
                Ok(r) => response = Some(r),
                Err(e) => error = Some(e),
            },
            (None, false) => match self.run_inner().await {
                Ok(r) => response = Some(r),
                Err(e) => error = Some(e),
            },
        }

        for filter in filters[..entered].iter().rev() {
            let mut ctx = ResourceExecutedContext {
                action_context: &mut self.ctx,
                result: result.take(),
                canceled,
                error: error.take(),
                exception_handled: false,
            };
            let outcome = filter.on_resource_executed(&mut ctx).await;
            result = ctx.result.take();
            let handled = ctx.exception_handled;
            error = ctx.error.take();
            match outcome {
                Err(e) => {
                    error = Some(PipelineError::filter(filter.name(), e));
                    response = None;
                }
                Ok(()) if handled && error.is_some() => {
                    debug!(filter = filter.name(), "resource filter handled error");
                    error = None;
                }
                Ok(()) => {}
            }
        }

        match (error, response) {
            (Some(error), _) => Err(error),
            (None, Some(response)) => Ok(response),
            (None, None) => match result {
                Some(result) => self.execute_result(&result).await,
                None => Ok(empty_response()),
            },
        }
    }

    async fn run_inner(&mut self) -> PipelineResult<Response<Bytes>> {
        let result = match self.run_action_stage().await {
            Ok(result) => result,
            Err(StageFailure {
                error,
                from_executed: true,
            }) => return Err(error),
            Err(StageFailure { error, .. }) => self.run_exception_filters(error).await?,
        };
        match self.run_result_stage(result).await {
            Ok(response) => Ok(response),
            Err(StageFailure {
                error,
                from_executed: true,
            }) => Err(error),
            Err(StageFailure { error, .. }) => {
                let result = self.run_exception_filters(error).await?;
                self.execute_result(&result).await
            }
        }
    }

    async fn run_exception_filters(&mut self, mut error: PipelineError) -> PipelineResult<BoxedActionResult> {
        for filter in &self.filters.exception {
            let mut ctx = ExceptionContext {
                action_context: &mut self.ctx,
                error,
                exception_handled: false,
                result: None,
            };
            filter
                .on_exception(&mut ctx)
                .await
                .map_err(|e| PipelineError::filter(filter.name(), e))?;
            if ctx.exception_handled || ctx.result.is_some() {
                debug!(filter = filter.name(), error = %ctx.error, "exception filter handled error");
                return Ok(ctx.result.unwrap_or_else(|| Arc::new(EmptyResult)));
            }
            error = ctx.error;
        }
        Err(error)
    }

    async fn bind_arguments(&mut self) -> PipelineResult<ActionArguments> {
        let mut arguments = ActionArguments::new();
        let action = Arc::clone(&self.ctx.action);
        if action.parameters().is_empty() {
            return Ok(arguments);
        }
        let provider = CompositeValueProvider::create(&self.value_provider_factories, &self.ctx.request).await?;
        let provider: Arc<dyn ValueProvider> = Arc::new(provider);
        for parameter in action.parameters() {
            let result = self
                .invoker
                .parameter_binder
                .bind_parameter(
                    &self.ctx.request,
                    &provider,
                    &mut self.ctx.model_state,
                    action.metadata_owner(),
                    parameter,
                )
                .await?;
            if let Some(model) = result.into_model() {
                arguments.insert(parameter.name.clone(), model);
            }
        }
        if !self.ctx.model_state.is_valid() {
            debug!(errors = self.ctx.model_state.error_count(), "model state invalid after binding");
            record_binding_failure(action.display_name());
        }
        Ok(arguments)
    }

    async fn invoke_action(&self, arguments: ActionArguments) -> PipelineResult<BoxedActionResult> {
        let request = Arc::clone(&self.ctx.request);
        let action = &self.ctx.action;
        let call = self.entry.executor().execute(action, Arc::clone(&request), arguments);
        let bounded = async {
            match self.invoker.options.request_timeout() {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::timeout(limit)),
                },
                None => call.await,
            }
        };
        tokio::select! {
            biased;
            () = request.cancellation().cancelled() => Err(PipelineError::Canceled),
            result = bounded => result,
        }
    }

    async fn run_action_stage(&mut self) -> Result<BoxedActionResult, StageFailure> {
        let mut arguments = self.bind_arguments().await?;
        let filters = self.filters.action.clone();
        let mut entered = 0;
        let mut result = None;
        let mut error = None;
        for filter in &filters {
            let mut ctx = ActionExecutingContext {
                action_context: &mut self.ctx,
                arguments: &mut arguments,
                result: None,
            };
            let outcome = filter.on_action_executing(&mut ctx).await;
            let short_circuit = ctx.result.take();
            if let Err(e) = outcome {
                error = Some(PipelineError::filter(filter.name(), e));
                break;
            }
            entered += 1;
            if let Some(short_circuit) = short_circuit {
                debug!(filter = filter.name(), "action filter short-circuited");
                record_short_circuit(FilterStage::Action.as_str());
                result = Some(short_circuit);
                break;
            }
        }

        let canceled = result.is_some();
        if !canceled && error.is_none() {
            match self.invoke_action(arguments).await {
                Ok(r) => result = Some(r),
                Err(e) => error = Some(e),
            }
        }

        let mut from_executed = false;
        for filter in filters[..entered].iter().rev() {
            let mut ctx = ActionExecutedContext {
                action_context: &mut self.ctx,
                result: result.take(),
                canceled,
                error: error.take(),
                exception_handled: false,
            };
            let outcome = filter.on_action_executed(&mut ctx).await;
            result = ctx.result.take();
            let handled = ctx.exception_handled;
            error = ctx.error.take();
            match outcome {
                Err(e) => {
                    error = Some(PipelineError::filter(filter.name(), e));
                    from_executed = true;
                }
                Ok(()) if handled && error.is_some() => {
                    debug!(filter = filter.name(), "action filter handled error");
                    error = None;
                    from_executed = false;
                }
                Ok(()) => {}
            }
        }

        match error {
            Some(error) => Err(StageFailure { error, from_executed }),
            None => Ok(result.unwrap_or_else(|| Arc::new(EmptyResult))),
        }
    }

    async fn run_result_stage(&mut self, mut result: BoxedActionResult) -> Result<Response<Bytes>, StageFailure> {
        let filters = self.filters.result.clone();
        let mut entered = 0;
        let mut cancel = false;
        let mut error = None;
        for filter in &filters {
            let mut ctx = ResultExecutingContext {
                action_context: &mut self.ctx,
                result: Arc::clone(&result),
                cancel: false,
            };
            let outcome = filter.on_result_executing(&mut ctx).await;
            let canceled = ctx.cancel;
            result = ctx.result;
            if let Err(e) = outcome {
                error = Some(PipelineError::filter(filter.name(), e));
                break;
            }
            entered += 1;
            if canceled {
                debug!(filter = filter.name(), "result filter canceled execution");
                record_short_circuit(FilterStage::Result.as_str());
                cancel = true;
                break;
            }
        }

        let mut response = None;
        if cancel {
            response = Some(empty_response());
        } else if error.is_none() {
            match self.execute_result(&result).await {
                Ok(r) => response = Some(r),
                Err(e) => error = Some(e),
            }
        }

        let mut from_executed = false;
        for filter in filters[..entered].iter().rev() {
            let mut ctx = ResultExecutedContext {
                action_context: &mut self.ctx,
                result: Arc::clone(&result),
                canceled: cancel,
                error: error.take(),
                exception_handled: false,
            };
            let outcome = filter.on_result_executed(&mut ctx).await;
            let handled = ctx.exception_handled;
            error = ctx.error.take();
            match outcome {
                Err(e) => {
                    error = Some(PipelineError::filter(filter.name(), e));
                    from_executed = true;
                    response = None;
                }
                Ok(()) if handled && error.is_some() => {
                    debug!(filter = filter.name(), "result filter handled error");
                    error = None;
                    from_executed = false;
                }
                Ok(()) => {}
            }
        }

        match error {
            Some(error) => Err(StageFailure { error, from_executed }),
            None => Ok(response.unwrap_or_else(empty_response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_from_error() {
        let failure = StageFailure::from(PipelineError::Canceled);
        assert!(!failure.from_executed);
        assert!(failure.error.is_aborted());
    }

    #[test]
    fn test_empty_response_is_ok() {
        let response = empty_response();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert!(response.body().is_empty());
    }
}
