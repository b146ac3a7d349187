//! Built-in filters and a closure-backed filter factory.

use async_trait::async_trait;
use daedalus_core::{ModelErrorKind, ServiceProvider};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{ActionExecutingContext, ActionFilter, Filter, FilterFactory};
use crate::results::{BadRequestObjectResult, UnsupportedMediaTypeResult};

/// Answers 415 when the body binder found no formatter for the content type.
///
/// Runs before [`ModelStateInvalidFilter`] so the 415 wins over a 400.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedContentTypeFilter;

impl UnsupportedContentTypeFilter {
    /// Order of this filter.
    pub const ORDER: i32 = -3000;
}

#[async_trait]
impl ActionFilter for UnsupportedContentTypeFilter {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> anyhow::Result<()> {
        let model_state = &ctx.action_context.model_state;
        if model_state.has_error_kind(ModelErrorKind::UnsupportedContentType) {
            debug!(
                content_type = ?ctx.action_context.request.content_type(),
                "unsupported content type"
            );
            ctx.result = Some(Arc::new(UnsupportedMediaTypeResult));
        }
        Ok(())
    }
}

/// Answers 400 with problem details when model state is invalid.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelStateInvalidFilter;

impl ModelStateInvalidFilter {
    /// Order of this filter.
    pub const ORDER: i32 = -2000;
}

#[async_trait]
impl ActionFilter for ModelStateInvalidFilter {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn on_action_executing(&self, ctx: &mut ActionExecutingContext<'_>) -> anyhow::Result<()> {
        let model_state = &ctx.action_context.model_state;
        if !model_state.is_valid() {
            debug!(errors = model_state.error_count(), "model state invalid");
            ctx.result = Some(Arc::new(BadRequestObjectResult::from_model_state(model_state)));
        }
        Ok(())
    }
}

type CreateFn = dyn Fn(&dyn ServiceProvider) -> anyhow::Result<Filter> + Send + Sync;

/// A [`FilterFactory`] backed by a closure.
///
/// # Example
///
/// ```rust,ignore
/// let factory = FnFilterFactory::new(false, |services| {
///     let clock = daedalus_core::di::resolve::<Clock>(services)
///         .ok_or_else(|| anyhow::anyhow!("clock not registered"))?;
///     Ok(Filter::action(StampFilter { clock }))
/// });
/// ```
#[derive(Clone)]
pub struct FnFilterFactory {
    reusable: bool,
    order: i32,
    create: Arc<CreateFn>,
}

impl FnFilterFactory {
    /// Creates a factory. Reusable output is created once per catalog version.
    pub fn new<F>(reusable: bool, create: F) -> Self
    where
        F: Fn(&dyn ServiceProvider) -> anyhow::Result<Filter> + Send + Sync + 'static,
    {
        Self {
            reusable,
            order: 0,
            create: Arc::new(create),
        }
    }

    /// Sets the order of produced filters.
    #[must_use]
    pub const fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl fmt::Debug for FnFilterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilterFactory")
            .field("reusable", &self.reusable)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl FilterFactory for FnFilterFactory {
    fn is_reusable(&self) -> bool {
        self.reusable
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn create_instance(&self, services: &dyn ServiceProvider) -> anyhow::Result<Filter> {
        (self.create)(services)
    }
}
