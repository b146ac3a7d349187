//! Binders for request-intrinsic values.

use async_trait::async_trait;
use daedalus_core::di::InjectionError;
use daedalus_core::{ModelType, ModelValue};
use tracing::trace;

use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::BindingResult;

/// Resolves the model from the request's service provider.
///
/// A missing registration is an error rather than a model-state entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServicesModelBinder;

#[async_trait]
impl ModelBinder for ServicesModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let type_name = match ctx.metadata().model_type().underlying() {
            ModelType::Service(name) | ModelType::Complex(name) => name.clone(),
            other => other.to_string(),
        };
        let service = ctx
            .request()
            .services()
            .get_service(&type_name)
            .ok_or_else(|| InjectionError::not_registered(type_name.as_str()))?;
        trace!(service = %type_name, "service resolved");
        ctx.set_result(ModelBindingResult::Success(ModelValue::Service(service)));
        Ok(())
    }
}

/// Binds the request's cancellation token.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancellationTokenModelBinder;

#[async_trait]
impl ModelBinder for CancellationTokenModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let token = ctx.request().cancellation().clone();
        ctx.set_result(ModelBindingResult::Success(ModelValue::CancellationToken(token)));
        Ok(())
    }
}
