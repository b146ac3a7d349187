//! Body binder.

use async_trait::async_trait;
use daedalus_core::names::create_property_model_name;
use daedalus_core::{ModelErrorKind, ModelValue};
use std::sync::Arc;
use tracing::debug;

use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::BindingResult;
use crate::formatter::{InputFormatter, InputFormatterContext, InputFormatterResult};

/// Reads the request body through the first formatter that accepts its
/// content type.
///
/// Errors are keyed by the binder model name, or by the empty key for a
/// top-level model, so that body errors do not carry the parameter name.
#[derive(Debug, Clone)]
pub struct BodyModelBinder {
    formatters: Arc<[Arc<dyn InputFormatter>]>,
}

impl BodyModelBinder {
    /// Creates a binder over `formatters`, tried in order.
    #[must_use]
    pub fn new(formatters: Arc<[Arc<dyn InputFormatter>]>) -> Self {
        Self { formatters }
    }
}

#[async_trait]
impl ModelBinder for BodyModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let metadata = Arc::clone(ctx.metadata());
        let model_name = if ctx.is_top_level_object() {
            metadata.binder_model_name().unwrap_or_default().to_string()
        } else {
            ctx.model_name().to_string()
        };
        let allow_empty = ctx.options().allow_empty_input_in_body_model_binding;

        let formatter_ctx = InputFormatterContext {
            request: ctx.request(),
            metadata: &metadata,
            metadata_provider: ctx.metadata_provider(),
            model_name: &model_name,
            treat_empty_input_as_default_value: allow_empty,
        };

        let Some(formatter) = self.formatters.iter().find(|f| f.can_read(&formatter_ctx)) else {
            let content_type = ctx.request().content_type().unwrap_or_default();
            debug!(content_type = %content_type, "no input formatter for request body");
            ctx.model_state_mut().try_add_model_error_kind(
                &model_name,
                ModelErrorKind::UnsupportedContentType,
                format!("Unsupported content type '{content_type}'."),
            );
            return Ok(());
        };

        match formatter.read(&formatter_ctx).await? {
            InputFormatterResult::Success(model) => {
                ctx.set_result(ModelBindingResult::Success(model));
            }
            InputFormatterResult::NoValue if allow_empty => {
                ctx.set_result(ModelBindingResult::Success(ModelValue::Null));
            }
            InputFormatterResult::NoValue => {
                let message = ctx.messages().missing_request_body_required_value();
                ctx.model_state_mut().try_add_model_error(&model_name, message);
            }
            InputFormatterResult::Failure(errors) => {
                debug!(model_name = %model_name, count = errors.len(), "request body rejected");
                for error in errors {
                    let key = create_property_model_name(&model_name, &error.path);
                    ctx.model_state_mut().try_add_model_error_kind(
                        &key,
                        ModelErrorKind::InputFormatter,
                        error.message,
                    );
                }
            }
        }
        Ok(())
    }
}
