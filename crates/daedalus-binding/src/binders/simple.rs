//! Simple-type binder: scalars, enums and their nullable forms.

use async_trait::async_trait;
use daedalus_core::convert::convert_from_str;
use daedalus_core::ModelValue;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::BindingResult;

/// Converts the first value posted under the model name.
///
/// Blank input binds `null` for types that accept it (strings included) and
/// is an error otherwise. Unconvertible input is recorded in model state with
/// the attempted value.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleTypeModelBinder;

#[async_trait]
impl ModelBinder for SimpleTypeModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let model_name = ctx.model_name().to_string();
        let result = ctx.value_provider().get_value(&model_name);
        let Some(raw) = result.first_value().map(str::to_string) else {
            trace!(model_name = %model_name, "no value posted");
            return Ok(());
        };

        let metadata = Arc::clone(ctx.metadata());
        let attempted = result.to_string();
        ctx.model_state_mut()
            .set_model_value(&model_name, result.into_values(), attempted);

        let model_type = metadata.model_type();
        if raw.trim().is_empty() {
            if model_type.accepts_null() {
                ctx.set_result(ModelBindingResult::Success(ModelValue::Null));
            } else {
                let message = ctx.messages().value_must_not_be_null(&raw);
                ctx.model_state_mut().try_add_model_error(&model_name, message);
            }
            return Ok(());
        }

        match convert_from_str(model_type, &raw) {
            Ok(value) => ctx.set_result(ModelBindingResult::Success(value)),
            Err(err) => {
                debug!(model_name = %model_name, error = %err, "value conversion failed");
                let message = ctx
                    .messages()
                    .attempted_value_is_invalid(&raw, &metadata.display_name());
                ctx.model_state_mut().try_add_model_error(&model_name, message);
            }
        }
        Ok(())
    }
}
