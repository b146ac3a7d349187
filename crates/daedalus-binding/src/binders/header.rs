//! Header binder.

use async_trait::async_trait;
use daedalus_core::convert::convert_from_str;
use daedalus_core::{ModelMetadata, ModelType, ModelValue};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::BindingResult;

/// Binds a simple type, or a collection of simple types, from the header
/// named by the field name.
///
/// Collections accept both repeated headers and comma-separated values.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderModelBinder;

#[async_trait]
impl ModelBinder for HeaderModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let header_name = ctx.field_name().to_string();
        let model_name = ctx.model_name().to_string();
        let metadata = Arc::clone(ctx.metadata());

        let values: Vec<String> = ctx
            .request()
            .headers()
            .get_all(header_name.as_str())
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            trace!(header = %header_name, "header not present");
            return Ok(());
        }
        let attempted = values.join(",");
        ctx.model_state_mut()
            .set_model_value(&model_name, values.clone(), attempted);

        let result = match metadata.model_type().element_type() {
            Some(element) => {
                let element = element.clone();
                let parts = values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .map(str::trim)
                    .filter(|v| !v.is_empty());
                let mut items = Vec::new();
                for part in parts {
                    match convert(ctx, &metadata, &element, &model_name, part) {
                        Some(item) => items.push(item),
                        None => return Ok(()),
                    }
                }
                ModelValue::list(items)
            }
            None => match convert(ctx, &metadata, metadata.model_type(), &model_name, &values[0]) {
                Some(value) => value,
                None => return Ok(()),
            },
        };
        ctx.set_result(ModelBindingResult::Success(result));
        Ok(())
    }
}

fn convert(
    ctx: &mut ModelBindingContext<'_>,
    metadata: &ModelMetadata,
    model_type: &ModelType,
    model_name: &str,
    raw: &str,
) -> Option<ModelValue> {
    match convert_from_str(model_type, raw) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(model_name = %model_name, error = %err, "header value conversion failed");
            let message = ctx
                .messages()
                .attempted_value_is_invalid(raw, &metadata.display_name());
            ctx.model_state_mut().try_add_model_error(model_name, message);
            None
        }
    }
}
