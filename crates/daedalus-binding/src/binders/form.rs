//! Binders for uploaded files and the raw form.

use async_trait::async_trait;
use daedalus_core::{FormCollection, ModelValue};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::{BindingError, BindingResult};

/// Binds `FormFile` or `List<FormFile>` from files posted under the model's
/// name.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormFileModelBinder;

#[async_trait]
impl ModelBinder for FormFileModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let name = if ctx.is_top_level_object() {
            ctx.field_name().to_string()
        } else {
            ctx.model_name().to_string()
        };
        let files: Vec<ModelValue> = ctx
            .request()
            .files()
            .iter()
            .filter(|file| file.name.eq_ignore_ascii_case(&name))
            .cloned()
            .map(ModelValue::File)
            .collect();
        trace!(name = %name, count = files.len(), "matched uploaded files");

        let is_collection = ctx.metadata().model_type().element_type().is_some();
        let result = if is_collection {
            (!files.is_empty()).then(|| ModelValue::list(files))
        } else {
            files.into_iter().next()
        };
        if let Some(value) = result {
            ctx.set_result(ModelBindingResult::Success(value));
        }
        Ok(())
    }
}

/// Binds the whole form. Requests without a form content type bind an empty
/// collection.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormCollectionModelBinder;

#[async_trait]
impl ModelBinder for FormCollectionModelBinder {
    async fn bind_model(&self, ctx: &mut ModelBindingContext<'_>) -> BindingResult<()> {
        let form = match ctx.request().form() {
            Some(Ok(form)) => form,
            Some(Err(err)) => {
                debug!(error = %err, "form body could not be parsed");
                return Err(BindingError::InvalidForm(err.to_string()));
            }
            None => FormCollection::default(),
        };
        ctx.set_result(ModelBindingResult::Success(ModelValue::Form(Arc::new(form))));
        Ok(())
    }
}
