//! Built-in model binders.

mod body;
mod collection;
mod complex;
mod dictionary;
mod form;
mod header;
mod services;
mod simple;

pub use body::BodyModelBinder;
pub use collection::CollectionModelBinder;
pub use complex::{ComplexObjectModelBinder, ModelDataAvailability};
pub use dictionary::DictionaryModelBinder;
pub use form::{FormCollectionModelBinder, FormFileModelBinder};
pub use header::HeaderModelBinder;
pub use services::{CancellationTokenModelBinder, ServicesModelBinder};
pub use simple::SimpleTypeModelBinder;

use daedalus_core::names::create_property_model_name;
use daedalus_core::{ModelMetadata, ModelValue};
use std::sync::Arc;

use crate::binder::ModelBinder;
use crate::context::{ModelBindingContext, ModelBindingResult};
use crate::error::BindingResult;
use crate::value_provider::ValueProvider;

/// Binds one child model in a nested scope and returns its result.
async fn bind_child(
    ctx: &mut ModelBindingContext<'_>,
    binder: &Arc<dyn ModelBinder>,
    metadata: &Arc<ModelMetadata>,
    field_name: &str,
    model_name: String,
    model: Option<ModelValue>,
) -> BindingResult<ModelBindingResult> {
    let mut scope = ctx.enter_nested_scope(Arc::clone(metadata), field_name, model_name, model)?;
    binder.bind_model(&mut scope).await?;
    Ok(scope.take_result())
}

/// Indexes posted under `prefix.index`, if any.
fn explicit_indexes(value_provider: &dyn ValueProvider, model_name: &str) -> Option<Vec<String>> {
    let result = value_provider.get_value(&create_property_model_name(model_name, "index"));
    if result.is_none() {
        return None;
    }
    Some(
        result
            .into_values()
            .into_iter()
            .map(|index| index.trim().to_string())
            .filter(|index| !index.is_empty())
            .collect(),
    )
}
