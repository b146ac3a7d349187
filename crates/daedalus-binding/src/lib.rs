//! # Daedalus Binding
//!
//! Recursive model binding for action parameters.
//!
//! - [`ValueProvider`] - Keyed request data (form, route, query) with prefix
//!   lookups; [`CompositeValueProvider`] chains them in priority order
//! - [`ModelBinder`] / [`ModelBinderProvider`] - Binders for simple types,
//!   collections, dictionaries, complex objects and greedy sources
//! - [`ModelBinderFactory`] - Builds binders once per metadata key, including
//!   self-referencing types
//! - [`ModelBindingContext`] - Scoped binding state with recursion guard
//! - [`InputFormatter`] - Body deserialization ([`JsonInputFormatter`])
//! - [`ParameterBinder`] - Binds one parameter and validates the result
//!
//! # Example
//!
//! ```rust,ignore
//! use daedalus_binding::{CompositeValueProvider, ParameterBinder};
//!
//! let providers = CompositeValueProvider::create(&factories, &request).await?;
//! let provider: Arc<dyn ValueProvider> = Arc::new(providers);
//! let result = binder
//!     .bind_parameter(&request, &provider, &mut model_state, "Orders.Create", &parameter)
//!     .await?;
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-binding/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod binder;
pub mod binders;
mod context;
mod error;
mod formatter;
mod parameter_binder;
pub mod provider;
mod value_provider;
mod value_provider_factory;

pub use binder::{ModelBinder, ModelBinderFactory, ModelBinderProvider, ModelBinderProviderContext, PlaceholderBinder};
pub use context::{BindingEnvironment, ModelBindingContext, ModelBindingResult, NestedScope};
pub use error::{BindingError, BindingResult};
pub use formatter::{
    InputFormatter, InputFormatterContext, InputFormatterError, InputFormatterResult, JsonInputFormatter,
};
pub use parameter_binder::ParameterBinder;
pub use provider::default_model_binder_providers;
pub use value_provider::{
    CompositeValueProvider, ElementalValueProvider, NameValueProvider, PrefixContainer, ValueProvider,
    ValueProviderResult,
};
pub use value_provider_factory::{
    default_value_provider_factories, FormValueProviderFactory, QueryStringValueProviderFactory,
    RouteValueProviderFactory, ValueProviderFactory,
};
