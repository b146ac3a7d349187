//! # Daedalus Pipeline
//!
//! The filter pipeline and action invoker.
//!
//! - [`ActionDescriptor`] / [`ActionDescriptorCatalog`] - Immutable actions
//!   and the versioned catalog that publishes them
//! - [`filters`] - Authorization, resource, action, exception and result
//!   filters, their descriptors, factories and providers
//! - [`ActionInvoker`] - Runs one action through the filter stages
//! - [`InvokerCache`] - Ordered filters and executors per action, rebuilt when
//!   the catalog version changes
//! - [`ActionSelector`] - Action constraints and candidate selection
//! - [`results`] - Action results and [`OutputFormatter`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use daedalus_pipeline::{ActionDescriptor, ActionOutput, FnActionHandler};
//!
//! let action = ActionDescriptor::builder(
//!     "Orders",
//!     "Get",
//!     Arc::new(FnActionHandler::new(|_request, args| async move {
//!         let id: i64 = args.get_as("id")?;
//!         ActionOutput::json(&serde_json::json!({ "id": id }))
//!     })),
//! )
//! .parameter(ParameterDescriptor::new("id", ModelType::int()))
//! .build();
//!
//! let response = invoker.invoke(Arc::new(request), catalog.find(action_id)?).await?;
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod authorization;
mod catalog;
pub mod constraints;
mod descriptor;
mod error;
mod executor;
pub mod filters;
mod formatters;
mod invoker;
mod invoker_cache;
pub mod results;

pub use authorization::{
    AuthorizationOutcome, AuthorizationPolicy, AuthorizationService, AuthorizeFilter, RolesAuthorizationService,
};
pub use catalog::{ActionDescriptorCatalog, CatalogSnapshot};
pub use constraints::{
    ActionConstraint, ActionConstraintCache, ActionConstraintContext, ActionConstraintFactory, ActionSelector,
    ConstraintDescriptor, ConsumesConstraint, HttpMethodConstraint,
};
pub use descriptor::{
    ActionArguments, ActionDescriptor, ActionDescriptorBuilder, ActionHandler, ActionId, ActionOutput,
    FnActionHandler,
};
pub use error::{PipelineError, PipelineResult};
pub use executor::ActionMethodExecutor;
pub use filters::{Filter, FilterDescriptor, FilterFactory, FilterProvider, FilterScope, FilterStage};
pub use formatters::{
    parse_accept, JsonOutputFormatter, MediaTypeQuality, OutputFormatter, OutputFormatterSelector,
    PlainTextOutputFormatter,
};
pub use invoker::ActionInvoker;
pub use invoker_cache::{InvokerCache, InvokerCacheEntry};
pub use results::{error_response, ActionResult, BoxedActionResult, ResultContext};
