//! # Daedalus
//!
//! **Request pipeline, model binding and validation for Rust MVC applications**
//!
//! Daedalus runs one matched action through a fixed onion of filter stages,
//! binds its parameters from query, form, route, header and body data, and
//! validates the bound object graph before the action sees it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use daedalus::prelude::*;
//!
//! let handler = Arc::new(FnActionHandler::new(|_request, args| async move {
//!     let id: i64 = args.get_as("id")?;
//!     Ok(ActionOutput::Value(serde_json::json!({ "id": id })))
//! }));
//!
//! let mvc = Mvc::builder()
//!     .action(
//!         ActionDescriptor::builder("Orders", "Get", handler)
//!             .parameter(ParameterDescriptor::new("id", ModelType::int()))
//!             .build(),
//!     )
//!     .build();
//!
//! let response = mvc.invoke_by_name(request, "Orders.Get").await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Authorization → Resource → Exception ┬ Action → bind, invoke
//!                                      └ Result → write response
//! ```
//!
//! Filter lists, constraints and binders are cached against the action
//! catalog version; replacing the catalog invalidates them.

#![doc(html_root_url = "https://docs.rs/daedalus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod mvc;

pub use mvc::{Mvc, MvcBuilder};

// Re-export core types
pub use daedalus_core as core;

// Re-export model binding
pub use daedalus_binding as binding;

// Re-export validation
pub use daedalus_validation as validation;

// Re-export the filter pipeline
pub use daedalus_pipeline as pipeline;

// Re-export configuration
pub use daedalus_config as config;

// Re-export logging and metrics
pub use daedalus_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use daedalus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Mvc, MvcBuilder};

    pub use daedalus_core::{
        BindingSource, Container, ErrorCategory, ModelMetadataProvider, ModelStateDictionary, ModelType,
        ModelValue, MvcError, MvcOptions, ParameterDescriptor, Principal, PropertyDescriptor, RequestContext,
        RequestId, ServiceProvider, TypeDescriptor, ValidationRule,
    };

    pub use daedalus_binding::{InputFormatter, ModelBinder, ModelBinderProvider, ValueProvider};

    pub use daedalus_validation::{ModelValidator, ModelValidatorProvider};

    pub use daedalus_pipeline::filters::{
        ActionExecutedContext, ActionExecutingContext, ActionFilter, ExceptionContext, ExceptionFilter,
        ModelStateInvalidFilter, ResourceExecutedContext, ResourceExecutingContext, ResourceFilter,
        ResultExecutedContext, ResultExecutingContext, ResultFilter,
    };
    pub use daedalus_pipeline::results::{
        ContentResult, EmptyResult, ObjectResult, StatusCodeResult,
    };
    pub use daedalus_pipeline::{
        ActionArguments, ActionDescriptor, ActionHandler, ActionOutput, ActionResult, AuthorizationPolicy,
        AuthorizeFilter, ConstraintDescriptor, ConsumesConstraint, Filter, FilterDescriptor, FnActionHandler,
        HttpMethodConstraint, PipelineError,
    };

    pub use daedalus_config::{ConfigLoader, DaedalusConfig};
    pub use daedalus_telemetry::{init_logging, LogConfig};

    pub use std::sync::Arc;
}
