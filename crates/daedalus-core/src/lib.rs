//! # Daedalus Core
//!
//! Shared types for the Daedalus action pipeline.
//!
//! This crate provides the data model every other Daedalus crate builds on:
//!
//! - [`RequestContext`] - Per-request HTTP data, route values, services and cancellation
//! - [`ModelValue`] - Dynamic model graph produced by binding and walked by validation
//! - [`ModelMetadata`] / [`ModelMetadataProvider`] - Immutable, cached descriptions of
//!   types, properties and parameters
//! - [`ModelStateDictionary`] - Per-key attempted values, errors and validation state
//! - [`ValidationStateDictionary`] - Per-object validation overrides and visit marks
//! - [`VersionedCache`] - Lock-free cache tagged by a catalog version
//! - [`MvcError`] - Standard error envelope for unhandled pipeline failures

#![doc(html_root_url = "https://docs.rs/daedalus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
mod context;
pub mod convert;
pub mod di;
mod error;
pub mod messages;
pub mod metadata;
mod model_state;
pub mod names;
mod options;
pub mod testing;
mod validation_state;
mod value;

pub use cache::VersionedCache;
pub use context::{Principal, RequestContext, RequestId, RouteValues};
pub use di::{Container, ServiceProvider};
pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, FieldErrors, MvcError, MvcResult};
pub use messages::ModelBindingMessages;
pub use metadata::{
    BindingBehavior, BindingInfo, BindingSource, EnumSpec, MetadataKey, MetadataKind,
    ModelMetadata, ModelMetadataProvider, ModelType, ParameterDescriptor, PropertyDescriptor,
    ScalarKind, TypeDescriptor, ValidationRule,
};
pub use model_state::{
    ModelError, ModelErrorKind, ModelStateDictionary, ModelStateEntry, ModelValidationState,
};
pub use options::MvcOptions;
pub use validation_state::{ValidationStateDictionary, ValidationStateEntry, ValidationStrategy};
pub use value::{EnumValue, FormCollection, FormFile, ModelList, ModelMap, ModelObject, ModelValue, ObjectId};
